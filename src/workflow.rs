use std::path::{Path, PathBuf};
use std::sync::Arc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::correct::{Corrector, OpenAiChatService};
use crate::error::{Result, KoseiError};
use crate::transcript::Transcript;

/// Outer shell around the correction engine: file loading, output naming and
/// multi-file runs. The engine itself never touches paths.
pub struct Workflow {
    corrector: Corrector,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let service = Arc::new(OpenAiChatService::new(config.llm.clone())?);
        let corrector = Corrector::new(service, config.correct);
        Ok(Self { corrector })
    }

    /// Correct a single subtitle file. Returns the output path.
    pub async fn correct_file(
        &self,
        input: &Path,
        output: Option<PathBuf>,
        reference: Option<&Path>,
    ) -> Result<PathBuf> {
        info!("Correcting subtitle file: {}", input.display());

        let transcript = Transcript::load(input).await?;
        if transcript.is_empty() {
            warn!("{} contains no usable segments", input.display());
        }

        let reference = match reference {
            Some(path) => Some(tokio::fs::read_to_string(path).await?),
            None => None,
        };

        let corrected = self
            .corrector
            .correct(&transcript, reference.as_deref())
            .await?;

        let output = output.unwrap_or_else(|| default_output_path(input));
        corrected.save(&output).await?;

        info!("Corrected subtitle written to {}", output.display());
        Ok(output)
    }

    /// Correct every SRT file under a directory. One file failing never
    /// aborts the rest.
    pub async fn correct_directory(
        &self,
        input_dir: &Path,
        output_dir: Option<&Path>,
        reference: Option<&Path>,
    ) -> Result<()> {
        if !input_dir.is_dir() {
            return Err(KoseiError::Config(
                "Input path is not a directory".to_string(),
            ));
        }

        let mut subtitle_files = Vec::new();
        for entry in WalkDir::new(input_dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_srt = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("srt"));
            if is_srt {
                subtitle_files.push(path.to_path_buf());
            }
        }

        info!("Found {} subtitle files to correct", subtitle_files.len());

        let progress = ProgressBar::new(subtitle_files.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .expect("progress template is valid"),
        );

        for path in subtitle_files {
            progress.set_message(path.display().to_string());

            let output = output_dir.map(|dir| {
                let name = default_output_path(&path);
                dir.join(name.file_name().expect("output path has a file name"))
            });

            match self.correct_file(&path, output, reference).await {
                Ok(written) => info!("Corrected {} -> {}", path.display(), written.display()),
                Err(e) => warn!("Failed to correct {}: {}", path.display(), e),
            }
            progress.inc(1);
        }

        progress.finish_with_message("done");
        Ok(())
    }

    /// Read a subtitle file and rewrite it in the format implied by the
    /// output extension.
    pub async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let transcript = Transcript::load(input).await?;
        transcript.save(output).await
    }

    /// Request shutdown of the underlying corrector.
    pub fn stop(&self) {
        self.corrector.stop();
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "subtitle".to_string());
    input.with_file_name(format!("{}.corrected.srt", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/tmp/episode01.srt")),
            PathBuf::from("/tmp/episode01.corrected.srt")
        );
    }
}
