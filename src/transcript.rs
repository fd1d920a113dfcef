use std::collections::BTreeMap;
use std::path::Path;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{Result, KoseiError};

/// A single time-coded subtitle line. Times are milliseconds from stream start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Segment {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
        }
    }

    /// SRT timestamp line for this segment.
    pub fn srt_timestamp(&self) -> String {
        format!(
            "{} --> {}",
            format_srt_time(self.start_ms),
            format_srt_time(self.end_ms)
        )
    }
}

/// An ordered collection of subtitle segments.
///
/// Construction filters out empty/whitespace-only texts and sorts ascending
/// by start time. Segments are addressed by a stable 1-based position in that
/// sorted, filtered order for the duration of one correction pass.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    segments: Vec<Segment>,
}

impl Transcript {
    pub fn new(segments: Vec<Segment>) -> Self {
        let mut segments: Vec<Segment> = segments
            .into_iter()
            .filter(|seg| !seg.text.trim().is_empty())
            .collect();
        segments.sort_by_key(|seg| seg.start_ms);
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Map each segment's 1-based position to its text.
    pub fn positions(&self) -> BTreeMap<usize, String> {
        self.segments
            .iter()
            .enumerate()
            .map(|(i, seg)| (i + 1, seg.text.clone()))
            .collect()
    }

    /// Newline-joined segment texts in timeline order.
    pub fn to_plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|seg| seg.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// SRT document: index line, timestamp line, text, blank separator.
    pub fn to_srt(&self) -> String {
        let mut srt = String::new();
        for (index, seg) in self.segments.iter().enumerate() {
            srt.push_str(&format!(
                "{}\n{}\n{}\n\n",
                index + 1,
                seg.srt_timestamp(),
                seg.text
            ));
        }
        srt
    }

    /// Structured record keyed by 1-based string index.
    pub fn to_record(&self) -> serde_json::Value {
        let mut record = serde_json::Map::new();
        for (index, seg) in self.segments.iter().enumerate() {
            record.insert(
                (index + 1).to_string(),
                json!({
                    "start_time": seg.start_ms,
                    "end_time": seg.end_ms,
                    "text": seg.text,
                }),
            );
        }
        serde_json::Value::Object(record)
    }

    /// Parse an SRT document. Malformed blocks (too few lines, unparsable
    /// timestamp line) are skipped rather than failing the whole parse. The
    /// index line is informational only; positions are reassigned on
    /// construction.
    pub fn from_srt(content: &str) -> Self {
        let mut segments = Vec::new();

        for block in split_blocks(content) {
            let lines: Vec<&str> = block.lines().collect();
            if lines.len() < 3 {
                continue;
            }

            let Some((start_ms, end_ms)) = parse_srt_timestamp(lines[1]) else {
                continue;
            };

            let text = lines[2..]
                .iter()
                .map(|line| line.trim())
                .collect::<Vec<_>>()
                .join(" ");
            segments.push(Segment::new(text, start_ms, end_ms));
        }

        Self::new(segments)
    }

    /// Load a transcript from an SRT file.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(KoseiError::FileNotFound(path.display().to_string()));
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_srt(&content))
    }

    /// Write the transcript to disk, choosing the format by extension
    /// (`srt`, `txt` or `json`). Parent directories are created as needed.
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        let content = match extension.as_deref() {
            Some("srt") => self.to_srt(),
            Some("txt") => self.to_plain_text(),
            Some("json") => serde_json::to_string_pretty(&self.to_record())?,
            _ => {
                return Err(KoseiError::UnsupportedFormat(path.display().to_string()));
            }
        };

        tokio::fs::write(path, content).await?;
        info!("Saved {} segments to {}", self.segments.len(), path.display());
        Ok(())
    }
}

/// Split an SRT document into blocks separated by blank lines.
fn split_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Format a millisecond offset as an SRT time (HH:MM:SS,mmm).
pub fn format_srt_time(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let secs = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Parse `HH:MM:SS,mmm --> HH:MM:SS,mmm`. Tolerates `.` as the millisecond
/// separator and 1-2 digit second fields; millisecond fields must be exactly
/// three digits. Returns None on anything malformed.
fn parse_srt_timestamp(line: &str) -> Option<(u64, u64)> {
    let (start, end) = line.trim().split_once("-->")?;
    Some((parse_srt_time(start)?, parse_srt_time(end)?))
}

fn parse_srt_time(value: &str) -> Option<u64> {
    let value = value.trim();
    let (clock, millis) = value
        .rsplit_once(',')
        .or_else(|| value.rsplit_once('.'))?;

    let mut parts = clock.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes > 59 || seconds > 59 {
        return None;
    }

    // Millisecond fields are exactly three digits; anything else is not a
    // timestamp, no matter how plausibly it parses as a number.
    if millis.len() != 3 {
        warn!("Rejecting timestamp with malformed millisecond field: {}", value);
        return None;
    }
    let millis: u64 = millis.parse().ok()?;

    Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
}
