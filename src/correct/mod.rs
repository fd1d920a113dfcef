// Subtitle correction engine
//
// The pipeline treats the correction service as an unreliable collaborator:
// batches are validated and retried individually (batch.rs), realigned after
// acceptance (aligner.rs), and merged under a strict completeness guarantee
// (Corrector below) so one failing batch never poisons the run.

pub mod aligner;
pub mod batch;
pub mod chunker;
pub mod service;
pub mod validator;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub use batch::BatchCorrector;
pub use service::{ChatMessage, CorrectionService, OpenAiChatService};
pub use validator::Validation;

use crate::config::CorrectConfig;
use crate::error::Result;
use crate::transcript::{Segment, Transcript};

/// Concurrent batch dispatcher. Owns the shared service handle, a bounded
/// worker pool and the stop flag; per-batch failures are isolated by merging
/// the original batch back in, so a full run always yields a transcript
/// covering every original segment.
pub struct Corrector {
    service: Arc<dyn CorrectionService>,
    config: CorrectConfig,
    stopped: Arc<AtomicBool>,
}

impl Corrector {
    pub fn new(service: Arc<dyn CorrectionService>, config: CorrectConfig) -> Self {
        Self {
            service,
            config,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Correct a transcript. The input is never mutated; the returned
    /// transcript keeps every segment's timing and substitutes corrected
    /// texts where a batch succeeded.
    pub async fn correct(
        &self,
        transcript: &Transcript,
        reference: Option<&str>,
    ) -> Result<Transcript> {
        let positions = transcript.positions();
        if positions.is_empty() {
            return Ok(transcript.clone());
        }

        let batches = chunker::split_batches(&positions, self.config.batch_size);
        info!(
            "Correcting {} segments in {} batches (concurrency {})",
            positions.len(),
            batches.len(),
            self.config.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let reference: Option<Arc<str>> = reference.map(Arc::from);
        let mut tasks = JoinSet::new();

        for chunk in batches {
            let service = Arc::clone(&self.service);
            let config = self.config.clone();
            let semaphore = Arc::clone(&semaphore);
            let reference = reference.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("semaphore is never closed");
                let corrector = BatchCorrector::new(service, config);
                let result = corrector.run(&chunk, reference.as_deref()).await;
                (chunk, result)
            });
        }

        let mut merged: BTreeMap<usize, String> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            if self.stopped.load(Ordering::SeqCst) {
                warn!("Stop requested, discarding remaining correction results");
                tasks.abort_all();
            }

            match joined {
                Ok((chunk, result)) => {
                    let stopped = self.stopped.load(Ordering::SeqCst);
                    match result {
                        Ok(corrected) if !stopped => {
                            debug!("Merged corrected batch of {} segments", corrected.len());
                            merged.extend(corrected);
                        }
                        Ok(_) => merged.extend(chunk),
                        Err(e) => {
                            warn!("Batch correction failed, keeping original texts: {}", e);
                            merged.extend(chunk);
                        }
                    }
                }
                Err(e) => {
                    // The chunk is lost with the panicked/cancelled task; the
                    // rebuild below falls back to original texts for it.
                    warn!("Batch task did not complete: {}", e);
                }
            }
        }

        if merged.len() != positions.len() {
            warn!(
                "Merged {} of {} positions; uncovered positions keep their original text",
                merged.len(),
                positions.len()
            );
        }

        let segments = transcript
            .segments()
            .iter()
            .enumerate()
            .map(|(i, seg)| {
                let text = merged
                    .get(&(i + 1))
                    .cloned()
                    .unwrap_or_else(|| seg.text.clone());
                Segment::new(text, seg.start_ms, seg.end_ms)
            })
            .collect();

        Ok(Transcript::new(segments))
    }

    /// Request shutdown. Idempotent; results completing after the call are
    /// discarded in favor of the original texts and unfinished batch tasks
    /// are aborted on the next collection step (or when the set is dropped).
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("Corrector stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for Corrector {
    fn drop(&mut self) {
        self.stop();
    }
}
