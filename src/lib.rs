//! Kosei - LLM-backed subtitle correction engine
//!
//! Corrects machine-transcribed, time-coded subtitles through an external
//! text-correction service while guaranteeing that segment count, order and
//! timing survive the pass, using validation/retry loops and diff-based
//! structural alignment repair.

pub mod cli;
pub mod config;
pub mod correct;
pub mod error;
pub mod transcript;
pub mod workflow;
