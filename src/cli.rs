use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Correct a single subtitle file
    Correct {
        /// Input SRT file
        #[arg(short, long)]
        input: PathBuf,

        /// Output path; defaults to <input stem>.corrected.srt
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Text file with reference context passed to the correction service
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Correct all SRT files in a directory
    Batch {
        /// Input directory containing SRT files
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Output directory for corrected files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Text file with reference context passed to the correction service
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Convert a subtitle file between formats (srt, txt, json by extension)
    Convert {
        /// Input SRT file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file; format chosen by extension
        #[arg(short, long)]
        output: PathBuf,
    },
}
