use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "doc-transcribe")]
#[command(author, version, about = "Crash-resumable document image transcription")]
pub struct Cli {
    /// Directory containing the source images; omit with --clean to only
    /// clean existing transcripts
    #[arg(required_unless_present = "clean")]
    pub input_path: Option<PathBuf>,

    /// Discard all tracking state and start over
    #[arg(long, requires = "input_path")]
    pub new: bool,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Strip model boilerplate from transcripts (after the run, if any)
    #[arg(long)]
    pub clean: bool,

    /// Transcript directory to clean instead of the work dir's
    #[arg(long, value_name = "DIR", requires = "clean")]
    pub clean_dir: Option<PathBuf>,
}
