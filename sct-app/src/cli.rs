use clap::Parser;
use std::path::PathBuf;

/// Stop-change reaction-time task.
#[derive(Debug, Parser)]
#[command(name = "stop-change-task", version)]
pub struct Args {
    /// Participant identifier, used in output file names.
    #[arg(long, default_value = "000000")]
    pub participant: String,

    /// Session label.
    #[arg(long, default_value = "001")]
    pub session: String,

    /// Directory for per-trial logs.
    #[arg(long, default_value = "data")]
    pub output: PathBuf,

    /// Task parameter file (JSON). Built-in defaults when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seed for trial-order shuffles. Random when omitted.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip the practice phase.
    #[arg(long)]
    pub no_practice: bool,

    /// Run in a window instead of borderless fullscreen.
    #[arg(long)]
    pub windowed: bool,
}
