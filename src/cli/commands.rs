use clap::{Parser, Subcommand, Args};

#[derive(Parser)]
#[command(name = "songwatch", version, about = "Live progress monitor for song-design workflow runs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow a workflow run over the live event stream
    Watch(WatchArgs),
    /// Project progress from a recorded NDJSON event log
    Replay(ReplayArgs),
    /// Print the reconnect backoff schedule
    Backoff(BackoffArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct WatchArgs {
    /// Workflow run to follow
    pub run_id: String,

    /// Event stream URL (ws:// or wss://)
    #[arg(short, long)]
    pub url: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Events kept per run
    #[arg(long)]
    pub max_events: Option<usize>,

    /// Print every event as a log line
    #[arg(long)]
    pub events: bool,

    /// Keep watching after the run completes or fails
    #[arg(long)]
    pub follow: bool,
}

#[derive(Args, Clone)]
pub struct ReplayArgs {
    /// NDJSON file with one workflow event per line
    pub file: String,

    /// Only replay this run (defaults to the first run in the file)
    #[arg(long)]
    pub run_id: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Events kept per run
    #[arg(long)]
    pub max_events: Option<usize>,

    /// Output the progress view as JSON
    #[arg(long)]
    pub json: bool,

    /// Print every buffered event before the summary
    #[arg(long)]
    pub events: bool,
}

#[derive(Args, Clone)]
pub struct BackoffArgs {
    /// Number of attempts to show
    #[arg(long, default_value = "8")]
    pub attempts: u32,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}
