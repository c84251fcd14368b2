mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use songwatch::errors::SongwatchError;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        _ if cli.quiet => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = match cli.command {
        cli::Commands::Watch(args) => cli::watch::handle_watch(args, cli.quiet).await,
        cli::Commands::Replay(args) => cli::replay::handle_replay(args, cli.quiet).await,
        cli::Commands::Backoff(args) => cli::backoff::handle_backoff(args).await,
        cli::Commands::Validate(args) => handle_validate(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let exit_code = match &e {
            SongwatchError::Config(_) | SongwatchError::Yaml(_) => 2,
            SongwatchError::Transport(_) | SongwatchError::Closed(_) | SongwatchError::Timeout(_) => 3,
            SongwatchError::Authentication(_) => 4,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}

async fn handle_validate(args: cli::commands::ValidateArgs) -> Result<(), SongwatchError> {
    let path = std::path::PathBuf::from(&args.config);
    let config = songwatch::config::parse_config(&path).await?;
    let settings = songwatch::config::MonitorSettings::from_config(&config);
    println!("Configuration is valid: {}", args.config);
    println!("  url: {}", settings.url);
    println!("  max_events: {}", settings.max_events);
    println!("  max_reconnect_attempts: {}", settings.backoff.max_attempts);
    Ok(())
}
