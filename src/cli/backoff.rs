use console::style;

use songwatch::connection::BackoffPolicy;
use songwatch::errors::SongwatchError;
use songwatch::utils::formatting::format_duration;

use crate::cli::commands::BackoffArgs;
use crate::cli::load_settings;

pub async fn handle_backoff(args: BackoffArgs) -> Result<(), SongwatchError> {
    let settings = load_settings(args.config.as_deref()).await?;
    print!("{}", render_schedule(&settings.backoff, args.attempts));
    Ok(())
}

fn render_schedule(policy: &BackoffPolicy, attempts: u32) -> String {
    let mut out = format!("\n{}\n\n", style("Reconnect schedule:").white().bold());
    for (index, delay) in policy.schedule(attempts).iter().enumerate() {
        let attempt = index as u32 + 1;
        let marker = if policy.attempts_exhausted(attempt) {
            style("gives up").red().to_string()
        } else {
            format!("{}s countdown", policy.countdown_seconds(attempt))
        };
        out.push_str(&format!(
            "  {:>3}  {:>8}  {}\n",
            attempt,
            format_duration(delay.as_millis() as u64),
            style(marker).dim(),
        ));
    }

    let limit = if policy.max_attempts == 0 {
        "unlimited".to_string()
    } else {
        policy.max_attempts.to_string()
    };
    out.push_str(&format!("\n  {} {}\n", style("Max attempts:").dim(), limit));
    if !policy.jitter.is_zero() {
        out.push_str(&format!(
            "  {} up to {}\n",
            style("Jitter:").dim(),
            format_duration(policy.jitter.as_millis() as u64),
        ));
    }
    out
}
