use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use songwatch::config::{parse_config, MonitorSettings};
use songwatch::errors::SongwatchError;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("songwatch.yaml");
    fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn test_file_settings_override_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
connection:
  url: wss://studio.example.com/ws/events
  base_delay_ms: 500
  max_delay_ms: 8000
  max_reconnect_attempts: 0
  jitter_ms: 250
stream:
  max_events: 40
"#,
    );

    let config = parse_config(&path).await.unwrap();
    let settings = MonitorSettings::from_config(&config);
    assert_eq!(settings.url, "wss://studio.example.com/ws/events");
    assert_eq!(settings.backoff.base_delay, Duration::from_millis(500));
    assert_eq!(settings.backoff.max_delay, Duration::from_millis(8000));
    assert_eq!(settings.backoff.max_attempts, 0);
    assert_eq!(settings.backoff.jitter, Duration::from_millis(250));
    assert_eq!(settings.max_events, 40);
    assert_eq!(settings.total_expected_nodes, 9);
    assert!(!settings.backoff.attempts_exhausted(1_000));
}

#[tokio::test]
async fn test_empty_file_is_all_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let config = parse_config(&path).await.unwrap();
    assert_eq!(MonitorSettings::from_config(&config), MonitorSettings::default());
}

#[tokio::test]
async fn test_inverted_delays_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "connection:\n  base_delay_ms: 20000\n  max_delay_ms: 1000\n");

    let err = parse_config(&path).await.unwrap_err();
    assert!(matches!(err, SongwatchError::Config(_)));
    assert!(!err.classify().retryable);
}

#[tokio::test]
async fn test_invalid_yaml_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "connection: [unterminated\n");

    let err = parse_config(&path).await.unwrap_err();
    assert!(matches!(err, SongwatchError::Yaml(_)));
}

#[tokio::test]
async fn test_oversized_file_rejected() {
    let dir = TempDir::new().unwrap();
    let padding = format!("# {}\n", "x".repeat(1_100_000));
    let path = write_config(&dir, &padding);

    let err = parse_config(&path).await.unwrap_err();
    assert!(err.to_string().contains("1MB"));
}

#[test]
fn test_cli_overrides_win() {
    let settings = MonitorSettings::default()
        .with_overrides(Some("ws://127.0.0.1:9000/events".into()), Some(0));
    assert_eq!(settings.url, "ws://127.0.0.1:9000/events");
    assert_eq!(settings.max_events, 1);
}
