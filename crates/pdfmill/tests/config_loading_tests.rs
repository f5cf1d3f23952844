//! Loading configuration files from disk.

use std::path::Path;

use tempfile::TempDir;

use pdfmill::config::{load_config, parse_sweep_time};
use pdfmill::pipeline::PipelineConfig;
use pdfmill::worker::DispatchSettings;
use pdfmill::ConfigError;

fn write(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_minimal_config_gets_defaults() {
    let dir = TempDir::new().unwrap();
    let instance = dir.path().join("instance");
    let path = write(
        dir.path(),
        &format!(
            r#"{{"version": "1.0", "instance_path": "{}"}}"#,
            instance.display()
        ),
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.timezone, "Asia/Shanghai");
    assert_eq!(config.app_url, "http://localhost:5000");
    assert_eq!(config.database_path(), instance.join("pdfmill.db"));
    assert!(config.worker_count >= 1);

    let pipeline = PipelineConfig::from_config(&config).unwrap();
    assert_eq!(pipeline.timezone, chrono_tz::Asia::Shanghai);
    assert_eq!(pipeline.limits.max_file_size, 200 * 1024 * 1024);
    assert!(!pipeline.notify_on_failure);

    let dispatch = DispatchSettings::from(&config.dispatch);
    assert_eq!(dispatch.max_retries, 2);
}

#[test]
fn test_full_config_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        r#"{
            "version": "1.0",
            "instance_path": "/srv/pdfmill",
            "database_path": "/var/lib/pdfmill/tasks.db",
            "timezone": "Europe/Berlin",
            "app_url": "https://mill.example.com",
            "worker_count": 2,
            "dispatch": { "max_retries": 0, "retry_backoff_ms": 250, "poll_interval_ms": 500, "queue_capacity": 8 },
            "limits": { "max_file_size": 1048576, "max_pages": 50, "max_page_ratio": 3.5 },
            "download": { "timeout_secs": 30 },
            "engine": { "program": "/opt/mineru/bin/mineru", "args": ["--device", "cuda:0"] },
            "webhook": { "timeout_secs": 3, "notify_on_failure": true },
            "retention": { "archive_keep_days": 14, "workdir_keep_days": 1, "archive_sweep_at": "02:15", "workdir_sweep_at": "02:45" }
        }"#,
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.worker_count, 2);
    assert_eq!(config.engine.args, vec!["--device", "cuda:0"]);
    assert_eq!(config.retention.archive_keep_days, 14);
    assert_eq!(
        config.database_path(),
        Path::new("/var/lib/pdfmill/tasks.db")
    );

    let pipeline = PipelineConfig::from_config(&config).unwrap();
    assert_eq!(pipeline.limits.max_pages, 50);
    assert!(pipeline.notify_on_failure);

    let at = parse_sweep_time("retention.archive_sweep_at", &config.retention.archive_sweep_at)
        .unwrap();
    assert_eq!(at.format("%H:%M").to_string(), "02:15");
}

#[test]
fn test_unknown_timezone_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        r#"{"version": "1.0", "instance_path": "/srv/pdfmill", "timezone": "Mars/Olympus"}"#,
    );
    assert!(matches!(
        load_config(&path),
        Err(ConfigError::InvalidTimezone(_))
    ));
}

#[test]
fn test_unknown_keys_fail_schema() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        r#"{"version": "1.0", "instance_path": "/srv/pdfmill", "ocr": {"enabled": true}}"#,
    );
    assert!(matches!(
        load_config(&path),
        Err(ConfigError::SchemaValidation { .. })
    ));
}

#[test]
fn test_missing_file_reports_path() {
    let err = load_config("/definitely/not/here/config.json").unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
    assert!(err.to_string().contains("/definitely/not/here/config.json"));
}
