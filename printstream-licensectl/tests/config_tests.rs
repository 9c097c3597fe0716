use printstream_license::{KeyCodec, LicenseState};
use printstream_licensectl::{Clock, LicenseCtlConfig, open_engine};
use std::path::PathBuf;

#[test]
fn defaults_use_network_time() {
    let cfg = LicenseCtlConfig::default();
    assert_eq!(cfg.database, PathBuf::from("printstream.db"));
    assert!(!cfg.offline);
    assert_eq!(cfg.time.timeout_ms, 5_000);
    assert_eq!(cfg.engine.trial_days, 30);
    assert!(matches!(Clock::from_config(&cfg), Clock::Network(_)));
}

#[test]
fn partial_config_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("licensectl.json");
    std::fs::write(
        &path,
        r#"{"database": "/var/lib/printstream/app.db", "time": {"timeout_ms": 1500}, "offline": true}"#,
    )
    .unwrap();

    let cfg = LicenseCtlConfig::load(&path).unwrap();
    assert_eq!(cfg.database, PathBuf::from("/var/lib/printstream/app.db"));
    assert_eq!(cfg.time.timeout_ms, 1500);
    assert!(!cfg.time.providers.is_empty());
    assert_eq!(cfg.engine.upgrade_runway_days, 30);
    assert!(matches!(Clock::from_config(&cfg), Clock::Local(_)));
}

#[test]
fn missing_or_broken_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    assert!(LicenseCtlConfig::load(&missing).is_err());

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{").unwrap();
    assert!(LicenseCtlConfig::load_or_default(Some(broken.as_path())).is_err());
    assert!(LicenseCtlConfig::load_or_default(None).is_ok());
}

#[tokio::test]
async fn offline_engine_runs_startup_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = LicenseCtlConfig {
        database: dir.path().join("app.db"),
        offline: true,
        ..LicenseCtlConfig::default()
    };

    let engine = open_engine(&cfg).unwrap();
    assert!(!engine.check_and_update_version("1.0.0").await);
    let check = engine.check_license().await;
    assert_eq!(check.state, LicenseState::Trial);
    assert!(check.is_valid);

    let key = KeyCodec::default().generate_key(365, "acme");
    assert!(engine.extend_license(&key).await);
    drop(engine);

    let engine = open_engine(&cfg).unwrap();
    assert!(!engine.extend_license(&key).await);
    assert_eq!(engine.check_license().await.state, LicenseState::Licensed);
    assert_eq!(engine.store().used_keys().unwrap().len(), 1);
}
