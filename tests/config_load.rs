//! Integration test: configuration loading and the shipped template.

use std::path::Path;

use chattail::config::Config;

#[tokio::test]
async fn template_config_parses() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates/prod.conf");
    let cfg = Config::load(&path)
        .await
        .unwrap_or_else(|e| panic!("{} failed to load: {e:#}", path.display()));

    assert!(!cfg.contacts.is_empty(), "expected at least one contact");
    assert_eq!(cfg.catalog().list(), vec!["access", "auth", "syslog"]);
    assert_eq!(cfg.tail.poll_interval_ms, 1000);
}

#[tokio::test]
async fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join("prod.conf")).await.unwrap_err();
    assert!(
        format!("{err:#}").contains("failed to read config file"),
        "unexpected error: {err:#}"
    );
}

#[tokio::test]
async fn unknown_top_level_field_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.conf");
    std::fs::write(
        &path,
        "credentials: {}\ncontacts: []\nfiles: {}\nfoo_unknown: true\n",
    )
    .unwrap();

    let result = Config::load(&path).await;
    assert!(
        result.is_err(),
        "expected error for unknown field, got Ok"
    );
}

#[tokio::test]
async fn malformed_yaml_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.conf");
    std::fs::write(&path, "[Credentials]\njid = bot@example.org\n").unwrap();
    assert!(Config::load(&path).await.is_err());
}

#[test]
fn build_adapter_wires_contacts_and_catalog() {
    let cfg = Config::from_yaml(
        "credentials:\n  token: t\ncontacts: [\"1\", \"2\"]\nfiles:\n  a: /tmp/a.log\n",
    )
    .unwrap();
    let replier = std::sync::Arc::new(chattail::comm::RecordingReplier::new());
    let adapter = chattail::build_adapter(&cfg, replier);
    assert_eq!(adapter.registry().contacts(), ["1", "2"]);
    assert_eq!(adapter.dispatcher().tails().catalog().list(), vec!["a"]);
}
