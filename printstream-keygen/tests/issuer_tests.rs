use pretty_assertions::assert_eq;
use printstream_keygen::{IssuanceLog, IssuedKey, Issuer, IssuerError, MAX_ISSUE_DAYS};
use printstream_license::KeyCodec;

fn issuer_in(dir: &tempfile::TempDir) -> Issuer {
    Issuer::new(
        KeyCodec::default(),
        IssuanceLog::new(dir.path().join("data").join("licenses.json")),
    )
}

#[test]
fn issued_keys_validate_in_the_application_codec() {
    let dir = tempfile::tempdir().unwrap();
    let issuer = issuer_in(&dir);
    let record = issuer.issue("acme", 365).unwrap();

    let validation = KeyCodec::default().validate_key(&record.license_key);
    assert!(validation.valid);
    assert_eq!(validation.days, Some(365));
    assert_eq!(record.customer_id, "acme");
}

#[test]
fn issuance_is_deterministic_per_customer_and_days() {
    let dir = tempfile::tempdir().unwrap();
    let issuer = issuer_in(&dir);
    let a = issuer.issue("acme", 30).unwrap();
    let b = issuer.issue("acme", 30).unwrap();
    let c = issuer.issue("globex", 30).unwrap();
    assert_eq!(a.license_key, b.license_key);
    assert_ne!(a.license_key, c.license_key);
    assert_eq!(a.license_key, KeyCodec::default().generate_key(30, "acme"));
}

#[test]
fn log_is_appended_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let issuer = issuer_in(&dir);
    assert!(issuer.list().unwrap().is_empty());

    issuer.issue("acme", 30).unwrap();
    issuer.issue("globex", 90).unwrap();

    let records = issuer.list().unwrap();
    let summary: Vec<(&str, u32)> = records
        .iter()
        .map(|r| (r.customer_id.as_str(), r.days))
        .collect();
    assert_eq!(summary, vec![("acme", 30), ("globex", 90)]);
    assert!(records[0].issued_at <= records[1].issued_at);
}

#[test]
fn log_survives_a_new_issuer() {
    let dir = tempfile::tempdir().unwrap();
    issuer_in(&dir).issue("acme", 30).unwrap();
    assert_eq!(issuer_in(&dir).list().unwrap().len(), 1);
}

#[test]
fn log_file_uses_camel_case_fields() {
    let dir = tempfile::tempdir().unwrap();
    let issuer = issuer_in(&dir);
    issuer.issue("acme", 7).unwrap();

    let raw = std::fs::read_to_string(issuer.log().path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let first = &value[0];
    assert_eq!(first["customerId"], "acme");
    assert_eq!(first["days"], 7);
    assert!(first["licenseKey"].is_string());
    assert!(first["generatedAt"].is_string());
}

#[test]
fn legacy_issued_at_field_is_accepted() {
    let raw = r#"{"customerId":"acme","days":30,"licenseKey":"abcd-1eef-0000-0000","issuedAt":"2024-01-01T00:00:00Z"}"#;
    let record: IssuedKey = serde_json::from_str(raw).unwrap();
    assert_eq!(record.days, 30);
}

#[test]
fn invalid_requests_are_rejected_without_logging() {
    let dir = tempfile::tempdir().unwrap();
    let issuer = issuer_in(&dir);

    assert!(matches!(issuer.issue("   ", 30), Err(IssuerError::EmptyCustomer)));
    for days in [0, -5, i64::from(MAX_ISSUE_DAYS) + 1] {
        assert!(matches!(
            issuer.issue("acme", days),
            Err(IssuerError::InvalidDays { .. })
        ));
    }
    assert!(issuer.list().unwrap().is_empty());
}

#[test]
fn customer_id_is_trimmed() {
    let dir = tempfile::tempdir().unwrap();
    let record = issuer_in(&dir).issue("  acme \n", 30).unwrap();
    assert_eq!(record.customer_id, "acme");
    assert_eq!(record.license_key, KeyCodec::default().generate_key(30, "acme"));
}

#[test]
fn corrupt_log_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("licenses.json");
    std::fs::write(&path, "{not json").unwrap();
    let issuer = Issuer::new(KeyCodec::default(), IssuanceLog::new(&path));
    assert!(matches!(issuer.list(), Err(IssuerError::Serialization(_))));
    assert!(issuer.issue("acme", 30).is_err());
}
