use cloudframe::auth::{StoredToken, load_token, save_token};

#[test]
fn persisted_token_survives_a_fresh_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloudframe").join("token.json");

    // First run: the exchange step persists its token.
    let token = StoredToken {
        access_token: "ya29.first-run".to_string(),
        refresh_token: Some("1//refresh".to_string()),
        expires_at: Some(1_900_000_000),
        token_type: Some("Bearer".to_string()),
    };
    save_token(&path, &token).unwrap();

    // Subsequent run: loading succeeds, so the operator prompt is skipped.
    let reloaded = load_token(&path).unwrap();
    assert_eq!(reloaded, token);
}

#[test]
fn missing_cache_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = load_token(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.json"));
}

#[test]
fn overwrites_a_corrupt_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("token.json");
    std::fs::write(&path, "garbage").unwrap();
    assert!(load_token(&path).is_err());

    let token = StoredToken {
        access_token: "ya29.replacement".to_string(),
        refresh_token: None,
        expires_at: None,
        token_type: None,
    };
    save_token(&path, &token).unwrap();
    assert_eq!(load_token(&path).unwrap(), token);
}
