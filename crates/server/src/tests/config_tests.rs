use super::*;

use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn empty_database_url_falls_back_to_default() {
    assert_eq!(normalize_database_url("   "), Settings::default().database_url);
}

#[test]
fn memory_database_url_is_left_alone() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(sqlite_path("sqlite::memory:"), None);
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();

    let temp_root = env::temp_dir().join(format!("talkboard_server_test_{suffix}"));
    let db_path = temp_root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.join("data").exists());

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn file_settings_override_defaults() {
    let mut settings = Settings::default();
    apply_file_overrides(
        &mut settings,
        r#"
        bind_addr = "0.0.0.0:9000"
        database_url = "sqlite://./other.db"
        event_capacity = 16
        "#,
    );
    assert_eq!(
        settings,
        Settings {
            server_bind: "0.0.0.0:9000".into(),
            database_url: "sqlite://./other.db".into(),
            event_capacity: 16,
        }
    );
}

#[test]
fn unparsable_file_settings_are_ignored() {
    let mut settings = Settings::default();
    apply_file_overrides(&mut settings, "bind_addr = [unterminated");
    assert_eq!(settings, Settings::default());
}

#[test]
fn prefixed_env_vars_win_over_bare_names() {
    let mut settings = Settings::default();
    let env: HashMap<&str, &str> = [
        ("SERVER_BIND", "127.0.0.1:1"),
        ("APP__BIND_ADDR", "127.0.0.1:2"),
        ("DATABASE_URL", "sqlite://./bare.db"),
        ("APP__EVENT_CAPACITY", "0"),
    ]
    .into_iter()
    .collect();

    apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.server_bind, "127.0.0.1:2");
    assert_eq!(settings.database_url, "sqlite://./bare.db");
    assert_eq!(settings.event_capacity, 1);
}
