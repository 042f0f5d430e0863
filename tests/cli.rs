mod common;

use common::schedule_bot_bin;

#[test]
fn version_flag_prints_version() {
    let output = schedule_bot_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("schedule-bot {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn help_flag_lists_environment() {
    let output = schedule_bot_bin().arg("-h").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for needle in ["Usage: schedule-bot", "TELEGRAM_BOT_TOKEN", "DB_PATH", "LOG_LEVEL"] {
        assert!(stdout.contains(needle), "help is missing {needle}");
    }
}

#[test]
fn missing_token_fails_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let output = schedule_bot_bin()
        .current_dir(dir.path())
        .env_remove("TELEGRAM_BOT_TOKEN")
        .env("SCHEDULE_BOT_CONFIG", dir.path().join("absent.toml"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("token"), "unexpected stderr: {stderr}");
}
