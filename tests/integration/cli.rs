//! Binary smoke tests

use assert_cmd::Command;

#[test]
fn test_help_lists_commands() {
    let output = Command::cargo_bin("stash-fetcher")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["leagues", "tabs", "characters", "import"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_import_without_credentials_fails() {
    let cache = tempfile::TempDir::new().unwrap();
    Command::cargo_bin("stash-fetcher")
        .unwrap()
        .env_remove("POE_ACCOUNT")
        .env_remove("POESESSID")
        .args(["--cache-dir"])
        .arg(cache.path())
        .args(["import", "--league", "Standard"])
        .assert()
        .failure();
}

#[test]
fn test_tabs_requires_league() {
    Command::cargo_bin("stash-fetcher")
        .unwrap()
        .arg("tabs")
        .assert()
        .failure();
}
