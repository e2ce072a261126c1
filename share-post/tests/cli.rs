//! CLI integration tests for share-post

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

/// Write a config whose Twitter endpoints point at `base_url`
fn setup_test_env(base_url: &str, with_account: bool) -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let accounts_path = temp_dir.path().join("accounts.toml");

    let config_content = format!(
        r#"
[accounts]
path = "{accounts}"

[twitter]
consumer_key = "consumer-key"
consumer_secret = "consumer-secret"
update_url = "{base}/1/statuses/update.xml"
upload_url = "{base}/1/statuses/update_with_media.xml"
"#,
        accounts = escape_path_for_toml(&accounts_path),
        base = base_url,
    );
    fs::write(&config_path, config_content).unwrap();

    if with_account {
        fs::write(
            &accounts_path,
            r#"
[[services.twitter]]
username = "alice"

[services.twitter.properties]
oauth_token = "access-token"
oauth_token_secret = "access-secret"
screen_name = "alice"
"#,
        )
        .unwrap();
    }

    (temp_dir, config_path.to_string_lossy().to_string())
}

fn share_post() -> Command {
    let mut cmd = Command::cargo_bin("share-post").unwrap();
    cmd.env_remove("SHAREKIT_CONFIG")
        .env_remove("SHAREKIT_TWITTER_CONSUMER_KEY")
        .env_remove("SHAREKIT_TWITTER_CONSUMER_SECRET");
    cmd
}

#[test]
fn test_help_flag_output() {
    share_post()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Share text, links and images"))
        .stdout(predicate::str::contains("--link"))
        .stdout(predicate::str::contains("--image"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_dry_run_reports_length() {
    let (_dir, config) = setup_test_env("http://127.0.0.1:9", false);

    share_post()
        .args(["--config", &config, "--dry-run", "hello", "--link", "https://example.com/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Twitter: 27 characters (113 remaining)"));
}

#[test]
fn test_dry_run_json_output() {
    let (_dir, config) = setup_test_env("http://127.0.0.1:9", false);

    let output = share_post()
        .args(["--config", &config, "--dry-run", "--format", "json", "hi"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["service"], "twitter");
    assert_eq!(json["text_length"], 2);
    assert_eq!(json["remaining"], 138);
}

#[test]
fn test_dry_run_over_limit_reports_then_fails() {
    let (_dir, config) = setup_test_env("http://127.0.0.1:9", false);
    let text = "x".repeat(141);

    share_post()
        .args(["--config", &config, "--dry-run", &text])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("Twitter: 141 characters (-1 remaining)"))
        .stderr(predicate::str::contains("140 character limit"));
}

#[test]
fn test_text_from_stdin() {
    let (_dir, config) = setup_test_env("http://127.0.0.1:9", false);

    share_post()
        .args(["--config", &config, "--dry-run"])
        .write_stdin("from stdin\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("10 characters"));
}

#[test]
fn test_text_too_long_exits_3() {
    let (_dir, config) = setup_test_env("http://127.0.0.1:9", false);
    let text = "x".repeat(141);

    share_post()
        .args(["--config", &config, &text])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Share Error: Invalid input"))
        .stderr(predicate::str::contains("140 character limit"));
}

#[test]
fn test_unknown_service_exits_3() {
    let (_dir, config) = setup_test_env("http://127.0.0.1:9", false);

    share_post()
        .args(["--config", &config, "--service", "myspace", "hello"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unsupported service"));
}

#[test]
fn test_missing_account_exits_2() {
    let (_dir, config) = setup_test_env("http://127.0.0.1:9", false);

    share_post()
        .args(["--config", &config, "hello"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("share-auth"));
}

#[test]
fn test_missing_config_file_exits_1() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    share_post()
        .args(["--config", &missing.to_string_lossy(), "hello"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_share_against_mock_server() {
    let server = MockServer::start();
    let update = server.mock(|when, then| {
        when.method(POST)
            .path("/1/statuses/update.xml")
            .header_exists("authorization")
            .body("status=hello+world");
        then.status(200).body("<status><id>7</id></status>");
    });
    let (_dir, config) = setup_test_env(&server.base_url(), true);

    share_post()
        .args(["--config", &config, "--format", "json", "hello world"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\":\"done\""))
        .stdout(predicate::str::contains("\"account\":\"alice\""));

    update.assert();
}

#[test]
fn test_unexpected_response_exits_1() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/1/statuses/update.xml");
        then.status(200).body("ok");
    });
    let (_dir, config) = setup_test_env(&server.base_url(), true);

    share_post()
        .args(["--config", &config, "hello"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Share Error: Service error: Twitter did not return the expected response.",
        ));
}

#[test]
fn test_unreadable_image_exits_3() {
    let (dir, config) = setup_test_env("http://127.0.0.1:9", true);
    let image = dir.path().join("missing.png");

    share_post()
        .args(["--config", &config, "--image", &image.to_string_lossy(), "pic"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Failed to read image"));
}
