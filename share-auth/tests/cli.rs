//! CLI integration tests for share-auth

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn escape_path_for_toml(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

/// Returns the temp dir, the config path and the accounts path
fn setup_test_env(base_url: &str) -> (TempDir, String, PathBuf) {
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
request_token_url = "{base}/oauth/request_token"
authorize_url = "{base}/oauth/authorize"
access_token_url = "{base}/oauth/access_token"
"#,
        accounts = escape_path_for_toml(&accounts_path),
        base = base_url,
    );
    fs::write(&config_path, config_content).unwrap();

    (
        temp_dir,
        config_path.to_string_lossy().to_string(),
        accounts_path,
    )
}

fn share_auth() -> Command {
    let mut cmd = Command::cargo_bin("share-auth").unwrap();
    cmd.env_remove("SHAREKIT_CONFIG")
        .env_remove("SHAREKIT_TWITTER_CONSUMER_KEY")
        .env_remove("SHAREKIT_TWITTER_CONSUMER_SECRET");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    share_auth()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("remove"));
}

#[test]
fn test_list_empty_store() {
    let (_dir, config, _accounts) = setup_test_env("http://127.0.0.1:9");

    share_auth()
        .args(["list", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains("No twitter accounts stored"));
}

#[test]
fn test_login_stores_account() {
    let server = MockServer::start();
    let request_token = server.mock(|when, then| {
        when.method(POST)
            .path("/oauth/request_token")
            .header_exists("authorization");
        then.status(200)
            .body("oauth_token=req-token&oauth_token_secret=req-secret&oauth_callback_confirmed=true");
    });
    let access_token = server.mock(|when, then| {
        when.method(POST)
            .path("/oauth/access_token")
            .header_exists("authorization");
        then.status(200).body(
            "oauth_token=acc-token&oauth_token_secret=acc-secret&user_id=42&screen_name=alice",
        );
    });
    let (_dir, config, accounts) = setup_test_env(&server.base_url());

    share_auth()
        .args(["login", "--config", &config])
        .write_stdin("123456\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("/oauth/authorize?oauth_token=req-token"))
        .stdout(predicate::str::contains("Authorized Twitter account 'alice'"));

    request_token.assert();
    access_token.assert();

    let stored = fs::read_to_string(&accounts).unwrap();
    assert!(stored.contains("alice"));
    assert!(stored.contains("acc-token"));

    share_auth()
        .args(["list", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains("twitter\talice"));

    share_auth()
        .args(["remove", "alice", "--config", &config])
        .assert()
        .success();

    share_auth()
        .args(["list", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains("No twitter accounts stored"));
}

#[test]
fn test_login_empty_pin_cancels() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/oauth/request_token");
        then.status(200)
            .body("oauth_token=req-token&oauth_token_secret=req-secret");
    });
    let access_token = server.mock(|when, then| {
        when.method(POST).path("/oauth/access_token");
        then.status(200)
            .body("oauth_token=acc-token&oauth_token_secret=acc-secret");
    });
    let (_dir, config, accounts) = setup_test_env(&server.base_url());

    share_auth()
        .args(["login", "--config", &config])
        .write_stdin("\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("Authorization cancelled"));

    access_token.assert_hits(0);
    assert!(!accounts.exists());
}

#[test]
fn test_login_rejected_exits_2() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/oauth/request_token");
        then.status(401).body("Invalid consumer key");
    });
    let (_dir, config, _accounts) = setup_test_env(&server.base_url());

    share_auth()
        .args(["login", "--config", &config])
        .write_stdin("123456\n")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Authentication failed"));
}

#[test]
fn test_remove_unknown_account_fails() {
    let (_dir, config, _accounts) = setup_test_env("http://127.0.0.1:9");

    share_auth()
        .args(["remove", "nobody", "--config", &config])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Account 'nobody' not found for twitter"));
}

#[cfg(unix)]
#[test]
fn test_ctrl_c_at_pin_prompt_exits() {
    use std::io::{BufRead, BufReader};
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/oauth/request_token");
        then.status(200)
            .body("oauth_token=req-token&oauth_token_secret=req-secret");
    });
    let access_token = server.mock(|when, then| {
        when.method(POST).path("/oauth/access_token");
        then.status(200)
            .body("oauth_token=acc-token&oauth_token_secret=acc-secret");
    });
    let (_dir, config, accounts) = setup_test_env(&server.base_url());

    // stdin stays open and silent, so the process sits at the PIN prompt
    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("share-auth"))
        .args(["login", "--config", &config])
        .env_remove("SHAREKIT_CONFIG")
        .env_remove("SHAREKIT_TWITTER_CONSUMER_KEY")
        .env_remove("SHAREKIT_TWITTER_CONSUMER_SECRET")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let stdout = child.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = lines.next().expect("authorize URL before EOF").unwrap();
        if line.contains("oauth_token=req-token") {
            break;
        }
    }

    let status = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(5);
    let exit = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break Some(exit);
        }
        if Instant::now() >= deadline {
            break None;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    if exit.is_none() {
        let _ = child.kill();
    }
    let exit = exit.expect("share-auth still running 5s after SIGINT");
    assert_eq!(exit.code(), Some(0));
    access_token.assert_hits(0);
    assert!(!accounts.exists());
}
