//! CLI integration tests for sqlgate admin commands.
//!
//! Each test uses an isolated temp directory for the data directory, so
//! tests can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;
use sqlgate::store::{SqliteStore, Store};

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("sqlgate").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        cmd
    }

    fn init(&self, email: &str, password: &str) -> assert_cmd::assert::Assert {
        self.cmd()
            .args([
                "admin",
                "init",
                "--data-dir",
                &self.data_dir_str(),
                "--email",
                email,
                "--password",
                password,
                "--non-interactive",
            ])
            .assert()
    }
}

#[test]
fn test_init_creates_admin_and_secrets() {
    let ctx = TestContext::new();

    ctx.init("root@example.com", "admin-pass-123")
        .success()
        .stdout(predicate::str::contains("Admin user created: root@example.com"));

    let dir = ctx.data_dir();
    assert!(dir.join("sqlgate.db").exists());
    assert!(dir.join("engine").join("catalog.db").exists());
    assert!(dir.join("backups").is_dir());

    for key in [".session_key", ".credential_key"] {
        let content = std::fs::read_to_string(dir.join(key)).unwrap();
        assert!(!content.trim().is_empty(), "{key} is empty");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.join(key)).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{key} should be owner-only");
        }
    }

    let store = SqliteStore::new(dir.join("sqlgate.db")).unwrap();
    assert!(store.has_admin_user().unwrap());
    let admin = store.get_user_by_email("root@example.com").unwrap().unwrap();
    assert!(admin.role.is_admin());
}

#[test]
fn test_init_twice_fails() {
    let ctx = TestContext::new();
    ctx.init("root@example.com", "admin-pass-123").success();

    let key_before = std::fs::read_to_string(ctx.data_dir().join(".credential_key")).unwrap();

    ctx.init("other@example.com", "admin-pass-456")
        .failure()
        .stderr(predicate::str::contains("already initialized"));

    let key_after = std::fs::read_to_string(ctx.data_dir().join(".credential_key")).unwrap();
    assert_eq!(key_before, key_after);
}

#[test]
fn test_init_non_interactive_requires_credentials() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args([
            "admin",
            "init",
            "--data-dir",
            &ctx.data_dir_str(),
            "--non-interactive",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--email is required"));
}

#[test]
fn test_init_rejects_weak_password() {
    let ctx = TestContext::new();

    ctx.init("root@example.com", "short")
        .failure()
        .stderr(predicate::str::contains("at least 8 characters"));
}

#[test]
fn test_serve_refuses_without_init() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args([
            "serve",
            "--data-dir",
            &ctx.data_dir_str(),
            "--port",
            "0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sqlgate admin init"));
}

#[test]
fn test_serve_rejects_bad_config_file() {
    let ctx = TestContext::new();
    let config = ctx.data_dir().join("sqlgate.toml");
    std::fs::write(&config, "[engine]\npool_size = 0\n").unwrap();

    ctx.cmd()
        .args(["serve", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("pool_size"));
}
