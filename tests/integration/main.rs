//! Integration tests for pipecache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn pipecache() -> Command {
        cargo_bin_cmd!("pipecache")
    }

    /// Command isolated from the user's config and any local config
    fn isolated(config_dir: &TempDir) -> Command {
        let mut cmd = pipecache();
        cmd.env_remove("PIPECACHE_STORE_COMMAND")
            .env_remove("PIPECACHE_RETRIEVE_COMMAND")
            .args(["--no-local", "--config"])
            .arg(config_dir.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        pipecache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("command-driven build artifact cache"));
    }

    #[test]
    fn version_displays() {
        pipecache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("pipecache"));
    }

    #[test]
    fn config_path() {
        pipecache()
            .args(["config", "path"])
            .env_remove("PIPECACHE_CONFIG")
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let config_dir = TempDir::new().unwrap();
        isolated(&config_dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn config_set_then_show() {
        let config_dir = TempDir::new().unwrap();
        isolated(&config_dir)
            .args(["config", "set", "cache.shell", "bash"])
            .assert()
            .success();

        isolated(&config_dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("shell = \"bash\""));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let config_dir = TempDir::new().unwrap();
        isolated(&config_dir)
            .args(["config", "set", "cache.bogus", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn key_from_inputs() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("BUILD");
        fs::write(&input, "genrule(name = 'app')").unwrap();

        pipecache()
            .args(["key", "--inputs"])
            .arg(&input)
            .assert()
            .success()
            .stdout(predicate::str::is_match("^[0-9a-f]{64}\n$").unwrap());
    }

    #[test]
    fn invalid_key_rejected() {
        let config_dir = TempDir::new().unwrap();
        isolated(&config_dir)
            .args(["--retrieve-command", "cat /dev/null"])
            .args(["retrieve", "--out-dir", "out", "--key", "not-hex"])
            .assert()
            .failure();
    }

    #[test]
    fn retrieve_without_command_fails() {
        let config_dir = TempDir::new().unwrap();
        isolated(&config_dir)
            .args(["retrieve", "--out-dir", "out", "--key", "cafe"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No retrieve command configured"));
    }

    #[test]
    fn store_without_command_succeeds() {
        let config_dir = TempDir::new().unwrap();
        isolated(&config_dir)
            .args(["store", "--out-dir", "out", "--key", "cafe", "--", "app.bin"])
            .assert()
            .success();
    }

    #[cfg(unix)]
    #[test]
    fn retrieve_miss_fails() {
        let config_dir = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        isolated(&config_dir)
            .args(["--retrieve-command", "exit 1"])
            .args(["retrieve", "--out-dir", "out", "--key", "cafe", "--root"])
            .arg(workspace.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cache miss"));
    }

    #[cfg(unix)]
    #[test]
    fn store_then_retrieve_round_trip() {
        let config_dir = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();

        let out_dir = workspace.path().join("plz-out/gen/app");
        fs::create_dir_all(out_dir.join("assets")).unwrap();
        fs::write(out_dir.join("app.bin"), b"\x7fELF binary").unwrap();
        fs::write(out_dir.join("assets/logo.svg"), "<svg/>").unwrap();

        let store_command = format!("cat > '{}'/\"$CACHE_KEY\".tar", store.path().display());
        let retrieve_command = format!("cat '{}'/\"$CACHE_KEY\".tar", store.path().display());

        isolated(&config_dir)
            .args(["--store-command", &store_command])
            .args(["store", "--out-dir", "plz-out/gen/app", "--key", "beef", "--root"])
            .arg(workspace.path())
            .args(["--", "app.bin", "assets"])
            .assert()
            .success();
        assert!(store.path().join("beef.tar").is_file());

        fs::remove_dir_all(workspace.path().join("plz-out")).unwrap();

        isolated(&config_dir)
            .args(["--retrieve-command", &retrieve_command])
            .args(["retrieve", "--out-dir", "plz-out/gen/app", "--key", "beef", "--root"])
            .arg(workspace.path())
            .assert()
            .success();

        assert_eq!(fs::read(out_dir.join("app.bin")).unwrap(), b"\x7fELF binary");
        assert_eq!(
            fs::read_to_string(out_dir.join("assets/logo.svg")).unwrap(),
            "<svg/>"
        );
    }
}
