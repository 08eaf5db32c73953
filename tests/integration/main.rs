//! Integration tests for pgstamp

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Binary pointed at a config file that does not exist yet
    fn pgstamp(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("pgstamp");
        cmd.env("PGSTAMP_CONFIG", temp.path().join("config.toml"))
            .env_remove("DATABASE_URL")
            .env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        pgstamp(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Template database cache"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        pgstamp(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("pgstamp"));
    }

    #[test]
    fn fingerprint_is_offline_and_order_insensitive() {
        let temp = TempDir::new().unwrap();
        let first = pgstamp(&temp)
            .args(["cache", "fingerprint", "-m", "sale,base"])
            .assert()
            .success()
            .stdout(predicate::str::is_match(r"^[0-9a-f]{40}\ncache-[0-9a-f]{40}\n$").unwrap())
            .get_output()
            .stdout
            .clone();

        let second = pgstamp(&temp)
            .args(["cache", "fingerprint", "-m", "base", "-m", "sale"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        assert_eq!(first, second);
    }

    #[test]
    fn fingerprint_depends_on_demo() {
        let temp = TempDir::new().unwrap();
        let without = pgstamp(&temp)
            .args(["cache", "fingerprint", "-m", "base"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let with = pgstamp(&temp)
            .args(["cache", "fingerprint", "-m", "base", "--demo"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        assert_ne!(without, with);
    }

    #[test]
    fn fingerprint_uses_prefix_override() {
        let temp = TempDir::new().unwrap();
        pgstamp(&temp)
            .args(["cache", "--cache-prefix", "tstpfx9", "fingerprint", "-m", "base"])
            .assert()
            .success()
            .stdout(predicate::str::contains("tstpfx9-"));
    }

    #[test]
    fn invalid_prefix_fails_before_connecting() {
        let temp = TempDir::new().unwrap();
        pgstamp(&temp)
            .args(["cache", "size", "--cache-prefix", "Not-Valid"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache prefix"));

        pgstamp(&temp)
            .args(["init", "-n", "db1", "-m", "base", "--cache-prefix", "this_prefix_is_far_too_long"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache prefix"));
    }

    #[test]
    fn init_requires_modules() {
        let temp = TempDir::new().unwrap();
        pgstamp(&temp)
            .args(["init", "-n", "db1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--modules"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        pgstamp(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        pgstamp(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("max_size = 5"));
    }

    #[test]
    fn config_init_then_set() {
        let temp = TempDir::new().unwrap();
        pgstamp(&temp).args(["config", "init"]).assert().success();
        assert!(temp.path().join("config.toml").exists());

        pgstamp(&temp)
            .args(["config", "set", "cache.max_size", "-1"])
            .assert()
            .success();

        pgstamp(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_size = -1"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let temp = TempDir::new().unwrap();
        pgstamp(&temp)
            .args(["config", "set", "cache.colour", "blue"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn broken_config_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[cache\n").unwrap();
        pgstamp(&temp)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("config.toml"));
    }
}
