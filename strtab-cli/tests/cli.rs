//! End-to-end tests for the strtab binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn strtab() -> Command {
    let mut cmd = Command::cargo_bin("strtab").expect("binary builds");
    cmd.env_remove("STRTAB_LOG")
        .env_remove("STRTAB_CONFIG")
        .env("STRTAB_SIZE", "64");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    strtab()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("archive"))
        .stdout(predicate::str::contains("dump"))
        .stdout(predicate::str::contains("stress"));
}

#[test]
fn test_dump_all_prints_interned_words() {
    strtab()
        .args(["dump", "--all", "hello world"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("VERSION: 1.1\n"))
        .stdout(predicate::str::contains("5: hello"))
        .stdout(predicate::str::contains("5: world"));
}

#[test]
fn test_archive_then_dump_mapped() {
    let dir = TempDir::new().unwrap();
    let image = dir.path().join("words.stra");

    strtab()
        .args(["archive", "alpha beta", "-o"])
        .arg(&image)
        .assert()
        .success();

    strtab()
        .args(["dump", "--all", "--map", "--snapshot"])
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("# Shared strings:"))
        .stdout(predicate::str::contains("5: alpha"))
        .stdout(predicate::str::contains("4: beta"));
}

#[test]
fn test_archive_then_dump_loaded_transfers() {
    let dir = TempDir::new().unwrap();
    let image = dir.path().join("words.stra");

    strtab()
        .args(["archive", "--narrow", "gamma", "-o"])
        .arg(&image)
        .assert()
        .success();

    strtab()
        .args(["dump", "--all", "--snapshot"])
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("5: gamma"))
        .stdout(predicate::str::contains("# Shared strings:").not());
}

#[test]
fn test_dump_json_statistics() {
    strtab()
        .args(["dump", "--json", "a b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"live_count\": 2"))
        .stdout(predicate::str::contains("\"diagnostics\""));
}

#[test]
fn test_dump_rejects_corrupt_snapshot() {
    let dir = TempDir::new().unwrap();
    let image = dir.path().join("junk.stra");
    std::fs::write(&image, b"definitely not an image").unwrap();

    strtab()
        .args(["dump", "--snapshot"])
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed snapshot"));
}

#[test]
fn test_stress_small_run() {
    strtab()
        .args(["stress", "--threads", "2", "--words", "200", "--rounds", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("StringTable statistics:"));
}

#[test]
fn test_config_file_applies_table_section() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("strtab.toml");
    std::fs::write(&config, "[table]\ninitial_size = 8\n").unwrap();

    strtab()
        .args(["dump", "--json", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"bucket_count\": 8"));
}

#[test]
fn test_invalid_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("strtab.toml");
    std::fs::write(&config, "[table]\ninitial_size = 0\n").unwrap();

    strtab()
        .args(["--config"])
        .arg(&config)
        .arg("stress")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
