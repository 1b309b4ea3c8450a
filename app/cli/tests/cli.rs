//! Smoke tests for the binary surface.

use assert_cmd::Command;

#[test]
fn test_help_prints_usage() {
    Command::cargo_bin("strand")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("--model"))
        .stdout(predicates::str::contains("--dialect"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("strand")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn test_non_openai_provider_without_base_url_is_fatal() {
    Command::cargo_bin("strand")
        .unwrap()
        .args(["--provider", "gateway", "--model", "gateway/some-model"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicates::str::contains("base-url"));
}
