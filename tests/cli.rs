mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use assert_cmd::Command;
use tempfile::tempdir;

fn reader(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("lexicon-reader").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home);
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_options() {
    let dir = tempdir().unwrap();
    reader(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("--book-id"))
        .stdout(predicates::str::contains("--dump"))
        .stdout(predicates::str::contains("--offline"));
}

#[test]
fn test_missing_ebook_argument() {
    let dir = tempdir().unwrap();
    reader(dir.path())
        .arg("--offline")
        .assert()
        .failure()
        .stderr(predicates::str::contains("No ebook given"));
}

#[test]
fn test_dump_missing_file_fails() {
    let dir = tempdir().unwrap();
    reader(dir.path())
        .args(["--offline", "--dump", "tests/fixtures/nonexistent.epub"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("Could not open"));
}

#[test]
fn test_first_run_writes_configuration() {
    let dir = tempdir().unwrap();
    reader(dir.path()).arg("--offline").assert().failure();
    let config = dir.path().join("lexicon-reader").join("configuration.json");
    let written = std::fs::read_to_string(config).unwrap();
    assert!(written.contains("\"chars_per_location\": 1600"));
}

#[test]
fn test_dump_annotates_first_chapter() {
    let dir = tempdir().unwrap();
    let book = common::write_sample_epub(dir.path());
    reader(dir.path())
        .args(["--offline", "--dump", "-w", "ritual"])
        .arg(&book)
        .assert()
        .success()
        .stdout(predicates::str::contains(r#"class="special-word" data-word="arcane""#))
        .stdout(predicates::str::contains(r#"data-word="ritual""#))
        .stdout(predicates::str::contains(r#"<a href="notes.xhtml">arcane notes</a>"#));
}

#[test]
fn test_dump_at_location() {
    let dir = tempdir().unwrap();
    let book = common::write_sample_epub(dir.path());
    reader(dir.path())
        .args(["--offline", "--dump", "-l", "2"])
        .arg(&book)
        .assert()
        .success()
        .stdout(predicates::str::contains(r#"data-word="conundrum""#))
        .stdout(predicates::str::contains("esoteric").not());
}

#[test]
fn test_dump_with_custom_config() {
    let dir = tempdir().unwrap();
    let book = common::write_sample_epub(dir.path());
    let config = dir.path().join("custom.json");
    std::fs::write(&config, r#"{"Setting":{"base_words":["chant"]}}"#).unwrap();
    reader(dir.path())
        .args(["--offline", "--dump", "-c"])
        .arg(&config)
        .arg(&book)
        .assert()
        .success()
        .stdout(predicates::str::contains(r#"data-word="chant""#))
        .stdout(predicates::str::contains(r#"data-word="arcane""#).not());
}

#[test]
fn test_interactive_session() {
    let dir = tempdir().unwrap();
    let book = common::write_sample_epub(dir.path());
    reader(dir.path())
        .arg("--offline")
        .arg(&book)
        .write_stdin("m\ng 2\nm\ng 9\nz\nq\n")
        .assert()
        .success()
        .stdout(predicates::str::contains("Page 1 of 2"))
        .stdout(predicates::str::contains("1. arcane"))
        .stdout(predicates::str::contains("2. esoteric"))
        .stdout(predicates::str::contains("Page 2 of 2"))
        .stdout(predicates::str::contains("1. conundrum"))
        .stdout(predicates::str::contains("Enter a page between 1 and 2."))
        .stdout(predicates::str::contains("Unknown command 'z'"));
}

#[test]
fn test_submit_rejects_blank_word() {
    let dir = tempdir().unwrap();
    reader(dir.path())
        .args(["--submit", "   "])
        .assert()
        .failure()
        .stderr(predicates::str::contains("Cannot submit an empty word"));
}
