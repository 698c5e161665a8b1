use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_top_level_help_lists_conversion_commands() {
    let mut cmd = Command::cargo_bin("cwl2nf").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Translate CWL workflows into Nextflow DSL2 pipelines"))
        .stdout(predicate::str::contains("CONVERSION COMMANDS:"))
        .stdout(predicate::str::contains("Convert one CWL document into a Nextflow pipeline"))
        .stdout(predicate::str::contains("Convert every CWL document under a directory"))
        .stdout(predicate::str::contains("Validate a CWL document and print its diagnostics"))
        .stdout(predicate::str::contains("Print the step dependency graph as Graphviz DOT"))
        .stdout(predicate::str::contains("Show the container image resolved for every step"));
}

#[test]
fn test_long_help_lists_environment_overrides() {
    let mut cmd = Command::cargo_bin("cwl2nf").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ENVIRONMENT:"))
        .stdout(predicate::str::contains("CWL2NF_QUEUE"));
}

#[test]
fn test_version_flag() {
    let mut cmd = Command::cargo_bin("cwl2nf").unwrap();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("cwl2nf "))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_convert_help_shows_options_and_example() {
    let mut cmd = Command::cargo_bin("cwl2nf").unwrap();
    cmd.arg("convert").arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--stdout"))
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("cwl2nf convert workflow.cwl -o pipeline/"));
}

#[test]
fn test_batch_help_mentions_jobs() {
    let mut cmd = Command::cargo_bin("cwl2nf").unwrap();
    cmd.arg("batch").arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--jobs"))
        .stdout(predicate::str::contains("exit code is non-zero"));
}

#[test]
fn test_containers_help_mentions_push_script() {
    let mut cmd = Command::cargo_bin("cwl2nf").unwrap();
    cmd.arg("containers").arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--push-script"))
        .stdout(predicate::str::contains("--region"));
}

#[test]
fn test_missing_subcommand_fails() {
    let mut cmd = Command::cargo_bin("cwl2nf").unwrap();
    cmd.assert().failure();
}
