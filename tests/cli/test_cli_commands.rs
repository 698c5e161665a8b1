use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

/// A `cwl2nf` command running in an empty directory, so no local config or logs interfere.
fn cwl2nf(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cwl2nf").unwrap();
    cmd.current_dir(workdir).arg("--quiet");
    cmd
}

#[test]
fn test_convert_writes_pipeline_files() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("convert")
        .arg(fixture("align_sort/workflow.cwl"))
        .arg("-o")
        .arg("out")
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote "))
        .stdout(predicate::str::contains("workflow.nf"))
        .stdout(predicate::str::contains(": ok ("));

    let script = fs::read_to_string(temp.path().join("out/workflow.nf")).unwrap();
    assert!(script.contains("process ALIGN {"));
    assert!(temp.path().join("out/nextflow.config").exists());
    assert!(temp.path().join("out/workflow.diagnostics.json").exists());
}

#[test]
fn test_convert_to_stdout() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("convert")
        .arg(fixture("align_sort/workflow.cwl"))
        .arg("--stdout")
        .assert()
        .success()
        .stdout(predicate::str::contains("// ---- workflow ----"))
        .stdout(predicate::str::contains("// ---- profiles ----"));
    assert!(!temp.path().join("workflow.nf").exists());
}

#[test]
fn test_convert_cycle_fails_with_diagnostic() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("convert")
        .arg(fixture("cyclic.cwl"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("CWL-GRAPH-001"))
        .stdout(predicate::str::contains(": failed ("))
        .stderr(predicate::str::contains("conversion failed"));
    assert!(temp.path().join("cyclic.diagnostics.json").exists());
    assert!(!temp.path().join("cyclic.nf").exists());
}

#[test]
fn test_check_json_report() {
    let temp = TempDir::new().unwrap();
    let output = cwl2nf(temp.path())
        .arg("check")
        .arg(fixture("oversized.cwl"))
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["success"], serde_json::Value::Bool(true));
    assert_eq!(report["written"], serde_json::json!([]));
    let codes: Vec<&str> = report["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|entry| entry["code"].as_str())
        .collect();
    assert!(codes.contains(&"CWL-RES-001"));
}

#[test]
fn test_check_rejects_unsupported_version() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("check")
        .arg(fixture("bad_version.cwl"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("CWL-LOAD-002"));
}

#[test]
fn test_graph_prints_dot() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("graph")
        .arg(fixture("align_sort/workflow.cwl"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph {"))
        .stdout(predicate::str::contains("label = \"aligned\""));
}

#[test]
fn test_containers_lists_resolved_images() {
    let temp = TempDir::new().unwrap();
    let output = cwl2nf(temp.path())
        .arg("containers")
        .arg(fixture("align_sort/workflow.cwl"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let listing = listing.as_array().unwrap();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0]["step"], "align");
    assert_eq!(
        listing[0]["container"]["target_image"],
        "public.ecr.aws/biocontainers/bwa:v0.7.17"
    );
    assert_eq!(listing[1]["step"], "sort");
}

#[test]
fn test_containers_push_script() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("containers")
        .arg(fixture("align_sort/workflow.cwl"))
        .arg("--push-script")
        .arg("--region")
        .arg("eu-west-1")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("#!/usr/bin/env bash"))
        .stdout(predicate::str::contains("AWS_REGION=\"${AWS_REGION:-eu-west-1}\""))
        .stdout(predicate::str::contains("docker pull docker.io/biocontainers/bwa:v0.7.17"));
}

#[test]
fn test_region_requires_push_script() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("containers")
        .arg(fixture("align_sort/workflow.cwl"))
        .arg("--region")
        .arg("eu-west-1")
        .assert()
        .failure();
}

#[test]
fn test_batch_reports_partial_failure() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("batch")
        .arg(fixture("batch"))
        .arg("-o")
        .arg("converted")
        .arg("--jobs")
        .arg("2")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED "))
        .stdout(predicate::str::contains("3 documents: 2 succeeded, 1 failed"))
        .stderr(predicate::str::contains("1 of 3 documents failed to convert"));
    assert!(temp.path().join("converted/hello/hello.nf").exists());
    assert!(temp.path().join("converted/rnaseq/count/count.nf").exists());
}

#[test]
fn test_batch_json_summary() {
    let temp = TempDir::new().unwrap();
    let output = cwl2nf(temp.path())
        .arg("batch")
        .arg(fixture("batch"))
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(!output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = summary["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    let succeeded = entries.iter().filter(|entry| entry["succeeded"] == true).count();
    assert_eq!(succeeded, 2);
    assert!(temp.path().join("nextflow/hello/hello.nf").exists());
}

#[test]
fn test_batch_rejects_zero_jobs() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("batch")
        .arg(fixture("batch"))
        .arg("--jobs")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--jobs must be at least 1"));
}

#[test]
fn test_explicit_config_must_exist() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("--config")
        .arg("missing.toml")
        .arg("check")
        .arg(fixture("oversized.cwl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration missing.toml"));
}

#[test]
fn test_workdir_config_changes_the_output() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("cwl2nf.toml"),
        "outdir = \"s3://bucket/results\"\n\n[platform]\nqueue = \"spot\"\n",
    )
    .unwrap();
    cwl2nf(temp.path())
        .arg("convert")
        .arg(fixture("align_sort/workflow.cwl"))
        .arg("--stdout")
        .assert()
        .success()
        .stdout(predicate::str::contains("params.outdir = 's3://bucket/results'"))
        .stdout(predicate::str::contains("queue = 'spot'"));
}

#[test]
fn test_flavor_and_instance_type_flags() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("--flavor")
        .arg("healthomics")
        .arg("--instance-type")
        .arg("t3.large")
        .arg("convert")
        .arg(fixture("align_sort/workflow.cwl"))
        .arg("--stdout")
        .assert()
        .success()
        .stdout(predicate::str::contains("cliPath = '/usr/local/bin/aws'"))
        .stdout(predicate::str::contains("healthomics_prod {"))
        .stdout(predicate::str::contains("label 't3.large'"));
}

#[test]
fn test_unknown_instance_type_is_rejected() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("--instance-type")
        .arg("z9.huge")
        .arg("check")
        .arg(fixture("oversized.cwl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("instance type 'z9.huge' matches no capability"));
}

#[test]
fn test_unknown_flavor_is_rejected() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("--flavor")
        .arg("mainframe")
        .arg("check")
        .arg(fixture("oversized.cwl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown platform flavor 'mainframe'"));
}

#[test]
fn test_template_flag_lays_out_the_script() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("layout.nf"),
        "{{ header }}\n// house layout\n{{ params }}\n{{ channels }}\n{{ processes }}\n{{ workflow }}\n",
    )
    .unwrap();
    cwl2nf(temp.path())
        .arg("--template")
        .arg("layout.nf")
        .arg("convert")
        .arg(fixture("align_sort/workflow.cwl"))
        .arg("-o")
        .arg("out")
        .assert()
        .success();

    let script = fs::read_to_string(temp.path().join("out/workflow.nf")).unwrap();
    assert!(script.contains("// house layout\nnextflow.enable.dsl = 2"));
    assert!(script.contains("process ALIGN {"));
}

#[test]
fn test_missing_template_fails() {
    let temp = TempDir::new().unwrap();
    cwl2nf(temp.path())
        .arg("--template")
        .arg("absent.nf")
        .arg("check")
        .arg(fixture("oversized.cwl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read template"));
}
