use cwl2nf::core::cwl::{load_document, load_str, CwlVersion};
use cwl2nf::core::diagnostics::Diagnostics;
use cwl2nf::core::types::ErrorCategory;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

#[test]
fn test_load_embeds_run_references() {
    let mut diagnostics = Diagnostics::new();
    let loaded = load_document(&fixture("align_sort/workflow.cwl"), &mut diagnostics).unwrap();

    assert_eq!(loaded.version, CwlVersion::V1_2);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);

    let align_run = &loaded.root["steps"]["align"]["run"];
    assert_eq!(align_run["class"].as_str(), Some("CommandLineTool"));
    assert_eq!(align_run["baseCommand"][0].as_str(), Some("bwa"));
    let sort_run = &loaded.root["steps"]["sort"]["run"];
    assert_eq!(sort_run["id"].as_str(), Some("samtools_sort"));

    let referenced: Vec<String> = loaded
        .references
        .iter()
        .map(|(_, to)| to.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(referenced, vec!["bwa_mem.cwl", "samtools_sort.cwl"]);
}

#[test]
fn test_shorthand_types_are_normalized_at_load() {
    let text = r#"
cwlVersion: v1.2
class: CommandLineTool
baseCommand: cat
inputs:
  files: File[]
  label: string?
  matrix:
    type: int[][]
  extra:
    type:
      type: array
      items: string?
outputs: []
"#;
    let mut diagnostics = Diagnostics::new();
    let loaded = load_str(text, Path::new("cat.cwl"), &mut diagnostics).unwrap();
    let inputs = &loaded.root["inputs"];
    assert_eq!(inputs["files"].as_str(), Some("array<File>"));
    assert_eq!(inputs["label"].as_str(), Some("optional<string>"));
    assert_eq!(inputs["matrix"]["type"].as_str(), Some("array<array<int>>"));
    assert_eq!(inputs["extra"]["type"]["items"].as_str(), Some("optional<string>"));
}

#[test]
fn test_missing_version_defaults_with_warning() {
    let text = "class: CommandLineTool\nbaseCommand: echo\ninputs: []\noutputs: []\n";
    let mut diagnostics = Diagnostics::new();
    let loaded = load_str(text, Path::new("echo.cwl"), &mut diagnostics).unwrap();

    assert_eq!(loaded.version, CwlVersion::V1_0);
    assert_eq!(loaded.root["cwlVersion"].as_str(), Some("v1.0"));
    let warning = diagnostics.with_code("CWL-LOAD-004").next().unwrap();
    assert!(!warning.is_error());
    assert_eq!(warning.location.as_deref(), Some("cwlVersion"));
}

#[test]
fn test_unsupported_version_is_rejected() {
    let mut diagnostics = Diagnostics::new();
    let err = load_document(&fixture("bad_version.cwl"), &mut diagnostics).unwrap_err();
    assert_eq!(err.category, ErrorCategory::UnsupportedVersion);
    assert_eq!(err.code, "CWL-LOAD-002");
    assert_eq!(err.field_path.as_deref(), Some("cwlVersion"));
    assert!(err.message.contains("draft-3"));
}

#[test]
fn test_malformed_yaml_reports_position() {
    let mut diagnostics = Diagnostics::new();
    let err = load_document(&fixture("batch/rnaseq/broken.cwl"), &mut diagnostics).unwrap_err();
    assert_eq!(err.category, ErrorCategory::MalformedDocument);
    assert!(err.field_path.as_deref().unwrap_or_default().starts_with("line "));
}

#[test]
fn test_root_must_be_a_mapping() {
    let mut diagnostics = Diagnostics::new();
    let err = load_str("- just\n- a list\n", Path::new("list.cwl"), &mut diagnostics).unwrap_err();
    assert_eq!(err.category, ErrorCategory::MalformedDocument);
}

#[test]
fn test_mutual_run_references_are_a_cyclic_import() {
    let temp = TempDir::new().unwrap();
    let first = "cwlVersion: v1.2\nclass: Workflow\ninputs: []\noutputs: []\nsteps:\n  nested:\n    run: second.cwl\n    in: {}\n    out: []\n";
    let second = "cwlVersion: v1.2\nclass: Workflow\ninputs: []\noutputs: []\nsteps:\n  back:\n    run: first.cwl\n    in: {}\n    out: []\n";
    fs::write(temp.path().join("first.cwl"), first).unwrap();
    fs::write(temp.path().join("second.cwl"), second).unwrap();

    let mut diagnostics = Diagnostics::new();
    let err = load_document(&temp.path().join("first.cwl"), &mut diagnostics).unwrap_err();
    assert_eq!(err.category, ErrorCategory::CyclicImport);
    assert_eq!(err.code, "CWL-LOAD-003");
    assert!(err.message.contains("first.cwl"));
    assert!(err.message.contains("second.cwl"));
}

#[test]
fn test_missing_run_file_names_the_step() {
    let temp = TempDir::new().unwrap();
    let text = "cwlVersion: v1.2\nclass: Workflow\ninputs: []\noutputs: []\nsteps:\n  align:\n    run: tools/absent.cwl\n    in: {}\n    out: []\n";
    let path = temp.path().join("wf.cwl");
    fs::write(&path, text).unwrap();

    let mut diagnostics = Diagnostics::new();
    let err = load_document(&path, &mut diagnostics).unwrap_err();
    assert_eq!(err.category, ErrorCategory::IoError);
    assert_eq!(err.field_path.as_deref(), Some("steps.align.run"));
}

#[test]
fn test_same_tool_referenced_twice_is_loaded_once() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("echo.cwl"),
        "class: CommandLineTool\nbaseCommand: echo\ninputs:\n  msg: string\noutputs: []\n",
    )
    .unwrap();
    let text = r#"
cwlVersion: v1.1
class: Workflow
inputs:
  msg: string
outputs: []
steps:
  one:
    run: echo.cwl
    in: {msg: msg}
    out: []
  two:
    run: echo.cwl
    in: {msg: msg}
    out: []
"#;
    let path = temp.path().join("twice.cwl");
    fs::write(&path, text).unwrap();

    let mut diagnostics = Diagnostics::new();
    let loaded = load_document(&path, &mut diagnostics).unwrap();
    assert_eq!(loaded.references.len(), 2);
    // The referenced tool inherits the parent's version instead of warning.
    assert_eq!(diagnostics.with_code("CWL-LOAD-004").count(), 0);
    assert_eq!(
        loaded.root["steps"]["two"]["run"]["cwlVersion"].as_str(),
        Some("v1.1")
    );
    assert_eq!(
        loaded.root["steps"]["one"]["run"],
        loaded.root["steps"]["two"]["run"]
    );
}

#[test]
fn test_packed_graph_selects_main() {
    let text = r##"
cwlVersion: v1.2
$graph:
  - id: "#echo"
    class: CommandLineTool
    baseCommand: echo
    inputs:
      msg: string
    stdout: out.txt
    outputs:
      out:
        type: stdout
  - id: "#main"
    class: Workflow
    inputs:
      msg: string
    outputs:
      result:
        type: File
        outputSource: say/out
    steps:
      say:
        run: "#echo"
        in: {msg: msg}
        out: [out]
"##;
    let mut diagnostics = Diagnostics::new();
    let loaded = load_str(text, Path::new("packed.cwl"), &mut diagnostics).unwrap();
    assert_eq!(loaded.root["class"].as_str(), Some("Workflow"));
    assert_eq!(
        loaded.root["steps"]["say"]["run"]["baseCommand"].as_str(),
        Some("echo")
    );
    assert!(loaded.references.is_empty());
}

#[test]
fn test_import_and_include_are_inlined() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("params.yml"),
        "msg:\n  type: string\n  inputBinding: {position: 1}\n",
    )
    .unwrap();
    fs::write(temp.path().join("script.sh"), "echo hello\n").unwrap();
    let text = r#"
cwlVersion: v1.2
class: CommandLineTool
baseCommand: bash
inputs:
  $import: params.yml
arguments:
  - valueFrom:
      $include: script.sh
outputs: []
"#;
    let path = temp.path().join("tool.cwl");
    fs::write(&path, text).unwrap();

    let mut diagnostics = Diagnostics::new();
    let loaded = load_document(&path, &mut diagnostics).unwrap();
    assert_eq!(loaded.root["inputs"]["msg"]["type"].as_str(), Some("string"));
    assert_eq!(
        loaded.root["arguments"][0]["valueFrom"].as_str(),
        Some("echo hello\n")
    );
}
