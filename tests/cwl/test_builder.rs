use cwl2nf::core::cwl::model::StepRun;
use cwl2nf::core::cwl::requirements::RequirementKind;
use cwl2nf::core::cwl::{build_document, load_document, load_str, Document, ProcessKind, SourceRef};
use cwl2nf::core::diagnostics::Diagnostics;
use cwl2nf::core::error::AppError;
use cwl2nf::core::types::ErrorCategory;
use std::path::{Path, PathBuf};

fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

fn build_text(text: &str) -> (Result<Document, AppError>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let result = load_str(text, Path::new("wf.cwl"), &mut diagnostics)
        .and_then(|loaded| build_document(&loaded, &mut diagnostics));
    (result, diagnostics)
}

fn step_output(step: &str, output: &str) -> SourceRef {
    SourceRef::StepOutput {
        step: step.to_string(),
        output: output.to_string(),
    }
}

#[test]
fn test_build_multi_file_workflow() {
    let mut diagnostics = Diagnostics::new();
    let loaded = load_document(&fixture("align_sort/workflow.cwl"), &mut diagnostics).unwrap();
    let document = build_document(&loaded, &mut diagnostics).unwrap();

    assert_eq!(document.kind, ProcessKind::Workflow);
    assert_eq!(document.id, "align_sort");
    assert_eq!(document.label.as_deref(), Some("Align reads and sort the alignment"));
    assert_eq!(document.references.len(), 2);

    let workflow = &document.workflow;
    let ids: Vec<&str> = workflow.steps.iter().map(|step| step.id.as_str()).collect();
    assert_eq!(ids, vec!["align", "sort"]);
    assert_eq!(workflow.outputs[0].output_source, vec![step_output("sort", "sorted")]);

    let align = workflow.step("align").unwrap();
    assert_eq!(align.field_path, "steps.align");
    let StepRun::Tool(tool) = &align.run else {
        panic!("align should run a command line tool");
    };
    assert_eq!(tool.base_command, vec!["bwa", "mem"]);
    assert_eq!(tool.stdout.as_deref(), Some("aligned.sam"));
    let aligned = tool.outputs[0].output_binding.as_ref().unwrap();
    assert_eq!(aligned.glob.as_deref(), Some("aligned.sam"));
    assert!(align.requirements.has(RequirementKind::Resource));
    assert_eq!(
        align.requirements.docker().and_then(|docker| docker.image()),
        Some("docker.io/biocontainers/bwa:v0.7.17")
    );

    let sort = workflow.step("sort").unwrap();
    assert_eq!(sort.upstream(), vec!["align"]);
    // Hints count when nothing stronger is declared.
    assert!(sort.requirements.docker().is_some());
    assert!(!sort.requirements.has(RequirementKind::Resource));
}

#[test]
fn test_standalone_tool_is_wrapped() {
    let mut diagnostics = Diagnostics::new();
    let loaded = load_document(&fixture("oversized.cwl"), &mut diagnostics).unwrap();
    let document = build_document(&loaded, &mut diagnostics).unwrap();

    assert_eq!(document.kind, ProcessKind::CommandLineTool);
    let workflow = &document.workflow;
    assert_eq!(workflow.steps.len(), 1);
    let step = &workflow.steps[0];
    assert_eq!(step.id, "assemble");
    assert_eq!(step.field_path, "");
    assert_eq!(step.field("in.reads"), "in.reads");
    assert_eq!(step.inputs[0].sources, vec![SourceRef::WorkflowInput("reads".into())]);
    assert_eq!(workflow.inputs[0].name, "reads");
    assert!(workflow.inputs[0].input_binding.is_none());
    assert_eq!(workflow.outputs[0].output_source, vec![step_output("assemble", "contigs")]);
}

#[test]
fn test_unresolved_source_is_a_schema_violation() {
    let (result, _) = build_text(
        r#"
cwlVersion: v1.2
class: Workflow
inputs:
  reads: File
outputs:
  out:
    type: File
    outputSource: count/out
steps:
  count:
    run:
      class: CommandLineTool
      baseCommand: wc
      inputs:
        file: File
      stdout: count.txt
      outputs:
        out: stdout
    in:
      file: raeds
    out: [out]
"#,
    );
    let err = result.unwrap_err();
    assert_eq!(err.category, ErrorCategory::SchemaViolation);
    assert_eq!(err.field_path.as_deref(), Some("steps.count.in.file"));
    assert!(err.message.contains("raeds"));
}

#[test]
fn test_step_feeding_nothing_is_unreachable() {
    let (result, _) = build_text(
        r#"
cwlVersion: v1.2
class: Workflow
inputs:
  msg: string
outputs:
  out:
    type: File
    outputSource: used/out
steps:
  used:
    run:
      class: CommandLineTool
      baseCommand: echo
      inputs:
        msg: string
      stdout: used.txt
      outputs:
        out: stdout
    in: {msg: msg}
    out: [out]
  dangling:
    run:
      class: CommandLineTool
      baseCommand: echo
      inputs:
        msg: string
      stdout: dangling.txt
      outputs:
        out: stdout
    in: {msg: msg}
    out: [out]
"#,
    );
    let err = result.unwrap_err();
    assert_eq!(err.category, ErrorCategory::UnreachableOutput);
    assert_eq!(err.code, "CWL-MODEL-002");
    assert_eq!(err.field_path.as_deref(), Some("steps.dangling.out"));
}

#[test]
fn test_partially_used_outputs_are_informational() {
    let (result, diagnostics) = build_text(
        r#"
cwlVersion: v1.2
class: Workflow
inputs:
  msg: string
outputs:
  out:
    type: File
    outputSource: say/out
steps:
  say:
    run:
      class: CommandLineTool
      baseCommand: echo
      inputs:
        msg: string
      stdout: say.txt
      stderr: say.err
      outputs:
        out: stdout
        log: stderr
    in: {msg: msg}
    out: [out, log]
"#,
    );
    assert!(result.is_ok());
    let info: Vec<_> = diagnostics.with_code("CWL-MODEL-004").collect();
    assert_eq!(info.len(), 1);
    assert!(info[0].message.contains("'log'"));
    assert!(!diagnostics.has_errors());
}

#[test]
fn test_nested_workflow_is_flattened() {
    let (result, _) = build_text(
        r#"
cwlVersion: v1.2
class: Workflow
requirements:
  SubworkflowFeatureRequirement: {}
inputs:
  sample: File
outputs:
  report:
    type: File
    outputSource: qc/report
steps:
  qc:
    run:
      class: Workflow
      inputs:
        reads: File
      outputs:
        report:
          type: File
          outputSource: summarize/report
      steps:
        trim:
          run:
            class: CommandLineTool
            baseCommand: trim
            inputs:
              reads: File
            outputs:
              trimmed:
                type: File
                outputBinding: {glob: trimmed.fq}
          in: {reads: reads}
          out: [trimmed]
        summarize:
          run:
            class: CommandLineTool
            baseCommand: fastqc
            inputs:
              reads: File
            outputs:
              report:
                type: File
                outputBinding: {glob: report.html}
          in: {reads: trim/trimmed}
          out: [report]
    in:
      reads: sample
    out: [report]
"#,
    );
    let document = result.unwrap();
    let workflow = &document.workflow;
    let ids: Vec<&str> = workflow.steps.iter().map(|step| step.id.as_str()).collect();
    assert_eq!(ids, vec!["qc__trim", "qc__summarize"]);

    let trim = workflow.step("qc__trim").unwrap();
    assert_eq!(trim.inputs[0].sources, vec![SourceRef::WorkflowInput("sample".into())]);
    let summarize = workflow.step("qc__summarize").unwrap();
    assert_eq!(summarize.inputs[0].sources, vec![step_output("qc__trim", "trimmed")]);
    assert_eq!(
        workflow.outputs[0].output_source,
        vec![step_output("qc__summarize", "report")]
    );
}

#[test]
fn test_step_requirements_outrank_tool_hints() {
    let (result, diagnostics) = build_text(
        r#"
cwlVersion: v1.2
class: Workflow
requirements:
  ResourceRequirement:
    coresMin: 2
  CUDARequirement:
    cudaVersionMin: "11.4"
inputs:
  msg: string
outputs:
  out:
    type: File
    outputSource: say/out
steps:
  say:
    requirements:
      DockerRequirement:
        dockerPull: alpine:3.19
    run:
      class: CommandLineTool
      hints:
        DockerRequirement:
          dockerPull: ubuntu:22.04
      baseCommand: echo
      inputs:
        msg: string
      stdout: say.txt
      outputs:
        out: stdout
    in: {msg: msg}
    out: [out]
"#,
    );
    let document = result.unwrap();
    let step = &document.workflow.steps[0];
    assert_eq!(
        step.requirements.docker().and_then(|docker| docker.image()),
        Some("alpine:3.19")
    );
    // Workflow-level requirements flow down to every step.
    assert!(step.requirements.has(RequirementKind::Resource));
    assert_eq!(step.requirements.ignored(), ["CUDARequirement".to_string()]);
    assert_eq!(diagnostics.with_code("CWL-MODEL-003").count(), 1);
}

#[test]
fn test_enum_inputs_pass_through_as_strings() {
    let (result, diagnostics) = build_text(
        r#"
cwlVersion: v1.2
class: CommandLineTool
baseCommand: compress
inputs:
  level:
    type:
      type: enum
      symbols: [fast, best]
    inputBinding: {prefix: --level}
stdout: out.txt
outputs:
  out: stdout
"#,
    );
    let document = result.unwrap();
    assert_eq!(document.workflow.inputs[0].param_type.to_string(), "string");
    assert_eq!(diagnostics.with_code("CWL-MODEL-005").count(), 1);
}

#[test]
fn test_record_types_are_rejected() {
    let (result, _) = build_text(
        r#"
cwlVersion: v1.2
class: CommandLineTool
baseCommand: run
inputs:
  pair:
    type:
      type: record
      fields:
        left: File
stdout: out.txt
outputs:
  out: stdout
"#,
    );
    let err = result.unwrap_err();
    assert_eq!(err.category, ErrorCategory::SchemaViolation);
    assert_eq!(err.field_path.as_deref(), Some("inputs.pair.type"));
}

#[test]
fn test_expression_tool_step() {
    let (result, _) = build_text(
        r#"
cwlVersion: v1.2
class: Workflow
requirements:
  InlineJavascriptRequirement: {}
inputs:
  n: int
outputs:
  doubled:
    type: int
    outputSource: double/result
steps:
  double:
    run:
      class: ExpressionTool
      inputs:
        n: int
      outputs:
        result: int
      expression: "${ return {'result': inputs.n * 2}; }"
    in: {n: n}
    out: [result]
"#,
    );
    let document = result.unwrap();
    let StepRun::Expression(tool) = &document.workflow.steps[0].run else {
        panic!("double should run an expression tool");
    };
    assert!(tool.expression.contains("inputs.n * 2"));
    assert_eq!(tool.outputs[0].name, "result");
}

#[test]
fn test_step_without_run_names_the_field() {
    let (result, _) = build_text(
        r#"
cwlVersion: v1.2
class: Workflow
inputs: []
outputs: []
steps:
  lonely:
    in: {}
    out: []
"#,
    );
    let err = result.unwrap_err();
    assert_eq!(err.field_path.as_deref(), Some("steps.lonely.run"));
}
