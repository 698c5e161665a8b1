use cwl2nf::core::config::{ConverterConfig, PlatformFlavor};
use cwl2nf::core::nextflow::Template;
use cwl2nf::core::nextflow::TargetDocument;
use cwl2nf::core::{Conversion, Converter};
use insta::assert_snapshot;
use std::path::{Path, PathBuf};

fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

fn convert_fixture(relative: &str) -> Conversion {
    let config = ConverterConfig::default();
    Converter::new(&config).convert_file(&fixture(relative))
}

fn convert_text(text: &str) -> (TargetDocument, Conversion) {
    convert_text_with(&ConverterConfig::default(), text)
}

fn convert_text_with(config: &ConverterConfig, text: &str) -> (TargetDocument, Conversion) {
    let conversion = Converter::new(config).convert_str(text, Path::new("inline.cwl"));
    let target = conversion
        .target
        .clone()
        .unwrap_or_else(|| panic!("conversion failed: {:?}", conversion.error()));
    (target, conversion)
}

const GREET_TOOL: &str = r#"
cwlVersion: v1.2
class: CommandLineTool
id: greet
baseCommand: echo
requirements:
  DockerRequirement:
    dockerPull: ubuntu:22.04
inputs:
  message:
    type: string
    inputBinding: {position: 1}
stdout: hello.txt
outputs:
  greeting: stdout
"#;

const QC_WORKFLOW: &str = r#"
cwlVersion: v1.2
class: Workflow
id: qc
requirements:
  ScatterFeatureRequirement: {}
  MultipleInputFeatureRequirement: {}
inputs:
  samples: File[]
  index: Directory
  adapters: File?
  min_quality:
    type: int
    default: 20
outputs:
  reports:
    type: File[]
    outputSource: trim/trimmed
  summary:
    type: File
    outputSource: summarize/summary
steps:
  trim:
    run:
      class: CommandLineTool
      baseCommand: trim
      inputs:
        reads:
          type: File
          inputBinding: {position: 2}
        adapters:
          type: File?
          inputBinding: {prefix: -a, position: 1}
        quality:
          type: int
          inputBinding: {prefix: -q}
      outputs:
        trimmed:
          type: File
          outputBinding:
            glob: $(inputs.reads.nameroot).trimmed.fq
        log:
          type: File?
          outputBinding:
            glob: trim.log
    scatter: reads
    in:
      reads: samples
      adapters: adapters
      quality: min_quality
    out: [trimmed, log]
  summarize:
    run:
      class: CommandLineTool
      baseCommand: summarize
      inputs:
        reports:
          type: File[]
          inputBinding: {position: 1}
        index:
          type: Directory
          inputBinding: {prefix: --index}
      outputs:
        summary:
          type: File
          outputBinding:
            glob: summary.html
    in:
      reports: [trim/trimmed, trim/log]
      index: index
    out: [summary]
"#;

#[test]
fn test_single_process_block() {
    let (target, _) = convert_text(GREET_TOOL);
    assert_eq!(target.processes.len(), 1);
    assert_eq!(
        target.processes[0],
        r#"process GREET {
    tag 'greet'
    container 'public.ecr.aws/docker/library/ubuntu:22.04'
    cpus 2
    memory '4 GB'
    time '2h'

    input:
    val message

    output:
    path "hello.txt", emit: greeting

    script:
    """
    echo ${message} > hello.txt
    """
}
"#
    );
}

#[test]
fn test_sections_come_out_in_order() {
    let conversion = convert_fixture("align_sort/workflow.cwl");
    assert!(conversion.is_success(), "{:?}", conversion.error());
    let text = conversion.target.as_ref().unwrap().render();

    assert!(text.starts_with("// Generated by cwl2nf "));
    assert!(text.contains("from workflow.cwl (CWL v1.2)\n// source sha256: "));
    let banners: Vec<usize> = [
        "configuration",
        "parameters",
        "channels",
        "processes",
        "workflow",
        "profiles",
    ]
    .iter()
    .map(|name| {
        text.find(&format!("\n// ---- {} ----\n", name))
            .unwrap_or_else(|| panic!("missing {} banner", name))
    })
    .collect();
    assert!(banners.windows(2).all(|pair| pair[0] < pair[1]));

    let align = text.find("process ALIGN {").unwrap();
    let sort = text.find("process SORT {").unwrap();
    assert!(align < sort);
}

#[test]
fn test_processes_carry_mapped_directives_and_scripts() {
    let conversion = convert_fixture("align_sort/workflow.cwl");
    let target = conversion.target.unwrap();
    let align = &target.processes[0];
    assert!(align.contains("    tag 'align'\n    label 't3.xlarge'\n"));
    assert!(align.contains("container 'public.ecr.aws/biocontainers/bwa:v0.7.17'"));
    assert!(align.contains("cpus 4\n"));
    assert!(align.contains("memory '16 GB'\n"));
    assert!(align.contains("    input:\n    path reference\n    path reads\n"));
    assert!(align.contains("path \"aligned.sam\", emit: aligned"));
    assert!(align.contains("    bwa mem -t ${task.cpus} ${reference} ${reads} > aligned.sam\n"));

    let sort = &target.processes[1];
    assert!(!sort.contains("label "));
    assert!(sort.contains("container 'public.ecr.aws/biocontainers/samtools:1.17--h00cdaf9_0'"));
    assert!(sort.contains("    input:\n    val output_name\n    path input\n"));
    assert!(sort.contains("path \"${output_name}\", emit: sorted"));
    assert!(sort.contains("    samtools sort -o ${output_name} ${input}\n"));
}

#[test]
fn test_parameters_and_channels() {
    let conversion = convert_fixture("align_sort/workflow.cwl");
    let target = conversion.target.unwrap();
    assert_eq!(
        target.params,
        "nextflow.enable.dsl = 2\n\nparams.reference = null\nparams.reads = null\nparams.outdir = 'results'\n"
    );
    assert_eq!(
        target.channels,
        "reference_ch = Channel.fromPath(params.reference, checkIfExists: true)\nreads_ch = Channel.fromPath(params.reads, checkIfExists: true)\n"
    );
}

#[test]
fn test_workflow_block_wires_channels() {
    let conversion = convert_fixture("align_sort/workflow.cwl");
    let target = conversion.target.unwrap();
    assert_eq!(
        target.workflow,
        r#"workflow {
    ALIGN(reference_ch, reads_ch)
    SORT(Channel.value('sorted.bam'), ALIGN.out.aligned)

    // outputs
    SORT.out.sorted.flatten().subscribe { item -> item.copyTo("${params.outdir}/sorted_bam/${item.name}") }
}
"#
    );
}

#[test]
fn test_config_and_profiles() {
    let conversion = convert_fixture("align_sort/workflow.cwl");
    let target = conversion.target.unwrap();
    assert_snapshot!("align_sort_config", target.config);
    assert!(target.profiles.starts_with(
        "profiles {\n    small {\n        process.cpus = 2\n        process.memory = '4 GB'\n        process.time = '2h'\n    }\n    medium {\n"
    ));
    assert!(target.profiles.contains("    large {\n        process.cpus = 8\n"));
    assert!(target.profiles.ends_with("    }\n}\n"));
}

#[test]
fn test_platform_settings_reach_the_config() {
    let mut config = ConverterConfig::default();
    config.platform.queue = Some("genomics-spot".to_string());
    config.platform.region = Some("eu-west-1".to_string());
    config.platform.work_dir = Some("s3://bucket/work".to_string());
    let conversion = Converter::new(&config).convert_file(&fixture("align_sort/workflow.cwl"));
    let target = conversion.target.unwrap();

    assert!(target
        .config
        .contains("    executor = 'awsbatch'\n    queue = 'genomics-spot'\n"));
    assert!(target.config.ends_with("}\n\naws {\n    region = 'eu-west-1'\n}\n\nworkDir = 's3://bucket/work'\n"));
}

#[test]
fn test_scatter_merge_and_optional_shapes() {
    let (target, conversion) = convert_text(QC_WORKFLOW);

    assert_eq!(
        target.channels,
        [
            "samples_ch = Channel.fromPath(params.samples, checkIfExists: true).collect()",
            "index_ch = Channel.fromPath(params.index, type: 'dir', checkIfExists: true)",
            "adapters_ch = params.adapters ? Channel.fromPath(params.adapters, checkIfExists: true) : Channel.value([])",
            "min_quality_ch = Channel.value(params.min_quality)",
        ]
        .join("\n")
            + "\n"
    );
    assert!(target.params.contains("params.min_quality = 20\n"));

    assert!(target.workflow.contains("    TRIM(samples_ch.flatten(), adapters_ch, min_quality_ch)\n"));
    assert!(target
        .workflow
        .contains("    SUMMARIZE(TRIM.out.trimmed.mix(TRIM.out.log).collect(), index_ch)\n"));
    assert!(target.workflow.contains("SUMMARIZE.out.summary.flatten().subscribe"));

    let trim = &target.processes[0];
    assert!(trim.contains("path \"${reads.baseName}.trimmed.fq\", emit: trimmed\n"));
    assert!(trim.contains("path \"trim.log\", emit: log, optional: true\n"));
    assert!(trim.contains("trim -q ${quality} ${adapters ? '-a ' + adapters : ''} ${reads}\n"));

    let summarize = &target.processes[1];
    assert!(summarize.contains("    path reports\n    path index\n"));
    assert!(summarize.contains("summarize --index ${index} ${reports}\n"));
    assert!(!conversion.diagnostics.has_errors());
}

#[test]
fn test_expression_tool_becomes_exec_block() {
    let (target, conversion) = convert_text(
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
    let process = &target.processes[0];
    assert!(process.contains("    val result, emit: result\n"));
    assert!(process.contains("    exec:\n    // ExpressionTool body not translated:\n"));
    assert!(process.contains("    result = null\n"));
    assert!(target
        .workflow
        .contains("DOUBLE.out.result.subscribe { value -> println \"doubled: ${value}\" }"));
    assert_eq!(conversion.diagnostics.with_code("CWL-EMIT-003").count(), 1);
}

#[test]
fn test_unconnected_required_input_is_reported() {
    let (target, conversion) = convert_text(
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
        mode:
          type: string
          inputBinding: {prefix: --mode}
      stdout: count.txt
      outputs:
        out: stdout
    in:
      file: reads
    out: [out]
"#,
    );
    assert!(target.workflow.contains("COUNT(reads_ch, Channel.value([]))"));
    let warning = conversion.diagnostics.with_code("CWL-MODEL-006").next().unwrap();
    assert_eq!(warning.location.as_deref(), Some("steps.count.in.mode"));
}

#[test]
fn test_untranslatable_glob_is_kept_with_warning() {
    let (target, conversion) = convert_text(
        r#"
cwlVersion: v1.2
class: CommandLineTool
id: pick
baseCommand: pick
inputs: []
outputs:
  picked:
    type: File
    outputBinding:
      glob: ${ return "x.txt"; }
"#,
    );
    assert!(target.processes[0].contains("path \"\\${ return \\\"x.txt\\\"; }\", emit: picked"));
    assert_eq!(conversion.diagnostics.with_code("CWL-EMIT-002").count(), 1);
}

#[test]
fn test_colliding_step_ids_get_distinct_process_names() {
    let (target, _) = convert_text(
        r#"
cwlVersion: v1.2
class: Workflow
inputs:
  msg: string
outputs:
  first:
    type: File
    outputSource: say-it/out
  second:
    type: File
    outputSource: say_it/out
steps:
  say-it:
    run:
      class: CommandLineTool
      baseCommand: echo
      inputs:
        msg: string
      stdout: a.txt
      outputs:
        out: stdout
    in: {msg: msg}
    out: [out]
  say_it:
    run:
      class: CommandLineTool
      baseCommand: echo
      inputs:
        msg: string
      stdout: b.txt
      outputs:
        out: stdout
    in: {msg: msg}
    out: [out]
"#,
    );
    assert!(target.processes[0].starts_with("process SAY_IT {"));
    assert!(target.processes[1].starts_with("process SAY_IT_2 {"));
    assert!(target.workflow.contains("SAY_IT_2.out.out.flatten()"));
}

#[test]
fn test_output_is_deterministic() {
    let first = convert_fixture("align_sort/workflow.cwl").target.unwrap();
    let second = convert_fixture("align_sort/workflow.cwl").target.unwrap();
    assert_eq!(first.render(), second.render());
}

#[test]
fn test_script_and_config_files_split_the_sections() {
    let target = convert_fixture("align_sort/workflow.cwl").target.unwrap();

    let script = target.script_text();
    assert!(script.starts_with(&target.header));
    assert!(script.contains("nextflow.enable.dsl = 2"));
    assert!(script.contains("process ALIGN {"));
    assert!(script.contains("workflow {"));
    assert!(!script.contains("manifest {"));
    assert!(!script.contains("profiles {"));
    assert!(!script.contains("// ----"));

    let config = target.config_text();
    assert!(config.starts_with(&target.header));
    assert!(config.contains("manifest {"));
    assert!(config.contains("profiles {"));
    assert!(!config.contains("process ALIGN"));
}

const COUNTING_TOOL: &str = r#"
cwlVersion: v1.2
class: CommandLineTool
id: count
baseCommand: count-lines
inputs:
  bam:
    type: File
    secondaryFiles: [.bai]
outputs:
  lines:
    type: int
    outputBinding:
      glob: n.txt
      loadContents: true
      outputEval: $(parseInt(self[0].contents))
  bam:
    type: File
    secondaryFiles: [{pattern: .bai, required: true}, ^.csi]
    outputBinding:
      glob: "*.bam"
"#;

#[test]
fn test_value_outputs_are_captured_from_file_contents() {
    let (target, conversion) = convert_text(COUNTING_TOOL);
    let process = &target.processes[0];

    assert!(process.contains("    env lines_value, emit: lines\n"));
    assert!(!process.contains("path \"n.txt\""));
    assert!(process.contains("    lines_value=\\$(cat n.txt)\n"));
    assert_eq!(conversion.diagnostics.with_code("CWL-EMIT-002").count(), 0);
}

#[test]
fn test_secondary_files_get_their_own_channels() {
    let (target, conversion) = convert_text(COUNTING_TOOL);
    let process = &target.processes[0];

    assert!(process.contains(
        "    path \"*.bam\", emit: bam\n    path \"*.bam.bai\", emit: bam_secondary\n    path \"*.csi\", emit: bam_secondary2, optional: true\n"
    ));
    let degraded: Vec<_> = conversion.diagnostics.with_code("CWL-MODEL-006").collect();
    assert!(degraded
        .iter()
        .any(|d| d.location.as_deref() == Some("outputs.bam") && d.message.contains("separate channels")));
    assert!(degraded
        .iter()
        .any(|d| d.location.as_deref() == Some("inputs.bam") && d.message.contains("not staged")));
}

#[test]
fn test_untranslatable_output_eval_is_reported() {
    let (target, conversion) = convert_text(
        r#"
cwlVersion: v1.2
class: CommandLineTool
id: stats
baseCommand: stats
inputs: []
outputs:
  total:
    type: int
    outputBinding:
      glob: stats.json
      loadContents: true
      outputEval: $(JSON.parse(self[0].contents).total)
  label:
    type: string
"#,
    );
    let process = &target.processes[0];
    assert!(process.contains("    env total_value, emit: total\n    env label_value, emit: label\n"));
    assert!(process.contains("    total_value=\\$(cat stats.json)\n    label_value=\"\"\n"));

    let untranslated: Vec<_> = conversion.diagnostics.with_code("CWL-EMIT-002").collect();
    assert_eq!(untranslated.len(), 1);
    assert!(untranslated[0].message.contains("JSON.parse"));
    assert!(conversion
        .diagnostics
        .with_code("CWL-MODEL-006")
        .any(|d| d.message.contains("'label' has neither glob nor outputEval")));
}

#[test]
fn test_workflow_input_named_outdir_is_renamed() {
    let (target, conversion) = convert_text(
        r#"
cwlVersion: v1.2
class: Workflow
inputs:
  outdir:
    type: string
    default: reports
outputs:
  listing:
    type: File
    outputSource: list/out
steps:
  list:
    run:
      class: CommandLineTool
      baseCommand: ls
      inputs:
        dir:
          type: string
          inputBinding: {position: 1}
      stdout: listing.txt
      outputs:
        out: stdout
    in: {dir: outdir}
    out: [out]
"#,
    );
    assert!(target.params.contains("params.outdir_2 = 'reports'\n"));
    assert_eq!(target.params.matches("params.outdir =").count(), 1);
    assert!(target.channels.contains("outdir_2_ch = Channel.value(params.outdir_2)"));
    assert!(target.workflow.contains("LIST(outdir_2_ch)"));

    let renamed = conversion
        .diagnostics
        .with_code("CWL-MODEL-006")
        .find(|d| d.location.as_deref() == Some("inputs.outdir"))
        .unwrap();
    assert!(renamed.message.contains("exposed as params.outdir_2"));
}

#[test]
fn test_colliding_input_names_stay_distinct() {
    let (target, conversion) = convert_text(
        r#"
cwlVersion: v1.2
class: Workflow
inputs:
  read-1: File
  read_1: File
outputs:
  merged:
    type: File
    outputSource: join/merged
steps:
  join:
    run:
      class: CommandLineTool
      baseCommand: cat
      inputs:
        read-1:
          type: File
          inputBinding: {position: 1}
        read_1:
          type: File
          inputBinding: {position: 2}
      stdout: merged.txt
      outputs:
        merged: stdout
    in:
      read-1: read-1
      read_1: read_1
    out: [merged]
"#,
    );
    assert!(target.params.contains("params.read_1 = null\nparams.read_1_2 = null\n"));
    assert!(target.channels.contains("read_1_ch = Channel.fromPath(params.read_1, checkIfExists: true)"));
    assert!(target.channels.contains("read_1_2_ch = Channel.fromPath(params.read_1_2, checkIfExists: true)"));
    assert!(target.workflow.contains("JOIN(read_1_ch, read_1_2_ch)"));

    let process = &target.processes[0];
    assert!(process.contains("    path read_1\n    path read_1_2\n"));
    assert!(process.contains("cat ${read_1} ${read_1_2}"));
    assert_eq!(
        conversion
            .diagnostics
            .with_code("CWL-MODEL-006")
            .filter(|d| d.location.as_deref() == Some("inputs.read_1"))
            .count(),
        1
    );
}

#[test]
fn test_healthomics_flavor_config_and_profiles() {
    let mut config = ConverterConfig::default();
    config.platform.flavor = PlatformFlavor::HealthOmics;
    let (target, _) = convert_text_with(&config, GREET_TOOL);

    assert!(target.config.contains(
        "aws {\n    region = 'us-east-1'\n    batch {\n        cliPath = '/usr/local/bin/aws'\n    }\n}\n"
    ));
    assert!(target.config.contains("    withName: '.*' {\n        errorStrategy = 'retry'\n"));
    assert!(target.config.contains("beforeScript = 'echo \"starting task in $PWD\"'"));
    assert!(target.profiles.contains(
        "    healthomics {\n        process.executor = 'awsbatch'\n        aws.region = 'us-east-1'\n    }\n"
    ));
    assert!(target.profiles.contains("    healthomics_dev {\n        process.cpus = 1\n"));
    assert!(target.profiles.contains("    healthomics_prod {\n        process.cpus = 4\n"));
}

#[test]
fn test_batch_flavor_has_no_healthomics_blocks() {
    let (target, _) = convert_text(GREET_TOOL);
    assert!(!target.config.contains("withName"));
    assert!(!target.profiles.contains("healthomics"));
}

#[test]
fn test_custom_template_lays_out_the_script() {
    let mut config = ConverterConfig::default();
    config.script_template = Some(Template::new(
        "custom",
        "{{ header }}\n// pipeline maintained by the genomics team\n{{ params }}\n{{ processes }}\n{{ workflow }}\n",
    ));
    let (target, _) = convert_text_with(&config, GREET_TOOL);

    let script = target.script_text();
    assert!(script.starts_with(&target.header));
    assert!(script.contains("// pipeline maintained by the genomics team\nnextflow.enable.dsl = 2"));
    assert!(script.contains("process GREET {"));
    assert!(!script.contains("message_ch = "));
}

#[test]
fn test_pinned_instance_type_labels_every_process() {
    let mut config = ConverterConfig::default();
    let entry = config.capabilities[0].clone();
    config.platform.instance_type = Some(entry.label.clone());
    let (target, _) = convert_text_with(&config, QC_WORKFLOW);

    let class = entry.instance_class.clone().unwrap_or_else(|| entry.label.clone());
    for process in &target.processes {
        assert!(process.contains(&format!("label '{}'", class)));
        let cpus: u32 = process
            .lines()
            .find_map(|line| line.trim().strip_prefix("cpus "))
            .and_then(|value| value.parse().ok())
            .unwrap();
        assert!(cpus <= entry.cpus);
    }
}

#[test]
fn test_wrapped_tool_diagnostics_point_at_root() {
    let (_, conversion) = convert_text(
        r#"
cwlVersion: v1.2
class: CommandLineTool
id: bare
baseCommand: "true"
inputs: []
outputs: []
"#,
    );
    let applied = conversion.diagnostics.with_code("CWL-IMG-002").next().unwrap();
    assert_eq!(applied.location.as_deref(), Some(""));
    assert!(applied.to_string().contains(":<root>: "));
}
