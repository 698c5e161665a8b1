//! Target emitter: renders the decorated workflow model as Nextflow DSL2 text.
//!
//! Sections always come out in the same order: configuration, parameters, channels,
//! processes (one per step, in resolved order), the workflow block and the profiles. The
//! emitter reads nothing but its arguments, so identical input yields identical text.

use crate::core::config::{ConverterConfig, PlatformFlavor, ProfilePreset};
use crate::core::cwl::loader::CwlVersion;
use crate::core::cwl::model::{CommandLineTool, Document, Parameter, SourceRef, Step, StepRun, Workflow};
use crate::core::cwl::requirements::is_expression;
use crate::core::cwl::types::ScalarType;
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::error::AppError;
use crate::core::graph::ExecutionOrder;
use crate::core::mapping::containers::RegistryKind;
use crate::core::mapping::quantity::ByteQuantity;
use crate::core::nextflow::script::{
    build_script, escape_literal, input_identifiers, translate, Scope,
};
use crate::core::nextflow::template::{
    groovy_literal, groovy_string, identifier, process_name, Bindings, Identifiers, Template,
};
use crate::core::types::ErrorCategory;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Parameter names the emitter defines itself.
const RESERVED_PARAMS: &[&str] = &["outdir"];

/// Region written for the HealthOmics flavor when the configuration names none.
const HEALTHOMICS_DEFAULT_REGION: &str = "us-east-1";

const PROCESS_TEMPLATE: Template = Template::new(
    "process",
    r#"process {{ name }} {
    {{ directives }}

    {{ input_block }}

    output:
    {{ outputs }}

    {{ body_kind }}:
    {{ body }}
}"#,
);

const WORKFLOW_TEMPLATE: Template = Template::new(
    "workflow",
    r#"workflow {
    {{ invocations }}

    // outputs
    {{ publish }}
}"#,
);

const CONFIG_TEMPLATE: Template = Template::new(
    "config",
    r#"manifest {
    name = {{ manifest_name }}
    {{ manifest_description }}
    nextflowVersion = '>=23.04.0'
}

docker.enabled = true

process {
    executor = {{ executor }}
    {{ queue }}
    errorStrategy = {{ error_strategy }}
    maxRetries = {{ max_retries }}
}
{{ platform_extra }}"#,
);

const HEALTHOMICS_PROCESS_TEMPLATE: Template = Template::new(
    "healthomics-process",
    r#"
process {
    withName: '.*' {
        errorStrategy = {{ error_strategy }}
        maxRetries = {{ max_retries }}
        beforeScript = 'echo "starting task in $PWD"'
    }
}"#,
);

const PROFILE_TEMPLATE: Template = Template::new(
    "profile",
    r#"{{ profile }} {
    process.cpus = {{ cpus }}
    process.memory = {{ memory }}
    process.time = {{ time }}
}"#,
);

/// Where the emitted text came from, recorded in its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub file_name: String,
    pub version: CwlVersion,
    pub sha256: String,
}

impl Provenance {
    pub fn new(path: &Path, version: CwlVersion, source_text: &str) -> Self {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Provenance {
            file_name,
            version,
            sha256: hex::encode(Sha256::digest(source_text.as_bytes())),
        }
    }

    fn header(&self) -> String {
        format!(
            "// Generated by cwl2nf {} from {} (CWL {})\n// source sha256: {}\n",
            crate::VERSION,
            self.file_name,
            self.version,
            self.sha256
        )
    }
}

/// Emitted text, split into its sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDocument {
    /// Complete `.nf` script, laid out by the configured template or the default order.
    pub script: String,
    pub header: String,
    pub config: String,
    pub params: String,
    pub channels: String,
    pub processes: Vec<String>,
    pub workflow: String,
    pub profiles: String,
}

impl TargetDocument {
    /// All six sections in order, each under a banner comment.
    pub fn render(&self) -> String {
        let mut text = self.header.clone();
        let sections: [(&str, String); 6] = [
            ("configuration", self.config.clone()),
            ("parameters", self.params.clone()),
            ("channels", self.channels.clone()),
            ("processes", self.processes.join("\n")),
            ("workflow", self.workflow.clone()),
            ("profiles", self.profiles.clone()),
        ];
        for (name, body) in sections {
            text.push_str(&format!("\n// ---- {} ----\n", name));
            text.push_str(&body);
        }
        text
    }

    /// Content of the `.nf` script: parameters, channels, processes and workflow.
    pub fn script_text(&self) -> String {
        self.script.clone()
    }

    fn default_script(&self) -> String {
        let mut text = self.header.clone();
        for section in [&self.params, &self.channels] {
            text.push('\n');
            text.push_str(section);
        }
        for process in &self.processes {
            text.push('\n');
            text.push_str(process);
        }
        text.push('\n');
        text.push_str(&self.workflow);
        text
    }

    /// Lay the sections out with a user template. Placeholders: `header`, `config`,
    /// `params`, `channels`, `processes`, `workflow` and `profiles`.
    fn templated_script(&self, template: &Template) -> Result<String, AppError> {
        let mut bindings = Bindings::new();
        bindings
            .set("header", self.header.clone())
            .set("config", self.config.clone())
            .set("params", self.params.clone())
            .set("channels", self.channels.clone())
            .set("processes", self.processes.join("\n"))
            .set("workflow", self.workflow.clone())
            .set("profiles", self.profiles.clone());
        template.render(&bindings)
    }

    /// Content of `nextflow.config`: configuration and profiles.
    pub fn config_text(&self) -> String {
        format!("{}\n{}\n{}", self.header, self.config, self.profiles)
    }
}


/// Identifiers for everything the emitted text names, unique within their scope.
struct Naming {
    processes: Identifiers,
    /// Workflow inputs: `params.<ident>` and `<ident>_ch`.
    params: Identifiers,
    /// Workflow outputs: publish subdirectories.
    published: Identifiers,
    /// Per step: output emit names, secondary file channels included.
    emits: HashMap<String, Identifiers>,
}

impl Naming {
    fn new(workflow: &Workflow) -> Self {
        let emits = workflow
            .steps
            .iter()
            .map(|step| {
                let mut keys: Vec<String> = Vec::new();
                for output in &step.outputs {
                    keys.push(output.clone());
                    if let Some(param) = step.run.output(output) {
                        keys.extend(
                            (0..param.secondary_files.len()).map(|index| secondary_key(output, index)),
                        );
                    }
                }
                let idents = Identifiers::assign(keys.iter().map(String::as_str), &[], identifier);
                (step.id.clone(), idents)
            })
            .collect();
        Naming {
            processes: Identifiers::assign(
                workflow.steps.iter().map(|step| step.id.as_str()),
                &[],
                process_name,
            ),
            params: Identifiers::assign(
                workflow.inputs.iter().map(|param| param.name.as_str()),
                RESERVED_PARAMS,
                identifier,
            ),
            published: Identifiers::assign(
                workflow.outputs.iter().map(|param| param.name.as_str()),
                &[],
                identifier,
            ),
            emits,
        }
    }

    fn process(&self, step: &str) -> String {
        self.processes.get(step)
    }

    fn emit(&self, step: &str, output: &str) -> String {
        match self.emits.get(step) {
            Some(emits) => emits.get(output),
            None => identifier(output),
        }
    }
}

/// Emit key of the `index`-th secondary file of `output`; `/` never occurs in CWL names.
fn secondary_key(output: &str, index: usize) -> String {
    match index {
        0 => format!("{}/secondary", output),
        _ => format!("{}/secondary{}", output, index + 1),
    }
}

/// `outputEval` forms that only read the contents of the first glob match.
fn contents_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\$\(\s*(?:(?:parseInt|parseFloat|Number)\(\s*)?self\[0\]\.contents(?:\.trim\(\))?\s*\)?\s*\)$",
        )
        .expect("contents pattern is valid")
    })
}

/// Renders a decorated document with the platform constants of one configuration.
pub struct Emitter<'a> {
    config: &'a ConverterConfig,
}

impl<'a> Emitter<'a> {
    pub fn new(config: &'a ConverterConfig) -> Self {
        Emitter { config }
    }

    pub fn emit(
        &self,
        document: &Document,
        order: &ExecutionOrder,
        provenance: &Provenance,
        diagnostics: &mut Diagnostics,
    ) -> Result<TargetDocument, AppError> {
        let workflow = &document.workflow;
        let naming = Naming::new(workflow);
        report_renamed_params(workflow, &naming, diagnostics);

        let mut processes = Vec::with_capacity(workflow.steps.len());
        let mut invocations = Vec::with_capacity(workflow.steps.len());
        for step in order.steps(workflow) {
            processes.push(self.process_block(step, &naming, diagnostics)?);
            invocations.push(invocation(step, &naming, diagnostics));
        }

        let publish: Vec<String> = workflow
            .outputs
            .iter()
            .map(|output| publish_line(output, &naming))
            .collect();
        let mut bindings = Bindings::new();
        bindings
            .set("invocations", invocations.join("\n"))
            .set("publish", publish.join("\n"));
        let workflow_block = WORKFLOW_TEMPLATE.render(&bindings)?;

        let mut target = TargetDocument {
            script: String::new(),
            header: provenance.header(),
            config: self.config_block(document)?,
            params: self.params_block(document, &naming),
            channels: channels_block(&workflow.inputs, &naming),
            processes,
            workflow: workflow_block,
            profiles: self.profiles_block()?,
        };
        target.script = match &self.config.script_template {
            Some(template) => target.templated_script(template)?,
            None => target.default_script(),
        };

        debug!(
            processes = target.processes.len(),
            outputs = workflow.outputs.len(),
            templated = self.config.script_template.is_some(),
            "emitted nextflow document"
        );
        Ok(target)
    }

    fn config_block(&self, document: &Document) -> Result<String, AppError> {
        let platform = &self.config.platform;
        let healthomics = platform.flavor == PlatformFlavor::HealthOmics;
        let description = document.label.as_ref().or(document.doc.as_ref());

        let mut extra = Vec::new();
        let region = match platform.flavor {
            PlatformFlavor::HealthOmics => {
                Some(platform.region.as_deref().unwrap_or(HEALTHOMICS_DEFAULT_REGION))
            }
            PlatformFlavor::Batch => platform.region.as_deref(),
        };
        if let Some(region) = region {
            let mut aws = vec![format!("    region = {}", groovy_string(region))];
            if healthomics {
                aws.push("    batch {\n        cliPath = '/usr/local/bin/aws'\n    }".to_string());
            }
            extra.push(format!("\naws {{\n{}\n}}", aws.join("\n")));
        }
        if let Some(work_dir) = &platform.work_dir {
            extra.push(format!("\nworkDir = {}", groovy_string(work_dir)));
        }
        if healthomics {
            let mut bindings = Bindings::new();
            bindings
                .set("error_strategy", groovy_string(&platform.error_strategy))
                .set("max_retries", platform.max_retries.to_string());
            extra.push(HEALTHOMICS_PROCESS_TEMPLATE.render(&bindings)?.trim_end().to_string());
        }

        let mut bindings = Bindings::new();
        bindings
            .set("manifest_name", groovy_string(&document.id))
            .set(
                "manifest_description",
                description
                    .map(|text| format!("description = {}", groovy_string(first_line(text))))
                    .unwrap_or_default(),
            )
            .set("executor", groovy_string(&platform.executor))
            .set(
                "queue",
                platform
                    .queue
                    .as_ref()
                    .map(|queue| format!("queue = {}", groovy_string(queue)))
                    .unwrap_or_default(),
            )
            .set("error_strategy", groovy_string(&platform.error_strategy))
            .set("max_retries", platform.max_retries.to_string())
            .set("platform_extra", extra.join("\n"));
        CONFIG_TEMPLATE.render(&bindings)
    }

    fn params_block(&self, document: &Document, naming: &Naming) -> String {
        let mut lines = vec!["nextflow.enable.dsl = 2".to_string(), String::new()];
        for input in &document.workflow.inputs {
            let value = input
                .default
                .as_ref()
                .map(groovy_literal)
                .unwrap_or_else(|| "null".to_string());
            lines.push(format!("params.{} = {}", naming.params.get(&input.name), value));
        }
        lines.push(format!("params.outdir = {}", groovy_string(&self.config.outdir)));
        lines.join("\n") + "\n"
    }

    fn profiles_block(&self) -> Result<String, AppError> {
        let mut blocks = Vec::with_capacity(self.config.profiles.len() + 3);
        for (name, preset) in &self.config.profiles {
            blocks.push(profile_block(name, preset)?);
        }
        if self.config.platform.flavor == PlatformFlavor::HealthOmics {
            let region = self
                .config
                .platform
                .region
                .as_deref()
                .unwrap_or(HEALTHOMICS_DEFAULT_REGION);
            if !self.config.profiles.contains_key("healthomics") {
                blocks.push(format!(
                    "healthomics {{\n    process.executor = 'awsbatch'\n    aws.region = {}\n}}\n",
                    groovy_string(region)
                ));
            }
            let presets = [
                ("healthomics_dev", ProfilePreset::new(1, ByteQuantity::from_gibibytes(2), 1)),
                ("healthomics_prod", ProfilePreset::new(4, ByteQuantity::from_gibibytes(16), 8)),
            ];
            for (name, preset) in presets {
                if !self.config.profiles.contains_key(name) {
                    blocks.push(profile_block(name, &preset)?);
                }
            }
        }
        let body: Vec<String> = blocks
            .iter()
            .flat_map(|block| block.lines().map(|line| format!("    {}", line)))
            .collect();
        Ok(format!("profiles {{\n{}\n}}\n", body.join("\n")))
    }

    fn process_block(
        &self,
        step: &Step,
        naming: &Naming,
        diagnostics: &mut Diagnostics,
    ) -> Result<String, AppError> {
        let missing = |what: &str| {
            AppError::new(
                ErrorCategory::TemplateRender,
                format!("step '{}' has no {} to render", step.id, what),
            )
            .with_field(step.field_path.clone())
        };
        let shape = step.shape.as_ref().ok_or_else(|| missing("compute shape"))?;
        let container = step.container.as_ref().ok_or_else(|| missing("container"))?;
        let name = naming.process(&step.id);

        let mut directives = vec![format!("tag {}", groovy_string(&step.id))];
        if let Some(class) = &shape.instance_class {
            directives.push(format!("label {}", groovy_string(class)));
        }
        if container.registry_kind == RegistryKind::Unmapped {
            directives.push("// registry not mapped; image used as declared".to_string());
        }
        directives.push(format!("container {}", groovy_string(&container.target_image)));
        directives.push(format!("cpus {}", shape.cpus));
        directives.push(format!("memory {}", groovy_string(&shape.memory.to_nextflow())));
        directives.push(format!("time {}", groovy_string(&shape.time_directive())));
        if let Some(disk) = shape.disk {
            directives.push(format!("disk {}", groovy_string(&disk.to_nextflow())));
        }

        let inputs = step.run.inputs();
        let idents = input_identifiers(inputs);
        let input_block = if inputs.is_empty() {
            String::new()
        } else {
            let mut lines = vec!["input:".to_string()];
            lines.extend(inputs.iter().map(|param| {
                let qualifier = if param.param_type.is_path() { "path" } else { "val" };
                format!("{} {}", qualifier, idents.get(&param.name))
            }));
            lines.join("\n")
        };
        for param in inputs.iter().filter(|param| !param.secondary_files.is_empty()) {
            let patterns: Vec<&str> = param
                .secondary_files
                .iter()
                .map(|secondary| secondary.pattern.as_str())
                .collect();
            diagnostics.push(
                Diagnostic::warning(
                    "CWL-MODEL-006",
                    param.field_path.clone(),
                    format!(
                        "secondary files ({}) of input '{}' in step '{}' are not staged with it",
                        patterns.join(", "),
                        param.name,
                        step.id
                    ),
                )
                .with_suggestion("pass the secondary files as an input of their own"),
            );
        }

        let (outputs, body_kind, body) = match &step.run {
            StepRun::Tool(tool) => {
                let scope = Scope::new(&tool.inputs, &idents);
                let mut outputs = Vec::new();
                let mut captures = Vec::new();
                for output_name in &step.outputs {
                    let Some(param) = step.run.output(output_name) else {
                        continue;
                    };
                    let emit = naming.emit(&step.id, &param.name);
                    let pattern = glob_pattern(param, &scope, diagnostics);
                    if param.param_type.is_path() {
                        outputs.extend(path_outputs(step, tool, param, pattern, &emit, naming, diagnostics));
                    } else {
                        outputs.push(value_output(param, pattern, &emit, &scope, &mut captures, diagnostics));
                    }
                }
                let mut script = build_script(
                    tool,
                    &idents,
                    step.requirements.env_vars(),
                    &step.field_path,
                    diagnostics,
                );
                script.lines.extend(captures);
                (outputs, "script", script.render())
            }
            StepRun::Expression(tool) => {
                diagnostics.push(
                    Diagnostic::warning(
                        "CWL-EMIT-003",
                        step.field_path.clone(),
                        format!(
                            "ExpressionTool '{}' is not translated; its outputs are emitted as null",
                            tool.id
                        ),
                    )
                    .with_suggestion("port the expression to a small script tool"),
                );
                let emits: Vec<String> = step
                    .outputs
                    .iter()
                    .map(|output| naming.emit(&step.id, output))
                    .collect();
                let outputs: Vec<String> = emits
                    .iter()
                    .map(|emit| format!("val {}, emit: {}", emit, emit))
                    .collect();
                let mut body: Vec<String> = vec!["// ExpressionTool body not translated:".to_string()];
                body.extend(tool.expression.lines().map(|line| format!("// {}", line)));
                body.extend(emits.iter().map(|emit| format!("{} = null", emit)));
                (outputs, "exec", body.join("\n"))
            }
        };

        let mut bindings = Bindings::new();
        bindings
            .set("name", name)
            .set("directives", directives.join("\n"))
            .set("input_block", input_block)
            .set("outputs", outputs.join("\n"))
            .set("body_kind", body_kind)
            .set("body", body);
        PROCESS_TEMPLATE
            .render(&bindings)
            .map_err(|err| err.with_field(step.field_path.clone()))
    }
}

fn profile_block(name: &str, preset: &ProfilePreset) -> Result<String, AppError> {
    let mut bindings = Bindings::new();
    bindings
        .set("profile", identifier(name))
        .set("cpus", preset.cpus.to_string())
        .set("memory", groovy_string(&preset.memory.to_nextflow()))
        .set(
            "time",
            groovy_string(&crate::core::mapping::resources::format_duration(preset.time)),
        );
    PROFILE_TEMPLATE.render(&bindings)
}

/// Warn about workflow inputs whose parameter name had to change.
fn report_renamed_params(workflow: &Workflow, naming: &Naming, diagnostics: &mut Diagnostics) {
    for (name, ident) in naming.params.renamed() {
        let Some(input) = workflow.input(name) else {
            continue;
        };
        let base = identifier(name);
        let reason = if RESERVED_PARAMS.contains(&base.as_str()) {
            format!("params.{} is the publish directory", base)
        } else {
            format!("another input is also named {}", base)
        };
        diagnostics.push(Diagnostic::warning(
            "CWL-MODEL-006",
            input.field_path.clone(),
            format!("workflow input '{}' is exposed as params.{}; {}", name, ident, reason),
        ));
    }
}

/// Translated glob of a tool output, if it has one.
fn glob_pattern(param: &Parameter, scope: &Scope<'_>, diagnostics: &mut Diagnostics) -> Option<String> {
    let glob = param
        .output_binding
        .as_ref()
        .and_then(|binding| binding.glob.as_deref())?;
    let translation = translate(glob, scope);
    for expression in &translation.untranslated {
        diagnostics.push(Diagnostic::warning(
            "CWL-EMIT-002",
            param.field_path.clone(),
            format!(
                "glob expression {} of output '{}' cannot be translated; kept verbatim",
                expression, param.name
            ),
        ));
    }
    Some(translation.text)
}

/// `path` declarations of a File or Directory output: the primary files, then one channel
/// per secondary file pattern.
fn path_outputs(
    step: &Step,
    tool: &CommandLineTool,
    param: &Parameter,
    pattern: Option<String>,
    emit: &str,
    naming: &Naming,
    diagnostics: &mut Diagnostics,
) -> Vec<String> {
    let pattern = pattern.unwrap_or_else(|| {
        diagnostics.push(Diagnostic::warning(
            "CWL-EMIT-002",
            param.field_path.clone(),
            format!(
                "output '{}' of tool '{}' has no glob; expecting a file named '{}'",
                param.name, tool.id, param.name
            ),
        ));
        escape_literal(&param.name)
    });
    if let Some(output_eval) = param
        .output_binding
        .as_ref()
        .and_then(|binding| binding.output_eval.as_deref())
    {
        diagnostics.push(Diagnostic::warning(
            "CWL-EMIT-002",
            param.field_path.clone(),
            format!(
                "outputEval {} of output '{}' is not applied; the files matching its glob are emitted",
                output_eval, param.name
            ),
        ));
    }

    let optional = param.param_type.is_optional();
    let mut outputs = vec![path_declaration(&pattern, emit, optional)];
    for (index, secondary) in param.secondary_files.iter().enumerate() {
        let Some(secondary_pattern) = secondary.apply(&pattern) else {
            diagnostics.push(Diagnostic::warning(
                "CWL-EMIT-002",
                param.field_path.clone(),
                format!(
                    "secondary file pattern {} of output '{}' cannot be translated; it is not collected",
                    secondary.pattern, param.name
                ),
            ));
            continue;
        };
        let secondary_emit = naming.emit(&step.id, &secondary_key(&param.name, index));
        outputs.push(path_declaration(
            &secondary_pattern,
            &secondary_emit,
            optional || !secondary.required,
        ));
    }
    if !param.secondary_files.is_empty() {
        diagnostics.push(
            Diagnostic::warning(
                "CWL-MODEL-006",
                param.field_path.clone(),
                format!(
                    "secondary files of output '{}' are emitted on separate channels; consumers do not receive them with the primary file",
                    param.name
                ),
            )
            .with_suggestion(format!(
                "connect {}.out.{} where the secondary files are needed",
                naming.process(&step.id),
                naming.emit(&step.id, &secondary_key(&param.name, 0))
            )),
        );
    }
    outputs
}

fn path_declaration(pattern: &str, emit: &str, optional: bool) -> String {
    let optional = if optional { ", optional: true" } else { "" };
    format!("path \"{}\", emit: {}{}", pattern, emit, optional)
}

/// `env` declaration of a non-file output. The value is captured in a shell variable at the
/// end of the script: the contents of the glob match, or the translated `outputEval`.
fn value_output(
    param: &Parameter,
    pattern: Option<String>,
    emit: &str,
    scope: &Scope<'_>,
    captures: &mut Vec<String>,
    diagnostics: &mut Diagnostics,
) -> String {
    let binding = param.output_binding.as_ref();
    let load_contents = binding.is_some_and(|binding| binding.load_contents);
    let output_eval = binding.and_then(|binding| binding.output_eval.as_deref());
    let variable = format!("{}_value", emit);

    let capture = match (pattern, output_eval) {
        (Some(pattern), output_eval) => {
            match output_eval {
                Some(output_eval) if contents_pattern().is_match(output_eval.trim()) => {}
                Some(output_eval) => diagnostics.push(Diagnostic::warning(
                    "CWL-EMIT-002",
                    param.field_path.clone(),
                    format!(
                        "outputEval {} of output '{}' cannot be translated; the contents of {} are emitted instead",
                        output_eval, param.name, pattern
                    ),
                )),
                None if load_contents => {}
                None => diagnostics.push(Diagnostic::warning(
                    "CWL-MODEL-006",
                    param.field_path.clone(),
                    format!(
                        "{} output '{}' binds files without loadContents or outputEval; the contents of {} are emitted",
                        param.param_type, param.name, pattern
                    ),
                )),
            }
            format!("{}=\\$(cat {})", variable, pattern)
        }
        (None, Some(output_eval)) => {
            let translation = translate(output_eval, scope);
            for expression in &translation.untranslated {
                diagnostics.push(Diagnostic::warning(
                    "CWL-EMIT-002",
                    param.field_path.clone(),
                    format!(
                        "outputEval {} of output '{}' cannot be translated; kept verbatim",
                        expression, param.name
                    ),
                ));
            }
            format!("{}=\"{}\"", variable, translation.text)
        }
        (None, None) => {
            diagnostics.push(Diagnostic::warning(
                "CWL-MODEL-006",
                param.field_path.clone(),
                format!(
                    "{} output '{}' has neither glob nor outputEval; it is emitted empty",
                    param.param_type, param.name
                ),
            ));
            format!("{}=\"\"", variable)
        }
    };
    captures.push(capture);
    format!("env {}, emit: {}", variable, emit)
}

fn channels_block(inputs: &[Parameter], naming: &Naming) -> String {
    let mut lines = Vec::with_capacity(inputs.len());
    for input in inputs {
        let ident = naming.params.get(&input.name);
        let param = format!("params.{}", ident);
        let param_type = &input.param_type;
        let channel = if param_type.is_path() {
            let dir = if param_type.base_scalar() == ScalarType::Directory {
                ", type: 'dir'"
            } else {
                ""
            };
            let from_path = format!("Channel.fromPath({}{}, checkIfExists: true)", param, dir);
            let from_path = if param_type.is_array() {
                format!("{}.collect()", from_path)
            } else {
                from_path
            };
            if param_type.is_optional() {
                format!("{} ? {} : Channel.value([])", param, from_path)
            } else {
                from_path
            }
        } else {
            format!("Channel.value({})", param)
        };
        lines.push(format!("{}_ch = {}", ident, channel));
    }
    if lines.is_empty() {
        return "// no workflow inputs\n".to_string();
    }
    lines.join("\n") + "\n"
}

fn source_channel(source: &SourceRef, naming: &Naming) -> String {
    match source {
        SourceRef::WorkflowInput(name) => format!("{}_ch", naming.params.get(name)),
        SourceRef::StepOutput { step, output } => {
            format!("{}.out.{}", naming.process(step), naming.emit(step, output))
        }
    }
}

fn merge_sources(sources: &[SourceRef], link_merge: Option<&str>, naming: &Naming) -> String {
    let channels: Vec<String> = sources.iter().map(|source| source_channel(source, naming)).collect();
    match channels.as_slice() {
        [single] => single.clone(),
        [first, rest @ ..] => {
            let collect = if link_merge == Some("merge_nested") {
                ".collect(flat: false)"
            } else {
                ".collect()"
            };
            format!("{}.mix({}){}", first, rest.join(", "), collect)
        }
        [] => "Channel.value([])".to_string(),
    }
}

/// Channel expression that feeds one tool input of a step.
fn input_channel(
    step: &Step,
    param: &Parameter,
    naming: &Naming,
    diagnostics: &mut Diagnostics,
) -> String {
    let location = step.field(&format!("in.{}", param.name));
    let step_input = step.input(&param.name);

    let literal_channel = |value: String| {
        if param.param_type.is_path() && value != "[]" && value != "null" {
            format!("Channel.value(file({}))", value)
        } else {
            format!("Channel.value({})", value)
        }
    };

    if let Some(step_input) = step_input {
        if let Some(value_from) = &step_input.value_from {
            if !is_expression(value_from) {
                return format!("Channel.value({})", groovy_string(value_from));
            }
            diagnostics.push(Diagnostic::warning(
                "CWL-EMIT-002",
                location.clone(),
                format!(
                    "valueFrom {} of step '{}' cannot be evaluated; the input is passed unchanged",
                    value_from, step.id
                ),
            ));
        }
        if !step_input.sources.is_empty() {
            let channel = merge_sources(&step_input.sources, step_input.link_merge.as_deref(), naming);
            return if step.is_scattered(&param.name) {
                format!("{}.flatten()", channel)
            } else {
                channel
            };
        }
        if let Some(default) = &step_input.default {
            return literal_channel(groovy_literal(default));
        }
    }

    if let Some(default) = &param.default {
        return literal_channel(groovy_literal(default));
    }
    if !param.param_type.is_optional() {
        diagnostics.push(Diagnostic::warning(
            "CWL-MODEL-006",
            location,
            format!(
                "required input '{}' of step '{}' is not connected and has no default",
                param.name, step.id
            ),
        ));
    }
    "Channel.value([])".to_string()
}

fn invocation(step: &Step, naming: &Naming, diagnostics: &mut Diagnostics) -> String {
    let arguments: Vec<String> = step
        .run
        .inputs()
        .iter()
        .map(|param| input_channel(step, param, naming, diagnostics))
        .collect();
    format!("{}({})", naming.process(&step.id), arguments.join(", "))
}

/// One publishing statement per workflow output.
fn publish_line(output: &Parameter, naming: &Naming) -> String {
    let channel = merge_sources(&output.output_source, None, naming);
    let ident = naming.published.get(&output.name);
    if output.param_type.is_path() {
        format!(
            "{}.flatten().subscribe {{ item -> item.copyTo(\"${{params.outdir}}/{}/${{item.name}}\") }}",
            channel, ident
        )
    } else {
        format!(
            "{}.subscribe {{ value -> println \"{}: ${{value}}\" }}",
            channel, ident
        )
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}
