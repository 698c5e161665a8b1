//! Typed, read-only model built from a loaded document.

use crate::core::cwl::loader::{strip_id, CwlVersion};
use crate::core::cwl::requirements::{EffectiveRequirements, RequirementSet};
use crate::core::cwl::types::ParamType;
use crate::core::mapping::containers::ContainerRef;
use crate::core::mapping::resources::ComputeShape;
use serde::Serialize;
use serde_yaml::Value;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessKind {
    CommandLineTool,
    ExpressionTool,
    Workflow,
}

impl ProcessKind {
    pub fn from_class(class: &str) -> Option<Self> {
        match class {
            "CommandLineTool" => Some(ProcessKind::CommandLineTool),
            "ExpressionTool" => Some(ProcessKind::ExpressionTool),
            "Workflow" => Some(ProcessKind::Workflow),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Root of one conversion. A standalone tool is wrapped into a one-step workflow.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub version: CwlVersion,
    pub kind: ProcessKind,
    pub id: String,
    pub label: Option<String>,
    pub doc: Option<String>,
    /// Requirements and hints declared on the top-level process.
    pub requirements: RequirementSet,
    pub workflow: Workflow,
    pub references: Vec<(PathBuf, PathBuf)>,
}

#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
    pub steps: Vec<Step>,
}

impl Workflow {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn input(&self, name: &str) -> Option<&Parameter> {
        self.inputs.iter().find(|param| param.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParamType,
    pub default: Option<Value>,
    pub label: Option<String>,
    pub doc: Option<String>,
    pub input_binding: Option<InputBinding>,
    pub output_binding: Option<OutputBinding>,
    /// Workflow outputs only: where the value comes from.
    pub output_source: Vec<SourceRef>,
    pub secondary_files: Vec<SecondaryFile>,
    pub field_path: String,
}

/// One `secondaryFiles` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryFile {
    pub pattern: String,
    pub required: bool,
}

impl SecondaryFile {
    /// File name pattern next to `primary`: each leading `^` strips one extension, the
    /// rest is appended. `None` when the pattern is an expression.
    pub fn apply(&self, primary: &str) -> Option<String> {
        if self.pattern.contains("$(") || self.pattern.contains("${") {
            return None;
        }
        let suffix = self.pattern.trim_start_matches('^');
        let carets = self.pattern.len() - suffix.len();
        let mut base = primary;
        for _ in 0..carets {
            let name_start = base.rfind('/').map_or(0, |index| index + 1);
            match base[name_start..].rfind('.') {
                Some(dot) => base = &base[..name_start + dot],
                None => break,
            }
        }
        Some(format!("{}{}", base, suffix))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputBinding {
    pub position: i64,
    pub prefix: Option<String>,
    pub separate: bool,
    pub value_from: Option<String>,
    pub item_separator: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputBinding {
    pub glob: Option<String>,
    pub load_contents: bool,
    pub output_eval: Option<String>,
    /// Set for `stdout`/`stderr` typed outputs, which capture a stream instead of globbing.
    pub stream: Option<Stream>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Entry of a tool's `arguments` list.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub position: i64,
    pub prefix: Option<String>,
    pub separate: bool,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandLineTool {
    pub id: String,
    pub base_command: Vec<String>,
    pub arguments: Vec<Argument>,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
    pub stdin: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionTool {
    pub id: String,
    pub expression: String,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
}

/// Process a step runs. Nested workflows are flattened away by the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum StepRun {
    Tool(Box<CommandLineTool>),
    Expression(Box<ExpressionTool>),
}

impl StepRun {
    pub fn id(&self) -> &str {
        match self {
            StepRun::Tool(tool) => &tool.id,
            StepRun::Expression(tool) => &tool.id,
        }
    }

    pub fn inputs(&self) -> &[Parameter] {
        match self {
            StepRun::Tool(tool) => &tool.inputs,
            StepRun::Expression(tool) => &tool.inputs,
        }
    }

    pub fn outputs(&self) -> &[Parameter] {
        match self {
            StepRun::Tool(tool) => &tool.outputs,
            StepRun::Expression(tool) => &tool.outputs,
        }
    }

    pub fn output(&self, name: &str) -> Option<&Parameter> {
        self.outputs().iter().find(|param| param.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    /// Location of the step in the source document, e.g. `steps.align`.
    pub field_path: String,
    pub run: StepRun,
    pub inputs: Vec<StepInput>,
    pub outputs: Vec<String>,
    pub scatter: Vec<String>,
    pub scatter_method: Option<String>,
    pub requirements: EffectiveRequirements,
    /// Set once by the resource mapper.
    pub shape: Option<ComputeShape>,
    /// Set once by the container mapper.
    pub container: Option<ContainerRef>,
}

impl Step {
    /// Field path of `child` below this step; a wrapped standalone tool sits at the root.
    pub fn field(&self, child: &str) -> String {
        if self.field_path.is_empty() {
            child.to_string()
        } else {
            format!("{}.{}", self.field_path, child)
        }
    }

    pub fn input(&self, id: &str) -> Option<&StepInput> {
        self.inputs.iter().find(|input| input.id == id)
    }

    pub fn is_scattered(&self, input: &str) -> bool {
        self.scatter.iter().any(|name| name == input)
    }

    /// Steps this step consumes outputs from, in input declaration order, without duplicates.
    pub fn upstream(&self) -> Vec<&str> {
        let mut upstream: Vec<&str> = Vec::new();
        for input in &self.inputs {
            for source in &input.sources {
                if let SourceRef::StepOutput { step, .. } = source {
                    if !upstream.contains(&step.as_str()) {
                        upstream.push(step);
                    }
                }
            }
        }
        upstream
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepInput {
    pub id: String,
    pub sources: Vec<SourceRef>,
    pub default: Option<Value>,
    pub value_from: Option<String>,
    pub link_merge: Option<String>,
}

/// Where a step input or workflow output takes its value from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
    WorkflowInput(String),
    StepOutput { step: String, output: String },
}

impl SourceRef {
    /// Parse `input`, `step/output`, `#main/step/output` or `file.cwl#step/output`.
    pub fn parse(raw: &str, workflow_id: &str) -> SourceRef {
        let raw = raw.trim();
        let local = strip_id(raw);
        // Only fully qualified ids carry the owning workflow's id as a leading segment.
        let local = if raw.contains('#') {
            local
                .strip_prefix(workflow_id)
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(local)
        } else {
            local
        };
        match local.rsplit_once('/') {
            Some((step, output)) => SourceRef::StepOutput {
                step: step.rsplit('/').next().unwrap_or(step).to_string(),
                output: output.to_string(),
            },
            None => SourceRef::WorkflowInput(local.to_string()),
        }
    }

    pub fn step(&self) -> Option<&str> {
        match self {
            SourceRef::StepOutput { step, .. } => Some(step),
            SourceRef::WorkflowInput(_) => None,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::WorkflowInput(name) => write!(f, "{}", name),
            SourceRef::StepOutput { step, output } => write!(f, "{}/{}", step, output),
        }
    }
}

/// Local name of an id: drops `#`, any `file#` qualifier and any `scope/` path.
pub fn local_name(raw: &str) -> String {
    let id = strip_id(raw.trim());
    id.rsplit('/').next().unwrap_or(id).to_string()
}
