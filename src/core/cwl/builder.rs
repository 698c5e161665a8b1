//! Model builder: generic tree to typed [`Document`], with validation and subworkflow flattening.

use crate::core::cwl::loader::{describe, LoadedDocument};
use crate::core::cwl::model::{
    local_name, Argument, CommandLineTool, Document, ExpressionTool, InputBinding, OutputBinding,
    Parameter, ProcessKind, SecondaryFile, SourceRef, Step, StepInput, StepRun, Stream, Workflow,
};
use crate::core::cwl::requirements::{scalar_text, EffectiveRequirements, RequirementSet};
use crate::core::cwl::types::{ParamType, TypeResolution};
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

static EMPTY: Value = Value::Null;

/// Build the typed model for a loaded document and validate its wiring.
pub fn build_document(
    loaded: &LoadedDocument,
    diagnostics: &mut Diagnostics,
) -> Result<Document, AppError> {
    let root = &loaded.root;
    let kind = process_kind(root, "")?;
    let id = root
        .get("id")
        .and_then(Value::as_str)
        .map(local_name)
        .filter(|id| !id.is_empty())
        .or_else(|| {
            loaded
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
        })
        .unwrap_or_else(|| "main".to_string());
    let requirements = RequirementSet::parse(root, "", diagnostics)?;

    let mut builder = ModelBuilder { diagnostics };
    let workflow = match kind {
        ProcessKind::Workflow => builder.build_workflow(root, &id, "", &[&requirements])?,
        ProcessKind::CommandLineTool | ProcessKind::ExpressionTool => {
            builder.wrap_process(root, kind, &id, &requirements)?
        }
    };
    validate_workflow(&workflow, builder.diagnostics)?;
    debug!(
        id = %id,
        steps = workflow.steps.len(),
        "built document model"
    );

    Ok(Document {
        path: loaded.path.clone(),
        version: loaded.version,
        kind,
        id,
        label: text_field(root, "label"),
        doc: text_field(root, "doc"),
        requirements,
        workflow,
        references: loaded.references.clone(),
    })
}

/// Check that every source resolves and that every step feeds something.
pub fn validate_workflow(
    workflow: &Workflow,
    diagnostics: &mut Diagnostics,
) -> Result<(), AppError> {
    for step in &workflow.steps {
        for input in &step.inputs {
            let field = step.field(&format!("in.{}", input.id));
            for source in &input.sources {
                check_source(workflow, source, &field)?;
            }
        }
    }
    for output in &workflow.outputs {
        if output.output_source.is_empty() {
            return Err(AppError::schema(
                &output.field_path,
                format!("workflow output '{}' has no outputSource", output.name),
            ));
        }
        for source in &output.output_source {
            check_source(workflow, source, &output.field_path)?;
        }
    }

    let mut consumed: HashSet<(&str, &str)> = HashSet::new();
    let sources = workflow
        .steps
        .iter()
        .flat_map(|step| step.inputs.iter().flat_map(|input| input.sources.iter()))
        .chain(
            workflow
                .outputs
                .iter()
                .flat_map(|output| output.output_source.iter()),
        );
    for source in sources {
        if let SourceRef::StepOutput { step, output } = source {
            consumed.insert((step.as_str(), output.as_str()));
        }
    }

    for step in &workflow.steps {
        if step.outputs.is_empty() {
            continue;
        }
        let unused: Vec<&String> = step
            .outputs
            .iter()
            .filter(|output| !consumed.contains(&(step.id.as_str(), output.as_str())))
            .collect();
        if unused.len() == step.outputs.len() {
            return Err(AppError::new(
                ErrorCategory::UnreachableOutput,
                format!(
                    "no step or workflow output consumes any output of step '{}' ({})",
                    step.id,
                    step.outputs.join(", ")
                ),
            )
            .with_field(step.field("out")));
        }
        for output in unused {
            diagnostics.push(Diagnostic::info(
                "CWL-MODEL-004",
                step.field("out"),
                format!("output '{}' of step '{}' is never used", output, step.id),
            ));
        }
    }
    Ok(())
}

fn check_source(workflow: &Workflow, source: &SourceRef, field: &str) -> Result<(), AppError> {
    let resolved = match source {
        SourceRef::WorkflowInput(name) => workflow.input(name).is_some(),
        SourceRef::StepOutput { step, output } => workflow
            .step(step)
            .is_some_and(|step| step.outputs.iter().any(|name| name == output)),
    };
    if resolved {
        Ok(())
    } else {
        Err(AppError::schema(
            field,
            format!("source '{}' does not match any workflow input or step output", source),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamRole {
    ToolInput,
    ToolOutput,
    WorkflowInput,
    WorkflowOutput,
}

struct ModelBuilder<'d> {
    diagnostics: &'d mut Diagnostics,
}

impl ModelBuilder<'_> {
    /// Build a workflow; `scopes` lists enclosing requirement sets, innermost first.
    fn build_workflow(
        &mut self,
        node: &Value,
        id: &str,
        field: &str,
        scopes: &[&RequirementSet],
    ) -> Result<Workflow, AppError> {
        let inputs = self.parse_parameters(node, "inputs", field, id, ParamRole::WorkflowInput)?;
        let mut outputs =
            self.parse_parameters(node, "outputs", field, id, ParamRole::WorkflowOutput)?;
        let raw_steps = step_entries(node, field)?;

        let mut steps: Vec<Step> = Vec::new();
        let mut declared: HashSet<String> = HashSet::new();
        let mut exposed: HashMap<(String, String), Vec<SourceRef>> = HashMap::new();

        for (step_id, body, step_field) in raw_steps {
            if !declared.insert(step_id.clone()) {
                return Err(AppError::schema(
                    step_field,
                    format!("duplicate step id '{}'", step_id),
                ));
            }
            for key in ["run", "in", "out"] {
                if body.get(key).is_none() {
                    return Err(AppError::schema(
                        join(&step_field, key),
                        format!("step '{}' does not declare '{}'", step_id, key),
                    ));
                }
            }
            let step_set = RequirementSet::parse(body, &step_field, self.diagnostics)?;
            let step_inputs = parse_step_inputs(body.get("in"), &step_field, id)?;
            let step_outputs = parse_step_outputs(body.get("out"), &step_field)?;
            let (scatter, scatter_method) = parse_scatter(body, &step_field)?;

            let run_field = join(&step_field, "run");
            let run = match body.get("run") {
                Some(run @ Value::Mapping(_)) => run,
                Some(Value::String(reference)) => {
                    return Err(AppError::schema(
                        run_field,
                        format!("run reference '{}' was not resolved", reference),
                    ))
                }
                Some(other) => {
                    return Err(AppError::schema(
                        run_field,
                        format!("run must be a path or an inline process, got {}", describe(other)),
                    ))
                }
                None => unreachable!("presence checked above"),
            };
            let run_kind = process_kind(run, &run_field)?;
            let run_set = RequirementSet::parse(run, &run_field, self.diagnostics)?;

            if run_kind == ProcessKind::Workflow {
                let inner_id = run
                    .get("id")
                    .and_then(Value::as_str)
                    .map(local_name)
                    .filter(|inner| !inner.is_empty())
                    .unwrap_or_else(|| step_id.clone());
                let mut inner_scopes: Vec<&RequirementSet> = vec![&run_set, &step_set];
                inner_scopes.extend_from_slice(scopes);
                let inner = self.build_workflow(run, &inner_id, &run_field, &inner_scopes)?;
                for out in &step_outputs {
                    if inner.outputs.iter().all(|param| &param.name != out) {
                        return Err(AppError::schema(
                            join(&step_field, "out"),
                            format!("step output '{}' is not declared by workflow '{}'", out, inner_id),
                        ));
                    }
                }
                if !scatter.is_empty() {
                    self.diagnostics.push(Diagnostic::warning(
                        "CWL-MODEL-006",
                        join(&step_field, "scatter"),
                        format!("scatter over subworkflow step '{}' is not supported; running it once", step_id),
                    ));
                }
                flatten_subworkflow(&step_id, &step_field, &step_inputs, inner, &mut steps, &mut exposed)?;
                continue;
            }

            let step_run = match run_kind {
                ProcessKind::CommandLineTool => {
                    StepRun::Tool(Box::new(self.parse_tool(run, &run_field, &step_id)?))
                }
                _ => StepRun::Expression(Box::new(self.parse_expression_tool(
                    run, &run_field, &step_id,
                )?)),
            };
            for out in &step_outputs {
                if step_run.output(out).is_none() {
                    return Err(AppError::schema(
                        join(&step_field, "out"),
                        format!("step output '{}' is not declared by '{}'", out, step_run.id()),
                    ));
                }
            }
            for name in &scatter {
                if step_inputs.iter().all(|input| &input.id != name) {
                    return Err(AppError::schema(
                        join(&step_field, "scatter"),
                        format!("scatter names '{}', which is not an input of step '{}'", name, step_id),
                    ));
                }
            }
            if let Some(method) = &scatter_method {
                if method != "dotproduct" && scatter.len() > 1 {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            "CWL-MODEL-006",
                            join(&step_field, "scatterMethod"),
                            format!("scatterMethod '{}' is not supported; using dotproduct", method),
                        )
                        .with_suggestion("combine the inputs explicitly before the step"),
                    );
                }
            }

            let mut chain: Vec<&RequirementSet> = vec![&run_set, &step_set];
            chain.extend_from_slice(scopes);
            steps.push(Step {
                id: step_id,
                field_path: step_field,
                run: step_run,
                inputs: step_inputs,
                outputs: step_outputs,
                scatter,
                scatter_method,
                requirements: EffectiveRequirements::merge(&chain),
                shape: None,
                container: None,
            });
        }

        if !exposed.is_empty() {
            for step in &mut steps {
                for input in &mut step.inputs {
                    input.sources = rewire(&input.sources, &exposed);
                }
            }
            for output in &mut outputs {
                output.output_source = rewire(&output.output_source, &exposed);
            }
        }

        Ok(Workflow {
            id: id.to_string(),
            inputs,
            outputs,
            steps,
        })
    }

    /// Wrap a standalone tool into a one-step workflow that exposes all of its outputs.
    fn wrap_process(
        &mut self,
        root: &Value,
        kind: ProcessKind,
        id: &str,
        requirements: &RequirementSet,
    ) -> Result<Workflow, AppError> {
        let run = match kind {
            ProcessKind::CommandLineTool => StepRun::Tool(Box::new(self.parse_tool(root, "", id)?)),
            _ => StepRun::Expression(Box::new(self.parse_expression_tool(root, "", id)?)),
        };
        let inputs: Vec<Parameter> = run
            .inputs()
            .iter()
            .map(|param| Parameter {
                input_binding: None,
                ..param.clone()
            })
            .collect();
        let outputs: Vec<Parameter> = run
            .outputs()
            .iter()
            .map(|param| Parameter {
                output_binding: None,
                output_source: vec![SourceRef::StepOutput {
                    step: id.to_string(),
                    output: param.name.clone(),
                }],
                ..param.clone()
            })
            .collect();
        let step_inputs = inputs
            .iter()
            .map(|param| StepInput {
                id: param.name.clone(),
                sources: vec![SourceRef::WorkflowInput(param.name.clone())],
                default: None,
                value_from: None,
                link_merge: None,
            })
            .collect();
        let step = Step {
            id: id.to_string(),
            field_path: String::new(),
            outputs: run.outputs().iter().map(|param| param.name.clone()).collect(),
            run,
            inputs: step_inputs,
            scatter: Vec::new(),
            scatter_method: None,
            requirements: EffectiveRequirements::merge(&[requirements]),
            shape: None,
            container: None,
        };
        Ok(Workflow {
            id: id.to_string(),
            inputs,
            outputs,
            steps: vec![step],
        })
    }

    fn parse_tool(
        &mut self,
        node: &Value,
        field: &str,
        fallback_id: &str,
    ) -> Result<CommandLineTool, AppError> {
        let id = process_id(node, fallback_id);
        let base_command = match node.get("baseCommand") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(command)) => vec![command.clone()],
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| {
                    scalar_text(item).ok_or_else(|| {
                        AppError::schema(join(field, "baseCommand"), "baseCommand entries must be strings")
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(AppError::schema(
                    join(field, "baseCommand"),
                    format!("baseCommand must be a string or list, got {}", describe(other)),
                ))
            }
        };
        let arguments = parse_arguments(node.get("arguments"), field)?;
        let inputs = self.parse_parameters(node, "inputs", field, &id, ParamRole::ToolInput)?;
        let mut outputs = self.parse_parameters(node, "outputs", field, &id, ParamRole::ToolOutput)?;

        if outputs.is_empty() {
            return Err(AppError::schema(
                join(field, "outputs"),
                format!("tool '{}' declares no outputs", id),
            ));
        }
        if base_command.is_empty() && arguments.is_empty() {
            return Err(AppError::schema(
                join(field, "baseCommand"),
                format!("tool '{}' declares neither baseCommand nor arguments", id),
            ));
        }

        let mut stdout = text_field(node, "stdout");
        let mut stderr = text_field(node, "stderr");
        for output in &mut outputs {
            let Some(binding) = output.output_binding.as_mut() else {
                continue;
            };
            match binding.stream {
                Some(Stream::Stdout) => {
                    let name = stdout.get_or_insert_with(|| format!("{}.stdout", output.name));
                    binding.glob = Some(name.clone());
                }
                Some(Stream::Stderr) => {
                    let name = stderr.get_or_insert_with(|| format!("{}.stderr", output.name));
                    binding.glob = Some(name.clone());
                }
                None => {}
            }
        }

        Ok(CommandLineTool {
            id,
            base_command,
            arguments,
            inputs,
            outputs,
            stdin: text_field(node, "stdin"),
            stdout,
            stderr,
        })
    }

    fn parse_expression_tool(
        &mut self,
        node: &Value,
        field: &str,
        fallback_id: &str,
    ) -> Result<ExpressionTool, AppError> {
        let id = process_id(node, fallback_id);
        let expression = text_field(node, "expression").ok_or_else(|| {
            AppError::schema(
                join(field, "expression"),
                format!("ExpressionTool '{}' has no expression", id),
            )
        })?;
        let inputs = self.parse_parameters(node, "inputs", field, &id, ParamRole::ToolInput)?;
        let outputs = self.parse_parameters(node, "outputs", field, &id, ParamRole::ToolOutput)?;
        if outputs.is_empty() {
            return Err(AppError::schema(
                join(field, "outputs"),
                format!("ExpressionTool '{}' declares no outputs", id),
            ));
        }
        Ok(ExpressionTool {
            id,
            expression,
            inputs,
            outputs,
        })
    }

    fn parse_parameters(
        &mut self,
        node: &Value,
        key: &str,
        field: &str,
        owner_id: &str,
        role: ParamRole,
    ) -> Result<Vec<Parameter>, AppError> {
        let block_field = join(field, key);
        let entries: Vec<(String, &Value)> = match node.get(key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Mapping(map)) => map
                .iter()
                .map(|(name, body)| {
                    let name = name.as_str().map(local_name).ok_or_else(|| {
                        AppError::schema(&block_field, "parameter names must be strings")
                    })?;
                    Ok((name, body))
                })
                .collect::<Result<_, AppError>>()?,
            Some(Value::Sequence(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let name = item.get("id").and_then(Value::as_str).ok_or_else(|| {
                        AppError::schema(
                            format!("{}[{}]", block_field, index),
                            "parameter without 'id'",
                        )
                    })?;
                    Ok((local_name(name), item))
                })
                .collect::<Result<_, AppError>>()?,
            Some(other) => {
                return Err(AppError::schema(
                    block_field,
                    format!("expected a list or mapping of parameters, got {}", describe(other)),
                ))
            }
        };

        let mut params: Vec<Parameter> = Vec::with_capacity(entries.len());
        for (name, body) in entries {
            let param_field = format!("{}.{}", block_field, name);
            if params.iter().any(|param| param.name == name) {
                return Err(AppError::schema(
                    param_field,
                    format!("duplicate parameter '{}'", name),
                ));
            }
            params.push(self.parse_parameter(name, body, param_field, owner_id, role)?);
        }
        Ok(params)
    }

    fn parse_parameter(
        &mut self,
        name: String,
        body: &Value,
        field: String,
        owner_id: &str,
        role: ParamRole,
    ) -> Result<Parameter, AppError> {
        let shorthand = matches!(body, Value::String(_) | Value::Sequence(_));
        let type_value = if shorthand { Some(body) } else { body.get("type") };
        let Some(type_value) = type_value else {
            return Err(AppError::schema(
                join(&field, "type"),
                format!("parameter '{}' has no type", name),
            ));
        };
        let stream = match type_value.as_str() {
            Some("stdout") => Some(Stream::Stdout),
            Some("stderr") => Some(Stream::Stderr),
            _ => None,
        };
        let param_type = match ParamType::resolve(type_value) {
            TypeResolution::Resolved(param_type) => param_type,
            TypeResolution::EnumAsString(param_type) => {
                self.diagnostics.push(Diagnostic::info(
                    "CWL-MODEL-005",
                    join(&field, "type"),
                    format!("enum type of '{}' is passed through as a string", name),
                ));
                param_type
            }
            TypeResolution::Unsupported(reason) => {
                return Err(AppError::schema(
                    join(&field, "type"),
                    format!("unsupported type for '{}': {}", name, reason),
                ))
            }
        };
        let fields = if shorthand { &EMPTY } else { body };

        let input_binding = match (role, fields.get("inputBinding")) {
            (ParamRole::ToolInput, Some(binding)) => Some(parse_input_binding(binding)),
            _ => None,
        };
        let output_binding = match role {
            ParamRole::ToolOutput => {
                let binding = fields.get("outputBinding").unwrap_or(&EMPTY);
                let glob = binding.get("glob").and_then(|glob| match glob {
                    Value::Sequence(items) => items.first().and_then(scalar_text),
                    other => scalar_text(other),
                });
                Some(OutputBinding {
                    glob,
                    load_contents: binding
                        .get("loadContents")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    output_eval: text_field(binding, "outputEval"),
                    stream,
                })
            }
            _ => None,
        };
        // CWL marks input secondary files required unless stated otherwise, outputs optional.
        let secondary_required = matches!(role, ParamRole::ToolInput | ParamRole::WorkflowInput);
        let secondary_files = parse_secondary_files(
            fields.get("secondaryFiles"),
            &join(&field, "secondaryFiles"),
            secondary_required,
        )?;
        let output_source = match (role, fields.get("outputSource")) {
            (ParamRole::WorkflowOutput, Some(Value::String(source))) => {
                vec![SourceRef::parse(source, owner_id)]
            }
            (ParamRole::WorkflowOutput, Some(Value::Sequence(items))) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|source| SourceRef::parse(source, owner_id))
                .collect(),
            _ => Vec::new(),
        };

        Ok(Parameter {
            name,
            param_type,
            default: fields.get("default").cloned(),
            label: text_field(fields, "label"),
            doc: doc_field(fields),
            input_binding,
            output_binding,
            output_source,
            secondary_files,
            field_path: field,
        })
    }
}

/// Inline the steps of a nested workflow as `<outer>__<inner>` steps.
fn flatten_subworkflow(
    outer_id: &str,
    outer_field: &str,
    outer_inputs: &[StepInput],
    inner: Workflow,
    steps: &mut Vec<Step>,
    exposed: &mut HashMap<(String, String), Vec<SourceRef>>,
) -> Result<(), AppError> {
    let Workflow {
        inputs: inner_inputs,
        outputs: inner_outputs,
        steps: inner_steps,
        ..
    } = inner;
    for mut step in inner_steps {
        step.id = format!("{}__{}", outer_id, step.id);
        for input in &mut step.inputs {
            let field = format!("{}.in.{}", step.field_path, input.id);
            let original = std::mem::take(&mut input.sources);
            for source in &original {
                let (translated, outer) =
                    translate_source(source, &field, outer_id, &inner_inputs, outer_inputs)?;
                input.sources.extend(translated);
                if let SourceRef::WorkflowInput(name) = source {
                    let fallback = match outer {
                        Some(outer) => outer.default.clone(),
                        None => inner_inputs
                            .iter()
                            .find(|param| &param.name == name)
                            .and_then(|param| param.default.clone()),
                    };
                    if input.default.is_none() {
                        input.default = fallback;
                    }
                    if let Some(outer) = outer {
                        if input.value_from.is_none() && outer.sources.is_empty() {
                            input.value_from = outer.value_from.clone();
                        }
                    }
                }
            }
        }
        steps.push(step);
    }

    for output in inner_outputs {
        let mut sources = Vec::new();
        for source in &output.output_source {
            let (translated, _) = translate_source(
                source,
                &output.field_path,
                outer_id,
                &inner_inputs,
                outer_inputs,
            )?;
            sources.extend(translated);
        }
        exposed.insert((outer_id.to_string(), output.name), sources);
    }
    debug!(step = outer_id, field = outer_field, "flattened subworkflow");
    Ok(())
}

/// Translate a source inside a nested workflow into the enclosing one.
fn translate_source<'a>(
    source: &SourceRef,
    field: &str,
    outer_id: &str,
    inner_inputs: &[Parameter],
    outer_inputs: &'a [StepInput],
) -> Result<(Vec<SourceRef>, Option<&'a StepInput>), AppError> {
    match source {
        SourceRef::WorkflowInput(name) => {
            if inner_inputs.iter().all(|param| &param.name != name) {
                return Err(AppError::schema(
                    field,
                    format!("source '{}' does not match any workflow input or step output", name),
                ));
            }
            match outer_inputs.iter().find(|input| &input.id == name) {
                Some(outer) => Ok((outer.sources.clone(), Some(outer))),
                None => Ok((Vec::new(), None)),
            }
        }
        SourceRef::StepOutput { step, output } => Ok((
            vec![SourceRef::StepOutput {
                step: format!("{}__{}", outer_id, step),
                output: output.clone(),
            }],
            None,
        )),
    }
}

fn rewire(
    sources: &[SourceRef],
    exposed: &HashMap<(String, String), Vec<SourceRef>>,
) -> Vec<SourceRef> {
    let mut rewired = Vec::with_capacity(sources.len());
    for source in sources {
        match source {
            SourceRef::StepOutput { step, output } => {
                match exposed.get(&(step.clone(), output.clone())) {
                    Some(inner) => rewired.extend(inner.iter().cloned()),
                    None => rewired.push(source.clone()),
                }
            }
            SourceRef::WorkflowInput(_) => rewired.push(source.clone()),
        }
    }
    rewired
}

fn process_kind(node: &Value, field: &str) -> Result<ProcessKind, AppError> {
    let class_field = join(field, "class");
    match node.get("class") {
        Some(Value::String(class)) => ProcessKind::from_class(class).ok_or_else(|| {
            AppError::schema(
                class_field,
                format!("unsupported process class '{}'", class),
            )
        }),
        Some(other) => Err(AppError::schema(
            class_field,
            format!("class must be a string, got {}", describe(other)),
        )),
        None => Err(AppError::schema(class_field, "process has no class")),
    }
}

fn process_id(node: &Value, fallback: &str) -> String {
    node.get("id")
        .and_then(Value::as_str)
        .map(local_name)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn step_entries<'a>(
    node: &'a Value,
    field: &str,
) -> Result<Vec<(String, &'a Value, String)>, AppError> {
    let steps_field = join(field, "steps");
    let entries = match node.get("steps") {
        Some(Value::Mapping(map)) => map
            .iter()
            .map(|(key, body)| {
                let id = key.as_str().map(local_name).ok_or_else(|| {
                    AppError::schema(&steps_field, "step ids must be strings")
                })?;
                Ok((id, body))
            })
            .collect::<Result<Vec<_>, AppError>>()?,
        Some(Value::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(index, body)| {
                let id = body.get("id").and_then(Value::as_str).ok_or_else(|| {
                    AppError::schema(format!("{}[{}]", steps_field, index), "step without 'id'")
                })?;
                Ok((local_name(id), body))
            })
            .collect::<Result<Vec<_>, AppError>>()?,
        Some(other) => {
            return Err(AppError::schema(
                steps_field,
                format!("steps must be a list or mapping, got {}", describe(other)),
            ))
        }
        None => return Err(AppError::schema(steps_field, "workflow declares no steps")),
    };
    Ok(entries
        .into_iter()
        .map(|(id, body)| {
            let step_field = format!("{}.{}", steps_field, id);
            (id, body, step_field)
        })
        .collect())
}

fn parse_step_inputs(
    node: Option<&Value>,
    step_field: &str,
    workflow_id: &str,
) -> Result<Vec<StepInput>, AppError> {
    let in_field = join(step_field, "in");
    let entries: Vec<(String, &Value)> = match node {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Mapping(map)) => map
            .iter()
            .map(|(key, body)| {
                let id = key
                    .as_str()
                    .map(local_name)
                    .ok_or_else(|| AppError::schema(&in_field, "input ids must be strings"))?;
                Ok((id, body))
            })
            .collect::<Result<_, AppError>>()?,
        Some(Value::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(index, body)| {
                let id = body.get("id").and_then(Value::as_str).ok_or_else(|| {
                    AppError::schema(format!("{}[{}]", in_field, index), "step input without 'id'")
                })?;
                Ok((local_name(id), body))
            })
            .collect::<Result<_, AppError>>()?,
        Some(other) => {
            return Err(AppError::schema(
                in_field,
                format!("in must be a list or mapping, got {}", describe(other)),
            ))
        }
    };

    let mut inputs: Vec<StepInput> = Vec::with_capacity(entries.len());
    for (id, body) in entries {
        let field = format!("{}.{}", in_field, id);
        if inputs.iter().any(|input| input.id == id) {
            return Err(AppError::schema(field, format!("duplicate step input '{}'", id)));
        }
        let (source, fields) = match body {
            Value::Mapping(_) => (body.get("source"), body),
            Value::Null => (None, &EMPTY),
            other => (Some(other), &EMPTY),
        };
        let sources = match source {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(source)) => vec![SourceRef::parse(source, workflow_id)],
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(|source| SourceRef::parse(source, workflow_id))
                        .ok_or_else(|| AppError::schema(&field, "sources must be strings"))
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(AppError::schema(
                    field,
                    format!("source must be a string or list, got {}", describe(other)),
                ))
            }
        };
        inputs.push(StepInput {
            id,
            sources,
            default: fields.get("default").cloned(),
            value_from: text_field(fields, "valueFrom"),
            link_merge: text_field(fields, "linkMerge"),
        });
    }
    Ok(inputs)
}

fn parse_step_outputs(node: Option<&Value>, step_field: &str) -> Result<Vec<String>, AppError> {
    let out_field = join(step_field, "out");
    let items = match node {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(items)) => items,
        Some(other) => {
            return Err(AppError::schema(
                out_field,
                format!("out must be a list, got {}", describe(other)),
            ))
        }
    };
    let mut outputs: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let id = match item {
            Value::String(id) => local_name(id),
            Value::Mapping(_) => item
                .get("id")
                .and_then(Value::as_str)
                .map(local_name)
                .ok_or_else(|| AppError::schema(&out_field, "step output without 'id'"))?,
            other => {
                return Err(AppError::schema(
                    out_field,
                    format!("step outputs must be ids, got {}", describe(other)),
                ))
            }
        };
        if outputs.contains(&id) {
            return Err(AppError::schema(out_field, format!("duplicate step output '{}'", id)));
        }
        outputs.push(id);
    }
    Ok(outputs)
}

fn parse_scatter(
    body: &Value,
    step_field: &str,
) -> Result<(Vec<String>, Option<String>), AppError> {
    let scatter = match body.get("scatter") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(name)) => vec![local_name(name)],
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(local_name)
            .collect(),
        Some(other) => {
            return Err(AppError::schema(
                join(step_field, "scatter"),
                format!("scatter must be a string or list, got {}", describe(other)),
            ))
        }
    };
    Ok((scatter, text_field(body, "scatterMethod")))
}

fn parse_arguments(node: Option<&Value>, field: &str) -> Result<Vec<Argument>, AppError> {
    let items = match node {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(items)) => items,
        Some(other) => {
            return Err(AppError::schema(
                join(field, "arguments"),
                format!("arguments must be a list, got {}", describe(other)),
            ))
        }
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Mapping(_) => Ok(Argument {
                position: position_of(item),
                prefix: text_field(item, "prefix"),
                separate: item.get("separate").and_then(Value::as_bool).unwrap_or(true),
                value: item.get("valueFrom").and_then(scalar_text),
            }),
            other => scalar_text(other)
                .map(|value| Argument {
                    position: 0,
                    prefix: None,
                    separate: true,
                    value: Some(value),
                })
                .ok_or_else(|| {
                    AppError::schema(
                        format!("{}[{}]", join(field, "arguments"), index),
                        format!("argument must be a string or mapping, got {}", describe(other)),
                    )
                }),
        })
        .collect()
}

/// `secondaryFiles` as a string, a `{pattern, required}` mapping or a list of either.
fn parse_secondary_files(
    node: Option<&Value>,
    field: &str,
    default_required: bool,
) -> Result<Vec<SecondaryFile>, AppError> {
    let items: Vec<&Value> = match node {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(items)) => items.iter().collect(),
        Some(other) => vec![other],
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(pattern) => Ok(SecondaryFile {
                pattern: pattern.clone(),
                required: default_required,
            }),
            Value::Mapping(_) => {
                let pattern = text_field(item, "pattern").ok_or_else(|| {
                    AppError::schema(field, "secondaryFiles entry without 'pattern'")
                })?;
                Ok(SecondaryFile {
                    pattern,
                    required: item
                        .get("required")
                        .and_then(Value::as_bool)
                        .unwrap_or(default_required),
                })
            }
            other => Err(AppError::schema(
                field,
                format!("secondaryFiles entries must be strings or mappings, got {}", describe(other)),
            )),
        })
        .collect()
}

fn parse_input_binding(binding: &Value) -> InputBinding {
    InputBinding {
        position: position_of(binding),
        prefix: text_field(binding, "prefix"),
        separate: binding
            .get("separate")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        value_from: text_field(binding, "valueFrom"),
        item_separator: text_field(binding, "itemSeparator"),
    }
}

/// Binding position; expressions and missing values sort as 0.
fn position_of(node: &Value) -> i64 {
    node.get("position").and_then(Value::as_i64).unwrap_or(0)
}

fn text_field(node: &Value, key: &str) -> Option<String> {
    node.get(key).and_then(Value::as_str).map(str::to_string)
}

fn doc_field(node: &Value) -> Option<String> {
    match node.get("doc") {
        Some(Value::String(doc)) => Some(doc.clone()),
        Some(Value::Sequence(lines)) => Some(
            lines
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => None,
    }
}

fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}
