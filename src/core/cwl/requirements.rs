//! Requirement and hint variants, and the per-step effective merge.

use crate::core::cwl::loader::describe;
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::error::AppError;
use crate::core::mapping::quantity::ByteQuantity;
use indexmap::IndexMap;
use serde_yaml::Value;
use std::time::Duration;

/// Discriminant of [`Requirement`], used as the merge key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequirementKind {
    Docker,
    Resource,
    InlineJavascript,
    SchemaDef,
    Scatter,
    Subworkflow,
    MultipleInput,
    StepInputExpression,
    ShellCommand,
    InitialWorkDir,
    EnvVar,
    Software,
    NetworkAccess,
    WorkReuse,
    ToolTimeLimit,
    LoadListing,
    InplaceUpdate,
}

impl RequirementKind {
    pub fn from_class(class: &str) -> Option<Self> {
        let kind = match class {
            "DockerRequirement" => RequirementKind::Docker,
            "ResourceRequirement" => RequirementKind::Resource,
            "InlineJavascriptRequirement" => RequirementKind::InlineJavascript,
            "SchemaDefRequirement" => RequirementKind::SchemaDef,
            "ScatterFeatureRequirement" => RequirementKind::Scatter,
            "SubworkflowFeatureRequirement" => RequirementKind::Subworkflow,
            "MultipleInputFeatureRequirement" => RequirementKind::MultipleInput,
            "StepInputExpressionRequirement" => RequirementKind::StepInputExpression,
            "ShellCommandRequirement" => RequirementKind::ShellCommand,
            "InitialWorkDirRequirement" => RequirementKind::InitialWorkDir,
            "EnvVarRequirement" => RequirementKind::EnvVar,
            "SoftwareRequirement" => RequirementKind::Software,
            "NetworkAccess" => RequirementKind::NetworkAccess,
            "WorkReuse" => RequirementKind::WorkReuse,
            "ToolTimeLimit" => RequirementKind::ToolTimeLimit,
            "LoadListingRequirement" => RequirementKind::LoadListing,
            "InplaceUpdateRequirement" => RequirementKind::InplaceUpdate,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DockerRequirement {
    pub docker_pull: Option<String>,
    pub docker_image_id: Option<String>,
    pub docker_file: Option<String>,
    pub docker_load: Option<String>,
    pub docker_output_directory: Option<String>,
}

impl DockerRequirement {
    /// Image reference to pull, preferring `dockerPull` over `dockerImageId`.
    pub fn image(&self) -> Option<&str> {
        self.docker_pull
            .as_deref()
            .or(self.docker_image_id.as_deref())
    }

    /// True when the image must be built or loaded locally instead of pulled.
    pub fn needs_local_image(&self) -> bool {
        self.image().is_none() && (self.docker_file.is_some() || self.docker_load.is_some())
    }
}

/// A resource value: a literal, or a CWL expression the converter cannot evaluate.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue<T> {
    Fixed(T),
    Expression(String),
}

impl<T: Copy> ResourceValue<T> {
    pub fn fixed(&self) -> Option<T> {
        match self {
            ResourceValue::Fixed(value) => Some(*value),
            ResourceValue::Expression(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceRequirement {
    pub cores_min: Option<ResourceValue<f64>>,
    pub cores_max: Option<ResourceValue<f64>>,
    pub ram_min: Option<ResourceValue<ByteQuantity>>,
    pub ram_max: Option<ResourceValue<ByteQuantity>>,
    pub tmpdir_min: Option<ResourceValue<ByteQuantity>>,
    pub tmpdir_max: Option<ResourceValue<ByteQuantity>>,
    pub outdir_min: Option<ResourceValue<ByteQuantity>>,
    pub outdir_max: Option<ResourceValue<ByteQuantity>>,
}

impl ResourceRequirement {
    /// Field names of values given as expressions.
    pub fn expressions(&self) -> Vec<(&'static str, &str)> {
        let mut found = Vec::new();
        let cores = [("coresMin", &self.cores_min), ("coresMax", &self.cores_max)];
        for (name, value) in cores {
            if let Some(ResourceValue::Expression(text)) = value {
                found.push((name, text.as_str()));
            }
        }
        let sizes = [
            ("ramMin", &self.ram_min),
            ("ramMax", &self.ram_max),
            ("tmpdirMin", &self.tmpdir_min),
            ("tmpdirMax", &self.tmpdir_max),
            ("outdirMin", &self.outdir_min),
            ("outdirMax", &self.outdir_max),
        ];
        for (name, value) in sizes {
            if let Some(ResourceValue::Expression(text)) = value {
                found.push((name, text.as_str()));
            }
        }
        found
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoftwarePackage {
    pub package: String,
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    Docker(DockerRequirement),
    Resource(ResourceRequirement),
    InlineJavascript { expression_lib: Vec<String> },
    SchemaDef,
    Scatter,
    Subworkflow,
    MultipleInput,
    StepInputExpression,
    ShellCommand,
    InitialWorkDir { listing: Value },
    EnvVar { variables: IndexMap<String, String> },
    Software { packages: Vec<SoftwarePackage> },
    NetworkAccess(bool),
    WorkReuse(bool),
    ToolTimeLimit(Duration),
    LoadListing(Option<String>),
    InplaceUpdate(bool),
}

impl Requirement {
    pub fn kind(&self) -> RequirementKind {
        match self {
            Requirement::Docker(_) => RequirementKind::Docker,
            Requirement::Resource(_) => RequirementKind::Resource,
            Requirement::InlineJavascript { .. } => RequirementKind::InlineJavascript,
            Requirement::SchemaDef => RequirementKind::SchemaDef,
            Requirement::Scatter => RequirementKind::Scatter,
            Requirement::Subworkflow => RequirementKind::Subworkflow,
            Requirement::MultipleInput => RequirementKind::MultipleInput,
            Requirement::StepInputExpression => RequirementKind::StepInputExpression,
            Requirement::ShellCommand => RequirementKind::ShellCommand,
            Requirement::InitialWorkDir { .. } => RequirementKind::InitialWorkDir,
            Requirement::EnvVar { .. } => RequirementKind::EnvVar,
            Requirement::Software { .. } => RequirementKind::Software,
            Requirement::NetworkAccess(_) => RequirementKind::NetworkAccess,
            Requirement::WorkReuse(_) => RequirementKind::WorkReuse,
            Requirement::ToolTimeLimit(_) => RequirementKind::ToolTimeLimit,
            Requirement::LoadListing(_) => RequirementKind::LoadListing,
            Requirement::InplaceUpdate(_) => RequirementKind::InplaceUpdate,
        }
    }
}

/// Requirements and hints declared on one scope (tool, step or workflow).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequirementSet {
    pub requirements: Vec<Requirement>,
    pub hints: Vec<Requirement>,
    /// Class names of unrecognised entries, in declaration order.
    pub ignored: Vec<String>,
}

impl RequirementSet {
    /// Parse the `requirements` and `hints` fields of a process or step mapping.
    pub fn parse(
        node: &Value,
        field: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self, AppError> {
        let mut set = RequirementSet::default();
        for (block, hint) in [("requirements", false), ("hints", true)] {
            let Some(entries) = node.get(block) else {
                continue;
            };
            let block_field = join(field, block);
            for (class, body, entry_field) in requirement_entries(entries, &block_field)? {
                match parse_requirement(&class, body, &entry_field)? {
                    Some(requirement) if hint => set.hints.push(requirement),
                    Some(requirement) => set.requirements.push(requirement),
                    None => {
                        diagnostics.push(
                            Diagnostic::info(
                                "CWL-MODEL-003",
                                entry_field,
                                format!("ignoring unsupported requirement '{}'", class),
                            ),
                        );
                        if !set.ignored.contains(&class) {
                            set.ignored.push(class);
                        }
                    }
                }
            }
        }
        Ok(set)
    }
}

/// Flat, per-step effective requirements after the scope merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveRequirements {
    entries: IndexMap<RequirementKind, Requirement>,
    ignored: Vec<String>,
}

impl EffectiveRequirements {
    /// Merge scopes ordered innermost first (tool, step, enclosing workflows).
    ///
    /// All `requirements` outrank all `hints`; within each, the innermost scope wins.
    pub fn merge(scopes: &[&RequirementSet]) -> Self {
        let mut effective = EffectiveRequirements::default();
        let requirements = scopes.iter().flat_map(|scope| scope.requirements.iter());
        let hints = scopes.iter().flat_map(|scope| scope.hints.iter());
        for requirement in requirements.chain(hints) {
            effective
                .entries
                .entry(requirement.kind())
                .or_insert_with(|| requirement.clone());
        }
        for scope in scopes {
            for class in &scope.ignored {
                if !effective.ignored.contains(class) {
                    effective.ignored.push(class.clone());
                }
            }
        }
        effective
    }

    pub fn get(&self, kind: RequirementKind) -> Option<&Requirement> {
        self.entries.get(&kind)
    }

    pub fn has(&self, kind: RequirementKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn docker(&self) -> Option<&DockerRequirement> {
        match self.get(RequirementKind::Docker) {
            Some(Requirement::Docker(docker)) => Some(docker),
            _ => None,
        }
    }

    pub fn resource(&self) -> Option<&ResourceRequirement> {
        match self.get(RequirementKind::Resource) {
            Some(Requirement::Resource(resource)) => Some(resource),
            _ => None,
        }
    }

    pub fn time_limit(&self) -> Option<Duration> {
        match self.get(RequirementKind::ToolTimeLimit) {
            Some(Requirement::ToolTimeLimit(limit)) => Some(*limit),
            _ => None,
        }
    }

    pub fn env_vars(&self) -> Option<&IndexMap<String, String>> {
        match self.get(RequirementKind::EnvVar) {
            Some(Requirement::EnvVar { variables }) => Some(variables),
            _ => None,
        }
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.entries.values()
    }
}

/// Flatten list form (`- class: X`) and map form (`X: {...}`) into `(class, body, field)`.
fn requirement_entries<'a>(
    entries: &'a Value,
    field: &str,
) -> Result<Vec<(String, &'a Value, String)>, AppError> {
    match entries {
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let entry_field = format!("{}[{}]", field, index);
                let class = item
                    .get("class")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::schema(&entry_field, "requirement without 'class'"))?;
                Ok((class.to_string(), item, entry_field))
            })
            .collect(),
        Value::Mapping(map) => map
            .iter()
            .map(|(key, body)| {
                let class = key
                    .as_str()
                    .ok_or_else(|| AppError::schema(field, "requirement class must be a string"))?;
                Ok((class.to_string(), body, join(field, class)))
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(AppError::schema(
            field,
            format!("expected a list or mapping of requirements, got {}", describe(other)),
        )),
    }
}

fn parse_requirement(
    class: &str,
    body: &Value,
    field: &str,
) -> Result<Option<Requirement>, AppError> {
    let Some(kind) = RequirementKind::from_class(class) else {
        return Ok(None);
    };
    let requirement = match kind {
        RequirementKind::Docker => Requirement::Docker(DockerRequirement {
            docker_pull: string_field(body, "dockerPull"),
            docker_image_id: string_field(body, "dockerImageId"),
            docker_file: string_field(body, "dockerFile"),
            docker_load: string_field(body, "dockerLoad"),
            docker_output_directory: string_field(body, "dockerOutputDirectory"),
        }),
        RequirementKind::Resource => Requirement::Resource(ResourceRequirement {
            cores_min: cores_field(body, "coresMin", field)?,
            cores_max: cores_field(body, "coresMax", field)?,
            ram_min: mebibyte_field(body, "ramMin", field)?,
            ram_max: mebibyte_field(body, "ramMax", field)?,
            tmpdir_min: mebibyte_field(body, "tmpdirMin", field)?,
            tmpdir_max: mebibyte_field(body, "tmpdirMax", field)?,
            outdir_min: mebibyte_field(body, "outdirMin", field)?,
            outdir_max: mebibyte_field(body, "outdirMax", field)?,
        }),
        RequirementKind::InlineJavascript => Requirement::InlineJavascript {
            expression_lib: body
                .get("expressionLib")
                .and_then(Value::as_sequence)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        },
        RequirementKind::SchemaDef => Requirement::SchemaDef,
        RequirementKind::Scatter => Requirement::Scatter,
        RequirementKind::Subworkflow => Requirement::Subworkflow,
        RequirementKind::MultipleInput => Requirement::MultipleInput,
        RequirementKind::StepInputExpression => Requirement::StepInputExpression,
        RequirementKind::ShellCommand => Requirement::ShellCommand,
        RequirementKind::InitialWorkDir => Requirement::InitialWorkDir {
            listing: body.get("listing").cloned().unwrap_or(Value::Null),
        },
        RequirementKind::EnvVar => Requirement::EnvVar {
            variables: parse_env_defs(body.get("envDef"), field)?,
        },
        RequirementKind::Software => Requirement::Software {
            packages: parse_packages(body.get("packages")),
        },
        RequirementKind::NetworkAccess => {
            Requirement::NetworkAccess(bool_field(body, "networkAccess").unwrap_or(true))
        }
        RequirementKind::WorkReuse => {
            Requirement::WorkReuse(bool_field(body, "enableReuse").unwrap_or(true))
        }
        RequirementKind::ToolTimeLimit => {
            let seconds = match body.get("timelimit") {
                Some(Value::Number(number)) => number.as_u64().ok_or_else(|| {
                    AppError::schema(
                        join(field, "timelimit"),
                        "timelimit must be a non-negative integer",
                    )
                })?,
                Some(other) => {
                    return Err(AppError::schema(
                        join(field, "timelimit"),
                        format!("timelimit must be a number, got {}", describe(other)),
                    ))
                }
                None => 0,
            };
            Requirement::ToolTimeLimit(Duration::from_secs(seconds))
        }
        RequirementKind::LoadListing => {
            Requirement::LoadListing(string_field(body, "loadListing"))
        }
        RequirementKind::InplaceUpdate => {
            Requirement::InplaceUpdate(bool_field(body, "inplaceUpdate").unwrap_or(false))
        }
    };
    Ok(Some(requirement))
}

fn string_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(body: &Value, key: &str) -> Option<bool> {
    body.get(key).and_then(Value::as_bool)
}

pub(crate) fn is_expression(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with("$(") || trimmed.starts_with("${")
}

fn cores_field(
    body: &Value,
    key: &str,
    field: &str,
) -> Result<Option<ResourceValue<f64>>, AppError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => match number.as_f64() {
            Some(value) if value >= 0.0 => Ok(Some(ResourceValue::Fixed(value))),
            _ => Err(AppError::schema(join(field, key), "core count must be non-negative")),
        },
        Some(Value::String(text)) if is_expression(text) => {
            Ok(Some(ResourceValue::Expression(text.clone())))
        }
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| *value >= 0.0)
            .map(|value| Some(ResourceValue::Fixed(value)))
            .ok_or_else(|| {
                AppError::schema(join(field, key), format!("invalid core count '{}'", text))
            }),
        Some(other) => Err(AppError::schema(
            join(field, key),
            format!("core count must be a number, got {}", describe(other)),
        )),
    }
}

/// CWL sizes are mebibytes when bare numbers; strings may carry an explicit unit.
fn mebibyte_field(
    body: &Value,
    key: &str,
    field: &str,
) -> Result<Option<ResourceValue<ByteQuantity>>, AppError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => {
            let mebibytes = number.as_f64().unwrap_or(-1.0);
            ByteQuantity::from_mebibytes_f64(mebibytes)
                .map(|quantity| Some(ResourceValue::Fixed(quantity)))
                .map_err(|err| AppError::schema(join(field, key), err.to_string()))
        }
        Some(Value::String(text)) if is_expression(text) => {
            Ok(Some(ResourceValue::Expression(text.clone())))
        }
        Some(Value::String(text)) => {
            let parsed = match text.trim().parse::<f64>() {
                Ok(mebibytes) => ByteQuantity::from_mebibytes_f64(mebibytes),
                Err(_) => text.parse::<ByteQuantity>(),
            };
            parsed
                .map(|quantity| Some(ResourceValue::Fixed(quantity)))
                .map_err(|err| AppError::schema(join(field, key), err.to_string()))
        }
        Some(other) => Err(AppError::schema(
            join(field, key),
            format!("size must be a number, got {}", describe(other)),
        )),
    }
}

fn parse_env_defs(
    defs: Option<&Value>,
    field: &str,
) -> Result<IndexMap<String, String>, AppError> {
    let mut variables = IndexMap::new();
    match defs {
        Some(Value::Sequence(items)) => {
            for (index, item) in items.iter().enumerate() {
                let name = item.get("envName").and_then(Value::as_str);
                let value = item.get("envValue").and_then(scalar_text);
                match (name, value) {
                    (Some(name), Some(value)) => {
                        variables.insert(name.to_string(), value);
                    }
                    _ => {
                        return Err(AppError::schema(
                            format!("{}.envDef[{}]", field, index),
                            "envDef entries need envName and envValue",
                        ))
                    }
                }
            }
        }
        Some(Value::Mapping(map)) => {
            for (key, value) in map {
                let (Some(name), Some(value)) = (key.as_str(), scalar_text(value)) else {
                    return Err(AppError::schema(
                        join(field, "envDef"),
                        "envDef values must be scalars",
                    ));
                };
                variables.insert(name.to_string(), value);
            }
        }
        _ => {}
    }
    Ok(variables)
}

fn parse_packages(packages: Option<&Value>) -> Vec<SoftwarePackage> {
    let versions_of = |body: &Value| -> Vec<String> {
        body.get("version")
            .and_then(Value::as_sequence)
            .map(|items| items.iter().filter_map(scalar_text).collect())
            .unwrap_or_default()
    };
    match packages {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| {
                let package = item.get("package").and_then(Value::as_str)?;
                Some(SoftwarePackage {
                    package: package.to_string(),
                    versions: versions_of(item),
                })
            })
            .collect(),
        Some(Value::Mapping(map)) => map
            .iter()
            .filter_map(|(key, body)| {
                Some(SoftwarePackage {
                    package: key.as_str()?.to_string(),
                    versions: match body {
                        Value::Sequence(items) => items.iter().filter_map(scalar_text).collect(),
                        other => versions_of(other),
                    },
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
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
