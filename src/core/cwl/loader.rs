use crate::core::cwl::types::normalize_type_value;
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Declared `cwlVersion` of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CwlVersion {
    #[serde(rename = "v1.0")]
    V1_0,
    #[serde(rename = "v1.1")]
    V1_1,
    #[serde(rename = "v1.2")]
    V1_2,
}

impl CwlVersion {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "v1.0" => Some(CwlVersion::V1_0),
            "v1.1" => Some(CwlVersion::V1_1),
            "v1.2" => Some(CwlVersion::V1_2),
            _ => None,
        }
    }
}

impl fmt::Display for CwlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CwlVersion::V1_0 => write!(f, "v1.0"),
            CwlVersion::V1_1 => write!(f, "v1.1"),
            CwlVersion::V1_2 => write!(f, "v1.2"),
        }
    }
}

/// Version assumed when the top-level document declares none.
pub const DEFAULT_CWL_VERSION: CwlVersion = CwlVersion::V1_0;

/// Generic document tree with every `run:` and `$import` reference embedded.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub version: CwlVersion,
    pub root: Value,
    /// Edges of the file reference graph, `(referencing file, referenced file)`, in load order.
    pub references: Vec<(PathBuf, PathBuf)>,
}

/// Load a CWL document from disk, embedding referenced documents.
pub fn load_document(path: &Path, diagnostics: &mut Diagnostics) -> Result<LoadedDocument, AppError> {
    DocumentLoader::new(diagnostics).load_path(path)
}

/// Load a CWL document from text. `path` anchors relative `run:` references.
pub fn load_str(
    text: &str,
    path: &Path,
    diagnostics: &mut Diagnostics,
) -> Result<LoadedDocument, AppError> {
    DocumentLoader::new(diagnostics).load_text(text, path)
}

/// Per-run loader state: the reference stack for cycle detection and a cache of finished files.
pub struct DocumentLoader<'d> {
    diagnostics: &'d mut Diagnostics,
    stack: Vec<PathBuf>,
    cache: HashMap<PathBuf, (Value, CwlVersion)>,
    references: Vec<(PathBuf, PathBuf)>,
}

/// Where the document being expanded came from.
struct Frame<'a> {
    file: &'a Path,
    base_dir: &'a Path,
    version: CwlVersion,
    /// `$graph` entries of the current file, by id.
    graph: Option<&'a HashMap<String, Value>>,
    graph_stack: Vec<String>,
}

impl<'d> DocumentLoader<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            diagnostics,
            stack: Vec::new(),
            cache: HashMap::new(),
            references: Vec::new(),
        }
    }

    pub fn load_path(mut self, path: &Path) -> Result<LoadedDocument, AppError> {
        let (root, version) = self.load_file(path, None, None)?;
        Ok(LoadedDocument {
            path: path.to_path_buf(),
            version,
            root,
            references: self.references,
        })
    }

    pub fn load_text(mut self, text: &str, path: &Path) -> Result<LoadedDocument, AppError> {
        let key = canonical(path);
        self.stack.push(key);
        let (root, version) = self.expand_text(text, path, None, None)?;
        self.stack.pop();
        Ok(LoadedDocument {
            path: path.to_path_buf(),
            version,
            root,
            references: self.references,
        })
    }

    fn load_file(
        &mut self,
        path: &Path,
        fragment: Option<&str>,
        parent_version: Option<CwlVersion>,
    ) -> Result<(Value, CwlVersion), AppError> {
        let key = canonical(path);
        if let Some(position) = self.stack.iter().position(|entry| *entry == key) {
            let mut chain: Vec<String> = self.stack[position..]
                .iter()
                .map(|entry| entry.display().to_string())
                .collect();
            chain.push(key.display().to_string());
            return Err(AppError::new(
                ErrorCategory::CyclicImport,
                format!("document imports itself: {}", chain.join(" -> ")),
            ));
        }
        let cache_key = match fragment {
            Some(fragment) => key.join(format!("#{}", fragment)),
            None => key.clone(),
        };
        if let Some((value, version)) = self.cache.get(&cache_key) {
            debug!(path = %path.display(), "reusing already loaded document");
            return Ok((value.clone(), *version));
        }

        let text = fs::read_to_string(path).map_err(|err| {
            AppError::with_source(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
                err,
            )
            .with_file(path)
        })?;
        debug!(path = %path.display(), "loading document");

        self.stack.push(key);
        let result = self.expand_text(&text, path, fragment, parent_version);
        self.stack.pop();
        let (value, version) = result.map_err(|err| err.with_file(path))?;
        self.cache.insert(cache_key, (value.clone(), version));
        Ok((value, version))
    }

    fn expand_text(
        &mut self,
        text: &str,
        path: &Path,
        fragment: Option<&str>,
        parent_version: Option<CwlVersion>,
    ) -> Result<(Value, CwlVersion), AppError> {
        let root: Value = serde_yaml::from_str(text).map_err(|err| {
            let location = err
                .location()
                .map(|loc| format!("line {} column {}", loc.line(), loc.column()));
            let mut error = AppError::new(
                ErrorCategory::MalformedDocument,
                format!("invalid YAML/JSON: {}", err),
            )
            .with_file(path);
            if let Some(location) = location {
                error = error.with_field(location);
            }
            error
        })?;
        let Value::Mapping(root_map) = root else {
            return Err(AppError::new(
                ErrorCategory::MalformedDocument,
                "document root must be a mapping",
            )
            .with_file(path));
        };

        let version = self.detect_version(&root_map, path, parent_version)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let (graph, entry) = match root_map.get("$graph") {
            Some(Value::Sequence(entries)) => {
                let graph = index_graph(entries);
                let entry = select_graph_entry(&graph, entries, fragment).ok_or_else(|| {
                    AppError::schema(
                        "$graph",
                        match fragment {
                            Some(fragment) => format!("no process with id '#{}' in $graph", fragment),
                            None => "cannot pick an entry process: no '#main' and no single Workflow"
                                .to_string(),
                        },
                    )
                })?;
                (Some(graph), entry)
            }
            Some(_) => {
                return Err(AppError::schema("$graph", "$graph must be a list of processes"));
            }
            None => {
                if let Some(fragment) = fragment {
                    let own_id = root_map.get("id").and_then(Value::as_str).map(strip_id);
                    if own_id != Some(fragment) {
                        return Err(AppError::schema(
                            "id",
                            format!("reference fragment '#{}' does not match document id", fragment),
                        ));
                    }
                }
                (None, Value::Mapping(root_map.clone()))
            }
        };

        let mut frame = Frame {
            file: path,
            base_dir,
            version,
            graph: graph.as_ref(),
            graph_stack: Vec::new(),
        };
        let mut entry = entry;
        // Only processes carry a version; `$import`ed fragments stay as written.
        if let Value::Mapping(map) = &mut entry {
            if map.contains_key("class") && !map.contains_key("cwlVersion") {
                map.insert(Value::from("cwlVersion"), Value::from(version.to_string()));
            }
        }
        self.expand_process(&mut entry, &mut frame, "")?;
        Ok((entry, version))
    }

    fn detect_version(
        &mut self,
        root: &Mapping,
        path: &Path,
        parent_version: Option<CwlVersion>,
    ) -> Result<CwlVersion, AppError> {
        match root.get("cwlVersion") {
            Some(Value::String(text)) => CwlVersion::parse(text).ok_or_else(|| {
                AppError::new(
                    ErrorCategory::UnsupportedVersion,
                    format!("unsupported cwlVersion '{}', expected v1.0, v1.1 or v1.2", text),
                )
                .with_field("cwlVersion")
                .with_file(path)
            }),
            Some(other) => Err(AppError::new(
                ErrorCategory::UnsupportedVersion,
                format!("cwlVersion must be a string, got {}", describe(other)),
            )
            .with_field("cwlVersion")
            .with_file(path)),
            None => match parent_version {
                Some(version) => Ok(version),
                None => {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            "CWL-LOAD-004",
                            "cwlVersion",
                            format!("no cwlVersion declared, assuming {}", DEFAULT_CWL_VERSION),
                        )
                        .with_file(path)
                        .with_suggestion("declare cwlVersion: v1.2 at the top of the document"),
                    );
                    Ok(DEFAULT_CWL_VERSION)
                }
            },
        }
    }

    /// Expand imports, embed step `run:` references and normalize parameter types of one process.
    fn expand_process(
        &mut self,
        process: &mut Value,
        frame: &mut Frame<'_>,
        field: &str,
    ) -> Result<(), AppError> {
        self.resolve_imports(process, frame, field)?;
        let Value::Mapping(map) = process else {
            return Err(AppError::schema(
                display_field(field),
                "process definition must be a mapping",
            ));
        };

        for block in ["inputs", "outputs"] {
            if let Some(params) = map.get_mut(block) {
                normalize_parameter_block(params);
            }
        }

        let Some(steps) = map.get_mut("steps") else {
            return Ok(());
        };
        match steps {
            Value::Mapping(steps) => {
                for (key, step) in steps.iter_mut() {
                    let id = key.as_str().map(strip_id).unwrap_or_default().to_string();
                    let step_field = join_field(field, &format!("steps.{}", id));
                    self.expand_step(step, frame, &step_field)?;
                }
            }
            Value::Sequence(steps) => {
                for (index, step) in steps.iter_mut().enumerate() {
                    let id = step
                        .get("id")
                        .and_then(Value::as_str)
                        .map(|id| strip_id(id).to_string())
                        .unwrap_or_else(|| index.to_string());
                    let step_field = join_field(field, &format!("steps.{}", id));
                    self.expand_step(step, frame, &step_field)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn expand_step(
        &mut self,
        step: &mut Value,
        frame: &mut Frame<'_>,
        field: &str,
    ) -> Result<(), AppError> {
        let Value::Mapping(step_map) = step else {
            return Ok(());
        };
        let run_field = format!("{}.run", field);
        let Some(run) = step_map.get_mut("run") else {
            return Ok(());
        };
        match run {
            Value::String(reference) => {
                let reference = reference.clone();
                *run = self.resolve_run(&reference, frame, &run_field)?;
            }
            Value::Mapping(_) => {
                self.expand_process(run, frame, &run_field)?;
            }
            other => {
                return Err(AppError::schema(
                    run_field,
                    format!("run must be a path or an inline process, got {}", describe(other)),
                ));
            }
        }
        Ok(())
    }

    fn resolve_run(
        &mut self,
        reference: &str,
        frame: &mut Frame<'_>,
        field: &str,
    ) -> Result<Value, AppError> {
        if let Some(id) = reference.strip_prefix('#') {
            let Some(graph) = frame.graph else {
                return Err(AppError::schema(
                    field,
                    format!("reference '{}' needs a $graph document", reference),
                ));
            };
            if frame.graph_stack.iter().any(|entry| entry == id) {
                let mut chain = frame.graph_stack.clone();
                chain.push(id.to_string());
                return Err(AppError::new(
                    ErrorCategory::CyclicImport,
                    format!("$graph process references itself: #{}", chain.join(" -> #")),
                )
                .with_field(field));
            }
            let mut process = graph.get(id).cloned().ok_or_else(|| {
                AppError::schema(field, format!("no process with id '{}' in $graph", reference))
            })?;
            if let Value::Mapping(map) = &mut process {
                if !map.contains_key("cwlVersion") {
                    map.insert(
                        Value::from("cwlVersion"),
                        Value::from(frame.version.to_string()),
                    );
                }
            }
            frame.graph_stack.push(id.to_string());
            let result = self.expand_process(&mut process, frame, field);
            frame.graph_stack.pop();
            result?;
            return Ok(process);
        }

        let (file_part, fragment) = match reference.split_once('#') {
            Some((file, fragment)) => (file, Some(fragment)),
            None => (reference, None),
        };
        let target = frame.base_dir.join(file_part);
        self.references
            .push((frame.file.to_path_buf(), target.clone()));
        let (mut value, version) = self
            .load_file(&target, fragment, Some(frame.version))
            .map_err(|err| err.with_field(field))?;
        if let Value::Mapping(map) = &mut value {
            if !map.contains_key("cwlVersion") {
                map.insert(Value::from("cwlVersion"), Value::from(version.to_string()));
            }
        }
        Ok(value)
    }

    /// Replace `{$import: path}` mappings with the referenced document and `{$include: path}`
    /// with the referenced file's text.
    fn resolve_imports(
        &mut self,
        value: &mut Value,
        frame: &mut Frame<'_>,
        field: &str,
    ) -> Result<(), AppError> {
        match value {
            Value::Mapping(map) => {
                if map.len() == 1 {
                    if let Some(Value::String(target)) = map.get("$import") {
                        let target = frame.base_dir.join(target.as_str());
                        self.references
                            .push((frame.file.to_path_buf(), target.clone()));
                        let (imported, _) = self
                            .load_file(&target, None, Some(frame.version))
                            .map_err(|err| err.with_field(display_field(field)))?;
                        *value = imported;
                        return Ok(());
                    }
                    if let Some(Value::String(target)) = map.get("$include") {
                        let target = frame.base_dir.join(target.as_str());
                        let text = fs::read_to_string(&target).map_err(|err| {
                            AppError::with_source(
                                ErrorCategory::IoError,
                                format!("failed to include {}: {}", target.display(), err),
                                err,
                            )
                            .with_field(display_field(field))
                        })?;
                        *value = Value::String(text);
                        return Ok(());
                    }
                }
                for (key, child) in map.iter_mut() {
                    // Step run references are embedded separately with cycle tracking.
                    if key.as_str() == Some("run") {
                        continue;
                    }
                    let child_field = join_field(field, key.as_str().unwrap_or("?"));
                    self.resolve_imports(child, frame, &child_field)?;
                }
            }
            Value::Sequence(items) => {
                for (index, item) in items.iter_mut().enumerate() {
                    let child_field = format!("{}[{}]", display_field(field), index);
                    self.resolve_imports(item, frame, &child_field)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn normalize_parameter_block(params: &mut Value) {
    match params {
        Value::Mapping(map) => {
            for (_, param) in map.iter_mut() {
                match param {
                    Value::String(_) | Value::Sequence(_) => normalize_type_value(param),
                    Value::Mapping(fields) => {
                        if let Some(type_value) = fields.get_mut("type") {
                            normalize_type_value(type_value);
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Sequence(items) => {
            for item in items {
                if let Some(type_value) = item.get_mut("type") {
                    normalize_type_value(type_value);
                }
            }
        }
        _ => {}
    }
}

fn index_graph(entries: &[Value]) -> HashMap<String, Value> {
    entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(Value::as_str)?;
            Some((strip_id(id).to_string(), entry.clone()))
        })
        .collect()
}

fn select_graph_entry(
    graph: &HashMap<String, Value>,
    entries: &[Value],
    fragment: Option<&str>,
) -> Option<Value> {
    if let Some(fragment) = fragment {
        return graph.get(fragment).cloned();
    }
    if let Some(main) = graph.get("main") {
        return Some(main.clone());
    }
    let workflows: Vec<&Value> = entries
        .iter()
        .filter(|entry| entry.get("class").and_then(Value::as_str) == Some("Workflow"))
        .collect();
    match workflows.as_slice() {
        [single] => Some((*single).clone()),
        _ if entries.len() == 1 => entries.first().cloned(),
        _ => None,
    }
}

/// Strip the `#` prefix and any `file.cwl#` qualifier from an identifier.
pub fn strip_id(id: &str) -> &str {
    match id.rsplit_once('#') {
        Some((_, local)) => local,
        None => id,
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn join_field(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

fn display_field(field: &str) -> String {
    if field.is_empty() {
        "<root>".to_string()
    } else {
        field.to_string()
    }
}

pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
