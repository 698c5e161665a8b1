//! Placeholder substitution for the Nextflow text templates.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use indexmap::IndexMap;
use regex::Regex;
use serde_yaml::Value;
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Values for one template rendering, kept in insertion order.
#[derive(Debug, Default, Clone)]
pub struct Bindings {
    values: IndexMap<String, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// A named template with `{{ key }}` placeholders.
///
/// A line holding nothing but a placeholder is dropped when the value is empty, and a
/// multi-line value is re-indented to the placeholder's column. Every placeholder must be
/// bound; a missing key fails the render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: Cow<'static, str>,
    source: Cow<'static, str>,
}

impl Template {
    pub const fn new(name: &'static str, source: &'static str) -> Self {
        Template {
            name: Cow::Borrowed(name),
            source: Cow::Borrowed(source),
        }
    }

    /// User-supplied template text, named after its file.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            AppError::with_source(
                ErrorCategory::IoError,
                format!("cannot read template {}: {}", path.display(), e),
                e,
            )
            .with_file(path)
        })?;
        Ok(Template {
            name: Cow::Owned(path.display().to_string()),
            source: Cow::Owned(source),
        })
    }

    /// Placeholders the template refers to, in order of first use.
    pub fn placeholders(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for captures in placeholder_pattern().captures_iter(&self.source) {
            let key = captures[1].to_string();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn render(&self, bindings: &Bindings) -> Result<String, AppError> {
        let pattern = placeholder_pattern();
        let mut rendered = Vec::new();
        for line in self.source.lines() {
            let trimmed = line.trim();
            let indent = &line[..line.len() - line.trim_start().len()];

            if let Some(captures) = pattern.captures(trimmed) {
                if captures.get(0).map(|m| m.as_str()) == Some(trimmed) {
                    let key = &captures[1];
                    let value = self.lookup(bindings, key)?;
                    if value.is_empty() {
                        continue;
                    }
                    for value_line in value.lines() {
                        if value_line.is_empty() {
                            rendered.push(String::new());
                        } else {
                            rendered.push(format!("{}{}", indent, value_line));
                        }
                    }
                    continue;
                }
            }

            let mut out = String::with_capacity(line.len());
            let mut last = 0;
            for captures in pattern.captures_iter(line) {
                let Some(whole) = captures.get(0) else {
                    continue;
                };
                out.push_str(&line[last..whole.start()]);
                out.push_str(self.lookup(bindings, &captures[1])?);
                last = whole.end();
            }
            out.push_str(&line[last..]);
            rendered.push(out);
        }
        Ok(rendered.join("\n") + "\n")
    }

    fn lookup<'b>(&self, bindings: &'b Bindings, key: &str) -> Result<&'b str, AppError> {
        bindings.get(key).ok_or_else(|| {
            AppError::new(
                ErrorCategory::TemplateRender,
                format!("template '{}' has no value for placeholder '{}'", self.name, key),
            )
        })
    }
}

/// Single-quoted Groovy string literal.
pub fn groovy_string(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Groovy literal for a CWL default value.
///
/// `File`/`Directory` objects become their `location` or `path`.
pub fn groovy_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => groovy_string(text),
        Value::Sequence(items) => {
            let items: Vec<String> = items.iter().map(groovy_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Mapping(map) => {
            let class = map.get("class").and_then(Value::as_str);
            if matches!(class, Some("File") | Some("Directory")) {
                if let Some(location) = map
                    .get("location")
                    .or_else(|| map.get("path"))
                    .and_then(Value::as_str)
                {
                    return groovy_string(location);
                }
            }
            if map.is_empty() {
                return "[:]".to_string();
            }
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| {
                    let key = key.as_str().map(groovy_string).unwrap_or_else(|| groovy_literal(key));
                    format!("{}: {}", key, groovy_literal(value))
                })
                .collect();
            format!("[{}]", entries.join(", "))
        }
        Value::Tagged(tagged) => groovy_literal(&tagged.value),
    }
}

/// Identifier usable as a Nextflow variable or emit name.
pub fn identifier(raw: &str) -> String {
    let mut ident: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

/// Unique identifiers for one naming scope, assigned in declaration order.
///
/// A name whose identifier is already taken, or reserved, gets `_2`, `_3`, ... appended.
#[derive(Debug, Clone, Default)]
pub struct Identifiers {
    assigned: IndexMap<String, String>,
    renamed: Vec<String>,
}

impl Identifiers {
    pub fn assign<'n>(
        names: impl IntoIterator<Item = &'n str>,
        reserved: &[&str],
        mangle: fn(&str) -> String,
    ) -> Self {
        let mut taken: HashSet<String> = reserved.iter().map(|name| name.to_string()).collect();
        let mut identifiers = Identifiers::default();
        for name in names {
            if identifiers.assigned.contains_key(name) {
                continue;
            }
            let base = mangle(name);
            let mut candidate = base.clone();
            let mut suffix = 2;
            while taken.contains(&candidate) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            if candidate != base {
                identifiers.renamed.push(name.to_string());
            }
            taken.insert(candidate.clone());
            identifiers.assigned.insert(name.to_string(), candidate);
        }
        identifiers
    }

    /// Identifier of `name`; names outside the scope fall back to their sanitized form.
    pub fn get(&self, name: &str) -> String {
        self.assigned
            .get(name)
            .cloned()
            .unwrap_or_else(|| identifier(name))
    }

    /// Names that did not keep their plain identifier, with the one they got.
    pub fn renamed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.renamed.iter().filter_map(|name| {
            self.assigned
                .get(name)
                .map(|ident| (name.as_str(), ident.as_str()))
        })
    }
}

/// Process name for a step id: upper-cased identifier.
pub fn process_name(step_id: &str) -> String {
    let name = identifier(step_id).to_ascii_uppercase();
    if name.starts_with('_') {
        format!("STEP{}", name)
    } else {
        name
    }
}
