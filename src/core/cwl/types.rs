//! Parameter types: shorthand normalization and the closed `ParamType` variant.

use serde::Serialize;
use serde_yaml::Value;
use std::fmt;

/// Normalize CWL type shorthand into canonical form.
///
/// `T[]` becomes `array<T>`, `T?` becomes `optional<T>`, and the rewrite recurses into the
/// element type. Bare type names pass through unchanged. Canonical strings contain neither
/// suffix, so applying the function to its own output is a no-op.
pub fn normalize_type_shorthand(type_name: &str) -> String {
    let trimmed = type_name.trim();
    if let Some(inner) = trimmed.strip_suffix('?') {
        return format!("optional<{}>", normalize_type_shorthand(inner));
    }
    if let Some(inner) = trimmed.strip_suffix("[]") {
        return format!("array<{}>", normalize_type_shorthand(inner));
    }
    for wrapper in ["array", "optional"] {
        if let Some(inner) = strip_wrapper(trimmed, wrapper) {
            return format!("{}<{}>", wrapper, normalize_type_shorthand(inner));
        }
    }
    trimmed.to_string()
}

fn strip_wrapper<'a>(text: &'a str, wrapper: &str) -> Option<&'a str> {
    text.strip_prefix(wrapper)?
        .strip_prefix('<')?
        .strip_suffix('>')
}

/// Rewrite shorthand type strings inside a parsed type expression, in place.
///
/// Handles bare strings, union lists and `{type: array, items: ...}` mappings.
pub fn normalize_type_value(value: &mut Value) {
    match value {
        Value::String(text) => {
            let normalized = normalize_type_shorthand(text);
            if normalized != *text {
                *text = normalized;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                normalize_type_value(item);
            }
        }
        Value::Mapping(map) => {
            if let Some(items) = map.get_mut("items") {
                normalize_type_value(items);
            }
        }
        _ => {}
    }
}

/// Scalar parameter types supported by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
    File,
    Directory,
}

impl ScalarType {
    /// Map a CWL type name onto a scalar, if it is one.
    pub fn from_cwl_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ScalarType::String),
            "int" | "long" => Some(ScalarType::Integer),
            "float" | "double" => Some(ScalarType::Float),
            "boolean" => Some(ScalarType::Boolean),
            "File" | "stdout" | "stderr" => Some(ScalarType::File),
            "Directory" => Some(ScalarType::Directory),
            _ => None,
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self, ScalarType::File | ScalarType::Directory)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::String => "string",
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
            ScalarType::Boolean => "boolean",
            ScalarType::File => "file",
            ScalarType::Directory => "directory",
        };
        write!(f, "{}", name)
    }
}

/// Semantic parameter type, resolved once when the model is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Scalar(ScalarType),
    Array(Box<ParamType>),
    Optional(Box<ParamType>),
}

/// Why a type expression could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeResolution {
    Resolved(ParamType),
    /// `enum` types degrade to strings; the caller records an info diagnostic.
    EnumAsString(ParamType),
    Unsupported(String),
}

impl ParamType {
    pub fn scalar(scalar: ScalarType) -> Self {
        ParamType::Scalar(scalar)
    }

    pub fn array(inner: ParamType) -> Self {
        ParamType::Array(Box::new(inner))
    }

    pub fn optional(inner: ParamType) -> Self {
        match inner {
            ParamType::Optional(_) => inner,
            other => ParamType::Optional(Box::new(other)),
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, ParamType::Optional(_))
    }

    /// The type with any optional wrapper removed.
    pub fn required(&self) -> &ParamType {
        match self {
            ParamType::Optional(inner) => inner.required(),
            other => other,
        }
    }

    /// The innermost scalar.
    pub fn base_scalar(&self) -> ScalarType {
        match self {
            ParamType::Scalar(scalar) => *scalar,
            ParamType::Array(inner) | ParamType::Optional(inner) => inner.base_scalar(),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.required(), ParamType::Array(_))
    }

    /// True when values of this type are staged as files in the target pipeline.
    pub fn is_path(&self) -> bool {
        self.base_scalar().is_path()
    }

    /// Resolve a (normalized) CWL type expression.
    pub fn resolve(value: &Value) -> TypeResolution {
        match value {
            Value::String(text) => resolve_name(&normalize_type_shorthand(text)),
            Value::Sequence(items) => {
                let mut nullable = false;
                let mut members = Vec::new();
                for item in items {
                    if item.as_str() == Some("null") {
                        nullable = true;
                    } else {
                        members.push(item);
                    }
                }
                let inner = match members.as_slice() {
                    [single] => ParamType::resolve(single),
                    [] => return TypeResolution::Unsupported("union with only null".into()),
                    _ => {
                        return TypeResolution::Unsupported(format!(
                            "union of {} non-null types",
                            members.len()
                        ))
                    }
                };
                if nullable {
                    inner.map(ParamType::optional)
                } else {
                    inner
                }
            }
            Value::Mapping(map) => match map.get("type").and_then(Value::as_str) {
                Some("array") => match map.get("items") {
                    Some(items) => ParamType::resolve(items).map(ParamType::array),
                    None => TypeResolution::Unsupported("array type without items".into()),
                },
                Some("enum") => TypeResolution::EnumAsString(ParamType::scalar(ScalarType::String)),
                Some("record") => TypeResolution::Unsupported("record types".into()),
                Some(other) => TypeResolution::Unsupported(format!("type mapping '{}'", other)),
                None => TypeResolution::Unsupported("type mapping without 'type'".into()),
            },
            Value::Null => TypeResolution::Unsupported("missing type".into()),
            other => TypeResolution::Unsupported(format!("type value {:?}", other)),
        }
    }
}

fn resolve_name(canonical: &str) -> TypeResolution {
    if let Some(inner) = strip_wrapper(canonical, "optional") {
        return resolve_name(inner).map(ParamType::optional);
    }
    if let Some(inner) = strip_wrapper(canonical, "array") {
        return resolve_name(inner).map(ParamType::array);
    }
    match ScalarType::from_cwl_name(canonical) {
        Some(scalar) => TypeResolution::Resolved(ParamType::Scalar(scalar)),
        None => TypeResolution::Unsupported(format!("type '{}'", canonical)),
    }
}

impl TypeResolution {
    fn map(self, f: impl FnOnce(ParamType) -> ParamType) -> TypeResolution {
        match self {
            TypeResolution::Resolved(inner) => TypeResolution::Resolved(f(inner)),
            TypeResolution::EnumAsString(inner) => TypeResolution::EnumAsString(f(inner)),
            unsupported => unsupported,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Scalar(scalar) => write!(f, "{}", scalar),
            ParamType::Array(inner) => write!(f, "array<{}>", inner),
            ParamType::Optional(inner) => write!(f, "optional<{}>", inner),
        }
    }
}
