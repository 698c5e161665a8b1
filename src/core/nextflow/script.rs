//! Process script bodies: command-line assembly and parameter reference translation.

use crate::core::cwl::model::{Argument, CommandLineTool, InputBinding, Parameter};
use crate::core::cwl::types::ScalarType;
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::nextflow::template::{groovy_string, identifier, Identifiers};
use indexmap::IndexMap;

/// Text ready for a Nextflow double-quoted or triple-quoted string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Translation {
    pub text: String,
    /// Raw expressions that were kept verbatim.
    pub untranslated: Vec<String>,
}

/// Process input variables of a tool, unique within the process.
///
/// `task` is taken by Nextflow itself.
pub fn input_identifiers(inputs: &[Parameter]) -> Identifiers {
    Identifiers::assign(inputs.iter().map(|param| param.name.as_str()), &["task"], identifier)
}

/// Names an expression may refer to.
pub struct Scope<'a> {
    inputs: &'a [Parameter],
    idents: &'a Identifiers,
    self_name: Option<&'a str>,
}

impl<'a> Scope<'a> {
    pub fn new(inputs: &'a [Parameter], idents: &'a Identifiers) -> Self {
        Scope {
            inputs,
            idents,
            self_name: None,
        }
    }

    pub fn with_self(mut self, name: &'a str) -> Self {
        self.self_name = Some(name);
        self
    }

    fn knows(&self, name: &str) -> bool {
        self.inputs.iter().any(|param| param.name == name)
    }
}

/// Escape literal text for a GString: backslashes, dollars and double quotes.
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// Translate CWL parameter references inside `text` into Nextflow `${...}` interpolation.
///
/// `$(inputs.x)`, `$(inputs.x.path)`, `.basename`, `.nameroot`, `.nameext`, `.dirname`,
/// `$(self)`, `$(runtime.cores)`, `$(runtime.ram)`, `$(runtime.outdir)` and
/// `$(runtime.tmpdir)` are supported. Anything else, including `${...}` JavaScript bodies,
/// is kept verbatim and listed in `untranslated`.
pub fn translate(text: &str, scope: &Scope<'_>) -> Translation {
    let mut translation = Translation::default();
    let mut rest = text;
    while !rest.is_empty() {
        let opener = if rest.starts_with("$(") {
            Some(('(', ')'))
        } else if rest.starts_with("${") {
            Some(('{', '}'))
        } else {
            None
        };
        let Some((open, close)) = opener else {
            let next = rest
                .char_indices()
                .skip(1)
                .find(|(_, c)| *c == '$')
                .map_or(rest.len(), |(index, _)| index);
            translation.text.push_str(&escape_literal(&rest[..next]));
            rest = &rest[next..];
            continue;
        };

        let Some(end) = matching_close(rest, open, close) else {
            // Unbalanced: the remainder is literal text.
            translation.untranslated.push(rest.to_string());
            translation.text.push_str(&escape_literal(rest));
            break;
        };
        let whole = &rest[..=end];
        let inner = &rest[2..end];
        let replacement = if open == '(' {
            translate_reference(inner.trim(), scope)
        } else {
            None
        };
        match replacement {
            Some(replacement) => translation.text.push_str(&replacement),
            None => {
                translation.untranslated.push(whole.to_string());
                translation.text.push_str(&escape_literal(whole));
            }
        }
        rest = &rest[end + 1..];
    }
    translation
}

/// Index of the bracket closing the one opened at byte 1.
fn matching_close(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (index, c) in text.char_indices().skip(1) {
        if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(index);
            }
        }
    }
    None
}

fn translate_reference(reference: &str, scope: &Scope<'_>) -> Option<String> {
    match reference {
        "runtime.cores" => return Some("${task.cpus}".to_string()),
        "runtime.ram" => return Some("${task.memory.toMega()}".to_string()),
        "runtime.outdir" => return Some(".".to_string()),
        "runtime.tmpdir" => return Some("\\$TMPDIR".to_string()),
        _ => {}
    }

    let (name, property) = if let Some(path) = reference.strip_prefix("inputs.") {
        match path.split_once('.') {
            Some((name, property)) => (name, Some(property)),
            None => (path, None),
        }
    } else if let Some(property) = reference.strip_prefix("self") {
        let name = scope.self_name?;
        match property {
            "" => (name, None),
            other => (name, Some(other.strip_prefix('.')?)),
        }
    } else {
        return None;
    };
    if !scope.knows(name) {
        return None;
    }

    let ident = scope.idents.get(name);
    let expression = match property {
        None | Some("path") | Some("location") => ident,
        Some("basename") => format!("{}.name", ident),
        Some("nameroot") => format!("{}.baseName", ident),
        Some("nameext") => format!("'.' + {}.extension", ident),
        Some("dirname") => format!("{}.parent", ident),
        Some("size") => format!("{}.size()", ident),
        Some(_) => return None,
    };
    Some(format!("${{{}}}", expression))
}

/// A rendered process script plus the environment exports it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBody {
    pub lines: Vec<String>,
}

impl ScriptBody {
    /// Triple-quoted script block content.
    pub fn render(&self) -> String {
        let mut text = String::from("\"\"\"\n");
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("\"\"\"");
        text
    }
}

/// Build the command line of a tool: `baseCommand`, then `arguments` and bound inputs
/// sorted by position, then stream redirections.
///
/// Inputs at the same position as an argument come after it; inputs tied with each other
/// are ordered by name.
pub fn build_script(
    tool: &CommandLineTool,
    idents: &Identifiers,
    env: Option<&IndexMap<String, String>>,
    location: &str,
    diagnostics: &mut Diagnostics,
) -> ScriptBody {
    let scope = Scope::new(&tool.inputs, idents);
    let mut untranslated: Vec<String> = Vec::new();
    let mut lines = Vec::new();

    if let Some(env) = env {
        for (name, value) in env {
            let value = translate(value, &scope);
            untranslated.extend(value.untranslated);
            lines.push(format!("export {}=\"{}\"", identifier(name), value.text));
        }
    }

    let mut words: Vec<String> = tool
        .base_command
        .iter()
        .map(|word| escape_literal(word))
        .collect();

    let mut bound: Vec<(i64, u8, usize, &str, String)> = Vec::new();
    for (index, argument) in tool.arguments.iter().enumerate() {
        if let Some(text) = argument_fragment(argument, &scope, &mut untranslated) {
            bound.push((argument.position, 0, index, "", text));
        }
    }
    for param in &tool.inputs {
        let Some(binding) = &param.input_binding else {
            continue;
        };
        if let Some(text) = input_fragment(param, binding, idents, &mut untranslated) {
            bound.push((binding.position, 1, 0, param.name.as_str(), text));
        }
    }
    bound.sort_by(|a, b| (a.0, a.1, a.2, a.3).cmp(&(b.0, b.1, b.2, b.3)));
    words.extend(bound.into_iter().map(|(_, _, _, _, text)| text));

    if let Some(stdin) = &tool.stdin {
        let stdin = translate(stdin, &scope);
        untranslated.extend(stdin.untranslated);
        words.push(format!("< {}", stdin.text));
    }
    if let Some(stdout) = &tool.stdout {
        let stdout = translate(stdout, &scope);
        untranslated.extend(stdout.untranslated);
        words.push(format!("> {}", stdout.text));
    }
    if let Some(stderr) = &tool.stderr {
        let stderr = translate(stderr, &scope);
        untranslated.extend(stderr.untranslated);
        words.push(format!("2> {}", stderr.text));
    }

    let mut command = words.join(" ");
    if !untranslated.is_empty() {
        let raw: Vec<String> = untranslated.iter().map(|text| escape_literal(text)).collect();
        command.push_str(&format!("  # untranslated: {}", raw.join(" ")));
        for expression in &untranslated {
            diagnostics.push(
                Diagnostic::warning(
                    "CWL-EMIT-002",
                    location,
                    format!(
                        "expression {} in tool '{}' cannot be translated; kept verbatim",
                        expression, tool.id
                    ),
                )
                .with_suggestion("rewrite the expression as a plain parameter reference"),
            );
        }
    }
    lines.push(command);
    ScriptBody { lines }
}

fn argument_fragment(
    argument: &Argument,
    scope: &Scope<'_>,
    untranslated: &mut Vec<String>,
) -> Option<String> {
    let value = argument.value.as_ref().map(|value| {
        let translation = translate(value, scope);
        untranslated.extend(translation.untranslated);
        translation.text
    });
    let prefix = argument.prefix.as_deref().map(escape_literal);
    match (prefix, value) {
        (Some(prefix), Some(value)) if argument.separate => Some(format!("{} {}", prefix, value)),
        (Some(prefix), Some(value)) => Some(format!("{}{}", prefix, value)),
        (Some(prefix), None) => Some(prefix),
        (None, Some(value)) => Some(value),
        (None, None) => None,
    }
}

fn input_fragment(
    param: &Parameter,
    binding: &InputBinding,
    idents: &Identifiers,
    untranslated: &mut Vec<String>,
) -> Option<String> {
    let name = idents.get(&param.name);
    let base = param.param_type.base_scalar();

    if let Some(value_from) = &binding.value_from {
        let scope_inputs = std::slice::from_ref(param);
        let scope = Scope::new(scope_inputs, idents).with_self(&param.name);
        let translation = translate(value_from, &scope);
        untranslated.extend(translation.untranslated);
        return Some(join_prefix(binding, &translation.text));
    }

    if base == ScalarType::Boolean && !param.param_type.is_array() {
        let prefix = binding.prefix.as_deref()?;
        return Some(format!("${{{} ? {} : ''}}", name, groovy_string(prefix)));
    }

    // Groovy expression for the value itself.
    let value = match (param.param_type.is_array(), param.param_type.is_path()) {
        (true, _) if binding.item_separator.is_some() => format!(
            "{}.join({})",
            name,
            groovy_string(binding.item_separator.as_deref().unwrap_or(" "))
        ),
        (true, false) => format!("{}.join(' ')", name),
        _ => name.clone(),
    };

    if !param.param_type.is_optional() {
        return Some(join_prefix(binding, &format!("${{{}}}", value)));
    }

    let guarded = match &binding.prefix {
        Some(prefix) if binding.separate => format!("{} + {}", groovy_string(&format!("{} ", prefix)), value),
        Some(prefix) => format!("{} + {}", groovy_string(prefix), value),
        None => value,
    };
    Some(format!("${{{} ? {} : ''}}", name, guarded))
}

fn join_prefix(binding: &InputBinding, value: &str) -> String {
    match &binding.prefix {
        Some(prefix) if binding.separate => format!("{} {}", escape_literal(prefix), value),
        Some(prefix) => format!("{}{}", escape_literal(prefix), value),
        None => value.to_string(),
    }
}
