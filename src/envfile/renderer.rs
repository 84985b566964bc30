use crate::envfile::model::{FileModel, StructuralElement};
use crate::models::{Assignment, QuoteStyle, VariableRegistry};

/// How to regenerate file text from a [`FileModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Keep the loaded layout; new variables are appended at the end.
    #[default]
    Structured,

    /// Discard the layout and emit a canonical file.
    Fresh,
}

impl RenderMode {
    pub fn from_preserve_comments(preserve_comments: bool) -> Self {
        if preserve_comments {
            RenderMode::Structured
        } else {
            RenderMode::Fresh
        }
    }
}

/// Turns a [`FileModel`] back into file text.
///
/// The registry supplies descriptions for fresh mode and the service name
/// goes into the fresh-mode header.
pub struct Renderer<'a> {
    registry: &'a VariableRegistry,
    service_name: &'a str,
}

impl<'a> Renderer<'a> {
    pub fn new(registry: &'a VariableRegistry, service_name: &'a str) -> Self {
        Self {
            registry,
            service_name,
        }
    }

    /// Render the model. Lines are joined with `\n`; no newline is appended.
    pub fn render(&self, model: &FileModel, mode: RenderMode, auto_quote: bool) -> String {
        let lines = match mode {
            RenderMode::Structured => self.structured_lines(model, auto_quote),
            RenderMode::Fresh => self.fresh_lines(model, auto_quote),
        };
        lines.join("\n")
    }

    fn structured_lines(&self, model: &FileModel, auto_quote: bool) -> Vec<String> {
        let owners = model.owning_slots();
        let mut lines = Vec::with_capacity(model.structure().len());

        for element in model.structure() {
            match element {
                StructuralElement::Comment { text, .. } => lines.push(text.clone()),
                StructuralElement::VariableSlot { name, line_number } => {
                    // Removed variables and shadowed duplicates render nothing
                    if owners.get(name.as_str()) != Some(line_number) {
                        continue;
                    }
                    if let Some(assignment) = model.get(name) {
                        lines.push(slot_line(assignment, auto_quote));
                    }
                }
            }
        }

        for assignment in model.variables() {
            if !owners.contains_key(assignment.name.as_str()) {
                lines.push(generate_line(assignment, auto_quote));
            }
        }

        lines
    }

    fn fresh_lines(&self, model: &FileModel, auto_quote: bool) -> Vec<String> {
        let mut lines = vec![
            format!("# Environment configuration for {}", self.service_name),
            "# This file is sourced by the service startup script".to_string(),
            String::new(),
        ];

        for assignment in model.variables() {
            if let Some(definition) = self.registry.lookup(&assignment.name) {
                lines.push(format!("# {}", definition.description));
            }
            lines.push(generate_line(assignment, auto_quote));
            lines.push(String::new());
        }

        lines
    }
}

/// Untouched assignments keep their original text.
fn slot_line(assignment: &Assignment, auto_quote: bool) -> String {
    match (&assignment.original_line, assignment.modified) {
        (Some(original), false) => original.clone(),
        _ => generate_line(assignment, auto_quote),
    }
}

/// Serialize one assignment as `[#]NAME=VALUE`.
///
/// Single-quoted values are wrapped without escaping, so a value that itself
/// contains `'` produces a line the shell will not read back identically.
pub fn generate_line(assignment: &Assignment, auto_quote: bool) -> String {
    let prefix = if assignment.commented { "#" } else { "" };
    let value = &assignment.value;

    let output = match assignment.quote_style {
        QuoteStyle::Double => double_quote(value),
        QuoteStyle::Single => format!("'{}'", value),
        QuoteStyle::None if auto_quote && value.contains(' ') => double_quote(value),
        QuoteStyle::None => value.clone(),
    };

    format!("{}{}={}", prefix, assignment.name, output)
}

fn double_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
