use crate::envfile::parser::{ParsedLine, is_valid_identifier, parse_line};
use crate::models::{Assignment, QuoteStyle};
use indexmap::IndexMap;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from misusing the file model's mutators.
///
/// Loading never fails: malformed lines are kept as comments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvFileError {
    #[error("Invalid variable name '{0}': must start with a letter or underscore and contain only letters, numbers, and underscores")]
    MalformedIdentifier(String),

    #[error("Variable {0} already exists")]
    DuplicateVariable(String),
}

/// One line of the loaded file's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralElement {
    /// Any non-assignment line, blank lines included, kept byte-for-byte.
    Comment { text: String, line_number: usize },

    /// Position of an assignment. Its value lives in the variable map.
    VariableSlot { name: String, line_number: usize },
}

impl StructuralElement {
    pub fn line_number(&self) -> usize {
        match self {
            StructuralElement::Comment { line_number, .. }
            | StructuralElement::VariableSlot { line_number, .. } => *line_number,
        }
    }
}

/// Editable view of an environment file.
///
/// `structure` records the original line-by-line shape and is never touched by
/// edits. `variables` is the single source of truth for values, in first-seen
/// order; later duplicates overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileModel {
    structure: Vec<StructuralElement>,
    variables: IndexMap<String, Assignment>,
}

impl FileModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from file text.
    ///
    /// Lines are split on `\n` only, so a trailing newline produces a final
    /// empty line and rendering restores it.
    pub fn load(text: &str) -> Self {
        let mut model = Self::new();

        for (index, raw_line) in text.split('\n').enumerate() {
            let line_number = index + 1;

            match parse_line(raw_line) {
                ParsedLine::Assignment(mut assignment) => {
                    assignment.line_number = line_number;
                    model.structure.push(StructuralElement::VariableSlot {
                        name: assignment.name.clone(),
                        line_number,
                    });
                    model.variables.insert(assignment.name.clone(), assignment);
                }
                ParsedLine::Comment => {
                    model.structure.push(StructuralElement::Comment {
                        text: raw_line.to_string(),
                        line_number,
                    });
                }
            }
        }

        tracing::debug!(
            "Loaded environment model: {} lines, {} variables",
            model.structure.len(),
            model.variables.len()
        );

        model
    }

    /// Set a variable's value, creating an enabled unquoted variable if needed.
    pub fn set_value(&mut self, name: &str, value: &str) {
        match self.variables.get_mut(name) {
            Some(assignment) => {
                if assignment.value != value {
                    assignment.value = value.to_string();
                    assignment.modified = true;
                }
            }
            None => {
                self.variables
                    .insert(name.to_string(), Assignment::new(name, value));
            }
        }
    }

    /// Enable or disable a variable. Returns false if it does not exist.
    pub fn set_commented(&mut self, name: &str, commented: bool) -> bool {
        match self.variables.get_mut(name) {
            Some(assignment) => {
                if assignment.commented != commented {
                    assignment.commented = commented;
                    assignment.modified = true;
                }
                true
            }
            None => false,
        }
    }

    /// Flip a variable's enabled state, returning the new `commented` flag.
    pub fn toggle_commented(&mut self, name: &str) -> Option<bool> {
        let commented = !self.variables.get(name)?.commented;
        self.set_commented(name, commented);
        Some(commented)
    }

    /// Change how a variable is quoted. Returns false if it does not exist.
    pub fn set_quote_style(&mut self, name: &str, quote_style: QuoteStyle) -> bool {
        match self.variables.get_mut(name) {
            Some(assignment) => {
                if assignment.quote_style != quote_style {
                    assignment.quote_style = quote_style;
                    assignment.modified = true;
                }
                true
            }
            None => false,
        }
    }

    /// Drop a variable. Its slot stays in the structure and renders as nothing.
    pub fn remove(&mut self, name: &str) -> Option<Assignment> {
        self.variables.shift_remove(name)
    }

    /// Insert a new variable.
    ///
    /// # Errors
    ///
    /// - [`EnvFileError::MalformedIdentifier`] if `name` is not a shell identifier
    /// - [`EnvFileError::DuplicateVariable`] if `name` is already present
    pub fn add(
        &mut self,
        name: &str,
        value: &str,
        quote_style: QuoteStyle,
        commented: bool,
    ) -> Result<(), EnvFileError> {
        if !is_valid_identifier(name) {
            return Err(EnvFileError::MalformedIdentifier(name.to_string()));
        }
        if self.variables.contains_key(name) {
            return Err(EnvFileError::DuplicateVariable(name.to_string()));
        }

        let assignment = Assignment::new(name, value)
            .with_quote_style(quote_style)
            .with_commented(commented);
        self.variables.insert(name.to_string(), assignment);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Assignment> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Variables in map order.
    pub fn variables(&self) -> impl Iterator<Item = &Assignment> {
        self.variables.values()
    }

    pub fn structure(&self) -> &[StructuralElement] {
        &self.structure
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Line number of the last slot for each name in the structure.
    ///
    /// Only that slot renders the variable; earlier duplicates render nothing.
    pub fn owning_slots(&self) -> HashMap<&str, usize> {
        let mut owners = HashMap::new();
        for element in &self.structure {
            if let StructuralElement::VariableSlot { name, line_number } = element {
                owners.insert(name.as_str(), *line_number);
            }
        }
        owners
    }

    /// True when something was edited, added or removed since load.
    pub fn has_changes(&self) -> bool {
        if self.variables.values().any(|a| a.modified) {
            return true;
        }
        self.structure.iter().any(|element| match element {
            StructuralElement::VariableSlot { name, .. } => !self.variables.contains_key(name),
            StructuralElement::Comment { .. } => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Service settings\nPORT=8080\n\n#LOG_LEVEL=DEBUG\nEXTRA_ARGS=\"--verbose\"\n";

    #[test]
    fn test_load_builds_structure() {
        let model = FileModel::load(SAMPLE);

        // Trailing newline yields a final empty line
        assert_eq!(model.structure().len(), 6);
        assert!(matches!(
            &model.structure()[0],
            StructuralElement::Comment { text, line_number: 1 } if text == "# Service settings"
        ));
        assert!(matches!(
            &model.structure()[1],
            StructuralElement::VariableSlot { name, line_number: 2 } if name == "PORT"
        ));
        assert!(matches!(
            &model.structure()[5],
            StructuralElement::Comment { text, line_number: 6 } if text.is_empty()
        ));
        assert_eq!(model.len(), 3);
        assert!(!model.has_changes());
    }

    #[test]
    fn test_load_stamps_line_numbers() {
        let model = FileModel::load(SAMPLE);

        assert_eq!(model.get("PORT").unwrap().line_number, 2);
        assert_eq!(model.get("LOG_LEVEL").unwrap().line_number, 4);
        assert!(model.get("LOG_LEVEL").unwrap().commented);
    }

    #[test]
    fn test_empty_text_is_one_blank_line() {
        let model = FileModel::load("");
        assert_eq!(model.structure().len(), 1);
        assert!(model.is_empty());
    }

    #[test]
    fn test_duplicate_names_last_write_wins() {
        let model = FileModel::load("PORT=1\nPORT=2\nUSER=svc");

        assert_eq!(model.len(), 2);
        let port = model.get("PORT").unwrap();
        assert_eq!(port.value, "2");
        assert_eq!(port.line_number, 2);

        // First-seen position is kept in the map
        let names: Vec<&str> = model.variables().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["PORT", "USER"]);
        assert_eq!(model.owning_slots().get("PORT"), Some(&2));
    }

    #[test]
    fn test_set_value_preserves_quoting() {
        let mut model = FileModel::load("#EXTRA_ARGS='-v'");
        model.set_value("EXTRA_ARGS", "-vv");

        let assignment = model.get("EXTRA_ARGS").unwrap();
        assert_eq!(assignment.value, "-vv");
        assert_eq!(assignment.quote_style, QuoteStyle::Single);
        assert!(assignment.commented);
        assert!(assignment.modified);
    }

    #[test]
    fn test_set_value_same_value_is_not_a_change() {
        let mut model = FileModel::load("PORT=8080");
        model.set_value("PORT", "8080");
        assert!(!model.has_changes());
    }

    #[test]
    fn test_set_value_creates_variable() {
        let mut model = FileModel::new();
        model.set_value("NEW_VAR", "x");

        let assignment = model.get("NEW_VAR").unwrap();
        assert_eq!(assignment.quote_style, QuoteStyle::None);
        assert!(!assignment.commented);
        assert_eq!(assignment.line_number, 0);
    }

    #[test]
    fn test_set_commented_and_quote_style_missing_are_noops() {
        let mut model = FileModel::load("PORT=8080");

        assert!(!model.set_commented("MISSING", true));
        assert!(!model.set_quote_style("MISSING", QuoteStyle::Double));
        assert_eq!(model.toggle_commented("MISSING"), None);
        assert!(!model.contains("MISSING"));
        assert!(!model.has_changes());
    }

    #[test]
    fn test_toggle_commented() {
        let mut model = FileModel::load("PORT=8080");

        assert_eq!(model.toggle_commented("PORT"), Some(true));
        assert!(model.get("PORT").unwrap().commented);
        assert_eq!(model.toggle_commented("PORT"), Some(false));
        assert!(model.get("PORT").unwrap().is_enabled());
    }

    #[test]
    fn test_remove_leaves_dangling_slot() {
        let mut model = FileModel::load(SAMPLE);
        let removed = model.remove("PORT").unwrap();

        assert_eq!(removed.value, "8080");
        assert!(!model.contains("PORT"));
        assert_eq!(model.structure().len(), 6);
        assert!(model.has_changes());
        assert!(model.remove("PORT").is_none());
    }

    #[test]
    fn test_remove_keeps_remaining_order() {
        let mut model = FileModel::load("A=1\nB=2\nC=3");
        model.remove("A");

        let names: Vec<&str> = model.variables().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["B", "C"]);
    }

    #[test]
    fn test_add_variable() {
        let mut model = FileModel::load(SAMPLE);
        model
            .add("WORKERS", "4", QuoteStyle::Double, false)
            .unwrap();

        let added = model.get("WORKERS").unwrap();
        assert_eq!(added.quote_style, QuoteStyle::Double);
        assert_eq!(added.line_number, 0);
        assert_eq!(model.variables().last().unwrap().name, "WORKERS");
    }

    #[test]
    fn test_add_rejects_bad_names_without_mutating() {
        let mut model = FileModel::load(SAMPLE);
        let before = model.clone();

        assert_eq!(
            model.add("bad-name", "x", QuoteStyle::None, false),
            Err(EnvFileError::MalformedIdentifier("bad-name".to_string()))
        );
        assert_eq!(
            model.add("", "x", QuoteStyle::None, false),
            Err(EnvFileError::MalformedIdentifier(String::new()))
        );
        assert_eq!(
            model.add("PORT", "9090", QuoteStyle::None, false),
            Err(EnvFileError::DuplicateVariable("PORT".to_string()))
        );
        assert_eq!(model, before);
    }

    #[test]
    fn test_add_accepts_lowercase_identifier() {
        let mut model = FileModel::new();
        assert!(model.add("lower_case", "1", QuoteStyle::None, false).is_ok());
    }
}
