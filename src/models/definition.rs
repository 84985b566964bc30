use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use thiserror::Error;

/// Description given to variables the registry knows nothing about.
pub const CUSTOM_VARIABLE_DESCRIPTION: &str = "Custom environment variable";

/// A definition the registry cannot accept.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid validation pattern for {name}: {pattern}")]
    InvalidPattern {
        name: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Declared type of a known variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Boolean,
    #[default]
    String,
    Integer,
    Enum,
    Path,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Boolean => "boolean",
            VariableType::String => "string",
            VariableType::Integer => "integer",
            VariableType::Enum => "enum",
            VariableType::Path => "path",
        }
    }
}

/// Static metadata for a known variable: type, description, default, and
/// the optional rule used by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,

    #[serde(rename = "type", default)]
    pub var_type: VariableType,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub default_value: String,

    /// Regex the whole value must match. Use `(?i)` for case-insensitive rules.
    #[serde(default)]
    pub validation: Option<String>,

    /// Inclusive numeric range, only applied to integer variables.
    #[serde(default)]
    pub range: Option<(i64, i64)>,

    #[serde(default)]
    pub options: Vec<String>,

    #[serde(default)]
    pub requires_quoting: bool,
}

impl VariableDefinition {
    fn builtin(name: &str, var_type: VariableType, description: &str, default_value: &str) -> Self {
        Self {
            name: name.to_string(),
            var_type,
            description: description.to_string(),
            default_value: default_value.to_string(),
            validation: None,
            range: None,
            options: Vec::new(),
            requires_quoting: false,
        }
    }

    fn rule(mut self, pattern: &str) -> Self {
        self.validation = Some(pattern.to_string());
        self
    }

    fn range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }

    fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    fn quoted(mut self) -> Self {
        self.requires_quoting = true;
        self
    }

    /// Definition handed out for user-defined variables.
    pub fn custom(name: &str) -> Self {
        Self::builtin(name, VariableType::String, CUSTOM_VARIABLE_DESCRIPTION, "")
    }

    /// Input hint shown in place of an empty value.
    pub fn placeholder(&self) -> Option<String> {
        let choices = self.options.join("|");
        match (self.default_value.is_empty(), choices.is_empty()) {
            (true, true) => None,
            (false, true) => Some(format!("default: {}", self.default_value)),
            (true, false) => Some(format!("one of: {}", choices)),
            (false, false) => Some(format!("default: {}, one of: {}", self.default_value, choices)),
        }
    }
}

/// Lookup table of known variables, in declaration order.
///
/// Validation patterns are compiled once when a definition is registered.
#[derive(Debug, Clone)]
pub struct VariableRegistry {
    definitions: IndexMap<String, VariableDefinition>,
    patterns: HashMap<String, Regex>,
}

impl VariableRegistry {
    /// An empty registry. Every name gets the custom definition.
    pub fn empty() -> Self {
        Self {
            definitions: IndexMap::new(),
            patterns: HashMap::new(),
        }
    }

    /// The registry of variables the managed service understands.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let builtins = [
            VariableDefinition::builtin("ENABLED", VariableType::Boolean, "Enable or disable the service", "true")
                .rule(r"(?i)^(true|false|yes|no|1|0)$"),
            VariableDefinition::builtin(
                "COT_URL",
                VariableType::String,
                "URL of the CoT destination, typically Mesh SA or TAK Server.",
                "udp+wo://239.2.3.1:6969",
            )
            .quoted(),
            VariableDefinition::builtin(
                "PORT",
                VariableType::Integer,
                "Port number for the service to listen on",
                "8080",
            )
            .rule(r"^[0-9]{1,5}$")
            .range(1, 65535),
            VariableDefinition::builtin("BIND_ADDRESS", VariableType::String, "IP address to bind to", "0.0.0.0")
                .rule(r"^([0-9]{1,3}\.){3}[0-9]{1,3}$"),
            VariableDefinition::builtin("LOG_LEVEL", VariableType::Enum, "Logging level", "INFO")
                .options(&["DEBUG", "INFO", "WARN", "ERROR"])
                .rule(r"(?i)^(DEBUG|INFO|WARN|ERROR)$"),
            VariableDefinition::builtin(
                "MAX_CONNECTIONS",
                VariableType::Integer,
                "Maximum concurrent connections",
                "100",
            )
            .rule(r"^[0-9]+$")
            .range(1, 10000),
            VariableDefinition::builtin(
                "CONFIG_DIR",
                VariableType::Path,
                "Configuration directory path",
                "/etc/aiscot",
            )
            .rule(r"^/[A-Za-z0-9_/-]*$"),
            VariableDefinition::builtin("DATA_DIR", VariableType::Path, "Data storage directory", "/var/lib/aiscot")
                .rule(r"^/[A-Za-z0-9_/-]*$"),
            VariableDefinition::builtin("USER", VariableType::String, "User to run as", "aiscot")
                .rule(r"^[a-zA-Z_][a-zA-Z0-9_-]*$"),
            VariableDefinition::builtin("EXTRA_ARGS", VariableType::String, "Additional command line arguments", "")
                .quoted(),
        ];

        for definition in builtins {
            registry
                .register(definition)
                .expect("Invalid built-in validation regex");
        }

        registry
    }

    /// Add a definition, replacing any existing one with the same name.
    ///
    /// A replaced definition keeps its original position.
    pub fn register(&mut self, definition: VariableDefinition) -> Result<(), RegistryError> {
        match &definition.validation {
            Some(pattern) => {
                let regex = Regex::new(pattern).map_err(|source| RegistryError::InvalidPattern {
                    name: definition.name.clone(),
                    pattern: pattern.clone(),
                    source,
                })?;
                self.patterns.insert(definition.name.clone(), regex);
            }
            None => {
                self.patterns.remove(&definition.name);
            }
        }

        tracing::debug!("Registered variable definition: {}", definition.name);
        self.definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Register every definition in order, stopping at the first bad pattern.
    pub fn extend<I>(&mut self, definitions: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = VariableDefinition>,
    {
        for definition in definitions {
            self.register(definition)?;
        }
        Ok(())
    }

    /// Look up a known variable.
    pub fn lookup(&self, name: &str) -> Option<&VariableDefinition> {
        self.definitions.get(name)
    }

    /// Look up a variable, falling back to the custom definition for unknown names.
    pub fn definition_or_custom(&self, name: &str) -> Cow<'_, VariableDefinition> {
        match self.lookup(name) {
            Some(definition) => Cow::Borrowed(definition),
            None => Cow::Owned(VariableDefinition::custom(name)),
        }
    }

    /// Compiled validation rule for a known variable.
    pub fn pattern(&self, name: &str) -> Option<&Regex> {
        self.patterns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &VariableDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
