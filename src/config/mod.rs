use crate::models::{PanelConfig, VariableRegistry};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// Name of the panel configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "envpanel.yaml";

/// Prefix for environment overrides, e.g. `ENVPANEL_SERVICE_NAME=nginx`.
pub const ENV_PREFIX: &str = "ENVPANEL";

/// Configuration manager for loading and saving the panel configuration.
///
/// Values are layered: built-in defaults, then `envpanel.yaml` if present,
/// then `ENVPANEL_*` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    panel_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing `envpanel.yaml` (created if missing)
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            panel_config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the panel configuration.
    ///
    /// # Returns
    /// The layered PanelConfig; defaults apply when the file doesn't exist
    pub fn load_panel_config(&self) -> Result<PanelConfig> {
        if !self.panel_config_path.exists() {
            tracing::warn!(
                "Panel config file not found at {}, using defaults",
                self.panel_config_path
            );
        }

        let settings = Config::builder()
            .add_source(
                File::new(self.panel_config_path.as_str(), FileFormat::Yaml).required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read panel config: {}", self.panel_config_path))?;

        let config: PanelConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse panel config: {}", self.panel_config_path))?;

        tracing::info!(
            "Loaded panel config: service={}, env_file={}",
            config.service_name,
            config.env_file_path()
        );
        Ok(config)
    }

    /// Save the panel configuration file.
    ///
    /// # Arguments
    /// * `config` - The PanelConfig to save
    pub fn save_panel_config(&self, config: &PanelConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize panel config to YAML")?;

        fs::write(&self.panel_config_path, yaml_string)
            .with_context(|| format!("Failed to write panel config: {}", self.panel_config_path))?;

        tracing::info!("Saved panel config to {}", self.panel_config_path);
        Ok(())
    }

    /// Build the variable registry: built-ins extended by the configured definitions.
    pub fn build_registry(&self, config: &PanelConfig) -> Result<VariableRegistry> {
        let mut registry = VariableRegistry::builtin();
        registry
            .extend(config.definitions.iter().cloned())
            .with_context(|| {
                format!(
                    "Invalid variable definition in {}",
                    self.panel_config_path
                )
            })?;
        Ok(registry)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the panel configuration file path.
    pub fn panel_config_path(&self) -> &Utf8Path {
        &self.panel_config_path
    }
}
