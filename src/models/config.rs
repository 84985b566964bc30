use crate::envfile::RenderMode;
use crate::models::VariableDefinition;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Panel configuration from `envpanel.yaml`.
///
/// Identifies the managed service and its environment file, and carries the
/// rendering and polling preferences the editing session uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub service_name: String,

    /// Defaults to `/etc/default/<service_name>`.
    pub env_file: Option<Utf8PathBuf>,

    pub status_refresh_secs: u64,
    pub post_action_refresh_ms: u64,
    pub log_lines: u32,

    pub auto_quote: bool,
    pub preserve_comments: bool,
    pub validate_shell: bool,

    /// Prefix for lifecycle commands, e.g. `sudo`.
    pub privilege_command: Option<String>,

    pub shell: String,
    pub systemctl: String,
    pub journalctl: String,

    /// Extra or overriding variable definitions.
    pub definitions: Vec<VariableDefinition>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            service_name: "aiscot".to_string(),
            env_file: None,
            status_refresh_secs: 5,
            post_action_refresh_ms: 1000,
            log_lines: 100,
            auto_quote: true,
            preserve_comments: true,
            validate_shell: true,
            privilege_command: None,
            shell: "bash".to_string(),
            systemctl: "systemctl".to_string(),
            journalctl: "journalctl".to_string(),
            definitions: Vec::new(),
        }
    }
}

impl PanelConfig {
    /// Path of the environment file being edited.
    pub fn env_file_path(&self) -> Utf8PathBuf {
        self.env_file
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from(format!("/etc/default/{}", self.service_name)))
    }

    /// Unit name as systemd expects it.
    pub fn unit_name(&self) -> String {
        if self.service_name.ends_with(".service") {
            self.service_name.clone()
        } else {
            format!("{}.service", self.service_name)
        }
    }

    pub fn render_mode(&self) -> RenderMode {
        RenderMode::from_preserve_comments(self.preserve_comments)
    }

    pub fn status_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.status_refresh_secs.max(1))
    }

    pub fn post_action_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.post_action_refresh_ms)
    }
}
