// Editing session module
//
// An EditorSession owns one environment file's model together with the
// service it configures. Edits go through the session so every change is
// announced on a broadcast channel, the way the panel's views expect.

mod background;

use crate::envfile::{self, EnvFileError, FileModel, RenderMode, Renderer};
use crate::metrics::Metrics;
use crate::models::{Assignment, PanelConfig, QuoteStyle, ServiceAction, ServiceStatus, VariableDefinition, VariableRegistry};
use crate::services::{CommandRunner, ServiceController, ShellChecker};
use anyhow::{Context, Result};
use background::{BackgroundTask, StatusTracker, emit, spawn_log_follower};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{broadcast, mpsc};

/// Buffer size of the session event channel.
const EVENT_CAPACITY: usize = 100;

/// Buffer size of a log-follow channel, in chunks.
const LOG_CHANNEL_CAPACITY: usize = 256;

/// Notifications emitted by an [`EditorSession`].
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The environment file was read and parsed
    Loaded { path: Utf8PathBuf, variables: usize },

    /// The environment file did not exist; the starter template was loaded instead
    TemplateLoaded { path: Utf8PathBuf },

    /// A variable's value, enabled state or quoting changed
    VariableChanged { name: String },

    VariableAdded { name: String },

    VariableRemoved { name: String },

    /// The rendered file was written to disk
    Saved { path: Utf8PathBuf },

    ServiceActionCompleted { action: ServiceAction },

    ServiceActionFailed { action: ServiceAction, message: String },

    StatusUpdated(ServiceStatus),

    StatusFailed { message: String },

    LogFollowStopped,
}

/// Where the current model came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    File,
    Template,
}

/// One row of the editor: an assignment with its metadata and validity.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableView {
    pub assignment: Assignment,
    pub definition: VariableDefinition,

    /// Advisory only; invalid values still save.
    pub valid: bool,

    /// A known variable absent from the file, offered as a commented placeholder.
    pub suggested: bool,
}

impl VariableView {
    /// Registry hint for rows without a value.
    pub fn placeholder(&self) -> Option<String> {
        if self.assignment.value.is_empty() {
            self.definition.placeholder()
        } else {
            None
        }
    }

    /// A value the registry expects quoted is written bare.
    pub fn needs_quoting(&self) -> bool {
        self.definition.requires_quoting
            && !self.assignment.value.is_empty()
            && !self.assignment.quote_style.is_quoted()
    }
}

/// An editing session for one service's environment file.
///
/// Owns the [`FileModel`], the service collaborators, and two optional
/// background tasks: periodic status polling ([`start`](Self::start)) and a
/// journal follow ([`follow_logs`](Self::follow_logs)). Both stop on
/// [`stop`](Self::stop) or when the session is dropped.
///
/// # Example
/// ```ignore
/// let session = EditorSession::new(config, registry, Arc::new(SystemCommandRunner::new()));
/// session.load().await?;
/// session.set_value("PORT", "9090");
/// session.save_and_restart().await?;
/// ```
pub struct EditorSession {
    config: PanelConfig,
    registry: VariableRegistry,
    env_path: Utf8PathBuf,
    model: Arc<RwLock<FileModel>>,
    controller: ServiceController,
    shell: ShellChecker,
    status: StatusTracker,
    events: broadcast::Sender<SessionEvent>,
    metrics: Arc<Metrics>,
    poller: Mutex<Option<BackgroundTask>>,
    log_follower: Mutex<Option<BackgroundTask>>,
    pending_refresh: Mutex<Option<BackgroundTask>>,
}

impl EditorSession {
    pub fn new(config: PanelConfig, registry: VariableRegistry, runner: Arc<dyn CommandRunner>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let metrics = Arc::new(Metrics::new());
        let controller = ServiceController::new(runner.clone(), &config);
        let shell = ShellChecker::new(runner, config.shell.clone());
        let status = StatusTracker::new(controller.clone(), events.clone(), metrics.clone());

        Self {
            env_path: config.env_file_path(),
            config,
            registry,
            model: Arc::new(RwLock::new(FileModel::new())),
            controller,
            shell,
            status,
            events,
            metrics,
            poller: Mutex::new(None),
            log_follower: Mutex::new(None),
            pending_refresh: Mutex::new(None),
        }
    }

    fn read_model(&self) -> RwLockReadGuard<'_, FileModel> {
        self.model.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_model(&self) -> RwLockWriteGuard<'_, FileModel> {
        self.model.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(slot: &Mutex<Option<BackgroundTask>>) -> MutexGuard<'_, Option<BackgroundTask>> {
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        emit(&self.events, &self.metrics, event);
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn env_path(&self) -> &Utf8Path {
        &self.env_path
    }

    pub fn controller(&self) -> &ServiceController {
        &self.controller
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Clone of the current model.
    pub fn model(&self) -> FileModel {
        self.read_model().clone()
    }

    /// True when edits have not been saved yet.
    pub fn has_unsaved_changes(&self) -> bool {
        self.read_model().has_changes()
    }

    // ----- loading -----

    /// Read the environment file and rebuild the model from it.
    ///
    /// A missing file loads the starter template instead.
    pub async fn load(&self) -> Result<LoadOrigin> {
        match tokio::fs::read_to_string(&self.env_path).await {
            Ok(text) => {
                let variables = self.replace_model(&text);
                tracing::info!("Loaded {} ({} variables)", self.env_path, variables);
                self.emit(SessionEvent::Loaded {
                    path: self.env_path.clone(),
                    variables,
                });
                Ok(LoadOrigin::File)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("{} not found, loading template", self.env_path);
                self.replace_model(&envfile::generate_template(&self.config.service_name));
                self.emit(SessionEvent::TemplateLoaded {
                    path: self.env_path.clone(),
                });
                Ok(LoadOrigin::Template)
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read environment file: {}", self.env_path)),
        }
    }

    /// Rebuild the model from in-memory text.
    pub fn load_from_str(&self, text: &str) {
        let variables = self.replace_model(text);
        self.emit(SessionEvent::Loaded {
            path: self.env_path.clone(),
            variables,
        });
    }

    fn replace_model(&self, text: &str) -> usize {
        let model = FileModel::load(text);
        let variables = model.len();
        *self.write_model() = model;
        self.metrics.record_load();
        variables
    }

    // ----- edits -----

    /// Set a value, creating the variable if needed.
    pub fn set_value(&self, name: &str, value: &str) {
        self.write_model().set_value(name, value);
        self.emit(SessionEvent::VariableChanged {
            name: name.to_string(),
        });
    }

    /// Enable or disable a variable. Returns `false` if it does not exist.
    pub fn set_commented(&self, name: &str, commented: bool) -> bool {
        let found = self.write_model().set_commented(name, commented);
        if found {
            self.emit(SessionEvent::VariableChanged {
                name: name.to_string(),
            });
        }
        found
    }

    /// Flip a variable's enabled state. Returns the new `commented` flag.
    pub fn toggle_enabled(&self, name: &str) -> Option<bool> {
        let commented = self.write_model().toggle_commented(name);
        if commented.is_some() {
            self.emit(SessionEvent::VariableChanged {
                name: name.to_string(),
            });
        }
        commented
    }

    /// Returns `false` if the variable does not exist.
    pub fn set_quote_style(&self, name: &str, quote_style: QuoteStyle) -> bool {
        let found = self.write_model().set_quote_style(name, quote_style);
        if found {
            self.emit(SessionEvent::VariableChanged {
                name: name.to_string(),
            });
        }
        found
    }

    pub fn remove(&self, name: &str) -> Option<Assignment> {
        let removed = self.write_model().remove(name);
        if removed.is_some() {
            self.emit(SessionEvent::VariableRemoved {
                name: name.to_string(),
            });
        }
        removed
    }

    /// Add a variable the way the editor form does.
    ///
    /// The name is trimmed and upper-cased and the value trimmed. With
    /// auto-quote on, a value containing a space is double-quoted.
    /// Returns the normalized name.
    pub fn add_variable(&self, name: &str, value: &str) -> Result<String, EnvFileError> {
        let name = name.trim().to_uppercase();
        let value = value.trim();
        let quote_style = if self.config.auto_quote && value.contains(' ') {
            QuoteStyle::Double
        } else {
            QuoteStyle::None
        };

        self.write_model().add(&name, value, quote_style, false)?;
        tracing::info!("Added variable {}", name);
        self.emit(SessionEvent::VariableAdded { name: name.clone() });
        Ok(name)
    }

    // ----- views -----

    /// Every variable in the file, then known variables the file lacks.
    pub fn variables(&self) -> Vec<VariableView> {
        let model = self.read_model();

        let mut views: Vec<VariableView> = model
            .variables()
            .map(|assignment| VariableView {
                definition: self.registry.definition_or_custom(&assignment.name).into_owned(),
                valid: envfile::is_valid(&self.registry, &assignment.name, &assignment.value),
                assignment: assignment.clone(),
                suggested: false,
            })
            .collect();

        views.extend(
            self.registry
                .iter()
                .filter(|definition| !model.contains(&definition.name))
                .map(|definition| {
                    let mut assignment = Assignment::new(&definition.name, "").with_commented(true);
                    assignment.modified = false;
                    VariableView {
                        assignment,
                        definition: definition.clone(),
                        valid: true,
                        suggested: true,
                    }
                }),
        );

        views
    }

    /// Render with the configured mode and auto-quote setting.
    pub fn preview(&self) -> String {
        self.preview_with(self.config.render_mode(), self.config.auto_quote)
    }

    /// Render with explicit settings.
    ///
    /// Structured mode on a model with no skeleton falls back to fresh.
    pub fn preview_with(&self, mode: RenderMode, auto_quote: bool) -> String {
        let model = self.read_model();
        let mode = if model.structure().is_empty() {
            RenderMode::Fresh
        } else {
            mode
        };
        Renderer::new(&self.registry, &self.config.service_name).render(&model, mode, auto_quote)
    }

    // ----- shell checks -----

    /// Syntax-check the preview with `<shell> -n`.
    pub async fn check_syntax(&self) -> Result<()> {
        let content = self.preview();
        self.shell
            .check_syntax(&content)
            .await
            .context("Shell syntax check failed")
    }

    /// Source the preview and list the variables it exports.
    pub async fn test_environment(&self) -> Result<Vec<String>> {
        let content = self.preview();
        self.shell
            .test_environment(&content)
            .await
            .context("Failed to evaluate environment file")
    }

    // ----- persistence -----

    /// Render, optionally syntax-check, and write the file atomically.
    ///
    /// The model is rebuilt from the written text, so modification markers
    /// clear. A failed syntax check leaves the file untouched.
    pub async fn save(&self) -> Result<()> {
        let content = self.preview();

        if self.config.validate_shell {
            if let Err(e) = self.shell.check_syntax(&content).await {
                self.metrics.record_save_failure();
                return Err(e).context("Shell syntax check failed, file not saved");
            }
        }

        if let Err(e) = write_atomically(&self.env_path, &content).await {
            self.metrics.record_save_failure();
            return Err(e);
        }

        self.replace_model(&content);
        self.metrics.record_save();
        tracing::info!("Saved {}", self.env_path);
        self.emit(SessionEvent::Saved {
            path: self.env_path.clone(),
        });
        Ok(())
    }

    pub async fn save_and_restart(&self) -> Result<()> {
        self.save().await?;
        self.service_action(ServiceAction::Restart).await
    }

    pub async fn save_and_reload(&self) -> Result<()> {
        self.save().await?;
        self.service_action(ServiceAction::Reload).await
    }

    // ----- service control -----

    /// Run a lifecycle verb, then refresh status once it has had time to settle.
    pub async fn service_action(&self, action: ServiceAction) -> Result<()> {
        match self.controller.perform(action).await {
            Ok(()) => {
                self.metrics.record_service_action(true);
                self.emit(SessionEvent::ServiceActionCompleted { action });

                let refresh = self
                    .status
                    .spawn_delayed_refresh(self.config.post_action_refresh_delay());
                Self::slot(&self.pending_refresh).replace(refresh);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_service_action(false);
                self.emit(SessionEvent::ServiceActionFailed {
                    action,
                    message: e.to_string(),
                });
                Err(e).with_context(|| format!("Failed to {} {}", action, self.controller.unit()))
            }
        }
    }

    /// Query status now.
    pub async fn refresh_status(&self) -> Result<ServiceStatus> {
        self.status
            .refresh()
            .await
            .with_context(|| format!("Failed to get status of {}", self.controller.unit()))
    }

    /// Most recent status, if any refresh has succeeded.
    pub fn last_status(&self) -> Option<ServiceStatus> {
        self.status.latest()
    }

    /// Historical journal excerpt, `config.log_lines` entries unless given.
    pub async fn logs(&self, lines: Option<u32>) -> Result<String> {
        self.controller
            .logs(lines.unwrap_or(self.config.log_lines))
            .await
            .with_context(|| format!("Failed to read logs of {}", self.controller.unit()))
    }

    // ----- background tasks -----

    /// Start periodic status polling, replacing any running poller.
    pub fn start(&self) {
        let poller = self
            .status
            .spawn_poller(self.config.status_refresh_interval());
        if Self::slot(&self.poller).replace(poller).is_some() {
            tracing::debug!("Replaced running status poller");
        }
    }

    pub fn is_polling(&self) -> bool {
        Self::slot(&self.poller)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Follow the journal. Any previous follow is stopped first.
    ///
    /// The stream ends when [`stop_following_logs`](Self::stop_following_logs)
    /// is called, the receiver is dropped, or `journalctl` exits.
    pub fn follow_logs(&self) -> mpsc::Receiver<String> {
        let (task, rx) = spawn_log_follower(
            self.controller.clone(),
            self.events.clone(),
            self.metrics.clone(),
            LOG_CHANNEL_CAPACITY,
        );
        if Self::slot(&self.log_follower).replace(task).is_some() {
            tracing::debug!("Replaced running log follow");
        }
        rx
    }

    pub fn is_following_logs(&self) -> bool {
        Self::slot(&self.log_follower)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub async fn stop_following_logs(&self) {
        let task = Self::slot(&self.log_follower).take();
        if let Some(task) = task {
            task.shutdown().await;
        }
    }

    /// Stop all background work and log the session metrics.
    pub async fn stop(&self) {
        let tasks: Vec<BackgroundTask> = [&self.poller, &self.log_follower, &self.pending_refresh]
            .into_iter()
            .filter_map(|slot| Self::slot(slot).take())
            .collect();

        for task in tasks {
            task.shutdown().await;
        }

        tracing::info!("Session for {} stopped", self.controller.unit());
        self.metrics.log_summary();
    }
}

/// Replace `path` with `content` via a sibling temp file and a rename.
async fn write_atomically(path: &Utf8Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Invalid environment file path: {}", path))?;
    let temp_path = dir.join(format!(".{}.envpanel-tmp", file_name));

    let permissions = tokio::fs::metadata(path).await.ok().map(|m| m.permissions());

    let result = async {
        tokio::fs::write(&temp_path, content)
            .await
            .with_context(|| format!("Failed to write temporary file: {}", temp_path))?;
        if let Some(permissions) = permissions {
            tokio::fs::set_permissions(&temp_path, permissions)
                .await
                .with_context(|| format!("Failed to copy permissions to {}", temp_path))?;
        }
        tokio::fs::rename(&temp_path, path)
            .await
            .with_context(|| format!("Failed to replace environment file: {}", path))
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}
