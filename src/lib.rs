// envpanel - Control panel for a systemd service's environment file
//
// This is the library crate containing the environment file model, the
// service collaborators and the editing session. The binary crate (main.rs)
// provides the command-line entry point.

pub mod config;
pub mod envfile;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod session;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use envfile::{FileModel, RenderMode, Renderer};
pub use models::{Assignment, PanelConfig, QuoteStyle, ServiceAction, ServiceStatus, VariableRegistry};
pub use session::{EditorSession, SessionEvent, VariableView};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
