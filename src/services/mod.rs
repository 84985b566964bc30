//! Services module - external collaborators of the environment editor.
//!
//! Everything that leaves the process goes through a [`CommandRunner`], so the
//! editor itself stays testable with a mock runner.
//!
//! # Components
//!
//! - [`CommandRunner`] / [`SystemCommandRunner`]: run a command to completion or
//!   stream its merged output, with cancellation
//! - [`ServiceController`]: `systemctl` lifecycle verbs and status, `journalctl`
//!   history and follow
//! - [`ShellChecker`]: `bash -n` syntax checks and an export preview of a
//!   rendered file
//!
//! # Usage Example
//!
//! ```ignore
//! use envpanel::services::{ServiceController, SystemCommandRunner};
//! use std::sync::Arc;
//!
//! let runner = Arc::new(SystemCommandRunner::new());
//! let controller = ServiceController::new(runner, &config);
//!
//! controller.perform(ServiceAction::Restart).await?;
//! let status = controller.status().await?;
//! ```

pub mod command;
pub mod shell;
pub mod systemd;

pub use command::{CommandOutput, CommandRequest, CommandRunner, ServiceError, SystemCommandRunner};
pub use shell::ShellChecker;
pub use systemd::{NO_LOGS_MESSAGE, ServiceController};
