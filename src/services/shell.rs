use crate::services::command::{CommandRequest, CommandRunner, ServiceError};
use std::sync::Arc;

/// Sources stdin with auto-export on, then prints what it exported.
const EXPORT_SCRIPT: &str =
    "set -a\nsource /dev/stdin\nset +a\nenv | grep -E '^[A-Z_][A-Z0-9_]*=' | sort";

/// Checks rendered environment files with the configured shell.
#[derive(Clone)]
pub struct ShellChecker {
    runner: Arc<dyn CommandRunner>,
    shell: String,
}

impl ShellChecker {
    pub fn new(runner: Arc<dyn CommandRunner>, shell: impl Into<String>) -> Self {
        Self {
            runner,
            shell: shell.into(),
        }
    }

    /// Parse `content` with `<shell> -n` without executing it.
    pub async fn check_syntax(&self, content: &str) -> Result<(), ServiceError> {
        let request = CommandRequest::new(&self.shell).arg("-n").stdin(content);
        let output = self.runner.run(&request).await?;

        if output.success() {
            tracing::debug!("Shell syntax check passed");
            Ok(())
        } else {
            let message = match output.stderr.trim() {
                "" => format!("{} -n exited with code {}", self.shell, output.exit_code),
                stderr => stderr.to_string(),
            };
            tracing::warn!("Shell syntax check failed: {}", message);
            Err(ServiceError::ShellSyntax(message))
        }
    }

    /// Source `content` in a clean shell and return the sorted `NAME=value`
    /// lines it exports.
    pub async fn test_environment(&self, content: &str) -> Result<Vec<String>, ServiceError> {
        let request = CommandRequest::new(&self.shell)
            .args(["-c", EXPORT_SCRIPT])
            .stdin(content)
            .env_clear();

        let output = self.runner.run(&request).await?.into_result(&request)?;
        Ok(output
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl std::fmt::Debug for ShellChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellChecker")
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}
