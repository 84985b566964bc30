use crate::models::{PanelConfig, STATUS_PROPERTIES, ServiceAction, ServiceStatus};
use crate::services::command::{CommandRequest, CommandRunner, ServiceError};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Placeholder shown when the journal has nothing for the unit.
pub const NO_LOGS_MESSAGE: &str = "No logs found";

/// Controls one systemd unit through `systemctl` and reads its journal.
#[derive(Clone)]
pub struct ServiceController {
    runner: Arc<dyn CommandRunner>,
    unit: String,
    systemctl: String,
    journalctl: String,
    privilege_command: Option<String>,
}

impl ServiceController {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &PanelConfig) -> Self {
        Self {
            runner,
            unit: config.unit_name(),
            systemctl: config.systemctl.clone(),
            journalctl: config.journalctl.clone(),
            privilege_command: config.privilege_command.clone(),
        }
    }

    /// Normalized unit name, always ending in `.service`.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    fn action_request(&self, action: ServiceAction) -> CommandRequest {
        CommandRequest::new(&self.systemctl)
            .args([action.verb(), self.unit.as_str()])
            .prefixed(self.privilege_command.as_deref())
    }

    fn logs_request(&self, lines: u32) -> CommandRequest {
        CommandRequest::new(&self.journalctl).args([
            "-u".to_string(),
            self.unit.clone(),
            "-n".to_string(),
            lines.to_string(),
            "--no-pager".to_string(),
        ])
    }

    fn follow_request(&self) -> CommandRequest {
        CommandRequest::new(&self.journalctl).args(["-u", self.unit.as_str(), "-f", "--no-pager"])
    }

    /// Run a lifecycle verb against the unit.
    pub async fn perform(&self, action: ServiceAction) -> Result<(), ServiceError> {
        let request = self.action_request(action);
        tracing::info!("Running service action: {}", request.display());

        self.runner.run(&request).await?.into_result(&request)?;

        tracing::info!("Service {} {} completed", self.unit, action);
        Ok(())
    }

    /// Query the unit's current state.
    pub async fn status(&self) -> Result<ServiceStatus, ServiceError> {
        let request = CommandRequest::new(&self.systemctl).args([
            "show".to_string(),
            self.unit.clone(),
            format!("--property={}", STATUS_PROPERTIES),
            "--timestamp=unix".to_string(),
        ]);

        let output = self.runner.run(&request).await?.into_result(&request)?;
        let status = ServiceStatus::from_show_output(&output.stdout);
        tracing::debug!("Status of {}: {}", self.unit, status.active_state);
        Ok(status)
    }

    /// The last `lines` journal entries for the unit.
    pub async fn logs(&self, lines: u32) -> Result<String, ServiceError> {
        let request = self.logs_request(lines);
        let output = self.runner.run(&request).await?.into_result(&request)?;

        if output.stdout.trim().is_empty() {
            Ok(NO_LOGS_MESSAGE.to_string())
        } else {
            Ok(output.stdout)
        }
    }

    /// Follow the journal, forwarding chunks to `sink` until cancelled.
    pub async fn follow_logs(
        &self,
        sink: mpsc::Sender<String>,
        cancel: watch::Receiver<bool>,
    ) -> Result<Option<i32>, ServiceError> {
        let request = self.follow_request();
        tracing::info!("Following logs: {}", request.display());
        self.runner.stream(&request, sink, cancel).await
    }
}

impl std::fmt::Debug for ServiceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceController")
            .field("unit", &self.unit)
            .field("systemctl", &self.systemctl)
            .field("journalctl", &self.journalctl)
            .field("privilege_command", &self.privilege_command)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::command::{CommandOutput, MockCommandRunner};

    fn controller(mock: MockCommandRunner, config: &PanelConfig) -> ServiceController {
        ServiceController::new(Arc::new(mock), config)
    }

    fn stdout(text: &str) -> CommandOutput {
        CommandOutput {
            exit_code: 0,
            stdout: text.to_string(),
            stderr: String::new(),
        }
    }

    #[tokio::test]
    async fn test_perform_builds_systemctl_command() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|request| {
                request.program == "systemctl" && request.args == ["restart", "aiscot.service"]
            })
            .times(1)
            .returning(|_| Ok(CommandOutput::default()));

        let service = controller(mock, &PanelConfig::default());
        service.perform(ServiceAction::Restart).await.unwrap();
    }

    #[tokio::test]
    async fn test_perform_with_privilege_prefix() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|request| {
                request.program == "sudo"
                    && request.args == ["systemctl", "stop", "nginx.service"]
            })
            .times(1)
            .returning(|_| Ok(CommandOutput::default()));

        let config = PanelConfig {
            service_name: "nginx.service".to_string(),
            privilege_command: Some("sudo".to_string()),
            ..PanelConfig::default()
        };
        controller(mock, &config)
            .perform(ServiceAction::Stop)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_perform_failure_carries_stderr() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run().returning(|_| {
            Ok(CommandOutput {
                exit_code: 4,
                stdout: String::new(),
                stderr: "Access denied\n".to_string(),
            })
        });

        let err = controller(mock, &PanelConfig::default())
            .perform(ServiceAction::Start)
            .await
            .unwrap_err();

        match err {
            ServiceError::NonZeroExit { code, message, .. } => {
                assert_eq!(code, 4);
                assert_eq!(message, "Access denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_queries_properties() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|request| {
                request.args[0] == "show"
                    && request.args[2].starts_with("--property=ActiveState,")
                    && request.args[3] == "--timestamp=unix"
            })
            .returning(|_| Ok(stdout("ActiveState=active\nMainPID=12\nUnitFileState=enabled\n")));

        let status = controller(mock, &PanelConfig::default())
            .status()
            .await
            .unwrap();

        assert!(status.is_active());
        assert_eq!(status.main_pid, Some(12));
        assert_eq!(status.load_state, "unknown");
    }

    #[tokio::test]
    async fn test_logs_placeholder_when_empty() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|request| {
                request.program == "journalctl"
                    && request.args == ["-u", "aiscot.service", "-n", "50", "--no-pager"]
            })
            .returning(|_| Ok(stdout("  \n")));

        let logs = controller(mock, &PanelConfig::default())
            .logs(50)
            .await
            .unwrap();
        assert_eq!(logs, NO_LOGS_MESSAGE);
    }

    #[tokio::test]
    async fn test_follow_logs_streams_journal() {
        let mut mock = MockCommandRunner::new();
        mock.expect_stream()
            .withf(|request, _, _| request.args == ["-u", "aiscot.service", "-f", "--no-pager"])
            .returning(|_, sink, _| {
                sink.try_send("line one\n".to_string()).unwrap();
                Ok(Some(0))
            });

        let (tx, mut rx) = mpsc::channel(4);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let code = controller(mock, &PanelConfig::default())
            .follow_logs(tx, cancel_rx)
            .await
            .unwrap();

        assert_eq!(code, Some(0));
        assert_eq!(rx.recv().await.as_deref(), Some("line one\n"));
    }
}
