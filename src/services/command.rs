use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

/// Errors from external collaborators (process spawn, exit status, I/O).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with code {code}: {message}")]
    NonZeroExit {
        command: String,
        code: i32,
        message: String,
    },

    #[error("Shell syntax error: {0}")]
    ShellSyntax(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Process error: {0}")]
    Io(#[from] std::io::Error),
}

/// A command line to hand to a [`CommandRunner`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,

    /// Start the child with an empty environment apart from `PATH`.
    pub env_clear: bool,
}

impl CommandRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn env_clear(mut self) -> Self {
        self.env_clear = true;
        self
    }

    /// Run the whole request under a prefix command such as `sudo`.
    pub fn prefixed(self, prefix: Option<&str>) -> Self {
        match prefix {
            Some(prefix) if !prefix.trim().is_empty() => {
                let mut args = vec![self.program];
                args.extend(self.args);
                Self {
                    program: prefix.trim().to_string(),
                    args,
                    ..self
                }
            }
            _ => self,
        }
    }

    /// Human-readable command line for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into [`ServiceError::NonZeroExit`].
    pub fn into_result(self, request: &CommandRequest) -> Result<Self, ServiceError> {
        if self.success() {
            return Ok(self);
        }

        let message = if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        };

        Err(ServiceError::NonZeroExit {
            command: request.display(),
            code: self.exit_code,
            message,
        })
    }
}

/// Runs external commands on behalf of the panel.
///
/// Production code uses [`SystemCommandRunner`]; tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output. A non-zero exit is not an error here.
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ServiceError>;

    /// Run and forward stdout and stderr as text chunks until the process
    /// exits, the receiver goes away, or `cancel` flips to `true`.
    ///
    /// Returns the exit code, or `None` if the process was stopped early.
    async fn stream(
        &self,
        request: &CommandRequest,
        sink: mpsc::Sender<String>,
        cancel: watch::Receiver<bool>,
    ) -> Result<Option<i32>, ServiceError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands run through [`CommandRunner::run`] after `limit`.
    pub fn with_timeout(limit: Duration) -> Self {
        Self {
            timeout: Some(limit),
        }
    }

    fn command(request: &CommandRequest) -> Command {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args).kill_on_drop(true);
        if request.env_clear {
            cmd.env_clear();
            if let Some(path) = std::env::var_os("PATH") {
                cmd.env("PATH", path);
            }
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ServiceError> {
        tracing::debug!("Executing: {}", request.display());

        let mut cmd = Self::command(request);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|source| ServiceError::Spawn {
            command: request.display(),
            source,
        })?;

        if let (Some(input), Some(mut stdin)) = (&request.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            // Dropping stdin closes the pipe so the child sees EOF
        }

        let output = match self.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    tracing::warn!("{} timed out after {:?}", request.display(), limit);
                    ServiceError::Timeout(limit)
                })??,
            None => child.wait_with_output().await?,
        };

        let exit_code = output.status.code().unwrap_or(-1);
        tracing::debug!("{} exited with code {}", request.display(), exit_code);

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn stream(
        &self,
        request: &CommandRequest,
        sink: mpsc::Sender<String>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Option<i32>, ServiceError> {
        tracing::debug!("Streaming: {}", request.display());

        let mut cmd = Self::command(request);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| ServiceError::Spawn {
            command: request.display(),
            source,
        })?;

        let missing_pipe = || std::io::Error::other("child output pipe not captured");
        let mut stdout = child.stdout.take().ok_or_else(missing_pipe)?;
        let mut stderr = child.stderr.take().ok_or_else(missing_pipe)?;

        let mut out_buf = [0u8; 4096];
        let mut err_buf = [0u8; 4096];
        let mut out_text = Utf8Decoder::default();
        let mut err_text = Utf8Decoder::default();
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            let chunk = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::debug!("Stopping stream: {}", request.display());
                        child.kill().await?;
                        return Ok(None);
                    }
                    continue;
                }
                read = stdout.read(&mut out_buf), if out_open => match read? {
                    0 => {
                        out_open = false;
                        out_text.finish()
                    }
                    n => out_text.push(&out_buf[..n]),
                },
                read = stderr.read(&mut err_buf), if err_open => match read? {
                    0 => {
                        err_open = false;
                        err_text.finish()
                    }
                    n => err_text.push(&err_buf[..n]),
                },
            };

            if chunk.is_empty() {
                continue;
            }

            if sink.send(chunk).await.is_err() {
                tracing::debug!("Stream receiver dropped: {}", request.display());
                child.kill().await?;
                return Ok(None);
            }
        }

        let status = child.wait().await?;
        Ok(status.code())
    }
}

/// Decodes a byte stream read in arbitrary pieces.
///
/// A multi-byte character split across two reads is held back until the rest
/// arrives. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::new();
        let mut input = self.pending.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    text.push_str(valid);
                    input = &[];
                    break;
                }
                Err(error) => {
                    let (valid, rest) = input.split_at(error.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match error.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // Incomplete sequence at the end; wait for more bytes
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - input.len();
        self.pending.drain(..consumed);
        text
    }

    /// Flush whatever is left once the stream ends.
    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_joins_split_characters() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "Grüße €".as_bytes();
        let split = bytes.len() - 2;

        assert_eq!(decoder.push(&bytes[..3]), "Gr");
        assert_eq!(decoder.push(&bytes[3..split]), "üße ");
        assert_eq!(decoder.push(&bytes[split..]), "€");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();

        assert_eq!(decoder.push(b"a\xffb\xe2\x82"), "a\u{FFFD}b");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_request_builder_and_display() {
        let request = CommandRequest::new("systemctl")
            .arg("start")
            .args(["aiscot.service"]);

        assert_eq!(request.display(), "systemctl start aiscot.service");
        assert!(request.stdin.is_none());
        assert!(!request.env_clear);
    }

    #[test]
    fn test_prefixed_request() {
        let request = CommandRequest::new("systemctl")
            .arg("restart")
            .prefixed(Some("sudo"));
        assert_eq!(request.program, "sudo");
        assert_eq!(request.args, vec!["systemctl", "restart"]);

        let unchanged = CommandRequest::new("systemctl").prefixed(Some("  "));
        assert_eq!(unchanged.program, "systemctl");
        assert_eq!(CommandRequest::new("x").prefixed(None).program, "x");
    }

    #[test]
    fn test_into_result_prefers_stderr() {
        let request = CommandRequest::new("false");
        let output = CommandOutput {
            exit_code: 1,
            stdout: "out".to_string(),
            stderr: "  boom \n".to_string(),
        };

        match output.into_result(&request) {
            Err(ServiceError::NonZeroExit { command, code, message }) => {
                assert_eq!(command, "false");
                assert_eq!(code, 1);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let ok = CommandOutput::default().into_result(&request).unwrap();
        assert!(ok.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemCommandRunner::new();
        let request = CommandRequest::new("sh").args(["-c", "cat; echo err >&2; exit 3"]).stdin("hello");

        let output = runner.run(&request).await.unwrap();
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_spawn_failure() {
        let runner = SystemCommandRunner::new();
        let request = CommandRequest::new("/nonexistent/envpanel-test-binary");

        assert!(matches!(
            runner.run(&request).await,
            Err(ServiceError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_timeout() {
        let runner = SystemCommandRunner::with_timeout(Duration::from_millis(50));
        let request = CommandRequest::new("sleep").arg("5");

        assert!(matches!(
            runner.run(&request).await,
            Err(ServiceError::Timeout(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_collects_chunks() {
        let runner = SystemCommandRunner::new();
        let (tx, mut rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let request = CommandRequest::new("sh").args(["-c", "echo one; echo two >&2"]);

        let code = runner.stream(&request, tx, cancel_rx).await.unwrap();
        assert_eq!(code, Some(0));

        let mut collected = String::new();
        while let Ok(chunk) = rx.try_recv() {
            collected.push_str(&chunk);
        }
        assert!(collected.contains("one"));
        assert!(collected.contains("two"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_cancel_kills_child() {
        let runner = SystemCommandRunner::new();
        let (tx, _rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let request = CommandRequest::new("sleep").arg("30");

        let handle = tokio::spawn(async move { runner.stream(&request, tx, cancel_rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("stream did not stop")
            .unwrap();
        assert_eq!(result.unwrap(), None);
    }
}
