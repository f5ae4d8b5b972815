//! Agent runtime backed by the `claude` command-line agent
//!
//! The agent runs in print mode with `--output-format stream-json`, so every
//! stdout line is one JSON message. The prompt is written to stdin.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::runtime::{AgentMessage, AgentRequest, AgentRuntime, EventStream};
use crate::{Error, Result};

/// Tools run without interactive confirmation
pub const PERMISSION_MODE: &str = "bypassPermissions";

/// Lines of stderr kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// How long stderr may keep draining after the agent has exited.
/// A background process left by a tool can hold the pipe open indefinitely.
const STDERR_GRACE: Duration = Duration::from_millis(200);

/// Runs the agent CLI as a child process per invocation
#[derive(Debug, Clone)]
pub struct ClaudeCliRuntime {
    command: String,
    args: Vec<String>,
    idle_timeout: Duration,
}

impl ClaudeCliRuntime {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            idle_timeout: AgentConfig::default().idle_timeout(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            idle_timeout: config.idle_timeout(),
        }
    }

    /// Arguments placed before the agent flags (e.g. a package runner's target)
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    fn build_command(&self, request: &AgentRequest) -> Command {
        let options = &request.options;
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg("--print")
            .args(["--output-format", "stream-json", "--verbose"])
            .args(["--permission-mode", PERMISSION_MODE])
            .arg("--system-prompt")
            .arg(options.system_prompt());

        if let Some(model) = &options.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(max_turns) = options.max_turns {
            cmd.arg("--max-turns").arg(max_turns.to_string());
        }
        if let Some(mcp_config) = options.mcp_config_json() {
            cmd.arg("--mcp-config").arg(mcp_config);
        }
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AgentRuntime for ClaudeCliRuntime {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn start(&self, request: AgentRequest) -> Result<EventStream> {
        let mut child = self.build_command(&request).spawn().map_err(|e| {
            Error::Runtime(format!("failed to start agent `{}`: {}", self.command, e))
        })?;

        info!(
            command = %self.command,
            pid = child.id().unwrap_or_default(),
            model = request.options.model.as_deref().unwrap_or("default"),
            "Agent process started"
        );

        if let Some(mut stdin) = child.stdin.take() {
            let written = async {
                stdin.write_all(request.prompt.as_bytes()).await?;
                stdin.shutdown().await
            }
            .await;
            // An agent that exits early is reported through its exit status
            if let Err(e) = written {
                debug!(error = %e, "Agent closed stdin before reading the prompt");
            }
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Runtime("agent stdout was not captured".to_string()))?;
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(line = %line, "agent stderr");
                    let mut tail = tail.lock().await;
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            })
        });

        let process = AgentProcess {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr,
            stderr_tail,
            idle_timeout: self.idle_timeout,
            finished: false,
        };

        let stream = futures::stream::unfold(process, |mut process| async move {
            let item = process.next_message().await?;
            Some((item, process))
        });
        Ok(stream.boxed())
    }
}

/// A running agent process. Dropping it kills the child.
struct AgentProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<()>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    idle_timeout: Duration,
    finished: bool,
}

impl AgentProcess {
    async fn next_message(&mut self) -> Option<Result<AgentMessage>> {
        if self.finished {
            return None;
        }

        loop {
            let line = match tokio::time::timeout(self.idle_timeout, self.lines.next_line()).await {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    self.finished = true;
                    return self.wait_for_exit().await.err().map(Err);
                }
                Ok(Err(e)) => {
                    self.finished = true;
                    return Some(Err(Error::Io(e)));
                }
                Err(_) => {
                    self.finished = true;
                    let _ = self.child.start_kill();
                    return Some(Err(Error::Runtime(format!(
                        "agent produced no output for {} seconds",
                        self.idle_timeout.as_secs()
                    ))));
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match AgentMessage::from_json_line(line) {
                Ok(message) => return Some(Ok(message)),
                Err(e) => warn!(error = %e, line = %line, "Skipping unparseable agent output"),
            }
        }
    }

    /// Reap the child once stdout is closed. Neither the exit nor the stderr
    /// drain may hold the run open past its limit.
    async fn wait_for_exit(&mut self) -> Result<()> {
        let status = match tokio::time::timeout(self.idle_timeout, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = self.child.start_kill();
                self.stop_stderr().await;
                return Err(Error::Runtime(format!(
                    "agent closed its output but did not exit within {} seconds",
                    self.idle_timeout.as_secs()
                )));
            }
        };
        self.stop_stderr().await;

        if status.success() {
            debug!("Agent process exited cleanly");
            return Ok(());
        }

        let detail = Vec::from(self.stderr_tail.lock().await.clone()).join("\n");
        let message = if detail.trim().is_empty() {
            format!("agent exited with {}", status)
        } else {
            format!("agent exited with {}: {}", status, detail.trim())
        };
        Err(Error::Runtime(message))
    }

    async fn stop_stderr(&mut self) {
        if let Some(mut handle) = self.stderr.take() {
            if tokio::time::timeout(STDERR_GRACE, &mut handle).await.is_err() {
                debug!("Agent stderr still open after exit, detaching reader");
                handle.abort();
            }
        }
    }
}
