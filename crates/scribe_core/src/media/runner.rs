//! External tool execution.
//!
//! Every ffmpeg / ffprobe call goes through a [`ToolRunner`] so that the
//! pipeline can be driven by a fake in tests. The real runner spawns the
//! process with `kill_on_drop`, bounds it with a timeout and races it
//! against the request's cancellation token.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::ToolSettings;
use crate::logging::RequestLogger;

/// Which external program an invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }
}

/// A fully built command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub tool: Tool,
    pub args: Vec<String>,
    /// File the command is expected to write, if any.
    ///
    /// `None` for measure-only runs whose result is in the output streams.
    pub output: Option<PathBuf>,
}

impl Invocation {
    pub fn new(tool: Tool, args: Vec<String>, output: Option<PathBuf>) -> Self {
        Self { tool, args, output }
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.tool.name().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code (`None` when killed by a signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Errors from running an external tool.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to start {tool}: {message}")]
    Spawn { tool: String, message: String },

    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    #[error("{tool} timed out after {secs}s")]
    TimedOut { tool: String, secs: u64 },

    #[error("{tool} produced no output at {}", path.display())]
    OutputMissing { tool: String, path: PathBuf },

    #[error("Cancelled")]
    Cancelled,
}

impl ToolError {
    pub fn spawn(tool: Tool, message: impl Into<String>) -> Self {
        Self::Spawn {
            tool: tool.name().to_string(),
            message: message.into(),
        }
    }

    pub fn command_failed(tool: Tool, exit_code: i32, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            tool: tool.name().to_string(),
            exit_code,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolError::Cancelled)
    }
}

/// Runs external tools.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion.
    ///
    /// A non-zero exit is not an error here; callers decide how to treat
    /// it. Errors are reserved for spawn failures, timeouts and
    /// cancellation.
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError>;
}

/// Cancellation token and request logger shared by every stage of one
/// request.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub cancel: &'a CancellationToken,
    pub logger: &'a RequestLogger,
}

impl<'a> StageContext<'a> {
    pub fn new(cancel: &'a CancellationToken, logger: &'a RequestLogger) -> Self {
        Self { cancel, logger }
    }
}

/// Real runner backed by `tokio::process`.
pub struct FfmpegRunner {
    ffmpeg: String,
    ffprobe: String,
    timeout: Duration,
}

impl FfmpegRunner {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &ToolSettings) -> Self {
        Self::new(&settings.ffmpeg_path, &settings.ffprobe_path, settings.timeout())
    }

    fn program(&self, tool: Tool) -> &str {
        match tool {
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Ffprobe => &self.ffprobe,
        }
    }
}

#[async_trait]
impl ToolRunner for FfmpegRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let tool = invocation.tool;
        let mut cmd = Command::new(self.program(tool));
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Running {}", invocation.command_line());

        let child = cmd.spawn().map_err(|e| ToolError::spawn(tool, e.to_string()))?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::Cancelled),
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => match result {
                Err(_) => {
                    return Err(ToolError::TimedOut {
                        tool: tool.name().to_string(),
                        secs: self.timeout.as_secs(),
                    })
                }
                Ok(Err(e)) => return Err(ToolError::spawn(tool, e.to_string())),
                Ok(Ok(output)) => output,
            },
        };

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run an invocation and require a zero exit status.
///
/// The command line goes to the request log; on failure the tail of the
/// tool's stderr is kept for diagnosis.
pub async fn run_checked(
    runner: &dyn ToolRunner,
    invocation: &Invocation,
    ctx: StageContext<'_>,
) -> Result<ToolOutput, ToolError> {
    ctx.logger.command(&invocation.command_line());
    let output = runner.run(invocation, ctx.cancel).await?;
    if output.success() {
        return Ok(output);
    }

    ctx.logger.output_tail(&output.stderr);
    Err(ToolError::command_failed(
        invocation.tool,
        output.exit_code.unwrap_or(-1),
        last_line(&output.stderr),
    ))
}

/// Run an invocation that writes a file and return the file's size.
///
/// A missing or empty output counts as failure.
pub async fn run_to_file(
    runner: &dyn ToolRunner,
    invocation: &Invocation,
    ctx: StageContext<'_>,
) -> Result<u64, ToolError> {
    run_checked(runner, invocation, ctx).await?;

    let Some(path) = invocation.output.as_deref() else {
        return Ok(0);
    };
    match file_size(path).await {
        Some(size) if size > 0 => Ok(size),
        _ => Err(ToolError::OutputMissing {
            tool: invocation.tool.name().to_string(),
            path: path.to_path_buf(),
        }),
    }
}

/// Size of a file, or `None` if it cannot be read.
pub async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no diagnostic output")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_quotes_spaced_args() {
        let inv = Invocation::new(
            Tool::Ffmpeg,
            vec!["-i".into(), "my file.mp4".into(), "out.wav".into()],
            Some(PathBuf::from("out.wav")),
        );
        assert_eq!(inv.command_line(), "ffmpeg -i \"my file.mp4\" out.wav");
    }

    #[test]
    fn last_line_skips_blank_lines() {
        assert_eq!(last_line("a\nInvalid data found\n\n"), "Invalid data found");
        assert_eq!(last_line(""), "no diagnostic output");
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let runner = FfmpegRunner::new(
            "/nonexistent/ffmpeg-binary",
            "/nonexistent/ffprobe-binary",
            Duration::from_secs(5),
        );
        let inv = Invocation::new(Tool::Ffmpeg, vec!["-version".into()], None);
        let err = runner.run(&inv, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }
}
