//! Scripted [`ToolRunner`] for unit tests.
//!
//! Invocations that name an output file get a file of a chosen size;
//! rules override the response per tool or per command-line substring.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::runner::{Invocation, Tool, ToolError, ToolOutput, ToolRunner};

type Sizer = Arc<dyn Fn(&Invocation) -> Option<u64> + Send + Sync>;

#[derive(Clone)]
enum Response {
    Streams { stdout: String, stderr: String },
    Exit(i32),
    Spawn,
    Hang,
}

#[derive(Clone)]
struct Rule {
    tool: Option<Tool>,
    needle: Option<String>,
    response: Response,
}

impl Rule {
    fn matches(&self, invocation: &Invocation) -> bool {
        if let Some(tool) = self.tool {
            if invocation.tool != tool {
                return false;
            }
        }
        match &self.needle {
            Some(needle) => invocation.command_line().contains(needle.as_str()),
            None => true,
        }
    }
}

pub struct FakeRunner {
    rules: Vec<Rule>,
    sizer: Option<Sizer>,
    default_output_bytes: u64,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            sizer: None,
            default_output_bytes: 1024,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn rule(mut self, tool: Option<Tool>, needle: Option<&str>, response: Response) -> Self {
        self.rules.push(Rule {
            tool,
            needle: needle.map(str::to_string),
            response,
        });
        self
    }

    /// Every `tool` call succeeds and prints `stdout`.
    pub fn with_stdout(self, tool: Tool, stdout: &str) -> Self {
        self.rule(
            Some(tool),
            None,
            Response::Streams {
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        )
    }

    /// Calls containing `needle` succeed and print `stderr`.
    pub fn with_stderr(self, needle: &str, stderr: &str) -> Self {
        self.rule(
            None,
            Some(needle),
            Response::Streams {
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        )
    }

    /// Calls containing `needle` print `stdout`.
    pub fn with_stdout_for(self, needle: &str, stdout: &str) -> Self {
        self.rule(
            None,
            Some(needle),
            Response::Streams {
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        )
    }

    /// Calls containing `needle` exit with status 1.
    pub fn failing(self, needle: &str) -> Self {
        self.rule(None, Some(needle), Response::Exit(1))
    }

    /// Every `tool` call fails to spawn.
    pub fn failing_tool(self, tool: Tool) -> Self {
        self.rule(Some(tool), None, Response::Spawn)
    }

    /// Calls containing `needle` block until cancelled.
    pub fn hanging(self, needle: &str) -> Self {
        self.rule(None, Some(needle), Response::Hang)
    }

    /// Choose output sizes per invocation; `None` falls back to the default.
    pub fn with_sizer<F>(mut self, sizer: F) -> Self
    where
        F: Fn(&Invocation) -> Option<u64> + Send + Sync + 'static,
    {
        self.sizer = Some(Arc::new(sizer));
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|inv| inv.command_line().contains(needle))
            .count()
    }

    async fn write_output(&self, invocation: &Invocation) {
        let Some(path) = invocation.output.as_deref() else {
            return;
        };
        let size = self
            .sizer
            .as_ref()
            .and_then(|sizer| sizer(invocation))
            .unwrap_or(self.default_output_bytes);
        let _ = tokio::fs::write(path, vec![0u8; size as usize]).await;
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        self.calls.lock().push(invocation.clone());
        let rule = self.rules.iter().find(|r| r.matches(invocation)).cloned();

        match rule.map(|r| r.response) {
            Some(Response::Spawn) => Err(ToolError::spawn(invocation.tool, "No such file or directory")),
            Some(Response::Hang) => {
                cancel.cancelled().await;
                Err(ToolError::Cancelled)
            }
            Some(Response::Exit(code)) => Ok(ToolOutput {
                exit_code: Some(code),
                stdout: String::new(),
                stderr: "Conversion failed!".to_string(),
            }),
            Some(Response::Streams { stdout, stderr }) => {
                self.write_output(invocation).await;
                Ok(ToolOutput {
                    exit_code: Some(0),
                    stdout,
                    stderr,
                })
            }
            None => {
                self.write_output(invocation).await;
                Ok(ToolOutput {
                    exit_code: Some(0),
                    ..Default::default()
                })
            }
        }
    }
}
