//! Scripted recognition client for tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AsrClient, AsrError};

type Script = dyn Fn(&str, usize) -> Result<String, AsrError> + Send + Sync;

/// Answers each call by running a script on `(file_name, attempt)`, where
/// `attempt` counts previous calls for the same file name.
pub struct ScriptedAsr {
    script: Box<Script>,
    attempts: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<(String, usize)>>,
    delays: HashMap<usize, Duration>,
    file_delays: Vec<(String, Duration)>,
}

impl ScriptedAsr {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, usize) -> Result<String, AsrError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            attempts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delays: HashMap::new(),
            file_delays: Vec::new(),
        }
    }

    /// Always answer `text`.
    pub fn echo(text: &'static str) -> Self {
        Self::new(move |_, _| Ok(text.to_string()))
    }

    /// Sleep before answering the given attempt of any file.
    pub fn with_delay_on_attempt(mut self, attempt: usize, delay: Duration) -> Self {
        self.delays.insert(attempt, delay);
        self
    }

    /// Sleep before answering any call whose file name contains `needle`.
    pub fn with_delay_for(mut self, needle: &str, delay: Duration) -> Self {
        self.file_delays.push((needle.to_string(), delay));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// `(file_name, audio length)` of every call, in call order.
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().clone()
    }

    /// Calls whose file name contains `needle`.
    pub fn calls_for(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(f, _)| f.contains(needle))
            .count()
    }
}

#[async_trait]
impl AsrClient for ScriptedAsr {
    async fn transcribe(
        &self,
        audio: &[u8],
        file_name: &str,
        _language: Option<&str>,
    ) -> Result<String, AsrError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let counter = attempts.entry(file_name.to_string()).or_insert(0);
            let attempt = *counter;
            *counter += 1;
            attempt
        };
        self.calls.lock().push((file_name.to_string(), audio.len()));

        if let Some(delay) = self.delays.get(&attempt) {
            tokio::time::sleep(*delay).await;
        }
        if let Some((_, delay)) = self.file_delays.iter().find(|(n, _)| file_name.contains(n.as_str())) {
            tokio::time::sleep(*delay).await;
        }
        (self.script)(file_name, attempt)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
