//! Reply generation
//!
//! The ghost speaks through a local model driven as a child process: the
//! composed prompt goes in on stdin and the reply is whatever the process
//! prints on stdout.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Errors that can occur while generating a reply
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The model did not answer in time
    #[error("generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The model process failed
    #[error("model process failed: {0}")]
    Process(String),

    /// The model process could not be started or talked to
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for generation
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Trait for reply generators
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Get the model name
    fn model_name(&self) -> &str;

    /// Generate a reply for a fully composed prompt
    async fn generate(&self, prompt: &str) -> GenerationResult<String>;
}

/// Generator backed by `ollama run <model>`
pub struct OllamaGenerator {
    model: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl OllamaGenerator {
    /// Create a generator for an Ollama model
    pub fn new(model: &str, timeout: Duration) -> Self {
        info!("Using Ollama model {} with {}s timeout", model, timeout.as_secs());
        Self {
            model: model.to_string(),
            program: "ollama".to_string(),
            args: vec!["run".to_string(), model.to_string()],
            timeout,
        }
    }

    /// Builder: run a different command with the same stdin/stdout contract
    pub fn command(mut self, program: &str, args: &[&str]) -> Self {
        self.program = program.to_string();
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GenerationError::Process("stdin was not captured".to_string()))?;

        // Written from a separate task so a chatty child cannot block on a
        // full stdout pipe while we are still feeding it.
        let input = prompt.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        debug!("Sent prompt of {} bytes to {}", prompt.len(), self.program);

        // Dropping the child on timeout kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                writer.abort();
                warn!(
                    "{} gave no reply within {}s, killed",
                    self.model,
                    self.timeout.as_secs()
                );
                return Err(GenerationError::Timeout(self.timeout));
            }
        };

        match writer.await {
            Ok(Err(e)) if e.kind() != ErrorKind::BrokenPipe => return Err(e.into()),
            Ok(Err(_)) => debug!("{} closed stdin early", self.program),
            Err(e) => debug!("Prompt writer did not finish: {}", e),
            Ok(Ok(())) => {}
        }

        let reply = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if !output.status.success() && reply.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerationError::Process(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        debug!("Received reply of {} bytes", reply.len());
        Ok(reply)
    }
}

/// Mock generator for testing
///
/// Answers with a fixed string derived from the user input found in the
/// prompt, and remembers the last prompt it saw.
pub struct MockGenerator {
    model: String,
    fail: bool,
    last_prompt: Mutex<Option<String>>,
}

impl MockGenerator {
    /// Create a new mock generator
    pub fn new() -> Self {
        Self {
            model: "mock-generator".to_string(),
            fail: false,
            last_prompt: Mutex::new(None),
        }
    }

    /// A generator whose every call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// The most recent prompt passed to `generate`
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for MockGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> GenerationResult<String> {
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }

        if self.fail {
            return Err(GenerationError::Process("mock generator is down".to_string()));
        }

        let input = prompt
            .rsplit_once("PROMPT:\n")
            .map(|(_, rest)| rest.trim_end_matches("Ghost:").trim())
            .unwrap_or(prompt.trim());

        Ok(format!("echoes of {}", input))
    }
}
