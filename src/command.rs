use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;

use crate::error::{ServiceError, ServiceErrorKind};
use crate::provider::GenerationProvider;

/// Runs a local program per request: prompt on stdin, response on stdout.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandProvider {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    async fn exec(&self, prompt: &str) -> Result<String, ServiceError> {
        let unavailable = |detail: String| ServiceError::new(ServiceErrorKind::Unavailable, detail);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| unavailable(format!("spawn command {}: {err}", self.program)))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| unavailable("open command stdin".to_owned()))?;
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|err| unavailable(format!("write command stdin: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| unavailable(format!("wait command: {err}")))?;
        if !output.status.success() {
            return Err(unavailable(format!(
                "command failed: {} ({})",
                self.program, output.status
            )));
        }

        let stdout = String::from_utf8(output.stdout).map_err(|_| {
            ServiceError::new(
                ServiceErrorKind::MalformedResponse,
                "command stdout is not valid UTF-8",
            )
        })?;
        if stdout.trim().is_empty() {
            return Err(ServiceError::new(
                ServiceErrorKind::EmptyResponse,
                "command produced no output",
            ));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl GenerationProvider for CommandProvider {
    async fn generate_content(&self, prompt: &str) -> Result<String, ServiceError> {
        tracing::debug!(command = %self.program, "exec generation command");
        match tokio::time::timeout(self.timeout, self.exec(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::new(
                ServiceErrorKind::Timeout,
                format!("command timed out after {}s", self.timeout.as_secs()),
            )),
        }
    }
}
