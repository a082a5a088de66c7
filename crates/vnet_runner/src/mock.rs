//! Mock command runner for testing.
//!
//! Provides a configurable mock implementation of the CommandRunner trait
//! for use in unit tests without requiring terraform, az or sqlcmd.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::CommandSpec;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Predefined mock response for a command execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// Unredacted command line, used for rule matching
    pub command_line: String,
    /// Command line as it would be logged
    pub display: String,
}

/// Mock command runner for testing.
///
/// Responses are chosen by the first rule whose pattern is a substring of
/// the full command line (`program arg1 arg2 ...`). Commands matching no
/// rule get the fallback response, which defaults to an empty success.
#[derive(Clone)]
pub struct MockRunner {
    /// Ordered (pattern, response) rules.
    rules: Arc<RwLock<Vec<(String, MockResponse)>>>,
    /// Response for commands matching no rule.
    fallback: Arc<RwLock<MockResponse>>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Simulated launch failure.
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RwLock::new(Vec::new())),
            fallback: Arc::new(RwLock::new(MockResponse::success(""))),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Respond to any command line containing `pattern`.
    pub fn respond_to(self, pattern: impl Into<String>, response: MockResponse) -> Self {
        self.rules.write().push((pattern.into(), response));
        self
    }

    /// Set the response for unmatched commands.
    pub fn with_fallback(self, response: MockResponse) -> Self {
        *self.fallback.write() = response;
        self
    }

    /// Fail every launch with the given message.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Get calls whose command line contains `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.command_line.contains(pattern))
            .cloned()
            .collect()
    }

    /// Check if any command line contains `pattern`.
    pub fn was_called(&self, pattern: &str) -> bool {
        self.captured_calls
            .read()
            .iter()
            .any(|c| c.command_line.contains(pattern))
    }

    fn record_call(&self, spec: &CommandSpec) -> String {
        let mut command_line = spec.program.clone();
        for arg in &spec.args {
            command_line.push(' ');
            command_line.push_str(arg);
        }
        self.captured_calls.write().push(CapturedCall {
            program: spec.program.clone(),
            args: spec.args.clone(),
            current_dir: spec.current_dir.clone(),
            env: spec.env.clone(),
            command_line: command_line.clone(),
            display: spec.display(),
        });
        command_line
    }

    fn response_for(&self, command_line: &str) -> MockResponse {
        self.rules
            .read()
            .iter()
            .find(|(pattern, _)| command_line.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.fallback.read().clone())
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> RunnerResult<ExecutionResult> {
        let command_line = self.record_call(spec);

        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }

        let response = self.response_for(&command_line);
        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ExecutionResult {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_basic() {
        let runner = MockRunner::new()
            .respond_to("output -json resource_group_name", MockResponse::success("\"rg-demo\""));

        let spec = CommandSpec::new("terraform")
            .args(["-chdir=01_resource_group", "output", "-json", "resource_group_name"]);

        let result = runner.run(&spec).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "\"rg-demo\"");
    }

    #[tokio::test]
    async fn test_mock_runner_captures_calls() {
        let runner = MockRunner::new();

        let spec = CommandSpec::new("sqlcmd")
            .args(["-U", "sqladmin", "-P"])
            .secret_arg("hunter2")
            .current_dir("/tmp");

        let _ = runner.run(&spec).await;

        let calls = runner.calls_matching("sqlcmd");
        assert_eq!(calls.len(), 1);

        let call = &calls[0];
        assert_eq!(call.args, vec!["-U", "sqladmin", "-P", "hunter2"]);
        assert_eq!(call.display, "sqlcmd -U sqladmin -P ***");
        assert_eq!(call.current_dir, Some(PathBuf::from("/tmp")));
    }

    #[tokio::test]
    async fn test_mock_runner_first_matching_rule_wins() {
        let runner = MockRunner::new()
            .respond_to("apply", MockResponse::failure(2, "boom"))
            .respond_to("terraform", MockResponse::success("generic"))
            .with_fallback(MockResponse::failure(9, "unmatched"));

        let apply = CommandSpec::new("terraform").arg("apply");
        let init = CommandSpec::new("terraform").arg("init");
        let other = CommandSpec::new("az").arg("account");

        assert_eq!(runner.run(&apply).await.unwrap().exit_code, 2);
        assert_eq!(runner.run(&init).await.unwrap().stdout, "generic");
        assert_eq!(runner.run(&other).await.unwrap().exit_code, 9);
        assert_eq!(runner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_runner_failure_simulation() {
        let runner = MockRunner::new().simulate_failure("simulated error");

        let result = runner.run(&CommandSpec::new("terraform")).await;
        assert!(result.is_err());
        assert!(runner.was_called("terraform"));
    }
}
