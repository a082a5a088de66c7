//! Command runner trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::CommandSpec;
use crate::error::RunnerResult;

/// Result of a subprocess execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code from the process (-1 when terminated by a signal)
    pub exit_code: i32,
    /// Captured stdout (empty when output was inherited)
    pub stdout: String,
    /// Captured stderr (empty when output was inherited)
    pub stderr: String,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Execution end time
    pub finished_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stdout, or `None` when the process failed or printed nothing.
    pub fn stdout_if_success(&self) -> Option<String> {
        if !self.success() {
            return None;
        }
        let trimmed = self.stdout.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes external programs on behalf of the pipeline.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion.
    async fn run(&self, spec: &CommandSpec) -> RunnerResult<ExecutionResult>;
}
