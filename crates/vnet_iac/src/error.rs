//! Error types for IaC module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur during IaC operations.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Missing Terraform dir: {}", .0.display())]
    StageDirMissing(PathBuf),

    #[error("Command failed with exit code {exit_code}: {command}")]
    CommandFailed { command: String, exit_code: i32 },

    #[error("Terraform output '{output}' not found in {}", .dir.display())]
    OutputNotFound { output: String, dir: PathBuf },

    #[error("Invalid tfvars at line {line}: {message}")]
    TfvarsParse { line: usize, message: String },

    #[error("Runner error: {0}")]
    Runner(#[from] vnet_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IacError {
    /// Exit code of the failed external command, if this is a tool failure.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            IacError::CommandFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
