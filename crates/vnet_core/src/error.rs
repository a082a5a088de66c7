//! Error types for the provisioning pipeline.

use std::path::PathBuf;

use thiserror::Error;

use vnet_iac::IacError;

/// Result type alias for pipeline operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors that can occur while resolving inputs or running stages.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("{variable} not found for {stage} (tried {sources})")]
    MissingValue {
        stage: String,
        variable: String,
        sources: String,
    },

    #[error("{label} not found. Set {env_var} before running the {stage} stage.")]
    MissingCredential {
        stage: String,
        label: String,
        env_var: String,
    },

    #[error("Subnet IDs not found for {label}: {keys}.")]
    MissingSubnet { label: String, keys: String },

    #[error("Invalid subnet mapping: {0}")]
    InvalidSubnetMap(String),

    #[error("No credential registered for {variable} in {stage}")]
    UnknownCredential { stage: String, variable: String },

    #[error("sqlcmd not found. Install Microsoft sqlcmd or re-run without --sql-init.")]
    SeedToolNotFound,

    #[error("SQL seed script not found: {}", .0.display())]
    SeedScriptNotFound(PathBuf),

    #[error("Command failed with exit code {exit_code}: {command}")]
    CommandFailed { command: String, exit_code: i32 },

    #[error("IaC error: {0}")]
    Iac(#[from] IacError),

    #[error("Runner error: {0}")]
    Runner(#[from] vnet_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Exit code of a failed external tool, if this error is one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProvisionError::CommandFailed { exit_code, .. } => Some(*exit_code),
            ProvisionError::Iac(e) => e.exit_code(),
            _ => None,
        }
    }

    /// Whether the error arose while resolving a stage's inputs, before
    /// anything was invoked.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            ProvisionError::MissingValue { .. }
                | ProvisionError::MissingCredential { .. }
                | ProvisionError::MissingSubnet { .. }
                | ProvisionError::InvalidSubnetMap(_)
                | ProvisionError::Iac(IacError::OutputNotFound { .. })
                | ProvisionError::Iac(IacError::TfvarsParse { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_from_tool_failures() {
        let direct = ProvisionError::CommandFailed {
            command: "sqlcmd".into(),
            exit_code: 4,
        };
        let nested = ProvisionError::Iac(IacError::CommandFailed {
            command: "terraform apply".into(),
            exit_code: 2,
        });
        let missing = ProvisionError::MissingSubnet {
            label: "NAT deploy".into(),
            keys: "db".into(),
        };

        assert_eq!(direct.exit_code(), Some(4));
        assert_eq!(nested.exit_code(), Some(2));
        assert_eq!(missing.exit_code(), None);
        assert!(missing.is_resolution());
        assert!(!nested.is_resolution());
    }
}
