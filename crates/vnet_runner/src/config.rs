//! Command configuration types.

use std::collections::HashMap;
use std::path::PathBuf;


/// Placeholder printed in place of redacted arguments.
pub const REDACTED: &str = "***";

/// How the child's stdout/stderr are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Child writes straight to the terminal.
    Inherit,
    /// Stdout and stderr are collected into the execution result.
    Capture,
}

/// A single subprocess invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program to execute (name on `PATH` or absolute path)
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Working directory for the child
    pub current_dir: Option<PathBuf>,
    /// Output handling
    pub output: OutputMode,
    /// Argument indices masked when the command line is displayed
    pub redacted: Vec<usize>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            current_dir: None,
            output: OutputMode::Inherit,
            redacted: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append an argument that must never appear in logs.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.redacted.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn capture(mut self) -> Self {
        self.output = OutputMode::Capture;
        self
    }

    /// Check whether output is collected rather than streamed.
    pub fn is_captured(&self) -> bool {
        self.output == OutputMode::Capture
    }

    /// Render the command line for logging, with secrets masked.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for (index, arg) in self.args.iter().enumerate() {
            line.push(' ');
            if self.redacted.contains(&index) {
                line.push_str(REDACTED);
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("terraform")
            .arg("-chdir=stage")
            .args(["apply", "-auto-approve"])
            .env("TF_IN_AUTOMATION", "1")
            .capture();

        assert_eq!(spec.args, vec!["-chdir=stage", "apply", "-auto-approve"]);
        assert_eq!(spec.env.get("TF_IN_AUTOMATION"), Some(&"1".to_string()));
        assert!(spec.is_captured());
    }

    #[test]
    fn test_display_masks_secret_args() {
        let spec = CommandSpec::new("sqlcmd")
            .args(["-U", "sqladmin", "-P"])
            .secret_arg("s3cr3t!")
            .args(["-i", "seed.sql"]);

        assert_eq!(spec.redacted, vec![3]);
        assert_eq!(spec.display(), "sqlcmd -U sqladmin -P *** -i seed.sql");
        assert_eq!(spec.args[3], "s3cr3t!");
    }
}
