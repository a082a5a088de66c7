//! Process-based command runner.
//!
//! Commands run synchronously through `std::process`. Streamed commands
//! inherit the terminal so terraform's own progress output stays visible;
//! captured commands collect stdout/stderr for parsing.

use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::config::CommandSpec;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Runner that spawns real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Echo streamed command lines at info level
    echo_commands: bool,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            echo_commands: true,
        }
    }

    /// Only log command lines at debug level.
    pub fn quiet(mut self) -> Self {
        self.echo_commands = false;
        self
    }

    fn build_command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.envs(&spec.env);
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }
        if spec.is_captured() {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        } else {
            cmd.stdin(Stdio::inherit());
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        }
        cmd
    }

    fn spawn_error(spec: &CommandSpec, err: std::io::Error) -> RunnerError {
        if err.kind() == ErrorKind::NotFound {
            RunnerError::ProgramNotFound(spec.program.clone())
        } else {
            RunnerError::SpawnFailed {
                program: spec.program.clone(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> RunnerResult<ExecutionResult> {
        if self.echo_commands && !spec.is_captured() {
            info!("$ {}", spec.display());
        } else {
            debug!("$ {}", spec.display());
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let mut cmd = Self::build_command(spec);

        let (exit_code, stdout, stderr) = if spec.is_captured() {
            let output = cmd.output().map_err(|e| Self::spawn_error(spec, e))?;
            (
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stdout).to_string(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            )
        } else {
            let status = cmd.status().map_err(|e| Self::spawn_error(spec, e))?;
            (status.code().unwrap_or(-1), String::new(), String::new())
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!("{} exited with {} after {}ms", spec.program, exit_code, duration_ms);

        Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        })
    }
}

/// Locate an executable on `PATH`, then in the given fallback locations.
pub fn find_program(name: &str, fallbacks: &[&str]) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            for file_name in executable_names(name) {
                let full = dir.join(&file_name);
                if full.is_file() {
                    return Some(full);
                }
            }
        }
    }

    fallbacks
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

fn executable_names(name: &str) -> Vec<String> {
    if cfg!(windows) && Path::new(name).extension().is_none() {
        vec![format!("{}.exe", name), format!("{}.cmd", name), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}
