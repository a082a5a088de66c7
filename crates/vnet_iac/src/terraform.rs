//! Terraform runner for stage directories.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use vnet_runner::{CommandRunner, CommandSpec, ExecutionResult};

use crate::error::{IacError, IacResult};

/// Workspace name terraform uses when none has been selected.
pub const DEFAULT_WORKSPACE: &str = "default";

/// Terraform runner that drives one stage directory at a time via `-chdir`.
#[derive(Clone)]
pub struct TerraformRunner {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    env: HashMap<String, String>,
}

impl TerraformRunner {
    /// Create a new Terraform runner.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "terraform".to_string(),
            env: HashMap::new(),
        }
    }

    /// Use a custom terraform executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Extra environment for every terraform invocation.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Underlying command runner.
    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    fn command(&self, working_dir: &Path, args: &[&str]) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .arg(format!("-chdir={}", working_dir.display()))
            .args(args.iter().copied())
            .envs(self.env.clone())
    }

    /// Run terraform init.
    pub async fn init(&self, working_dir: &Path) -> IacResult<()> {
        info!("Running terraform init in {:?}", working_dir);
        self.run_checked(self.command(working_dir, &["init"])).await
    }

    /// Run terraform apply without prompting.
    pub async fn apply(&self, working_dir: &Path) -> IacResult<()> {
        info!("Running terraform apply in {:?}", working_dir);
        self.run_checked(self.command(working_dir, &["apply", "-auto-approve"]))
            .await
    }

    /// Run terraform destroy without prompting.
    pub async fn destroy(&self, working_dir: &Path) -> IacResult<()> {
        info!("Running terraform destroy in {:?}", working_dir);
        self.run_checked(self.command(working_dir, &["destroy", "-auto-approve"]))
            .await
    }

    /// Initialize and apply a stage directory.
    pub async fn deploy_stack(&self, working_dir: &Path) -> IacResult<()> {
        ensure_dir(working_dir)?;
        self.init(working_dir).await?;
        self.apply(working_dir).await
    }

    /// Initialize and destroy a stage directory.
    pub async fn destroy_stack(&self, working_dir: &Path) -> IacResult<()> {
        ensure_dir(working_dir)?;
        self.init(working_dir).await?;
        self.destroy(working_dir).await
    }

    /// Raw JSON of `terraform output -json <name>`.
    ///
    /// Returns `None` when terraform exits non-zero or prints nothing.
    pub async fn output_json(&self, working_dir: &Path, name: &str) -> IacResult<Option<String>> {
        let spec = self.command(working_dir, &["output", "-json", name]).capture();
        let result = self.runner.run(&spec).await?;
        log_quiet_failure(&spec, &result);
        Ok(result.stdout_if_success())
    }

    /// Currently selected workspace, if terraform can report it.
    pub async fn workspace(&self, working_dir: &Path) -> IacResult<Option<String>> {
        let spec = self.command(working_dir, &["workspace", "show"]).capture();
        let result = self.runner.run(&spec).await?;
        log_quiet_failure(&spec, &result);
        Ok(result.stdout_if_success())
    }

    async fn run_checked(&self, spec: CommandSpec) -> IacResult<()> {
        let result = self.runner.run(&spec).await?;
        if result.success() {
            Ok(())
        } else {
            Err(IacError::CommandFailed {
                command: spec.display(),
                exit_code: result.exit_code,
            })
        }
    }
}

fn ensure_dir(working_dir: &Path) -> IacResult<()> {
    if working_dir.is_dir() {
        Ok(())
    } else {
        Err(IacError::StageDirMissing(working_dir.to_path_buf()))
    }
}

fn log_quiet_failure(spec: &CommandSpec, result: &ExecutionResult) {
    if !result.success() {
        debug!(
            "{} exited with {}: {}",
            spec.display(),
            result.exit_code,
            result.combined_output().trim()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vnet_runner::{MockResponse, MockRunner};

    fn stage_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[tokio::test]
    async fn test_deploy_stack_runs_init_then_apply() {
        let dir = stage_dir();
        let mock = MockRunner::new();
        let tf = TerraformRunner::new(Arc::new(mock.clone()));

        tf.deploy_stack(dir.path()).await.unwrap();

        let calls = mock.get_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[1], "init");
        assert_eq!(calls[1].args[1..], ["apply", "-auto-approve"]);
        assert_eq!(calls[0].args[0], format!("-chdir={}", dir.path().display()));
    }

    #[tokio::test]
    async fn test_destroy_stack_runs_destroy() {
        let dir = stage_dir();
        let mock = MockRunner::new();
        let tf = TerraformRunner::new(Arc::new(mock.clone())).with_binary("tofu");

        tf.destroy_stack(dir.path()).await.unwrap();

        assert!(mock.was_called("destroy -auto-approve"));
        assert!(mock.get_calls().iter().all(|c| c.program == "tofu"));
    }

    #[tokio::test]
    async fn test_failed_apply_reports_exit_code() {
        let dir = stage_dir();
        let mock = MockRunner::new().respond_to("apply", MockResponse::failure(3, "Error: quota"));
        let tf = TerraformRunner::new(Arc::new(mock.clone()));

        let err = tf.deploy_stack(dir.path()).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn test_failed_init_skips_apply() {
        let dir = stage_dir();
        let mock = MockRunner::new().respond_to("init", MockResponse::failure(1, "no provider"));
        let tf = TerraformRunner::new(Arc::new(mock.clone()));

        assert!(tf.deploy_stack(dir.path()).await.is_err());
        assert!(!mock.was_called("apply"));
    }

    #[tokio::test]
    async fn test_missing_stage_dir() {
        let dir = stage_dir();
        let mock = MockRunner::new();
        let tf = TerraformRunner::new(Arc::new(mock.clone()));

        let err = tf.deploy_stack(&dir.path().join("02_vnet")).await.unwrap_err();
        assert!(matches!(err, IacError::StageDirMissing(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_output_json_none_on_failure() {
        let dir = stage_dir();
        let mock = MockRunner::new()
            .respond_to("output -json present", MockResponse::success("\"value\"\n"))
            .respond_to("output -json absent", MockResponse::failure(1, "not found"));
        let tf = TerraformRunner::new(Arc::new(mock));

        assert_eq!(
            tf.output_json(dir.path(), "present").await.unwrap().as_deref(),
            Some("\"value\"")
        );
        assert_eq!(tf.output_json(dir.path(), "absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_env_passed_to_every_command() {
        let dir = stage_dir();
        let mock = MockRunner::new();
        let env = HashMap::from([("ARM_SUBSCRIPTION_ID".to_string(), "sub-1".to_string())]);
        let tf = TerraformRunner::new(Arc::new(mock.clone())).with_env(env);

        tf.deploy_stack(dir.path()).await.unwrap();
        assert!(mock
            .get_calls()
            .iter()
            .all(|c| c.env.get("ARM_SUBSCRIPTION_ID").map(String::as_str) == Some("sub-1")));
    }

    #[tokio::test]
    async fn test_workspace() {
        let dir = stage_dir();
        let mock = MockRunner::new().respond_to("workspace show", MockResponse::success("staging\n"));
        let tf = TerraformRunner::new(Arc::new(mock));

        assert_eq!(tf.workspace(dir.path()).await.unwrap().as_deref(), Some("staging"));
    }
}
