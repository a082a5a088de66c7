//! Stage driver: runs the pipeline forward for deploy and backward for
//! destroy.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use vnet_iac::{IacError, OutputResolver, TerraformRunner};
use vnet_runner::CommandRunner;

use crate::env::Environment;
use crate::error::{ProvisionError, ProvisionResult};
use crate::identity::AzIdentity;
use crate::resolver::Resolver;
use crate::seed::{run_sql_seed, SqlLogin};
use crate::stage::{ProjectLayout, Stage};
use crate::variables::{Mode, StageVars, VariableBuilder};

/// Options for a deploy run.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Run the SQL seed script after the SQL stage applies.
    pub sql_init: bool,
}

/// What happened to a stage during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Applied,
    Destroyed,
    /// Destroy skipped because the stage has no state.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    /// Credentials generated for this stage
    pub generated: Vec<&'static str>,
    /// Whether the stage's tfvars were rewritten before running
    pub rendered: bool,
}

/// Summary of a deploy or destroy run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: &'static str,
    pub stages: Vec<StageOutcome>,
    pub seeded: bool,
    pub public_url: Option<String>,
}

impl RunReport {
    fn new(mode: Mode) -> Self {
        Self {
            mode: match mode {
                Mode::Deploy => "deploy",
                Mode::Destroy => "destroy",
            },
            stages: Vec::new(),
            seeded: false,
            public_url: None,
        }
    }

    /// Stages that ran terraform.
    pub fn executed(&self) -> impl Iterator<Item = Stage> + '_ {
        self.stages
            .iter()
            .filter(|o| o.status != StageStatus::Skipped)
            .map(|o| o.stage)
    }

    pub fn skipped(&self) -> impl Iterator<Item = Stage> + '_ {
        self.stages
            .iter()
            .filter(|o| o.status == StageStatus::Skipped)
            .map(|o| o.stage)
    }
}

/// Drives terraform across the stage pipeline.
pub struct Provisioner {
    runner: Arc<dyn CommandRunner>,
    outputs: OutputResolver,
    identity: AzIdentity,
    env: Environment,
    layout: ProjectLayout,
}

impl Provisioner {
    /// Create a provisioner. Variables loaded from `.env` are forwarded to
    /// every tool invocation.
    pub fn new(runner: Arc<dyn CommandRunner>, layout: ProjectLayout, env: Environment) -> Self {
        let exports = env.file_exports();
        let terraform = TerraformRunner::new(Arc::clone(&runner)).with_env(exports.clone());
        Self {
            outputs: OutputResolver::new(terraform),
            identity: AzIdentity::new(Arc::clone(&runner)).with_env(exports),
            runner,
            env,
            layout,
        }
    }

    /// Use a different terraform executable.
    pub fn with_terraform_binary(mut self, binary: impl Into<String>) -> Self {
        let terraform = self.outputs.terraform().clone().with_binary(binary);
        self.outputs = OutputResolver::new(terraform);
        self
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Environment the stage variables are resolved from.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn terraform(&self) -> &TerraformRunner {
        self.outputs.terraform()
    }

    /// Deploy one stage, or every stage in dependency order.
    pub async fn deploy(&self, only: Option<Stage>, options: &DeployOptions) -> ProvisionResult<RunReport> {
        let stages: Vec<Stage> = match only {
            Some(stage) => vec![stage],
            None => Stage::deploy_order().collect(),
        };
        let mut report = RunReport::new(Mode::Deploy);

        for (i, stage) in stages.iter().enumerate() {
            info!("Deploying stage [{}/{}]: {} ({})", i + 1, stages.len(), stage, stage.label());
            let outcome = self.deploy_stage(*stage, options, &mut report).await?;
            report.stages.push(outcome);
            info!("Stage {} deployed", stage);
        }

        Ok(report)
    }

    async fn deploy_stage(
        &self,
        stage: Stage,
        options: &DeployOptions,
        report: &mut RunReport,
    ) -> ProvisionResult<StageOutcome> {
        let dir = self.stage_dir_checked(stage)?;
        let built = self.build_vars(stage, Mode::Deploy).await?;
        self.write_vars(&built)?;

        self.terraform().deploy_stack(&dir).await?;

        if stage == Stage::Sql && options.sql_init {
            let credentials = SqlLogin {
                login: built.vars.get_str("sql_admin_login").unwrap_or_default().to_string(),
                password: built.vars.get_str("sql_admin_password").unwrap_or_default().to_string(),
            };
            run_sql_seed(self.runner.as_ref(), &self.outputs, &self.layout, &self.env, &credentials).await?;
            report.seeded = true;
        }

        if stage == Stage::Compute {
            let lb_dir = self.layout.stage_dir(Stage::LoadBalancer);
            report.public_url = self.outputs.output_string(&lb_dir, "public_url").await?;
            if let Some(url) = &report.public_url {
                info!("Public URL: {}", url);
            }
        }

        Ok(StageOutcome {
            stage,
            status: StageStatus::Applied,
            generated: built.generated,
            rendered: true,
        })
    }

    /// Destroy one stage, or every stage with state in reverse order.
    ///
    /// A single stage is destroyed unconditionally and its inputs must
    /// resolve. The full pipeline skips stages without state and falls back
    /// to the existing tfvars when upstream outputs are already gone.
    pub async fn destroy(&self, only: Option<Stage>) -> ProvisionResult<RunReport> {
        let mut report = RunReport::new(Mode::Destroy);

        if let Some(stage) = only {
            let dir = self.stage_dir_checked(stage)?;
            let rendered = if stage == Stage::ResourceGroup {
                false
            } else {
                let built = self.build_vars(stage, Mode::Destroy).await?;
                self.write_vars(&built)?;
                true
            };
            self.terraform().destroy_stack(&dir).await?;
            report.stages.push(StageOutcome {
                stage,
                status: StageStatus::Destroyed,
                generated: Vec::new(),
                rendered,
            });
            return Ok(report);
        }

        for stage in Stage::destroy_order() {
            let dir = self.layout.stage_dir(stage);
            if !dir.is_dir() || !self.outputs.has_state(&dir).await? {
                info!("Skipping {}: no state", stage);
                report.stages.push(StageOutcome {
                    stage,
                    status: StageStatus::Skipped,
                    generated: Vec::new(),
                    rendered: false,
                });
                continue;
            }

            info!("Destroying stage {} ({})", stage, stage.label());
            let rendered = stage != Stage::ResourceGroup && self.rerender_for_destroy(stage).await?;
            self.terraform().destroy_stack(&dir).await?;
            report.stages.push(StageOutcome {
                stage,
                status: StageStatus::Destroyed,
                generated: Vec::new(),
                rendered,
            });
        }

        Ok(report)
    }

    async fn rerender_for_destroy(&self, stage: Stage) -> ProvisionResult<bool> {
        match self.build_vars(stage, Mode::Destroy).await {
            Ok(built) => {
                self.write_vars(&built)?;
                Ok(true)
            }
            Err(e) if e.is_resolution() => {
                warn!(
                    "Could not resolve inputs for {} ({}); destroying with existing tfvars",
                    stage, e
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn stage_dir_checked(&self, stage: Stage) -> ProvisionResult<std::path::PathBuf> {
        let dir = self.layout.stage_dir(stage);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ProvisionError::Iac(IacError::StageDirMissing(dir)))
        }
    }

    async fn build_vars(&self, stage: Stage, mode: Mode) -> ProvisionResult<StageVars> {
        let resolver = Resolver::new(&self.env, &self.layout, &self.outputs);
        VariableBuilder::new(&resolver, &self.identity, mode)
            .build(stage)
            .await
    }

    fn write_vars(&self, built: &StageVars) -> ProvisionResult<()> {
        let path = self.layout.tfvars_path(built.stage);
        built.vars.write(&path)?;
        debug!("Wrote {} variables for {}", built.vars.len(), built.stage);
        for label in &built.generated {
            info!("Generated {} and stored it in {}", label, relative(&path, self.layout.root()));
        }
        Ok(())
    }
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
