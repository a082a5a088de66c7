//! CLI command definitions.
//!
//! `deploy` and `destroy` share the same stage selection flags; without a
//! flag the whole pipeline runs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use vnet_core::{Environment, ProjectLayout, Provisioner, Stage};
use vnet_runner::ProcessRunner;

pub mod deploy;
pub mod destroy;

/// vnetstack - staged Terraform provisioning for a multi-tier Azure network
#[derive(Parser)]
#[command(name = "vnet")]
#[command(version, about = "Staged Terraform provisioning for a multi-tier Azure network")]
#[command(long_about = r#"
Deploys and destroys the VNets & Subnets stacks under <root>/terraform/,
threading each stage's outputs into the next stage's terraform.tfvars.

STAGES (deploy order):
  rg       → 01_resource_group
  vnet     → 02_vnet
  subnets  → 03_subnets
  nsg      → 04_nsg
  sql      → 05_private_sql
  nat      → 06_nat_gateway
  app      → 07_app_tier
  lb       → 08_load_balancer
  compute  → 09_compute_web

Variables are read from the environment and from <root>/.env.

EXIT CODES:
  0 - Success
  1 - Error before any tool ran (missing output, credential or subnet)
  n - Exit code of the failing terraform or sqlcmd invocation
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root containing terraform/ and sql_scripts/
    #[arg(long, global = true, env = "VNET_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Terraform executable
    #[arg(long, global = true, env = "TERRAFORM_BIN", default_value = "terraform")]
    pub terraform: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy the stacks in dependency order
    Deploy(deploy::DeployArgs),

    /// Destroy deployed stacks in reverse order
    Destroy(destroy::DestroyArgs),
}

/// Mutually exclusive single-stage selection.
#[derive(Args, Debug, Default)]
#[group(id = "stage", multiple = false)]
pub struct StageFlags {
    /// Only the resource group stack
    #[arg(long)]
    pub rg_only: bool,

    /// Only the virtual network stack
    #[arg(long)]
    pub vnet_only: bool,

    /// Only the subnet stack
    #[arg(long)]
    pub subnets_only: bool,

    /// Only the network security groups stack
    #[arg(long)]
    pub nsg_only: bool,

    /// Only the SQL + private endpoint stack
    #[arg(long)]
    pub sql_only: bool,

    /// Only the NAT gateway stack
    #[arg(long)]
    pub nat_only: bool,

    /// Only the app tier stack
    #[arg(long)]
    pub app_only: bool,

    /// Only the load balancer stack
    #[arg(long)]
    pub lb_only: bool,

    /// Only the web compute stack
    #[arg(long)]
    pub compute_only: bool,
}

impl StageFlags {
    /// The selected stage, or `None` for the full pipeline.
    pub fn selected(&self) -> Option<Stage> {
        [
            (self.rg_only, Stage::ResourceGroup),
            (self.vnet_only, Stage::Vnet),
            (self.subnets_only, Stage::Subnets),
            (self.nsg_only, Stage::Nsg),
            (self.sql_only, Stage::Sql),
            (self.nat_only, Stage::Nat),
            (self.app_only, Stage::App),
            (self.lb_only, Stage::LoadBalancer),
            (self.compute_only, Stage::Compute),
        ]
        .into_iter()
        .find_map(|(set, stage)| set.then_some(stage))
    }
}

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalOpts {
    pub root: PathBuf,
    pub terraform: String,
    pub quiet: bool,
}

impl GlobalOpts {
    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.root)
    }

    /// Provisioner over real processes, with `.env` loaded from the root.
    pub fn provisioner(&self) -> Result<Provisioner> {
        let layout = self.layout();
        let env_file = layout.env_file();
        let env = Environment::load(&env_file)
            .with_context(|| format!("Failed to read {}", env_file.display()))?;
        debug!("Project root: {}", layout.root().display());

        let runner = ProcessRunner::new();
        let runner = if self.quiet { runner.quiet() } else { runner };
        Ok(Provisioner::new(Arc::new(runner), layout, env).with_terraform_binary(&self.terraform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("vnet").chain(args.iter().copied()))
    }

    #[test]
    fn test_no_flag_selects_full_pipeline() {
        let cli = parse(&["deploy"]).unwrap();
        match cli.command {
            Commands::Deploy(args) => {
                assert_eq!(args.stages.selected(), None);
                assert!(!args.sql_init);
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_single_stage_flag() {
        let cli = parse(&["destroy", "--lb-only"]).unwrap();
        match cli.command {
            Commands::Destroy(args) => assert_eq!(args.stages.selected(), Some(Stage::LoadBalancer)),
            _ => panic!("expected destroy"),
        }
    }

    #[test]
    fn test_stage_flags_are_mutually_exclusive() {
        assert!(parse(&["deploy", "--rg-only", "--vnet-only"]).is_err());
    }

    #[test]
    fn test_sql_init_only_on_deploy() {
        let cli = parse(&["deploy", "--sql-only", "--sql-init"]).unwrap();
        match cli.command {
            Commands::Deploy(args) => {
                assert!(args.sql_init);
                assert_eq!(args.stages.selected(), Some(Stage::Sql));
            }
            _ => panic!("expected deploy"),
        }
        assert!(parse(&["destroy", "--sql-init"]).is_err());
    }

    #[test]
    fn test_global_options() {
        let cli = parse(&["--root", "/srv/vnet", "deploy", "--terraform", "tofu", "-v"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("/srv/vnet"));
        assert_eq!(cli.terraform, "tofu");
        assert!(cli.verbose);
        assert!(parse(&["-v", "-q", "deploy"]).is_err());
    }

    #[test]
    fn test_provisioner_reads_env_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "VNET_TEST_TAG_OWNER=\"platform team\"\n").unwrap();
        let opts = GlobalOpts {
            root: dir.path().to_path_buf(),
            terraform: "tofu".into(),
            quiet: true,
        };

        let provisioner = opts.provisioner().unwrap();
        assert_eq!(provisioner.terraform().binary(), "tofu");
        assert_eq!(provisioner.layout().root(), dir.path());
        assert_eq!(
            provisioner.env().get("VNET_TEST_TAG_OWNER"),
            Some("platform team")
        );
        assert_eq!(
            provisioner.env().file_exports().get("VNET_TEST_TAG_OWNER").map(String::as_str),
            Some("platform team")
        );
    }
}
