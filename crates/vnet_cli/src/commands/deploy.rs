//! Deploy command - apply one stage or the whole pipeline.

use anyhow::Result;
use clap::Args;
use tracing::info;

use vnet_core::DeployOptions;

use super::{GlobalOpts, StageFlags};

#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub stages: StageFlags,

    /// Run the SQL seed script after SQL deploy
    #[arg(long)]
    pub sql_init: bool,
}

pub async fn execute(args: DeployArgs, global: &GlobalOpts) -> Result<()> {
    let provisioner = global.provisioner()?;
    let only = args.stages.selected();
    match only {
        Some(stage) => info!("Deploying only {}", stage),
        None => info!("Deploying all stages"),
    }

    let options = DeployOptions {
        sql_init: args.sql_init,
    };
    let report = provisioner.deploy(only, &options).await?;

    if !global.quiet {
        println!();
        for outcome in &report.stages {
            println!("✅ {} ({})", outcome.stage, outcome.stage.label());
            for label in &outcome.generated {
                println!(
                    "   🔑 Generated {}; stored in {}",
                    label,
                    provisioner.layout().tfvars_path(outcome.stage).display()
                );
            }
        }
        if report.seeded {
            println!("🗄️  Database seeded");
        }
    }
    if let Some(url) = &report.public_url {
        println!("Public URL: {}", url);
    }

    Ok(())
}
