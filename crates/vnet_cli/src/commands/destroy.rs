//! Destroy command - tear down one stage or every deployed stage.

use anyhow::Result;
use clap::Args;
use tracing::info;

use vnet_core::StageStatus;

use super::{GlobalOpts, StageFlags};

#[derive(Args)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub stages: StageFlags,
}

pub async fn execute(args: DestroyArgs, global: &GlobalOpts) -> Result<()> {
    let provisioner = global.provisioner()?;
    let only = args.stages.selected();
    match only {
        Some(stage) => info!("Destroying only {}", stage),
        None => info!("Destroying all stages with state"),
    }

    let report = provisioner.destroy(only).await?;

    if !global.quiet {
        println!();
        for outcome in &report.stages {
            match outcome.status {
                StageStatus::Skipped => println!("⏭️  {} (no state)", outcome.stage),
                _ => println!("🗑️  {} destroyed", outcome.stage),
            }
        }
    }
    if report.executed().next().is_none() {
        println!("Nothing to destroy.");
    }

    Ok(())
}
