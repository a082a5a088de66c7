//! vnetstack CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error (including unresolved stage inputs)
//! - n: Exit code of the failing terraform or sqlcmd invocation

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vnet_core::ProvisionError;

mod commands;

use commands::{Cli, Commands, GlobalOpts};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,vnet={level},vnet_core={level},vnet_iac={level},vnet_runner={level}"
        ))
    });
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let global = GlobalOpts {
        root: cli.root,
        terraform: cli.terraform,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::Deploy(args) => commands::deploy::execute(args, &global).await,
        Commands::Destroy(args) => commands::destroy::execute(args, &global).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// Exit code of the failed tool, when the error came from one.
fn exit_code_for(e: &anyhow::Error) -> u8 {
    e.downcast_ref::<ProvisionError>()
        .and_then(ProvisionError::exit_code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != ExitCodes::SUCCESS)
        .unwrap_or(ExitCodes::GENERAL_ERROR)
}
