//! # vnet_runner
//!
//! Subprocess execution wrapper for vnetstack.
//!
//! Every external tool the provisioning pipeline talks to (terraform, the
//! Azure CLI, sqlcmd) is invoked through the [`CommandRunner`] trait, so the
//! pipeline can be exercised end-to-end against [`MockRunner`] in tests.
//!
//! # Features
//!
//! - **Process Runner**: blocking `std::process` execution, streaming or captured
//! - **Redaction**: sensitive arguments are masked in every logged command line
//! - **Program Lookup**: `PATH` search with fixed fallback locations
//! - **Mock Runner**: scripted responses and call capture for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use vnet_runner::{CommandRunner, CommandSpec, ProcessRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::new();
//!
//!     let spec = CommandSpec::new("terraform")
//!         .arg("-chdir=terraform/01_resource_group")
//!         .arg("init");
//!
//!     let result = runner.run(&spec).await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod process;
pub mod runner;

pub use config::{CommandSpec, OutputMode, REDACTED};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use process::{find_program, ProcessRunner};
pub use runner::{CommandRunner, ExecutionResult};
