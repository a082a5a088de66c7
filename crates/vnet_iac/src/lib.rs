//! # vnet_iac
//!
//! Terraform plumbing for vnetstack.
//!
//! This crate drives terraform against one stage directory at a time,
//! renders and parses `terraform.tfvars`, and reads stage outputs either
//! live or from persisted state.
//!
//! ## Features
//!
//! - `init` / `apply` / `destroy` with exit-code propagation
//! - tfvars rendering for null, bool, number, string, list and map values
//! - Output lookup with workspace-aware state-file fallback
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use vnet_iac::{OutputResolver, TerraformRunner, TfVars};
//! use vnet_runner::ProcessRunner;
//!
//! # async fn run() -> vnet_iac::IacResult<()> {
//! let terraform = TerraformRunner::new(Arc::new(ProcessRunner::new()));
//! let stage = Path::new("terraform/01_resource_group");
//!
//! TfVars::new()
//!     .with("location", "eastus2")
//!     .with("tags", json!({"env": "dev"}))
//!     .write(&stage.join("terraform.tfvars"))?;
//! terraform.deploy_stack(stage).await?;
//!
//! let outputs = OutputResolver::new(terraform);
//! let rg_name = outputs.require(stage, "resource_group_name").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod outputs;
pub mod state;
pub mod terraform;
pub mod tfvars;

pub use error::{IacError, IacResult};
pub use outputs::{parse_live_output, value_to_string, OutputResolver};
pub use state::{locate_state, read_state_output, state_is_populated, STATE_FILE, WORKSPACE_STATE_DIR};
pub use terraform::{TerraformRunner, DEFAULT_WORKSPACE};
pub use tfvars::{render_value, TfVars, TFVARS_FILE};
