//! # vnet_core
//!
//! Staged provisioning pipeline for the vnetstack Azure network.
//!
//! Nine terraform root modules are applied in dependency order (resource
//! group, virtual network, subnets, NSGs, private SQL, NAT gateway, app
//! tier, load balancer, web compute) and destroyed in reverse. Before each
//! stage runs, its `terraform.tfvars` is rendered from environment
//! overrides, values persisted by earlier runs, outputs of upstream stages
//! and defaults.
//!
//! ## Modules
//!
//! - [`stage`]: stage order and project layout
//! - [`env`]: environment snapshot and `.env` loading
//! - [`resolver`]: ordered resolution chains shared by deploy and destroy
//! - [`credentials`]: stage passwords, reused or generated
//! - [`subnets`]: role → subnet id mapping
//! - [`variables`]: per-stage variable sets
//! - [`driver`]: the deploy/destroy pipeline
//! - [`seed`]: optional database seeding

pub mod credentials;
pub mod driver;
pub mod env;
pub mod error;
pub mod identity;
pub mod resolver;
pub mod seed;
pub mod stage;
pub mod subnets;
pub mod variables;

pub use credentials::{generate_password, CredentialManager, CredentialSpec, CREDENTIALS};
pub use driver::{DeployOptions, Provisioner, RunReport, StageOutcome, StageStatus};
pub use env::Environment;
pub use error::{ProvisionError, ProvisionResult};
pub use identity::AzIdentity;
pub use resolver::{Chain, EnvKind, Resolver};
pub use seed::{find_sqlcmd, run_sql_seed, SqlLogin};
pub use stage::{ProjectLayout, Stage};
pub use subnets::{select_subnet_ids, SubnetMap};
pub use variables::{Mode, StageVars, VariableBuilder};
