//! Pipeline stages and project layout.

use std::fmt;
use std::path::{Path, PathBuf};

use vnet_iac::TFVARS_FILE;

/// One terraform root module in the provisioning pipeline.
///
/// Variants are declared in deploy order; destroy runs them in reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    ResourceGroup,
    Vnet,
    Subnets,
    Nsg,
    Sql,
    Nat,
    App,
    LoadBalancer,
    Compute,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::ResourceGroup,
        Stage::Vnet,
        Stage::Subnets,
        Stage::Nsg,
        Stage::Sql,
        Stage::Nat,
        Stage::App,
        Stage::LoadBalancer,
        Stage::Compute,
    ];

    /// Stages in apply order.
    pub fn deploy_order() -> impl Iterator<Item = Stage> {
        Self::ALL.into_iter()
    }

    /// Stages in destroy order.
    pub fn destroy_order() -> impl Iterator<Item = Stage> {
        Self::ALL.into_iter().rev()
    }

    /// Directory name under `terraform/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Stage::ResourceGroup => "01_resource_group",
            Stage::Vnet => "02_vnet",
            Stage::Subnets => "03_subnets",
            Stage::Nsg => "04_nsg",
            Stage::Sql => "05_private_sql",
            Stage::Nat => "06_nat_gateway",
            Stage::App => "07_app_tier",
            Stage::LoadBalancer => "08_load_balancer",
            Stage::Compute => "09_compute_web",
        }
    }

    /// Human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::ResourceGroup => "resource group",
            Stage::Vnet => "virtual network",
            Stage::Subnets => "subnet",
            Stage::Nsg => "network security groups",
            Stage::Sql => "SQL + private endpoint",
            Stage::Nat => "NAT gateway",
            Stage::App => "app tier",
            Stage::LoadBalancer => "load balancer",
            Stage::Compute => "web compute",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Filesystem layout of a project checkout.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn terraform_dir(&self) -> PathBuf {
        self.root.join("terraform")
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.terraform_dir().join(stage.dir_name())
    }

    pub fn tfvars_path(&self, stage: Stage) -> PathBuf {
        self.stage_dir(stage).join(TFVARS_FILE)
    }

    pub fn env_file(&self) -> PathBuf {
        self.root.join(".env")
    }

    pub fn seed_script(&self) -> PathBuf {
        self.root.join("sql_scripts").join("vnet_demo_seed.sql")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_are_reverses() {
        let deploy: Vec<_> = Stage::deploy_order().collect();
        let mut destroy: Vec<_> = Stage::destroy_order().collect();
        destroy.reverse();

        assert_eq!(deploy, destroy);
        assert_eq!(deploy.first(), Some(&Stage::ResourceGroup));
        assert_eq!(deploy.last(), Some(&Stage::Compute));
    }

    #[test]
    fn test_dir_names_sort_in_deploy_order() {
        let mut names: Vec<_> = Stage::ALL.iter().map(Stage::dir_name).collect();
        let expected = names.clone();
        names.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_layout_paths() {
        let layout = ProjectLayout::new("/work");
        assert_eq!(
            layout.tfvars_path(Stage::Sql),
            PathBuf::from("/work/terraform/05_private_sql/terraform.tfvars")
        );
        assert_eq!(
            layout.seed_script(),
            PathBuf::from("/work/sql_scripts/vnet_demo_seed.sql")
        );
    }
}
