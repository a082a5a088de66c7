//! Per-stage variable sets.
//!
//! [`VariableBuilder::build`] resolves every variable a stage's
//! `terraform.tfvars` needs, in the order it is written. Deploy and destroy
//! use the same builder; only deploy may generate credentials.

use serde_json::{json, Value};
use tracing::debug;

use vnet_iac::TfVars;

use crate::credentials::CredentialManager;
use crate::error::ProvisionResult;
use crate::identity::AzIdentity;
use crate::resolver::Resolver;
use crate::stage::Stage;
use crate::subnets::{select_subnet_ids, SubnetMap, SUBNET_IDS_OUTPUT};

/// Hard-coded fallbacks for every variable with a default.
pub mod defaults {
    pub const RESOURCE_GROUP_NAME_PREFIX: &str = "rg-vnet";
    pub const LOCATION: &str = "eastus2";
    pub const VNET_NAME_PREFIX: &str = "vnet-main";
    pub const VNET_ADDRESS_SPACE: [&str; 1] = ["10.10.0.0/16"];
    pub const SUBNET_NAME_PREFIX: &str = "snet";
    /// (role, env var, CIDR)
    pub const SUBNET_CIDRS: [(&str, &str, &str); 3] = [
        ("web", "SUBNET_WEB_CIDR", "10.10.1.0/24"),
        ("app", "SUBNET_APP_CIDR", "10.10.2.0/24"),
        ("db", "SUBNET_DB_CIDR", "10.10.3.0/24"),
    ];
    pub const NSG_NAME_PREFIX: &str = "nsg";

    pub const SQL_SUBNET_KEY: &str = "db";
    pub const SQL_SERVER_NAME_PREFIX: &str = "sql-vnet";
    pub const SQL_ADMIN_LOGIN: &str = "sqladmin";
    pub const SQL_DATABASE_NAME: &str = "vnet-demo";
    pub const SQL_DATABASE_SKU_NAME: &str = "GP_S_Gen5_1";
    pub const SQL_MAX_SIZE_GB: i64 = 1;
    pub const SQL_MIN_CAPACITY: f64 = 0.5;
    pub const SQL_AUTO_PAUSE_DELAY_IN_MINUTES: i64 = 60;
    pub const SQL_PUBLIC_NETWORK_ACCESS_ENABLED: bool = true;
    pub const SQL_ALLOW_AZURE_SERVICES: bool = true;
    pub const SQL_ZONE_REDUNDANT: bool = false;
    pub const SQL_PRIVATE_DNS_ZONE_NAME: &str = "privatelink.database.windows.net";
    pub const SQL_PRIVATE_ENDPOINT_NAME_PREFIX: &str = "pe-sql";
    pub const SQL_PRIVATE_DNS_ZONE_LINK_NAME_PREFIX: &str = "link-sql";
    pub const SQL_PRIVATE_DNS_ZONE_GROUP_NAME: &str = "sql-dns";

    pub const NAT_GATEWAY_NAME_PREFIX: &str = "nat-vnet";
    pub const NAT_PUBLIC_IP_NAME_PREFIX: &str = "pip-nat";
    pub const NAT_PUBLIC_IP_SKU: &str = "Standard";
    pub const NAT_GATEWAY_SKU: &str = "Standard";
    pub const NAT_IDLE_TIMEOUT_IN_MINUTES: i64 = 10;
    pub const NAT_SUBNET_KEYS: [&str; 2] = ["app", "web"];

    pub const APP_SUBNET_KEY: &str = "app";
    pub const APP_PORT: i64 = 8080;
    pub const APP_PROBE_PATH: &str = "/health";
    pub const APP_LB_NAME_PREFIX: &str = "lb-app";
    pub const APP_LB_SKU: &str = "Standard";
    pub const APP_VM_NAME_PREFIX: &str = "vm-app";
    pub const APP_NIC_NAME_PREFIX: &str = "nic-app";
    pub const APP_VM_SIZE: &str = "Standard_D2s_v3";
    pub const APP_ADMIN_USERNAME: &str = "azureuser";

    pub const LB_NAME_PREFIX: &str = "lb-public";
    pub const PUBLIC_IP_NAME_PREFIX: &str = "pip-lb";
    pub const LB_SKU: &str = "Standard";
    pub const PUBLIC_IP_SKU: &str = "Standard";
    pub const FRONTEND_PORT: i64 = 80;
    pub const BACKEND_PORT: i64 = 80;
    pub const PROBE_PATH: &str = "/health";

    pub const WEB_SUBNET_KEY: &str = "web";
    pub const VM_NAME_PREFIX: &str = "vm-web";
    pub const NIC_NAME_PREFIX: &str = "nic-web";
    pub const VM_SIZE: &str = "Standard_D2s_v3";
    pub const ADMIN_USERNAME: &str = "azureuser";

    /// (tag, env var, default)
    pub const TAGS: [(&str, &str, &str); 3] = [
        ("project", "TAG_PROJECT", "vnets-subnets"),
        ("env", "TAG_ENV", "dev"),
        ("owner", "TAG_OWNER", "unknown"),
    ];
}

/// Which pipeline is resolving variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Deploy,
    Destroy,
}

impl Mode {
    fn verb(&self) -> &'static str {
        match self {
            Mode::Deploy => "deploy",
            Mode::Destroy => "destroy",
        }
    }
}

/// Resolved variables for one stage.
#[derive(Debug, Clone)]
pub struct StageVars {
    pub stage: Stage,
    pub vars: TfVars,
    /// Labels of credentials generated during resolution.
    pub generated: Vec<&'static str>,
}

/// Builds stage variable sets from a shared [`Resolver`].
pub struct VariableBuilder<'r> {
    resolver: &'r Resolver<'r>,
    identity: &'r AzIdentity,
    mode: Mode,
}

impl<'r> VariableBuilder<'r> {
    pub fn new(resolver: &'r Resolver<'r>, identity: &'r AzIdentity, mode: Mode) -> Self {
        Self {
            resolver,
            identity,
            mode,
        }
    }

    pub async fn build(&self, stage: Stage) -> ProvisionResult<StageVars> {
        debug!("Resolving variables for {}", stage);
        let mut generated = Vec::new();
        let vars = match stage {
            Stage::ResourceGroup => self.resource_group().await?,
            Stage::Vnet => self.vnet().await?,
            Stage::Subnets => self.subnets().await?,
            Stage::Nsg => self.nsg().await?,
            Stage::Sql => self.sql(&mut generated).await?,
            Stage::Nat => self.nat().await?,
            Stage::App => self.app(&mut generated).await?,
            Stage::LoadBalancer => self.load_balancer().await?,
            Stage::Compute => self.compute(&mut generated).await?,
        };
        Ok(StageVars {
            stage,
            vars,
            generated,
        })
    }

    fn label(&self, what: &str) -> String {
        format!("{} {}", what, self.mode.verb())
    }

    async fn text(&self, stage: Stage, name: &str, env: &str, default: &str) -> ProvisionResult<Value> {
        self.resolver.var(stage, name).env(env).or(default).required().await
    }

    async fn int(&self, stage: Stage, name: &str, env: &str, default: i64) -> ProvisionResult<Value> {
        self.resolver.var(stage, name).env_int(env).or(default).required().await
    }

    async fn flag(&self, stage: Stage, name: &str, env: &str, default: bool) -> ProvisionResult<Value> {
        self.resolver.var(stage, name).env_bool(env).or(default).required().await
    }

    async fn maybe(&self, stage: Stage, name: &str, env: &str) -> ProvisionResult<Value> {
        self.resolver.var(stage, name).env(env).optional().await
    }

    async fn rg_name(&self, stage: Stage) -> ProvisionResult<Value> {
        self.resolver
            .var(stage, "resource_group_name")
            .env("RESOURCE_GROUP_NAME")
            .output(Stage::ResourceGroup, "resource_group_name")
            .required()
            .await
    }

    async fn subnet_map(&self, stage: Stage) -> ProvisionResult<SubnetMap> {
        let value = self
            .resolver
            .var(stage, SUBNET_IDS_OUTPUT)
            .output(Stage::Subnets, SUBNET_IDS_OUTPUT)
            .required()
            .await?;
        SubnetMap::from_value(value)
    }

    async fn subnet_cidrs(&self, stage: Stage) -> ProvisionResult<Value> {
        let mut cidrs = serde_json::Map::new();
        for (role, env, default) in defaults::SUBNET_CIDRS {
            let cidr = self.text(stage, "subnet_cidrs", env, default).await?;
            cidrs.insert(role.to_string(), cidr);
        }
        Ok(Value::Object(cidrs))
    }

    async fn resource_group(&self) -> ProvisionResult<TfVars> {
        let s = Stage::ResourceGroup;
        Ok(TfVars::new()
            .with("resource_group_name", self.maybe(s, "resource_group_name", "RESOURCE_GROUP_NAME").await?)
            .with(
                "resource_group_name_prefix",
                self.text(
                    s,
                    "resource_group_name_prefix",
                    "RESOURCE_GROUP_NAME_PREFIX",
                    defaults::RESOURCE_GROUP_NAME_PREFIX,
                )
                .await?,
            )
            .with("location", self.resolver.location())
            .with("tags", self.resolver.tags()))
    }

    async fn vnet(&self) -> ProvisionResult<TfVars> {
        let s = Stage::Vnet;
        let address_space = self
            .resolver
            .var(s, "address_space")
            .env_list("VNET_ADDRESS_SPACE")
            .or(json!(defaults::VNET_ADDRESS_SPACE))
            .required()
            .await?;
        Ok(TfVars::new()
            .with("resource_group_name", self.rg_name(s).await?)
            .with("location", self.resolver.location())
            .with("vnet_name", self.maybe(s, "vnet_name", "VNET_NAME").await?)
            .with(
                "vnet_name_prefix",
                self.text(s, "vnet_name_prefix", "VNET_NAME_PREFIX", defaults::VNET_NAME_PREFIX)
                    .await?,
            )
            .with("address_space", address_space)
            .with("tags", self.resolver.tags()))
    }

    async fn subnets(&self) -> ProvisionResult<TfVars> {
        let s = Stage::Subnets;
        let rg_name = self.rg_name(s).await?;
        let vnet_name = self
            .resolver
            .var(s, "virtual_network_name")
            .env("VNET_NAME")
            .output(Stage::Vnet, "virtual_network_name")
            .required()
            .await?;
        let suffix = self
            .resolver
            .var(s, "subnet_name_suffix")
            .env("SUBNET_NAME_SUFFIX")
            .output(Stage::Vnet, "vnet_name_suffix")
            .optional()
            .await?;
        Ok(TfVars::new()
            .with("resource_group_name", rg_name)
            .with("virtual_network_name", vnet_name)
            .with(
                "subnet_name_prefix",
                self.text(s, "subnet_name_prefix", "SUBNET_NAME_PREFIX", defaults::SUBNET_NAME_PREFIX)
                    .await?,
            )
            .with("subnet_name_suffix", suffix)
            .with("subnet_cidrs", self.subnet_cidrs(s).await?))
    }

    async fn nsg(&self) -> ProvisionResult<TfVars> {
        let s = Stage::Nsg;
        let rg_name = self.rg_name(s).await?;
        let subnets = self.subnet_map(s).await?;
        Ok(TfVars::new()
            .with("resource_group_name", rg_name)
            .with("location", self.resolver.location())
            .with("subnet_ids_by_key", subnets.to_value())
            .with("subnet_cidrs", self.subnet_cidrs(s).await?)
            .with(
                "nsg_name_prefix",
                self.text(s, "nsg_name_prefix", "NSG_NAME_PREFIX", defaults::NSG_NAME_PREFIX)
                    .await?,
            )
            .with("tags", self.resolver.tags()))
    }

    async fn sql(&self, generated: &mut Vec<&'static str>) -> ProvisionResult<TfVars> {
        let s = Stage::Sql;
        let r = self.resolver;
        let rg_name = self.rg_name(s).await?;
        let vnet_id = r
            .var(s, "virtual_network_id")
            .output(Stage::Vnet, "virtual_network_id")
            .required()
            .await?;
        let subnet_key = r.env_or("SQL_SUBNET_KEY", defaults::SQL_SUBNET_KEY);
        let subnet_id = self
            .subnet_map(s)
            .await?
            .subnet_id(&subnet_key, &self.label("SQL"))?;

        let admin_login = r
            .var(s, "sql_admin_login")
            .env("SQL_ADMIN_LOGIN")
            .persisted()
            .or(defaults::SQL_ADMIN_LOGIN)
            .required()
            .await?;
        let (admin_password, was_generated) = CredentialManager::new(r).resolve_or_generate(
            s,
            "sql_admin_password",
            self.mode == Mode::Deploy,
        )?;
        if was_generated {
            generated.push("SQL admin password");
        }

        let aad_login = match r
            .var(s, "azuread_admin_login")
            .env("AZUREAD_ADMIN_LOGIN")
            .persisted()
            .optional_string()
            .await?
        {
            Some(login) => Some(login),
            None => self.identity.signed_in_login().await,
        };
        let aad_object_id = match r
            .var(s, "azuread_admin_object_id")
            .env("AZUREAD_ADMIN_OBJECT_ID")
            .persisted()
            .optional_string()
            .await?
        {
            Some(id) => Some(id),
            None => self.identity.signed_in_object_id().await,
        };

        let min_capacity = r
            .var(s, "min_capacity")
            .env_float("SQL_MIN_CAPACITY")
            .or(defaults::SQL_MIN_CAPACITY)
            .required()
            .await?;
        let client_ip = r
            .var(s, "client_ip_address")
            .env("SQL_CLIENT_IP_ADDRESS")
            .persisted()
            .optional()
            .await?;

        Ok(TfVars::new()
            .with("resource_group_name", rg_name)
            .with("location", r.location())
            .with("virtual_network_id", vnet_id)
            .with("subnet_id", subnet_id)
            .with("sql_server_name", self.maybe(s, "sql_server_name", "SQL_SERVER_NAME").await?)
            .with(
                "sql_server_name_prefix",
                self.text(
                    s,
                    "sql_server_name_prefix",
                    "SQL_SERVER_NAME_PREFIX",
                    defaults::SQL_SERVER_NAME_PREFIX,
                )
                .await?,
            )
            .with("sql_admin_login", admin_login)
            .with("sql_admin_password", admin_password)
            .with("azuread_admin_login", aad_login)
            .with("azuread_admin_object_id", aad_object_id)
            .with(
                "database_name",
                self.text(s, "database_name", "SQL_DATABASE_NAME", defaults::SQL_DATABASE_NAME)
                    .await?,
            )
            .with(
                "database_sku_name",
                self.text(
                    s,
                    "database_sku_name",
                    "SQL_DATABASE_SKU_NAME",
                    defaults::SQL_DATABASE_SKU_NAME,
                )
                .await?,
            )
            .with(
                "max_size_gb",
                self.int(s, "max_size_gb", "SQL_MAX_SIZE_GB", defaults::SQL_MAX_SIZE_GB)
                    .await?,
            )
            .with("min_capacity", min_capacity)
            .with(
                "auto_pause_delay_in_minutes",
                self.int(
                    s,
                    "auto_pause_delay_in_minutes",
                    "SQL_AUTO_PAUSE_DELAY_IN_MINUTES",
                    defaults::SQL_AUTO_PAUSE_DELAY_IN_MINUTES,
                )
                .await?,
            )
            .with(
                "public_network_access_enabled",
                self.flag(
                    s,
                    "public_network_access_enabled",
                    "SQL_PUBLIC_NETWORK_ACCESS_ENABLED",
                    defaults::SQL_PUBLIC_NETWORK_ACCESS_ENABLED,
                )
                .await?,
            )
            .with(
                "allow_azure_services",
                self.flag(
                    s,
                    "allow_azure_services",
                    "SQL_ALLOW_AZURE_SERVICES",
                    defaults::SQL_ALLOW_AZURE_SERVICES,
                )
                .await?,
            )
            .with("client_ip_address", client_ip)
            .with(
                "zone_redundant",
                self.flag(s, "zone_redundant", "SQL_ZONE_REDUNDANT", defaults::SQL_ZONE_REDUNDANT)
                    .await?,
            )
            .with(
                "private_dns_zone_name",
                self.text(
                    s,
                    "private_dns_zone_name",
                    "SQL_PRIVATE_DNS_ZONE_NAME",
                    defaults::SQL_PRIVATE_DNS_ZONE_NAME,
                )
                .await?,
            )
            .with(
                "private_endpoint_name_prefix",
                self.text(
                    s,
                    "private_endpoint_name_prefix",
                    "SQL_PRIVATE_ENDPOINT_NAME_PREFIX",
                    defaults::SQL_PRIVATE_ENDPOINT_NAME_PREFIX,
                )
                .await?,
            )
            .with(
                "private_dns_zone_link_name_prefix",
                self.text(
                    s,
                    "private_dns_zone_link_name_prefix",
                    "SQL_PRIVATE_DNS_ZONE_LINK_NAME_PREFIX",
                    defaults::SQL_PRIVATE_DNS_ZONE_LINK_NAME_PREFIX,
                )
                .await?,
            )
            .with(
                "private_dns_zone_group_name",
                self.text(
                    s,
                    "private_dns_zone_group_name",
                    "SQL_PRIVATE_DNS_ZONE_GROUP_NAME",
                    defaults::SQL_PRIVATE_DNS_ZONE_GROUP_NAME,
                )
                .await?,
            )
            .with("tags", r.tags()))
    }

    async fn nat(&self) -> ProvisionResult<TfVars> {
        let s = Stage::Nat;
        let rg_name = self.rg_name(s).await?;
        let keys = self
            .resolver
            .var(s, "subnet_ids")
            .env_list("NAT_SUBNET_KEYS")
            .or(json!(defaults::NAT_SUBNET_KEYS))
            .required()
            .await?;
        let keys: Vec<String> = keys
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        let subnet_ids = select_subnet_ids(&self.subnet_map(s).await?, &keys, &self.label("NAT"))?;

        Ok(TfVars::new()
            .with("resource_group_name", rg_name)
            .with("location", self.resolver.location())
            .with("nat_gateway_name", self.maybe(s, "nat_gateway_name", "NAT_GATEWAY_NAME").await?)
            .with(
                "nat_gateway_name_prefix",
                self.text(
                    s,
                    "nat_gateway_name_prefix",
                    "NAT_GATEWAY_NAME_PREFIX",
                    defaults::NAT_GATEWAY_NAME_PREFIX,
                )
                .await?,
            )
            .with("public_ip_name", self.maybe(s, "public_ip_name", "NAT_PUBLIC_IP_NAME").await?)
            .with(
                "public_ip_name_prefix",
                self.text(
                    s,
                    "public_ip_name_prefix",
                    "NAT_PUBLIC_IP_NAME_PREFIX",
                    defaults::NAT_PUBLIC_IP_NAME_PREFIX,
                )
                .await?,
            )
            .with(
                "public_ip_sku",
                self.text(s, "public_ip_sku", "NAT_PUBLIC_IP_SKU", defaults::NAT_PUBLIC_IP_SKU)
                    .await?,
            )
            .with(
                "nat_gateway_sku",
                self.text(s, "nat_gateway_sku", "NAT_GATEWAY_SKU", defaults::NAT_GATEWAY_SKU)
                    .await?,
            )
            .with(
                "idle_timeout_in_minutes",
                self.int(
                    s,
                    "idle_timeout_in_minutes",
                    "NAT_IDLE_TIMEOUT_IN_MINUTES",
                    defaults::NAT_IDLE_TIMEOUT_IN_MINUTES,
                )
                .await?,
            )
            .with("subnet_ids", subnet_ids)
            .with("tags", self.resolver.tags()))
    }

    async fn app(&self, generated: &mut Vec<&'static str>) -> ProvisionResult<TfVars> {
        let s = Stage::App;
        let r = self.resolver;
        let rg_name = self.rg_name(s).await?;
        let subnet_key = r.env_or("APP_SUBNET_KEY", defaults::APP_SUBNET_KEY);
        let subnet_id = self
            .subnet_map(s)
            .await?
            .subnet_id(&subnet_key, &self.label("app tier"))?;

        let credentials = CredentialManager::new(r);
        let (admin_password, was_generated) =
            credentials.resolve_or_generate(s, "admin_password", self.mode == Mode::Deploy)?;
        if was_generated {
            generated.push("App VM admin password");
        }

        let sql_fqdn = r
            .var(s, "sql_server_fqdn")
            .output(Stage::Sql, "sql_server_fqdn")
            .optional()
            .await?;
        let sql_database = r
            .var(s, "sql_database_name")
            .output(Stage::Sql, "sql_database_name")
            .optional()
            .await?;
        let sql_login = r
            .var(s, "sql_admin_login")
            .env("SQL_ADMIN_LOGIN")
            .persisted_from(Stage::Sql, "sql_admin_login")
            .or(defaults::SQL_ADMIN_LOGIN)
            .required()
            .await?;
        let sql_password = credentials.existing(Stage::Sql, "sql_admin_password")?;

        Ok(TfVars::new()
            .with("resource_group_name", rg_name)
            .with("location", r.location())
            .with("subnet_id", subnet_id)
            .with("app_port", self.app_port(s).await?)
            .with(
                "probe_path",
                self.text(s, "probe_path", "APP_PROBE_PATH", defaults::APP_PROBE_PATH)
                    .await?,
            )
            .with("lb_name", self.maybe(s, "lb_name", "APP_LB_NAME").await?)
            .with(
                "lb_name_prefix",
                self.text(s, "lb_name_prefix", "APP_LB_NAME_PREFIX", defaults::APP_LB_NAME_PREFIX)
                    .await?,
            )
            .with(
                "lb_sku",
                self.text(s, "lb_sku", "APP_LB_SKU", defaults::APP_LB_SKU).await?,
            )
            .with("vm_name", self.maybe(s, "vm_name", "APP_VM_NAME").await?)
            .with(
                "vm_name_prefix",
                self.text(s, "vm_name_prefix", "APP_VM_NAME_PREFIX", defaults::APP_VM_NAME_PREFIX)
                    .await?,
            )
            .with(
                "nic_name_prefix",
                self.text(
                    s,
                    "nic_name_prefix",
                    "APP_NIC_NAME_PREFIX",
                    defaults::APP_NIC_NAME_PREFIX,
                )
                .await?,
            )
            .with(
                "vm_size",
                self.text(s, "vm_size", "APP_VM_SIZE", defaults::APP_VM_SIZE).await?,
            )
            .with(
                "admin_username",
                self.text(
                    s,
                    "admin_username",
                    "APP_VM_ADMIN_USERNAME",
                    defaults::APP_ADMIN_USERNAME,
                )
                .await?,
            )
            .with("admin_password", admin_password)
            .with("sql_server_fqdn", sql_fqdn)
            .with("sql_database_name", sql_database)
            .with("sql_admin_login", sql_login)
            .with("sql_admin_password", sql_password)
            .with("tags", r.tags()))
    }

    async fn app_port(&self, stage: Stage) -> ProvisionResult<Value> {
        self.int(stage, "app_port", "APP_PORT", defaults::APP_PORT).await
    }

    async fn load_balancer(&self) -> ProvisionResult<TfVars> {
        let s = Stage::LoadBalancer;
        Ok(TfVars::new()
            .with("resource_group_name", self.rg_name(s).await?)
            .with("location", self.resolver.location())
            .with("lb_name", self.maybe(s, "lb_name", "LB_NAME").await?)
            .with(
                "lb_name_prefix",
                self.text(s, "lb_name_prefix", "LB_NAME_PREFIX", defaults::LB_NAME_PREFIX)
                    .await?,
            )
            .with("public_ip_name", self.maybe(s, "public_ip_name", "PUBLIC_IP_NAME").await?)
            .with(
                "public_ip_name_prefix",
                self.text(
                    s,
                    "public_ip_name_prefix",
                    "PUBLIC_IP_NAME_PREFIX",
                    defaults::PUBLIC_IP_NAME_PREFIX,
                )
                .await?,
            )
            .with("lb_sku", self.text(s, "lb_sku", "LB_SKU", defaults::LB_SKU).await?)
            .with(
                "public_ip_sku",
                self.text(s, "public_ip_sku", "PUBLIC_IP_SKU", defaults::PUBLIC_IP_SKU)
                    .await?,
            )
            .with(
                "frontend_port",
                self.int(s, "frontend_port", "LB_FRONTEND_PORT", defaults::FRONTEND_PORT)
                    .await?,
            )
            .with(
                "backend_port",
                self.int(s, "backend_port", "LB_BACKEND_PORT", defaults::BACKEND_PORT)
                    .await?,
            )
            .with(
                "probe_path",
                self.text(s, "probe_path", "LB_PROBE_PATH", defaults::PROBE_PATH).await?,
            )
            .with("tags", self.resolver.tags()))
    }

    /// Web compute stage.
    ///
    /// `app_tier_url` defaults to `http://<app_lb_private_ip>:<port>` where
    /// the port is the app tier's resolved `APP_PORT` (8080 unless
    /// overridden), so the web tier follows a relocated app listener. It is
    /// null while the app tier has no private IP output.
    async fn compute(&self, generated: &mut Vec<&'static str>) -> ProvisionResult<TfVars> {
        let s = Stage::Compute;
        let r = self.resolver;
        let rg_name = self.rg_name(s).await?;
        let subnet_id = self
            .subnet_map(s)
            .await?
            .subnet_id(defaults::WEB_SUBNET_KEY, &self.label("compute"))?;
        let backend_pool = r
            .var(s, "lb_backend_pool_id")
            .output(Stage::LoadBalancer, "lb_backend_pool_id")
            .required()
            .await?;

        let app_tier_url = match r.env().get("APP_TIER_URL") {
            Some(url) => Some(url.to_string()),
            None => {
                let private_ip = r
                    .var(s, "app_tier_url")
                    .output(Stage::App, "app_lb_private_ip")
                    .optional_string()
                    .await?;
                match private_ip {
                    Some(ip) => Some(format!("http://{}:{}", ip, self.app_port(Stage::App).await?)),
                    None => None,
                }
            }
        };

        let (admin_password, was_generated) = CredentialManager::new(r).resolve_or_generate(
            s,
            "admin_password",
            self.mode == Mode::Deploy,
        )?;
        if was_generated {
            generated.push("VM admin password");
        }

        Ok(TfVars::new()
            .with("resource_group_name", rg_name)
            .with("location", r.location())
            .with("subnet_id", subnet_id)
            .with("lb_backend_pool_id", backend_pool)
            .with("app_tier_url", app_tier_url)
            .with("vm_name", self.maybe(s, "vm_name", "VM_NAME").await?)
            .with(
                "vm_name_prefix",
                self.text(s, "vm_name_prefix", "VM_NAME_PREFIX", defaults::VM_NAME_PREFIX)
                    .await?,
            )
            .with(
                "nic_name_prefix",
                self.text(s, "nic_name_prefix", "NIC_NAME_PREFIX", defaults::NIC_NAME_PREFIX)
                    .await?,
            )
            .with("vm_size", self.text(s, "vm_size", "VM_SIZE", defaults::VM_SIZE).await?)
            .with(
                "admin_username",
                self.text(s, "admin_username", "VM_ADMIN_USERNAME", defaults::ADMIN_USERNAME)
                    .await?,
            )
            .with("admin_password", admin_password)
            .with("tags", r.tags()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use vnet_iac::{OutputResolver, TerraformRunner};
    use vnet_runner::{MockResponse, MockRunner};

    use crate::env::Environment;
    use crate::error::ProvisionError;
    use crate::stage::ProjectLayout;

    const SUBNETS: &str = r#"{"web":"/subs/web","app":"/subs/app","db":"/subs/db"}"#;

    struct Fixture {
        _dir: tempfile::TempDir,
        layout: ProjectLayout,
        outputs: OutputResolver,
        identity: AzIdentity,
    }

    fn fixture(mock: MockRunner) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        for stage in Stage::ALL {
            std::fs::create_dir_all(layout.stage_dir(stage)).unwrap();
        }
        let runner = Arc::new(mock);
        Fixture {
            _dir: dir,
            layout,
            outputs: OutputResolver::new(TerraformRunner::new(runner.clone())),
            identity: AzIdentity::new(runner),
        }
    }

    fn upstream_outputs() -> MockRunner {
        MockRunner::new()
            .respond_to("output -json resource_group_name", MockResponse::success("\"rg-vnet-a1\""))
            .respond_to("output -json virtual_network_name", MockResponse::success("\"vnet-main-a1\""))
            .respond_to("output -json vnet_name_suffix", MockResponse::success("\"a1\""))
            .respond_to("output -json virtual_network_id", MockResponse::success("\"/subs/vnet\""))
            .respond_to("output -json subnet_ids_by_key", MockResponse::success(SUBNETS))
            .respond_to("output -json lb_backend_pool_id", MockResponse::success("\"/subs/pool\""))
            .respond_to("output -json app_lb_private_ip", MockResponse::success("\"10.10.2.10\""))
            .respond_to("account show", MockResponse::success("ada@contoso.com"))
            .respond_to("signed-in-user", MockResponse::success("0000-1111"))
            .with_fallback(MockResponse::failure(1, ""))
    }

    #[tokio::test]
    async fn test_resource_group_defaults() {
        let fx = fixture(MockRunner::new());
        let env = Environment::new();
        let resolver = Resolver::new(&env, &fx.layout, &fx.outputs);
        let builder = VariableBuilder::new(&resolver, &fx.identity, Mode::Deploy);

        let built = builder.build(Stage::ResourceGroup).await.unwrap();
        assert_eq!(
            built.vars.render(),
            "resource_group_name = null\n\
             resource_group_name_prefix = \"rg-vnet\"\n\
             location = \"eastus2\"\n\
             tags = {\n  project = \"vnets-subnets\"\n  env = \"dev\"\n  owner = \"unknown\"\n}\n"
        );
    }

    #[tokio::test]
    async fn test_subnets_use_vnet_outputs() {
        let fx = fixture(upstream_outputs());
        let env = Environment::from_pairs([("SUBNET_DB_CIDR", "10.20.3.0/24")]);
        let resolver = Resolver::new(&env, &fx.layout, &fx.outputs);
        let builder = VariableBuilder::new(&resolver, &fx.identity, Mode::Deploy);

        let vars = builder.build(Stage::Subnets).await.unwrap().vars;
        assert_eq!(vars.get_str("virtual_network_name"), Some("vnet-main-a1"));
        assert_eq!(vars.get_str("subnet_name_suffix"), Some("a1"));
        assert_eq!(
            vars.get("subnet_cidrs"),
            Some(&json!({"web": "10.10.1.0/24", "app": "10.10.2.0/24", "db": "10.20.3.0/24"}))
        );
    }

    #[tokio::test]
    async fn test_sql_variables() {
        let fx = fixture(upstream_outputs());
        let env = Environment::from_pairs([
            ("SQL_MAX_SIZE_GB", "5"),
            ("SQL_ZONE_REDUNDANT", "yes"),
            ("SQL_MIN_CAPACITY", "oops"),
        ]);
        let resolver = Resolver::new(&env, &fx.layout, &fx.outputs);
        let builder = VariableBuilder::new(&resolver, &fx.identity, Mode::Deploy);

        let built = builder.build(Stage::Sql).await.unwrap();
        let vars = &built.vars;
        assert_eq!(vars.get_str("subnet_id"), Some("/subs/db"));
        assert_eq!(vars.get_str("virtual_network_id"), Some("/subs/vnet"));
        assert_eq!(vars.get_str("sql_admin_login"), Some("sqladmin"));
        assert_eq!(vars.get_str("azuread_admin_login"), Some("ada@contoso.com"));
        assert_eq!(vars.get_str("azuread_admin_object_id"), Some("0000-1111"));
        assert_eq!(vars.get("max_size_gb"), Some(&json!(5)));
        assert_eq!(vars.get("min_capacity"), Some(&json!(0.5)));
        assert_eq!(vars.get("zone_redundant"), Some(&json!(true)));
        assert_eq!(vars.get("client_ip_address"), Some(&Value::Null));
        assert_eq!(built.generated, vec!["SQL admin password"]);
        assert_eq!(vars.keys().last().map(String::as_str), Some("tags"));
    }

    #[tokio::test]
    async fn test_nat_subnet_keys_from_env() {
        let fx = fixture(upstream_outputs());
        let env = Environment::from_pairs([("NAT_SUBNET_KEYS", "web")]);
        let resolver = Resolver::new(&env, &fx.layout, &fx.outputs);
        let builder = VariableBuilder::new(&resolver, &fx.identity, Mode::Deploy);

        let vars = builder.build(Stage::Nat).await.unwrap().vars;
        assert_eq!(vars.get("subnet_ids"), Some(&json!(["/subs/web"])));
        assert_eq!(vars.get("idle_timeout_in_minutes"), Some(&json!(10)));
    }

    #[tokio::test]
    async fn test_nat_missing_subnet_key() {
        let fx = fixture(upstream_outputs());
        let env = Environment::from_pairs([("NAT_SUBNET_KEYS", "app,mgmt")]);
        let resolver = Resolver::new(&env, &fx.layout, &fx.outputs);
        let builder = VariableBuilder::new(&resolver, &fx.identity, Mode::Destroy);

        let err = builder.build(Stage::Nat).await.unwrap_err();
        assert_eq!(err.to_string(), "Subnet IDs not found for NAT destroy: mgmt.");
    }

    #[tokio::test]
    async fn test_app_reads_sql_credentials_without_generating() {
        let fx = fixture(upstream_outputs());
        TfVars::new()
            .with("sql_admin_login", "dbowner")
            .with("sql_admin_password", "Sql-Secret1")
            .write(&fx.layout.tfvars_path(Stage::Sql))
            .unwrap();
        let env = Environment::new();
        let resolver = Resolver::new(&env, &fx.layout, &fx.outputs);
        let builder = VariableBuilder::new(&resolver, &fx.identity, Mode::Deploy);

        let built = builder.build(Stage::App).await.unwrap();
        assert_eq!(built.vars.get_str("subnet_id"), Some("/subs/app"));
        assert_eq!(built.vars.get_str("sql_admin_login"), Some("dbowner"));
        assert_eq!(built.vars.get_str("sql_admin_password"), Some("Sql-Secret1"));
        assert_eq!(built.vars.get("sql_server_fqdn"), Some(&Value::Null));
        assert_eq!(built.generated, vec!["App VM admin password"]);
    }

    #[tokio::test]
    async fn test_compute_app_tier_url_uses_app_port() {
        let fx = fixture(upstream_outputs());
        let env = Environment::from_pairs([("APP_PORT", "9000"), ("VM_ADMIN_PASSWORD", "Vm-Secret1")]);
        let resolver = Resolver::new(&env, &fx.layout, &fx.outputs);
        let builder = VariableBuilder::new(&resolver, &fx.identity, Mode::Deploy);

        let built = builder.build(Stage::Compute).await.unwrap();
        assert_eq!(built.vars.get_str("app_tier_url"), Some("http://10.10.2.10:9000"));
        assert_eq!(built.vars.get_str("subnet_id"), Some("/subs/web"));
        assert_eq!(built.vars.get_str("lb_backend_pool_id"), Some("/subs/pool"));
        assert!(built.generated.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_never_generates_credentials() {
        let fx = fixture(upstream_outputs());
        let env = Environment::new();
        let resolver = Resolver::new(&env, &fx.layout, &fx.outputs);
        let builder = VariableBuilder::new(&resolver, &fx.identity, Mode::Destroy);

        let err = builder.build(Stage::Compute).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingCredential { .. }));
        assert!(err.to_string().contains("VM_ADMIN_PASSWORD"));
    }

    #[tokio::test]
    async fn test_missing_upstream_output() {
        let fx = fixture(MockRunner::new().with_fallback(MockResponse::failure(1, "")));
        let env = Environment::new();
        let resolver = Resolver::new(&env, &fx.layout, &fx.outputs);
        let builder = VariableBuilder::new(&resolver, &fx.identity, Mode::Deploy);

        let err = builder.build(Stage::Vnet).await.unwrap_err();
        assert!(err.is_resolution());
        assert!(err.to_string().contains("resource_group_name"));
    }
}
