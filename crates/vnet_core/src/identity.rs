//! Signed-in Azure principal lookup through the `az` CLI.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use vnet_runner::{CommandRunner, CommandSpec};

/// Name of the Azure CLI executable on this platform.
pub fn az_program() -> &'static str {
    if cfg!(windows) {
        "az.cmd"
    } else {
        "az"
    }
}

/// Queries the signed-in principal; every failure degrades to `None`.
#[derive(Clone)]
pub struct AzIdentity {
    runner: Arc<dyn CommandRunner>,
    program: String,
    env: HashMap<String, String>,
}

impl AzIdentity {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            program: az_program().to_string(),
            env: HashMap::new(),
        }
    }

    /// Extra environment passed to `az`.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// User principal name of the signed-in account.
    pub async fn signed_in_login(&self) -> Option<String> {
        self.query(&["account", "show", "--query", "user.name", "-o", "tsv"])
            .await
    }

    /// Object id of the signed-in user.
    pub async fn signed_in_object_id(&self) -> Option<String> {
        self.query(&["ad", "signed-in-user", "show", "--query", "id", "-o", "tsv"])
            .await
    }

    async fn query(&self, args: &[&str]) -> Option<String> {
        let spec = CommandSpec::new(&self.program)
            .args(args.iter().copied())
            .envs(self.env.clone())
            .capture();
        match self.runner.run(&spec).await {
            Ok(result) if result.success() => result.stdout_if_success(),
            Ok(result) => {
                debug!("{} exited with {}", spec.display(), result.exit_code);
                None
            }
            Err(e) => {
                warn!("Could not query Azure CLI: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vnet_runner::{MockResponse, MockRunner};

    #[tokio::test]
    async fn test_signed_in_user() {
        let mock = MockRunner::new()
            .respond_to("account show", MockResponse::success("ada@contoso.com\n"))
            .respond_to("signed-in-user", MockResponse::success("0000-1111\n"));
        let az = AzIdentity::new(Arc::new(mock));

        assert_eq!(az.signed_in_login().await.as_deref(), Some("ada@contoso.com"));
        assert_eq!(az.signed_in_object_id().await.as_deref(), Some("0000-1111"));
    }

    #[tokio::test]
    async fn test_failures_yield_none() {
        let mock = MockRunner::new().respond_to("account show", MockResponse::failure(1, "Please run 'az login'"));
        let az = AzIdentity::new(Arc::new(mock));
        assert_eq!(az.signed_in_login().await, None);

        let broken = AzIdentity::new(Arc::new(MockRunner::new().simulate_failure("az missing")));
        assert_eq!(broken.signed_in_object_id().await, None);
    }
}
