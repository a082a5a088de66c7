//! Stage credentials: environment override, persisted value or a freshly
//! generated password.

use rand::Rng;
use serde_json::Value;
use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult};
use crate::resolver::Resolver;
use crate::stage::Stage;

/// Length of generated passwords.
pub const PASSWORD_LENGTH: usize = 20;

/// Symbols allowed in generated passwords.
pub const PASSWORD_SYMBOLS: &str = "!@#$%^&*_-+=?";

const LETTERS_AND_DIGITS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A secret owned by one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialSpec {
    pub stage: Stage,
    /// Key in the stage's `terraform.tfvars`.
    pub variable: &'static str,
    /// Environment variable that overrides the persisted value.
    pub env_var: &'static str,
    pub label: &'static str,
}

/// All credentials the pipeline manages.
pub const CREDENTIALS: [CredentialSpec; 3] = [
    CredentialSpec {
        stage: Stage::Sql,
        variable: "sql_admin_password",
        env_var: "SQL_ADMIN_PASSWORD",
        label: "SQL admin password",
    },
    CredentialSpec {
        stage: Stage::App,
        variable: "admin_password",
        env_var: "APP_VM_ADMIN_PASSWORD",
        label: "App VM admin password",
    },
    CredentialSpec {
        stage: Stage::Compute,
        variable: "admin_password",
        env_var: "VM_ADMIN_PASSWORD",
        label: "VM admin password",
    },
];

impl CredentialSpec {
    pub fn lookup(stage: Stage, variable: &str) -> Option<&'static CredentialSpec> {
        CREDENTIALS
            .iter()
            .find(|spec| spec.stage == stage && spec.variable == variable)
    }
}

/// Resolves stage credentials, generating new ones when allowed.
pub struct CredentialManager<'r> {
    resolver: &'r Resolver<'r>,
}

impl<'r> CredentialManager<'r> {
    pub fn new(resolver: &'r Resolver<'r>) -> Self {
        Self { resolver }
    }

    /// Resolve a credential, returning the value and whether it was generated.
    ///
    /// A generated value is only kept if the caller writes it to the stage's
    /// tfvars file, where the next run will find it. A tfvars file that
    /// exists but does not parse is an error, never a reason to generate.
    pub fn resolve_or_generate(
        &self,
        stage: Stage,
        variable: &str,
        generate_allowed: bool,
    ) -> ProvisionResult<(String, bool)> {
        let spec = CredentialSpec::lookup(stage, variable).ok_or_else(|| ProvisionError::UnknownCredential {
            stage: stage.to_string(),
            variable: variable.to_string(),
        })?;

        if let Some(value) = self.resolver.env().get(spec.env_var) {
            debug!("{} taken from {}", spec.label, spec.env_var);
            return Ok((value.to_string(), false));
        }

        if let Some(Value::String(value)) = self.resolver.persisted_checked(stage, variable)? {
            debug!("{} reused from {:?}", spec.label, self.resolver.layout().tfvars_path(stage));
            return Ok((value, false));
        }

        if generate_allowed {
            return Ok((generate_password(), true));
        }

        Err(ProvisionError::MissingCredential {
            stage: stage.to_string(),
            label: spec.label.to_string(),
            env_var: spec.env_var.to_string(),
        })
    }

    /// Like [`resolve_or_generate`](Self::resolve_or_generate) without
    /// generation, mapping absence to `None`.
    pub fn existing(&self, stage: Stage, variable: &str) -> ProvisionResult<Option<String>> {
        match self.resolve_or_generate(stage, variable, false) {
            Ok((value, _)) => Ok(Some(value)),
            Err(ProvisionError::MissingCredential { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Generate a password with at least one lowercase letter, uppercase letter,
/// digit and symbol.
pub fn generate_password() -> String {
    let alphabet: Vec<char> = LETTERS_AND_DIGITS.chars().chain(PASSWORD_SYMBOLS.chars()).collect();
    let mut rng = rand::thread_rng();
    loop {
        let candidate: String = (0..PASSWORD_LENGTH)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect();
        if meets_policy(&candidate) {
            return candidate;
        }
    }
}

/// Whether a password contains every required character class.
pub fn meets_policy(password: &str) -> bool {
    password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SYMBOLS.contains(c))
}
