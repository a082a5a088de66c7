//! Stage output lookup with state-file fallback.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{IacError, IacResult};
use crate::state::{locate_state, normalize_output, read_state_output, state_is_populated};
use crate::terraform::TerraformRunner;

/// Reads outputs published by applied stages.
///
/// The live `terraform output` query is tried first; when it fails or
/// prints nothing, the stage's persisted state file is consulted.
#[derive(Clone)]
pub struct OutputResolver {
    terraform: TerraformRunner,
}

impl OutputResolver {
    pub fn new(terraform: TerraformRunner) -> Self {
        Self { terraform }
    }

    pub fn terraform(&self) -> &TerraformRunner {
        &self.terraform
    }

    /// Resolve an output; `Ok(None)` when neither source has it.
    pub async fn output(&self, stage_dir: &Path, name: &str) -> IacResult<Option<Value>> {
        if let Some(raw) = self.terraform.output_json(stage_dir, name).await? {
            return Ok(parse_live_output(&raw));
        }
        debug!(
            "Live output '{}' unavailable in {:?}, reading state file",
            name, stage_dir
        );
        Ok(self
            .state_path(stage_dir)
            .await?
            .and_then(|path| read_state_output(&path, name)))
    }

    /// Resolve an output that must exist.
    pub async fn require(&self, stage_dir: &Path, name: &str) -> IacResult<Value> {
        self.output(stage_dir, name)
            .await?
            .ok_or_else(|| IacError::OutputNotFound {
                output: name.to_string(),
                dir: stage_dir.to_path_buf(),
            })
    }

    /// Resolve an output and render it as a plain string.
    pub async fn output_string(&self, stage_dir: &Path, name: &str) -> IacResult<Option<String>> {
        Ok(self.output(stage_dir, name).await?.map(|v| value_to_string(&v)))
    }

    /// State file for the stage's active workspace.
    pub async fn state_path(&self, stage_dir: &Path) -> IacResult<Option<PathBuf>> {
        let workspace = self.terraform.workspace(stage_dir).await?;
        Ok(locate_state(stage_dir, workspace.as_deref()))
    }

    /// Whether the stage has non-empty persisted state.
    pub async fn has_state(&self, stage_dir: &Path) -> IacResult<bool> {
        Ok(self
            .state_path(stage_dir)
            .await?
            .is_some_and(|path| state_is_populated(&path)))
    }
}

/// Interpret `terraform output -json` text.
///
/// Output that is not valid JSON is kept verbatim as a string.
pub fn parse_live_output(raw: &str) -> Option<Value> {
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    normalize_output(value)
}

/// Strings render bare; everything else renders as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_live_output() {
        assert_eq!(parse_live_output("\"rg-vnet-ab12\""), Some(json!("rg-vnet-ab12")));
        assert_eq!(parse_live_output("{\"web\":\"id1\"}"), Some(json!({"web": "id1"})));
        assert_eq!(parse_live_output("null"), None);
        assert_eq!(parse_live_output("\"null\""), None);
        assert_eq!(parse_live_output("not-json"), Some(json!("not-json")));
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("10.0.0.4")), "10.0.0.4");
        assert_eq!(value_to_string(&json!(8080)), "8080");
        assert_eq!(value_to_string(&json!({"web": "id1"})), r#"{"web":"id1"}"#);
    }
}
