//! Persisted terraform state lookup.
//!
//! The state file is only read, never written. Its `outputs` section is the
//! fallback source for stage outputs when `terraform output` is unavailable.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::terraform::DEFAULT_WORKSPACE;

/// Default local state file name.
pub const STATE_FILE: &str = "terraform.tfstate";

/// Directory holding per-workspace state for the local backend.
pub const WORKSPACE_STATE_DIR: &str = "terraform.tfstate.d";

#[derive(Debug, Deserialize)]
struct StateDocument {
    #[serde(default)]
    outputs: Map<String, Value>,
}

/// Pick the state file for a stage directory.
///
/// A non-default workspace's state wins when it exists; otherwise the
/// default `terraform.tfstate` is used if present.
pub fn locate_state(stage_dir: &Path, workspace: Option<&str>) -> Option<PathBuf> {
    if let Some(ws) = workspace.filter(|ws| *ws != DEFAULT_WORKSPACE) {
        let ws_state = stage_dir.join(WORKSPACE_STATE_DIR).join(ws).join(STATE_FILE);
        if ws_state.is_file() {
            return Some(ws_state);
        }
    }
    let default_state = stage_dir.join(STATE_FILE);
    default_state.is_file().then_some(default_state)
}

/// Read one output value from a state file.
///
/// Unreadable or malformed state is treated as having no outputs.
pub fn read_state_output(state_path: &Path, name: &str) -> Option<Value> {
    let text = match fs::read_to_string(state_path) {
        Ok(text) => text,
        Err(e) => {
            warn!("Could not read state file {:?}: {}", state_path, e);
            return None;
        }
    };
    let document: StateDocument = match serde_json::from_str(&text) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Ignoring malformed state file {:?}: {}", state_path, e);
            return None;
        }
    };
    document
        .outputs
        .get(name)
        .and_then(|output| output.get("value"))
        .cloned()
        .and_then(normalize_output)
}

/// Check whether a state file records a prior apply.
pub fn state_is_populated(state_path: &Path) -> bool {
    fs::read_to_string(state_path)
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

/// Map "no value" encodings to `None`.
///
/// JSON null, the string `"null"` and the empty string all mean the output
/// was never set.
pub fn normalize_output(value: Value) -> Option<Value> {
    match &value {
        Value::Null => None,
        Value::String(s) if s.is_empty() || s == "null" => None,
        _ => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_state(path: &Path, outputs: Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let doc = json!({"version": 4, "outputs": outputs, "resources": []});
        fs::write(path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    }

    #[test]
    fn test_locate_default_state() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(locate_state(dir.path(), None), None);

        write_state(&dir.path().join(STATE_FILE), json!({}));
        assert_eq!(locate_state(dir.path(), None), Some(dir.path().join(STATE_FILE)));
        assert_eq!(
            locate_state(dir.path(), Some("default")),
            Some(dir.path().join(STATE_FILE))
        );
    }

    #[test]
    fn test_locate_workspace_state() {
        let dir = tempfile::tempdir().unwrap();
        let ws_state = dir.path().join(WORKSPACE_STATE_DIR).join("staging").join(STATE_FILE);
        write_state(&dir.path().join(STATE_FILE), json!({}));
        write_state(&ws_state, json!({}));

        assert_eq!(locate_state(dir.path(), Some("staging")), Some(ws_state));
        // Unknown workspace falls back to the default file.
        assert_eq!(
            locate_state(dir.path(), Some("prod")),
            Some(dir.path().join(STATE_FILE))
        );
    }

    #[test]
    fn test_read_state_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        write_state(
            &path,
            json!({
                "foo": {"value": "bar", "type": "string"},
                "ids": {"value": {"web": "id1"}},
                "unset": {"value": null},
            }),
        );

        assert_eq!(read_state_output(&path, "foo"), Some(json!("bar")));
        assert_eq!(read_state_output(&path, "ids"), Some(json!({"web": "id1"})));
        assert_eq!(read_state_output(&path, "unset"), None);
        assert_eq!(read_state_output(&path, "missing"), None);
    }

    #[test]
    fn test_read_state_output_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(read_state_output(&path, "foo"), None);
    }

    #[test]
    fn test_state_is_populated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        assert!(!state_is_populated(&path));

        fs::write(&path, "  \n").unwrap();
        assert!(!state_is_populated(&path));

        write_state(&path, json!({}));
        assert!(state_is_populated(&path));
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output(Value::Null), None);
        assert_eq!(normalize_output(json!("null")), None);
        assert_eq!(normalize_output(json!("")), None);
        assert_eq!(normalize_output(json!(0)), Some(json!(0)));
        assert_eq!(normalize_output(json!(["a"])), Some(json!(["a"])));
    }
}
