//! Environment snapshot and `.env` loading.
//!
//! The pipeline never reads `std::env` directly after startup. It works from
//! an [`Environment`] captured once, which keeps resolution deterministic and
//! lets tests supply variables without touching the process environment.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

/// Captured environment variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    /// Keys that came from the `.env` file rather than the process.
    from_file: Vec<String>,
}

impl Environment {
    /// Empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
            from_file: Vec::new(),
        }
    }

    /// Process environment overlaid with an optional `.env` file.
    ///
    /// Variables already set in the process keep their value.
    pub fn load(env_file: &Path) -> Result<Self, dotenvy::Error> {
        let mut env = Self::from_process();
        env.merge_env_file(env_file)?;
        Ok(env)
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            from_file: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Merge unset keys from a `.env` file; returns how many were added.
    pub fn merge_env_file(&mut self, path: &Path) -> Result<usize, dotenvy::Error> {
        if !path.is_file() {
            return Ok(0);
        }
        let mut added = 0;
        for item in dotenvy::from_path_iter(path)? {
            let (key, value) = item?;
            if self.vars.contains_key(&key) {
                continue;
            }
            self.from_file.push(key.clone());
            self.vars.insert(key, value);
            added += 1;
        }
        debug!("Loaded {} variables from {:?}", added, path);
        Ok(added)
    }

    /// Non-empty value of a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Variables loaded from the `.env` file, to be passed on to child
    /// processes.
    pub fn file_exports(&self) -> HashMap<String, String> {
        self.from_file
            .iter()
            .filter_map(|k| self.vars.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

/// Parse a boolean flag value.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated list, trimming items and dropping empties.
pub fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_file_quotes_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# comment\n\nSQL_ADMIN_PASSWORD=\"Abc123!x\"\nexport LOCATION=westeurope\nTAG_ENV=prod=1\n",
        )
        .unwrap();

        let mut env = Environment::new();
        assert_eq!(env.merge_env_file(&path).unwrap(), 3);
        assert_eq!(env.get("SQL_ADMIN_PASSWORD"), Some("Abc123!x"));
        assert_eq!(env.get("LOCATION"), Some("westeurope"));
        assert_eq!(env.get("TAG_ENV"), Some("prod=1"));
    }

    #[test]
    fn test_env_file_does_not_override_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "LOCATION=westeurope\nTAG_OWNER=platform\n").unwrap();

        let mut env = Environment::from_pairs([("LOCATION", "eastus")]);
        let added = env.merge_env_file(&path).unwrap();

        assert_eq!(added, 1);
        assert_eq!(env.get("LOCATION"), Some("eastus"));
        assert_eq!(env.get("TAG_OWNER"), Some("platform"));
        assert_eq!(env.file_exports().get("TAG_OWNER").map(String::as_str), Some("platform"));
        assert!(!env.file_exports().contains_key("LOCATION"));
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::new();
        assert_eq!(env.merge_env_file(&dir.path().join(".env")).unwrap(), 0);
    }

    #[test]
    fn test_empty_value_counts_as_unset() {
        let env = Environment::from_pairs([("VNET_NAME", "")]);
        assert_eq!(env.get("VNET_NAME"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool(" on "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("OFF"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_csv() {
        assert_eq!(parse_csv("app, web ,,db"), vec!["app", "web", "db"]);
        assert!(parse_csv(" , ").is_empty());
    }
}
