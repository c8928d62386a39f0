// ⚙️ Settings - JSON file with defaults, overridden by env/flags in main
//
// {
//   "database_path": "expenses.db",
//   "rules_path": "rules.json",
//   "log_filter": "info"
// }

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Looked up in the working directory when no settings file is given
pub const DEFAULT_SETTINGS_FILE: &str = "expense-ledger.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Extra classification rules (JSON list), appended to the built-in tables
    #[serde(default)]
    pub rules_path: Option<PathBuf>,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("expenses.db")
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_path: default_database_path(),
            rules_path: None,
            log_filter: default_log_filter(),
        }
    }
}

impl Settings {
    /// Read one settings file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read settings file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path.as_ref()))
    }

    /// An explicit file must exist; otherwise `expense-ledger.json` is used
    /// when present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Settings::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_SETTINGS_FILE);
                if fallback.exists() {
                    Settings::from_file(fallback)
                } else {
                    Ok(Settings::default())
                }
            }
        }
    }

    /// Apply env/flag values on top of the file values
    pub fn with_overrides(mut self, database_path: Option<PathBuf>, log_filter: Option<String>) -> Self {
        if let Some(path) = database_path {
            self.database_path = path;
        }
        if let Some(filter) = log_filter {
            self.log_filter = filter;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The directory is removed when the guard drops
    fn write_temp(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database_path, PathBuf::from("expenses.db"));
        assert_eq!(settings.log_filter, "info");
        assert!(settings.rules_path.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let (_dir, path) = write_temp(r#"{ "rules_path": "extra-rules.json" }"#);

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.rules_path, Some(PathBuf::from("extra-rules.json")));
        assert_eq!(settings.database_path, PathBuf::from("expenses.db"));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/expense-ledger.json"))).is_err());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let (_dir, path) = write_temp("{ database_path: ");
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn test_overrides_win() {
        let settings = Settings::default()
            .with_overrides(Some(PathBuf::from("/tmp/other.db")), None);
        assert_eq!(settings.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(settings.log_filter, "info");

        let settings = settings.with_overrides(None, Some("debug".to_string()));
        assert_eq!(settings.log_filter, "debug");
        assert_eq!(settings.database_path, PathBuf::from("/tmp/other.db"));
    }
}
