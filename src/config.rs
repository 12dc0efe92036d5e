//! Scan configuration file (`trackscan.yaml`).
//!
//! ```yaml
//! custom_functions:
//!   - trackEvent
//!   - Analytics.log(userId, EVENT_NAME, PROPERTIES)
//! ignore:
//!   - "**/fixtures/**"
//!   - "*.stories.tsx"
//! concurrency: 32
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::signature::parse_signatures;
use crate::walker::IgnoreRules;

/// Config file names searched for in the scan root, in order.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["trackscan.yaml", "trackscan.yml", ".trackscan.yaml"];

/// Starter config written by `trackscan init`.
pub const STARTER_CONFIG: &str = r#"# trackscan configuration
#
# Custom tracking wrappers. Forms:
#   name                               event at 0, properties at 1
#   name(EVENT_NAME, PROPERTIES)
#   name(userId, EVENT_NAME, PROPERTIES)  extra params become properties
custom_functions: []

# Globs matched against absolute and root-relative paths.
ignore:
  - "**/dist/**"
  - "**/build/**"

# Maximum files analyzed at once (default: 80% of the open file limit).
# concurrency: 64
"#;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub custom_functions: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&content)
    }

    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Find a config file in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
    }

    /// Append command-line values; an explicit concurrency wins.
    pub fn merge_cli(
        mut self,
        custom_functions: &[String],
        ignore: &[String],
        concurrency: Option<usize>,
    ) -> Self {
        self.custom_functions.extend(custom_functions.iter().cloned());
        self.ignore.extend(ignore.iter().cloned());
        if concurrency.is_some() {
            self.concurrency = concurrency;
        }
        self
    }
}

/// Reject configs that would fail or misbehave at scan time.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    parse_signatures(&config.custom_functions)?;
    IgnoreRules::new(&config.ignore)?;
    if config.concurrency == Some(0) {
        return Err(ConfigError::ZeroConcurrency);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse_str(
            r#"
custom_functions:
  - trackEvent
  - "Analytics.log(userId, EVENT_NAME, PROPERTIES)"
ignore:
  - "**/fixtures/**"
concurrency: 8
"#,
        )
        .unwrap();
        assert_eq!(config.custom_functions.len(), 2);
        assert_eq!(config.ignore, vec!["**/fixtures/**"]);
        assert_eq!(config.concurrency, Some(8));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_and_starter_configs_parse() {
        assert_eq!(Config::parse_str("").unwrap(), Config::default());
        let starter = Config::parse_str(STARTER_CONFIG).unwrap();
        assert!(starter.custom_functions.is_empty());
        assert_eq!(starter.ignore.len(), 2);
        assert!(validate(&starter).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_sig = Config {
            custom_functions: vec!["track(PROPERTIES)".into()],
            ..Default::default()
        };
        assert!(matches!(validate(&bad_sig), Err(ConfigError::Signature(_))));

        let zero = Config {
            concurrency: Some(0),
            ..Default::default()
        };
        assert!(matches!(validate(&zero), Err(ConfigError::ZeroConcurrency)));

        let bad_glob = Config {
            ignore: vec!["[".into()],
            ..Default::default()
        };
        assert!(matches!(validate(&bad_glob), Err(ConfigError::IgnorePattern { .. })));
    }

    #[test]
    fn test_discover_and_merge() {
        let tmp = TempDir::new().unwrap();
        assert!(Config::discover(tmp.path()).is_none());

        fs::write(tmp.path().join(".trackscan.yaml"), "ignore: [\"*.gen.ts\"]\n").unwrap();
        let found = Config::discover(tmp.path()).unwrap();
        let config = Config::parse_file(&found)
            .unwrap()
            .merge_cli(&["track".into()], &["*.spec.js".into()], Some(4));
        assert_eq!(config.ignore, vec!["*.gen.ts", "*.spec.js"]);
        assert_eq!(config.custom_functions, vec!["track"]);
        assert_eq!(config.concurrency, Some(4));
    }
}
