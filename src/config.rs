//! Runtime configuration from environment variables.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `GENOPOOL_LOG_MODE` | `stderr` or `file` | `stderr` |
//! | `GENOPOOL_LOG_FILE` | log path in `file` mode | `genopool.log` |
//! | `GENOPOOL_MIN_CONTRIBUTORS` | disclosure threshold | `1` |
//! | `GENOPOOL_PANELS` | extra panel files, `:`-separated | none |
//! | `GENOPOOL_KEY_PASSWORD_FILE` | file holding the private context passphrase | none |
//! | `GENOPOOL_KEY_PASSWORD` | passphrase itself, for development | none |
//!
//! The password file wins over the plain variable. Without either, private
//! contexts are written unsealed and rely on file permissions.
//! Command-line flags take precedence where both exist.

use std::path::PathBuf;

use crate::domain::{DisclosurePolicy, KdfError, Passphrase};

pub const LOG_MODE_ENV: &str = "GENOPOOL_LOG_MODE";
pub const LOG_FILE_ENV: &str = "GENOPOOL_LOG_FILE";
pub const MIN_CONTRIBUTORS_ENV: &str = "GENOPOOL_MIN_CONTRIBUTORS";
pub const PANELS_ENV: &str = "GENOPOOL_PANELS";
pub const KEY_PASSWORD_FILE_ENV: &str = "GENOPOOL_KEY_PASSWORD_FILE";
pub const KEY_PASSWORD_ENV: &str = "GENOPOOL_KEY_PASSWORD";

const DEFAULT_LOG_FILE: &str = "genopool.log";

/// Error type for configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be `stderr` or `file`, got `{value}`")]
    InvalidLogMode { var: &'static str, value: String },

    #[error("{var} must be a non-negative integer, got `{value}`")]
    InvalidNumber { var: &'static str, value: String },

    #[error("cannot read key password file {path}: {source}")]
    KeyPasswordFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{var}: {source}")]
    KeyPassword {
        var: &'static str,
        #[source]
        source: KdfError,
    },
}

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMode {
    Stderr,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub log_mode: LogMode,
    pub disclosure: DisclosurePolicy,
    pub panel_files: Vec<PathBuf>,
    pub key_password: Option<Passphrase>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_mode: LogMode::Stderr,
            disclosure: DisclosurePolicy::default(),
            panel_files: Vec::new(),
            key_password: None,
        }
    }
}

impl RuntimeConfig {
    /// Read the process environment.
    ///
    /// # Errors
    /// Returns `ConfigError` for values that are set but unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns `ConfigError` for values that are set but unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_mode = match lookup(LOG_MODE_ENV).as_deref().map(str::trim) {
            None | Some("") | Some("stderr") => LogMode::Stderr,
            Some("file") => LogMode::File(
                lookup(LOG_FILE_ENV)
                    .filter(|p| !p.trim().is_empty())
                    .map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from),
            ),
            Some(other) => {
                return Err(ConfigError::InvalidLogMode {
                    var: LOG_MODE_ENV,
                    value: other.to_string(),
                })
            }
        };

        let disclosure = match lookup(MIN_CONTRIBUTORS_ENV) {
            None => DisclosurePolicy::default(),
            Some(value) => {
                let min_contributors =
                    value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ConfigError::InvalidNumber {
                            var: MIN_CONTRIBUTORS_ENV,
                            value: value.clone(),
                        })?;
                DisclosurePolicy { min_contributors }
            }
        };

        let panel_files = lookup(PANELS_ENV)
            .map(|list| {
                std::env::split_paths(&list)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let key_password = key_password(&lookup)?;

        Ok(Self {
            log_mode,
            disclosure,
            panel_files,
            key_password,
        })
    }
}

fn key_password<F>(lookup: &F) -> Result<Option<Passphrase>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (var, value) = match lookup(KEY_PASSWORD_FILE_ENV).filter(|p| !p.trim().is_empty()) {
        Some(path) => {
            let path = PathBuf::from(path);
            let value = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::KeyPasswordFile { path, source })?;
            (KEY_PASSWORD_FILE_ENV, value)
        }
        None => match lookup(KEY_PASSWORD_ENV) {
            Some(value) => (KEY_PASSWORD_ENV, value),
            None => return Ok(None),
        },
    };
    Passphrase::new(value)
        .map(Some)
        .map_err(|source| ConfigError::KeyPassword { var, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<RuntimeConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RuntimeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]).unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_file_logging() {
        let cfg = config(&[(LOG_MODE_ENV, "file"), (LOG_FILE_ENV, "/tmp/g.log")]).unwrap();
        assert_eq!(cfg.log_mode, LogMode::File(PathBuf::from("/tmp/g.log")));

        let cfg = config(&[(LOG_MODE_ENV, "file")]).unwrap();
        assert_eq!(cfg.log_mode, LogMode::File(PathBuf::from(DEFAULT_LOG_FILE)));
    }

    #[test]
    fn test_min_contributors() {
        let cfg = config(&[(MIN_CONTRIBUTORS_ENV, "10")]).unwrap();
        assert_eq!(cfg.disclosure.min_contributors, 10);

        assert!(matches!(
            config(&[(MIN_CONTRIBUTORS_ENV, "ten")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_invalid_log_mode() {
        assert!(matches!(
            config(&[(LOG_MODE_ENV, "syslog")]),
            Err(ConfigError::InvalidLogMode { .. })
        ));
    }

    #[test]
    fn test_key_password_sources() {
        let cfg = config(&[(KEY_PASSWORD_ENV, "dev secret")]).unwrap();
        assert_eq!(cfg.key_password, Some(Passphrase::new("dev secret").unwrap()));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key_password");
        std::fs::write(&path, "from file\n").unwrap();
        let file = path.to_str().unwrap();
        let cfg = config(&[(KEY_PASSWORD_FILE_ENV, file), (KEY_PASSWORD_ENV, "dev")]).unwrap();
        assert_eq!(cfg.key_password, Some(Passphrase::new("from file").unwrap()));

        assert!(matches!(
            config(&[(KEY_PASSWORD_ENV, "")]),
            Err(ConfigError::KeyPassword { .. })
        ));
        assert!(matches!(
            config(&[(KEY_PASSWORD_FILE_ENV, "/nonexistent/key_password")]),
            Err(ConfigError::KeyPasswordFile { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_panel_list() {
        let cfg = config(&[(PANELS_ENV, "/a/p.json:/b/q.json")]).unwrap();
        assert_eq!(
            cfg.panel_files,
            vec![PathBuf::from("/a/p.json"), PathBuf::from("/b/q.json")]
        );
    }
}
