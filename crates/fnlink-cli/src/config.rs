//! Client configuration at `~/.fnlink/config.toml`.
//!
//! Holds the appliance identifier and login credentials so they are
//! supplied at process start instead of living in the source. CLI flags
//! always override config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Appliance identity and credentials.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Appliance identity and credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Appliance identifier registered with the vendor directory.
    #[serde(default)]
    pub fn_id: String,

    /// Login username.
    #[serde(default)]
    pub username: String,

    /// Login password.
    #[serde(default)]
    pub password: String,
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &str) -> Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    #[allow(dead_code)]
    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;

        let path = Path::new(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config to {}", path.display()))?;

        Ok(())
    }
}

/// Effective credentials after merging CLI flags over the config file.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub fn_id: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Merge flag values over the config file, failing on anything still
    /// missing.
    pub fn resolve(
        cfg: &Config,
        fn_id: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        let fn_id = pick(fn_id, &cfg.auth.fn_id)
            .context("no appliance id — pass --fn-id or set auth.fn_id in the config")?;
        let username = pick(username, &cfg.auth.username)
            .context("no username — pass --username or set auth.username in the config")?;
        let password = pick(password, &cfg.auth.password)
            .context("no password — pass --password or set auth.password in the config")?;
        Ok(Self {
            fn_id,
            username,
            password,
        })
    }
}

fn pick(flag: Option<&str>, config: &str) -> Option<String> {
    match flag {
        Some(value) if !value.is_empty() => Some(value.to_string()),
        _ if !config.is_empty() => Some(config.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_empty() {
        let cfg = Config::default();
        assert!(cfg.auth.fn_id.is_empty());
        assert!(cfg.auth.username.is_empty());
        assert!(cfg.auth.password.is_empty());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[auth]
fn_id = "nas-1234"
username = "admin"
password = "hunter2"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.auth.fn_id, "nas-1234");
        assert_eq!(cfg.auth.username, "admin");
        assert_eq!(cfg.auth.password, "hunter2");
    }

    #[test]
    fn parse_partial_toml_config() {
        let toml_str = r#"
[auth]
fn_id = "nas-1234"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.auth.fn_id, "nas-1234");
        assert!(cfg.auth.username.is_empty());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load("/nonexistent/fnlink/config.toml").unwrap();
        assert!(cfg.auth.fn_id.is_empty());
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_string_lossy();

        let cfg = Config {
            auth: AuthConfig {
                fn_id: "nas-1234".into(),
                username: "admin".into(),
                password: "hunter2".into(),
            },
        };
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.auth.fn_id, "nas-1234");
        assert_eq!(loaded.auth.username, "admin");
        assert_eq!(loaded.auth.password, "hunter2");
    }

    #[test]
    fn flags_override_config() {
        let cfg: Config = toml::from_str(
            r#"
[auth]
fn_id = "nas-1234"
username = "admin"
password = "hunter2"
"#,
        )
        .unwrap();

        let creds = Credentials::resolve(&cfg, Some("nas-9999"), None, None).unwrap();
        assert_eq!(creds.fn_id, "nas-9999");
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn missing_credentials_fail() {
        let cfg = Config::default();
        assert!(Credentials::resolve(&cfg, Some("nas-1234"), None, None).is_err());
        assert!(Credentials::resolve(&cfg, None, Some("admin"), Some("pw")).is_err());
    }
}
