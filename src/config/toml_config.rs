use crate::utils::error::{JugglerError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid env var regex"));

/// Contents of `juggler.toml`. Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JugglerConfig {
    pub connection: ConnectionSection,
    pub devices: DevicesSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSection {
    /// Path of libvirtd's unix socket.
    pub socket: Option<PathBuf>,
    /// URI passed to the daemon when opening the connection.
    pub uri: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevicesSection {
    /// Directory used when `--dir` is not given.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub json: Option<bool>,
}

impl JugglerConfig {
    /// Loads the config file, substituting `${VAR}` references first.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| JugglerError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        toml::from_str(&processed).map_err(|e| JugglerError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value; unset variables are left
    /// as written.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }
}

impl Validate for JugglerConfig {
    fn validate(&self) -> Result<()> {
        if let Some(socket) = &self.connection.socket {
            validation::validate_path("connection.socket", socket)?;
        }
        if let Some(uri) = &self.connection.uri {
            validation::validate_uri("connection.uri", uri)?;
        }
        if let Some(timeout) = self.connection.connect_timeout_secs {
            validation::validate_range("connection.connect_timeout_secs", timeout, 1, 300)?;
        }
        if let Some(dir) = &self.devices.dir {
            validation::validate_path("devices.dir", dir)?;
        }
        if let Some(level) = &self.logging.level {
            validation::validate_log_level("logging.level", level)?;
        }
        Ok(())
    }
}
