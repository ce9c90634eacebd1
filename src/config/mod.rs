#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::config::toml_config::JugglerConfig;
use crate::utils::error::{JugglerError, Result};
use crate::utils::validation::{self, Validate};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SOCKET: &str = "/var/run/libvirt/libvirt-sock";
pub const DEFAULT_URI: &str = "qemu:///system";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 2;

/// Where and how to reach libvirtd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub socket: PathBuf,
    pub uri: String,
    /// Bounds the dial only, not the calls made afterwards.
    pub connect_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            socket: PathBuf::from(DEFAULT_SOCKET),
            uri: DEFAULT_URI.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Values given on the command line; each one beats the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub socket: Option<PathBuf>,
    pub uri: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub dir: Option<PathBuf>,
}

/// Effective settings for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub device_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl Settings {
    pub fn resolve(file: Option<JugglerConfig>, overrides: Overrides) -> Self {
        let file = file.unwrap_or_default();
        let defaults = ConnectionSettings::default();

        let connect_timeout = overrides
            .connect_timeout_secs
            .or(file.connection.connect_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout);

        Self {
            connection: ConnectionSettings {
                socket: overrides
                    .socket
                    .or(file.connection.socket)
                    .unwrap_or(defaults.socket),
                uri: overrides.uri.or(file.connection.uri).unwrap_or(defaults.uri),
                connect_timeout,
            },
            device_dir: overrides.dir.or(file.devices.dir),
            log_level: file.logging.level,
            json_logs: file.logging.json.unwrap_or(false),
        }
    }

    /// The descriptor directory, which every device command needs.
    pub fn device_dir(&self) -> Result<&Path> {
        validation::validate_required_field("dir", &self.device_dir).map(PathBuf::as_path)
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validation::validate_path("connection.socket", &self.connection.socket)?;
        validation::validate_uri("connection.uri", &self.connection.uri)?;
        validation::validate_range(
            "connection.connect_timeout_secs",
            self.connection.connect_timeout.as_secs(),
            1,
            300,
        )?;
        if let Some(dir) = &self.device_dir {
            validation::validate_path("dir", dir)?;
        }
        if let Some(level) = &self.log_level {
            validation::validate_log_level("logging.level", level)?;
        }
        Ok(())
    }
}

/// Loads the config file if one was named, failing loudly when the named
/// file is missing or invalid.
pub fn load_config_file(path: Option<&Path>) -> Result<Option<JugglerConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let config = JugglerConfig::from_file(path)?;
    config.validate().map_err(|e| JugglerError::ConfigError {
        message: format!("{}: {}", path.display(), e),
    })?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file_or_flags() {
        let settings = Settings::resolve(None, Overrides::default());
        assert_eq!(settings.connection, ConnectionSettings::default());
        assert!(settings.validate().is_ok());
        assert!(matches!(
            settings.device_dir(),
            Err(JugglerError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_flags_override_file() {
        let file = JugglerConfig::from_toml_str(
            r#"
[connection]
socket = "/from/file"
uri = "qemu:///session"
connect_timeout_secs = 9

[devices]
dir = "/file/devices"
"#,
        )
        .unwrap();
        let overrides = Overrides {
            socket: Some(PathBuf::from("/from/flag")),
            dir: Some(PathBuf::from("/flag/devices")),
            ..Overrides::default()
        };

        let settings = Settings::resolve(Some(file), overrides);

        assert_eq!(settings.connection.socket, PathBuf::from("/from/flag"));
        assert_eq!(settings.connection.uri, "qemu:///session");
        assert_eq!(settings.connection.connect_timeout, Duration::from_secs(9));
        assert_eq!(settings.device_dir().unwrap(), Path::new("/flag/devices"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = load_config_file(Some(Path::new("/nonexistent/juggler.toml")));
        assert!(matches!(result, Err(JugglerError::ConfigError { .. })));
        assert!(load_config_file(None).unwrap().is_none());
    }
}
