use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JugglerError {
    #[error("Failed to connect to libvirt at {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Failed to read device descriptors from {}: {source}", path.display())]
    DescriptorRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lookup domain by name {name}: {reason}")]
    DomainLookup { name: String, reason: String },

    #[error("Failed to read xml for domain {domain}: {reason}")]
    DomainRead { domain: String, reason: String },

    #[error("Failed to normalize device xml: {message}")]
    Normalization { message: String },

    #[error("Failed to attach device {device} to domain {domain}: {source}")]
    Attach {
        device: String,
        domain: String,
        #[source]
        source: Box<JugglerError>,
    },

    #[error("Failed to detach device {device} from domain {domain}: {source}")]
    Detach {
        device: String,
        domain: String,
        #[source]
        source: Box<JugglerError>,
    },

    #[error("libvirt rejected {procedure} (code {code}): {message}")]
    Rpc {
        procedure: &'static str,
        code: i32,
        message: String,
    },

    #[error("libvirt protocol error: {message}")]
    Protocol { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Descriptor,
    Connection,
    Domain,
    Device,
    Protocol,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl JugglerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            JugglerError::ConfigError { .. }
            | JugglerError::InvalidConfigValueError { .. }
            | JugglerError::MissingConfigError { .. } => ErrorCategory::Configuration,
            JugglerError::DescriptorRead { .. } | JugglerError::Normalization { .. } => {
                ErrorCategory::Descriptor
            }
            JugglerError::Connection { .. } => ErrorCategory::Connection,
            JugglerError::DomainLookup { .. } | JugglerError::DomainRead { .. } => {
                ErrorCategory::Domain
            }
            JugglerError::Attach { .. } | JugglerError::Detach { .. } | JugglerError::Rpc { .. } => {
                ErrorCategory::Device
            }
            JugglerError::Protocol { .. } | JugglerError::SerializationError(_) => {
                ErrorCategory::Protocol
            }
            JugglerError::IoError(_) => ErrorCategory::System,
        }
    }

    /// Recoverable kinds are `Low`: the locator skips the domain or
    /// descriptor and carries on.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            JugglerError::DomainRead { .. } | JugglerError::Normalization { .. } => {
                ErrorSeverity::Low
            }
            JugglerError::ConfigError { .. }
            | JugglerError::InvalidConfigValueError { .. }
            | JugglerError::MissingConfigError { .. }
            | JugglerError::DomainLookup { .. } => ErrorSeverity::Medium,
            JugglerError::DescriptorRead { .. }
            | JugglerError::Attach { .. }
            | JugglerError::Detach { .. }
            | JugglerError::Rpc { .. } => ErrorSeverity::High,
            JugglerError::Connection { .. }
            | JugglerError::Protocol { .. }
            | JugglerError::IoError(_)
            | JugglerError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    /// Process exit status for an invocation that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => 1,
            ErrorCategory::Descriptor | ErrorCategory::Domain | ErrorCategory::Device => 2,
            ErrorCategory::Connection | ErrorCategory::Protocol | ErrorCategory::System => 3,
        }
    }

    /// True when the daemon itself refused the request, as opposed to the
    /// session breaking underneath it.
    pub fn is_daemon_rejection(&self) -> bool {
        match self {
            JugglerError::Rpc { .. } => true,
            JugglerError::Attach { source, .. } | JugglerError::Detach { source, .. } => {
                source.is_daemon_rejection()
            }
            _ => false,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            JugglerError::Connection { endpoint, .. } => {
                format!("Could not reach the libvirt daemon at {}", endpoint)
            }
            JugglerError::DescriptorRead { path, .. } => {
                format!("Could not read device files from {}", path.display())
            }
            JugglerError::DomainLookup { name, .. } => format!("Domain '{}' does not exist", name),
            JugglerError::Attach { device, domain, .. } => {
                format!("Attaching {} to {} was refused", device, domain)
            }
            JugglerError::Detach { device, domain, .. } => {
                format!("Detaching {} from {} was refused", device, domain)
            }
            JugglerError::MissingConfigError { field } => {
                format!("Missing required setting '{}'", field)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => "Check the command line flags and the config file",
            ErrorCategory::Descriptor => "Make sure --dir points at a readable directory of device XML files",
            ErrorCategory::Connection => "Check that libvirtd is running and the socket path is correct",
            ErrorCategory::Domain => "Run `juggler domains` to see the available domains",
            ErrorCategory::Device => "Run `juggler find` to see where the devices are currently attached",
            ErrorCategory::Protocol => "The daemon sent an unexpected reply; check the libvirt version",
            ErrorCategory::System => "Check file permissions and available resources",
        }
    }
}

pub type Result<T> = std::result::Result<T, JugglerError>;
