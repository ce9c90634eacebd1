use crate::utils::error::{JugglerError, Result};
use std::path::Path;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Accepts libvirt connection URIs such as `qemu:///system` or
/// `qemu+unix:///system?socket=/run/libvirt/libvirt-sock`.
pub fn validate_uri(field_name: &str, uri: &str) -> Result<()> {
    if uri.is_empty() {
        return Err(JugglerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: uri.to_string(),
            reason: "URI cannot be empty".to_string(),
        });
    }

    match Url::parse(uri) {
        Ok(url) if url.cannot_be_a_base() => Err(JugglerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: uri.to_string(),
            reason: "URI must have the form driver[+transport]://[host]/path".to_string(),
        }),
        Ok(_) => Ok(()),
        Err(e) => Err(JugglerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: uri.to_string(),
            reason: format!("Invalid URI format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &Path) -> Result<()> {
    let text = path.to_string_lossy();
    if text.is_empty() {
        return Err(JugglerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: text.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if text.contains('\0') {
        return Err(JugglerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: text.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| JugglerError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(JugglerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(JugglerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_log_level(field_name: &str, level: &str) -> Result<()> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    if !LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        return Err(JugglerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: level.to_string(),
            reason: format!("Unsupported level. Valid levels: {}", LEVELS.join(", ")),
        });
    }
    Ok(())
}
