//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate a `host:port` server address
pub fn validate_server_address(address: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    validate_required_string(address, field_name, domain)?;

    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} '{}' must be of the form host:port", field_name, address),
        });
    };

    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} '{}' has an invalid host or port", field_name, address),
        });
    }
    Ok(())
}
