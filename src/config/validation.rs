//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PoolConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::PoolConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one backend must be configured")]
    NoBackends,

    #[error("duplicate backend name '{0}'")]
    DuplicateBackend(String),

    #[error("backend '{name}' has invalid address '{address}'")]
    InvalidAddress { name: String, address: String },

    #[error("backend '{0}' has a zero connect timeout")]
    ZeroConnectTimeout(String),

    #[error("acquire timeout must be greater than zero")]
    ZeroAcquireTimeout,

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &PoolConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    let mut names = HashSet::new();
    for backend in &config.backends {
        if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        if backend.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                name: backend.name.clone(),
                address: backend.address.clone(),
            });
        }
        if backend.connect_timeout_ms == 0 {
            errors.push(ValidationError::ZeroConnectTimeout(backend.name.clone()));
        }
    }

    if config.limits.acquire_timeout_ms == 0 {
        errors.push(ValidationError::ZeroAcquireTimeout);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn backend(name: &str, address: &str) -> BackendConfig {
        BackendConfig {
            name: name.into(),
            address: address.into(),
            connect_timeout_ms: 1_000,
        }
    }

    #[test]
    fn accepts_valid_config() {
        let mut config = PoolConfig::default();
        config.backends.push(backend("a", "127.0.0.1:7000"));
        config.backends.push(backend("b", "127.0.0.1:7001"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_config_is_rejected() {
        let errors = validate_config(&PoolConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoBackends]);
    }

    #[test]
    fn reports_all_errors() {
        let mut config = PoolConfig::default();
        config.backends.push(backend("a", "127.0.0.1:7000"));
        config.backends.push(backend("a", "not-an-address"));
        config.backends[1].connect_timeout_ms = 0;
        config.limits.acquire_timeout_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::DuplicateBackend("a".into()),
                ValidationError::InvalidAddress {
                    name: "a".into(),
                    address: "not-an-address".into(),
                },
                ValidationError::ZeroConnectTimeout("a".into()),
                ValidationError::ZeroAcquireTimeout,
            ]
        );
    }
}
