//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, coefficients >= 1.0)
//! - Check that enabled subsystems are actually usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use url::Url;

use crate::config::schema::ClientConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    InvalidBaseUrl { value: String, reason: String },
    ZeroValue { field: &'static str },
    CoefficientBelowOne { field: &'static str, value: f64 },
    EmptyValue { field: &'static str },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidBaseUrl { value, reason } => {
                write!(f, "base_url '{}' is not a valid URL: {}", value, reason)
            }
            ValidationError::ZeroValue { field } => {
                write!(f, "{} must be greater than zero", field)
            }
            ValidationError::CoefficientBelowOne { field, value } => {
                write!(f, "{} must be at least 1.0, got {}", field, value)
            }
            ValidationError::EmptyValue { field } => {
                write!(f, "{} must not be empty", field)
            }
        }
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.base_url) {
        Ok(url) if url.cannot_be_a_base() => errors.push(ValidationError::InvalidBaseUrl {
            value: config.base_url.clone(),
            reason: "cannot be used as a base".to_string(),
        }),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidBaseUrl {
            value: config.base_url.clone(),
            reason: e.to_string(),
        }),
    }

    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::ZeroValue { field: "timeouts.request_ms" });
    }
    if config.timeouts.timeout_coefficient < 1.0 {
        errors.push(ValidationError::CoefficientBelowOne {
            field: "timeouts.timeout_coefficient",
            value: config.timeouts.timeout_coefficient,
        });
    }
    if config.retries.backoff_coefficient < 1.0 {
        errors.push(ValidationError::CoefficientBelowOne {
            field: "retries.backoff_coefficient",
            value: config.retries.backoff_coefficient,
        });
    }
    if config.memory_cache.enabled && config.memory_cache.capacity == 0 {
        errors.push(ValidationError::ZeroValue { field: "memory_cache.capacity" });
    }
    if config.disk_cache.enabled && config.disk_cache.path.is_empty() {
        errors.push(ValidationError::EmptyValue { field: "disk_cache.path" });
    }
    if config.concurrency.max_in_flight == 0 {
        errors.push(ValidationError::ZeroValue { field: "concurrency.max_in_flight" });
    }
    if config.observability.upstream_cache_header.is_empty() {
        errors.push(ValidationError::EmptyValue {
            field: "observability.upstream_cache_header",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
