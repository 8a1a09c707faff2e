//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check paths and URLs are usable as routes and upstreams
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address \"{value}\"")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field}: path must start with '/', got \"{value}\"")]
    InvalidPath { field: &'static str, value: String },

    #[error("relay.upstream: {reason} (\"{value}\")")]
    InvalidUpstream { value: String, reason: String },

    #[error("observability.log_level: invalid filter \"{0}\"")]
    InvalidLogLevel(String),
}

/// Check a deserialized configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "relay.bind_address", &config.relay.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::NotPositive {
            field: "listener.max_connections",
        });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::NotPositive {
            field: "timeouts.request_secs",
        });
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::NotPositive {
            field: "timeouts.connect_secs",
        });
    }

    check_path(&mut errors, "streaming.path", &config.streaming.path, false);
    check_path(&mut errors, "relay.prefix", &config.relay.prefix, true);
    for prefix in &config.relay.compression.skip_prefixes {
        check_path(&mut errors, "relay.compression.skip_prefixes", prefix, false);
    }

    match url::Url::parse(&config.relay.upstream) {
        Ok(url) if url.scheme() != "http" => errors.push(ValidationError::InvalidUpstream {
            value: config.relay.upstream.clone(),
            reason: format!("unsupported scheme {}", url.scheme()),
        }),
        Ok(url) if url.host_str().is_none() => errors.push(ValidationError::InvalidUpstream {
            value: config.relay.upstream.clone(),
            reason: "missing host".to_string(),
        }),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidUpstream {
            value: config.relay.upstream.clone(),
            reason: e.to_string(),
        }),
    }

    if tracing_subscriber::EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &'static str, value: &str, allow_empty: bool) {
    if value.is_empty() && allow_empty {
        return;
    }
    if !value.starts_with('/') || (value.len() > 1 && value.ends_with('/')) {
        errors.push(ValidationError::InvalidPath {
            field,
            value: value.to_string(),
        });
    }
}
