//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, windows > 0)
//! - Check service names are unique and routable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{CircuitBreakerConfig, GatewayConfig, TrafficClass};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }

    if config.services.is_empty() {
        errors.push(ValidationError::new("services", "at least one service is required"));
    }

    let mut seen = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let field = format!("services[{i}]");

        if service.name.is_empty()
            || !service
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                format!("`{}` must be a non-empty path segment", service.name),
            ));
        }
        if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                format!("duplicate service `{}`", service.name),
            ));
        }

        match Url::parse(&service.base_url) {
            Ok(url) if url.scheme() == "http" && url.host().is_some() => {}
            Ok(url) => errors.push(ValidationError::new(
                format!("{field}.base_url"),
                format!("unsupported base url `{url}` (http only)"),
            )),
            Err(e) => errors.push(ValidationError::new(
                format!("{field}.base_url"),
                format!("invalid url `{}`: {e}", service.base_url),
            )),
        }

        if service.timeout_ms == 0 {
            errors.push(ValidationError::new(format!("{field}.timeout_ms"), "must be > 0"));
        }

        if let Some(breaker) = &service.circuit_breaker {
            validate_breaker(&format!("{field}.circuit_breaker"), breaker, &mut errors);
        }
    }

    validate_breaker("circuit_breaker", &config.circuit_breaker, &mut errors);

    for class in TrafficClass::ALL {
        let profile = config.rate_limit.profile(class);
        let field = format!("rate_limit.{}", class.as_str());
        if profile.window_ms == 0 {
            errors.push(ValidationError::new(format!("{field}.window_ms"), "must be > 0"));
        }
        if profile.max_requests == 0 {
            errors.push(ValidationError::new(format!("{field}.max_requests"), "must be > 0"));
        }
    }
    if config.rate_limit.purge_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.purge_interval_secs", "must be > 0"));
    }

    for (i, key) in config.auth.api_keys.iter().enumerate() {
        if key.key.is_empty() {
            errors.push(ValidationError::new(format!("auth.api_keys[{i}].key"), "must not be empty"));
        }
    }

    if !config.auth.jwt_secret.is_empty() {
        if config.auth.jwt_issuer.is_empty() {
            errors.push(ValidationError::new("auth.jwt_issuer", "required when jwt_secret is set"));
        }
        if config.auth.jwt_audience.is_empty() {
            errors.push(ValidationError::new("auth.jwt_audience", "required when jwt_secret is set"));
        }
        let cookie = &config.auth.session_cookie;
        if cookie.is_empty()
            || !cookie
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            errors.push(ValidationError::new(
                "auth.session_cookie",
                format!("`{cookie}` is not a valid cookie name"),
            ));
        }
    }

    if config.events.buffer_size == 0 {
        errors.push(ValidationError::new("events.buffer_size", "must be > 0"));
    }
    if let Some(url) = &config.events.webhook_url {
        if Url::parse(url).is_err() {
            errors.push(ValidationError::new(
                "events.webhook_url",
                format!("invalid url `{url}`"),
            ));
        }
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be `pretty` or `json`",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_breaker(field: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(format!("{field}.failure_threshold"), "must be > 0"));
    }
    if breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{field}.reset_timeout_ms"), "must be > 0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceConfig;

    fn service(name: &str, base_url: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.into(),
            base_url: base_url.into(),
            timeout_ms: 1000,
            traffic_class: TrafficClass::General,
            required_permissions: vec![],
            circuit_breaker: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_duplicate_and_bad_names() {
        let mut config = GatewayConfig::default();
        config.services = vec![
            service("intake", "http://127.0.0.1:1"),
            service("intake", "http://127.0.0.1:2"),
            service("has/slash", "http://127.0.0.1:3"),
        ];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
    }

    #[test]
    fn test_token_settings_checked_only_with_secret() {
        let mut config = GatewayConfig::default();
        config.auth.jwt_issuer.clear();
        config.auth.session_cookie = "bad cookie".into();
        assert!(validate_config(&config).is_ok());

        config.auth.jwt_secret = "s3cret".into();
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["auth.jwt_issuer", "auth.session_cookie"]);
    }

    #[test]
    fn test_https_base_url_rejected() {
        let mut config = GatewayConfig::default();
        config.services = vec![service("intake", "https://example.com")];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "services[0].base_url");
    }
}
