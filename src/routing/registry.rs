//! Service registry.
//!
//! # Responsibilities
//! - Map logical service names to backend base URLs and timeouts
//! - Own one circuit breaker per service
//!
//! # Design Decisions
//! - Built once at startup, immutable afterwards (thread-safe without locks)
//! - Only the embedded breakers carry mutable state
//! - Explicit unknown-service result rather than a silent default

use std::collections::BTreeMap;
use std::sync::Arc;

use url::Url;

use crate::config::{CircuitBreakerConfig, ServiceConfig, TrafficClass};
use crate::resilience::CircuitBreaker;

/// One backend service.
#[derive(Debug)]
pub struct ServiceEntry {
    pub name: String,
    pub base_url: Url,
    pub timeout_ms: u64,
    pub traffic_class: TrafficClass,
    pub required_permissions: Vec<String>,
    pub breaker: CircuitBreaker,
}

impl ServiceEntry {
    /// Absolute backend URL for `path` (leading slash optional) and `query`.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut target = format!("{base}/{path}");
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        target
    }
}

#[derive(Debug, thiserror::Error)]
#[error("service `{name}` has invalid base url: {source}")]
pub struct RegistryError {
    pub name: String,
    #[source]
    pub source: url::ParseError,
}

/// Static name → service mapping.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Arc<ServiceEntry>>,
}

impl ServiceRegistry {
    pub fn from_config(
        services: &[ServiceConfig],
        default_breaker: &CircuitBreakerConfig,
    ) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for service in services {
            let base_url = Url::parse(&service.base_url).map_err(|source| RegistryError {
                name: service.name.clone(),
                source,
            })?;
            let breaker_config = service.circuit_breaker.as_ref().unwrap_or(default_breaker);

            map.insert(
                service.name.clone(),
                Arc::new(ServiceEntry {
                    name: service.name.clone(),
                    base_url,
                    timeout_ms: service.timeout_ms,
                    traffic_class: service.traffic_class,
                    required_permissions: service.required_permissions.clone(),
                    breaker: CircuitBreaker::new(service.name.clone(), breaker_config),
                }),
            );
        }

        tracing::info!(services = map.len(), "Service registry built");
        Ok(Self { services: map })
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceEntry>> {
        self.services.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServiceEntry>> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    #[test]
    fn test_registry_from_defaults() {
        let config = GatewayConfig::default();
        let registry = ServiceRegistry::from_config(&config.services, &config.circuit_breaker).unwrap();
        assert_eq!(
            registry.names(),
            ["intake", "knowledge", "preferences", "recommendations"]
        );
        assert!(registry.get("billing").is_none());
        assert_eq!(
            registry.get("recommendations").unwrap().traffic_class,
            TrafficClass::Compute
        );
    }

    #[test]
    fn test_target_url() {
        let config = GatewayConfig::default();
        let registry = ServiceRegistry::from_config(&config.services, &config.circuit_breaker).unwrap();
        let intake = registry.get("intake").unwrap();
        assert_eq!(
            intake.target_url("/forms/7", Some("draft=true")),
            "http://127.0.0.1:3001/forms/7?draft=true"
        );
        assert_eq!(intake.target_url("", None), "http://127.0.0.1:3001/");
    }

    #[test]
    fn test_breaker_override() {
        let mut config = GatewayConfig::default();
        config.services[0].circuit_breaker = Some(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        });
        let registry = ServiceRegistry::from_config(&config.services, &config.circuit_breaker).unwrap();

        let intake = registry.get("intake").unwrap();
        intake.breaker.try_acquire().unwrap().failure();
        assert_eq!(intake.breaker.state(), crate::resilience::CircuitStatus::Open);

        let knowledge = registry.get("knowledge").unwrap();
        knowledge.breaker.try_acquire().unwrap().failure();
        assert_eq!(knowledge.breaker.state(), crate::resilience::CircuitStatus::Closed);
    }
}
