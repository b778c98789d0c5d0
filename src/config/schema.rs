//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend services reachable through `/api/gateway/{name}`.
    pub services: Vec<ServiceConfig>,

    /// Rate limiting profiles.
    pub rate_limit: RateLimitConfig,

    /// Default circuit breaker settings, overridable per service.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Credential verification.
    pub auth: AuthConfig,

    /// Lifecycle event publishing.
    pub events: EventsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub security: SecurityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            services: default_services(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            auth: AuthConfig::default(),
            events: EventsConfig::default(),
            observability: ObservabilityConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// The strategy platform's own services.
fn default_services() -> Vec<ServiceConfig> {
    [
        ("intake", "http://127.0.0.1:3001", TrafficClass::General),
        ("knowledge", "http://127.0.0.1:3002", TrafficClass::General),
        ("preferences", "http://127.0.0.1:3003", TrafficClass::General),
        ("recommendations", "http://127.0.0.1:3004", TrafficClass::Compute),
    ]
    .into_iter()
    .map(|(name, base_url, traffic_class)| ServiceConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        timeout_ms: default_service_timeout_ms(),
        traffic_class,
        required_permissions: Vec::new(),
        circuit_breaker: None,
    })
    .collect()
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A logical backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Name used in the gateway path.
    pub name: String,

    /// Backend base URL (e.g., "http://127.0.0.1:3001").
    pub base_url: String,

    /// Deadline for a single forwarded call.
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,

    /// Rate limiting profile applied to this service.
    #[serde(default)]
    pub traffic_class: TrafficClass,

    /// Permissions a principal must hold to call this service.
    #[serde(default)]
    pub required_permissions: Vec<String>,

    /// Per-service breaker override.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

fn default_service_timeout_ms() -> u64 {
    30_000
}

/// Traffic classes with independent rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficClass {
    #[default]
    General,
    Auth,
    Webhook,
    Compute,
}

impl TrafficClass {
    pub const ALL: [TrafficClass; 4] = [
        TrafficClass::General,
        TrafficClass::Auth,
        TrafficClass::Webhook,
        TrafficClass::Compute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficClass::General => "general",
            TrafficClass::Auth => "auth",
            TrafficClass::Webhook => "webhook",
            TrafficClass::Compute => "compute",
        }
    }
}

/// How a limiter turns a request into a bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Client IP plus user-agent.
    #[default]
    Fingerprint,
    /// Client IP only.
    Ip,
    /// One shared bucket named after the traffic class.
    Fixed,
}

/// A single fixed-window limiter profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitProfile {
    pub window_ms: u64,
    pub max_requests: u32,
    #[serde(default)]
    pub key: KeyStrategy,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// How often expired windows are swept.
    pub purge_interval_secs: u64,

    pub general: RateLimitProfile,
    pub auth: RateLimitProfile,
    pub webhook: RateLimitProfile,
    pub compute: RateLimitProfile,
}

impl RateLimitConfig {
    pub fn profile(&self, class: TrafficClass) -> &RateLimitProfile {
        match class {
            TrafficClass::General => &self.general,
            TrafficClass::Auth => &self.auth,
            TrafficClass::Webhook => &self.webhook,
            TrafficClass::Compute => &self.compute,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            purge_interval_secs: 60,
            general: RateLimitProfile {
                window_ms: 15 * 60 * 1000,
                max_requests: 100,
                key: KeyStrategy::Fingerprint,
            },
            auth: RateLimitProfile {
                window_ms: 15 * 60 * 1000,
                max_requests: 5,
                key: KeyStrategy::Fingerprint,
            },
            webhook: RateLimitProfile {
                window_ms: 60 * 1000,
                max_requests: 100,
                key: KeyStrategy::Fixed,
            },
            compute: RateLimitProfile {
                window_ms: 60 * 1000,
                max_requests: 10,
                key: KeyStrategy::Fingerprint,
            },
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// Time the breaker stays open before admitting a trial request.
    pub reset_timeout_ms: u64,

    /// Count backend 5xx responses as failures.
    pub count_server_errors: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            count_server_errors: true,
        }
    }
}

/// Role granted to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Service,
    Admin,
}

/// A static API key and the identity it grants.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub subject: String,
    #[serde(default = "default_api_key_role")]
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn default_api_key_role() -> Role {
    Role::Service
}

/// Credential verification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_keys: Vec<ApiKeyConfig>,

    /// HS256 secret for bearer and session tokens. Empty disables both.
    pub jwt_secret: String,

    pub jwt_issuer: String,

    pub jwt_audience: String,

    /// Clock skew tolerated on `exp`.
    pub leeway_secs: u64,

    /// Cookie carrying a session token.
    pub session_cookie: String,

    /// Backend paths that skip authentication.
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            jwt_secret: String::new(),
            jwt_issuer: "strategy-platform".to_string(),
            jwt_audience: "strategy-gateway".to_string(),
            leeway_secs: 0,
            session_cookie: "session".to_string(),
            public_paths: vec![
                "/health".to_string(),
                "/status".to_string(),
                "/metrics".to_string(),
            ],
        }
    }
}

/// Lifecycle event publishing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub enabled: bool,

    /// Queue depth before events are dropped.
    pub buffer_size: usize,

    /// Optional endpoint receiving every event as JSON.
    pub webhook_url: Option<String>,

    pub webhook_timeout_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 1024,
            webhook_url: None,
            webhook_timeout_ms: 2_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
