//! API configuration.

use std::time::Duration;

use subflow_models::{PlanCatalog, DEFAULT_TRIAL_CREDITS};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Shared secret expected in the webhook `Authorization` header
    pub webhook_auth_token: Option<String>,
    /// Bearer token protecting the internal credit endpoints
    pub internal_api_token: Option<String>,
    /// RevenueCat entitlement identifier tracked by this service
    pub entitlement_id: String,
    /// Credits granted when a trial starts
    pub trial_credits: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MB, webhook payloads are small
            environment: "development".to_string(),
            webhook_auth_token: None,
            internal_api_token: None,
            entitlement_id: "premium".to_string(),
            trial_credits: DEFAULT_TRIAL_CREDITS,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            rate_limit_burst: std::env::var("RATE_LIMIT_BURST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            webhook_auth_token: std::env::var("REVENUECAT_WEBHOOK_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            internal_api_token: std::env::var("INTERNAL_API_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            entitlement_id: std::env::var("ENTITLEMENT_ID")
                .unwrap_or_else(|_| "premium".to_string()),
            trial_credits: std::env::var("TRIAL_CREDITS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TRIAL_CREDITS),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Plan catalog derived from this configuration.
    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanCatalog {
            trial_credits: self.trial_credits,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.entitlement_id, "premium");
        assert_eq!(config.trial_credits, DEFAULT_TRIAL_CREDITS);
        assert!(config.webhook_auth_token.is_none());
        assert!(!config.is_production());
    }

    #[test]
    fn test_production_detection() {
        let config = ApiConfig {
            environment: "Production".to_string(),
            ..Default::default()
        };
        assert!(config.is_production());
    }
}
