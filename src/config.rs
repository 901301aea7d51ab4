//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use axum::http::Method;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{LimiterSettings, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Daily window during which the service is reachable
    #[serde(default)]
    pub access_hours: Option<AccessHours>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Length of the rolling window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Admissions allowed per client within any window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// HTTP methods subject to rate limiting
    #[serde(default = "default_limited_methods")]
    pub limited_methods: Vec<String>,

    /// Idle window sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            limited_methods: default_limited_methods(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW.as_secs()
}

fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

fn default_limited_methods() -> Vec<String> {
    vec!["POST".to_string()]
}

fn default_sweep_interval() -> u64 {
    300
}

impl RateLimitingConfig {
    /// Build validated limiter settings.
    pub fn limiter_settings(&self) -> Result<LimiterSettings> {
        LimiterSettings::new(Duration::from_secs(self.window_secs), self.max_requests)
    }

    /// Parse the configured method names.
    pub fn methods(&self) -> Result<Vec<Method>> {
        self.limited_methods
            .iter()
            .map(|name| {
                Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes()).map_err(|e| {
                    TurnstileError::Config(format!("Invalid HTTP method {:?}: {}", name, e))
                })
            })
            .collect()
    }

    /// How often idle windows are swept.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Daily access window in local time.
///
/// `start_hour` is inclusive and `end_hour` exclusive. A window whose start
/// is after its end wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl AccessHours {
    /// Whether `hour` (0-23) falls inside the window.
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour < self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    fn validate(&self) -> Result<()> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(TurnstileError::Config(format!(
                "access hours must be within 0-23, got {}-{}",
                self.start_hour, self.end_hour
            )));
        }
        if self.start_hour == self.end_hour {
            return Err(TurnstileError::Config(
                "access hours start and end must differ".to_string(),
            ));
        }
        Ok(())
    }
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.limiter_settings()?;
        self.rate_limiting.methods()?;

        if self.rate_limiting.sweep_interval_secs == 0 {
            return Err(TurnstileError::Config(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        if let Some(hours) = &self.access_hours {
            hours.validate()?;
        }

        Ok(())
    }
}
