//! Configuration for the HTTP metrics layer
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics collection
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Endpoint path for metrics export
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Record request durations (histograms are the expensive part)
    #[serde(default = "default_enable_histograms")]
    pub enable_histograms: bool,

    /// Paths to exclude from HTTP metrics
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            enable_histograms: default_enable_histograms(),
            excluded_paths: default_excluded_paths(),
        }
    }
}

impl MetricsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with metrics disabled
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Exclude a path from HTTP metrics
    pub fn exclude_path(mut self, path: impl Into<String>) -> Self {
        self.excluded_paths.push(path.into());
        self
    }

    /// Check if a path should be excluded from metrics
    pub fn is_path_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|excluded| {
            // exact match or a sub-path
            path == excluded || path.starts_with(&format!("{}/", excluded))
        })
    }
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    "/metrics".to_string()
}

fn default_enable_histograms() -> bool {
    true
}

fn default_excluded_paths() -> Vec<String> {
    vec!["/health".to_string(), "/metrics".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.endpoint, "/metrics");
        assert!(config.is_path_excluded("/health"));
        assert!(config.is_path_excluded("/metrics"));
        assert!(!config.is_path_excluded("/predict"));
    }

    #[test]
    fn test_prefix_exclusion() {
        let config = MetricsConfig::new().exclude_path("/internal");
        assert!(config.is_path_excluded("/internal/debug"));
        assert!(!config.is_path_excluded("/internally"));
    }

    #[test]
    fn test_disabled() {
        assert!(!MetricsConfig::disabled().enabled);
    }
}
