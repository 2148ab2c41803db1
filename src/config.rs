use crate::data::CleaningConfig;
use crate::features::FeatureConfig;
use crate::ml::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Raw data sources
    #[serde(default)]
    pub data: DataConfig,

    /// Cleaning bounds
    #[serde(default)]
    pub cleaning: CleaningConfig,

    /// Feature engineering constants
    #[serde(default)]
    pub features: FeatureConfig,

    /// Training run parameters
    #[serde(default)]
    pub training: TrainingConfig,

    /// Model registry
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Run tracking store
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Serving behaviour
    #[serde(default)]
    pub serving: ServingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: STUDENT_RISK_)
            .add_source(
                config::Environment::with_prefix("STUDENT_RISK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            data: DataConfig::default(),
            cleaning: CleaningConfig::default(),
            features: FeatureConfig::default(),
            training: TrainingConfig::default(),
            registry: RegistryConfig::default(),
            tracking: TrackingConfig::default(),
            serving: ServingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Year label -> delimited source file
    #[serde(default = "default_sources")]
    pub sources: BTreeMap<String, PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Root directory of the model registry
    #[serde(default = "default_registry_root")]
    pub root: PathBuf,

    /// Registered model identity
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Alias the serving layer resolves
    #[serde(default = "default_production_alias")]
    pub production_alias: String,

    /// Move the production alias to each newly registered version
    #[serde(default = "default_true")]
    pub promote_on_register: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: default_registry_root(),
            model_name: default_model_name(),
            production_alias: default_production_alias(),
            promote_on_register: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Record runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root directory of the tracking store
    #[serde(default = "default_tracking_root")]
    pub root: PathBuf,

    /// Experiment the runs are grouped under
    #[serde(default = "default_experiment")]
    pub experiment: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: default_tracking_root(),
            experiment: default_experiment(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    /// Operational decision threshold on the positive-class probability
    #[serde(default = "default_serving_threshold")]
    pub threshold: f64,

    /// Resolve the production alias when the server starts
    #[serde(default = "default_true")]
    pub load_on_startup: bool,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            threshold: default_serving_threshold(),
            load_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_sources() -> BTreeMap<String, PathBuf> {
    [
        ("2022", "files/PEDE2022.csv"),
        ("2023", "files/PEDE2023.csv"),
        ("2024", "files/PEDE2024.csv"),
    ]
    .into_iter()
    .map(|(year, path)| (year.to_string(), PathBuf::from(path)))
    .collect()
}

fn default_registry_root() -> PathBuf {
    PathBuf::from("./models")
}

fn default_model_name() -> String {
    "student-risk-classifier".to_string()
}

fn default_production_alias() -> String {
    "production".to_string()
}

fn default_tracking_root() -> PathBuf {
    PathBuf::from("./mlruns")
}

fn default_experiment() -> String {
    "student-risk".to_string()
}

fn default_serving_threshold() -> f64 {
    0.40
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "student-risk".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_http_port(), 8000);
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_serving_threshold(), 0.40);
        assert!(default_true());
    }

    #[test]
    fn test_default_sources_cover_three_years() {
        let sources = default_sources();
        assert_eq!(
            sources.keys().cloned().collect::<Vec<_>>(),
            vec!["2022", "2023", "2024"]
        );
    }

    #[test]
    fn test_embedded_defaults_deserialize() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.serving.threshold, 0.40);
        assert_eq!(config.training.eval_threshold, 0.45);
        assert_eq!(config.training.cv_folds, 3);
        assert_eq!(config.registry.production_alias, "production");
        assert_eq!(config.cleaning.min_age, 5.0);
        assert_eq!(config.cleaning.max_age, 30.0);
    }
}
