use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TefasProviderConfig {
    pub base_url: String,
    #[serde(default = "default_max_days_per_request")]
    pub max_days_per_request: u32,
}

fn default_max_days_per_request() -> u32 {
    90
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub tefas: Option<TefasProviderConfig>,
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            tefas: Some(TefasProviderConfig {
                base_url: "https://www.tefas.gov.tr".to_string(),
                max_days_per_request: default_max_days_per_request(),
            }),
            yahoo: Some(YahooProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
        }
    }
}

/// Retry policy applied to every upstream HTTP call.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub attempts: usize,
    /// Delay before the second attempt; doubles on every further attempt
    pub base_delay_ms: u64,
    /// Timeout of a single attempt
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 500,
            timeout_secs: 10,
        }
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RatesConfig {
    /// How many days before a record date a rate may come from
    pub lookback_days: u32,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self { lookback_days: 5 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_supported_currencies")]
    pub supported_currencies: Vec<String>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    pub data_path: Option<String>,
}

fn default_currency() -> String {
    "TRY".to_string()
}

fn default_supported_currencies() -> Vec<String> {
    vec!["TRY".to_string(), "USD".to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            supported_currencies: default_supported_currencies(),
            providers: ProvidersConfig::default(),
            retry: RetryConfig::default(),
            rates: RatesConfig::default(),
            data_path: None,
        }
    }
}

impl AppConfig {
    /// Loads the config at the default location, or the defaults if none exists yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "fundcache", "fundcache")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("org", "fundcache", "fundcache")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn is_supported_currency(&self, currency: &str) -> bool {
        self.supported_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_empty_document() {
        let config: AppConfig = serde_yaml::from_str("{}").expect("Failed to deserialize");

        assert_eq!(config.currency, "TRY");
        assert_eq!(config.supported_currencies, vec!["TRY", "USD"]);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.rates.lookback_days, 5);
        assert!(config.data_path.is_none());

        let tefas = config.providers.tefas.expect("tefas provider default");
        assert_eq!(tefas.base_url, "https://www.tefas.gov.tr");
        assert_eq!(tefas.max_days_per_request, 90);
        assert_eq!(
            config.providers.yahoo.unwrap().base_url,
            "https://query1.finance.yahoo.com"
        );
    }

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
currency: "USD"
supported_currencies: ["TRY", "USD", "EUR"]
data_path: "/tmp/fundcache"
providers:
  tefas:
    base_url: "http://example.com/tefas"
    max_days_per_request: 30
  yahoo:
    base_url: "http://example.com/yahoo"
retry:
  attempts: 5
  base_delay_ms: 100
rates:
  lookback_days: 3
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.currency, "USD");
        assert!(config.is_supported_currency("eur"));
        assert!(!config.is_supported_currency("GBP"));
        assert_eq!(config.data_path.as_deref(), Some("/tmp/fundcache"));

        let tefas = config.providers.tefas.unwrap();
        assert_eq!(tefas.base_url, "http://example.com/tefas");
        assert_eq!(tefas.max_days_per_request, 30);
        assert_eq!(
            config.providers.yahoo.unwrap().base_url,
            "http://example.com/yahoo"
        );

        // Unset retry keys keep their defaults
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 100);
        assert_eq!(config.retry.timeout_secs, 10);
        assert_eq!(config.rates.lookback_days, 3);
    }

    #[test]
    fn test_default_data_path_prefers_custom_path() {
        let config = AppConfig {
            data_path: Some("/var/lib/fundcache".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(
            config.default_data_path().unwrap(),
            PathBuf::from("/var/lib/fundcache")
        );
    }
}
