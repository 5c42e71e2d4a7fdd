use crate::error::{Result, TraderError};
use crate::models::Granularity;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub const ENV_PREFIX: &str = "FXTRADER";
pub const DEFAULT_CONFIG_FILE: &str = "trader.toml";

/// Longest cooldown a configuration may ask for
const MAX_COOLDOWN_DAYS: i64 = 366;

// ============================================================================
// Strategy
// ============================================================================

/// Immutable configuration of one running instance (one instrument)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub instrument: String,
    pub granularity: Granularity,
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Extra bars fetched on top of the lookback so indicators can warm up
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// How many bars short of `lookback + buffer` are still acceptable
    #[serde(default = "default_tolerance")]
    pub tolerance: usize,
    /// Cooldown length in bar periods of `granularity`
    #[serde(default = "default_cooldown_periods")]
    pub cooldown_periods: u32,
    /// Trade size magnitude; the signal's direction picks the sign
    #[serde(default = "default_trade_units")]
    pub trade_units: i64,
    #[serde(default = "default_pip_size")]
    pub pip_size: f64,
    #[serde(default = "default_price_precision")]
    pub price_precision: u32,
    /// Registered indicator stage names, applied in order
    #[serde(default)]
    pub indicators: Vec<String>,
    /// Registered signal function name
    #[serde(default = "default_signal")]
    pub signal: String,
    /// Open-ended indicator/signal parameters
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

fn default_lookback() -> usize {
    17
}
fn default_buffer() -> usize {
    50
}
fn default_tolerance() -> usize {
    10
}
fn default_cooldown_periods() -> u32 {
    10
}
fn default_trade_units() -> i64 {
    1000
}
fn default_pip_size() -> f64 {
    0.0001
}
fn default_price_precision() -> u32 {
    5
}
fn default_signal() -> String {
    "fixed_bracket".to_string()
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            instrument: "EUR_USD".to_string(),
            granularity: Granularity::H1,
            lookback: default_lookback(),
            buffer: default_buffer(),
            tolerance: default_tolerance(),
            cooldown_periods: default_cooldown_periods(),
            trade_units: default_trade_units(),
            pip_size: default_pip_size(),
            price_precision: default_price_precision(),
            indicators: Vec::new(),
            signal: default_signal(),
            params: BTreeMap::new(),
        }
    }
}

impl StrategyConfig {
    /// Number of bars requested per signal check
    pub fn candles_needed(&self) -> usize {
        self.lookback + self.buffer
    }

    /// Fewest complete bars accepted before the tick is treated as data-starved
    pub fn min_bars(&self) -> usize {
        self.candles_needed().saturating_sub(self.tolerance)
    }

    /// Cooldown length, capped at `MAX_COOLDOWN_DAYS` (validation rejects anything longer)
    pub fn cooldown_duration(&self) -> Duration {
        self.checked_cooldown()
            .unwrap_or_else(|| Duration::days(MAX_COOLDOWN_DAYS))
    }

    fn checked_cooldown(&self) -> Option<Duration> {
        i32::try_from(self.cooldown_periods)
            .ok()
            .and_then(|periods| self.granularity.duration().checked_mul(periods))
            .filter(|d| *d <= Duration::days(MAX_COOLDOWN_DAYS))
    }

    pub fn with_param(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Numeric parameter; accepts numbers and numeric strings, `null` reads as absent
    pub fn param_f64(&self, name: &str) -> Option<f64> {
        match self.params.get(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn param_usize(&self, name: &str) -> Option<usize> {
        self.param_f64(name)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as usize)
    }

    pub fn param_bool(&self, name: &str) -> Option<bool> {
        match self.params.get(name)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.instrument.trim().is_empty() {
            return Err(TraderError::InvalidConfig(
                "strategy.instrument must not be empty".to_string(),
            ));
        }
        if self.trade_units <= 0 {
            return Err(TraderError::InvalidConfig(format!(
                "strategy.trade_units is a magnitude and must be positive, got {}",
                self.trade_units
            )));
        }
        if !(self.pip_size.is_finite() && self.pip_size > 0.0) {
            return Err(TraderError::InvalidConfig(format!(
                "strategy.pip_size must be positive, got {}",
                self.pip_size
            )));
        }
        if self.candles_needed() == 0 {
            return Err(TraderError::InvalidConfig(
                "strategy.lookback + strategy.buffer must be positive".to_string(),
            ));
        }
        if self.checked_cooldown().is_none() {
            return Err(TraderError::InvalidConfig(format!(
                "strategy.cooldown_periods ({} x {}) exceeds {} days",
                self.cooldown_periods, self.granularity, MAX_COOLDOWN_DAYS
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_fault_backoff_secs")]
    pub fault_backoff_secs: u64,
    #[serde(default = "default_insufficient_data_backoff_secs")]
    pub insufficient_data_backoff_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// None retries forever
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
    /// Start a cooldown when a held position disappears
    #[serde(default = "default_true")]
    pub cooldown_after_close: bool,
}

fn default_poll_interval_secs() -> u64 {
    60
}
fn default_fault_backoff_secs() -> u64 {
    60
}
fn default_insufficient_data_backoff_secs() -> u64 {
    30
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            fault_backoff_secs: default_fault_backoff_secs(),
            insufficient_data_backoff_secs: default_insufficient_data_backoff_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_consecutive_failures: None,
            cooldown_after_close: true,
        }
    }
}

impl ControllerSettings {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fault_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fault_backoff_secs)
    }

    pub fn insufficient_data_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.insufficient_data_backoff_secs)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Venue
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VenueEnvironment {
    #[default]
    Practice,
    Live,
}

impl VenueEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            VenueEnvironment::Practice => "https://api-fxpractice.oanda.com",
            VenueEnvironment::Live => "https://api-fxtrade.oanda.com",
        }
    }
}

impl std::str::FromStr for VenueEnvironment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "practice" | "demo" => Ok(VenueEnvironment::Practice),
            "live" | "trade" => Ok(VenueEnvironment::Live),
            other => Err(format!("unknown venue environment '{}'", other)),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct VenueSettings {
    #[serde(default)]
    pub environment: VenueEnvironment,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub account_id: String,
    /// Overrides the environment's base URL
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_requests_per_second() -> u32 {
    100
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            environment: VenueEnvironment::default(),
            api_key: String::new(),
            account_id: String::new(),
            base_url: None,
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl fmt::Debug for VenueSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VenueSettings")
            .field("environment", &self.environment)
            .field("api_key", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

impl VenueSettings {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }

    /// Fill credentials from the OANDA_* environment variables when present
    pub fn apply_env_credentials(&mut self) -> Result<()> {
        if let Ok(key) = std::env::var("OANDA_API_KEY") {
            self.api_key = key;
        }
        if let Ok(account) = std::env::var("OANDA_ACCOUNT_ID") {
            self.account_id = account;
        }
        if let Ok(env) = std::env::var("OANDA_ENVIRONMENT") {
            self.environment = env.parse().map_err(TraderError::InvalidConfig)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(TraderError::InvalidConfig(
                "OANDA_API_KEY is not set".to_string(),
            ));
        }
        if self.account_id.trim().is_empty() {
            return Err(TraderError::InvalidConfig(
                "OANDA_ACCOUNT_ID is not set".to_string(),
            ));
        }
        if self.requests_per_second == 0 {
            return Err(TraderError::InvalidConfig(
                "venue.requests_per_second must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Top level
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderConfig {
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub controller: ControllerSettings,
    #[serde(default)]
    pub venue: VenueSettings,
}

/// `FXTRADER__SECTION__KEY` variables; `strategy.indicators` takes a comma-separated list
fn environment_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("strategy.indicators")
}

impl TraderConfig {
    /// Layer the optional TOML file and `FXTRADER__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&file).required(path.is_some()))
            .add_source(environment_source())
            .build()
            .map_err(|e| TraderError::InvalidConfig(e.to_string()))?;

        let mut cfg: TraderConfig = settings
            .try_deserialize()
            .map_err(|e| TraderError::InvalidConfig(e.to_string()))?;
        cfg.venue.apply_env_credentials()?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TraderError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()?;
        self.venue.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_setup() {
        let cfg = StrategyConfig::default();
        assert_eq!(cfg.candles_needed(), 67);
        assert_eq!(cfg.min_bars(), 57);
        assert_eq!(cfg.cooldown_duration(), Duration::hours(10));
    }

    #[test]
    fn test_cooldown_scales_with_granularity() {
        let cfg = StrategyConfig {
            granularity: Granularity::M5,
            cooldown_periods: 3,
            ..Default::default()
        };
        assert_eq!(cfg.cooldown_duration(), Duration::minutes(15));
    }

    #[test]
    fn test_param_accessors() {
        let cfg = StrategyConfig::default()
            .with_param("adx_period", 14)
            .with_param("adx_whipsaw_threshold", "12.5")
            .with_param("use_adx_whipsaw_filter", true)
            .with_param("atr_period", serde_json::Value::Null);

        assert_eq!(cfg.param_usize("adx_period"), Some(14));
        assert_eq!(cfg.param_f64("adx_whipsaw_threshold"), Some(12.5));
        assert_eq!(cfg.param_bool("use_adx_whipsaw_filter"), Some(true));
        assert_eq!(cfg.param_f64("atr_period"), None);
        assert_eq!(cfg.param_f64("missing"), None);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_units = StrategyConfig {
            trade_units: 0,
            ..Default::default()
        };
        assert!(zero_units.validate().is_err());

        let negative_units = StrategyConfig {
            trade_units: -1000,
            ..Default::default()
        };
        assert!(matches!(
            negative_units.validate(),
            Err(TraderError::InvalidConfig(_))
        ));

        let bad_pip = StrategyConfig {
            pip_size: 0.0,
            ..Default::default()
        };
        assert!(bad_pip.validate().is_err());

        assert!(StrategyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let raw = r#"
            [strategy]
            instrument = "USD_JPY"
            granularity = "M15"
            lookback = 160
            pip_size = 0.01
            price_precision = 3
            indicators = ["adx", "atr"]
            signal = "derivative"

            [strategy.params]
            adx_whipsaw_threshold = 12.0
            use_adx_whipsaw_filter = true

            [controller]
            poll_interval_secs = 30
            max_consecutive_failures = 5
        "#;

        let cfg = TraderConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.strategy.instrument, "USD_JPY");
        assert_eq!(cfg.strategy.granularity, Granularity::M15);
        assert_eq!(cfg.strategy.candles_needed(), 210);
        assert_eq!(cfg.strategy.indicators, vec!["adx", "atr"]);
        assert_eq!(cfg.strategy.param_f64("adx_whipsaw_threshold"), Some(12.0));
        assert_eq!(cfg.controller.poll_interval_secs, 30);
        assert_eq!(cfg.controller.fault_backoff_secs, 60);
        assert_eq!(cfg.controller.max_consecutive_failures, Some(5));
        assert!(cfg.controller.cooldown_after_close);
        assert_eq!(cfg.venue.environment, VenueEnvironment::Practice);
    }

    #[test]
    fn test_venue_validation_and_redaction() {
        let venue = VenueSettings {
            api_key: "secret-token".to_string(),
            account_id: "101-001-1234567-001".to_string(),
            ..Default::default()
        };
        assert!(venue.validate().is_ok());
        assert_eq!(venue.base_url(), "https://api-fxpractice.oanda.com");
        assert!(!format!("{:?}", venue).contains("secret-token"));

        assert!(VenueSettings::default().validate().is_err());
    }

    #[test]
    fn test_oversized_cooldown_is_rejected_not_wrapped() {
        let huge = StrategyConfig {
            granularity: Granularity::W,
            cooldown_periods: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(huge.validate(), Err(TraderError::InvalidConfig(_))));
        assert_eq!(huge.cooldown_duration(), Duration::days(MAX_COOLDOWN_DAYS));

        let year = StrategyConfig {
            granularity: Granularity::D,
            cooldown_periods: 366,
            ..Default::default()
        };
        assert!(year.validate().is_ok());
    }

    #[test]
    fn test_indicators_from_environment_list() {
        let mut vars = config::Map::new();
        vars.insert("FXTRADER__STRATEGY__INSTRUMENT".to_string(), "USD_JPY".to_string());
        vars.insert("FXTRADER__STRATEGY__GRANULARITY".to_string(), "M15".to_string());
        vars.insert("FXTRADER__STRATEGY__INDICATORS".to_string(), "adx,atr".to_string());

        let cfg: TraderConfig = config::Config::builder()
            .add_source(environment_source().source(Some(vars)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.strategy.instrument, "USD_JPY");
        assert_eq!(cfg.strategy.indicators, vec!["adx", "atr"]);
    }
}
