use crate::error::{CampaignError, CampaignResult};
use crate::types::Locale;
use serde::Deserialize;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `CAMPAIGN_FORECAST__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    /// Smallest accepted total budget, inclusive.
    #[serde(default = "default_min_budget")]
    pub min_budget: f64,
    /// Digits of the currency's minor unit (2 = cents/halalas).
    #[serde(default = "default_currency_decimals")]
    pub currency_decimals: u32,
    /// ISO code printed next to amounts in explanations and tables.
    #[serde(default = "default_currency_code")]
    pub currency_code: String,
    /// Multiplier applied to platforms discouraged for the industry.
    #[serde(default = "default_discourage_penalty")]
    pub discourage_penalty: f64,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default)]
    pub sanity: SanityConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
}

/// What the sanity checker does with an out-of-range estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanityPolicy {
    #[default]
    Warn,
    Clamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SanityConfig {
    #[serde(default = "default_flag_threshold_percentage")]
    pub flag_threshold_percentage: f64,
    #[serde(default)]
    pub policy: SanityPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_high_score")]
    pub high: f64,
    #[serde(default = "default_medium_score")]
    pub medium: f64,
    #[serde(default = "default_low_score")]
    pub low: f64,
    /// Multiplier applied to a field's confidence when a sanity check flagged it.
    #[serde(default = "default_sanity_penalty")]
    pub sanity_penalty: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    /// JSON file replacing the built-in reference tables.
    #[serde(default)]
    pub path: Option<String>,
}

// Default functions
fn default_min_budget() -> f64 {
    1000.0
}
fn default_currency_decimals() -> u32 {
    2
}
fn default_currency_code() -> String {
    "SAR".to_string()
}
fn default_discourage_penalty() -> f64 {
    0.5
}
fn default_flag_threshold_percentage() -> f64 {
    30.0
}
fn default_high_score() -> f64 {
    0.9
}
fn default_medium_score() -> f64 {
    0.7
}
fn default_low_score() -> f64 {
    0.5
}
fn default_sanity_penalty() -> f64 {
    0.75
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_budget: default_min_budget(),
            currency_decimals: default_currency_decimals(),
            currency_code: default_currency_code(),
            discourage_penalty: default_discourage_penalty(),
            locale: Locale::default(),
            sanity: SanityConfig::default(),
            confidence: ConfidenceConfig::default(),
        }
    }
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            flag_threshold_percentage: default_flag_threshold_percentage(),
            policy: SanityPolicy::default(),
        }
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            high: default_high_score(),
            medium: default_medium_score(),
            low: default_low_score(),
            sanity_penalty: default_sanity_penalty(),
        }
    }
}

impl ForecastConfig {
    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> CampaignResult<()> {
        if !self.min_budget.is_finite() || self.min_budget < 0.0 {
            return Err(CampaignError::Config(format!(
                "min_budget must be a non-negative number, got {}",
                self.min_budget
            )));
        }
        if self.currency_decimals > 6 {
            return Err(CampaignError::Config(format!(
                "currency_decimals must be at most 6, got {}",
                self.currency_decimals
            )));
        }
        if !(self.discourage_penalty > 0.0 && self.discourage_penalty < 1.0) {
            return Err(CampaignError::Config(format!(
                "discourage_penalty must be in (0, 1), got {}",
                self.discourage_penalty
            )));
        }
        if !(self.sanity.flag_threshold_percentage >= 0.0) {
            return Err(CampaignError::Config(
                "sanity.flag_threshold_percentage must be non-negative".to_string(),
            ));
        }
        let c = &self.confidence;
        for (name, v) in [
            ("high", c.high),
            ("medium", c.medium),
            ("low", c.low),
            ("sanity_penalty", c.sanity_penalty),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(CampaignError::Config(format!(
                    "confidence.{name} must be within [0, 1], got {v}"
                )));
            }
        }
        Ok(())
    }

    /// Scale factor between currency units and minor units.
    pub fn minor_unit_scale(&self) -> f64 {
        10f64.powi(self.currency_decimals as i32)
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file and environment variables.
    pub fn load(path: Option<&str>) -> CampaignResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("CAMPAIGN_FORECAST")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.forecast.validate()?;
        Ok(config)
    }
}
