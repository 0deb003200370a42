pub mod config;
pub mod error;
pub mod format;
pub mod types;

pub use config::{AppConfig, ForecastConfig, SanityPolicy};
pub use error::{CampaignError, CampaignResult};
pub use types::{
    BudgetTier, CampaignInput, Compatibility, ConfidenceTier, FunnelStage, Locale, Metric,
};
