use crate::validator::ValidationErrors;
use campaign_core::CampaignError;
use campaign_registry::RegistryError;
use thiserror::Error;

pub type ForecastResult<T> = Result<T, ForecastError>;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("No eligible platforms for industry `{industry}`")]
    NoEligiblePlatforms { industry: String },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] CampaignError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl From<ValidationErrors> for ForecastError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
