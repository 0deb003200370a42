//! Reference tables for campaign forecasting: industry splits, platform
//! benchmarks, goal weights, seasonal/budget-tier/device modifiers,
//! expected ranges, and recommendation rules.

pub mod error;
pub mod model;
pub mod registries;

pub use error::{RegistryError, RegistryResult};
pub use model::{
    BenchmarkEntry, BenchmarkMetric, BudgetTierEntry, DeviceModifier, ExpectedRange, Goal,
    Industry, PlatformInfo, Predicate, RateRange, RecommendationRule, Season,
};
pub use registries::{BenchmarkLookup, Registries, DEFAULT_KEY};
