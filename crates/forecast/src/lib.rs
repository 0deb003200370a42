//! Campaign forecasting: budget allocation across advertising platforms and
//! benchmark-driven funnel estimates with confidence, explanations, and
//! recommendations.

pub mod allocation;
pub mod confidence;
pub mod engine;
pub mod error;
pub mod explain;
pub mod kpi;
pub mod recommendations;
pub mod report;
pub mod sanity;
pub mod trace;
pub mod validator;
pub mod warning;

pub use allocation::{AllocationEngine, AllocationResult, PlatformAllocation};
pub use confidence::{ConfidenceScorer, ConfidenceScores};
pub use engine::ForecastEngine;
pub use error::{ForecastError, ForecastResult};
pub use explain::{ExplainabilityGenerator, Explanations};
pub use kpi::{KpiEstimate, KpiEstimator, KpiTotals, PlatformKpi, RateOverrides};
pub use recommendations::{RecommendationEngine, RuleContext};
pub use report::{CampaignReport, ReportAssembler};
pub use sanity::{SanityAction, SanityChecker, SanityFinding, SanityOutcome};
pub use trace::{AdjustmentTrace, TraceStep};
pub use validator::{ValidationCode, ValidationErrors, ValidationIssue, ValidationReport, Validator};
pub use warning::{ForecastWarning, WarningKind};
