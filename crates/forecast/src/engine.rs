//! The forecasting pipeline: validate, allocate, estimate, then sanity
//! check, explain and recommend, and assemble the report.

use crate::allocation::{AllocationEngine, AllocationResult};
use crate::error::{ForecastError, ForecastResult};
use crate::explain::{ExplainabilityGenerator, Explanations};
use crate::kpi::{KpiEstimate, KpiEstimator, RateOverrides};
use crate::recommendations::{RecommendationEngine, RuleContext};
use crate::report::{CampaignReport, ReportAssembler, ReportParts};
use crate::sanity::{SanityChecker, SanityOutcome};
use crate::trace::AdjustmentTrace;
use crate::validator::{ValidationReport, Validator};
use crate::warning::ForecastWarning;
use campaign_core::{CampaignInput, ForecastConfig};
use campaign_registry::Registries;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Allocation and first-pass estimate, shared by both execution paths.
struct Estimated {
    allocation: AllocationResult,
    allocation_trace: AdjustmentTrace,
    kpis: KpiEstimate,
    kpi_warnings: Vec<ForecastWarning>,
    trace: AdjustmentTrace,
}

/// Stateless between calls. Registries are shared read-only, so one engine
/// can serve concurrent forecasts.
pub struct ForecastEngine {
    registries: Arc<Registries>,
    config: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(registries: Arc<Registries>, config: ForecastConfig) -> ForecastResult<Self> {
        registries.validate()?;
        config.validate()?;
        info!(
            industries = registries.industries.len(),
            platforms = registries.platforms.len(),
            sanity_policy = ?config.sanity.policy,
            "Forecast engine initialized"
        );
        Ok(Self { registries, config })
    }

    /// Engine over the embedded production tables.
    pub fn builtin(config: ForecastConfig) -> ForecastResult<Self> {
        Self::new(Arc::new(Registries::builtin()?), config)
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn validate(&self, input: &CampaignInput) -> ValidationReport {
        Validator::new(&self.registries, &self.config).validate(input)
    }

    /// Validates, then allocates. Useful for callers that only need the split.
    pub fn allocate(&self, input: &CampaignInput) -> ForecastResult<AllocationResult> {
        self.validate(input).into_result()?;
        AllocationEngine::new(&self.registries, &self.config).allocate(input, &mut AdjustmentTrace::new())
    }

    /// Runs every stage on the calling thread.
    pub fn forecast(&self, input: &CampaignInput) -> ForecastResult<CampaignReport> {
        let started = Instant::now();
        let result = self.estimate(input).map(|est| {
            let sanity = self.sanity(input, &est.kpis);
            let recommendations = self.recommend(input, &est.allocation);
            self.finish(input, est, sanity, None, recommendations)
        });
        self.observe(input, started, result)
    }

    /// Same result as [`forecast`](Self::forecast), with the sanity,
    /// explanation and recommendation stages fanned out to blocking tasks.
    pub async fn forecast_concurrent(
        self: &Arc<Self>,
        input: CampaignInput,
    ) -> ForecastResult<CampaignReport> {
        let started = Instant::now();
        let est = match self.estimate(&input) {
            Ok(est) => est,
            Err(e) => return self.observe(&input, started, Err(e)),
        };
        let input = Arc::new(input);
        let allocation = Arc::new(est.allocation.clone());
        let kpis = Arc::new(est.kpis.clone());

        let sanity = {
            let (engine, input, kpis) = (Arc::clone(self), Arc::clone(&input), Arc::clone(&kpis));
            tokio::task::spawn_blocking(move || engine.sanity(&input, &kpis))
        };
        let explanations = {
            let (engine, allocation, kpis) =
                (Arc::clone(self), Arc::clone(&allocation), Arc::clone(&kpis));
            let trace = est.trace.clone();
            tokio::task::spawn_blocking(move || engine.explain(&trace, &allocation, &kpis))
        };
        let recommendations = {
            let (engine, input, allocation) =
                (Arc::clone(self), Arc::clone(&input), Arc::clone(&allocation));
            tokio::task::spawn_blocking(move || engine.recommend(&input, &allocation))
        };

        let joined = tokio::try_join!(sanity, explanations, recommendations)
            .map_err(|e| ForecastError::Worker(e.to_string()));
        let result = joined.map(|(sanity, explanations, recommendations)| {
            self.finish(&input, est, sanity, Some(explanations), recommendations)
        });
        self.observe(&input, started, result)
    }

    fn estimate(&self, input: &CampaignInput) -> ForecastResult<Estimated> {
        metrics::counter!("forecast.requests").increment(1);
        let report = self.validate(input);
        if !report.is_valid {
            metrics::counter!("forecast.rejected").increment(1);
            debug!(errors = report.errors.len(), "Input rejected");
        }
        report.into_result()?;

        let mut allocation_trace = AdjustmentTrace::new();
        let allocation = AllocationEngine::new(&self.registries, &self.config)
            .allocate(input, &mut allocation_trace)?;

        let mut trace = allocation_trace.clone();
        let (kpis, kpi_warnings) = KpiEstimator::new(&self.registries).estimate(
            input,
            &allocation,
            &RateOverrides::new(),
            &mut trace,
        )?;

        Ok(Estimated {
            allocation,
            allocation_trace,
            kpis,
            kpi_warnings,
            trace,
        })
    }

    fn sanity(&self, input: &CampaignInput, kpis: &KpiEstimate) -> SanityOutcome {
        SanityChecker::new(&self.registries, &self.config).check(input, kpis)
    }

    fn explain(
        &self,
        trace: &AdjustmentTrace,
        allocation: &AllocationResult,
        kpis: &KpiEstimate,
    ) -> Explanations {
        ExplainabilityGenerator::new(&self.config).explain(trace, allocation, kpis)
    }

    fn recommend(&self, input: &CampaignInput, allocation: &AllocationResult) -> Vec<String> {
        RecommendationEngine::new(&self.registries.recommendations).recommend(&RuleContext {
            input,
            allocation: Some(allocation),
            tier: allocation.budget_tier,
        })
    }

    /// Applies clamp overrides if any, renders explanations from the final
    /// trace when not already rendered, and assembles the report.
    fn finish(
        &self,
        input: &CampaignInput,
        est: Estimated,
        sanity: SanityOutcome,
        explanations: Option<Explanations>,
        recommendations: Vec<String>,
    ) -> CampaignReport {
        let Estimated {
            allocation,
            allocation_trace,
            mut kpis,
            mut kpi_warnings,
            mut trace,
        } = est;
        let mut explanations = explanations;

        if !sanity.overrides.is_empty() {
            let mut clamped_trace = allocation_trace;
            match KpiEstimator::new(&self.registries).estimate(
                input,
                &allocation,
                &sanity.overrides,
                &mut clamped_trace,
            ) {
                Ok((clamped, warnings)) => {
                    debug!(overrides = sanity.overrides.len(), "Estimate re-run with clamped rates");
                    kpis = clamped;
                    kpi_warnings = warnings;
                    trace = clamped_trace;
                    explanations = None;
                }
                Err(e) => warn!(error = %e, "Clamped re-estimate failed, keeping unclamped rates"),
            }
        }
        let explanations =
            explanations.unwrap_or_else(|| self.explain(&trace, &allocation, &kpis));

        ReportAssembler::new(&self.registries, &self.config).assemble(
            input,
            ReportParts {
                allocation,
                kpis,
                kpi_warnings,
                sanity,
                explanations,
                recommendations,
                trace,
            },
        )
    }

    fn observe(
        &self,
        input: &CampaignInput,
        started: Instant,
        result: ForecastResult<CampaignReport>,
    ) -> ForecastResult<CampaignReport> {
        match &result {
            Ok(report) => {
                metrics::counter!("forecast.sanity_warnings").increment(report.sanity.len() as u64);
                metrics::histogram!("forecast.latency_us")
                    .record(started.elapsed().as_micros() as f64);
                info!(
                    industry = %input.industry,
                    budget = report.budget,
                    platforms = report.allocation.platforms.len(),
                    warnings = report.warnings.len(),
                    "Forecast completed"
                );
            }
            Err(ForecastError::NoEligiblePlatforms { industry }) => {
                metrics::counter!("forecast.no_eligible_platforms").increment(1);
                warn!(industry = %industry, "No eligible platforms");
            }
            Err(e) => debug!(error = %e, "Forecast failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationCode;
    use campaign_core::config::SanityConfig;
    use campaign_core::{Metric, SanityPolicy};

    fn engine(config: ForecastConfig) -> ForecastEngine {
        ForecastEngine::builtin(config).unwrap()
    }

    fn real_estate_awareness() -> CampaignInput {
        CampaignInput::new("عقارات", 20_000.0, vec!["Awareness".into()])
            .with_platforms(vec!["Meta".into(), "Snapchat".into()])
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ForecastConfig {
            discourage_penalty: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            ForecastEngine::builtin(config),
            Err(ForecastError::Config(_))
        ));
    }

    #[test]
    fn test_validation_halts_pipeline() {
        let input = CampaignInput::new("تجارة إلكترونية", 500.0, vec![])
            .with_platforms(vec!["UnknownPlatform".into()]);
        match engine(ForecastConfig::default()).forecast(&input) {
            Err(ForecastError::Validation(errors)) => {
                assert_eq!(errors.issues().len(), 3);
                assert!(errors.has(ValidationCode::BudgetTooLow));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_allocate_validates_first() {
        let input = CampaignInput::new("غير معروف", 20_000.0, vec!["Sales".into()]);
        assert!(matches!(
            engine(ForecastConfig::default()).allocate(&input),
            Err(ForecastError::Validation(_))
        ));
    }

    #[test]
    fn test_forecast_is_idempotent() {
        let engine = engine(ForecastConfig::default());
        let input = real_estate_awareness().with_season("Ramadan");
        let a = engine.forecast(&input).unwrap();
        let b = engine.forecast(&input).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_clamp_policy_reestimates() {
        let config = ForecastConfig {
            sanity: SanityConfig {
                policy: SanityPolicy::Clamp,
                ..Default::default()
            },
            ..Default::default()
        };
        let clamped = engine(config).forecast(&real_estate_awareness()).unwrap();
        let warned = engine(ForecastConfig::default())
            .forecast(&real_estate_awareness())
            .unwrap();

        let snap = clamped.kpis.get("Snapchat").unwrap();
        assert!((snap.ctr - 0.8).abs() < 1e-12);
        assert!(snap.clicks > warned.kpis.get("Snapchat").unwrap().clicks);
        assert!(clamped.explanations["ctr"].contains("clamped"));
        assert!(clamped
            .trace
            .iter()
            .any(|s| matches!(s, crate::trace::TraceStep::Clamped { metric: Metric::Ctr, .. })));
        assert!(!warned.explanations["ctr"].contains("clamped"));
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let engine = Arc::new(engine(ForecastConfig::default()));
        let input = CampaignInput::new(
            "تجارة إلكترونية",
            100_000.0,
            vec!["Sales".into(), "Traffic".into()],
        )
        .with_platforms(vec!["Meta".into(), "Google Search".into(), "TikTok".into()]);
        let sequential = engine.forecast(&input).unwrap();
        let concurrent = engine.forecast_concurrent(input).await.unwrap();
        assert_eq!(sequential, concurrent);
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential_under_clamp() {
        let config = ForecastConfig {
            sanity: SanityConfig {
                policy: SanityPolicy::Clamp,
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = Arc::new(engine(config));
        let sequential = engine.forecast(&real_estate_awareness()).unwrap();
        let concurrent = engine
            .forecast_concurrent(real_estate_awareness())
            .await
            .unwrap();
        assert_eq!(sequential, concurrent);
    }
}
