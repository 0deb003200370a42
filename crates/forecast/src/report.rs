//! Final report composition.

use crate::allocation::AllocationResult;
use crate::confidence::{ConfidenceScorer, ConfidenceScores};
use crate::explain::Explanations;
use crate::kpi::KpiEstimate;
use crate::sanity::{SanityFinding, SanityOutcome};
use crate::trace::AdjustmentTrace;
use crate::warning::{ForecastWarning, WarningKind};
use campaign_core::{BudgetTier, CampaignInput, ForecastConfig, FunnelStage};
use campaign_registry::Registries;
use serde::{Deserialize, Serialize};

/// Output of one forecast. Never mutated after assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub industry: String,
    pub budget: f64,
    pub budget_tier: BudgetTier,
    /// Funnel stages of the selected goals, in goal order.
    pub funnel_focus: Vec<FunnelStage>,
    pub allocation: AllocationResult,
    pub kpis: KpiEstimate,
    pub confidence: ConfidenceScores,
    pub warnings: Vec<ForecastWarning>,
    pub sanity: Vec<SanityFinding>,
    pub explanations: Explanations,
    pub recommendations: Vec<String>,
    pub trace: AdjustmentTrace,
}

impl CampaignReport {
    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &ForecastWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

/// Stage outputs handed to the assembler.
#[derive(Debug, Clone)]
pub struct ReportParts {
    pub allocation: AllocationResult,
    pub kpis: KpiEstimate,
    pub kpi_warnings: Vec<ForecastWarning>,
    pub sanity: SanityOutcome,
    pub explanations: Explanations,
    pub recommendations: Vec<String>,
    pub trace: AdjustmentTrace,
}

pub struct ReportAssembler<'a> {
    registries: &'a Registries,
    config: &'a ForecastConfig,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(registries: &'a Registries, config: &'a ForecastConfig) -> Self {
        Self { registries, config }
    }

    pub fn assemble(&self, input: &CampaignInput, parts: ReportParts) -> CampaignReport {
        let confidence =
            ConfidenceScorer::new(&self.config.confidence).score(&parts.kpis, &parts.sanity);

        let mut warnings = parts.allocation.warnings.clone();
        warnings.extend(parts.kpi_warnings);
        warnings.extend(self.below_optimal_budget(&parts.allocation));
        warnings.extend(parts.sanity.warnings());

        CampaignReport {
            industry: input.industry.clone(),
            budget: parts.allocation.budget,
            budget_tier: parts.allocation.budget_tier,
            funnel_focus: self.funnel_focus(input),
            allocation: parts.allocation,
            kpis: parts.kpis,
            confidence,
            warnings,
            sanity: parts.sanity.findings,
            explanations: parts.explanations,
            recommendations: parts.recommendations,
            trace: parts.trace,
        }
    }

    fn funnel_focus(&self, input: &CampaignInput) -> Vec<FunnelStage> {
        let mut stages = Vec::new();
        for goal in &input.goals {
            if let Some(stage) = self.registries.goal(goal).map(|g| g.funnel_focus) {
                if !stages.contains(&stage) {
                    stages.push(stage);
                }
            }
        }
        stages
    }

    fn below_optimal_budget(&self, allocation: &AllocationResult) -> Vec<ForecastWarning> {
        allocation
            .platforms
            .iter()
            .filter_map(|slice| {
                let info = self.registries.platform(&slice.platform)?;
                (slice.amount < info.optimal_budget.min).then(|| {
                    ForecastWarning::for_platform(
                        WarningKind::BelowOptimalBudget,
                        &slice.platform,
                        format!(
                            "{} receives {:.2}, below its optimal minimum of {:.2}",
                            info.display_name, slice.amount, info.optimal_budget.min
                        ),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationEngine;
    use crate::kpi::{KpiEstimator, RateOverrides};
    use crate::sanity::SanityChecker;
    use campaign_core::Metric;

    fn assemble(input: &CampaignInput) -> CampaignReport {
        let reg = Registries::builtin().unwrap();
        let cfg = ForecastConfig::default();
        let mut trace = AdjustmentTrace::new();
        let allocation = AllocationEngine::new(&reg, &cfg)
            .allocate(input, &mut trace)
            .unwrap();
        let (kpis, kpi_warnings) = KpiEstimator::new(&reg)
            .estimate(input, &allocation, &RateOverrides::new(), &mut trace)
            .unwrap();
        let sanity = SanityChecker::new(&reg, &cfg).check(input, &kpis);
        ReportAssembler::new(&reg, &cfg).assemble(
            input,
            ReportParts {
                allocation,
                kpis,
                kpi_warnings,
                sanity,
                explanations: Explanations::new(),
                recommendations: Vec::new(),
                trace,
            },
        )
    }

    #[test]
    fn test_funnel_focus_dedupes_in_goal_order() {
        let input = CampaignInput::new(
            "تجارة إلكترونية",
            60_000.0,
            vec!["Sales".into(), "Traffic".into(), "Leads".into()],
        );
        let report = assemble(&input);
        assert_eq!(
            report.funnel_focus,
            vec![FunnelStage::Conversion, FunnelStage::Engagement]
        );
    }

    #[test]
    fn test_below_optimal_budget_warning() {
        // LinkedIn's optimal minimum is 8,000.
        let input = CampaignInput::new("تقنية وبرمجيات", 5_000.0, vec!["Leads".into()])
            .with_platforms(vec!["LinkedIn".into(), "Google Search".into()]);
        let report = assemble(&input);
        assert!(report
            .warnings_of(WarningKind::BelowOptimalBudget)
            .any(|w| w.platform.as_deref() == Some("LinkedIn")));
    }

    #[test]
    fn test_sanity_findings_become_warnings_and_lower_confidence() {
        let input = CampaignInput::new("عقارات", 20_000.0, vec!["Awareness".into()])
            .with_platforms(vec!["Meta".into(), "Snapchat".into()]);
        let report = assemble(&input);
        assert_eq!(report.sanity.len(), 1);
        assert_eq!(report.warnings_of(WarningKind::Sanity).count(), 1);
        let snap = report.confidence.platform("Snapchat", Metric::Ctr).unwrap();
        let meta = report.confidence.platform("Meta", Metric::Ctr).unwrap();
        assert!(snap < meta);
    }
}
