//! Range checks of estimated rates against known-good values per
//! (industry, goal).

use crate::kpi::{KpiEstimate, RateOverrides};
use crate::warning::{ForecastWarning, WarningKind};
use campaign_core::{CampaignInput, ForecastConfig, Metric, SanityPolicy};
use campaign_registry::{RateRange, Registries};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Rates the checker compares. CAC is reported but has no expected range.
pub const CHECKED_METRICS: [Metric; 5] = [
    Metric::Ctr,
    Metric::Cpm,
    Metric::Cpc,
    Metric::Cvr,
    Metric::Roas,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanityAction {
    Warned,
    Clamped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanityFinding {
    pub platform: String,
    pub goal: String,
    pub metric: Metric,
    pub value: f64,
    pub expected: RateRange,
    pub deviation_percent: f64,
    pub action: SanityAction,
}

impl SanityFinding {
    pub fn to_warning(&self) -> ForecastWarning {
        let direction = if self.value < self.expected.min {
            "below"
        } else {
            "above"
        };
        let mut message = format!(
            "{} {} of {:.2} is {:.1}% {} the expected range [{}, {}] for {}",
            self.platform,
            self.metric.as_str().to_uppercase(),
            self.value,
            self.deviation_percent,
            direction,
            self.expected.min,
            self.expected.max,
            self.goal
        );
        let kind = match self.action {
            SanityAction::Warned => WarningKind::Sanity,
            SanityAction::Clamped => {
                message.push_str(&format!(
                    "; clamped to {}",
                    self.expected.clamp(self.value)
                ));
                WarningKind::SanityClamped
            }
        };
        ForecastWarning::for_platform(kind, &self.platform, message)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanityOutcome {
    pub findings: Vec<SanityFinding>,
    /// Replacement rates to estimate with under the clamp policy.
    pub overrides: RateOverrides,
}

impl SanityOutcome {
    pub fn warnings(&self) -> Vec<ForecastWarning> {
        self.findings.iter().map(SanityFinding::to_warning).collect()
    }

    /// Whether a finding concerns this (platform, metric).
    pub fn flags(&self, platform: &str, metric: Metric) -> bool {
        self.findings
            .iter()
            .any(|f| f.platform == platform && f.metric == metric)
    }
}

pub struct SanityChecker<'a> {
    registries: &'a Registries,
    config: &'a ForecastConfig,
}

impl<'a> SanityChecker<'a> {
    pub fn new(registries: &'a Registries, config: &'a ForecastConfig) -> Self {
        Self { registries, config }
    }

    pub fn check(&self, input: &CampaignInput, estimate: &KpiEstimate) -> SanityOutcome {
        let threshold = self.config.sanity.flag_threshold_percentage;
        let clamp = self.config.sanity.policy == SanityPolicy::Clamp;
        let mut outcome = SanityOutcome::default();
        let mut seen = BTreeSet::new();

        for goal in input.goals.iter().filter(|g| seen.insert(g.as_str())) {
            let Some(expected) = self.registries.expected_range(&input.industry, goal) else {
                continue;
            };

            for kpi in &estimate.platforms {
                for metric in CHECKED_METRICS {
                    let (Some(range), Some(value)) = (expected.ranges.get(&metric), kpi.rate(metric))
                    else {
                        continue;
                    };
                    if range.contains(value) {
                        continue;
                    }
                    let deviation = range.deviation_percent(value);
                    if deviation <= threshold {
                        continue;
                    }

                    let clamped = clamp
                        && outcome
                            .overrides
                            .insert(&kpi.platform, metric, range.clamp(value));
                    debug!(
                        platform = %kpi.platform,
                        goal = %goal,
                        metric = %metric,
                        value,
                        deviation,
                        clamped,
                        "Estimate outside expected range"
                    );
                    outcome.findings.push(SanityFinding {
                        platform: kpi.platform.clone(),
                        goal: goal.clone(),
                        metric,
                        value,
                        expected: *range,
                        deviation_percent: deviation,
                        action: if clamped {
                            SanityAction::Clamped
                        } else {
                            SanityAction::Warned
                        },
                    });
                }
            }
        }

        outcome
    }
}
