//! Confidence scores per estimated field.
//!
//! A field's score follows the weakest benchmark it was derived from:
//! impressions rest on CPM, clicks on CPM and CTR, conversions on all three
//! funnel rates. Benchmarks taken from the default row count one tier lower,
//! and fields flagged by the sanity checker are penalized.

use crate::kpi::{BenchmarkBasis, KpiEstimate};
use crate::sanity::SanityOutcome;
use campaign_core::config::ConfidenceConfig;
use campaign_core::{ConfidenceTier, Metric};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScores {
    /// Budget-weighted across platforms.
    pub totals: BTreeMap<Metric, f64>,
    pub platforms: BTreeMap<String, BTreeMap<Metric, f64>>,
}

impl ConfidenceScores {
    pub fn total(&self, metric: Metric) -> Option<f64> {
        self.totals.get(&metric).copied()
    }

    pub fn platform(&self, platform: &str, metric: Metric) -> Option<f64> {
        self.platforms.get(platform).and_then(|m| m.get(&metric)).copied()
    }
}

pub struct ConfidenceScorer<'a> {
    config: &'a ConfidenceConfig,
}

impl<'a> ConfidenceScorer<'a> {
    pub fn new(config: &'a ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, estimate: &KpiEstimate, sanity: &SanityOutcome) -> ConfidenceScores {
        let mut scores = ConfidenceScores::default();
        let total_spend: f64 = estimate.platforms.iter().map(|p| p.spend).sum();

        for kpi in &estimate.platforms {
            let mut fields = self.platform_scores(&kpi.basis);
            for (metric, score) in fields.iter_mut() {
                if sanity.flags(&kpi.platform, *metric) {
                    *score *= self.config.sanity_penalty;
                }
            }

            if total_spend > 0.0 {
                let weight = kpi.spend / total_spend;
                for (metric, score) in &fields {
                    *scores.totals.entry(*metric).or_insert(0.0) += score * weight;
                }
            }
            scores.platforms.insert(kpi.platform.clone(), fields);
        }

        if total_spend <= 0.0 {
            for metric in Metric::ALL {
                scores.totals.insert(metric, 0.0);
            }
        }
        scores
    }

    fn platform_scores(&self, basis: &BenchmarkBasis) -> BTreeMap<Metric, f64> {
        let tier = |t: ConfidenceTier| self.tier_score(t, basis.fell_back);
        let cpm = tier(basis.cpm);
        let ctr = tier(basis.ctr);
        let cvr = tier(basis.cvr);
        let clicks = cpm.min(ctr);
        let conversions = clicks.min(cvr);

        BTreeMap::from([
            (Metric::Impressions, cpm),
            (Metric::Cpm, cpm),
            (Metric::Ctr, ctr),
            (Metric::Clicks, clicks),
            (Metric::Cpc, clicks),
            (Metric::Cvr, cvr),
            (Metric::Conversions, conversions),
            (Metric::Roas, conversions.min(tier(basis.roas))),
            (Metric::Cac, conversions.min(tier(basis.cac))),
        ])
    }

    fn tier_score(&self, tier: ConfidenceTier, fell_back: bool) -> f64 {
        let tier = match (tier, fell_back) {
            (ConfidenceTier::High, true) => ConfidenceTier::Medium,
            (ConfidenceTier::Medium, true) | (ConfidenceTier::Low, _) => ConfidenceTier::Low,
            (t, false) => t,
        };
        match tier {
            ConfidenceTier::High => self.config.high,
            ConfidenceTier::Medium => self.config.medium,
            ConfidenceTier::Low => self.config.low,
        }
    }
}
