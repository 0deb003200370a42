//! Funnel estimation from allocated spend and benchmark rates.

use crate::allocation::AllocationResult;
use crate::error::{ForecastError, ForecastResult};
use crate::trace::{AdjustmentTrace, TraceStep};
use crate::validator::{ValidationErrors, ValidationIssue};
use crate::warning::{ForecastWarning, WarningKind};
use campaign_core::types::DEVICE_ALL;
use campaign_core::{CampaignInput, ConfidenceTier, Metric};
use campaign_registry::{BenchmarkEntry, RegistryError, Registries};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Confidence tiers of the benchmark values a platform's estimate rests on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkBasis {
    /// The industry had no benchmark row for the platform.
    pub fell_back: bool,
    pub cpm: ConfidenceTier,
    pub ctr: ConfidenceTier,
    pub cvr: ConfidenceTier,
    pub roas: ConfidenceTier,
    pub cac: ConfidenceTier,
}

impl BenchmarkBasis {
    fn from_entry(entry: &BenchmarkEntry, fell_back: bool) -> Self {
        Self {
            fell_back,
            cpm: entry.cpm.confidence,
            ctr: entry.ctr.confidence,
            cvr: entry.cvr.confidence,
            roas: entry.roas.confidence,
            cac: entry.cac.confidence,
        }
    }
}

/// Estimate for one platform. CTR and CVR are percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformKpi {
    pub platform: String,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub cpm: f64,
    pub ctr: f64,
    pub cvr: f64,
    /// `None` when no clicks are expected.
    pub cpc: Option<f64>,
    pub revenue: f64,
    pub roas: f64,
    /// `None` when no conversions are expected.
    pub cac: Option<f64>,
    pub basis: BenchmarkBasis,
}

impl PlatformKpi {
    /// Value of a rate metric, as compared against expected ranges.
    pub fn rate(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Cpm => Some(self.cpm),
            Metric::Ctr => Some(self.ctr),
            Metric::Cvr => Some(self.cvr),
            Metric::Cpc => self.cpc,
            Metric::Roas => Some(self.roas),
            Metric::Cac => self.cac,
            Metric::Impressions | Metric::Clicks | Metric::Conversions => None,
        }
    }
}

/// Campaign totals. Ratios flow through from the summed counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiTotals {
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub cpm: f64,
    pub ctr: f64,
    pub cvr: f64,
    pub cpc: Option<f64>,
    pub revenue: f64,
    pub roas: f64,
    pub cac: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiEstimate {
    /// Same order as the allocation.
    pub platforms: Vec<PlatformKpi>,
    pub totals: KpiTotals,
}

impl KpiEstimate {
    pub fn get(&self, platform: &str) -> Option<&PlatformKpi> {
        self.platforms.iter().find(|p| p.platform == platform)
    }
}

/// Replacement rates for specific platforms, produced by the clamp policy.
/// Only CPM, CTR and CVR feed the funnel and can be overridden.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateOverrides {
    rates: BTreeMap<String, BTreeMap<Metric, f64>>,
}

impl RateOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_overridable(metric: Metric) -> bool {
        matches!(metric, Metric::Cpm | Metric::Ctr | Metric::Cvr)
    }

    /// Keeps the first override recorded for a (platform, metric) pair.
    /// Returns whether this one was stored.
    pub fn insert(&mut self, platform: &str, metric: Metric, value: f64) -> bool {
        if !Self::is_overridable(metric) {
            return false;
        }
        let rates = self.rates.entry(platform.to_string()).or_default();
        if rates.contains_key(&metric) {
            return false;
        }
        rates.insert(metric, value);
        true
    }

    pub fn get(&self, platform: &str, metric: Metric) -> Option<f64> {
        self.rates.get(platform).and_then(|r| r.get(&metric)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.values().all(BTreeMap::is_empty)
    }

    pub fn len(&self) -> usize {
        self.rates.values().map(BTreeMap::len).sum()
    }
}

// ---------------------------------------------------------------------------
// KpiEstimator
// ---------------------------------------------------------------------------

/// Season and device adjustments shared by every platform of a request.
#[derive(Debug, Clone, Copy)]
struct RateModifiers {
    cpm: f64,
    ctr: f64,
    cvr: f64,
}

pub struct KpiEstimator<'a> {
    registries: &'a Registries,
}

impl<'a> KpiEstimator<'a> {
    pub fn new(registries: &'a Registries) -> Self {
        Self { registries }
    }

    /// Pure function of the allocation, the registries, and the request's
    /// season and device mix. Overrides replace individual adjusted rates.
    pub fn estimate(
        &self,
        input: &CampaignInput,
        allocation: &AllocationResult,
        overrides: &RateOverrides,
        trace: &mut AdjustmentTrace,
    ) -> ForecastResult<(KpiEstimate, Vec<ForecastWarning>)> {
        let industry = self.registries.industry(&input.industry).ok_or_else(|| {
            ForecastError::Validation(ValidationErrors(vec![ValidationIssue::unknown_industry(
                &input.industry,
            )]))
        })?;
        let value_per_conversion = industry.value_per_conversion;
        let modifiers = self.modifiers(input, trace);
        trace.push(TraceStep::ConversionValue {
            value: value_per_conversion,
        });

        let mut warnings = Vec::new();
        let mut platforms = Vec::with_capacity(allocation.platforms.len());

        for slice in &allocation.platforms {
            let lookup = self
                .registries
                .benchmark(&input.industry, &slice.platform)
                .ok_or_else(|| {
                    ForecastError::Registry(RegistryError::Invalid(format!(
                        "no benchmark for platform `{}`",
                        slice.platform
                    )))
                })?;
            trace.push(TraceStep::BenchmarkSource {
                platform: slice.platform.clone(),
                fell_back: lookup.fell_back,
            });
            if lookup.fell_back {
                warn!(
                    industry = %input.industry,
                    platform = %slice.platform,
                    "No industry benchmark, using default row"
                );
                warnings.push(ForecastWarning::for_platform(
                    WarningKind::BenchmarkMissing,
                    &slice.platform,
                    format!(
                        "No {} benchmark for {}; default benchmarks were used",
                        input.industry, slice.platform
                    ),
                ));
            }

            let entry = lookup.entry;
            let mut rate = |metric: Metric, computed: f64| match overrides
                .get(&slice.platform, metric)
            {
                Some(to) => {
                    trace.push(TraceStep::Clamped {
                        platform: slice.platform.clone(),
                        metric,
                        from: computed,
                        to,
                    });
                    to
                }
                None => computed,
            };
            let cpm = rate(Metric::Cpm, entry.cpm.value * modifiers.cpm);
            let ctr = rate(Metric::Ctr, entry.ctr.value * modifiers.ctr);
            let cvr = rate(Metric::Cvr, entry.cvr.value * modifiers.cvr);

            platforms.push(Self::funnel(
                &slice.platform,
                slice.amount,
                cpm,
                ctr,
                cvr,
                value_per_conversion,
                BenchmarkBasis::from_entry(entry, lookup.fell_back),
            ));
        }

        let totals = Self::totals(&platforms);
        debug!(
            industry = %input.industry,
            impressions = totals.impressions,
            clicks = totals.clicks,
            conversions = totals.conversions,
            "KPIs estimated"
        );

        Ok((KpiEstimate { platforms, totals }, warnings))
    }

    fn modifiers(&self, input: &CampaignInput, trace: &mut AdjustmentTrace) -> RateModifiers {
        let mut modifiers = RateModifiers {
            cpm: 1.0,
            ctr: 1.0,
            cvr: 1.0,
        };

        if let Some((name, season)) = input
            .season
            .as_deref()
            .and_then(|s| self.registries.season(s).map(|entry| (s, entry)))
        {
            modifiers.cpm = season.cpm_modifier;
            modifiers.ctr = season.ctr_modifier;
            modifiers.cvr = season.cvr_modifier;
            trace.push(TraceStep::SeasonRates {
                season: name.to_string(),
                cpm: season.cpm_modifier,
                ctr: season.ctr_modifier,
                cvr: season.cvr_modifier,
            });
        }

        // Share-weighted device blend; no usable mix means the neutral device.
        let mix: Vec<(&str, f64)> = input
            .device_mix
            .iter()
            .flatten()
            .filter(|(device, share)| **share > 0.0 && self.registries.device(device).is_some())
            .map(|(device, share)| (device.as_str(), *share))
            .collect();
        let total: f64 = mix.iter().map(|(_, s)| s).sum();
        let (devices, ctr_mod, cvr_mod) = if mix.is_empty() || !(total > 0.0) {
            let all = self.registries.device(DEVICE_ALL);
            (
                vec![DEVICE_ALL.to_string()],
                all.map(|d| d.ctr_mod).unwrap_or(1.0),
                all.map(|d| d.cvr_mod).unwrap_or(1.0),
            )
        } else {
            let mut ctr_mod = 0.0;
            let mut cvr_mod = 0.0;
            for (device, share) in &mix {
                if let Some(m) = self.registries.device(device) {
                    ctr_mod += m.ctr_mod * share / total;
                    cvr_mod += m.cvr_mod * share / total;
                }
            }
            (
                mix.iter().map(|(d, _)| d.to_string()).collect(),
                ctr_mod,
                cvr_mod,
            )
        };
        trace.push(TraceStep::DeviceMix {
            devices,
            ctr_mod,
            cvr_mod,
        });

        modifiers.ctr *= ctr_mod;
        modifiers.cvr *= cvr_mod;
        modifiers
    }

    fn funnel(
        platform: &str,
        spend: f64,
        cpm: f64,
        ctr: f64,
        cvr: f64,
        value_per_conversion: f64,
        basis: BenchmarkBasis,
    ) -> PlatformKpi {
        let impressions = if cpm > 0.0 {
            (spend / cpm * 1000.0).round() as u64
        } else {
            0
        };
        let clicks = (impressions as f64 * ctr / 100.0).round() as u64;
        let conversions = (clicks as f64 * cvr / 100.0).round() as u64;
        let revenue = conversions as f64 * value_per_conversion;

        PlatformKpi {
            platform: platform.to_string(),
            spend,
            impressions,
            clicks,
            conversions,
            cpm,
            ctr,
            cvr,
            cpc: (clicks > 0).then(|| spend / clicks as f64),
            revenue,
            roas: if spend > 0.0 { revenue / spend } else { 0.0 },
            cac: (conversions > 0).then(|| spend / conversions as f64),
            basis,
        }
    }

    fn totals(platforms: &[PlatformKpi]) -> KpiTotals {
        let spend: f64 = platforms.iter().map(|p| p.spend).sum();
        let impressions: u64 = platforms.iter().map(|p| p.impressions).sum();
        let clicks: u64 = platforms.iter().map(|p| p.clicks).sum();
        let conversions: u64 = platforms.iter().map(|p| p.conversions).sum();
        let revenue: f64 = platforms.iter().map(|p| p.revenue).sum();

        KpiTotals {
            spend,
            impressions,
            clicks,
            conversions,
            cpm: ratio(spend * 1000.0, impressions as f64),
            ctr: ratio(clicks as f64 * 100.0, impressions as f64),
            cvr: ratio(conversions as f64 * 100.0, clicks as f64),
            cpc: (clicks > 0).then(|| spend / clicks as f64),
            revenue,
            roas: ratio(revenue, spend),
            cac: (conversions > 0).then(|| spend / conversions as f64),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
