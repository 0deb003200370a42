//! Budget allocation across platforms.
//!
//! Weights start from the industry's default split, are shaped per goal by
//! goal weights and the budget-tier / seasonal platform multipliers, blended
//! across goals, restricted to the eligible platform set, normalized, and
//! finally turned into amounts in the currency's minor unit. The sum of the
//! amounts always equals the budget: the rounding residual lands on the
//! platform with the largest raw share.

use crate::error::{ForecastError, ForecastResult};
use crate::trace::{AdjustmentTrace, TraceStep};
use crate::validator::{ValidationErrors, ValidationIssue};
use crate::warning::{ForecastWarning, WarningKind};
use campaign_core::{BudgetTier, CampaignInput, Compatibility, ForecastConfig};
use campaign_registry::{BudgetTierEntry, Industry, Registries, Season};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// One platform's slice of the budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformAllocation {
    pub platform: String,
    pub compatibility: Compatibility,
    /// Weight after every multiplier and penalty, before normalization.
    pub adjusted_weight: f64,
    /// Normalized weight; the weights of a result sum to 1.
    pub share: f64,
    /// `share * budget` before rounding, in currency units.
    pub raw_amount: f64,
    pub amount_minor: i64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub budget: f64,
    pub budget_minor: i64,
    pub currency_decimals: u32,
    pub budget_tier: BudgetTier,
    /// Largest amount first.
    pub platforms: Vec<PlatformAllocation>,
    /// Merged into the report's warning list.
    #[serde(skip)]
    pub warnings: Vec<ForecastWarning>,
}

impl AllocationResult {
    pub fn get(&self, platform: &str) -> Option<&PlatformAllocation> {
        self.platforms.iter().find(|p| p.platform == platform)
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.get(platform).is_some()
    }

    /// Per-platform amounts in currency units. These are the minor-unit
    /// amounts divided by the scale, so their float sum can differ from the
    /// budget in the last bits; [`Self::amounts_minor`] is exact.
    pub fn amounts(&self) -> BTreeMap<String, f64> {
        self.platforms
            .iter()
            .map(|p| (p.platform.clone(), p.amount))
            .collect()
    }

    /// Per-platform amounts in minor units. They always sum to `budget_minor`.
    pub fn amounts_minor(&self) -> BTreeMap<String, i64> {
        self.platforms
            .iter()
            .map(|p| (p.platform.clone(), p.amount_minor))
            .collect()
    }

    pub fn total_minor(&self) -> i64 {
        self.platforms.iter().map(|p| p.amount_minor).sum()
    }

    pub fn max_share(&self) -> f64 {
        self.platforms.iter().map(|p| p.share).fold(0.0, f64::max)
    }
}

pub struct AllocationEngine<'a> {
    registries: &'a Registries,
    config: &'a ForecastConfig,
}

impl<'a> AllocationEngine<'a> {
    pub fn new(registries: &'a Registries, config: &'a ForecastConfig) -> Self {
        Self { registries, config }
    }

    pub fn allocate(
        &self,
        input: &CampaignInput,
        trace: &mut AdjustmentTrace,
    ) -> ForecastResult<AllocationResult> {
        let industry = self.registries.industry(&input.industry).ok_or_else(|| {
            ForecastError::Validation(ValidationErrors(vec![ValidationIssue::unknown_industry(
                &input.industry,
            )]))
        })?;
        let no_eligible = || ForecastError::NoEligiblePlatforms {
            industry: input.industry.clone(),
        };
        let mut warnings = Vec::new();

        // 1. Industry default split.
        let (split, fell_back) = self.registries.split_for(&input.industry).ok_or_else(no_eligible)?;
        trace.push(TraceStep::IndustrySplit {
            industry: input.industry.clone(),
            fell_back,
        });
        if fell_back {
            warn!(industry = %input.industry, "No split for industry, using default split");
            warnings.push(ForecastWarning::new(
                WarningKind::SplitFallback,
                format!(
                    "No platform split for {}; the default split was used",
                    input.industry
                ),
            ));
        }

        // 2 + 3. Goal weights, budget tier and season, blended across goals.
        let tier = self.registries.budget_tier(input.budget);
        let season = input.season.as_deref().and_then(|s| {
            self.registries.season(s).map(|entry| (s, entry))
        });
        let combined = self.blend_goals(input, split, tier, season, trace);
        if combined.is_empty() {
            return Err(no_eligible());
        }

        // 4. Eligible set, discouraged penalty, allow-list flags.
        let mut weights = self.candidates(input, industry, split, &combined, trace, &mut warnings);

        // 5. Platform-count bounds.
        self.enforce_bounds(industry, &combined, &mut weights, trace, &mut warnings);

        // 6. Normalize.
        let total: f64 = weights.values().sum();
        if weights.is_empty() || !(total > 0.0) {
            return Err(no_eligible());
        }

        // 7 + 8. Amounts in minor units with residual reconciliation.
        let scale = self.config.minor_unit_scale();
        let budget_minor = (input.budget * scale).round() as i64;
        let mut platforms: Vec<PlatformAllocation> = weights
            .iter()
            .map(|(platform, adjusted)| {
                let share = adjusted / total;
                trace.push(TraceStep::Normalized {
                    platform: platform.clone(),
                    weight: share,
                });
                let raw_minor = share * budget_minor as f64;
                PlatformAllocation {
                    platform: platform.clone(),
                    compatibility: industry.compatibility(platform),
                    adjusted_weight: *adjusted,
                    share,
                    raw_amount: raw_minor / scale,
                    amount_minor: raw_minor.round() as i64,
                    amount: 0.0,
                }
            })
            .collect();

        let residual = budget_minor - platforms.iter().map(|p| p.amount_minor).sum::<i64>();
        if residual != 0 {
            // Ties resolve to the alphabetically first platform.
            let largest = platforms
                .iter_mut()
                .reduce(|best, p| if p.raw_amount > best.raw_amount { p } else { best });
            if let Some(largest) = largest {
                largest.amount_minor += residual;
                trace.push(TraceStep::RoundingResidual {
                    platform: largest.platform.clone(),
                    residual_minor: residual,
                });
            }
        }
        for p in &mut platforms {
            p.amount = p.amount_minor as f64 / scale;
        }
        platforms.sort_by(|a, b| {
            b.amount_minor
                .cmp(&a.amount_minor)
                .then_with(|| a.platform.cmp(&b.platform))
        });

        debug!(
            industry = %input.industry,
            platforms = platforms.len(),
            residual_minor = residual,
            "Budget allocated"
        );

        Ok(AllocationResult {
            budget: budget_minor as f64 / scale,
            budget_minor,
            currency_decimals: self.config.currency_decimals,
            budget_tier: tier.map(|t| t.tier).unwrap_or(BudgetTier::Low),
            platforms,
            warnings,
        })
    }

    /// Per-goal shaped shares blended into one weight per platform. Covers
    /// the split's platforms plus every platform with a default-row share,
    /// so explicitly requested off-split platforms have a base weight.
    fn blend_goals(
        &self,
        input: &CampaignInput,
        split: &BTreeMap<String, f64>,
        tier: Option<&BudgetTierEntry>,
        season: Option<(&str, &Season)>,
        trace: &mut AdjustmentTrace,
    ) -> BTreeMap<String, f64> {
        let base: BTreeMap<&str, f64> = self
            .registries
            .platforms
            .keys()
            .map(|p| {
                let share = split
                    .get(p)
                    .copied()
                    .unwrap_or_else(|| self.registries.default_share(p));
                (p.as_str(), share)
            })
            .filter(|(_, share)| *share > 0.0)
            .collect();

        // Record the platform multipliers once; they do not vary per goal.
        for platform in base.keys() {
            if let Some(m) = tier.and_then(|t| t.platform_multipliers.get(*platform)) {
                trace.push(TraceStep::BudgetTier {
                    tier: tier.map(|t| t.tier).unwrap_or(BudgetTier::Low),
                    platform: platform.to_string(),
                    multiplier: *m,
                });
            }
            if let Some((name, s)) = season {
                if let Some(m) = s.platform_multipliers.get(*platform) {
                    trace.push(TraceStep::SeasonAllocation {
                        season: name.to_string(),
                        platform: platform.to_string(),
                        multiplier: *m,
                    });
                }
            }
        }

        let mut seen = BTreeSet::new();
        let mut blended: BTreeMap<String, f64> = BTreeMap::new();
        let mut blend_total = 0.0;

        for goal_key in input.goals.iter().filter(|g| seen.insert(g.as_str())) {
            let Some(goal) = self.registries.goal(goal_key) else {
                continue;
            };

            let shaped: BTreeMap<&str, f64> = base
                .iter()
                .map(|(platform, share)| {
                    let tier_m = tier
                        .and_then(|t| t.platform_multipliers.get(*platform))
                        .copied()
                        .unwrap_or(1.0);
                    let season_m = season
                        .and_then(|(_, s)| s.platform_multipliers.get(*platform))
                        .copied()
                        .unwrap_or(1.0);
                    (*platform, share * goal.weight(platform) * tier_m * season_m)
                })
                .collect();

            // Goal-level normalization runs over the split's own platforms.
            let z: f64 = shaped
                .iter()
                .filter(|(p, _)| split.contains_key(**p))
                .map(|(_, w)| w)
                .sum();
            if !(z > 0.0) {
                debug!(goal = %goal_key, "Goal contributes no weight, skipped");
                continue;
            }

            let goal_weight = tier
                .and_then(|t| t.goal_multipliers.get(goal_key))
                .copied()
                .unwrap_or(1.0)
                * season
                    .and_then(|(_, s)| s.goal_multipliers.get(goal_key))
                    .copied()
                    .unwrap_or(1.0);

            for (platform, w) in &shaped {
                trace.push(TraceStep::GoalWeight {
                    goal: goal_key.clone(),
                    platform: platform.to_string(),
                    multiplier: goal.weight(platform),
                });
                *blended.entry(platform.to_string()).or_insert(0.0) += goal_weight * w / z;
            }
            trace.push(TraceStep::GoalBlend {
                goal: goal_key.clone(),
                weight: goal_weight,
            });
            blend_total += goal_weight;
        }

        if !(blend_total > 0.0) {
            return BTreeMap::new();
        }
        blended
            .into_iter()
            .map(|(p, w)| (p, w / blend_total))
            .collect()
    }

    fn candidates(
        &self,
        input: &CampaignInput,
        industry: &Industry,
        split: &BTreeMap<String, f64>,
        combined: &BTreeMap<String, f64>,
        trace: &mut AdjustmentTrace,
        warnings: &mut Vec<ForecastWarning>,
    ) -> BTreeMap<String, f64> {
        let selection: Option<Vec<&String>> = input
            .selected_platforms
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                let mut seen = BTreeSet::new();
                s.iter()
                    .filter(|p| self.registries.is_supported_platform(p) && seen.insert(p.as_str()))
                    .collect()
            });

        let pool: Vec<&String> = match &selection {
            Some(selected) => {
                trace.push(TraceStep::PlatformsRestricted {
                    platforms: selected.iter().map(|p| p.to_string()).collect(),
                });
                selected.clone()
            }
            None => split
                .iter()
                .filter(|(p, share)| {
                    **share > 0.0 && industry.compatibility(p) != Compatibility::Disallowed
                })
                .map(|(p, _)| p)
                .collect(),
        };

        let mut weights = BTreeMap::new();
        for platform in pool {
            let mut weight = combined.get(platform).copied().unwrap_or(0.0);
            match industry.compatibility(platform) {
                Compatibility::Discouraged => {
                    weight *= self.config.discourage_penalty;
                    trace.push(TraceStep::DiscouragePenalty {
                        platform: platform.clone(),
                        multiplier: self.config.discourage_penalty,
                    });
                    warnings.push(ForecastWarning::for_platform(
                        WarningKind::DiscouragedPlatform,
                        platform,
                        format!(
                            "{platform} is discouraged for {}; its weight was reduced",
                            input.industry
                        ),
                    ));
                }
                Compatibility::Disallowed => {
                    warnings.push(ForecastWarning::for_platform(
                        WarningKind::OutsideAllowList,
                        platform,
                        format!(
                            "{platform} is outside the {} allow list but was kept as requested",
                            input.industry
                        ),
                    ));
                }
                Compatibility::Optimal | Compatibility::Allowed => {}
            }
            if weight > 0.0 {
                weights.insert(platform.clone(), weight);
            } else {
                debug!(platform = %platform, "Platform has no weight, excluded");
            }
        }
        weights
    }

    fn enforce_bounds(
        &self,
        industry: &Industry,
        combined: &BTreeMap<String, f64>,
        weights: &mut BTreeMap<String, f64>,
        trace: &mut AdjustmentTrace,
        warnings: &mut Vec<ForecastWarning>,
    ) {
        if weights.len() < industry.min_platforms {
            let mut extras: Vec<(&String, f64)> = industry
                .allow_list()
                .filter(|p| !weights.contains_key(*p))
                .map(|p| (p, combined.get(p).copied().unwrap_or(0.0)))
                .filter(|(_, w)| *w > 0.0)
                .collect();
            extras.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

            for (platform, weight) in extras {
                if weights.len() >= industry.min_platforms {
                    break;
                }
                weights.insert(platform.clone(), weight);
                trace.push(TraceStep::PlatformAdded {
                    platform: platform.clone(),
                    min_platforms: industry.min_platforms,
                });
                warnings.push(ForecastWarning::for_platform(
                    WarningKind::PlatformAdded,
                    platform,
                    format!(
                        "{platform} was added to reach the minimum of {} platforms",
                        industry.min_platforms
                    ),
                ));
            }
        }

        if weights.len() > industry.max_platforms {
            let mut ranked: Vec<(String, f64)> =
                weights.iter().map(|(p, w)| (p.clone(), *w)).collect();
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
            let excess = weights.len() - industry.max_platforms;
            for (platform, _) in ranked.into_iter().take(excess) {
                weights.remove(&platform);
                trace.push(TraceStep::PlatformDropped {
                    platform: platform.clone(),
                    max_platforms: industry.max_platforms,
                });
                warnings.push(ForecastWarning::for_platform(
                    WarningKind::PlatformDropped,
                    &platform,
                    format!(
                        "{platform} was dropped to respect the maximum of {} platforms",
                        industry.max_platforms
                    ),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECOMMERCE: &str = "تجارة إلكترونية";
    const TECH: &str = "تقنية وبرمجيات";

    fn allocate_with(
        reg: &Registries,
        cfg: &ForecastConfig,
        input: &CampaignInput,
    ) -> ForecastResult<AllocationResult> {
        let mut trace = AdjustmentTrace::new();
        AllocationEngine::new(reg, cfg).allocate(input, &mut trace)
    }

    fn allocate(input: &CampaignInput) -> AllocationResult {
        let reg = Registries::builtin().unwrap();
        allocate_with(&reg, &ForecastConfig::default(), input).unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_documented_ecommerce_split() {
        let input = CampaignInput::new(ECOMMERCE, 100_000.0, strings(&["Sales", "Traffic"]))
            .with_platforms(strings(&["Meta", "Google Search", "TikTok"]));
        let result = allocate(&input);
        let amounts = result.amounts();
        assert_eq!(amounts.len(), 3);
        for (platform, expected) in [("Meta", 40_000.0), ("Google Search", 35_000.0), ("TikTok", 25_000.0)] {
            let got = amounts[platform];
            assert!(
                (got - expected).abs() <= 1_000.0,
                "{platform}: {got} not within 1% of {expected}"
            );
        }
        assert_eq!(result.platforms[0].platform, "Meta");
    }

    #[test]
    fn test_sum_equals_budget_exactly() {
        for budget in [1_000.0, 1_234.57, 33_333.33, 99_999.99, 100_000.0, 777_777.77] {
            let input = CampaignInput::new(ECOMMERCE, budget, strings(&["Sales", "Awareness"]));
            let result = allocate(&input);
            assert_eq!(result.total_minor(), result.budget_minor, "budget {budget}");
            assert_eq!(result.budget_minor, (budget * 100.0).round() as i64);
        }
    }

    #[test]
    fn test_shares_sum_to_one() {
        let input = CampaignInput::new(ECOMMERCE, 42_000.0, strings(&["Engagement", "Leads"]))
            .with_season("Ramadan");
        let result = allocate(&input);
        let total: f64 = result.platforms.iter().map(|p| p.share).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(result.platforms.iter().all(|p| (0.0..=1.0).contains(&p.share)));
    }

    #[test]
    fn test_residual_goes_to_largest_raw_share_only() {
        let reg = Registries::builtin().unwrap();
        let cfg = ForecastConfig {
            currency_decimals: 0,
            ..Default::default()
        };
        let input = CampaignInput::new(ECOMMERCE, 1_001.0, strings(&["Sales"]))
            .with_platforms(strings(&["Meta", "Google Search", "TikTok"]));
        let mut trace = AdjustmentTrace::new();
        let result = AllocationEngine::new(&reg, &cfg).allocate(&input, &mut trace).unwrap();
        assert_eq!(result.total_minor(), 1_001);

        let adjusted: Vec<&PlatformAllocation> = result
            .platforms
            .iter()
            .filter(|p| p.amount_minor != p.raw_amount.round() as i64)
            .collect();
        assert!(adjusted.len() <= 1);
        if let Some(p) = adjusted.first() {
            let largest = result
                .platforms
                .iter()
                .max_by(|a, b| a.raw_amount.total_cmp(&b.raw_amount))
                .unwrap();
            assert_eq!(p.platform, largest.platform);
            assert!(trace
                .iter()
                .any(|s| matches!(s, TraceStep::RoundingResidual { .. })));
        }
    }

    #[test]
    fn test_discouraged_platform_weighs_less() {
        let reg = Registries::builtin().unwrap();
        let cfg = ForecastConfig::default();
        let input = CampaignInput::new(ECOMMERCE, 60_000.0, strings(&["Leads"]))
            .with_platforms(strings(&["Meta", "Google Search", "LinkedIn"]));
        let penalized = allocate_with(&reg, &cfg, &input).unwrap();

        let mut relaxed = reg.clone();
        let industry = relaxed.industries.get_mut(ECOMMERCE).unwrap();
        industry.discouraged.retain(|p| p != "LinkedIn");
        industry.allowed.push("LinkedIn".to_string());
        let unpenalized = allocate_with(&relaxed, &cfg, &input).unwrap();

        let with = penalized.get("LinkedIn").unwrap();
        let without = unpenalized.get("LinkedIn").unwrap();
        assert!(with.adjusted_weight < without.adjusted_weight);
        assert!(with.share < without.share);
        assert!(penalized
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::DiscouragedPlatform));
    }

    #[test]
    fn test_min_platforms_adds_best_allowed() {
        // E-commerce needs at least two platforms.
        let input = CampaignInput::new(ECOMMERCE, 20_000.0, strings(&["Sales"]))
            .with_platforms(strings(&["TikTok"]));
        let result = allocate(&input);
        assert_eq!(result.platforms.len(), 2);
        assert!(result.contains("TikTok"));
        // Meta carries the highest Sales-shaped weight among the rest.
        assert!(result.contains("Meta"));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::PlatformAdded));
    }

    #[test]
    fn test_max_platforms_drops_lowest() {
        let input = CampaignInput::new(ECOMMERCE, 300_000.0, strings(&["Sales"])).with_platforms(
            strings(&["Meta", "Google Search", "TikTok", "Snapchat", "YouTube", "Google Display", "X"]),
        );
        let result = allocate(&input);
        assert_eq!(result.platforms.len(), 5);
        let dropped: Vec<&ForecastWarning> = result
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::PlatformDropped)
            .collect();
        assert_eq!(dropped.len(), 2);
        assert!(!result.contains("X"));
    }

    #[test]
    fn test_outside_allow_list_kept_and_flagged() {
        // LinkedIn is on none of the restaurant lists.
        let input = CampaignInput::new("مطاعم ومقاهي", 20_000.0, strings(&["Awareness"]))
            .with_platforms(strings(&["Snapchat", "LinkedIn"]));
        let result = allocate(&input);
        assert!(result.contains("LinkedIn"));
        assert_eq!(
            result.get("LinkedIn").unwrap().compatibility,
            Compatibility::Disallowed
        );
        assert!(result
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::OutsideAllowList));
    }

    #[test]
    fn test_default_split_fallback() {
        let input = CampaignInput::new(TECH, 40_000.0, strings(&["Leads"]));
        let result = allocate(&input);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::SplitFallback));
        assert!(result.platforms.len() <= 4);
        assert_eq!(result.total_minor(), result.budget_minor);
    }

    #[test]
    fn test_no_selection_excludes_disallowed() {
        let input = CampaignInput::new("مطاعم ومقاهي", 20_000.0, strings(&["Sales"]));
        let result = allocate(&input);
        assert!(result
            .platforms
            .iter()
            .all(|p| p.compatibility != Compatibility::Disallowed));
        assert!(result.platforms.len() <= 3);
    }

    #[test]
    fn test_no_eligible_platforms() {
        let mut reg = Registries::builtin().unwrap();
        for goal in reg.goals.values_mut() {
            for w in goal.weights.values_mut() {
                *w = 0.0;
            }
        }
        let input = CampaignInput::new(ECOMMERCE, 20_000.0, strings(&["Sales"]));
        let err = allocate_with(&reg, &ForecastConfig::default(), &input).unwrap_err();
        assert!(matches!(err, ForecastError::NoEligiblePlatforms { .. }));
    }

    #[test]
    fn test_season_shifts_weight() {
        let plain = CampaignInput::new(ECOMMERCE, 60_000.0, strings(&["Sales"]));
        let friday = plain.clone().with_season("White Friday");
        let a = allocate(&plain);
        let b = allocate(&friday);
        let search = |r: &AllocationResult| r.get("Google Search").unwrap().share;
        assert!(search(&b) > search(&a));
    }

    #[test]
    fn test_budget_tier_recorded() {
        let input = CampaignInput::new(ECOMMERCE, 5_000.0, strings(&["Sales"]));
        assert_eq!(allocate(&input).budget_tier, BudgetTier::Low);
        let input = CampaignInput::new(ECOMMERCE, 500_000.0, strings(&["Sales"]));
        assert_eq!(allocate(&input).budget_tier, BudgetTier::Enterprise);
    }

    #[test]
    fn test_duplicate_goals_do_not_double_count() {
        let once = CampaignInput::new(ECOMMERCE, 60_000.0, strings(&["Sales", "Traffic"]));
        let twice = CampaignInput::new(ECOMMERCE, 60_000.0, strings(&["Sales", "Sales", "Traffic"]));
        assert_eq!(allocate(&once).amounts(), allocate(&twice).amounts());
    }
}
