//! Rule-based advice. Every rule whose predicate holds fires, in registry
//! order.

use crate::allocation::AllocationResult;
use campaign_core::types::DEVICE_ALL;
use campaign_core::{BudgetTier, CampaignInput};
use campaign_registry::{Predicate, RecommendationRule};
use std::collections::BTreeSet;
use tracing::debug;

/// What a predicate is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub input: &'a CampaignInput,
    pub allocation: Option<&'a AllocationResult>,
    pub tier: BudgetTier,
}

impl<'a> RuleContext<'a> {
    pub fn evaluate(&self, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::IndustryIs { industry } => self.input.industry == *industry,
            Predicate::BudgetBelow { amount } => self.input.budget < *amount,
            Predicate::BudgetAtLeast { amount } => self.input.budget >= *amount,
            Predicate::BudgetTierIs { tier } => self.tier == *tier,
            Predicate::HasGoal { goal } => self.input.has_goal(goal),
            Predicate::GoalCountAbove { count } => {
                let distinct: BTreeSet<&str> = self.input.goals.iter().map(String::as_str).collect();
                distinct.len() > *count
            }
            Predicate::PlatformSelected { platform } => self.input.selects(platform),
            // Without an allocation fall back to the explicit selection.
            Predicate::AllocatedTo { platform } => match self.allocation {
                Some(allocation) => allocation.contains(platform),
                None => self.input.selects(platform),
            },
            Predicate::MaxShareAbove { share } => self
                .allocation
                .is_some_and(|allocation| allocation.max_share() > *share),
            Predicate::SeasonIs { season } => self.input.season.as_deref() == Some(season.as_str()),
            Predicate::DeviceShareAbove { device, share } => {
                let actual = self
                    .input
                    .device_share(device)
                    .unwrap_or(if device == DEVICE_ALL { 1.0 } else { 0.0 });
                actual > *share
            }
            Predicate::All { predicates } => predicates.iter().all(|p| self.evaluate(p)),
            Predicate::Any { predicates } => predicates.iter().any(|p| self.evaluate(p)),
            Predicate::Not { predicate } => !self.evaluate(predicate),
        }
    }
}

pub struct RecommendationEngine<'a> {
    rules: &'a [RecommendationRule],
}

impl<'a> RecommendationEngine<'a> {
    pub fn new(rules: &'a [RecommendationRule]) -> Self {
        Self { rules }
    }

    pub fn recommend(&self, context: &RuleContext<'_>) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| context.evaluate(&rule.when))
            .map(|rule| {
                debug!(rule = %rule.id, "Recommendation rule fired");
                rule.message.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_registry::Registries;
    use std::collections::BTreeMap;

    fn rule(id: &str, when: Predicate) -> RecommendationRule {
        RecommendationRule {
            id: id.to_string(),
            when,
            message: format!("message {id}"),
        }
    }

    fn context(input: &CampaignInput, tier: BudgetTier) -> RuleContext<'_> {
        RuleContext {
            input,
            allocation: None,
            tier,
        }
    }

    #[test]
    fn test_every_matching_rule_fires_in_order() {
        let rules = vec![
            rule("a", Predicate::HasGoal { goal: "Sales".into() }),
            rule("b", Predicate::BudgetBelow { amount: 5_000.0 }),
            rule("c", Predicate::HasGoal { goal: "Leads".into() }),
            rule("d", Predicate::IndustryIs { industry: "عقارات".into() }),
        ];
        let input = CampaignInput::new("عقارات", 2_000.0, vec!["Sales".into()]);
        let fired = RecommendationEngine::new(&rules).recommend(&context(&input, BudgetTier::Low));
        assert_eq!(fired, vec!["message a", "message b", "message d"]);
    }

    #[test]
    fn test_composite_predicates() {
        let p = Predicate::All {
            predicates: vec![
                Predicate::PlatformSelected {
                    platform: "LinkedIn".into(),
                },
                Predicate::Not {
                    predicate: Box::new(Predicate::Any {
                        predicates: vec![
                            Predicate::IndustryIs {
                                industry: "تقنية وبرمجيات".into(),
                            },
                            Predicate::BudgetTierIs {
                                tier: BudgetTier::Enterprise,
                            },
                        ],
                    }),
                },
            ],
        };
        let input = CampaignInput::new("عقارات", 20_000.0, vec!["Leads".into()])
            .with_platforms(vec!["LinkedIn".into()]);
        assert!(context(&input, BudgetTier::Medium).evaluate(&p));
        assert!(!context(&input, BudgetTier::Enterprise).evaluate(&p));
    }

    #[test]
    fn test_goal_count_ignores_duplicates() {
        let p = Predicate::GoalCountAbove { count: 1 };
        let dup = CampaignInput::new("x", 1.0, vec!["Sales".into(), "Sales".into()]);
        assert!(!context(&dup, BudgetTier::Low).evaluate(&p));
        let two = CampaignInput::new("x", 1.0, vec!["Sales".into(), "Leads".into()]);
        assert!(context(&two, BudgetTier::Low).evaluate(&p));
    }

    #[test]
    fn test_device_share_predicate() {
        let p = Predicate::DeviceShareAbove {
            device: "mobile".into(),
            share: 0.7,
        };
        let mut mix = BTreeMap::new();
        mix.insert("mobile".to_string(), 8.0);
        mix.insert("desktop".to_string(), 2.0);
        let input = CampaignInput::new("x", 1.0, vec!["Sales".into()]).with_device_mix(mix);
        assert!(context(&input, BudgetTier::Low).evaluate(&p));
        let plain = CampaignInput::new("x", 1.0, vec!["Sales".into()]);
        assert!(!context(&plain, BudgetTier::Low).evaluate(&p));
    }

    #[test]
    fn test_builtin_rules() {
        let reg = Registries::builtin().unwrap();
        let input = CampaignInput::new("مطاعم ومقاهي", 5_000.0, vec!["Sales".into()])
            .with_platforms(vec!["Snapchat".into(), "TikTok".into()])
            .with_season("Ramadan");
        let fired = RecommendationEngine::new(&reg.recommendations)
            .recommend(&context(&input, BudgetTier::Low));
        // low tier, sales without search, Ramadan, restaurants
        assert_eq!(fired.len(), 4);
        assert!(fired[0].contains("low tier"));
        assert!(fired.last().unwrap().contains("5-10 km"));
    }
}
