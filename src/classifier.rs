// 🏷️ Risk Classifier - Rules as Data
// Maps a transaction's payment delay and amount to a Low/Medium/High risk label

use crate::error::{RiskError, RiskResult};
use crate::transaction::{RiskAssessment, RiskLabel, Tier, Transaction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Delay cutoffs in days; upper bounds are inclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayThresholds {
    /// `delay_days <= low_max` → tier 0
    pub low_max: i64,
    /// `delay_days <= medium_max` → tier 1, above → tier 2
    pub medium_max: i64,
}

impl Default for DelayThresholds {
    fn default() -> Self {
        DelayThresholds {
            low_max: 7,
            medium_max: 30,
        }
    }
}

/// Amount cutoffs in currency units; upper bounds are inclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountThresholds {
    pub low_max: Decimal,
    pub medium_max: Decimal,
}

impl Default for AmountThresholds {
    fn default() -> Self {
        AmountThresholds {
            low_max: Decimal::new(50_000, 0),
            medium_max: Decimal::new(100_000, 0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub delay: DelayThresholds,
    pub amount: AmountThresholds,
}

impl ClassifierConfig {
    pub fn validate(&self) -> RiskResult<()> {
        if self.delay.low_max > self.delay.medium_max {
            return Err(RiskError::InvalidConfig(format!(
                "delay.low_max ({}) must not exceed delay.medium_max ({})",
                self.delay.low_max, self.delay.medium_max
            )));
        }
        if self.amount.low_max > self.amount.medium_max {
            return Err(RiskError::InvalidConfig(format!(
                "amount.low_max ({}) must not exceed amount.medium_max ({})",
                self.amount.low_max, self.amount.medium_max
            )));
        }
        if self.amount.low_max < Decimal::ZERO {
            return Err(RiskError::InvalidConfig(format!(
                "amount.low_max must be non-negative, got {}",
                self.amount.low_max
            )));
        }
        Ok(())
    }
}

// ============================================================================
// DECISION TABLE
// ============================================================================

/// Rows: delay tier, columns: amount tier.
///
/// Delay dominates: a delay tier of 2 is always High, and an amount-only
/// signal never goes beyond Medium.
pub const DECISION_TABLE: [[RiskLabel; 3]; 3] = [
    [RiskLabel::Low, RiskLabel::Medium, RiskLabel::Medium],
    [RiskLabel::Medium, RiskLabel::High, RiskLabel::High],
    [RiskLabel::High, RiskLabel::High, RiskLabel::High],
];

/// Look up the label for a pair of tiers
pub fn combine(delay_tier: Tier, amount_tier: Tier) -> RiskLabel {
    DECISION_TABLE[delay_tier.index()][amount_tier.index()]
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Anything that can turn a transaction into a risk assessment
pub trait Classifier {
    fn assess(&self, tx: &Transaction) -> RiskResult<RiskAssessment>;

    fn classify(&self, tx: &Transaction) -> RiskResult<RiskLabel> {
        self.assess(tx).map(|a| a.label)
    }
}

/// Threshold-based two-signal classifier
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    config: ClassifierConfig,
}

impl RiskClassifier {
    /// Create a classifier, rejecting inconsistent thresholds
    pub fn new(config: ClassifierConfig) -> RiskResult<Self> {
        config.validate()?;
        Ok(RiskClassifier { config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Negative delays (early payment) clamp to tier 0
    pub fn delay_tier(&self, delay_days: i64) -> Tier {
        if delay_days < 0 || delay_days <= self.config.delay.low_max {
            Tier::Low
        } else if delay_days <= self.config.delay.medium_max {
            Tier::Medium
        } else {
            Tier::High
        }
    }

    pub fn amount_tier(&self, amount: Decimal) -> Tier {
        if amount <= self.config.amount.low_max {
            Tier::Low
        } else if amount <= self.config.amount.medium_max {
            Tier::Medium
        } else {
            Tier::High
        }
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        RiskClassifier {
            config: ClassifierConfig::default(),
        }
    }
}

impl Classifier for RiskClassifier {
    fn assess(&self, tx: &Transaction) -> RiskResult<RiskAssessment> {
        if tx.amount < Decimal::ZERO {
            return Err(RiskError::invalid_input(
                &tx.id,
                format!("amount must be non-negative, got {}", tx.amount),
            ));
        }

        let delay_tier = self.delay_tier(tx.delay_days);
        let amount_tier = self.amount_tier(tx.amount);

        Ok(RiskAssessment {
            label: combine(delay_tier, amount_tier),
            delay_tier,
            amount_tier,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn tx(amount: i64, delay_days: i64) -> Transaction {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Transaction::new("tx-1", "cust-1", Decimal::new(amount, 0), delay_days, ts)
    }

    fn label(amount: i64, delay_days: i64) -> RiskLabel {
        RiskClassifier::default().classify(&tx(amount, delay_days)).unwrap()
    }

    #[test]
    fn test_pinned_threshold_cases() {
        // Thresholds pinned: delay 7/30, amount 50 000/100 000
        assert_eq!(label(100, 2), RiskLabel::Low);
        assert_eq!(label(100, 45), RiskLabel::High);
        assert_eq!(label(150_000, 2), RiskLabel::Medium);
        assert_eq!(label(60_000, 10), RiskLabel::High);
        assert_eq!(label(100, 10), RiskLabel::Medium);
    }

    #[test]
    fn test_inclusive_boundaries() {
        assert_eq!(label(50_000, 7), RiskLabel::Low);
        assert_eq!(label(50_001, 7), RiskLabel::Medium);
        assert_eq!(label(100, 8), RiskLabel::Medium);
        assert_eq!(label(100, 30), RiskLabel::Medium);
        assert_eq!(label(100, 31), RiskLabel::High);
        assert_eq!(label(100_000, 0), RiskLabel::Medium);
    }

    #[test]
    fn test_negative_delay_and_zero_amount() {
        let classifier = RiskClassifier::default();
        assert_eq!(classifier.delay_tier(-5), Tier::Low);
        assert_eq!(classifier.amount_tier(Decimal::ZERO), Tier::Low);
        assert_eq!(label(0, -5), RiskLabel::Low);
    }

    #[test]
    fn test_negative_amount_is_invalid_input() {
        let classifier = RiskClassifier::default();
        let err = classifier.classify(&tx(-5, 0)).unwrap_err();
        assert!(err.is_record_local());
        assert!(err.to_string().contains("tx-1"));
    }

    #[test]
    fn test_assessment_carries_tiers_and_score() {
        let assessment = RiskClassifier::default().assess(&tx(75_000, 40)).unwrap();
        assert_eq!(assessment.delay_tier, Tier::High);
        assert_eq!(assessment.amount_tier, Tier::Medium);
        assert_eq!(assessment.label, RiskLabel::High);
        assert_eq!(assessment.score(), 7);
    }

    #[test]
    fn test_decision_table_matches_precedence_rule() {
        let tiers = [Tier::Low, Tier::Medium, Tier::High];
        for &d in &tiers {
            for &a in &tiers {
                let expected = if d == Tier::High || (d >= Tier::Medium && a >= Tier::Medium) {
                    RiskLabel::High
                } else if d != Tier::Low || a != Tier::Low {
                    RiskLabel::Medium
                } else {
                    RiskLabel::Low
                };
                assert_eq!(combine(d, a), expected, "delay {:?} amount {:?}", d, a);
            }
        }
    }

    #[test]
    fn test_custom_thresholds() {
        let config = ClassifierConfig {
            delay: DelayThresholds {
                low_max: 0,
                medium_max: 5,
            },
            amount: AmountThresholds {
                low_max: Decimal::new(1_000, 0),
                medium_max: Decimal::new(10_000, 0),
            },
        };
        let classifier = RiskClassifier::new(config).unwrap();
        assert_eq!(classifier.classify(&tx(500, 1)).unwrap(), RiskLabel::Medium);
        assert_eq!(classifier.classify(&tx(5_000, 1)).unwrap(), RiskLabel::High);
        assert_eq!(classifier.classify(&tx(50_000, 0)).unwrap(), RiskLabel::Medium);
    }

    #[test]
    fn test_inverted_config_rejected() {
        let config = ClassifierConfig {
            delay: DelayThresholds {
                low_max: 30,
                medium_max: 7,
            },
            ..ClassifierConfig::default()
        };
        assert!(matches!(
            RiskClassifier::new(config),
            Err(RiskError::InvalidConfig(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_monotonic_in_delay(amount in 0i64..500_000, d1 in -60i64..120, step in 0i64..120) {
            prop_assert!(label(amount, d1) <= label(amount, d1 + step));
        }

        #[test]
        fn prop_monotonic_in_amount(delay in -60i64..120, a1 in 0i64..500_000, step in 0i64..500_000) {
            prop_assert!(label(a1, delay) <= label(a1 + step, delay));
        }

        #[test]
        fn prop_deterministic(amount in 0i64..500_000, delay in -60i64..120) {
            let classifier = RiskClassifier::default();
            let t = tx(amount, delay);
            prop_assert_eq!(classifier.assess(&t).unwrap(), classifier.assess(&t).unwrap());
        }
    }
}
