// 💳 Transaction Records
// The unit being classified, plus the derived (labeled) value produced by classification

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sector assigned when a customer has none
pub const UNKNOWN_SECTOR: &str = "Unknown";

// ============================================================================
// TRANSACTION
// ============================================================================

/// One financial event, created once at ingestion and never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    // ========================================================================
    // CORE FIELDS (used by the classifier and the aggregation engine)
    // ========================================================================
    pub id: String,

    /// Weak reference to the owning customer (lookup only)
    pub customer_id: String,

    pub amount: Decimal,

    /// Payment delay relative to due date; negative means paid early
    pub delay_days: i64,

    /// Event time, used only for time bucketing and date filters
    pub timestamp: NaiveDateTime,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,

    // ========================================================================
    // DESCRIPTIVE FIELDS (carried through to reports, never classified on)
    // ========================================================================
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_type: Option<String>,

    #[serde(default = "default_paid")]
    pub is_paid: bool,
}

fn default_paid() -> bool {
    true
}

impl Transaction {
    /// Create a transaction with the required fields
    pub fn new(
        id: impl Into<String>,
        customer_id: impl Into<String>,
        amount: Decimal,
        delay_days: i64,
        timestamp: NaiveDateTime,
    ) -> Self {
        Transaction {
            id: id.into(),
            customer_id: customer_id.into(),
            amount,
            delay_days,
            timestamp,
            sector: None,
            customer_name: None,
            country: None,
            currency: None,
            txn_type: None,
            is_paid: true,
        }
    }

    /// Builder pattern: add optional sector
    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    /// Builder pattern: add optional customer name
    pub fn with_customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    /// Builder pattern: add optional country
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Builder pattern: add currency and transaction type
    pub fn with_kind(mut self, currency: impl Into<String>, txn_type: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self.txn_type = Some(txn_type.into());
        self
    }

    /// Builder pattern: mark payment status
    pub fn with_paid(mut self, is_paid: bool) -> Self {
        self.is_paid = is_paid;
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Sector for grouping, "Unknown" when absent
    pub fn sector_or_unknown(&self) -> &str {
        self.sector.as_deref().unwrap_or(UNKNOWN_SECTOR)
    }

    /// Display name for the customer, falling back to its id
    pub fn customer_display(&self) -> &str {
        self.customer_name.as_deref().unwrap_or(&self.customer_id)
    }

    pub fn is_late(&self) -> bool {
        self.delay_days > 0
    }
}

// ============================================================================
// RISK LABEL
// ============================================================================

/// Classification outcome; ordered Low < Medium < High
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl RiskLabel {
    /// All labels in report order
    pub const ALL: [RiskLabel; 3] = [RiskLabel::Low, RiskLabel::Medium, RiskLabel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "Low",
            RiskLabel::Medium => "Medium",
            RiskLabel::High => "High",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            RiskLabel::Low => 0,
            RiskLabel::Medium => 1,
            RiskLabel::High => 2,
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLabel::Low),
            "medium" => Ok(RiskLabel::Medium),
            "high" => Ok(RiskLabel::High),
            other => Err(format!("unknown risk label: {:?}", other)),
        }
    }
}

// ============================================================================
// TIERS & ASSESSMENT
// ============================================================================

/// Severity contributed by a single signal (delay or amount)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Tier {
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: u8) -> Option<Tier> {
        match index {
            0 => Some(Tier::Low),
            1 => Some(Tier::Medium),
            2 => Some(Tier::High),
            _ => None,
        }
    }
}

/// Full result of classifying one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub label: RiskLabel,
    pub delay_tier: Tier,
    pub amount_tier: Tier,
}

impl RiskAssessment {
    /// Decision table cell index (row = delay tier, column = amount tier), 0..=8
    pub fn score(&self) -> u8 {
        (self.delay_tier.index() * 3 + self.amount_tier.index()) as u8
    }
}

// ============================================================================
// LABELED TRANSACTION
// ============================================================================

/// A transaction paired with its classification; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub risk_label: RiskLabel,
    pub delay_tier: Tier,
    pub amount_tier: Tier,
    pub risk_score: u8,
}

impl LabeledTransaction {
    pub fn new(transaction: Transaction, assessment: RiskAssessment) -> Self {
        LabeledTransaction {
            transaction,
            risk_label: assessment.label,
            delay_tier: assessment.delay_tier,
            amount_tier: assessment.amount_tier,
            risk_score: assessment.score(),
        }
    }

    pub fn id(&self) -> &str {
        &self.transaction.id
    }

    pub fn amount(&self) -> Decimal {
        self.transaction.amount
    }

    pub fn delay_days(&self) -> i64 {
        self.transaction.delay_days
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn ts(date: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_label_order_and_parse() {
        assert!(RiskLabel::Low < RiskLabel::Medium);
        assert!(RiskLabel::Medium < RiskLabel::High);
        assert_eq!("high".parse::<RiskLabel>().unwrap(), RiskLabel::High);
        assert_eq!(" Medium ".parse::<RiskLabel>().unwrap(), RiskLabel::Medium);
        assert!("critical".parse::<RiskLabel>().is_err());
        assert_eq!(RiskLabel::ALL.map(|l| l.to_string()), ["Low", "Medium", "High"]);
    }

    #[test]
    fn test_score_is_table_index() {
        let assessment = RiskAssessment {
            label: RiskLabel::High,
            delay_tier: Tier::High,
            amount_tier: Tier::Medium,
        };
        assert_eq!(assessment.score(), 7);
        assert_eq!(Tier::from_index(1), Some(Tier::Medium));
        assert_eq!(Tier::from_index(3), None);
    }

    #[test]
    fn test_builder_and_fallbacks() {
        let tx = Transaction::new("t1", "c1", Decimal::new(12345, 2), 3, ts("2024-05-01"));
        assert_eq!(tx.sector_or_unknown(), UNKNOWN_SECTOR);
        assert_eq!(tx.customer_display(), "c1");
        assert!(tx.is_late());

        let tx = tx.with_sector("Retail").with_customer_name("Customer_001").with_paid(false);
        assert_eq!(tx.sector_or_unknown(), "Retail");
        assert_eq!(tx.customer_display(), "Customer_001");
        assert!(!tx.is_paid);
        assert_eq!(tx.date(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_labeled_transaction_json_is_flat() {
        let tx = Transaction::new("t9", "c2", Decimal::new(500, 0), 40, ts("2024-01-02"));
        let labeled = LabeledTransaction::new(
            tx,
            RiskAssessment {
                label: RiskLabel::High,
                delay_tier: Tier::High,
                amount_tier: Tier::Low,
            },
        );

        let json = serde_json::to_value(&labeled).unwrap();
        assert_eq!(json["id"], "t9");
        assert_eq!(json["risk_label"], "High");
        assert_eq!(json["risk_score"], 6);
    }
}
