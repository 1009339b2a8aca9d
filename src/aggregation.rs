// 📊 Aggregation Engine
// Turns labeled transactions into grouped summaries: by label, by label + time
// bucket, and by label + entity (customer or sector)

use crate::transaction::{LabeledTransaction, RiskLabel, Transaction};
use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// GROUPING DIMENSIONS
// ============================================================================

/// Fixed calendar interval used to bucket transaction timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Day,
    /// ISO week, starting Monday
    Week,
    Month,
}

impl TimeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBucket::Day => "day",
            TimeBucket::Week => "week",
            TimeBucket::Month => "month",
        }
    }

    /// First day of the bucket containing `date`
    pub fn start_of(&self, date: NaiveDate) -> NaiveDate {
        match self {
            TimeBucket::Day => date,
            TimeBucket::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            TimeBucket::Month => date - Duration::days(date.day0() as i64),
        }
    }

    /// First day of the bucket following the one starting at `start`
    pub fn next_start(&self, start: NaiveDate) -> NaiveDate {
        match self {
            TimeBucket::Day => start + Duration::days(1),
            TimeBucket::Week => start + Duration::days(7),
            TimeBucket::Month => self.start_of(self.start_of(start) + Duration::days(31)),
        }
    }

    /// Display label for a bucket: `2024-03-05`, `2024-W10` or `2024-03`
    pub fn label(&self, start: NaiveDate) -> String {
        match self {
            TimeBucket::Day => start.format("%Y-%m-%d").to_string(),
            TimeBucket::Week => {
                let iso = start.iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            TimeBucket::Month => start.format("%Y-%m").to_string(),
        }
    }
}

impl FromStr for TimeBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(TimeBucket::Day),
            "week" | "weekly" => Ok(TimeBucket::Week),
            "month" | "monthly" => Ok(TimeBucket::Month),
            other => Err(format!("unknown time bucket: {:?}", other)),
        }
    }
}

/// Entity a transaction can be grouped under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customer,
    Sector,
}

impl EntityKind {
    pub fn key_of(&self, tx: &Transaction) -> String {
        match self {
            EntityKind::Customer => tx.customer_id.clone(),
            EntityKind::Sector => tx.sector_or_unknown().to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Sector => "sector",
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" | "customers" => Ok(EntityKind::Customer),
            "sector" | "sectors" => Ok(EntityKind::Sector),
            other => Err(format!("unknown entity kind: {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "by", content = "dimension")]
pub enum GroupBy {
    Label,
    LabelAndBucket(TimeBucket),
    LabelAndEntity(EntityKind),
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupBy::Label => write!(f, "label"),
            GroupBy::LabelAndBucket(bucket) => write!(f, "label+{}", bucket.as_str()),
            GroupBy::LabelAndEntity(kind) => write!(f, "label+{}", kind.as_str()),
        }
    }
}

/// Dimension names: `label`, `day` / `week` / `month`, `customer` / `sector`
impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("label") {
            return Ok(GroupBy::Label);
        }
        if let Ok(bucket) = s.parse::<TimeBucket>() {
            return Ok(GroupBy::LabelAndBucket(bucket));
        }
        if let Ok(kind) = s.parse::<EntityKind>() {
            return Ok(GroupBy::LabelAndEntity(kind));
        }
        Err(format!("unknown grouping dimension: {:?}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Bucket width used by `by_bucket`
    pub bucket: TimeBucket,
    /// Emit zero rows for every (label, bucket) between the first and last bucket
    pub dense_buckets: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig {
            bucket: TimeBucket::Month,
            dense_buckets: false,
        }
    }
}

// ============================================================================
// RESULT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupKey {
    // Untagged: most specific shapes first
    Bucket {
        label: RiskLabel,
        bucket: String,
        start: NaiveDate,
    },
    Entity {
        label: RiskLabel,
        entity: String,
    },
    Label {
        label: RiskLabel,
    },
}

impl GroupKey {
    pub fn label(&self) -> RiskLabel {
        match self {
            GroupKey::Label { label }
            | GroupKey::Bucket { label, .. }
            | GroupKey::Entity { label, .. } => *label,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub count: usize,
    pub total_amount: Decimal,
    /// Widened so summing extreme delays cannot overflow
    pub total_delay_days: i128,
    pub avg_delay_days: f64,
    /// `count / total count` of the aggregated input
    pub share: f64,
}

impl GroupMetrics {
    fn add(&mut self, tx: &LabeledTransaction) {
        self.count += 1;
        self.total_amount += tx.amount();
        self.total_delay_days += i128::from(tx.delay_days());
    }

    fn finalize(&mut self, total_count: usize) {
        if self.count > 0 {
            self.avg_delay_days = self.total_delay_days as f64 / self.count as f64;
        }
        if total_count > 0 {
            self.share = self.count as f64 / total_count as f64;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub key: GroupKey,
    pub metrics: GroupMetrics,
}

/// Computed on demand from labeled transactions; never authoritative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub group_by: GroupBy,
    pub groups: Vec<GroupSummary>,
    pub total_count: usize,
    pub total_amount: Decimal,
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    pub fn share_sum(&self) -> f64 {
        self.groups.iter().map(|g| g.metrics.share).sum()
    }

    /// Metrics for a label when grouped by label alone
    pub fn for_label(&self, label: RiskLabel) -> Option<&GroupMetrics> {
        self.groups
            .iter()
            .find(|g| g.key == GroupKey::Label { label })
            .map(|g| &g.metrics)
    }
}

/// Count of transactions with one label for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCount {
    pub entity: String,
    /// Customer name when known
    pub name: Option<String>,
    pub count: usize,
    pub total_amount: Decimal,
}

/// One row of an entity × label pivot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub entity: String,
    /// Counts in Low/Medium/High order
    pub counts: [usize; 3],
}

impl MatrixRow {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Amount distribution of one label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountStats {
    pub label: RiskLabel,
    pub count: usize,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub mean: Option<Decimal>,
}

/// Delay histogram bin covering `[lower, upper]`, both inclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: i64,
    pub upper: i64,
    pub count: usize,
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    config: AggregationConfig,
}

impl AggregationEngine {
    pub fn new(config: AggregationConfig) -> Self {
        AggregationEngine { config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn by_label(&self, labeled: &[LabeledTransaction]) -> AggregationResult {
        self.aggregate(labeled, GroupBy::Label)
    }

    /// Group by label and the configured bucket width
    pub fn by_bucket(&self, labeled: &[LabeledTransaction]) -> AggregationResult {
        self.aggregate(labeled, GroupBy::LabelAndBucket(self.config.bucket))
    }

    pub fn by_entity(&self, labeled: &[LabeledTransaction], kind: EntityKind) -> AggregationResult {
        self.aggregate(labeled, GroupBy::LabelAndEntity(kind))
    }

    pub fn aggregate(&self, labeled: &[LabeledTransaction], group_by: GroupBy) -> AggregationResult {
        let total_count = labeled.len();
        let total_amount = labeled.iter().map(|t| t.amount()).sum::<Decimal>();

        let mut groups = match group_by {
            GroupBy::Label => group_by_label(labeled),
            GroupBy::LabelAndBucket(bucket) => {
                group_by_bucket(labeled, bucket, self.config.dense_buckets)
            }
            GroupBy::LabelAndEntity(kind) => group_by_entity(labeled, kind),
        };

        for group in &mut groups {
            group.metrics.finalize(total_count);
        }

        AggregationResult {
            group_by,
            groups,
            total_count,
            total_amount,
        }
    }

    /// Entities ranked by how many transactions carry `label`
    /// (count descending, entity ascending on ties)
    pub fn top_entities(
        &self,
        labeled: &[LabeledTransaction],
        label: RiskLabel,
        kind: EntityKind,
        limit: usize,
    ) -> Vec<EntityCount> {
        let mut by_entity: HashMap<String, EntityCount> = HashMap::new();

        for tx in labeled.iter().filter(|t| t.risk_label == label) {
            let key = kind.key_of(&tx.transaction);
            let entry = by_entity.entry(key.clone()).or_insert_with(|| EntityCount {
                entity: key,
                name: match kind {
                    EntityKind::Customer => tx.transaction.customer_name.clone(),
                    EntityKind::Sector => None,
                },
                count: 0,
                total_amount: Decimal::ZERO,
            });
            entry.count += 1;
            entry.total_amount += tx.amount();
        }

        let mut ranked: Vec<EntityCount> = by_entity.into_values().collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.entity.cmp(&b.entity)));
        ranked.truncate(limit);
        ranked
    }

    /// Entity × label count pivot; every label column present, entities ascending
    pub fn entity_label_matrix(
        &self,
        labeled: &[LabeledTransaction],
        kind: EntityKind,
    ) -> Vec<MatrixRow> {
        let mut matrix: BTreeMap<String, [usize; 3]> = BTreeMap::new();

        for tx in labeled {
            let counts = matrix.entry(kind.key_of(&tx.transaction)).or_insert([0; 3]);
            counts[tx.risk_label.index()] += 1;
        }

        matrix
            .into_iter()
            .map(|(entity, counts)| MatrixRow { entity, counts })
            .collect()
    }

    /// Min / max / mean amount per label, Low/Medium/High order
    pub fn label_amount_stats(&self, labeled: &[LabeledTransaction]) -> Vec<AmountStats> {
        RiskLabel::ALL
            .iter()
            .map(|&label| {
                let amounts: Vec<Decimal> = labeled
                    .iter()
                    .filter(|t| t.risk_label == label)
                    .map(|t| t.amount())
                    .collect();
                let count = amounts.len();
                let mean = if count == 0 {
                    None
                } else {
                    Some(amounts.iter().sum::<Decimal>() / Decimal::from(count))
                };
                AmountStats {
                    label,
                    count,
                    min: amounts.iter().min().copied(),
                    max: amounts.iter().max().copied(),
                    mean,
                }
            })
            .collect()
    }

    /// Equal-width histogram of delay days over the observed range
    pub fn delay_histogram(&self, labeled: &[LabeledTransaction], bins: usize) -> Vec<HistogramBin> {
        let (min, max) = match (
            labeled.iter().map(|t| t.delay_days()).min(),
            labeled.iter().map(|t| t.delay_days()).max(),
        ) {
            (Some(min), Some(max)) => (min, max),
            _ => return Vec::new(),
        };

        // i128 so the span of any two i64 delays fits
        let (low, high) = (i128::from(min), i128::from(max));
        let bins = bins.max(1) as i128;
        let span = high - low + 1;
        let width = ((span + bins - 1) / bins).max(1);
        let bin_count = ((span + width - 1) / width) as usize;

        let mut histogram: Vec<HistogramBin> = (0..bin_count)
            .map(|i| {
                let lower = low + i as i128 * width;
                let upper = (lower + width - 1).min(high);
                HistogramBin {
                    lower: lower as i64,
                    upper: upper as i64,
                    count: 0,
                }
            })
            .collect();

        for tx in labeled {
            let index = ((i128::from(tx.delay_days()) - low) / width) as usize;
            histogram[index].count += 1;
        }

        histogram
    }
}

fn group_by_label(labeled: &[LabeledTransaction]) -> Vec<GroupSummary> {
    let mut metrics: [GroupMetrics; 3] = Default::default();
    for tx in labeled {
        metrics[tx.risk_label.index()].add(tx);
    }

    RiskLabel::ALL
        .iter()
        .zip(metrics)
        .map(|(&label, metrics)| GroupSummary {
            key: GroupKey::Label { label },
            metrics,
        })
        .collect()
}

fn group_by_bucket(
    labeled: &[LabeledTransaction],
    bucket: TimeBucket,
    dense: bool,
) -> Vec<GroupSummary> {
    // BTreeMap keeps buckets ascending, then labels in Low/Medium/High order
    let mut grouped: BTreeMap<(NaiveDate, RiskLabel), GroupMetrics> = BTreeMap::new();
    for tx in labeled {
        let start = bucket.start_of(tx.transaction.date());
        grouped.entry((start, tx.risk_label)).or_default().add(tx);
    }

    if dense {
        let first = grouped.keys().next().map(|(d, _)| *d);
        let last = grouped.keys().next_back().map(|(d, _)| *d);
        if let (Some(first), Some(last)) = (first, last) {
            let mut start = first;
            while start <= last {
                for label in RiskLabel::ALL {
                    grouped.entry((start, label)).or_default();
                }
                start = bucket.next_start(start);
            }
        }
    }

    grouped
        .into_iter()
        .map(|((start, label), metrics)| GroupSummary {
            key: GroupKey::Bucket {
                label,
                bucket: bucket.label(start),
                start,
            },
            metrics,
        })
        .collect()
}

fn group_by_entity(labeled: &[LabeledTransaction], kind: EntityKind) -> Vec<GroupSummary> {
    let mut grouped: HashMap<(String, RiskLabel), GroupMetrics> = HashMap::new();
    for tx in labeled {
        grouped
            .entry((kind.key_of(&tx.transaction), tx.risk_label))
            .or_default()
            .add(tx);
    }

    let mut rows: Vec<GroupSummary> = grouped
        .into_iter()
        .map(|((entity, label), metrics)| GroupSummary {
            key: GroupKey::Entity { label, entity },
            metrics,
        })
        .collect();

    rows.sort_by(compare_entity_rows);
    rows
}

/// Total amount descending, then entity ascending, then label order.
/// Entity keys compare as plain strings, so numeric ids only sort
/// numerically when they share a width.
fn compare_entity_rows(a: &GroupSummary, b: &GroupSummary) -> Ordering {
    let entity = |g: &GroupSummary| match &g.key {
        GroupKey::Entity { entity, .. } => entity.clone(),
        _ => String::new(),
    };

    b.metrics
        .total_amount
        .cmp(&a.metrics.total_amount)
        .then_with(|| entity(a).cmp(&entity(b)))
        .then_with(|| a.key.label().cmp(&b.key.label()))
}

/// Lossy conversion used for shares, ratios and chart inputs
pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{RiskAssessment, Tier};

    fn labeled(
        id: &str,
        customer: &str,
        sector: Option<&str>,
        amount: i64,
        delay: i64,
        date: (i32, u32, u32),
        label: RiskLabel,
    ) -> LabeledTransaction {
        let ts = NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let mut tx = Transaction::new(id, customer, Decimal::new(amount, 0), delay, ts);
        if let Some(s) = sector {
            tx = tx.with_sector(s);
        }
        LabeledTransaction::new(
            tx,
            RiskAssessment {
                label,
                delay_tier: Tier::Low,
                amount_tier: Tier::Low,
            },
        )
    }

    fn sample() -> Vec<LabeledTransaction> {
        vec![
            labeled("1", "c1", Some("Retail"), 100, 2, (2024, 1, 5), RiskLabel::Low),
            labeled("2", "c2", Some("Retail"), 300, 40, (2024, 1, 20), RiskLabel::High),
            labeled("3", "c1", Some("Logistics"), 200, 10, (2024, 3, 2), RiskLabel::Medium),
            labeled("4", "c3", None, 300, 35, (2024, 3, 9), RiskLabel::High),
            labeled("5", "c2", Some("Retail"), 50, -3, (2024, 3, 31), RiskLabel::Low),
        ]
    }

    #[test]
    fn test_by_label_counts_and_shares() {
        let engine = AggregationEngine::default();
        let result = engine.by_label(&sample());

        let labels: Vec<RiskLabel> = result.groups.iter().map(|g| g.key.label()).collect();
        assert_eq!(labels, RiskLabel::ALL.to_vec());

        let low = result.for_label(RiskLabel::Low).unwrap();
        assert_eq!(low.count, 2);
        assert_eq!(low.total_amount, Decimal::new(150, 0));
        assert!((low.avg_delay_days - (-0.5)).abs() < 1e-12);

        let high = result.for_label(RiskLabel::High).unwrap();
        assert_eq!(high.count, 2);
        assert_eq!(high.total_amount, Decimal::new(600, 0));
        assert!((high.share - 0.4).abs() < 1e-12);

        assert_eq!(result.total_count, 5);
        assert_eq!(result.total_amount, Decimal::new(950, 0));
        assert!((result.share_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input_gives_zero_rows() {
        let engine = AggregationEngine::default();
        let result = engine.by_label(&[]);

        assert_eq!(result.groups.len(), 3);
        assert!(result.is_empty());
        for group in &result.groups {
            assert_eq!(group.metrics.count, 0);
            assert_eq!(group.metrics.total_amount, Decimal::ZERO);
            assert_eq!(group.metrics.share, 0.0);
        }
        assert_eq!(result.share_sum(), 0.0);

        assert!(engine.by_bucket(&[]).groups.is_empty());
        assert!(engine.by_entity(&[], EntityKind::Sector).groups.is_empty());
    }

    #[test]
    fn test_monthly_buckets_are_sparse_and_ordered() {
        let engine = AggregationEngine::default();
        let result = engine.by_bucket(&sample());

        let keys: Vec<(String, RiskLabel)> = result
            .groups
            .iter()
            .map(|g| match &g.key {
                GroupKey::Bucket { bucket, label, .. } => (bucket.clone(), *label),
                other => panic!("unexpected key {:?}", other),
            })
            .collect();

        assert_eq!(
            keys,
            vec![
                ("2024-01".to_string(), RiskLabel::Low),
                ("2024-01".to_string(), RiskLabel::High),
                ("2024-03".to_string(), RiskLabel::Low),
                ("2024-03".to_string(), RiskLabel::Medium),
                ("2024-03".to_string(), RiskLabel::High),
            ]
        );
        assert!((result.share_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_dense_buckets_fill_gaps() {
        let engine = AggregationEngine::new(AggregationConfig {
            bucket: TimeBucket::Month,
            dense_buckets: true,
        });
        let result = engine.by_bucket(&sample());

        // Jan, Feb, Mar × 3 labels
        assert_eq!(result.groups.len(), 9);
        let february: Vec<&GroupSummary> = result
            .groups
            .iter()
            .filter(|g| matches!(&g.key, GroupKey::Bucket { bucket, .. } if bucket == "2024-02"))
            .collect();
        assert_eq!(february.len(), 3);
        assert!(february.iter().all(|g| g.metrics.count == 0));
    }

    #[test]
    fn test_bucket_boundaries() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();

        assert_eq!(TimeBucket::Month.start_of(d(2024, 2, 29)), d(2024, 2, 1));
        assert_eq!(TimeBucket::Month.next_start(d(2024, 1, 1)), d(2024, 2, 1));
        assert_eq!(TimeBucket::Month.next_start(d(2024, 12, 1)), d(2025, 1, 1));
        // 2024-03-07 is a Thursday
        assert_eq!(TimeBucket::Week.start_of(d(2024, 3, 7)), d(2024, 3, 4));
        assert_eq!(TimeBucket::Week.label(d(2024, 3, 4)), "2024-W10");
        assert_eq!(TimeBucket::Day.label(d(2024, 3, 4)), "2024-03-04");
        assert_eq!("monthly".parse::<TimeBucket>().unwrap(), TimeBucket::Month);
    }

    #[test]
    fn test_group_by_from_dimension_name() {
        assert_eq!("label".parse::<GroupBy>().unwrap(), GroupBy::Label);
        assert_eq!(
            "week".parse::<GroupBy>().unwrap(),
            GroupBy::LabelAndBucket(TimeBucket::Week)
        );
        assert_eq!(
            "Sector".parse::<GroupBy>().unwrap(),
            GroupBy::LabelAndEntity(EntityKind::Sector)
        );
        assert!("country".parse::<GroupBy>().is_err());
    }

    #[test]
    fn test_entity_rows_sorted_by_amount() {
        let engine = AggregationEngine::default();
        let mut data = sample();
        data.push(labeled("6", "c4", Some("Services"), 300, 31, (2024, 2, 1), RiskLabel::High));

        let result = engine.by_entity(&data, EntityKind::Customer);
        let keys: Vec<(String, RiskLabel, Decimal)> = result
            .groups
            .iter()
            .map(|g| match &g.key {
                GroupKey::Entity { entity, label } => (entity.clone(), *label, g.metrics.total_amount),
                other => panic!("unexpected key {:?}", other),
            })
            .collect();

        assert_eq!(
            keys,
            vec![
                ("c2".to_string(), RiskLabel::High, Decimal::new(300, 0)),
                ("c3".to_string(), RiskLabel::High, Decimal::new(300, 0)),
                ("c4".to_string(), RiskLabel::High, Decimal::new(300, 0)),
                ("c1".to_string(), RiskLabel::Medium, Decimal::new(200, 0)),
                ("c1".to_string(), RiskLabel::Low, Decimal::new(100, 0)),
                ("c2".to_string(), RiskLabel::Low, Decimal::new(50, 0)),
            ]
        );
    }

    #[test]
    fn test_missing_sector_groups_as_unknown() {
        let engine = AggregationEngine::default();
        let matrix = engine.entity_label_matrix(&sample(), EntityKind::Sector);

        let entities: Vec<&str> = matrix.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(entities, vec!["Logistics", "Retail", "Unknown"]);
        assert_eq!(matrix[1].counts, [2, 0, 1]);
        assert_eq!(matrix[2].counts, [0, 0, 1]);
        assert_eq!(matrix.iter().map(|r| r.total()).sum::<usize>(), 5);
    }

    #[test]
    fn test_top_entities_for_label() {
        let engine = AggregationEngine::default();
        let mut data = sample();
        data.push(labeled("7", "c3", None, 10, 50, (2024, 4, 1), RiskLabel::High));

        let top = engine.top_entities(&data, RiskLabel::High, EntityKind::Customer, 10);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].entity, "c3");
        assert_eq!(top[0].count, 2);
        assert_eq!(top[1].entity, "c2");

        let limited = engine.top_entities(&data, RiskLabel::High, EntityKind::Customer, 1);
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_amount_stats_and_histogram() {
        let engine = AggregationEngine::default();
        let stats = engine.label_amount_stats(&sample());
        assert_eq!(stats[0].label, RiskLabel::Low);
        assert_eq!(stats[0].min, Some(Decimal::new(50, 0)));
        assert_eq!(stats[0].max, Some(Decimal::new(100, 0)));
        assert_eq!(stats[0].mean, Some(Decimal::new(75, 0)));
        assert_eq!(stats[1].count, 1);

        // delays: -3, 2, 10, 35, 40 → span 44, 4 bins of width 11
        let histogram = engine.delay_histogram(&sample(), 4);
        assert_eq!(histogram.len(), 4);
        assert_eq!(histogram[0].lower, -3);
        assert_eq!(histogram[0].upper, 7);
        assert_eq!(histogram[3].upper, 40);
        assert_eq!(histogram.iter().map(|b| b.count).sum::<usize>(), 5);
        assert_eq!(histogram[0].count, 2);
        assert_eq!(histogram[3].count, 2);

        assert!(engine.delay_histogram(&[], 10).is_empty());
    }

    #[test]
    fn test_extreme_delays_sum_without_overflow() {
        let engine = AggregationEngine::default();
        let delay = i64::MAX / 2 + 1;
        let data = vec![
            labeled("1", "c1", Some("Retail"), 100, delay, (2024, 1, 5), RiskLabel::High),
            labeled("2", "c2", Some("Retail"), 100, delay, (2024, 1, 6), RiskLabel::High),
        ];

        let result = engine.by_label(&data);
        let high = result.for_label(RiskLabel::High).unwrap();
        assert_eq!(high.total_delay_days, 2 * i128::from(delay));
        assert!((high.avg_delay_days - delay as f64).abs() < 1.0);

        let by_sector = engine.by_entity(&data, EntityKind::Sector);
        assert_eq!(by_sector.groups[0].metrics.count, 2);
    }

    #[test]
    fn test_histogram_spans_full_delay_range() {
        let engine = AggregationEngine::default();
        let data = vec![
            labeled("1", "c1", None, 100, i64::MIN, (2024, 1, 5), RiskLabel::Low),
            labeled("2", "c1", None, 100, 0, (2024, 1, 6), RiskLabel::Low),
            labeled("3", "c2", None, 100, i64::MAX, (2024, 1, 7), RiskLabel::High),
        ];

        let histogram = engine.delay_histogram(&data, 10);
        assert_eq!(histogram.len(), 10);
        assert_eq!(histogram[0].lower, i64::MIN);
        assert_eq!(histogram[9].upper, i64::MAX);
        assert_eq!(histogram[0].count, 1);
        assert_eq!(histogram[9].count, 1);
        assert_eq!(histogram.iter().map(|b| b.count).sum::<usize>(), 3);

        // Bins tile the range without gaps
        for pair in histogram.windows(2) {
            assert_eq!(pair[0].upper + 1, pair[1].lower);
        }
    }
}
