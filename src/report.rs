// 🧾 Reporting Facade
// Read-only projections of aggregation results into ordered, named-column tables
// for the CLI, the dashboard and the HTTP API

use crate::aggregation::{
    decimal_to_f64, AggregationEngine, AggregationResult, AmountStats, EntityCount, EntityKind,
    GroupBy, GroupKey, HistogramBin, MatrixRow,
};
use crate::error::{RiskError, RiskResult};
use crate::transaction::{LabeledTransaction, RiskLabel};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

// ============================================================================
// TABLE MODEL
// ============================================================================

pub const COL_LABEL: &str = "label";
pub const COL_BUCKET: &str = "bucket";
pub const COL_ENTITY: &str = "entity";
pub const COL_COUNT: &str = "count";
pub const COL_TOTAL_AMOUNT: &str = "total_amount";
pub const COL_AVG_DELAY: &str = "avg_delay_days";
pub const COL_SHARE: &str = "share";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Integer(i64),
    Float(f64),
    Amount(Decimal),
    Text(String),
    Empty,
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn count(n: usize) -> Self {
        Cell::Integer(n as i64)
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Cell::Integer(_) | Cell::Float(_) | Cell::Amount(_))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Integer(n) => write!(f, "{}", n),
            Cell::Float(x) => write!(f, "{:.4}", x),
            Cell::Amount(d) => write!(f, "{}", d.round_dp(2)),
            Cell::Text(s) => f.write_str(s),
            Cell::Empty => Ok(()),
        }
    }
}

/// Ordered rows with named columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl SummaryTable {
    pub fn new(title: impl Into<String>, columns: &[&str]) -> Self {
        SummaryTable {
            title: title.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of one column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)
            .context("Failed to write CSV header")?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|c| c.to_string()))
                .context("Failed to write CSV row")?;
        }
        wtr.flush().context("Failed to flush CSV output")?;
        Ok(())
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer).context("CSV output is not valid UTF-8")
    }
}

/// Fixed-width text rendering; numbers right-aligned
impl fmt::Display for SummaryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                rendered
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        if !self.title.is_empty() {
            writeln!(f, "{}", self.title)?;
        }

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(name, w)| format!("{:<w$}", name, w = w))
            .collect();
        writeln!(f, "{}", header.join("  ").trim_end())?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("  "))?;

        for (row, cells) in rendered.iter().zip(&self.rows) {
            let line: Vec<String> = row
                .iter()
                .zip(cells)
                .zip(&widths)
                .map(|((text, cell), w)| {
                    if cell.is_numeric() {
                        format!("{:>w$}", text, w = w)
                    } else {
                        format!("{:<w$}", text, w = w)
                    }
                })
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())?;
        }

        Ok(())
    }
}

// ============================================================================
// PROJECTIONS
// ============================================================================

/// Project an aggregation result into a table, keeping the engine's row order
pub fn summary_table(result: &AggregationResult) -> SummaryTable {
    let (title, columns): (String, Vec<&str>) = match result.group_by {
        GroupBy::Label => (
            "Risk distribution".to_string(),
            vec![COL_LABEL, COL_COUNT, COL_TOTAL_AMOUNT, COL_AVG_DELAY, COL_SHARE],
        ),
        GroupBy::LabelAndBucket(bucket) => (
            format!("Risk by {}", bucket.as_str()),
            vec![COL_LABEL, COL_BUCKET, COL_COUNT, COL_TOTAL_AMOUNT, COL_AVG_DELAY, COL_SHARE],
        ),
        GroupBy::LabelAndEntity(kind) => (
            format!("Risk by {}", kind.as_str()),
            vec![COL_LABEL, COL_ENTITY, COL_COUNT, COL_TOTAL_AMOUNT, COL_AVG_DELAY, COL_SHARE],
        ),
    };

    let mut table = SummaryTable::new(title, &columns);
    for group in &result.groups {
        let mut row = vec![Cell::text(group.key.label().as_str())];
        match &group.key {
            GroupKey::Bucket { bucket, .. } => row.push(Cell::text(bucket.clone())),
            GroupKey::Entity { entity, .. } => row.push(Cell::text(entity.clone())),
            GroupKey::Label { .. } => {}
        }
        row.push(Cell::count(group.metrics.count));
        row.push(Cell::Amount(group.metrics.total_amount));
        row.push(Cell::Float(group.metrics.avg_delay_days));
        row.push(Cell::Float(group.metrics.share));
        table.push_row(row);
    }
    table
}

pub fn top_entities_table(label: RiskLabel, kind: EntityKind, ranked: &[EntityCount]) -> SummaryTable {
    let mut table = SummaryTable::new(
        format!("Top {}s by {} risk transactions", kind.as_str(), label),
        &[COL_ENTITY, "name", COL_COUNT, COL_TOTAL_AMOUNT],
    );
    for entry in ranked {
        table.push_row(vec![
            Cell::text(entry.entity.clone()),
            entry.name.clone().map(Cell::Text).unwrap_or(Cell::Empty),
            Cell::count(entry.count),
            Cell::Amount(entry.total_amount),
        ]);
    }
    table
}

/// Entity × label pivot with Low/Medium/High columns always present
pub fn matrix_table(kind: EntityKind, matrix: &[MatrixRow]) -> SummaryTable {
    let mut table = SummaryTable::new(
        format!("{} vs risk", kind.as_str()),
        &[COL_ENTITY, "Low", "Medium", "High", "total"],
    );
    for row in matrix {
        table.push_row(vec![
            Cell::text(row.entity.clone()),
            Cell::count(row.counts[0]),
            Cell::count(row.counts[1]),
            Cell::count(row.counts[2]),
            Cell::count(row.total()),
        ]);
    }
    table
}

pub fn amount_stats_table(stats: &[AmountStats]) -> SummaryTable {
    let mut table = SummaryTable::new(
        "Amount by risk level",
        &[COL_LABEL, COL_COUNT, "min_amount", "mean_amount", "max_amount"],
    );
    let opt = |v: Option<Decimal>| v.map(Cell::Amount).unwrap_or(Cell::Empty);
    for s in stats {
        table.push_row(vec![
            Cell::text(s.label.as_str()),
            Cell::count(s.count),
            opt(s.min),
            opt(s.mean),
            opt(s.max),
        ]);
    }
    table
}

pub fn histogram_table(bins: &[HistogramBin]) -> SummaryTable {
    let mut table = SummaryTable::new("Delay days distribution", &["from_days", "to_days", COL_COUNT]);
    for bin in bins {
        table.push_row(vec![
            Cell::Integer(bin.lower),
            Cell::Integer(bin.upper),
            Cell::count(bin.count),
        ]);
    }
    table
}

// ============================================================================
// KPIs
// ============================================================================

/// Headline dashboard metrics over a (filtered) labeled set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_transactions: usize,
    pub total_amount: Decimal,
    pub avg_delay_days: f64,
    pub high_count: usize,
    pub high_ratio_pct: f64,
    pub paid_rate_pct: f64,
    pub late_rate_pct: f64,
}

impl Kpis {
    pub fn compute(labeled: &[LabeledTransaction]) -> Self {
        let total = labeled.len();
        if total == 0 {
            return Kpis::default();
        }

        let pct = |n: usize| n as f64 / total as f64 * 100.0;
        let high_count = labeled
            .iter()
            .filter(|t| t.risk_label == RiskLabel::High)
            .count();
        let paid = labeled.iter().filter(|t| t.transaction.is_paid).count();
        let late = labeled.iter().filter(|t| t.transaction.is_late()).count();
        let delay_sum: i128 = labeled.iter().map(|t| i128::from(t.delay_days())).sum();

        Kpis {
            total_transactions: total,
            total_amount: labeled.iter().map(|t| t.amount()).sum(),
            avg_delay_days: delay_sum as f64 / total as f64,
            high_count,
            high_ratio_pct: pct(high_count),
            paid_rate_pct: pct(paid),
            late_rate_pct: pct(late),
        }
    }

    pub fn to_table(&self) -> SummaryTable {
        let mut table = SummaryTable::new("Key metrics", &["metric", "value"]);
        let rows = [
            ("Total Transactions", Cell::count(self.total_transactions)),
            ("Total Amount", Cell::Amount(self.total_amount)),
            ("Average Delay (days)", Cell::Float(self.avg_delay_days)),
            ("High Risk Count", Cell::count(self.high_count)),
            ("High Risk Ratio (%)", Cell::Float(self.high_ratio_pct)),
            ("Paid Rate (%)", Cell::Float(self.paid_rate_pct)),
            ("Late Payment Rate (%)", Cell::Float(self.late_rate_pct)),
        ];
        for (name, value) in rows {
            table.push_row(vec![Cell::text(name), value]);
        }
        table
    }

    pub fn total_amount_f64(&self) -> f64 {
        decimal_to_f64(self.total_amount)
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// Subset selection applied before aggregation; empty lists mean "all"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportFilter {
    pub labels: Vec<RiskLabel>,
    pub sectors: Vec<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ReportFilter {
    pub fn validate(&self) -> RiskResult<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(RiskError::InvalidFilter(format!(
                    "start date {} is after end date {}",
                    from, to
                )));
            }
        }
        Ok(())
    }

    pub fn is_unrestricted(&self) -> bool {
        self.labels.is_empty() && self.sectors.is_empty() && self.from.is_none() && self.to.is_none()
    }

    pub fn matches(&self, tx: &LabeledTransaction) -> bool {
        let date = tx.transaction.date();
        (self.labels.is_empty() || self.labels.contains(&tx.risk_label))
            && (self.sectors.is_empty()
                || self
                    .sectors
                    .iter()
                    .any(|s| s == tx.transaction.sector_or_unknown()))
            && self.from.map_or(true, |from| date >= from)
            && self.to.map_or(true, |to| date <= to)
    }

    pub fn apply(&self, labeled: &[LabeledTransaction]) -> RiskResult<Vec<LabeledTransaction>> {
        self.validate()?;
        Ok(labeled.iter().filter(|t| self.matches(t)).cloned().collect())
    }
}

// ============================================================================
// FACADE
// ============================================================================

/// Read-only entry point for presentation collaborators
#[derive(Debug, Clone, Default)]
pub struct ReportingFacade {
    engine: AggregationEngine,
}

impl ReportingFacade {
    pub fn new(engine: AggregationEngine) -> Self {
        ReportingFacade { engine }
    }

    pub fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    pub fn summary(&self, labeled: &[LabeledTransaction], group_by: GroupBy) -> SummaryTable {
        summary_table(&self.engine.aggregate(labeled, group_by))
    }

    pub fn kpis(&self, labeled: &[LabeledTransaction]) -> Kpis {
        Kpis::compute(labeled)
    }

    pub fn top_entities(
        &self,
        labeled: &[LabeledTransaction],
        label: RiskLabel,
        kind: EntityKind,
        limit: usize,
    ) -> SummaryTable {
        let ranked = self.engine.top_entities(labeled, label, kind, limit);
        top_entities_table(label, kind, &ranked)
    }

    pub fn matrix(&self, labeled: &[LabeledTransaction], kind: EntityKind) -> SummaryTable {
        matrix_table(kind, &self.engine.entity_label_matrix(labeled, kind))
    }

    pub fn amount_stats(&self, labeled: &[LabeledTransaction]) -> SummaryTable {
        amount_stats_table(&self.engine.label_amount_stats(labeled))
    }

    pub fn delay_histogram(&self, labeled: &[LabeledTransaction], bins: usize) -> SummaryTable {
        histogram_table(&self.engine.delay_histogram(labeled, bins))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::TimeBucket;
    use crate::batch::BatchRunner;
    use crate::classifier::RiskClassifier;
    use crate::transaction::Transaction;

    fn dataset() -> Vec<LabeledTransaction> {
        let ts = |m: u32, d: u32| {
            NaiveDate::from_ymd_opt(2024, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let batch = vec![
            Transaction::new("1", "c1", Decimal::new(1_000, 0), 2, ts(1, 3)).with_sector("Retail"),
            Transaction::new("2", "c2", Decimal::new(70_000, 0), 12, ts(1, 9)).with_sector("Retail"),
            Transaction::new("3", "c2", Decimal::new(3_000, 0), 45, ts(2, 1))
                .with_sector("Technology")
                .with_paid(false),
            Transaction::new("4", "c3", Decimal::new(120_000, 0), -2, ts(2, 14)),
        ];
        BatchRunner::new(RiskClassifier::default()).run(&batch).labeled
    }

    #[test]
    fn test_label_table_order_and_columns() {
        let facade = ReportingFacade::default();
        let table = facade.summary(&dataset(), GroupBy::Label);

        assert_eq!(table.columns, vec!["label", "count", "total_amount", "avg_delay_days", "share"]);
        let labels: Vec<String> = table
            .column(COL_LABEL)
            .unwrap()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(labels, vec!["Low", "Medium", "High"]);
        assert_eq!(table.rows[0][1], Cell::Integer(1));
        assert_eq!(table.rows[1][1], Cell::Integer(1));
        assert_eq!(table.rows[2][1], Cell::Integer(2));
    }

    #[test]
    fn test_bucket_and_entity_tables_have_extra_column() {
        let facade = ReportingFacade::default();
        let data = dataset();

        let by_month = facade.summary(&data, GroupBy::LabelAndBucket(TimeBucket::Month));
        assert_eq!(by_month.column_index(COL_BUCKET), Some(1));

        let by_customer = facade.summary(&data, GroupBy::LabelAndEntity(EntityKind::Customer));
        assert_eq!(by_customer.column_index(COL_ENTITY), Some(1));
        let amounts = by_customer.column(COL_TOTAL_AMOUNT).unwrap();
        assert_eq!(*amounts[0], Cell::Amount(Decimal::new(120_000, 0)));
    }

    #[test]
    fn test_kpis() {
        let kpis = Kpis::compute(&dataset());
        assert_eq!(kpis.total_transactions, 4);
        assert_eq!(kpis.total_amount, Decimal::new(194_000, 0));
        assert_eq!(kpis.high_count, 2);
        assert!((kpis.high_ratio_pct - 50.0).abs() < 1e-9);
        assert!((kpis.paid_rate_pct - 75.0).abs() < 1e-9);
        assert!((kpis.late_rate_pct - 75.0).abs() < 1e-9);
        assert!((kpis.avg_delay_days - 14.25).abs() < 1e-9);
        assert_eq!(kpis.to_table().len(), 7);

        assert_eq!(Kpis::compute(&[]), Kpis::default());
    }

    #[test]
    fn test_kpis_and_histogram_with_extreme_delays() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let delay = i64::MAX / 2 + 1;
        let batch = vec![
            Transaction::new("a", "c1", Decimal::new(10, 0), delay, ts),
            Transaction::new("b", "c2", Decimal::new(10, 0), delay, ts),
            Transaction::new("c", "c3", Decimal::new(10, 0), i64::MIN, ts),
        ];
        let data = BatchRunner::new(RiskClassifier::default()).run(&batch).labeled;
        assert_eq!(data.len(), 3);

        let kpis = Kpis::compute(&data[..2]);
        assert!((kpis.avg_delay_days - delay as f64).abs() < 1.0);

        let table = ReportingFacade::default().delay_histogram(&data, 4);
        assert_eq!(table.rows[0][0], Cell::Integer(i64::MIN));
        assert_eq!(table.rows[table.len() - 1][1], Cell::Integer(delay));
    }

    #[test]
    fn test_filter() {
        let data = dataset();

        let filter = ReportFilter {
            labels: vec![RiskLabel::High],
            ..Default::default()
        };
        assert_eq!(filter.apply(&data).unwrap().len(), 2);

        let filter = ReportFilter {
            sectors: vec!["Unknown".to_string()],
            ..Default::default()
        };
        let selected = filter.apply(&data).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id(), "4");

        let filter = ReportFilter {
            from: NaiveDate::from_ymd_opt(2024, 1, 5),
            to: NaiveDate::from_ymd_opt(2024, 2, 1),
            ..Default::default()
        };
        let ids: Vec<String> = filter
            .apply(&data)
            .unwrap()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert!(ReportFilter::default().is_unrestricted());
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let filter = ReportFilter {
            from: NaiveDate::from_ymd_opt(2024, 3, 1),
            to: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        assert!(matches!(filter.apply(&dataset()), Err(RiskError::InvalidFilter(_))));
    }

    #[test]
    fn test_csv_and_text_rendering() {
        let facade = ReportingFacade::default();
        let table = facade.summary(&[], GroupBy::Label);

        let csv = table.to_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("label,count,total_amount,avg_delay_days,share"));
        assert_eq!(lines.next(), Some("Low,0,0,0.0000,0.0000"));

        let text = table.to_string();
        assert!(text.starts_with("Risk distribution"));
        assert!(text.contains("Medium"));
    }

    #[test]
    fn test_matrix_and_top_tables() {
        let facade = ReportingFacade::default();
        let data = dataset();

        let matrix = facade.matrix(&data, EntityKind::Sector);
        assert_eq!(matrix.columns, vec!["entity", "Low", "Medium", "High", "total"]);
        assert_eq!(matrix.len(), 3);

        let top = facade.top_entities(&data, RiskLabel::High, EntityKind::Customer, 10);
        assert_eq!(top.len(), 1);
        assert_eq!(top.rows[0][0], Cell::text("c2"));
        assert_eq!(top.rows[0][1], Cell::Empty);
        assert_eq!(top.rows[0][2], Cell::Integer(2));

        assert_eq!(facade.amount_stats(&data).len(), 3);
        assert!(!facade.delay_histogram(&data, 5).is_empty());
    }
}
