// 📥 Ingestion Boundary
// Raw CSV loading (customers, transactions, payments), merge + cleaning, and the
// prepared analysis table read/write

use crate::batch::RecordFailure;
use crate::transaction::{LabeledTransaction, Tier, Transaction, UNKNOWN_SECTOR};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub const CUSTOMERS_FILE: &str = "customers.csv";
pub const TRANSACTIONS_FILE: &str = "transactions.csv";
pub const PAYMENTS_FILE: &str = "payments.csv";

/// Timestamp format written to CSV and SQLite
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// RAW RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCustomer {
    pub customer_id: String,
    pub customer_name: String,
    pub sector: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txn_id: String,
    pub customer_id: String,
    pub txn_date: String,
    pub txn_type: String,
    pub amount: String,
    pub currency: String,
    pub due_date: String,
}

impl RawTransaction {
    /// Content hash over every column; identical rows hash identically
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.txn_id,
            self.customer_id,
            self.txn_date,
            self.txn_type,
            self.amount,
            self.currency,
            self.due_date
        ));
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayment {
    pub payment_id: String,
    pub txn_id: String,
    pub payment_date: Option<String>,
    pub paid_amount: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    pub customers: Vec<RawCustomer>,
    pub transactions: Vec<RawTransaction>,
    pub payments: Vec<RawPayment>,
}

/// Cleaned transactions plus what the cleaning step dropped
#[derive(Debug, Clone, Default)]
pub struct PreparedData {
    pub transactions: Vec<Transaction>,
    pub duplicates_removed: usize,
    pub unknown_customers: usize,
}

/// Flat-file ingestion result; rejected rows have non-numeric amount or delay
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub transactions: Vec<Transaction>,
    pub rejected: Vec<RecordFailure>,
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DDTHH:MM:SS`
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for fmt in [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| anyhow!("unrecognised date: {:?}", value))
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_amount(value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim()).map_err(|e| anyhow!("non-numeric amount {:?}: {}", value, e))
}

fn parse_delay(value: &str) -> Result<i64> {
    let trimmed = value.trim();
    if let Ok(days) = trimmed.parse::<i64>() {
        return Ok(days);
    }
    // Spreadsheet exports write whole days as "12.0"
    match trimmed.parse::<f64>() {
        Ok(days) if days.is_finite() && days.fract() == 0.0 => Ok(days as i64),
        _ => bail!("non-numeric delay_days {:?}", value),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn read_csv<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let mut records = Vec::new();
    for (i, result) in rdr.deserialize().enumerate() {
        let record: T = result
            .with_context(|| format!("Failed to deserialize row {} of {:?}", i + 2, path))?;
        records.push(record);
    }
    Ok(records)
}

// ============================================================================
// RAW DATASET → TRANSACTIONS
// ============================================================================

pub fn load_raw_dataset(dir: &Path) -> Result<RawDataset> {
    let dataset = RawDataset {
        customers: read_csv(&dir.join(CUSTOMERS_FILE))?,
        transactions: read_csv(&dir.join(TRANSACTIONS_FILE))?,
        payments: read_csv(&dir.join(PAYMENTS_FILE))?,
    };
    info!(
        customers = dataset.customers.len(),
        transactions = dataset.transactions.len(),
        payments = dataset.payments.len(),
        "loaded raw CSVs from {:?}",
        dir
    );
    Ok(dataset)
}

/// Merge transactions with payments and customers, drop duplicate rows and
/// derive `delay_days`, `is_paid` and `sector`
pub fn prepare_transactions(raw: &RawDataset) -> Result<PreparedData> {
    // First payment per transaction wins
    let mut payments: HashMap<&str, &RawPayment> = HashMap::new();
    for payment in &raw.payments {
        payments.entry(payment.txn_id.as_str()).or_insert(payment);
    }

    let customers: HashMap<&str, &RawCustomer> = raw
        .customers
        .iter()
        .map(|c| (c.customer_id.as_str(), c))
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut prepared = PreparedData::default();

    for (i, row) in raw.transactions.iter().enumerate() {
        if !seen.insert(row.content_hash()) {
            prepared.duplicates_removed += 1;
            continue;
        }

        let row_ctx = || format!("transactions.csv row {} (txn_id {:?})", i + 2, row.txn_id);
        if row.txn_id.trim().is_empty() || row.customer_id.trim().is_empty() {
            bail!("{}: missing txn_id or customer_id", row_ctx());
        }

        let timestamp = parse_timestamp(&row.txn_date).with_context(row_ctx)?;
        let due_date = parse_timestamp(&row.due_date).with_context(row_ctx)?;
        let amount = parse_amount(&row.amount).with_context(row_ctx)?;

        // Unparseable payment dates count as unpaid
        let payment_date = payments
            .get(row.txn_id.as_str())
            .and_then(|p| p.payment_date.as_deref())
            .and_then(|d| parse_timestamp(d).ok());

        let (is_paid, delay_days) = match payment_date {
            Some(paid_at) => (true, (paid_at.date() - due_date.date()).num_days()),
            None => (false, 0),
        };

        let mut tx = Transaction::new(
            row.txn_id.trim(),
            row.customer_id.trim(),
            amount,
            delay_days,
            timestamp,
        )
        .with_kind(row.currency.clone(), row.txn_type.clone())
        .with_paid(is_paid);

        match customers.get(row.customer_id.trim()) {
            Some(customer) => {
                tx = tx
                    .with_customer_name(customer.customer_name.clone())
                    .with_sector(
                        non_empty(customer.sector.clone()).unwrap_or_else(|| UNKNOWN_SECTOR.to_string()),
                    )
                    .with_country(
                        non_empty(customer.country.clone()).unwrap_or_else(|| "Unknown".to_string()),
                    );
            }
            None => {
                prepared.unknown_customers += 1;
                tx = tx.with_sector(UNKNOWN_SECTOR).with_country("Unknown");
            }
        }

        prepared.transactions.push(tx);
    }

    info!(
        kept = prepared.transactions.len(),
        duplicates_removed = prepared.duplicates_removed,
        unknown_customers = prepared.unknown_customers,
        "prepared transactions"
    );
    Ok(prepared)
}

// ============================================================================
// ANALYSIS TABLE (flat transactions + risk columns)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub txn_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub txn_type: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    pub amount: String,
    pub txn_date: String,
    #[serde(default)]
    pub is_paid: Option<String>,
    pub delay_days: String,
    #[serde(default)]
    pub risk_label: Option<String>,
    #[serde(default)]
    pub risk_score: Option<u8>,
    #[serde(default)]
    pub delay_tier: Option<u8>,
    #[serde(default)]
    pub amount_tier: Option<u8>,
}

impl From<&LabeledTransaction> for AnalysisRow {
    fn from(labeled: &LabeledTransaction) -> Self {
        let tx = &labeled.transaction;
        AnalysisRow {
            txn_id: tx.id.clone(),
            customer_id: tx.customer_id.clone(),
            customer_name: tx.customer_name.clone(),
            sector: tx.sector.clone(),
            country: tx.country.clone(),
            txn_type: tx.txn_type.clone(),
            currency: tx.currency.clone(),
            amount: tx.amount.to_string(),
            txn_date: format_timestamp(&tx.timestamp),
            is_paid: Some(tx.is_paid.to_string()),
            delay_days: tx.delay_days.to_string(),
            risk_label: Some(labeled.risk_label.to_string()),
            risk_score: Some(labeled.risk_score),
            delay_tier: Some(labeled.delay_tier.index() as u8),
            amount_tier: Some(labeled.amount_tier.index() as u8),
        }
    }
}

impl AnalysisRow {
    /// Rebuild the transaction; numeric problems are per-record, missing
    /// identity or date is a hard error
    fn into_transaction(self, row_number: usize) -> Result<std::result::Result<Transaction, RecordFailure>> {
        if self.txn_id.trim().is_empty() || self.customer_id.trim().is_empty() {
            bail!("row {}: missing txn_id or customer_id", row_number);
        }
        let timestamp = parse_timestamp(&self.txn_date)
            .with_context(|| format!("row {} (txn_id {:?})", row_number, self.txn_id))?;

        let reject = |reason: String| RecordFailure {
            transaction_id: self.txn_id.clone(),
            reason,
        };
        let amount = match parse_amount(&self.amount) {
            Ok(a) => a,
            Err(e) => return Ok(Err(reject(e.to_string()))),
        };
        let delay_days = match parse_delay(&self.delay_days) {
            Ok(d) => d,
            Err(e) => return Ok(Err(reject(e.to_string()))),
        };

        let mut tx = Transaction::new(
            self.txn_id.trim(),
            self.customer_id.trim(),
            amount,
            delay_days,
            timestamp,
        )
        .with_paid(self.is_paid.as_deref().and_then(parse_bool).unwrap_or(true));
        tx.customer_name = non_empty(self.customer_name);
        tx.sector = non_empty(self.sector);
        tx.country = non_empty(self.country);
        tx.txn_type = non_empty(self.txn_type);
        tx.currency = non_empty(self.currency);
        Ok(Ok(tx))
    }
}

/// Load a flat transaction table (the prepared analysis table or any CSV with
/// the same columns); risk columns, if present, are ignored
pub fn load_transactions_csv(path: &Path) -> Result<IngestReport> {
    let rows: Vec<AnalysisRow> = read_csv(path)?;
    let mut report = IngestReport::default();

    for (i, row) in rows.into_iter().enumerate() {
        match row.into_transaction(i + 2)? {
            Ok(tx) => report.transactions.push(tx),
            Err(failure) => {
                debug!(transaction_id = %failure.transaction_id, reason = %failure.reason, "row rejected");
                report.rejected.push(failure);
            }
        }
    }

    info!(
        loaded = report.transactions.len(),
        rejected = report.rejected.len(),
        "loaded transactions from {:?}",
        path
    );
    Ok(report)
}

/// Load a previously written analysis table, keeping its stored risk columns
pub fn load_analysis_table(path: &Path) -> Result<Vec<LabeledTransaction>> {
    let rows: Vec<AnalysisRow> = read_csv(path)?;
    let mut labeled = Vec::with_capacity(rows.len());

    for (i, row) in rows.into_iter().enumerate() {
        let row_number = i + 2;
        let label = row
            .risk_label
            .as_deref()
            .ok_or_else(|| anyhow!("row {}: missing risk_label", row_number))?
            .parse()
            .map_err(|e: String| anyhow!("row {}: {}", row_number, e))?;
        let tier = |value: Option<u8>, name: &str| {
            value
                .and_then(Tier::from_index)
                .ok_or_else(|| anyhow!("row {}: missing or invalid {}", row_number, name))
        };
        let delay_tier = tier(row.delay_tier, "delay_tier")?;
        let amount_tier = tier(row.amount_tier, "amount_tier")?;

        let tx = row
            .into_transaction(row_number)?
            .map_err(|f| anyhow!("row {}: {}", row_number, f.reason))?;

        labeled.push(LabeledTransaction::new(
            tx,
            crate::transaction::RiskAssessment {
                label,
                delay_tier,
                amount_tier,
            },
        ));
    }

    Ok(labeled)
}

pub fn write_analysis_table(path: &Path, labeled: &[LabeledTransaction]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    for tx in labeled {
        wtr.serialize(AnalysisRow::from(tx))
            .context("Failed to write analysis row")?;
    }
    wtr.flush().context("Failed to flush analysis table")?;

    info!(rows = labeled.len(), "wrote analysis table to {:?}", path);
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchRunner;
    use crate::classifier::RiskClassifier;
    use crate::transaction::RiskLabel;
    use std::fs;

    fn raw_txn(id: &str, customer: &str, amount: &str, date: &str, due: &str) -> RawTransaction {
        RawTransaction {
            txn_id: id.to_string(),
            customer_id: customer.to_string(),
            txn_date: date.to_string(),
            txn_type: "SALE".to_string(),
            amount: amount.to_string(),
            currency: "PLN".to_string(),
            due_date: due.to_string(),
        }
    }

    fn raw_payment(id: &str, txn: &str, date: Option<&str>) -> RawPayment {
        RawPayment {
            payment_id: id.to_string(),
            txn_id: txn.to_string(),
            payment_date: date.map(|d| d.to_string()),
            paid_amount: date.map(|_| "100.00".to_string()),
        }
    }

    fn dataset() -> RawDataset {
        RawDataset {
            customers: vec![
                RawCustomer {
                    customer_id: "1".to_string(),
                    customer_name: "Customer_001".to_string(),
                    sector: Some("Retail".to_string()),
                    country: Some("PL".to_string()),
                },
                RawCustomer {
                    customer_id: "2".to_string(),
                    customer_name: "Customer_002".to_string(),
                    sector: None,
                    country: None,
                },
            ],
            transactions: vec![
                raw_txn("10", "1", "1500.50", "2024-01-10", "2024-02-09"),
                raw_txn("11", "2", "82000", "2024-03-01", "2024-03-31"),
                raw_txn("10", "1", "1500.50", "2024-01-10", "2024-02-09"),
                raw_txn("12", "9", "10", "2024-04-01", "2024-04-15"),
            ],
            payments: vec![
                raw_payment("1", "10", Some("2024-02-04")),
                raw_payment("2", "11", Some("2024-04-20")),
                raw_payment("3", "12", None),
                raw_payment("4", "10", Some("2024-06-01")),
            ],
        }
    }

    #[test]
    fn test_prepare_merges_and_derives_features() {
        let prepared = prepare_transactions(&dataset()).unwrap();

        assert_eq!(prepared.duplicates_removed, 1);
        assert_eq!(prepared.unknown_customers, 1);
        assert_eq!(prepared.transactions.len(), 3);

        let early = &prepared.transactions[0];
        assert_eq!(early.id, "10");
        assert_eq!(early.delay_days, -5);
        assert!(early.is_paid);
        assert_eq!(early.amount, Decimal::from_str("1500.50").unwrap());
        assert_eq!(early.sector.as_deref(), Some("Retail"));
        assert_eq!(early.customer_name.as_deref(), Some("Customer_001"));

        let late = &prepared.transactions[1];
        assert_eq!(late.delay_days, 20);
        assert_eq!(late.sector.as_deref(), Some(UNKNOWN_SECTOR));
        assert_eq!(late.country.as_deref(), Some("Unknown"));

        let unpaid = &prepared.transactions[2];
        assert!(!unpaid.is_paid);
        assert_eq!(unpaid.delay_days, 0);
        assert_eq!(unpaid.sector.as_deref(), Some(UNKNOWN_SECTOR));
    }

    #[test]
    fn test_missing_required_field_is_hard_error() {
        let mut raw = dataset();
        raw.transactions.push(raw_txn("", "1", "5", "2024-01-01", "2024-01-05"));
        assert!(prepare_transactions(&raw).is_err());

        let mut raw = dataset();
        raw.transactions.push(raw_txn("20", "1", "5", "not-a-date", "2024-01-05"));
        assert!(prepare_transactions(&raw).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-05-06").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-05-06 00:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-05-06T00:00:00").unwrap(), expected);
        assert!(parse_timestamp("06/05/2024").is_err());
        assert_eq!(parse_delay("12.0").unwrap(), 12);
        assert!(parse_delay("soon").is_err());
    }

    #[test]
    fn test_load_raw_dataset_from_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CUSTOMERS_FILE),
            "customer_id,customer_name,sector,country\n1,Customer_001,Retail,PL\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(TRANSACTIONS_FILE),
            "txn_id,customer_id,txn_date,txn_type,amount,currency,due_date\n\
             1,1,2024-01-01,SALE,120.5,PLN,2024-01-31\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(PAYMENTS_FILE),
            "payment_id,txn_id,payment_date,paid_amount\n1,1,,\n",
        )
        .unwrap();

        let raw = load_raw_dataset(dir.path()).unwrap();
        assert_eq!(raw.customers.len(), 1);
        assert_eq!(raw.payments[0].payment_date, None);

        let prepared = prepare_transactions(&raw).unwrap();
        assert!(!prepared.transactions[0].is_paid);
    }

    #[test]
    fn test_flat_csv_rejects_non_numeric_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.csv");
        fs::write(
            &path,
            "txn_id,customer_id,amount,txn_date,delay_days,sector\n\
             a,c1,100,2024-01-01,2,Retail\n\
             b,c1,abc,2024-01-02,2,Retail\n\
             c,c2,50,2024-01-03,later,\n\
             d,c2,-5,2024-01-04,0,\n",
        )
        .unwrap();

        let report = load_transactions_csv(&path).unwrap();
        assert_eq!(report.transactions.len(), 2);
        let rejected: Vec<&str> = report
            .rejected
            .iter()
            .map(|f| f.transaction_id.as_str())
            .collect();
        assert_eq!(rejected, vec!["b", "c"]);
        assert_eq!(report.transactions[1].sector, None);
    }

    #[test]
    fn test_analysis_table_round_trip() {
        let prepared = prepare_transactions(&dataset()).unwrap();
        let outcome = BatchRunner::new(RiskClassifier::default()).run(&prepared.transactions);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("analysis_table.csv");
        write_analysis_table(&path, &outcome.labeled).unwrap();

        let loaded = load_analysis_table(&path).unwrap();
        assert_eq!(loaded, outcome.labeled);
        assert_eq!(loaded[1].risk_label, RiskLabel::High);

        // Re-ingesting the same file as plain transactions ignores risk columns
        let report = load_transactions_csv(&path).unwrap();
        assert_eq!(report.transactions, prepared.transactions);
    }
}
