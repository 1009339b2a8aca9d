use crate::ingest::{format_timestamp, TIMESTAMP_FORMAT};
use crate::report::{Cell, SummaryTable};
use crate::transaction::{LabeledTransaction, RiskAssessment, Tier, Transaction};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub const ANALYSIS_TABLE: &str = "transactions_analysis";

/// What happened to the analysis table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Loaded,
    Cleared,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Loaded => "analysis_loaded",
            AuditAction::Cleared => "analysis_cleared",
        }
    }
}

impl FromStr for AuditAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "analysis_loaded" => Ok(AuditAction::Loaded),
            "analysis_cleared" => Ok(AuditAction::Cleared),
            other => Err(anyhow!("Unknown audit action: {}", other)),
        }
    }
}

/// Row counts of one write to the analysis table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChange {
    /// Rows in the submitted batch
    pub rows: usize,
    /// Rows whose txn id was not stored before
    pub added: usize,
    pub removed: usize,
}

impl TableChange {
    /// Rows that overwrote an already stored txn id
    pub fn replaced(&self) -> usize {
        self.rows.saturating_sub(self.added)
    }
}

/// Audit record; every load or clear of the analysis table leaves one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub recorded_at: DateTime<Utc>,
    pub action: AuditAction,
    pub table: String,
    pub change: TableChange,
    pub actor: String,
}

impl AuditEvent {
    pub fn new(action: AuditAction, change: TableChange, actor: &str) -> Self {
        AuditEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            action,
            table: ANALYSIS_TABLE.to_string(),
            change,
            actor: actor.to_string(),
        }
    }
}

/// Open (creating parent directories) and initialise a database file
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open database {:?}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Analysis Table (one row per labeled transaction, keyed by txn id)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions_analysis (
            txn_id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            customer_name TEXT,
            sector TEXT,
            country TEXT,
            txn_type TEXT,
            currency TEXT,
            amount TEXT NOT NULL,
            txn_date TEXT NOT NULL,
            is_paid INTEGER NOT NULL,
            delay_days INTEGER NOT NULL,
            risk_label TEXT NOT NULL,
            risk_score INTEGER NOT NULL,
            delay_tier INTEGER NOT NULL,
            amount_tier INTEGER NOT NULL,
            loaded_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Audit Log (one row per load or clear)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            recorded_at TEXT NOT NULL,
            action TEXT NOT NULL,
            table_name TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            added_count INTEGER NOT NULL,
            removed_count INTEGER NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_analysis_risk ON transactions_analysis(risk_label)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_analysis_date ON transactions_analysis(txn_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_analysis_sector ON transactions_analysis(sector)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_table ON audit_log(table_name)",
        [],
    )?;

    Ok(())
}

/// Upsert labeled transactions keyed by txn id; loading the same batch twice
/// leaves the table unchanged. Returns the number of rows written.
pub fn insert_labeled(conn: &mut Connection, labeled: &[LabeledTransaction]) -> Result<usize> {
    let before = verify_count(conn)?;
    let db_tx = conn.transaction()?;

    {
        let mut stmt = db_tx.prepare(
            "INSERT OR REPLACE INTO transactions_analysis (
                txn_id, customer_id, customer_name, sector, country, txn_type, currency,
                amount, txn_date, is_paid, delay_days,
                risk_label, risk_score, delay_tier, amount_tier
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )?;

        for row in labeled {
            let tx = &row.transaction;
            stmt.execute(params![
                tx.id,
                tx.customer_id,
                tx.customer_name,
                tx.sector,
                tx.country,
                tx.txn_type,
                tx.currency,
                tx.amount.to_string(),
                format_timestamp(&tx.timestamp),
                tx.is_paid,
                tx.delay_days,
                row.risk_label.as_str(),
                row.risk_score,
                row.delay_tier.index() as i64,
                row.amount_tier.index() as i64,
            ])
            .with_context(|| format!("Failed to store transaction {}", tx.id))?;
        }
    }

    db_tx.commit()?;

    let after = verify_count(conn)?;
    let change = TableChange {
        rows: labeled.len(),
        added: (after - before).max(0) as usize,
        removed: 0,
    };
    record_audit(conn, &AuditEvent::new(AuditAction::Loaded, change, "risk_loader"))?;

    info!(rows = change.rows, added = change.added, "stored labeled transactions");
    Ok(labeled.len())
}

/// Drop every stored analysis row (used before a full reload)
pub fn clear_labeled(conn: &Connection) -> Result<usize> {
    let removed = conn.execute("DELETE FROM transactions_analysis", [])?;
    let change = TableChange {
        removed,
        ..TableChange::default()
    };
    record_audit(conn, &AuditEvent::new(AuditAction::Cleared, change, "risk_loader"))?;

    debug!(removed, "cleared analysis table");
    Ok(removed)
}

pub fn record_audit(conn: &Connection, event: &AuditEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (
            event_id, recorded_at, action, table_name, row_count, added_count, removed_count, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.event_id,
            event.recorded_at.to_rfc3339(),
            event.action.as_str(),
            event.table,
            event.change.rows as i64,
            event.change.added as i64,
            event.change.removed as i64,
            event.actor,
        ],
    )
    .with_context(|| format!("Failed to record audit event {}", event.event_id))?;

    Ok(())
}

/// Audit history of one table, newest first
pub fn audit_trail(conn: &Connection, table: &str) -> Result<Vec<AuditEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, recorded_at, action, row_count, added_count, removed_count, actor
         FROM audit_log
         WHERE table_name = ?1
         ORDER BY id DESC",
    )?;

    let rows = stmt
        .query_map(params![table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(event_id, recorded_at, action, rows, added, removed, actor)| {
            let count = |n: i64| {
                usize::try_from(n).with_context(|| format!("Negative count on audit event {}", event_id))
            };
            Ok(AuditEvent {
                recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                    .with_context(|| format!("Bad timestamp on audit event {}", event_id))?
                    .with_timezone(&Utc),
                action: action.parse()?,
                table: table.to_string(),
                change: TableChange {
                    rows: count(rows)?,
                    added: count(added)?,
                    removed: count(removed)?,
                },
                event_id,
                actor,
            })
        })
        .collect()
}

/// Raw column values as stored; converted outside the rusqlite closure so
/// parse failures carry anyhow context
struct StoredRow {
    txn_id: String,
    customer_id: String,
    customer_name: Option<String>,
    sector: Option<String>,
    country: Option<String>,
    txn_type: Option<String>,
    currency: Option<String>,
    amount: String,
    txn_date: String,
    is_paid: bool,
    delay_days: i64,
    risk_label: String,
    delay_tier: i64,
    amount_tier: i64,
}

impl StoredRow {
    fn into_labeled(self) -> Result<LabeledTransaction> {
        let ctx = || format!("stored transaction {}", self.txn_id);
        let amount = Decimal::from_str(&self.amount).with_context(ctx)?;
        let timestamp = NaiveDateTime::parse_from_str(&self.txn_date, TIMESTAMP_FORMAT).with_context(ctx)?;
        let label = self
            .risk_label
            .parse()
            .map_err(|e: String| anyhow!("{}: {}", ctx(), e))?;
        let tier = |value: i64| {
            u8::try_from(value)
                .ok()
                .and_then(Tier::from_index)
                .ok_or_else(|| anyhow!("{}: invalid tier {}", ctx(), value))
        };
        let assessment = RiskAssessment {
            label,
            delay_tier: tier(self.delay_tier)?,
            amount_tier: tier(self.amount_tier)?,
        };

        let mut tx = Transaction::new(
            self.txn_id.as_str(),
            self.customer_id.as_str(),
            amount,
            self.delay_days,
            timestamp,
        )
        .with_paid(self.is_paid);
        tx.customer_name = self.customer_name.clone();
        tx.sector = self.sector.clone();
        tx.country = self.country.clone();
        tx.txn_type = self.txn_type.clone();
        tx.currency = self.currency.clone();

        Ok(LabeledTransaction::new(tx, assessment))
    }
}

/// Every stored labeled transaction, ordered by date then id
pub fn get_all_labeled(conn: &Connection) -> Result<Vec<LabeledTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT txn_id, customer_id, customer_name, sector, country, txn_type, currency,
                amount, txn_date, is_paid, delay_days, risk_label, delay_tier, amount_tier
         FROM transactions_analysis
         ORDER BY txn_date, txn_id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(StoredRow {
                txn_id: row.get(0)?,
                customer_id: row.get(1)?,
                customer_name: row.get(2)?,
                sector: row.get(3)?,
                country: row.get(4)?,
                txn_type: row.get(5)?,
                currency: row.get(6)?,
                amount: row.get(7)?,
                txn_date: row.get(8)?,
                is_paid: row.get(9)?,
                delay_days: row.get(10)?,
                risk_label: row.get(11)?,
                delay_tier: row.get(12)?,
                amount_tier: row.get(13)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(StoredRow::into_labeled).collect()
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM transactions_analysis", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// ANALYSIS QUERIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskCount {
    pub risk_label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAvgAmount {
    pub risk_label: String,
    pub avg_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerHighCount {
    pub customer_name: String,
    pub high_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorRiskCount {
    pub sector: String,
    pub risk_label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyHighCount {
    pub month: String,
    pub high_count: i64,
}

/// Risk level distribution (count)
pub fn query_risk_distribution(conn: &Connection) -> Result<Vec<RiskCount>> {
    let mut stmt = conn.prepare(
        "SELECT risk_label, COUNT(*) AS cnt
         FROM transactions_analysis
         GROUP BY risk_label
         ORDER BY cnt DESC, risk_label",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RiskCount {
                risk_label: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Average transaction amount by risk level
pub fn query_avg_amount_by_risk(conn: &Connection) -> Result<Vec<RiskAvgAmount>> {
    let mut stmt = conn.prepare(
        "SELECT risk_label, ROUND(AVG(CAST(amount AS REAL)), 2) AS avg_amount
         FROM transactions_analysis
         GROUP BY risk_label
         ORDER BY avg_amount DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RiskAvgAmount {
                risk_label: row.get(0)?,
                avg_amount: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Customers with the most High-risk transactions
pub fn query_top_high_customers(conn: &Connection, limit: usize) -> Result<Vec<CustomerHighCount>> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(customer_name, customer_id) AS name, COUNT(*) AS high_cnt
         FROM transactions_analysis
         WHERE risk_label = 'High'
         GROUP BY name
         ORDER BY high_cnt DESC, name
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(CustomerHighCount {
                customer_name: row.get(0)?,
                high_count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Risk distribution by sector
pub fn query_risk_by_sector(conn: &Connection) -> Result<Vec<SectorRiskCount>> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(sector, 'Unknown') AS sector_name, risk_label, COUNT(*) AS cnt
         FROM transactions_analysis
         GROUP BY sector_name, risk_label
         ORDER BY sector_name, cnt DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SectorRiskCount {
                sector: row.get(0)?,
                risk_label: row.get(1)?,
                count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Monthly trend of High-risk transactions
pub fn query_monthly_high_trend(conn: &Connection) -> Result<Vec<MonthlyHighCount>> {
    let mut stmt = conn.prepare(
        "SELECT strftime('%Y-%m', txn_date) AS month, COUNT(*) AS high_cnt
         FROM transactions_analysis
         WHERE risk_label = 'High'
         GROUP BY month
         ORDER BY month",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MonthlyHighCount {
                month: row.get(0)?,
                high_count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// All five analysis queries rendered as tables, in a fixed order
pub fn analysis_tables(conn: &Connection) -> Result<Vec<SummaryTable>> {
    let mut tables = Vec::with_capacity(5);

    let mut t = SummaryTable::new("Risk level distribution", &["risk_label", "count"]);
    for r in query_risk_distribution(conn)? {
        t.push_row(vec![Cell::Text(r.risk_label), Cell::Integer(r.count)]);
    }
    tables.push(t);

    let mut t = SummaryTable::new("Average transaction amount by risk level", &["risk_label", "avg_amount"]);
    for r in query_avg_amount_by_risk(conn)? {
        t.push_row(vec![Cell::Text(r.risk_label), Cell::Float(r.avg_amount)]);
    }
    tables.push(t);

    let mut t = SummaryTable::new(
        "Top 10 customers by number of High-risk transactions",
        &["customer_name", "high_count"],
    );
    for r in query_top_high_customers(conn, 10)? {
        t.push_row(vec![Cell::Text(r.customer_name), Cell::Integer(r.high_count)]);
    }
    tables.push(t);

    let mut t = SummaryTable::new("Risk distribution by sector", &["sector", "risk_label", "count"]);
    for r in query_risk_by_sector(conn)? {
        t.push_row(vec![Cell::Text(r.sector), Cell::Text(r.risk_label), Cell::Integer(r.count)]);
    }
    tables.push(t);

    let mut t = SummaryTable::new("Monthly trend of High-risk transactions", &["month", "high_count"]);
    for r in query_monthly_high_trend(conn)? {
        t.push_row(vec![Cell::Text(r.month), Cell::Integer(r.high_count)]);
    }
    tables.push(t);

    Ok(tables)
}
