// Risk Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod transaction;
pub mod classifier;     // Two-signal decision table
pub mod batch;          // Partial-failure batch runner
pub mod aggregation;    // Label / time bucket / entity grouping
pub mod report;         // Tables, KPIs, filters
pub mod config;
pub mod ingest;         // Raw CSV merge + analysis table
pub mod generator;      // Seeded synthetic dataset
pub mod db;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{RiskError, RiskResult};
pub use transaction::{
    LabeledTransaction, RiskAssessment, RiskLabel, Tier, Transaction, UNKNOWN_SECTOR,
};
pub use classifier::{
    AmountThresholds, Classifier, ClassifierConfig, DelayThresholds, RiskClassifier,
    DECISION_TABLE,
};
pub use batch::{BatchOutcome, BatchRunner, RecordFailure};
pub use aggregation::{
    AggregationConfig, AggregationEngine, AggregationResult, EntityKind, GroupBy, GroupKey,
    GroupMetrics, GroupSummary, TimeBucket,
};
pub use report::{Cell, Kpis, ReportFilter, ReportingFacade, SummaryTable};
pub use config::AppConfig;
pub use ingest::{
    load_analysis_table, load_raw_dataset, load_transactions_csv, prepare_transactions,
    write_analysis_table, PreparedData, RawDataset,
};
pub use generator::{generate_to_dir, DataGenerator};
pub use db::{
    AuditAction, AuditEvent, TableChange, open_database, setup_database, insert_labeled,
    get_all_labeled, verify_count, clear_labeled, record_audit, audit_trail, analysis_tables,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
