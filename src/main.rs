// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::debug;

// Use library instead of local modules
use risk_ledger::aggregation::{AggregationEngine, EntityKind, GroupBy};
use risk_ledger::{
    analysis_tables, get_all_labeled, insert_labeled, load_analysis_table, load_raw_dataset,
    load_transactions_csv, open_database, prepare_transactions, verify_count,
    write_analysis_table, AppConfig, BatchRunner, LabeledTransaction, ReportFilter,
    ReportingFacade, RiskClassifier, RiskLabel, SummaryTable,
};

#[derive(Parser)]
#[command(name = "risk-ledger")]
#[command(about = "Rule-based risk classification and reporting for financial transactions")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// TOML config file (defaults to config/risk-ledger.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a seeded synthetic customers/transactions/payments dataset
    Generate {
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        transactions: Option<usize>,
    },
    /// Merge and clean the raw CSVs, classify, and write the analysis table
    Prepare {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Load the analysis table into SQLite
    Load {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Remove previously stored rows first
        #[arg(long)]
        replace: bool,
    },
    /// Run the stored analysis queries
    Queries {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Aggregate labeled transactions into a report
    Report(ReportArgs),
    /// Interactive terminal dashboard
    Dashboard {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct ReportArgs {
    #[arg(long, value_enum, default_value = "summary")]
    view: ReportView,

    /// label | day | week | month | customer | sector
    #[arg(long, default_value = "label")]
    group_by: GroupBy,

    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Classify this flat CSV instead of reading the database
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long)]
    db: Option<PathBuf>,

    #[arg(long, value_delimiter = ',')]
    labels: Vec<RiskLabel>,

    #[arg(long, value_delimiter = ',')]
    sectors: Vec<String>,

    #[arg(long)]
    from: Option<NaiveDate>,

    #[arg(long)]
    to: Option<NaiveDate>,

    /// Emit zero rows for empty time buckets
    #[arg(long)]
    dense: bool,

    /// Row limit for top-entity views
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportView {
    Summary,
    Kpis,
    TopCustomers,
    TopSectors,
    Matrix,
    Amounts,
    Delays,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    init_logging(&config.logging.level)?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Generate { out, seed, transactions } => {
            run_generate(&config, out, seed, transactions)
        }
        Command::Prepare { data_dir, out } => run_prepare(&config, data_dir, out),
        Command::Load { input, db, replace } => run_load(&config, input, db, replace),
        Command::Queries { db } => run_queries(&config, db),
        Command::Report(args) => run_report(&config, args),
        Command::Dashboard { db } => run_ui_mode(&config, db),
    }
}

/// Logs go to stderr so report output on stdout stays machine-readable
fn init_logging(level: &str) -> Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level: {}", level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn run_generate(
    config: &AppConfig,
    out: Option<PathBuf>,
    seed: Option<u64>,
    transactions: Option<usize>,
) -> Result<()> {
    println!("🎲 Generating synthetic dataset");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut gen_config = config.generator.clone();
    if let Some(seed) = seed {
        gen_config.seed = seed;
    }
    if let Some(n) = transactions {
        gen_config.transactions = n;
    }
    let dir = out.unwrap_or_else(|| config.paths.data_dir.clone());

    let dataset = risk_ledger::generate_to_dir(&gen_config, &dir)?;

    println!("✓ customers.csv     {} rows", dataset.customers.len());
    println!("✓ transactions.csv  {} rows", dataset.transactions.len());
    println!("✓ payments.csv      {} rows", dataset.payments.len());
    println!("📂 Written to {}", dir.display());
    Ok(())
}

fn run_prepare(config: &AppConfig, data_dir: Option<PathBuf>, out: Option<PathBuf>) -> Result<()> {
    println!("🧹 Preparing analysis table");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let dir = data_dir.unwrap_or_else(|| config.paths.data_dir.clone());
    let out = out.unwrap_or_else(|| config.paths.analysis_table.clone());

    // 1. Load + clean
    println!("\n📂 Loading raw CSVs from {}...", dir.display());
    let raw = load_raw_dataset(&dir)?;
    let prepared = prepare_transactions(&raw)?;
    println!("✓ {} transactions kept", prepared.transactions.len());
    println!("✓ {} duplicate rows removed", prepared.duplicates_removed);
    if prepared.unknown_customers > 0 {
        println!("⚠️  {} transactions reference unknown customers", prepared.unknown_customers);
    }

    // 2. Classify
    println!("\n🏷️  Classifying...");
    let classifier = RiskClassifier::new(config.classifier.clone())?;
    let outcome = BatchRunner::new(classifier).run_iter(prepared.transactions);
    println!("✓ {}", outcome.summary());
    print_failures(&outcome.failures);

    // 3. Write
    write_analysis_table(&out, &outcome.labeled)?;
    println!("\n💾 Analysis table written to {}", out.display());
    Ok(())
}

fn print_failures(failures: &[risk_ledger::RecordFailure]) {
    for failure in failures.iter().take(10) {
        println!("   ✗ {}: {}", failure.transaction_id, failure.reason);
    }
    if failures.len() > 10 {
        println!("   ... and {} more", failures.len() - 10);
    }
}

fn run_load(
    config: &AppConfig,
    input: Option<PathBuf>,
    db: Option<PathBuf>,
    replace: bool,
) -> Result<()> {
    println!("🗄️  Loading analysis table → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let input = input.unwrap_or_else(|| config.paths.analysis_table.clone());
    let db_path = db.unwrap_or_else(|| config.paths.database.clone());

    println!("\n📂 Reading {}...", input.display());
    let labeled = load_analysis_table(&input)?;
    println!("✓ Read {} labeled transactions", labeled.len());

    let mut conn = open_database(&db_path)?;
    println!("✓ Database ready at {}", db_path.display());

    if replace {
        let removed = risk_ledger::db::clear_labeled(&conn)?;
        println!("✓ Removed {} previously stored rows", removed);
    }

    insert_labeled(&mut conn, &labeled)?;
    let count = verify_count(&conn)?;
    println!("\n🔍 Database contains {} transactions", count);
    Ok(())
}

fn open_existing(config: &AppConfig, db: Option<PathBuf>) -> Result<rusqlite::Connection> {
    let db_path = db.unwrap_or_else(|| config.paths.database.clone());
    if !db_path.exists() {
        bail!(
            "database {} not found; run `risk-ledger prepare` then `risk-ledger load` first",
            db_path.display()
        );
    }
    open_database(&db_path)
}

fn run_queries(config: &AppConfig, db: Option<PathBuf>) -> Result<()> {
    let conn = open_existing(config, db)?;
    for table in analysis_tables(&conn)? {
        println!("{}", "=".repeat(70));
        println!("{}", table);
    }
    Ok(())
}

/// Labeled transactions from a flat CSV (classified now) or from the database
fn load_labeled(
    config: &AppConfig,
    input: Option<&Path>,
    db: Option<PathBuf>,
) -> Result<Vec<LabeledTransaction>> {
    match input {
        Some(path) => {
            let report = load_transactions_csv(path)?;
            let classifier = RiskClassifier::new(config.classifier.clone())?;
            let mut outcome = BatchRunner::new(classifier).run_iter(report.transactions);
            outcome.failures.extend(report.rejected);
            if !outcome.failures.is_empty() {
                eprintln!("⚠️  {} records skipped", outcome.failures.len());
            }
            Ok(outcome.labeled)
        }
        None => {
            let conn = open_existing(config, db)?;
            get_all_labeled(&conn)
        }
    }
}

fn run_report(config: &AppConfig, args: ReportArgs) -> Result<()> {
    let filter = ReportFilter {
        labels: args.labels.clone(),
        sectors: args.sectors.clone(),
        from: args.from,
        to: args.to,
    };
    filter.validate()?;

    let labeled = load_labeled(config, args.input.as_deref(), args.db.clone())?;
    let selected = filter.apply(&labeled)?;

    let mut agg_config = config.aggregation.clone();
    agg_config.dense_buckets |= args.dense;
    let facade = ReportingFacade::new(AggregationEngine::new(agg_config));

    let table: SummaryTable = match args.view {
        ReportView::Summary => facade.summary(&selected, args.group_by),
        ReportView::Kpis => facade.kpis(&selected).to_table(),
        ReportView::TopCustomers => {
            facade.top_entities(&selected, RiskLabel::High, EntityKind::Customer, args.limit)
        }
        ReportView::TopSectors => {
            facade.top_entities(&selected, RiskLabel::High, EntityKind::Sector, args.limit)
        }
        ReportView::Matrix => facade.matrix(&selected, EntityKind::Sector),
        ReportView::Amounts => facade.amount_stats(&selected),
        ReportView::Delays => facade.delay_histogram(&selected, 10),
    };

    match args.format {
        OutputFormat::Table => println!("{}", table),
        OutputFormat::Csv => print!("{}", table.to_csv()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&table)?),
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig, db: Option<PathBuf>) -> Result<()> {
    println!("🖥️  Loading Risk Ledger dashboard...\n");

    let conn = open_existing(config, db)?;

    println!("📊 Loading transactions...");
    let labeled = get_all_labeled(&conn)?;
    println!("✓ Loaded {} transactions\n", labeled.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let facade = ReportingFacade::new(AggregationEngine::new(config.aggregation.clone()));
    let mut app = ui::App::new(labeled, facade);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig, _db: Option<PathBuf>) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the HTTP API: cargo run --bin risk-server --features server");
    std::process::exit(1);
}
