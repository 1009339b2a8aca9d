// Risk Ledger - Web Server
// REST API with Axum over the SQLite analysis table

use clap::Parser;
use risk_ledger::aggregation::AggregationEngine;
use risk_ledger::api::{router, AppState};
use risk_ledger::{open_database, verify_count, AppConfig, ReportingFacade};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "risk-server")]
#[command(about = "Risk Ledger HTTP API")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long)]
    db: Option<PathBuf>,

    #[arg(long, default_value = "0.0.0.0:3000")]
    addr: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match AppConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("🌐 Risk Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = args.db.unwrap_or_else(|| config.paths.database.clone());
    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: risk-ledger prepare && risk-ledger load");
        eprintln!("   to build it first.");
        std::process::exit(1);
    }

    let conn = open_database(&db_path).expect("Failed to open database");
    let count = verify_count(&conn).unwrap_or(0);
    println!("✓ Database opened: {:?} ({} transactions)", db_path, count);

    let facade = ReportingFacade::new(AggregationEngine::new(config.aggregation.clone()));
    let app = router(AppState::new(conn, facade));

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://{}", args.addr);
    println!("   API: http://{}/api/kpis", args.addr);
    println!("\n   Press Ctrl+C to stop\n");
    info!(addr = %args.addr, "listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!("server error: {}", e);
        std::process::exit(1);
    }
}
