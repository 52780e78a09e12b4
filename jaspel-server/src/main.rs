//! Jaspel server
//!
//! Serves the jaspel REST API over HTTP and offers one-off fee calculations
//! from the command line.

mod http;

use anyhow::Context;
use clap::{Parser, Subcommand};
use jaspel::api::Router;
use jaspel::calculation::{calculate, PatientCountPolicy, ProcedureSplitPolicy, SplitInput};
use jaspel::model::{Complexity, FeeFormula, ProcedureCategory};
use jaspel::{AppConfig, AppState, Database};
use may_minihttp::HttpServer;
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jaspel-server")]
#[command(about = "Jaspel back-office API server")]
#[command(version)]
struct Cli {
    /// Configuration file (default: config/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Bind address, overrides `server.bind`
        #[arg(long)]
        bind: Option<String>,

        /// Coroutine worker threads, overrides `server.workers`
        #[arg(long)]
        workers: Option<usize>,

        /// JSON snapshot file, overrides `store.snapshot_path`
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Calculate a patient-count fee
    PatientFee {
        general: u32,
        insurance: u32,
        #[arg(long, default_value = "10")]
        threshold: u32,
        #[arg(long, default_value = "5000")]
        fee_general: Decimal,
        #[arg(long, default_value = "3000")]
        fee_insurance: Decimal,
        #[arg(long, default_value = "50000")]
        sitting_fee: Decimal,
    },

    /// Calculate a procedure jaspel split
    Split {
        tariff: Decimal,
        #[arg(long, default_value = "standard")]
        complexity: Complexity,
        #[arg(long, default_value = "tindakan")]
        category: ProcedureCategory,
        #[arg(long)]
        requires_doctor: bool,
        /// Pool percentage override
        #[arg(long)]
        percentage: Option<Decimal>,
    },
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    config.context("failed to load configuration")
}

fn serve(
    config: AppConfig,
    bind: Option<String>,
    workers: Option<usize>,
    snapshot: Option<PathBuf>,
) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let workers = workers.unwrap_or(config.server.workers).max(1);

    let db = match snapshot.or_else(|| config.store.snapshot_path.clone()) {
        Some(path) => Database::open(&path)
            .with_context(|| format!("failed to open snapshot {}", path.display()))?,
        None => {
            log::warn!("no snapshot path configured, data is kept in memory only");
            Database::in_memory()
        }
    };

    let state = AppState::new(db, config);
    if let Some(admin_id) = state.bootstrap().context("failed to bootstrap store")? {
        log::info!("bootstrap admin created with id {} (use it as X-User-Id)", admin_id);
    }

    #[cfg(feature = "metrics")]
    {
        let _ = &*jaspel::metrics::METRICS;
        log::info!("metrics exposed at /metrics");
    }

    may::config().set_workers(workers);
    let service = http::JaspelService::new(Router::new(state));
    let server = HttpServer(service)
        .start(&bind)
        .map_err(|e| anyhow::anyhow!("Failed to start server on {}: {}", bind, e))?;
    log::info!("jaspel API listening on http://{} ({} workers)", bind, workers);

    server
        .join()
        .map_err(|e| anyhow::anyhow!("Server encountered an error: {:?}", e))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        Commands::Serve {
            bind,
            workers,
            snapshot,
        } => serve(load_config(cli.config.as_deref())?, bind, workers, snapshot),
        Commands::PatientFee {
            general,
            insurance,
            threshold,
            fee_general,
            fee_insurance,
            sitting_fee,
        } => {
            let formula = FeeFormula {
                id: 0,
                shift: "cli".into(),
                threshold,
                fee_general,
                fee_insurance,
                sitting_fee,
                active: true,
            };
            let fee = calculate(PatientCountPolicy {
                general,
                insurance,
                formula: &formula,
            });
            println!("{}", serde_json::to_string_pretty(&fee)?);
            Ok(())
        }
        Commands::Split {
            tariff,
            complexity,
            category,
            requires_doctor,
            percentage,
        } => {
            let split = calculate(ProcedureSplitPolicy(&SplitInput {
                base_tariff: tariff,
                complexity,
                category,
                requires_doctor,
                percentage_override: percentage,
            }));
            println!("{}", serde_json::to_string_pretty(&split)?);
            Ok(())
        }
    }
}
