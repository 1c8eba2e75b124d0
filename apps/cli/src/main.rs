//! ErrandBit CLI
//!
//! Operator tooling for the ErrandBit payment daemon: run the server, inspect
//! invoices and preimages, and drive the ledger maintenance jobs by hand.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use errandbit_core::{Clock, PaymentStatus, SystemClock, TransactionType};
use errandbit_crypto::verify_preimage;
use errandbit_daemon::{BackgroundTasks, HttpConfig, HttpServer, PaymentService};
use errandbit_ledger::PaymentFilter;
use errandbit_lightning::{decode_invoice, validate_invoice};
use errandbit_logging::init_logging;
use errandbit_settings::{default_settings_path, Settings};

/// ErrandBit - Lightning payment verification for peer-to-peer errands
#[derive(Parser)]
#[command(name = "errandbit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to $ERRANDBIT_CONFIG or the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the payment daemon in the foreground
    Serve {
        /// Override the listen address from settings
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Decode a BOLT11 invoice and print its fields
    Decode {
        bolt11: String,

        /// Also check the invoice against this amount
        #[arg(short, long)]
        amount: Option<u64>,
    },

    /// Check a preimage against a payment hash
    VerifyPreimage { preimage: String, payment_hash: String },

    /// Expire pending payments older than the invoice expiry window
    Sweep,

    /// Run one monitoring cycle and print the report
    Monitor {
        /// Build the report without reconciling or delivering alerts
        #[arg(long)]
        dry_run: bool,
    },

    /// List payments in the ledger
    Payments {
        #[arg(short, long)]
        status: Option<String>,

        #[arg(short, long)]
        job: Option<i64>,

        /// Outbound runner payouts instead of job payments
        #[arg(long)]
        payouts: bool,

        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show or manage settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Print the settings file location
    Path,
    /// Write default settings to the settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let path = cli.config.clone().unwrap_or_else(default_settings_path);

    match cli.command {
        Commands::Serve { listen } => {
            serve(&path, listen).await?;
        }
        Commands::Decode { bolt11, amount } => {
            decode(&bolt11, amount)?;
        }
        Commands::VerifyPreimage {
            preimage,
            payment_hash,
        } => {
            verify(&preimage, &payment_hash)?;
        }
        Commands::Sweep => {
            sweep(&path)?;
        }
        Commands::Monitor { dry_run } => {
            monitor(&path, dry_run).await?;
        }
        Commands::Payments {
            status,
            job,
            payouts,
            limit,
        } => {
            payments(&path, status, job, payouts, limit)?;
        }
        Commands::Config { action } => {
            config(&path, action)?;
        }
    }

    Ok(())
}

fn load_settings(path: &PathBuf) -> Result<Settings> {
    Settings::load_from(path).with_context(|| format!("Failed to load settings from {:?}", path))
}

fn open_service(path: &PathBuf) -> Result<PaymentService> {
    let settings = load_settings(path)?;
    PaymentService::from_settings(&settings).context("Failed to start payment service")
}

// ============================================================================
// Daemon
// ============================================================================

async fn serve(path: &PathBuf, listen: Option<String>) -> Result<()> {
    let mut settings = load_settings(path)?;
    if let Some(listen) = listen {
        settings.server.listen_addr = listen;
    }

    let service = Arc::new(PaymentService::from_settings(&settings)?);
    let mut tasks = BackgroundTasks::start(&service, &settings);
    let mut server = HttpServer::new(HttpConfig::from_settings(&settings));

    info!("Serving on {}", server.listen_addr());

    tokio::select! {
        result = server.start(service.clone()) => {
            tasks.stop().await;
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            server.stop().await;
            tasks.stop().await;
        }
    }

    Ok(())
}

// ============================================================================
// Offline tools
// ============================================================================

fn decode(bolt11: &str, amount: Option<u64>) -> Result<()> {
    let decoded = match amount {
        Some(expected) => validate_invoice(bolt11, expected, SystemClock.now())?,
        None => decode_invoice(bolt11)?,
    };

    println!("Invoice");
    println!("=======");
    println!("Payment hash: {}", decoded.payment_hash);
    match decoded.amount_msats {
        Some(msats) => println!("Amount: {} msat", msats),
        None => println!("Amount: (none)"),
    }
    println!("Created at: {}", decoded.created_at);
    println!("Expires at: {}", decoded.expires_at);
    if let Some(description) = &decoded.description {
        println!("Description: {}", description);
    }
    if amount.is_some() {
        println!("Valid for amount: yes");
    }

    Ok(())
}

fn verify(preimage: &str, payment_hash: &str) -> Result<()> {
    if verify_preimage(preimage.trim(), payment_hash.trim())? {
        println!("Preimage matches payment hash");
        Ok(())
    } else {
        bail!("Preimage does not match payment hash");
    }
}

// ============================================================================
// Ledger maintenance
// ============================================================================

fn sweep(path: &PathBuf) -> Result<()> {
    let service = open_service(path)?;
    let expired = service.monitor().sweep_expired()?;
    println!("Expired {} pending payment(s)", expired);
    Ok(())
}

async fn monitor(path: &PathBuf, dry_run: bool) -> Result<()> {
    let service = open_service(path)?;
    let monitor = service.monitor();
    let report = if dry_run {
        monitor.report().await?
    } else {
        monitor.run_cycle().await?
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn payments(
    path: &PathBuf,
    status: Option<String>,
    job: Option<i64>,
    payouts: bool,
    limit: usize,
) -> Result<()> {
    let status = status
        .map(|s| s.parse::<PaymentStatus>())
        .transpose()
        .context("Unknown payment status")?;
    let tx_type = if payouts {
        TransactionType::RunnerPayout
    } else {
        TransactionType::JobPayment
    };

    let service = open_service(path)?;
    let records = service.ledger().list(&PaymentFilter {
        status,
        tx_type: Some(tx_type),
        job_id: job,
        limit: Some(limit),
    })?;

    if records.is_empty() {
        println!("No payments");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  job {:>6}  {:>10} sat  {:<9}  {}",
            record.payment_hash, record.job_id, record.amount_sats, record.status, record.created_at
        );
    }
    Ok(())
}

// ============================================================================
// Settings
// ============================================================================

fn config(path: &PathBuf, action: Option<ConfigAction>) -> Result<()> {
    match action {
        Some(ConfigAction::Path) => {
            println!("{}", path.display());
        }
        Some(ConfigAction::Init { force }) => {
            if path.exists() && !force {
                bail!("{:?} already exists (use --force to overwrite)", path);
            }
            Settings::default().save_to(path)?;
            println!("Wrote default settings to {}", path.display());
        }
        Some(ConfigAction::Show) | None => {
            let settings = load_settings(path)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}
