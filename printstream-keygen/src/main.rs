//! PrintStream key issuer.
//!
//! Usage:
//!   printstream-keygen issue --customer acme --days 365
//!   printstream-keygen list
//!   printstream-keygen serve --port 3000

use std::{path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use printstream_keygen::{IssuanceLog, Issuer, build_router};
use printstream_license::KeyCodec;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "printstream-keygen")]
#[command(about = "Issue PrintStream activation keys")]
struct Args {
    /// Path to the issuance log
    #[arg(short, long, default_value = "data/licenses.json")]
    log: PathBuf,

    /// Override the shared key secret baked in at build time
    #[arg(long)]
    secret: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a key for a customer
    Issue {
        /// Customer identifier
        #[arg(short, long)]
        customer: String,

        /// Days the key grants
        #[arg(short, long)]
        days: i64,
    },

    /// List previously issued keys
    List,

    /// Serve the HTTP admin API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let codec = args.secret.map(KeyCodec::new).unwrap_or_default();
    let issuer = Issuer::new(codec, IssuanceLog::new(&args.log));

    match args.command {
        Command::Issue { customer, days } => {
            let record = issuer
                .issue(&customer, days)
                .context("failed to issue key")?;
            println!("{}", record.license_key);
        }
        Command::List => {
            let records = issuer.list().context("failed to read issuance log")?;
            for r in &records {
                println!(
                    "{}  {:<24} {:>5}d  {}",
                    r.issued_at.format("%Y-%m-%d %H:%M"),
                    r.customer_id,
                    r.days,
                    r.license_key
                );
            }
            info!("{} keys issued", records.len());
        }
        Command::Serve { port } => {
            let app = build_router(Arc::new(issuer));
            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}"))
                .await
                .with_context(|| format!("failed to bind port {port}"))?;
            info!("Key issuer running at http://localhost:{port}");
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
                .context("HTTP server failed")?;
        }
    }

    Ok(())
}
