//! PrintStream license control.
//!
//! Runs the same entitlement checks the application performs, against an
//! installation's database. Useful for support and for scripted installs.
//!
//! Usage:
//!   printstream-licensectl startup --app-version 1.4.0
//!   printstream-licensectl status
//!   printstream-licensectl activate ab12-1eef-0c21-77fe

use std::{path::PathBuf, process::ExitCode};
use anyhow::Result;
use clap::{Parser, Subcommand};
use printstream_license::LicenseCheck;
use printstream_licensectl::{LicenseCtlConfig, open_engine};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "printstream-licensectl")]
#[command(about = "Inspect and manage the PrintStream license of an installation")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the installation database (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Use the local clock instead of network time providers
    #[arg(long)]
    offline: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the startup sequence: version check, then license check
    Startup {
        /// Version of the running application (major.minor.patch)
        #[arg(long)]
        app_version: String,
    },

    /// Show the current license state
    Status,

    /// Redeem an activation key
    Activate {
        /// The key, e.g. XXXX-YYYY-ZZZZ-WWWW
        key: String,
    },

    /// Show redeemed keys and recorded versions
    History,
}

fn print_check(check: &LicenseCheck) -> ExitCode {
    println!(
        "state: {:?}  valid: {}  days left: {}",
        check.state, check.is_valid, check.days_left
    );
    if check.is_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let mut config = LicenseCtlConfig::load_or_default(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.database = database;
    }
    config.offline |= args.offline;

    let engine = open_engine(&config)?;

    let code = match args.command {
        Command::Startup { app_version } => {
            if engine.check_and_update_version(&app_version).await {
                info!("License extended after upgrade to {app_version}");
            }
            print_check(&engine.check_license().await)
        }
        Command::Status => {
            let status = engine.status().await?;
            let record = &status.record;
            println!("checked at:   {}", status.checked_at.to_rfc3339());
            println!("installed:    {}", record.installation_date.to_rfc3339());
            println!("expires:      {}", record.expiry_date.to_rfc3339());
            println!(
                "installation: {}",
                record.installation_id.as_deref().unwrap_or("(not assigned)")
            );
            println!(
                "key:          {}",
                record.license_key.as_deref().unwrap_or("(trial)")
            );
            print_check(&status.check)
        }
        Command::Activate { key } => {
            if engine.extend_license(&key).await {
                println!("key accepted");
                print_check(&engine.check_license().await)
            } else {
                println!("key rejected");
                ExitCode::FAILURE
            }
        }
        Command::History => {
            let store = engine.store();
            for entry in store.used_keys()? {
                println!(
                    "key      {}  {}",
                    entry.first_used_date.to_rfc3339(),
                    entry.license_key
                );
            }
            for entry in store.versions()? {
                println!(
                    "version  {}  {}",
                    entry.recorded_at.to_rfc3339(),
                    entry.version
                );
            }
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}
