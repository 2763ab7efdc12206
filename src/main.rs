use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use finance_close::commands;
use finance_close::config::CloseConfig;
use finance_close::logging::init_tracing;
use finance_close::sources;
use finance_close::{CloseResult, Period};

#[derive(Parser)]
#[command(name = "finance-close", version, about = "Draft month-end close packs; never posts to the ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bank statement tie-out for one period
    #[command(alias = "bank_recon")]
    BankRecon {
        #[arg(long)]
        period: Period,
    },
    /// VAT reconciliation against the TRA extract for a month range
    #[command(alias = "vat_pack")]
    VatPack {
        #[arg(long, alias = "period_from")]
        period_from: Period,
        #[arg(long, alias = "period_to")]
        period_to: Option<Period>,
        #[arg(long, alias = "tra_file")]
        tra_file: Option<PathBuf>,
    },
    /// Both packs plus the RED/AMBER/GREEN close gate
    #[command(alias = "month_end")]
    MonthEnd {
        #[arg(long)]
        period: Period,
        #[arg(long, alias = "tra_file")]
        tra_file: Option<PathBuf>,
    },
}

fn print_payload<T: Serialize>(payload: &T) -> CloseResult<()> {
    let text = serde_json::to_string_pretty(payload)
        .map_err(|e| finance_close::CloseError::Report(e.to_string()))?;
    println!("{text}");
    println!("no auto-posting performed");
    Ok(())
}

/// Periods are parsed by clap, so a malformed one never reaches the source
async fn run(cli: Cli) -> CloseResult<()> {
    let config = CloseConfig::from_env()?;
    let source = sources::connect(&config).await?;
    let source = source.as_ref();

    match cli.command {
        Command::BankRecon { period } => {
            print_payload(&commands::run_bank_recon(&config, source, &period.to_string()).await?)
        }
        Command::VatPack {
            period_from,
            period_to,
            tra_file,
        } => print_payload(
            &commands::run_vat_pack(
                &config,
                source,
                &period_from.to_string(),
                period_to.map(|p| p.to_string()).as_deref(),
                tra_file.as_deref(),
            )
            .await?,
        ),
        Command::MonthEnd { period, tra_file } => print_payload(
            &commands::run_month_end(&config, source, &period.to_string(), tra_file.as_deref()).await?,
        ),
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
