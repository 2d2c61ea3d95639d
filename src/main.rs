// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use chrono::{Datelike, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use stayvault::app::config::GlobalSettings;
use stayvault::app::logging::setup_logging;
use stayvault::common::parsing::{format_token_amount, parse_token_amount, require_address};
use stayvault::common::time::current_unix;
use stayvault::domain::NightNumber;
use stayvault::domain::constants::{TOKEN_SYMBOL, get_block_time};
use stayvault::domain::error::AppError;
use stayvault::domain::night::NightCodec;
use stayvault::infrastructure::ledger::memory::demo_ledger;
use stayvault::infrastructure::ledger::{AlloyLedger, LedgerBackend, LedgerClient};
use stayvault::infrastructure::network::provider::ConnectionFactory;
use stayvault::services::auction::AuctionCoordinator;
use stayvault::services::availability::AvailabilityProjector;
use stayvault::services::booking::{BookingRequest, BookingSequencer, BookingState};
use stayvault::services::vaults::VaultAdmin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "stayvault: book and bid on per-night property vaults")]
struct Cli {
    /// Path to config file (default: config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Run against an in-process ledger seeded with a demo property
    #[arg(long, global = true, default_value_t = false)]
    dry_run: bool,

    /// Emit logs as JSON
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List parent vaults
    Vaults,
    /// Per-night availability for one month
    Availability {
        #[arg(long)]
        vault: String,
        /// YYYY-MM; defaults to the current month
        #[arg(long)]
        month: Option<String>,
    },
    /// Reserve a batch of nights or one date range
    Book(BookArgs),
    /// Show the auction on a sub-vault
    Bids {
        #[arg(long)]
        sub_vault: String,
    },
    /// Outbid the current booker
    Bid {
        #[arg(long)]
        sub_vault: String,
        /// Decimal token amount, e.g. 150.5
        #[arg(long)]
        amount: String,
    },
    /// Hand your reservation to the bid at INDEX
    Cede {
        #[arg(long)]
        sub_vault: String,
        #[arg(long)]
        index: u64,
    },
    /// Withdraw your bid at INDEX
    Withdraw {
        #[arg(long)]
        sub_vault: String,
        #[arg(long)]
        index: u64,
    },
    CheckIn {
        #[arg(long)]
        sub_vault: String,
    },
    CheckOut {
        #[arg(long)]
        sub_vault: String,
    },
    /// Cancel a reservation that has no active bids
    Cancel {
        #[arg(long)]
        sub_vault: String,
    },
    /// Guest access code of your current reservation
    AccessCode {
        #[arg(long)]
        sub_vault: String,
    },
    CreateVault {
        #[arg(long)]
        vault_id: String,
        #[arg(long, default_value = "")]
        details: String,
        /// Decimal daily price, e.g. 100
        #[arg(long)]
        price: String,
        #[arg(long, env = "MASTER_ACCESS_CODE", hide_env_values = true)]
        code: String,
    },
    UpdateCode {
        #[arg(long)]
        vault_id: String,
        #[arg(long, env = "NEW_MASTER_ACCESS_CODE", hide_env_values = true)]
        code: String,
    },
}

#[derive(Args, Debug)]
struct BookArgs {
    #[arg(long)]
    vault: String,
    #[arg(long, env = "MASTER_ACCESS_CODE", hide_env_values = true)]
    code: String,
    /// Night numbers, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["dates", "from"])]
    nights: Vec<u64>,
    /// Calendar dates (YYYY-MM-DD), comma separated
    #[arg(long, value_delimiter = ',', conflicts_with = "from")]
    dates: Vec<NaiveDate>,
    /// Range check-in date; books one date-range sub-vault
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,
    /// Range check-out date (exclusive)
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
    /// Print the quote and stop before any write
    #[arg(long, default_value_t = false)]
    quote_only: bool,
}

fn emit<T: Serialize>(value: &T) -> Result<(), AppError> {
    let body = serde_json::to_string_pretty(value).map_err(|e| AppError::Unknown(e.into()))?;
    println!("{body}");
    Ok(())
}

async fn connect(settings: &GlobalSettings, codec: NightCodec, dry_run: bool) -> Result<LedgerClient, AppError> {
    let ledger_config = settings.ledger_config();
    let backend: Arc<dyn LedgerBackend> = if dry_run {
        let signer = settings.identity();
        tracing::info!(target: "config", signer = %format!("{signer:#x}"), "Dry-run: using in-process ledger");
        Arc::new(demo_ledger(codec, signer))
    } else {
        let signer = settings.wallet_signer()?;
        let address = signer.address();
        let (factory, token) = settings.contract_addresses()?;
        let rpc_url = settings.rpc_url_value()?;
        let provider = ConnectionFactory::signing_http(&rpc_url, signer)?;
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| AppError::Connection(format!("chain_id detect failed: {e}")))?;
        if chain_id != settings.chain_id {
            return Err(AppError::Config(format!(
                "RPC serves chain {chain_id}, config expects {}",
                settings.chain_id
            )));
        }
        tracing::info!(
            target: "config",
            chain_id,
            block_time_s = get_block_time(chain_id),
            signer = %format!("{address:#x}"),
            factory = %format!("{factory:#x}"),
            token = %format!("{token:#x}"),
            "Connected to ledger"
        );
        Arc::new(AlloyLedger::new(provider, address, factory, token))
    };
    Ok(LedgerClient::new(backend, ledger_config))
}

fn parse_month(raw: Option<&str>, codec: &NightCodec) -> Result<(i32, u32), AppError> {
    match raw {
        Some(raw) => {
            let first = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
                .map_err(|e| AppError::InvalidDate(format!("{raw:?} is not YYYY-MM: {e}")))?;
            Ok((first.year(), first.month()))
        }
        None => {
            let today = codec.night_to_date(codec.timestamp_to_night(current_unix())?)?;
            Ok((today.year(), today.month()))
        }
    }
}

fn booking_request(codec: &NightCodec, args: &BookArgs) -> Result<BookingRequest, AppError> {
    if let (Some(from), Some(to)) = (args.from, args.to) {
        return BookingRequest::for_date_range(codec, &args.vault, &args.code, from, to);
    }
    if !args.dates.is_empty() {
        return BookingRequest::for_dates(codec, &args.vault, &args.code, &args.dates);
    }
    let nights: Vec<NightNumber> = args.nights.iter().copied().map(NightNumber).collect();
    BookingRequest::for_nights(codec, &args.vault, &args.code, &nights)
}

async fn book(ledger: LedgerClient, codec: NightCodec, args: BookArgs) -> Result<(), AppError> {
    let request = booking_request(&codec, &args)?;
    let sequencer = BookingSequencer::new(ledger);

    let quote = sequencer.quote(&request).await?;
    tracing::info!(
        target: "booking",
        nights = quote.nights,
        total = %format_token_amount(quote.total_stake),
        symbol = TOKEN_SYMBOL,
        "Quote"
    );
    if args.quote_only {
        return emit(&quote);
    }
    let state = BookingState::confirmed(quote);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(target: "booking", "Interrupt received; finishing the in-flight step");
            on_signal.cancel();
        }
    });

    let state = sequencer.run(&request, state, &cancel).await;
    let report = sequencer.report(&request, &state);
    emit(&report)?;
    match report.failed {
        Some(failure) => Err(anyhow::anyhow!(
            "booking halted at {:?} (unit {:?}): {}",
            failure.step,
            failure.unit_index,
            failure.reason
        )
        .into()),
        None => Ok(()),
    }
}

async fn expected_bid(
    auction: &AuctionCoordinator,
    sub_vault: Address,
    index: u64,
) -> Result<stayvault::domain::Bid, AppError> {
    // Refetch right before an index-based action.
    let view = auction.load(sub_vault).await?;
    view.bids
        .get(index as usize)
        .cloned()
        .ok_or_else(|| AppError::StaleReference {
            bid_index: index,
            reason: format!("auction has {} bids", view.bids.len()),
        })
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(settings.log_level(), cli.json_logs || settings.log_json);

    let codec = settings.night_codec()?;
    let ledger = connect(&settings, codec, cli.dry_run).await?;

    match cli.command {
        Command::Vaults => {
            let vaults = VaultAdmin::new(ledger).list().await?;
            emit(&vaults)?;
        }
        Command::Availability { vault, month } => {
            let (year, month) = parse_month(month.as_deref(), &codec)?;
            let projector = AvailabilityProjector::load(&ledger, codec, &vault).await?;
            let summary = projector.month_summary(year, month)?;
            let first = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| AppError::InvalidDate(format!("{year}-{month:02}")))?;
            let next = first
                .checked_add_months(chrono::Months::new(1))
                .ok_or_else(|| AppError::InvalidDate(format!("{year}-{month:02}")))?;
            let bookable = projector.bookable_nights(first, next)?;
            emit(&json!({
                "vault_id": vault,
                "month": format!("{year}-{month:02}"),
                "summary": summary,
                "bookable_nights": bookable,
            }))?;
        }
        Command::Book(args) => book(ledger, codec, args).await?,
        Command::Bids { sub_vault } => {
            let sub_vault = require_address("sub_vault", &sub_vault)?;
            let view = AuctionCoordinator::new(ledger).load(sub_vault).await?;
            emit(&view)?;
        }
        Command::Bid { sub_vault, amount } => {
            let sub_vault = require_address("sub_vault", &sub_vault)?;
            let amount: U256 = parse_token_amount(&amount)?;
            let auction = AuctionCoordinator::new(ledger);
            let view = auction.load(sub_vault).await?;
            emit(&auction.place_bid(&view, amount).await?)?;
        }
        Command::Cede { sub_vault, index } => {
            let sub_vault = require_address("sub_vault", &sub_vault)?;
            let auction = AuctionCoordinator::new(ledger);
            let expected = expected_bid(&auction, sub_vault, index).await?;
            emit(&auction.cede_reservation(sub_vault, index, &expected).await?)?;
        }
        Command::Withdraw { sub_vault, index } => {
            let sub_vault = require_address("sub_vault", &sub_vault)?;
            let auction = AuctionCoordinator::new(ledger);
            let expected = expected_bid(&auction, sub_vault, index).await?;
            emit(&auction.withdraw_bid(sub_vault, index, &expected).await?)?;
        }
        Command::CheckIn { sub_vault } => {
            let sub_vault = require_address("sub_vault", &sub_vault)?;
            emit(&AuctionCoordinator::new(ledger).check_in(sub_vault).await?)?;
        }
        Command::CheckOut { sub_vault } => {
            let sub_vault = require_address("sub_vault", &sub_vault)?;
            emit(&AuctionCoordinator::new(ledger).check_out(sub_vault).await?)?;
        }
        Command::Cancel { sub_vault } => {
            let sub_vault = require_address("sub_vault", &sub_vault)?;
            emit(&AuctionCoordinator::new(ledger).cancel_reservation(sub_vault).await?)?;
        }
        Command::AccessCode { sub_vault } => {
            let sub_vault = require_address("sub_vault", &sub_vault)?;
            let code = AuctionCoordinator::new(ledger).access_code(sub_vault).await?;
            emit(&json!({ "sub_vault": format!("{sub_vault:#x}"), "access_code": code }))?;
        }
        Command::CreateVault {
            vault_id,
            details,
            price,
            code,
        } => {
            let price = parse_token_amount(&price)?;
            let vault = VaultAdmin::new(ledger)
                .create_vault(&vault_id, &details, price, &code)
                .await?;
            emit(&vault)?;
        }
        Command::UpdateCode { vault_id, code } => {
            let tx = VaultAdmin::new(ledger)
                .update_master_access_code(&vault_id, &code)
                .await?;
            emit(&tx)?;
        }
    }

    Ok(())
}
