mod commands;

use clap::{Args, Parser, Subcommand};
use cryptopay_core::{PaymentError, SessionEvent, SupportedCurrency, WidgetOptions};
use gateway::{http::HttpGateway, mock::MockGateway, PaymentGateway};
use pricing::{CoinGeckoFeed, FixedPriceFeed, PriceConverter, PriceFeed};
use session::{PaymentCallbacks, PaymentSessionManager, SessionJournal};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a payment and wait until it is confirmed, expires or is dismissed
    Pay(PayArgs),

    /// Inspect or change stored settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args)]
struct PayArgs {
    /// Amount to charge, in fiat
    #[arg(long)]
    amount: f64,

    /// ETH, BTC or USDC
    #[arg(long)]
    currency: SupportedCurrency,

    /// Fiat currency code (defaults to the configured one)
    #[arg(long)]
    fiat: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Payment service base URL; implies the HTTP backend
    #[arg(long)]
    api_url: Option<String>,

    /// Append session events to this JSONL file
    #[arg(long)]
    journal: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective settings
    Show,
    /// Store the payment service base URL
    SetApiUrl { url: String },
    /// Store the price feed API key in the OS keychain (empty removes it)
    SetPriceKey { key: String },
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Payment service URL, or `None` for the in-process mock.
fn http_backend_url(cfg: &config::AppConfig, options: &WidgetOptions) -> Option<String> {
    let explicit = options.api_base_url.as_deref();
    (explicit.is_some() || cfg.backend.kind == "http").then(|| config::api_base_url(explicit, cfg))
}

fn create_gateway(
    cfg: &config::AppConfig,
    options: &WidgetOptions,
) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    if let Some(base_url) = http_backend_url(cfg, options) {
        tracing::info!(%base_url, "Using HTTP payment service");
        return Ok(HttpGateway::new(base_url)?);
    }

    tracing::info!("Using mock payment service");
    let mock = MockGateway::new();
    mock.confirm_after(2);
    Ok(mock)
}

fn create_price_feed(cfg: &config::AppConfig) -> anyhow::Result<Arc<dyn PriceFeed>> {
    match cfg.price_feed.kind.as_str() {
        "fixed" => {
            tracing::info!("Using fixed prices");
            Ok(Arc::new(
                FixedPriceFeed::new()
                    .with_price(SupportedCurrency::Eth, 3000.0)
                    .with_price(SupportedCurrency::Btc, 60000.0),
            ))
        }
        _ => {
            let api_key = config::price_api_key();
            tracing::info!(keyed = api_key.is_some(), "Using CoinGecko prices");
            let feed = match cfg.price_feed.base_url.as_deref() {
                Some(base) => CoinGeckoFeed::with_base_url(base, api_key, reqwest::Client::new())?,
                None => CoinGeckoFeed::new(api_key)?,
            };
            Ok(Arc::new(feed))
        }
    }
}

// The error hook has already printed the cause.
fn creation_failure(err: &PaymentError) -> anyhow::Error {
    if err.is_transient() {
        anyhow::anyhow!("Payment service unavailable, try again shortly")
    } else {
        anyhow::anyhow!("Could not open a payment")
    }
}

async fn pay(args: PayArgs) -> anyhow::Result<()> {
    let cfg = config::load().unwrap_or_default();

    let mut options = WidgetOptions::new(args.amount);
    options.fiat_currency = args.fiat.unwrap_or_else(|| cfg.widget.fiat_currency.clone());
    options.accepted_currencies = cfg.widget.accepted_currencies.clone();
    options.description = args.description;
    options.api_base_url = args.api_url;

    let gateway = create_gateway(&cfg, &options)?;
    let converter = PriceConverter::new(create_price_feed(&cfg)?);
    let callbacks = PaymentCallbacks::new()
        .on_pending(|session_id| tracing::info!(%session_id, "Awaiting payment"))
        .on_complete(|tx_hash| println!("\nPayment confirmed in {tx_hash}"))
        .on_error(|err| eprintln!("\n{err}"));

    let mut manager = PaymentSessionManager::new(options, gateway, converter, callbacks)?;
    if let Some(path) = args.journal.or(cfg.journal.path) {
        manager = manager.with_journal(SessionJournal::new(path));
    }

    let deposit = manager
        .select_currency(args.currency)
        .await
        .map_err(|err| creation_failure(&err))?;

    let options = manager.options();
    match options.description.as_deref() {
        Some(description) => println!(
            "Charging {:.2} {} for {}",
            options.fiat_amount, options.fiat_currency, description
        ),
        None => println!("Charging {:.2} {}", options.fiat_amount, options.fiat_currency),
    }
    if let Some(quote) = manager.quote() {
        println!("Send {} to {}", quote, deposit.address);
    }
    if let Some(uri) = manager.payment_uri() {
        println!("Payment URI: {uri}");
    }
    println!("Expires at {}", deposit.expires_at.to_rfc3339());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut completed = false;

    loop {
        tokio::select! {
            event = manager.step() => match event {
                Some(SessionEvent::Countdown(left)) => {
                    print!("\rTime left {left}");
                    std::io::stdout().flush()?;
                }
                Some(SessionEvent::Completed { .. }) => {
                    completed = true;
                    let session = manager.snapshot();
                    if let Some(session_id) = session.session_id() {
                        println!("Payment {session_id} complete");
                    }
                }
                Some(SessionEvent::Closed) | None => break,
                Some(event) => tracing::debug!(kind = event.kind(), "Session event"),
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if manager.dismiss() {
                    println!("\nPayment dismissed");
                    return Ok(());
                }
                println!("\nPayment already received, closing shortly");
            }
        }
    }

    if !completed {
        anyhow::bail!("Payment was not completed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Command::Pay(args) => pay(args).await,
        Command::Config(ConfigCommand::Show) => commands::show_settings(),
        Command::Config(ConfigCommand::SetApiUrl { url }) => commands::set_api_url(url),
        Command::Config(ConfigCommand::SetPriceKey { key }) => commands::set_price_key(key),
    }
}
