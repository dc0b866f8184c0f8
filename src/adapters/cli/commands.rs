//! CLI Command Handlers
//!
//! Implementation of all CLI commands for pump-desk.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use solana_sdk::signature::Signature;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::market_data::JupiterPriceClient;
use crate::adapters::pump_fun::{stream_url, PumpPortalClient, WsConnector};
use crate::adapters::solana::{SolanaClient, WalletManager};
use crate::application::{
    FeeEstimator, LiquidationEngine, LiquidationOutcome, LiquidationReport, MonitorSession,
    PriceFetcher, PriceQuote, PriceService, SessionEvent, SessionReport, Subscription,
    TradePreview, TransactionPipeline,
};
use crate::config::{load_config, Config};
use crate::domain::{
    AlertKind, AlertThresholds, CancelToken, ConfirmationState, TradeAction, TradeMode, TradePool,
    TradeRequest,
};
use crate::ports::{ChainRpc, SignatureStatus, TransactionSigner};

/// pump-desk - Pump.fun bonding curve desk for Solana
#[derive(Parser, Debug)]
#[command(
    name = "pump-desk",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Price, monitor and trade pump.fun bonding curve tokens",
    long_about = "pump-desk values pump.fun tokens straight from their on-chain bonding curves, \
                  streams live trades from PumpPortal with price alerts, and trades through \
                  PumpPortal with local signing, fee estimation and bounded retry."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Value tokens from their bonding curves
    Price(PriceCmd),

    /// Stream live trades, launches and price alerts
    Monitor(MonitorCmd),

    /// Buy a token with SOL
    Buy(BuyCmd),

    /// Sell a token for SOL
    Sell(SellCmd),

    /// Show wallet balances or the status of a transaction
    Status(StatusCmd),

    /// Sell every token in the wallet
    Liquidate(LiquidateCmd),

    /// Write a starter configuration file
    InitConfig(InitConfigCmd),
}

/// Value tokens
#[derive(Parser, Debug)]
pub struct PriceCmd {
    /// Token mint addresses
    #[arg(value_name = "MINT", required = true)]
    pub mints: Vec<String>,

    /// Never fall back to the secondary price API
    #[arg(long)]
    pub no_fallback: bool,

    /// Print snapshots as JSON
    #[arg(long)]
    pub json: bool,
}

/// Stream live events
#[derive(Parser, Debug)]
pub struct MonitorCmd {
    /// Token mint to follow (repeatable)
    #[arg(long = "token", value_name = "MINT")]
    pub tokens: Vec<String>,

    /// Wallet whose trades to follow (repeatable)
    #[arg(long = "account", value_name = "ADDRESS")]
    pub accounts: Vec<String>,

    /// Also report every new token launch
    #[arg(long)]
    pub new_tokens: bool,

    /// Stop after this many seconds
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Alert when a followed token trades at or above this price (SOL)
    #[arg(long, value_name = "SOL")]
    pub above: Option<f64>,

    /// Alert when a followed token trades at or below this price (SOL)
    #[arg(long, value_name = "SOL")]
    pub below: Option<f64>,

    /// Print alerts only
    #[arg(short, long)]
    pub quiet: bool,
}

/// Buy a token
#[derive(Parser, Debug)]
pub struct BuyCmd {
    /// Token mint address
    #[arg(value_name = "MINT")]
    pub mint: String,

    /// SOL to spend
    #[arg(value_name = "SOL")]
    pub amount: Decimal,

    #[command(flatten)]
    pub trade: TradeArgs,
}

/// Sell a token
#[derive(Parser, Debug)]
pub struct SellCmd {
    /// Token mint address
    #[arg(value_name = "MINT")]
    pub mint: String,

    /// Whole tokens to sell
    #[arg(value_name = "TOKENS", required_unless_present = "all")]
    pub amount: Option<Decimal>,

    /// Sell the entire wallet balance of this token
    #[arg(long, conflicts_with = "amount")]
    pub all: bool,

    #[command(flatten)]
    pub trade: TradeArgs,
}

/// Options shared by buy and sell
#[derive(clap::Args, Debug)]
pub struct TradeArgs {
    /// Slippage tolerance in percent (default from config)
    #[arg(short, long, value_name = "PCT")]
    pub slippage: Option<f64>,

    /// Explicit priority fee in SOL instead of the estimate
    #[arg(long, value_name = "SOL")]
    pub priority_fee: Option<Decimal>,

    /// Pool to route through: pump, raydium, pump-amm, auto
    #[arg(long, value_name = "POOL", value_parser = parse_pool)]
    pub pool: Option<TradePool>,

    /// Preview fees and expected output without sending
    #[arg(long)]
    pub dry_run: bool,

    /// Send without asking for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Wallet or transaction status
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Transaction signature to check; shows wallet balances when omitted
    #[arg(value_name = "SIGNATURE")]
    pub signature: Option<String>,
}

/// Sell every token
#[derive(Parser, Debug)]
pub struct LiquidateCmd {
    /// Preview every sale without sending
    #[arg(long)]
    pub dry_run: bool,

    /// Send without asking for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Additional mint to keep (repeatable)
    #[arg(long = "exclude", value_name = "MINT")]
    pub exclude: Vec<String>,

    /// Slippage tolerance in percent (default from config)
    #[arg(short, long, value_name = "PCT")]
    pub slippage: Option<f64>,
}

/// Write a starter config
#[derive(Parser, Debug)]
pub struct InitConfigCmd {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

fn parse_pool(s: &str) -> Result<TradePool, String> {
    match s.trim().to_lowercase().as_str() {
        "pump" => Ok(TradePool::Pump),
        "raydium" => Ok(TradePool::Raydium),
        "pump-amm" => Ok(TradePool::PumpAmm),
        "auto" => Ok(TradePool::Auto),
        other => Err(format!("unknown pool '{}', expected pump, raydium, pump-amm or auto", other)),
    }
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let CliApp {
        command,
        config: config_path,
        verbose,
        debug,
    } = app;

    match command {
        Command::InitConfig(cmd) => {
            init_logging(verbose, debug, None)?;
            init_config_command(&config_path, cmd)
        }
        command => {
            let config = load_config(&config_path).with_context(|| {
                format!(
                    "Failed to load configuration from {} (run `pump-desk init-config` to create one)",
                    config_path.display()
                )
            })?;
            init_logging(verbose, debug, Some(&config.logging.level))?;

            match command {
                Command::Price(cmd) => price_command(cmd, &config).await,
                Command::Monitor(cmd) => monitor_command(cmd, &config).await,
                Command::Buy(cmd) => buy_command(cmd, &config).await,
                Command::Sell(cmd) => sell_command(cmd, &config).await,
                Command::Status(cmd) => status_command(cmd, &config).await,
                Command::Liquidate(cmd) => liquidate_command(cmd, &config).await,
                Command::InitConfig(_) => Ok(()),
            }
        }
    }
}

/// Initialize logging system
///
/// `--debug` and `--verbose` win over the configured level; `RUST_LOG` wins over both.
fn init_logging(verbose: bool, debug: bool, config_level: Option<&str>) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config_level.unwrap_or("warn")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    Ok(())
}

fn chain_client(config: &Config) -> Arc<SolanaClient> {
    Arc::new(SolanaClient::with_timeout(
        config.solana.get_rpc_url(),
        config.solana.request_timeout(),
    ))
}

fn price_client(config: &Config) -> Result<Arc<JupiterPriceClient>> {
    let client = JupiterPriceClient::with_url(&config.pump_fun.price_api_url, Duration::from_secs(10))
        .context("Failed to create price client")?;
    Ok(Arc::new(client))
}

fn price_fetcher(config: &Config, chain: Arc<dyn ChainRpc>, prices: Arc<JupiterPriceClient>) -> Result<PriceFetcher> {
    let mut fetcher = PriceFetcher::new(chain, prices, config.pump_fun.curve_params());
    if let Some(program_id) = config.pump_fun.program_id()? {
        fetcher = fetcher.with_program_id(program_id);
    }
    Ok(fetcher)
}

fn build_pipeline(
    config: &Config,
    chain: Arc<dyn ChainRpc>,
    wallet: Arc<WalletManager>,
) -> Result<TransactionPipeline> {
    let portal = PumpPortalClient::new(&config.pump_fun.api_url, config.pump_fun.get_api_key())
        .context("Failed to create PumpPortal client")?
        .with_lightning_options(config.trading.skip_preflight, config.trading.jito_only);

    if config.trading.mode == TradeMode::Lightning && !portal.has_api_key() {
        bail!("Lightning mode requires a PumpPortal API key: set pump_fun.api_key or PUMPPORTAL_API_KEY");
    }

    let fees = FeeEstimator::new(Arc::clone(&chain), config.fees.clone());
    Ok(TransactionPipeline::new(
        chain,
        Arc::new(portal),
        wallet,
        fees,
        config.pipeline_settings(),
    ))
}

/// Load wallet with helpful error messages
fn load_wallet_with_context(keypair_path: &str) -> Result<WalletManager> {
    let path = Path::new(keypair_path);

    if !path.exists() {
        bail!(
            "Wallet file not found: {}\n\n\
             A wallet is required for trading.\n\n\
             To create a new wallet, run:\n  \
             solana-keygen new --outfile {}\n\n\
             Or if you have an existing wallet, update 'keypair_path' in your config.toml",
            keypair_path,
            keypair_path
        );
    }

    WalletManager::from_file(keypair_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load wallet from '{}': {}\n\n\
             Expected a JSON array of bytes (e.g., [1,2,3,...]) or a base58 secret key.",
            keypair_path,
            e
        )
    })
}

/// Cancel `token` on Ctrl+C
fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            token.cancel();
        }
    });
}

fn short(address: &str) -> String {
    if address.is_ascii() && address.len() > 12 {
        format!("{}…{}", &address[..4], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

/// Handle price command
async fn price_command(cmd: PriceCmd, config: &Config) -> Result<()> {
    let chain: Arc<dyn ChainRpc> = chain_client(config);
    let prices = price_client(config)?;
    let mut service = PriceService::new(price_fetcher(config, chain, Arc::clone(&prices))?);
    if !cmd.no_fallback {
        service = service.with_fallback(prices);
    }

    let mut failures = 0;
    for mint in &cmd.mints {
        match service.quote(mint).await {
            Ok(PriceQuote::Curve(snapshot)) if cmd.json => {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            Ok(PriceQuote::Curve(snapshot)) => {
                println!("{}", snapshot.token_address());
                println!("  Price:       {:.12} SOL (${:.8})", snapshot.price_sol(), snapshot.price_usd());
                println!("  Market cap:  ${:.0}", snapshot.market_cap_usd());
                println!("  Progress:    {:.2}%", snapshot.bonding_progress_pct());
                if snapshot.is_migrated() {
                    println!("  Status:      migrated (curve complete)");
                }
            }
            Ok(PriceQuote::Fallback { mint, price_usd, reason }) => {
                println!("{}", mint);
                println!("  Price:       ${:.8} (price API; {})", price_usd, reason);
            }
            Err(e) => {
                failures += 1;
                println!("✗ {}: {}", mint, e);
            }
        }
    }

    if failures == cmd.mints.len() {
        bail!("No price available for any requested token");
    }
    Ok(())
}

fn print_event(event: &SessionEvent, quiet: bool) {
    let time = chrono::Local::now().format("%H:%M:%S");
    match event {
        SessionEvent::Alert(alert) => {
            let side = match alert.kind {
                AlertKind::Above => "above",
                AlertKind::Below => "below",
            };
            println!(
                "{} ALERT {} traded {} {:.12} SOL (price {:.12} SOL, trade #{})",
                time,
                alert.mint,
                side,
                alert.threshold,
                alert.price_sol,
                alert.trade_count
            );
        }
        _ if quiet => {}
        SessionEvent::Trade(trade) => {
            println!(
                "{} {:<4} {} {:>10.4} SOL @ {:.12} by {}",
                time,
                if trade.is_buy { "BUY" } else { "SELL" },
                short(&trade.mint),
                trade.sol_amount,
                trade.price_sol().unwrap_or_default(),
                short(&trade.trader)
            );
        }
        SessionEvent::NewToken(token) => {
            println!(
                "{} NEW  {} ({}) {} by {}",
                time,
                token.symbol,
                token.name,
                token.mint,
                short(&token.creator)
            );
        }
        SessionEvent::Migration(migration) => {
            println!("{} MIGRATED {}", time, migration.mint);
        }
    }
}

fn print_session_report(report: &SessionReport) {
    println!("\nSession summary");
    println!("  Events:          {}", report.events_dispatched);
    println!("  Alerts:          {}", report.alerts_fired);
    println!("  Decode failures: {}", report.decode_failures);

    let mut mints: Vec<_> = report.aggregates.iter().collect();
    mints.sort_by(|a, b| a.0.cmp(b.0));
    for (mint, agg) in mints {
        let change = agg
            .change_pct()
            .map(|c| format!("{:+.2}%", c))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  {}: {} trades ({} buys / {} sells), {:.3} SOL volume, change {}",
            short(mint),
            agg.trade_count,
            agg.buy_count,
            agg.sell_count,
            agg.volume_sol,
            change
        );
    }
}

/// Handle monitor command
async fn monitor_command(cmd: MonitorCmd, config: &Config) -> Result<()> {
    let thresholds = AlertThresholds {
        above: cmd.above,
        below: cmd.below,
    };

    let mut subscriptions: Vec<Subscription> = cmd
        .tokens
        .iter()
        .map(|mint| Subscription::token_trade(mint.as_str()).with_alerts(thresholds))
        .collect();
    subscriptions.extend(cmd.accounts.iter().map(|a| Subscription::account_trade(a.as_str())));
    if cmd.new_tokens {
        subscriptions.push(Subscription::new_token());
    }
    if subscriptions.is_empty() {
        bail!("Nothing to monitor: pass --token, --account or --new-tokens");
    }
    if !thresholds.is_empty() && cmd.tokens.is_empty() {
        tracing::warn!("--above/--below only apply to --token subscriptions");
    }

    let url = stream_url(&config.pump_fun.ws_url, config.pump_fun.get_api_key().as_deref());
    let connector = WsConnector::new(
        Duration::from_secs(config.stream.connect_timeout_secs),
        config.stream.max_message_size,
    );
    let session_config = config.session_config(url, cmd.duration.map(Duration::from_secs));

    let (session, handle) = MonitorSession::new(Arc::new(connector), session_config, subscriptions);
    let ctrl = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            ctrl.cancel();
        }
    });

    println!("Monitoring (Ctrl+C to stop)...");
    let quiet = cmd.quiet;
    let report = session
        .run(move |event| print_event(&event, quiet))
        .await
        .context("Monitoring session failed")?;

    print_session_report(&report);
    Ok(())
}

struct TradeContext {
    chain: Arc<dyn ChainRpc>,
    wallet: Arc<WalletManager>,
}

impl TradeContext {
    fn load(config: &Config) -> Result<Self> {
        let wallet = load_wallet_with_context(&config.solana.get_keypair_path())?;
        Ok(Self {
            chain: chain_client(config),
            wallet: Arc::new(wallet),
        })
    }
}

fn apply_trade_args(mut request: TradeRequest, args: &TradeArgs) -> TradeRequest {
    if let Some(fee) = args.priority_fee {
        request = request.with_priority_fee(fee);
    }
    if let Some(pool) = args.pool {
        request = request.with_pool(pool);
    }
    request
}

/// Handle buy command
async fn buy_command(cmd: BuyCmd, config: &Config) -> Result<()> {
    let ctx = TradeContext::load(config)?;
    let slippage = cmd.trade.slippage.unwrap_or(config.trading.slippage_pct);
    let request = TradeRequest::buy(cmd.mint, cmd.amount, slippage).with_pool(config.trading.pool);
    let request = apply_trade_args(request, &cmd.trade);
    run_trade(request, &cmd.trade, config, ctx).await
}

/// Handle sell command
async fn sell_command(cmd: SellCmd, config: &Config) -> Result<()> {
    let ctx = TradeContext::load(config)?;

    let amount = match cmd.amount {
        Some(amount) if !cmd.all => amount,
        _ => {
            let balances = ctx
                .chain
                .get_token_balances(&ctx.wallet.pubkey())
                .await
                .context("Failed to read token balances")?;
            match balances.into_iter().find(|b| b.mint == cmd.mint.trim()) {
                Some(balance) => balance.ui_amount,
                None => bail!("Wallet holds no {}", cmd.mint),
            }
        }
    };

    let slippage = cmd.trade.slippage.unwrap_or(config.trading.slippage_pct);
    let request = TradeRequest::sell(cmd.mint, amount, slippage).with_pool(config.trading.pool);
    let request = apply_trade_args(request, &cmd.trade);
    run_trade(request, &cmd.trade, config, ctx).await
}

fn print_preview(request: &TradeRequest, preview: &TradePreview, config: &Config) {
    let params = config.pump_fun.curve_params();
    println!("{}", request);
    println!("  Pool:         {}", preview.params.pool);
    println!(
        "  Priority fee: {} SOL ({}, {} µL/CU × {} CU)",
        preview.params.priority_fee_sol,
        preview.fee.source,
        preview.fee.cu_price_micro_lamports,
        preview.fee.cu_limit
    );
    println!("  Network fee:  {} SOL total", preview.fee.total_sol());

    if let (Some(out), Some(min)) = (preview.expected_out, preview.min_out) {
        match request.action {
            TradeAction::Buy => println!(
                "  Expected:     {:.2} tokens (min {:.2})",
                params.whole_tokens(out),
                params.whole_tokens(min)
            ),
            TradeAction::Sell => println!(
                "  Expected:     {:.6} SOL (min {:.6})",
                params.whole_sol(out),
                params.whole_sol(min)
            ),
        }
    }
}

async fn run_trade(request: TradeRequest, args: &TradeArgs, config: &Config, ctx: TradeContext) -> Result<()> {
    let pipeline = build_pipeline(config, Arc::clone(&ctx.chain), Arc::clone(&ctx.wallet))?;
    let fetcher = price_fetcher(config, Arc::clone(&ctx.chain), price_client(config)?)?;

    let curve = match fetcher.curve_state(&request.mint).await {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::debug!(error = %e, "No curve quote available");
            None
        }
    };

    let preview = pipeline.preview(&request, curve.as_ref()).await?;
    println!("Wallet: {}", ctx.wallet.public_key());
    print_preview(&request, &preview, config);

    if args.dry_run {
        println!("\n  Mode: DRY RUN (nothing sent)");
        return Ok(());
    }
    if !args.yes {
        println!("\nConfirmation required: use --yes to send");
        return Ok(());
    }

    let cancel = CancelToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match pipeline.execute(request, &cancel).await {
        Ok(tx) => {
            match tx.confirmation_state() {
                ConfirmationState::Confirmed => println!("\n✓ Confirmed: {}", tx.signature()),
                ConfirmationState::Failed => bail!("Transaction {} failed on chain", tx.signature()),
                ConfirmationState::TimedOut | ConfirmationState::Pending => {
                    println!("\n⚠ Submitted but not confirmed yet: {}", tx.signature());
                    println!("  Check later with: pump-desk status {}", tx.signature());
                }
            }
            Ok(())
        }
        Err(e) => {
            if e.may_have_landed() {
                eprintln!("⚠ The transaction may have landed; check the wallet before retrying");
            }
            let stage = e.stage();
            Err(anyhow::Error::new(e).context(format!("Trade failed during {}", stage)))
        }
    }
}

/// Handle status command
async fn status_command(cmd: StatusCmd, config: &Config) -> Result<()> {
    let solana = chain_client(config);

    if let Some(signature) = cmd.signature {
        let signature = Signature::from_str(signature.trim()).context("Invalid signature")?;
        let status = solana
            .get_signature_status(&signature)
            .await
            .context("Failed to get signature status")?;
        match status {
            SignatureStatus::Confirmed => println!("✓ {} confirmed", signature),
            SignatureStatus::Processing => println!("… {} processing", signature),
            SignatureStatus::NotFound => println!("? {} not found (dropped or not yet seen)", signature),
            SignatureStatus::Failed(reason) => println!("✗ {} failed: {}", signature, reason),
        }
        return Ok(());
    }

    let wallet = load_wallet_with_context(&config.solana.get_keypair_path())?;
    let pubkey = wallet.pubkey();
    let balance = solana
        .get_balance(&pubkey)
        .await
        .context("Failed to get balance")?;
    let tokens = solana
        .get_token_balances(&pubkey)
        .await
        .context("Failed to get token balances")?;

    println!("Wallet: {}", pubkey);
    println!("Balance: {} lamports ({:.4} SOL)", balance, balance as f64 / 1e9);
    if tokens.is_empty() {
        println!("Tokens: none");
    } else {
        println!("Tokens:");
        for token in tokens {
            println!("  {}  {}", token.mint, token.ui_amount);
        }
    }

    Ok(())
}

fn print_liquidation_report(report: &LiquidationReport) {
    for token in &report.tokens {
        match &token.outcome {
            LiquidationOutcome::Sold(tx) => println!(
                "  ✓ {} {} sold ({:?}) {}",
                short(&token.mint),
                token.ui_amount,
                tx.confirmation_state(),
                tx.signature()
            ),
            LiquidationOutcome::Previewed(preview) => {
                let proceeds = preview
                    .expected_out
                    .map(|lamports| format!("~{:.6} SOL", lamports as f64 / 1e9))
                    .unwrap_or_else(|| "no curve quote".to_string());
                println!(
                    "  • {} {} would sell for {}, fee {} SOL",
                    short(&token.mint),
                    token.ui_amount,
                    proceeds,
                    preview.fee.total_sol()
                );
            }
            LiquidationOutcome::Failed { stage, error, may_have_landed } => {
                println!("  ✗ {} failed during {}: {}", short(&token.mint), stage, error);
                if *may_have_landed {
                    println!("    (may have landed, check before retrying)");
                }
            }
            LiquidationOutcome::Skipped => println!("  - {} skipped", short(&token.mint)),
        }
    }
    for mint in &report.excluded {
        println!("  = {} excluded", short(mint));
    }
}

/// Handle liquidate command
async fn liquidate_command(cmd: LiquidateCmd, config: &Config) -> Result<()> {
    let ctx = TradeContext::load(config)?;
    let preview_only = cmd.dry_run || !cmd.yes;

    let mut liquidation = config.liquidation_config(preview_only);
    liquidation.exclusions.extend(cmd.exclude);
    if let Some(slippage) = cmd.slippage {
        if !(0.0..=100.0).contains(&slippage) {
            bail!("Slippage must be within 0-100%, got {}", slippage);
        }
        liquidation.slippage_pct = slippage;
    }

    let pipeline = build_pipeline(config, Arc::clone(&ctx.chain), Arc::clone(&ctx.wallet))?;
    let fetcher = price_fetcher(config, Arc::clone(&ctx.chain), price_client(config)?)?;
    let engine = LiquidationEngine::new(Arc::clone(&ctx.chain), pipeline, liquidation)
        .with_curve_reader(fetcher);

    let cancel = CancelToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let report = engine.liquidate(&ctx.wallet.pubkey(), &cancel).await?;
    println!("Liquidating {}{}", report.wallet, if preview_only { " (preview)" } else { "" });
    print_liquidation_report(&report);

    if report.tokens.is_empty() {
        println!("Nothing to sell");
    } else if preview_only && !cmd.dry_run {
        println!("\nConfirmation required: use --yes to sell");
    }

    if report.failed() > 0 {
        bail!("{} of {} token(s) failed to liquidate", report.failed(), report.tokens.len());
    }
    Ok(())
}

/// Handle init-config command
fn init_config_command(path: &Path, cmd: InitConfigCmd) -> Result<()> {
    if path.exists() && !cmd.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, Config::example_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✓ Wrote starter config to {}", path.display());
    println!("  Edit keypair_path and rpc_url before trading.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cli_app_parse_price() {
        let args = vec!["pump-desk", "price", "MintA", "MintB", "--json"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Price(cmd) => {
                assert_eq!(cmd.mints, vec!["MintA", "MintB"]);
                assert!(cmd.json);
                assert!(!cmd.no_fallback);
            }
            _ => panic!("Expected Price command"),
        }
        assert_eq!(app.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_cli_app_parse_price_requires_mint() {
        assert!(CliApp::try_parse_from(vec!["pump-desk", "price"]).is_err());
    }

    #[test]
    fn test_cli_app_parse_monitor() {
        let args = vec![
            "pump-desk", "monitor", "--token", "MintA", "--token", "MintB", "--account", "Whale",
            "--new-tokens", "--duration", "60", "--above", "0.0001",
        ];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Monitor(cmd) => {
                assert_eq!(cmd.tokens.len(), 2);
                assert_eq!(cmd.accounts, vec!["Whale"]);
                assert!(cmd.new_tokens);
                assert_eq!(cmd.duration, Some(60));
                assert_eq!(cmd.above, Some(0.0001));
                assert!(cmd.below.is_none());
            }
            _ => panic!("Expected Monitor command"),
        }
    }

    #[test]
    fn test_cli_app_parse_buy() {
        let args = vec![
            "pump-desk", "buy", "MintA", "0.25", "--slippage", "15", "--pool", "pump-amm", "--dry-run",
            "-c", "other.toml",
        ];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Buy(cmd) => {
                assert_eq!(cmd.amount, dec!(0.25));
                assert_eq!(cmd.trade.slippage, Some(15.0));
                assert_eq!(cmd.trade.pool, Some(TradePool::PumpAmm));
                assert!(cmd.trade.dry_run);
                assert!(!cmd.trade.yes);
            }
            _ => panic!("Expected Buy command"),
        }
        assert_eq!(app.config, PathBuf::from("other.toml"));
    }

    #[test]
    fn test_cli_app_parse_sell_all() {
        let app = CliApp::try_parse_from(vec!["pump-desk", "sell", "MintA", "--all", "-y"]).unwrap();
        match app.command {
            Command::Sell(cmd) => {
                assert!(cmd.all);
                assert!(cmd.amount.is_none());
                assert!(cmd.trade.yes);
            }
            _ => panic!("Expected Sell command"),
        }

        assert!(CliApp::try_parse_from(vec!["pump-desk", "sell", "MintA"]).is_err());
        assert!(CliApp::try_parse_from(vec!["pump-desk", "sell", "MintA", "100", "--all"]).is_err());
    }

    #[test]
    fn test_cli_app_parse_bad_pool() {
        let args = vec!["pump-desk", "buy", "MintA", "1", "--pool", "orca"];
        assert!(CliApp::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_app_parse_liquidate() {
        let args = vec!["pump-desk", "liquidate", "--dry-run", "--exclude", "KeepMe", "--verbose"];
        let app = CliApp::try_parse_from(args).unwrap();

        assert!(app.verbose);
        match app.command {
            Command::Liquidate(cmd) => {
                assert!(cmd.dry_run);
                assert_eq!(cmd.exclude, vec!["KeepMe"]);
            }
            _ => panic!("Expected Liquidate command"),
        }
    }

    #[test]
    fn test_apply_trade_args() {
        let args = TradeArgs {
            slippage: None,
            priority_fee: Some(dec!(0.0005)),
            pool: Some(TradePool::Raydium),
            dry_run: false,
            yes: false,
        };
        let request = apply_trade_args(TradeRequest::buy("MintA", dec!(1), 10.0), &args);
        assert_eq!(request.priority_fee_sol, Some(dec!(0.0005)));
        assert_eq!(request.pool, TradePool::Raydium);
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init_config_command(&path, InitConfigCmd { force: false }).unwrap();
        assert!(load_config(&path).is_ok());

        assert!(init_config_command(&path, InitConfigCmd { force: false }).is_err());
        assert!(init_config_command(&path, InitConfigCmd { force: true }).is_ok());
    }

    #[test]
    fn test_short_address() {
        assert_eq!(short("4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R"), "4k3D…kX6R");
        assert_eq!(short("MintA"), "MintA");
    }
}
