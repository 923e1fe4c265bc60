use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ethers::{signers::Signer, types::H160};
use eyre::{bail, eyre, WrapErr};
use forma_swap::{
    address_book::AddressBook,
    amm::uniswap_v2::{factory::UniswapV2Factory, pool::UniswapV2Pool},
    backend::{DexBackend, EthersBackend},
    balances::{BalanceReader, Balances},
    error::DexError,
    eth_provider::{parse_wallet, EthProvider, SignerClient},
    format::format_balance,
    market::Market,
    quote::{debounce::QuoteDebouncer, Quote, QuoteEngine},
    token::{Side, SwapDirection, TradePair},
    trade::{
        liquidity::LiquidityPlanner, slippage::Slippage, LogObserver, MinOutput, SwapExecutor,
        SwapObserver, SwapState,
    },
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forma-swap")]
#[command(about = "Quote, swap and add liquidity on a Uniswap V2 router", long_about = None)]
struct Cli {
    /// Deployment YAML file. Defaults to DEPLOYMENT_FILE, then plain env vars
    #[arg(long, global = true)]
    deployment: Option<PathBuf>,

    /// Print JSON (quote, balances, pool)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show native, wrapped and token balances
    Balances {
        /// Account to inspect, defaults to the PRIVATE_KEY wallet
        #[arg(long)]
        account: Option<String>,
    },
    /// Poll balances until Ctrl-C
    Watch {
        #[arg(long)]
        account: Option<String>,
    },
    /// Expected output for a swap
    Quote {
        /// Symbol being sold (TIA, WTIA or YTK)
        #[arg(long)]
        sell: String,
        #[arg(long)]
        amount: String,
        /// Slippage tolerance in percent
        #[arg(long)]
        slippage: Option<f64>,
    },
    /// Swap the native coin for the token or back
    Swap {
        #[arg(long)]
        sell: String,
        #[arg(long)]
        amount: String,
        /// Minimum output; derived from slippage when omitted
        #[arg(long)]
        min_out: Option<String>,
        #[arg(long)]
        slippage: Option<f64>,
        #[arg(long)]
        no_gas_estimate: bool,
    },
    /// Approve the router to spend the token
    Approve {
        #[arg(long)]
        no_gas_estimate: bool,
    },
    /// Counterpart deposit at the current pool ratio
    LiquidityAmount {
        /// Side the amount is given for (TIA or YTK)
        #[arg(long)]
        side: String,
        #[arg(long)]
        amount: String,
    },
    /// Add liquidity; a missing amount is derived from the pool ratio
    AddLiquidity {
        #[arg(long)]
        token_amount: Option<String>,
        #[arg(long)]
        native_amount: Option<String>,
        #[arg(long)]
        no_gas_estimate: bool,
    },
    /// Wrap native coin
    Wrap {
        #[arg(long)]
        amount: String,
    },
    /// Unwrap to native coin
    Unwrap {
        #[arg(long)]
        amount: String,
    },
    /// Show the pair address and reserves
    Pool,
    /// Check the deployment: chain id, contract code and router wiring
    Inspect,
    /// Read `<sell> <amount>` lines from stdin and print debounced quotes.
    /// With PRIVATE_KEY set, `swap <sell> <amount>` also swaps and balances
    /// refresh as soon as it confirms
    Interactive,
}

/// Spinner that follows the swap states.
struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    fn new() -> eyre::Result<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
        bar.enable_steady_tick(Duration::from_millis(120));
        Ok(SpinnerObserver { bar })
    }
}

impl SwapObserver for SpinnerObserver {
    fn on_state(&self, state: &SwapState) {
        info!(?state, "swap state");
        match state {
            SwapState::Idle | SwapState::Validating => self.bar.set_message("Validating"),
            SwapState::Rejected(reason) => self.bar.finish_with_message(format!("Rejected: {}", reason)),
            SwapState::Approving => self.bar.set_message("Approving token spending"),
            SwapState::Approved(hash) => self.bar.set_message(format!("Approved in {:?}", hash)),
            SwapState::Submitting => self.bar.set_message("Submitting transaction"),
            SwapState::Pending(hash) => self.bar.set_message(format!("Waiting for {:?}", hash)),
            SwapState::Confirmed(receipt) => self.bar.finish_with_message(format!(
                "Confirmed {:?} in block {}",
                receipt.hash,
                receipt.block_number.unwrap_or_default()
            )),
            SwapState::Reverted(receipt) => {
                self.bar.finish_with_message(format!("Reverted {:?}", receipt.hash))
            }
        }
    }
}

fn parse_account(account: &str) -> eyre::Result<H160> {
    H160::from_str(account.trim()).map_err(|err| eyre!("invalid address `{}`: {}", account, err))
}

fn direction(market: &Market, sell: &str) -> eyre::Result<SwapDirection> {
    market
        .pair
        .side(sell)
        .map(SwapDirection::selling)
        .ok_or_else(|| eyre!("unknown token `{}`, expected one of {}", sell, market.pair))
}

fn slippage(market: &Market, percent: Option<f64>) -> Result<Slippage, DexError> {
    Slippage::from_percent(percent.unwrap_or(market.settings.default_slippage_percent))
}

fn print_json(value: &serde_json::Value) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_error(err: &DexError) {
    eprintln!("Error: {}", err);
}

fn print_quote(market: &Market, direction: SwapDirection, amount: &str, quote: &Quote, slippage: Slippage) {
    let sell = market.pair.symbol(direction.sell_side());
    let buy = market.pair.symbol(direction.buy_side());
    match quote {
        Quote::Amount { formatted, source, .. } => {
            let min = quote
                .min_received(slippage)
                .map(|raw| market.pair.buy_token(direction).format(raw))
                .unwrap_or_default();
            println!("{} {} -> {} {} ({:?})", amount, sell, format_balance(formatted), buy, source);
            println!("Minimum received at {}: {} {}", slippage, format_balance(&min), buy);
        }
        Quote::Unavailable(reason) => println!("{} {} -> {}", amount, sell, reason),
    }
}

fn balance_line(pair: &TradePair, balances: &Balances) -> String {
    let rows: Vec<String> = balances
        .rows(pair)
        .into_iter()
        .map(|(symbol, amount)| format!("{} {}", amount, symbol))
        .collect();
    rows.join(" | ")
}

/// `--account` when given, otherwise the address of the PRIVATE_KEY wallet.
fn read_account(account: Option<&str>, chain_id: u64) -> eyre::Result<H160> {
    if let Some(account) = account {
        return parse_account(account);
    }
    match EthProvider::private_key() {
        Some(key) => Ok(parse_wallet(&key, chain_id)?.address()),
        None => bail!("pass --account or set PRIVATE_KEY"),
    }
}

async fn show_balances<B: DexBackend + ?Sized>(
    backend: Arc<B>,
    market: &Market,
    account: H160,
    json: bool,
) -> eyre::Result<()> {
    let mut reader = BalanceReader::new(backend, market.pair.clone());
    let balances = reader.fetch(account).await?;
    if json {
        return print_json(&json!({ "account": account, "balances": balances }));
    }
    println!("Balances of {:?}", account);
    for (symbol, amount) in balances.rows(&market.pair) {
        println!("  {:<6} {}", symbol, amount);
    }
    Ok(())
}

async fn show_pool<B: DexBackend + ?Sized>(backend: &B, market: &Market, json: bool) -> eyre::Result<()> {
    let factory = UniswapV2Factory::from_router(backend).await?;
    let pool = UniswapV2Pool::load(
        backend,
        &factory,
        market.pair.wrapped.address,
        market.pair.token.address,
    )
    .await?;
    if json {
        return print_json(&json!({ "factory": factory.address, "pool": pool }));
    }
    match pool {
        Some(pool) => {
            println!("Pair {:?} (factory {:?})", pool.address, factory.address);
            println!("  token0 {:?}", pool.token_0);
            for token in [&market.pair.wrapped, &market.pair.token] {
                let reserve = pool.get_reserve_for_token(&token.address);
                println!(
                    "  {:<6} {} ({})",
                    token.symbol,
                    format_balance(&token.format(reserve.into())),
                    reserve
                );
            }
        }
        None => println!("No pair for {} (factory {:?})", market.pair, factory.address),
    }
    Ok(())
}

async fn inspect<B: DexBackend + ?Sized>(backend: &B, book: &AddressBook, market: &Market) -> eyre::Result<()> {
    let chain_id = backend.chain_id().await?;
    let status = |ok: bool| if ok { "ok" } else { "MISMATCH" };
    println!("Chain id        {} ({})", chain_id, status(chain_id == book.chain_id));
    for (name, address) in [
        ("Router", book.router),
        (book.wrapped_symbol.as_str(), book.wrapped),
        (book.token_symbol.as_str(), book.token),
    ] {
        let deployed = backend.code_exists(address).await?;
        let state = if deployed { "deployed" } else { "not deployed" };
        println!("{:<15} {:?} {}", name, address, state);
    }
    match backend.router_weth().await {
        Ok(weth) => println!("Router WETH     {:?} ({})", weth, status(weth == book.wrapped)),
        Err(err) => println!("Router WETH     unavailable: {}", DexError::from(err)),
    }
    match backend.router_factory().await {
        Ok(factory) => {
            println!("Router factory  {:?}", factory);
            let pair = UniswapV2Factory::new(factory)
                .get_pair_address(backend, book.wrapped, book.token)
                .await?;
            match pair {
                Some(pair) => {
                    let token0 = backend.pair_token0(pair).await?;
                    println!("Pair            {:?} (token0 {:?})", pair, token0);
                }
                None => println!("Pair            none"),
            }
        }
        Err(err) => println!("Router factory  unavailable: {}", DexError::from(err)),
    }
    println!("{} decimals    {}", market.pair.token.symbol, market.pair.token.decimals);
    Ok(())
}

async fn interactive<B: DexBackend + ?Sized + 'static>(backend: Arc<B>, market: Market) -> eyre::Result<()> {
    let engine = Arc::new(QuoteEngine::new(backend.clone(), market.clone()));
    let delay = market.settings.quote_debounce();
    let (debouncer, mut updates) = QuoteDebouncer::spawn(engine, delay);
    let slippage = slippage(&market, None)?;
    let printer_market = market.clone();
    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            print_quote(
                &printer_market,
                update.request.direction,
                &update.request.amount,
                &update.quote,
                slippage,
            );
        }
    });

    let mut executor = SwapExecutor::new(backend.clone(), market.clone());
    let watcher = backend.account().map(|account| {
        let mut reader = BalanceReader::new(backend.clone(), market.pair.clone());
        executor = SwapExecutor::new(backend.clone(), market.clone())
            .with_balance_refresh(reader.refresh_handle());
        let pair = market.pair.clone();
        let interval = market.settings.balance_refresh_interval();
        tokio::spawn(async move {
            let mut previous: Option<Balances> = None;
            reader
                .watch(account, interval, move |balances| {
                    if previous.as_ref() != Some(balances) {
                        println!("{}", balance_line(&pair, balances));
                        previous = Some(balances.clone());
                    }
                    true
                })
                .await
        })
    });

    println!("Enter `<sell> <amount>`, e.g. `{} 0.01`. Ctrl-D to exit.", market.pair.native_symbol);
    if watcher.is_some() {
        println!("Enter `swap <sell> <amount>` to swap at {} slippage.", slippage);
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let Some(first) = parts.next() else {
            continue;
        };
        if !first.eq_ignore_ascii_case("swap") {
            match direction(&market, first) {
                Ok(direction) => {
                    debouncer.request(direction, parts.next().unwrap_or_default());
                }
                Err(err) => eprintln!("{}", err),
            }
            continue;
        }
        if watcher.is_none() {
            eprintln!("swapping needs PRIVATE_KEY");
            continue;
        }
        let (Some(sell), Some(amount)) = (parts.next(), parts.next()) else {
            eprintln!("usage: swap <sell> <amount>");
            continue;
        };
        let direction = match direction(&market, sell) {
            Ok(direction) => direction,
            Err(err) => {
                eprintln!("{}", err);
                continue;
            }
        };
        match executor
            .swap(direction, amount, &MinOutput::FromSlippage, slippage, &LogObserver)
            .await
        {
            Ok(outcome) => println!(
                "Swapped {} {} in {:?}",
                market.pair.sell_token(direction).format(outcome.amount_in),
                market.pair.symbol(direction.sell_side()),
                outcome.receipt.hash
            ),
            Err(err) => print_error(&err),
        }
    }
    debouncer.close().await?;
    printer.await?;
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    Ok(())
}

async fn run(cli: Cli) -> eyre::Result<()> {
    let book = AddressBook::load(cli.deployment.as_deref())?;
    let provider = EthProvider::from_address_book(&book)?;
    info!(chain = %book.chain_name, chain_id = book.chain_id, rpc = %book.rpc_url, "using deployment");

    match cli.command {
        Commands::Balances { account } => {
            let backend = Arc::new(provider.read_backend(&book));
            let market = Market::resolve(backend.as_ref(), &book).await;
            let account = read_account(account.as_deref(), book.chain_id)?;
            show_balances(backend, &market, account, cli.json).await
        }
        Commands::Watch { account } => {
            let backend = Arc::new(provider.read_backend(&book));
            let market = Market::resolve(backend.as_ref(), &book).await;
            let account = read_account(account.as_deref(), book.chain_id)?;
            let mut reader = BalanceReader::new(backend, market.pair.clone());
            let interval = market.settings.balance_refresh_interval();
            tokio::select! {
                _ = reader.watch(account, interval, |balances| {
                    println!("{}", balance_line(&market.pair, balances));
                    true
                }) => {}
                _ = tokio::signal::ctrl_c() => info!("stopped"),
            }
            Ok(())
        }
        Commands::Quote {
            sell,
            amount,
            slippage: percent,
        } => {
            let backend = Arc::new(provider.read_backend(&book));
            let market = Market::resolve(backend.as_ref(), &book).await;
            let direction = direction(&market, &sell)?;
            let slippage = slippage(&market, percent)?;
            let engine = QuoteEngine::new(backend, market.clone());
            let quote = engine.quote(direction, &amount).await;
            if cli.json {
                return print_json(&json!({
                    "direction": direction,
                    "amount": amount,
                    "quote": quote,
                    "display": quote.to_string(),
                    "min_received": quote
                        .min_received(slippage)
                        .map(|raw| market.pair.buy_token(direction).format(raw)),
                    "slippage_percent": slippage.percent(),
                }));
            }
            print_quote(&market, direction, &amount, &quote, slippage);
            Ok(())
        }
        Commands::Swap {
            sell,
            amount,
            min_out,
            slippage: percent,
            no_gas_estimate,
        } => {
            let backend = Arc::new(signer_backend(&provider, &book).await?);
            let market = Market::resolve(backend.as_ref(), &book).await;
            let direction = direction(&market, &sell)?;
            let slippage = slippage(&market, percent)?;
            let min_output = match min_out {
                Some(value) if value != MinOutput::FROM_SLIPPAGE_LABEL => MinOutput::Exact(value),
                _ => MinOutput::FromSlippage,
            };
            let executor = SwapExecutor::new(backend.clone(), market.clone())
                .with_gas_estimation(!no_gas_estimate && market.settings.estimate_gas);
            let observer = SpinnerObserver::new()?;
            let outcome = executor
                .swap(direction, &amount, &min_output, slippage, &observer)
                .await?;
            println!(
                "Swapped {} {} (minimum {} {}) in {:?}",
                market.pair.sell_token(direction).format(outcome.amount_in),
                market.pair.symbol(direction.sell_side()),
                market.pair.buy_token(direction).format(outcome.amount_out_min),
                market.pair.symbol(direction.buy_side()),
                outcome.receipt.hash
            );
            refresh_after_tx(backend, &market).await
        }
        Commands::Approve { no_gas_estimate } => {
            let backend = Arc::new(signer_backend(&provider, &book).await?);
            let market = Market::resolve(backend.as_ref(), &book).await;
            let executor = SwapExecutor::new(backend, market.clone())
                .with_gas_estimation(!no_gas_estimate && market.settings.estimate_gas);
            let receipt = executor.approve_max(&SpinnerObserver::new()?).await?;
            println!("Approved {} in {:?}", market.pair.token.symbol, receipt.hash);
            Ok(())
        }
        Commands::LiquidityAmount { side, amount } => {
            let backend = Arc::new(provider.read_backend(&book));
            let market = Market::resolve(backend.as_ref(), &book).await;
            let side = market
                .pair
                .side(&side)
                .ok_or_else(|| eyre!("unknown token `{}`", side))?;
            let amounts = LiquidityPlanner::new(backend, market.clone())
                .counterpart(side, &amount)
                .await?;
            println!(
                "{} {} + {} {}",
                amounts.native_formatted, market.pair.native_symbol, amounts.token_formatted, market.pair.token.symbol
            );
            Ok(())
        }
        Commands::AddLiquidity {
            token_amount,
            native_amount,
            no_gas_estimate,
        } => {
            let backend = Arc::new(signer_backend(&provider, &book).await?);
            let market = Market::resolve(backend.as_ref(), &book).await;
            let planner = LiquidityPlanner::new(backend.clone(), market.clone());
            let (token_amount, native_amount) = match (token_amount, native_amount) {
                (Some(token), Some(native)) => (token, native),
                (Some(token), None) => {
                    let amounts = planner.counterpart(Side::Token, &token).await?;
                    (token, amounts.native_formatted)
                }
                (None, Some(native)) => {
                    let amounts = planner.counterpart(Side::Native, &native).await?;
                    (amounts.token_formatted, native)
                }
                (None, None) => bail!("pass --token-amount, --native-amount or both"),
            };
            let executor = SwapExecutor::new(backend.clone(), market.clone())
                .with_gas_estimation(!no_gas_estimate && market.settings.estimate_gas);
            let outcome = executor
                .add_liquidity(&token_amount, &native_amount, &SpinnerObserver::new()?)
                .await?;
            println!(
                "Added {} {} and {} {} in {:?}",
                native_amount, market.pair.native_symbol, token_amount, market.pair.token.symbol, outcome.receipt.hash
            );
            refresh_after_tx(backend, &market).await
        }
        Commands::Wrap { amount } => {
            let backend = Arc::new(signer_backend(&provider, &book).await?);
            let market = Market::resolve(backend.as_ref(), &book).await;
            let executor = SwapExecutor::new(backend.clone(), market.clone());
            let receipt = executor.wrap(&amount, &SpinnerObserver::new()?).await?;
            println!("Wrapped {} {} in {:?}", amount, market.pair.native_symbol, receipt.hash);
            refresh_after_tx(backend, &market).await
        }
        Commands::Unwrap { amount } => {
            let backend = Arc::new(signer_backend(&provider, &book).await?);
            let market = Market::resolve(backend.as_ref(), &book).await;
            let executor = SwapExecutor::new(backend.clone(), market.clone());
            let receipt = executor.unwrap(&amount, &SpinnerObserver::new()?).await?;
            println!("Unwrapped {} {} in {:?}", amount, market.pair.wrapped.symbol, receipt.hash);
            refresh_after_tx(backend, &market).await
        }
        Commands::Pool => {
            let backend = provider.read_backend(&book);
            let market = Market::resolve(&backend, &book).await;
            show_pool(&backend, &market, cli.json).await
        }
        Commands::Inspect => {
            let backend = provider.read_backend(&book);
            let market = Market::resolve(&backend, &book).await;
            inspect(&backend, &book, &market).await
        }
        Commands::Interactive => match EthProvider::private_key() {
            Some(key) => {
                let backend = Arc::new(provider.signer_backend(&book, &key).await?);
                let market = Market::resolve(backend.as_ref(), &book).await;
                interactive(backend, market).await
            }
            None => {
                let backend = Arc::new(provider.read_backend(&book));
                let market = Market::resolve(backend.as_ref(), &book).await;
                interactive(backend, market).await
            }
        },
    }
}

async fn signer_backend(
    provider: &EthProvider,
    book: &AddressBook,
) -> eyre::Result<EthersBackend<SignerClient>> {
    let key = EthProvider::private_key().ok_or_else(|| eyre!("PRIVATE_KEY is not set"))?;
    provider.signer_backend(book, &key).await
}

async fn refresh_after_tx<B: DexBackend + ?Sized>(backend: Arc<B>, market: &Market) -> eyre::Result<()> {
    let account = backend
        .account()
        .ok_or_else(|| eyre!("no wallet connected"))?;
    show_balances(backend, market, account, false)
        .await
        .wrap_err("Could not refresh balances")
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forma_swap=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        let err = match err.downcast::<DexError>() {
            Ok(err) => err,
            Err(report) => DexError::from(report),
        };
        print_error(&err);
        std::process::exit(1);
    }
}
