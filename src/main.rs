use chest_claim::{
    admin::encode_withdraw,
    app::{
        App,
        AppHandle,
        channel_transactions::{
            ChannelTransactions,
            TransactionFeed,
        },
        height_source::HeightSource,
        static_sources::{
            StaticHeight,
            StaticPrice,
        },
    },
    chain::ProviderHeights,
    config::{
        ConfigFile,
        GameConfig,
    },
    deadline::{
        self,
        ClaimWindow,
        Deadline,
        HeightTracker,
    },
    history::{
        HistoricalLog,
        winning_history,
    },
    lifecycle::LifecycleNotification,
    projection::clamp_quantity,
};
use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::{
    types::{
        Address,
        TransactionReceipt,
        U64,
    },
    utils::parse_ether,
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::OnceLock,
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON config file; `~` is expanded.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Overrides the contract address from the config file.
    #[arg(long, global = true)]
    contract: Option<Address>,

    /// Write logs to a daily rolling file in this directory instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the call that buys `quantity` chests (clamped to 1..=10).
    EncodePurchase {
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Print the call that claims the given unclaimed chests.
    EncodeClaim {
        #[arg(long, value_delimiter = ',', required = true)]
        chests: Vec<u64>,
    },
    /// Print an owner withdrawal call; omit `--amount` to withdraw everything.
    EncodeWithdraw {
        #[arg(long)]
        caller: Address,
        /// Amount in ether.
        #[arg(long)]
        amount: Option<String>,
    },
    /// Decode the logs of a JSON transaction receipt.
    Decode {
        #[arg(long)]
        receipt: PathBuf,
    },
    /// List prizes from a JSON array of `{ "log": .., "timestamp": .. }`, newest first.
    History {
        #[arg(long)]
        logs: PathBuf,
    },
    /// Drive a session through a scripted sequence of actions and receipts.
    Replay {
        #[arg(long)]
        script: PathBuf,
    },
    /// Report the claim deadline of a chest bought at `purchase_block`.
    Deadline {
        #[arg(long)]
        rpc_url: String,
        #[arg(long)]
        purchase_block: u64,
        /// Defaults to `max_claim_blocks` from the config file.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_blocks: Option<u64>,
        /// Defaults to `seconds_per_block` from the config file.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        seconds_per_block: Option<u64>,
    },
}

#[derive(Debug, Deserialize)]
struct ReplayScript {
    #[serde(default)]
    height: u64,
    #[serde(default)]
    usd_price: Option<f64>,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    Purchase { quantity: u32 },
    Claim,
    Reset,
    Wait { secs: u64 },
    Confirm { receipt: TransactionReceipt },
    Reject { cause: String },
}

#[derive(Serialize)]
struct DecodeReport<'a> {
    reverted: bool,
    events: Vec<&'a chest_claim::codec::DomainEvent>,
    failures: Vec<String>,
}

fn init_tracing(log_dir: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let appender = rolling::daily(dir, "chest-claim.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            let _ = fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init();
        }
        None => {
            let _ = fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("parsing {}", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn settle(
    handle: &AppHandle,
    feed: &TransactionFeed,
    notifications: Vec<LifecycleNotification>,
) -> anyhow::Result<()> {
    if !handle.view().borrow().in_flight {
        anyhow::bail!("no transaction in flight");
    }
    for notification in notifications {
        feed.notify(notification);
    }
    handle.view().wait_for(|view| !view.in_flight).await?;
    Ok(())
}

async fn replay(config: GameConfig, script: ReplayScript) -> Result<()> {
    let (transactions, mut feed) = ChannelTransactions::new();
    let (app, handle) = App::new(
        config,
        transactions,
        StaticHeight(script.height),
        StaticPrice(script.usd_price),
    );
    let driver = async {
        for step in script.steps {
            let label = format!("{step:?}");
            let outcome = match step {
                Step::Purchase { quantity } => handle.purchase(quantity).await,
                Step::Claim => handle.claim().await,
                Step::Reset => handle.reset().await,
                Step::Wait { secs } => {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    Ok(())
                }
                Step::Confirm { receipt } => {
                    let accepted = LifecycleNotification::Accepted {
                        tx_hash: receipt.transaction_hash,
                    };
                    let success = LifecycleNotification::Success(receipt);
                    settle(&handle, &feed, vec![accepted, success]).await
                }
                Step::Reject { cause } => {
                    settle(&handle, &feed, vec![LifecycleNotification::Error(cause)]).await
                }
            };
            if let Err(err) = outcome {
                tracing::warn!(step = %label, "replay step failed: {err:#}");
            }
            while let Ok(calls) = feed.submitted.try_recv() {
                tracing::info!(calls = %serde_json::to_string(&calls).unwrap_or_default(), "submitted");
            }
        }
        let view = handle.view().borrow().clone();
        handle.shutdown();
        view
    };
    let (state, view) = tokio::join!(app.run(), driver);
    state.map_err(|e| eyre!("session runtime failed: {e:#}"))?;
    print_json(&view)
}

/// Claim window from the config file, when there is one, with command line overrides.
fn claim_window(
    config: Option<&str>,
    max_blocks: Option<u64>,
    seconds_per_block: Option<u64>,
) -> Result<ClaimWindow> {
    let file = match config {
        Some(path) => ConfigFile::read(path)?,
        None => ConfigFile::default(),
    };
    let mut window = file.claim_window()?;
    if let Some(max_blocks) = max_blocks {
        window.max_blocks = max_blocks;
    }
    if let Some(seconds_per_block) = seconds_per_block {
        window.seconds_per_block = seconds_per_block;
    }
    Ok(window)
}

async fn report_deadline(rpc_url: &str, purchase_block: u64, window: ClaimWindow) -> Result<()> {
    let mut heights = ProviderHeights::connect(rpc_url).map_err(|e| eyre!("{e:#}"))?;
    let mut tracker = HeightTracker::new();
    let sample = heights
        .current_height()
        .await
        .map_err(|e| format!("{e:#}"));
    let height = tracker.observe(sample)?;
    let report = match deadline::remaining_since(purchase_block, height, window.max_blocks) {
        Deadline::Active { blocks_left } => serde_json::json!({
            "current_height": height,
            "blocks_left": blocks_left,
            "estimated_seconds":
                deadline::estimated_seconds(blocks_left, window.seconds_per_block).as_secs(),
            "urgency": deadline::urgency(blocks_left),
        }),
        Deadline::Expired => serde_json::json!({
            "current_height": height,
            "expired": true,
        }),
    };
    print_json(&report)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(args.log_dir.as_deref());
    let load_config = || GameConfig::load(args.config.as_deref(), args.contract);

    match args.command {
        Cmd::EncodePurchase { quantity } => {
            let codec = load_config()?.codec();
            let quantity = clamp_quantity(quantity);
            print_json(&codec.encode_purchase(quantity)?)
        }
        Cmd::EncodeClaim { ref chests } => {
            let codec = load_config()?.codec();
            print_json(&codec.encode_claim_indices(chests))
        }
        Cmd::EncodeWithdraw { caller, ref amount } => {
            let config = load_config()?;
            let amount = amount
                .as_deref()
                .map(parse_ether)
                .transpose()
                .wrap_err("parsing --amount")?;
            let call = match config.owner() {
                Some(owner) => encode_withdraw(&config.codec(), &owner, caller, amount)?,
                None => {
                    tracing::warn!("no owner configured; every caller is unauthorized");
                    encode_withdraw(&config.codec(), &|_: Address| false, caller, amount)?
                }
            };
            print_json(&call)
        }
        Cmd::Decode { ref receipt } => {
            let codec = load_config()?.codec();
            let receipt: TransactionReceipt = read_json(receipt)?;
            let decoded = codec.decode_logs(&receipt.logs);
            print_json(&DecodeReport {
                reverted: receipt.status == Some(U64::zero()),
                events: decoded.events.iter().map(|(_, event)| event).collect(),
                failures: decoded
                    .failures
                    .iter()
                    .map(|(position, failure)| format!("log {position}: {failure}"))
                    .collect(),
            })
        }
        Cmd::History { ref logs } => {
            let codec = load_config()?.codec();
            let logs: Vec<HistoricalLog> = read_json(logs)?;
            print_json(&winning_history(&codec, &logs))
        }
        Cmd::Replay { ref script } => {
            let config = load_config()?;
            let script: ReplayScript = read_json(script)?;
            replay(config, script).await
        }
        Cmd::Deadline {
            ref rpc_url,
            purchase_block,
            max_blocks,
            seconds_per_block,
        } => {
            let window = claim_window(args.config.as_deref(), max_blocks, seconds_per_block)?;
            report_deadline(rpc_url, purchase_block, window).await
        }
    }
}
