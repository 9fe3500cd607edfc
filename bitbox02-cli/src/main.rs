use anyhow::Context;
use bitbox02_api::types::EthCoin;
use bitbox02_api::{BridgeConfig, DevicePath, Keypath, HARDENED};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{BufWriter, Write};
use tracing::{debug, info};

#[derive(Parser)]
#[clap(name = "bitbox02", version, about = "BitBox02 discovery and keypath helper")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(short, long, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Locate a BitBox02 through the bridge or over USB
    Devices(DevicesArgs),
    /// Parse a keypath and show its levels
    Keypath(KeypathArgs),
    /// Look up the device coin for an Ethereum chain id
    Chain(ChainArgs),
}

#[derive(clap::Args, Debug)]
struct DevicesArgs {
    /// BitBoxBridge base URL
    #[clap(long, env = "BITBOX_BRIDGE_URL", default_value = bitbox02_api::types::BRIDGE_DISCOVERY_URL)]
    bridge_url: String,
    /// Skip the direct USB lookup and always ask the bridge
    #[clap(long)]
    force_bridge: bool,
    /// Discovery attempts before giving up
    #[clap(long, default_value_t = 10)]
    attempts: u32,
    #[clap(short, long)]
    output: Option<String>,
}

#[derive(clap::Args, Debug)]
struct KeypathArgs {
    /// Keypath such as m/44'/60'/0'/0
    path: String,
    #[clap(short, long)]
    output: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ChainArgs {
    chain_id: i64,
    #[clap(short, long)]
    output: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
struct DeviceInfo {
    transport: &'static str,
    path: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
struct Level {
    index: u32,
    hardened: bool,
}

#[derive(Serialize, Debug, PartialEq)]
struct KeypathInfo {
    keypath: String,
    levels: Vec<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    eth_coin: Option<EthCoin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chain_id: Option<u64>,
}

#[derive(Serialize, Debug, PartialEq)]
struct ChainInfo {
    chain_id: i64,
    coin: EthCoin,
}

/// `RUST_LOG` wins when it parses; otherwise fall back to the verbosity flag.
fn env_filter(rust_log: Option<&str>, verbose: bool) -> tracing_subscriber::EnvFilter {
    let default_level = if verbose { "debug" } else { "warn" };
    rust_log
        .and_then(|directives| tracing_subscriber::EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new(default_level))
}

fn init_logging(verbose: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(rust_log.as_deref(), verbose))
        .with_writer(std::io::stderr)
        .init();
}

fn output_writer(output: Option<String>) -> anyhow::Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = match output {
        Some(output) => Box::new(BufWriter::new(
            std::fs::File::create(&output).with_context(|| format!("Failed to create {output}"))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    Ok(writer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Devices(args) => devices(args).await?,
        Commands::Keypath(args) => keypath(args)?,
        Commands::Chain(args) => chain(args)?,
    }
    Ok(())
}

async fn devices(args: DevicesArgs) -> anyhow::Result<()> {
    let mut writer = output_writer(args.output)?;
    let config = BridgeConfig {
        attempts: args.attempts,
        ..BridgeConfig::with_discovery_url(args.bridge_url)
    };
    debug!("Looking for a BitBox02 via {}", config.discovery_url);

    let path = bitbox02_api::get_device_path(args.force_bridge, &config)
        .await
        .context("Failed to locate a BitBox02")?;
    info!("Found BitBox02: {path:?}");

    serde_json::to_writer_pretty(&mut writer, &device_info(&path))?;
    writeln!(writer)?;
    Ok(())
}

fn device_info(path: &DevicePath) -> DeviceInfo {
    match path {
        DevicePath::Bridge(path) => DeviceInfo {
            transport: "bridge",
            path: Some(path.clone()),
        },
        DevicePath::Hid => DeviceInfo {
            transport: "hid",
            path: None,
        },
    }
}

fn keypath(args: KeypathArgs) -> anyhow::Result<()> {
    let mut writer = output_writer(args.output)?;
    let info = keypath_info(&args.path)?;
    serde_json::to_writer_pretty(&mut writer, &info)?;
    writeln!(writer)?;
    Ok(())
}

fn keypath_info(path: &str) -> anyhow::Result<KeypathInfo> {
    let keypath: Keypath = path.parse()?;
    let levels = keypath.levels();
    // Only m/44'/60'/.. and m/44'/1'/.. carry an Ethereum coin
    let eth_coin = bitbox02_api::coin_from_keypath(levels).ok();
    let chain_id = bitbox02_api::chain_id_from_keypath(levels).ok();

    Ok(KeypathInfo {
        keypath: keypath.to_string(),
        levels: levels
            .iter()
            .map(|&level| Level {
                index: level & !HARDENED,
                hardened: level & HARDENED != 0,
            })
            .collect(),
        eth_coin,
        chain_id,
    })
}

fn chain(args: ChainArgs) -> anyhow::Result<()> {
    let mut writer = output_writer(args.output)?;
    let info = ChainInfo {
        chain_id: args.chain_id,
        coin: bitbox02_api::coin_from_chain_id(args.chain_id)?,
    };
    serde_json::to_writer_pretty(&mut writer, &info)?;
    writeln!(writer)?;
    Ok(())
}
