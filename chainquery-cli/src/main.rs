//! Thin demonstration front-end over `chainquery-core`'s query engine
//! (spec.md §6 "External interfaces"): one subcommand per `RandomAccess`
//! operation, plus the two iterator variants, each printing JSON to stdout
//! the way `bootstrap/utxo-dump`'s binary prints one CSV line per UTXO.

use anyhow::{Context, Result};
use chainquery_core::{ChainQuery, Options, RandomAccess};
use chainquery_types::{BlockHash, TxId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "chainquery")]
#[command(about = "Read-only query engine over a Bitcoin Core data directory")]
struct Args {
    /// Path to the node's data directory (the parent of blocks/ and indexes/)
    #[arg(short = 'd', long = "datadir", value_hint = clap::ValueHint::DirPath)]
    datadir: PathBuf,

    /// Skip opening indexes/txindex/; txid lookups and --connected queries
    /// will fail instead of quietly falling back
    #[arg(long)]
    no_tx_index: bool,

    /// Width of the connected iterator's pre-decode worker pool
    #[arg(long)]
    worker_lanes: Option<usize>,

    /// Suppress informational logging
    #[arg(short = 'q', long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the active chain's tip height
    MaxHeight,
    /// Resolve a height to its block hash
    HashFromHeight { height: u32 },
    /// Resolve a block hash to its height
    HeightFromHash { hash: String },
    /// Print a block header
    Header { height: u32 },
    /// Print a block
    Block {
        height: u32,
        /// Simple (decoded addresses) instead of full (raw hex) rendering
        #[arg(long)]
        simple: bool,
        /// Rewrite inputs to the output they spend
        #[arg(long)]
        connected: bool,
    },
    /// Print a transaction by txid
    Tx {
        txid: String,
        #[arg(long)]
        simple: bool,
        #[arg(long)]
        connected: bool,
    },
    /// Resolve a txid to the height of its containing block (requires the tx index)
    HeightFromTxid { txid: String },
    /// Decode a script_pubkey given as hex
    ParseScript { script_hex: String },
    /// Stream blocks [start, stop); `start` is forced to 0 when --connected
    /// is set, since the live UTXO map can only be replayed from genesis
    Range {
        #[arg(long, default_value_t = 0)]
        start: u32,
        stop: u32,
        #[arg(long)]
        simple: bool,
        #[arg(long)]
        connected: bool,
    },
    /// Fetch an arbitrary set of heights, independent of each other
    Heights {
        heights: Vec<u32>,
        #[arg(long)]
        simple: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut options = Options::new(&args.datadir).with_tx_index(!args.no_tx_index);
    if let Some(lanes) = args.worker_lanes {
        options = options.with_worker_lanes(lanes);
    }

    log::info!("opening data directory {}", args.datadir.display());
    let engine = ChainQuery::open(options)
        .with_context(|| format!("failed to open data directory {}", args.datadir.display()))?;
    log::info!("resolved network: {:?}", engine.network());

    match args.command {
        Command::MaxHeight => println!("{}", engine.get_max_height()?),
        Command::HashFromHeight { height } => {
            println!("{}", engine.get_hash_from_height(height)?);
        }
        Command::HeightFromHash { hash } => {
            let hash = BlockHash::from_str(&hash).context("not a valid block hash")?;
            println!("{}", engine.get_height_from_hash(&hash)?);
        }
        Command::Header { height } => {
            let header = engine.get_block_header(height)?;
            println!("{}", serde_json::to_string_pretty(&header)?);
        }
        Command::Block {
            height,
            simple,
            connected,
        } => {
            let view = engine.get_block(height, simple, connected)?;
            println!("{}", view.to_json()?);
        }
        Command::Tx {
            txid,
            simple,
            connected,
        } => {
            let txid = TxId::from_str(&txid).context("not a valid txid")?;
            let view = engine.get_transaction(&txid, simple, connected)?;
            println!("{}", view.to_json()?);
        }
        Command::HeightFromTxid { txid } => {
            let txid = TxId::from_str(&txid).context("not a valid txid")?;
            println!("{}", engine.get_height_from_txid(&txid)?);
        }
        Command::ParseScript { script_hex } => {
            let parsed = engine.parse_script(&script_hex)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Command::Range {
            start,
            stop,
            simple,
            connected,
        } => {
            for result in engine.iter_by_range(start, stop, simple, connected) {
                println!("{}", result?.to_json()?);
            }
        }
        Command::Heights { heights, simple } => {
            for result in engine.iter_by_heights(heights, simple) {
                println!("{}", result?.to_json()?);
            }
        }
    }

    Ok(())
}
