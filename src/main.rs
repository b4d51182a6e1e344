//! Node shell around the chain core.
//!
//! # Usage
//! ```text
//! emberchain --datadir <path> --chainid <u64> --genesis <json file>
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 fatal initialization error, 2 storage
//! corruption detected.

use emberchain::core::chain::ChainService;
use emberchain::core::consensus::SoloValidator;
use emberchain::core::errors::ChainError;
use emberchain::core::executor::StubVm;
use emberchain::core::genesis::GenesisConfig;
use emberchain::storage::kv::StoreError;
use emberchain::storage::rocks::RocksKv;
use emberchain::{error, info};
use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

struct Args {
    datadir: PathBuf,
    chain_id: u64,
    genesis: PathBuf,
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} --datadir <path> --chainid <u64> --genesis <json file>", program);
}

fn parse_args(args: &[String]) -> Option<Args> {
    let mut datadir = None;
    let mut chain_id = None;
    let mut genesis = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--datadir" => {
                i += 1;
                datadir = Some(PathBuf::from(args.get(i)?));
            }
            "--chainid" => {
                i += 1;
                chain_id = Some(args.get(i)?.parse().ok()?);
            }
            "--genesis" => {
                i += 1;
                genesis = Some(PathBuf::from(args.get(i)?));
            }
            _ => return None,
        }
        i += 1;
    }

    Some(Args {
        datadir: datadir?,
        chain_id: chain_id?,
        genesis: genesis?,
    })
}

#[tokio::main]
async fn main() {
    let argv: Vec<String> = env::args().collect();
    if argv.len() > 1 && (argv[1] == "--help" || argv[1] == "-h") {
        print_usage(&argv[0]);
        process::exit(0);
    }
    let Some(args) = parse_args(&argv) else {
        print_usage(&argv[0]);
        process::exit(1);
    };

    let genesis_json = match std::fs::read_to_string(&args.genesis) {
        Ok(json) => json,
        Err(err) => {
            error!("cannot read genesis file {}: {}", args.genesis.display(), err);
            process::exit(1);
        }
    };
    let genesis = match GenesisConfig::from_json(&genesis_json) {
        Ok(config) => config,
        Err(err) => {
            error!("invalid genesis file: {}", err);
            process::exit(1);
        }
    };

    let db = match RocksKv::open(&args.datadir) {
        Ok(db) => Arc::new(db),
        Err(err) => {
            error!("cannot open datadir {}: {}", args.datadir.display(), err);
            process::exit(1);
        }
    };

    let chain = match ChainService::new(args.chain_id, &genesis, db, SoloValidator::new(), StubVm) {
        Ok(chain) => chain,
        Err(ChainError::Store(StoreError::Corruption(reason))) => {
            error!("storage corruption detected: {}", reason);
            process::exit(2);
        }
        Err(err) => {
            error!("chain initialization failed: {}", err);
            process::exit(1);
        }
    };

    let best = chain.best_state();
    info!(
        "chain {} ready at height {} tip {} state root {}",
        args.chain_id, best.height, best.hash, best.state_root
    );

    if tokio::signal::ctrl_c().await.is_err() {
        error!("cannot listen for shutdown signal");
    }
    chain.stop();
}
