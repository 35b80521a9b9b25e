//! chainbatch CLI: read values from a JSON-RPC endpoint through the batcher.
//!
//! Usage:
//! ```bash
//! # Read two balances in one batched round trip
//! chainbatch read --url https://cloudflare-eth.com \
//!     --call '0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045:eth_getBalance:["latest"]' \
//!     --call '0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045:eth_getTransactionCount:["latest"]'
//!
//! # Print the dedup key of a call
//! chainbatch key --call '0xABC:eth_getBalance:["latest"]'
//! ```

mod args;
mod config;
mod logging;

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::bail;
use serde_json::json;

use chainbatch_core::{CallSpec, JsonRpcMulticall, NetworkRouter, ReadOutcome};
use chainbatch_engine::RequestQueue;
use chainbatch_http::HttpRpcClient;

use crate::args::{has_flag, parse_call, parse_flag, parse_flags, parse_network};
use crate::config::CliConfig;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "read" => cmd_read(&args[2..]).await,
        "key" => cmd_key(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("chainbatch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainbatch {}", env!("CARGO_PKG_VERSION"));
    println!("Coalesce JSON-RPC reads into batched round trips\n");
    println!("USAGE:");
    println!("    chainbatch <COMMAND>\n");
    println!("COMMANDS:");
    println!("    read       Read one or more calls through a batch queue");
    println!("    key        Print the dedup key of a call");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("READ FLAGS:");
    println!("    --url <URL>                     RPC endpoint URL  [required]");
    println!("    --call <DEST:OP[:JSON_ARGS]>    Call to read, repeatable  [required]");
    println!("    --network <ID>                  Network id of the calls (default 1)");
    println!("    --config <FILE>                 JSON config with batch/log/http sections");
    println!("    --json                          Print results as JSON");
}

fn collect_calls(args: &[String]) -> anyhow::Result<Vec<CallSpec>> {
    let network = parse_network(args)?;
    let calls = parse_flags(args, "--call")
        .iter()
        .map(|raw| parse_call(raw, network))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if calls.is_empty() {
        bail!("at least one --call is required");
    }
    Ok(calls)
}

async fn cmd_read(args: &[String]) -> anyhow::Result<()> {
    let Some(url) = parse_flag(args, "--url") else {
        bail!("--url is required");
    };
    let config = CliConfig::load_or_default(parse_flag(args, "--config").as_deref())?;
    logging::init_tracing(&config.log);

    let calls = collect_calls(args)?;
    let network = parse_network(args)?;

    let rpc = Arc::new(HttpRpcClient::new(&url, config.http.clone())?);
    let router = NetworkRouter::new().route(network, Arc::new(JsonRpcMulticall::new(rpc)));
    let handle = RequestQueue::spawn(Arc::new(router), config.batch.clone());
    tracing::info!(%url, network, calls = calls.len(), "reading");

    let reads = calls.iter().cloned().map(|call| handle.read_one(call));
    let results = futures::future::join_all(reads).await;
    let stats = handle.stats();

    if has_flag(args, "--json") {
        let mut rows = Vec::with_capacity(calls.len());
        for (call, result) in calls.iter().zip(results) {
            rows.push(json!({
                "call": call,
                "key": call.key(),
                "outcome": result?,
            }));
        }
        let out = json!({ "results": rows, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (call, result) in calls.iter().zip(results) {
        let shown = match result? {
            ReadOutcome::Value(v) => v.to_string(),
            ReadOutcome::Empty => "<empty>".to_string(),
            ReadOutcome::Failed(reason) => format!("<failed: {reason}>"),
        };
        println!("{call}  =>  {shown}");
    }
    println!();
    println!("  Requests:        {}", stats.requests);
    println!("  Upstream calls:  {}", stats.upstream_calls);
    println!("  Flushes:         {}", stats.flushes);
    println!("  Coalescing:      {:.2}", stats.coalescing_ratio());
    Ok(())
}

fn cmd_key(args: &[String]) -> anyhow::Result<()> {
    for call in collect_calls(args)? {
        println!("{}", call.key());
    }
    Ok(())
}
