//! Flag parsing for the CLI.

use anyhow::{anyhow, bail, Context};
use serde_json::Value;

use chainbatch_core::{CallSpec, Network};

pub fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

/// Every value given for a repeatable flag, in order.
pub fn parse_flags(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .collect()
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

pub fn parse_network(args: &[String]) -> anyhow::Result<Network> {
    match parse_flag(args, "--network") {
        Some(n) => n
            .parse()
            .with_context(|| format!("--network must be a number, got {n:?}")),
        None => Ok(1),
    }
}

/// Parse `DEST:OP[:JSON_ARGS]`. `JSON_ARGS` is a JSON array of arguments; a
/// single non-array value is taken as the only argument.
pub fn parse_call(raw: &str, network: Network) -> anyhow::Result<CallSpec> {
    let mut parts = raw.splitn(3, ':');
    let destination = parts.next().unwrap_or_default();
    let operation = parts
        .next()
        .filter(|op| !op.is_empty())
        .ok_or_else(|| anyhow!("call {raw:?} must look like DEST:OP[:JSON_ARGS]"))?;

    let arguments = match parts.next() {
        None | Some("") => vec![],
        Some(json) => {
            match serde_json::from_str(json)
                .with_context(|| format!("arguments of {raw:?} are not valid JSON"))?
            {
                Value::Array(items) => items,
                other => vec![other],
            }
        }
    };

    if destination.trim().is_empty() {
        bail!("call {raw:?} has no destination");
    }
    Ok(CallSpec::new(destination, operation, arguments, network))
}
