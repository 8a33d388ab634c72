//! Thin query driver: compiles the joined command-line arguments as a
//! query expression and prints matching messages, one per line, straight
//! to stdout rather than through a TUI.

use std::env;

use anyhow::Context;
use itertools::Itertools;

use maildex::config::{self, MuConfig};
use maildex::{query, Store, StoreOpenMode};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    config::load_config();
    let cfg = config::CONFIG.get().unwrap().read().clone();

    let args: Vec<String> = env::args().skip(1).collect();
    let explain_only = args.first().map(String::as_str) == Some("--xquery");
    let query_args = if explain_only { &args[1..] } else { &args[..] };
    let expression = query_args.iter().join(" ");

    if explain_only {
        println!("{}", query::explain(&expression)?);
        return Ok(());
    }

    let store_dir = resolve_store_dir(&cfg)?;
    let store = Store::open(&store_dir.join("index.sqlite"), StoreOpenMode::ReadOnly)
        .context("failed to open store")?;

    let results = query::run(&store, &expression, Some("date"), false, None)?;
    for hit in results {
        println!(
            "{}\t{}\t{}\t{}",
            hit.date,
            hit.flags,
            hit.maildir,
            hit.subject,
        );
    }
    Ok(())
}

fn resolve_store_dir(cfg: &MuConfig) -> anyhow::Result<std::path::PathBuf> {
    cfg.resolve_store_dir()
        .context("no store directory: set $MUHOME or store_dir in config.toml")
}
