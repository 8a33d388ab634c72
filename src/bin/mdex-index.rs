//! Thin driver binary: runs a full scan+cleanup against `$MAILDIR`,
//! persisting into the store at `$MUHOME` (falling back to the platform
//! data directory), driven off plain env vars rather than a
//! CLI-argument-parsing crate.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use log::info;

use maildex::config::{self, MuConfig};
use maildex::{Indexer, IndexerConfig, Store, StoreOpenMode};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    config::load_config();

    let cfg = config::CONFIG.get().unwrap().read().clone();
    let maildir_root = resolve_maildir_root(&cfg)?;
    let store_dir = resolve_store_dir(&cfg)?;

    let force = env::args().any(|a| a == "--force");
    let ignore_noupdate = env::args().any(|a| a == "--ignore-noupdate");

    info!("indexing {:?} into {:?}", maildir_root, store_dir);
    let store = Store::open(&store_dir.join("index.sqlite"), StoreOpenMode::ReadWrite)
        .context("failed to open store")?
        .with_batch_size(cfg.batch_size);

    let indexer = Indexer::new(maildir_root);
    let run_config = IndexerConfig {
        force,
        ignore_noupdate,
        personal_addresses: cfg.personal_addresses,
        ..IndexerConfig::default()
    };
    indexer.start(&store, &run_config).context("index run failed")?;

    let progress = indexer.progress();
    println!(
        "processed {} messages, {} updated, {} removed",
        progress.processed, progress.updated, progress.removed
    );
    Ok(())
}

fn resolve_maildir_root(cfg: &MuConfig) -> anyhow::Result<PathBuf> {
    cfg.resolve_maildir_root()
        .context("no Maildir root: set $MAILDIR or maildir_root in config.toml")
}

fn resolve_store_dir(cfg: &MuConfig) -> anyhow::Result<PathBuf> {
    let dir = cfg
        .resolve_store_dir()
        .context("no store directory: set $MUHOME or store_dir in config.toml")?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
