//! The Indexer (component E): composes Walker, Parser, and Store into a
//! coordinated, cancellable run. Pipeline shape follows spec.md §5 — one
//! walker thread, a pool of parser threads, and a single committer thread
//! talking to the Store's single writer, connected by bounded channels
//! (`std::sync::mpsc::sync_channel`).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex as StdMutex};
use std::thread;

use log::{info, warn};

use crate::error::IndexerError;
use crate::parser;
use crate::store::Store;
use crate::walker::{self, Candidate, WalkPolicy};

/// How an in-flight batch is handled when `stop()` interrupts a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPolicy {
    Commit,
    Discard,
}

impl Default for CancelPolicy {
    fn default() -> Self {
        CancelPolicy::Commit
    }
}

/// Indexer configuration, enumerated per spec.md §4.E.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub scan: bool,
    pub cleanup: bool,
    /// Parser thread count; 0 means auto (`std::thread::available_parallelism`).
    pub max_threads: usize,
    pub ignore_noupdate: bool,
    pub lazy_check: bool,
    pub force: bool,
    pub personal_addresses: Vec<String>,
    pub cancel_policy: CancelPolicy,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            scan: true,
            cleanup: true,
            max_threads: 0,
            ignore_noupdate: false,
            lazy_check: false,
            force: false,
            personal_addresses: Vec::new(),
            cancel_policy: CancelPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Stopping,
    Done,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    updated: AtomicU64,
    removed: AtomicU64,
}

/// A snapshot of the Indexer's progress, readable in any state.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub running: bool,
    pub processed: u64,
    pub updated: u64,
    pub removed: u64,
}

/// Orchestrates a single Maildir root against one Store. Not `Clone`able;
/// a run borrows the Store for its duration.
pub struct Indexer {
    root: PathBuf,
    state: Arc<std::sync::Mutex<State>>,
    stopping: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl Indexer {
    pub fn new(root: PathBuf) -> Indexer {
        Indexer {
            root,
            state: Arc::new(std::sync::Mutex::new(State::Idle)),
            stopping: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn state(&self) -> State {
        *self.state.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), State::Running | State::Stopping)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            running: self.is_running(),
            processed: self.counters.processed.load(Ordering::Relaxed),
            updated: self.counters.updated.load(Ordering::Relaxed),
            removed: self.counters.removed.load(Ordering::Relaxed),
        }
    }

    /// Non-blocking cancellation request: transitions to Stopping and
    /// returns immediately. Callers poll `is_running()`/`progress()` to
    /// observe completion.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == State::Running {
            *state = State::Stopping;
            self.stopping.store(true, Ordering::SeqCst);
        }
    }

    /// Run scan and/or cleanup to completion against `store`, blocking the
    /// calling thread. Returns "already running" if a run is underway.
    pub fn start(&self, store: &Store, config: &IndexerConfig) -> Result<(), IndexerError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == State::Running || *state == State::Stopping {
                return Err(IndexerError::AlreadyRunning);
            }
            *state = State::Running;
        }
        self.stopping.store(false, Ordering::SeqCst);
        self.counters.processed.store(0, Ordering::SeqCst);
        self.counters.updated.store(0, Ordering::SeqCst);
        self.counters.removed.store(0, Ordering::SeqCst);

        let result = self.run_inner(store, config);

        {
            let mut state = self.state.lock().unwrap();
            *state = State::Done;
        }
        result
    }

    fn run_inner(&self, store: &Store, config: &IndexerConfig) -> Result<(), IndexerError> {
        if !config.personal_addresses.is_empty() {
            store
                .set_personal_addresses(&config.personal_addresses)
                .map_err(IndexerError::Store)?;
        }
        if config.scan {
            self.scan(store, config)?;
        }
        if self.stopping.load(Ordering::SeqCst) {
            match config.cancel_policy {
                CancelPolicy::Commit => store.flush().map_err(IndexerError::Store)?,
                CancelPolicy::Discard => store.discard().map_err(IndexerError::Store)?,
            }
            return Err(IndexerError::Canceled);
        }
        if config.cleanup {
            self.cleanup(store)?;
        }
        store.flush().map_err(IndexerError::Store)?;
        Ok(())
    }

    fn scan(&self, store: &Store, config: &IndexerConfig) -> Result<(), IndexerError> {
        let policy = WalkPolicy {
            honor_noupdate: !config.ignore_noupdate,
            lazy_check: config.lazy_check,
            ..WalkPolicy::default()
        };
        let threads = if config.max_threads == 0 {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        } else {
            config.max_threads
        };

        let (candidate_tx, candidate_rx) = sync_channel::<Candidate>(256);
        let (record_tx, record_rx) = sync_channel::<ParseOutcome>(256);
        let candidate_rx = StdMutex::new(candidate_rx);

        let root = &self.root;
        let stopping = &self.stopping;
        let counters = &self.counters;

        thread::scope(|scope| {
            scope.spawn(|| {
                for candidate in walker::walk(root, &policy, &walker::NoOracle) {
                    if stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    if candidate_tx.send(candidate).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..threads {
                let record_tx = record_tx.clone();
                let force = config.force;
                scope.spawn(|| loop {
                    if stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    let candidate = {
                        let rx = candidate_rx.lock().unwrap();
                        rx.recv()
                    };
                    let candidate = match candidate {
                        Ok(c) => c,
                        Err(_) => break,
                    };
                    let outcome = parse_one(store, &candidate, force);
                    counters.processed.fetch_add(1, Ordering::Relaxed);
                    if record_tx.send(outcome).is_err() {
                        break;
                    }
                });
            }
            drop(record_tx);

            for outcome in record_rx.iter() {
                match outcome {
                    ParseOutcome::UpToDate => {}
                    ParseOutcome::Parsed(record) => {
                        if let Err(e) = store.add_or_update(&record) {
                            warn!("store write failed for {:?}: {}", record.path, e);
                            continue;
                        }
                        counters.updated.fetch_add(1, Ordering::Relaxed);
                    }
                    ParseOutcome::Error(path, e) => {
                        warn!("parse failed for {:?}: {}", path, e);
                    }
                }
            }
        });

        info!(
            "scan complete: processed={} updated={}",
            self.counters.processed.load(Ordering::Relaxed),
            self.counters.updated.load(Ordering::Relaxed)
        );
        Ok(())
    }

    fn cleanup(&self, store: &Store) -> Result<(), IndexerError> {
        let mut stale = Vec::new();
        store
            .for_each_path(|path| {
                if !path.exists() {
                    stale.push(path);
                }
            })
            .map_err(IndexerError::Store)?;
        for path in stale {
            match store.remove(&path) {
                Ok(()) => {
                    self.counters.removed.fetch_add(1, Ordering::Relaxed);
                }
                Err(crate::error::StoreError::NotFound(_)) => {
                    // Raced with another remover between the listing pass above
                    // and this call; nothing left to do.
                }
                Err(e) => warn!("cleanup failed to remove {:?}: {}", path, e),
            }
        }
        Ok(())
    }
}

enum ParseOutcome {
    UpToDate,
    Parsed(crate::model::MessageRecord),
    Error(PathBuf, crate::error::ParseError),
}

fn parse_one(store: &Store, candidate: &Candidate, force: bool) -> ParseOutcome {
    if !force {
        match store.mtime(&candidate.path) {
            Ok(Some(known)) if known >= candidate.mtime => return ParseOutcome::UpToDate,
            Ok(_) => {}
            Err(e) => warn!("mtime lookup failed for {:?}: {}", candidate.path, e),
        }
    }
    match parser::parse(&candidate.path, &candidate.relative_maildir, candidate.in_new) {
        Ok(record) => ParseOutcome::Parsed(record),
        Err(e) => ParseOutcome::Error(candidate.path.clone(), e),
    }
}
