//! The Maildir Walker (component B): produces a stream of candidate
//! messages from a Maildir root, honoring the cur/new/tmp convention and
//! the `.noupdate` and lazy-check optimizations.
//!
//! Directory traversal itself is `walkdir`, the same crate
//! `uiri-SEGIMAP/core/src/util.rs` reaches for to enumerate a maildir tree
//! for its `LIST` command; `filter_entry` is exactly the pruning hook this
//! component's `.noupdate`/`tmp` skip rules need.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use walkdir::{DirEntry, WalkDir};

/// A candidate message discovered by the walker: its absolute path, the
/// maildir path relative to the root (e.g. `/lists/rust-lang`, `/` for the
/// top-level inbox), and the file's mtime as epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub relative_maildir: String,
    pub mtime: i64,
    pub in_new: bool,
}

#[derive(Debug, Clone)]
pub struct WalkPolicy {
    /// Skip directories containing a `.noupdate` marker (and their
    /// subtrees). Default true; spec.md's `ignore_noupdate` Indexer
    /// config option inverts this.
    pub honor_noupdate: bool,
    pub noupdate_filename: String,
    /// Skip a directory whose own mtime is not newer than the last mtime
    /// the Store recorded for it. Off by default (filesystem mtime-on-
    /// rename semantics vary too much to be a safe default, per spec.md's
    /// open question).
    pub lazy_check: bool,
    /// Emit directory entries in inode order to improve locality on
    /// spinning media. Unix-only; a no-op elsewhere.
    pub inode_order: bool,
}

impl Default for WalkPolicy {
    fn default() -> Self {
        WalkPolicy {
            honor_noupdate: true,
            noupdate_filename: ".noupdate".to_owned(),
            lazy_check: false,
            inode_order: false,
        }
    }
}

/// Looks up the last mtime the Store has recorded for a directory, for the
/// `lazy_check` optimization. Implemented by the caller (normally backed by
/// `Store`); kept as a trait rather than a concrete dependency so the
/// walker doesn't need to know about the store's schema.
pub trait DirMtimeOracle {
    fn last_seen_mtime(&self, relative_maildir: &str) -> Option<i64>;
}

pub struct NoOracle;
impl DirMtimeOracle for NoOracle {
    fn last_seen_mtime(&self, _relative_maildir: &str) -> Option<i64> {
        None
    }
}

fn is_noupdate_marked(dir: &Path, marker: &str) -> bool {
    dir.join(marker).exists()
}

fn relative_maildir_of(root: &Path, folder_dir: &Path) -> String {
    if folder_dir == root {
        return "/".to_owned();
    }
    match folder_dir.strip_prefix(root) {
        Ok(rel) => {
            let s = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
            format!("/{}", s)
        }
        Err(_) => folder_dir.to_string_lossy().into_owned(),
    }
}

fn mtime_secs(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(unix)]
fn inode_of(entry: &DirEntry) -> u64 {
    entry.metadata().map(|m| m.ino()).unwrap_or(0)
}

#[cfg(not(unix))]
fn inode_of(_entry: &DirEntry) -> u64 {
    0
}

#[cfg(unix)]
use std::os::unix::fs::MetadataExt as _;

/// Walk `root`, yielding every message file candidate found under `cur/`
/// and `new/` subdirectories (including nested container directories that
/// themselves hold `cur`/`new` pairs), in depth-first order.
///
/// `oracle` backs the `lazy_check` optimization; pass [`NoOracle`] to
/// disable it regardless of `policy.lazy_check`.
pub fn walk(root: &Path, policy: &WalkPolicy, oracle: &dyn DirMtimeOracle) -> Vec<Candidate> {
    let mut out = Vec::new();
    let mut visited_inodes: HashSet<u64> = HashSet::new();

    let mut walker = WalkDir::new(root).follow_links(false);
    if policy.inode_order {
        walker = walker.sort_by(|a, b| inode_of(a).cmp(&inode_of(b)));
    }

    let honor_noupdate = policy.honor_noupdate;
    let noupdate_filename = policy.noupdate_filename.clone();
    let lazy_check = policy.lazy_check;

    let iter = walker.into_iter().filter_entry(move |entry| {
        if !entry.file_type().is_dir() {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if name == "tmp" {
            return false;
        }
        if honor_noupdate && is_noupdate_marked(entry.path(), &noupdate_filename) {
            return false;
        }
        if lazy_check && (name == "cur" || name == "new") {
            if let Some(folder_dir) = entry.path().parent() {
                let relative = relative_maildir_of(root, folder_dir);
                if let (Some(last_seen), Ok(meta)) =
                    (oracle.last_seen_mtime(&relative), entry.metadata())
                {
                    if mtime_secs(&meta) <= last_seen {
                        return false;
                    }
                }
            }
        }
        true
    });

    for entry in iter {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!("skipping unreadable directory entry: {}", err);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            if let Ok(meta) = entry.metadata() {
                let inode = meta.ino();
                if !visited_inodes.insert(inode) {
                    // Symlink loop (or hardlinked dir alias): already visited.
                    continue;
                }
            }
            continue;
        }

        let parent_name = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        let in_new = match parent_name.as_deref() {
            Some("cur") => false,
            Some("new") => true,
            _ => continue, // not directly inside cur/ or new/: ignore (tmp/ already pruned)
        };

        let folder_dir = entry.path().parent().and_then(|p| p.parent());
        let relative_maildir = match folder_dir {
            Some(dir) => relative_maildir_of(root, dir),
            None => continue,
        };

        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                warn!("skipping unreadable file {:?}: {}", entry.path(), err);
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }

        out.push(Candidate {
            path: entry.path().to_path_buf(),
            relative_maildir,
            mtime: mtime_secs(&meta),
            in_new,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::write(path, b"From: a@b.c\r\n\r\nbody").unwrap();
    }

    #[test]
    fn walks_cur_and_new_skips_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("cur")).unwrap();
        fs::create_dir_all(root.join("new")).unwrap();
        fs::create_dir_all(root.join("tmp")).unwrap();
        touch(&root.join("cur/1:2,S"));
        touch(&root.join("new/2"));
        touch(&root.join("tmp/3"));

        let candidates = walk(root, &WalkPolicy::default(), &NoOracle);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().any(|c| c.path.ends_with("cur/1:2,S") && !c.in_new));
        assert!(candidates.iter().any(|c| c.path.ends_with("new/2") && c.in_new));
    }

    #[test]
    fn honors_noupdate_marker() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let sub = root.join("lists").join("rust-lang");
        fs::create_dir_all(sub.join("cur")).unwrap();
        fs::write(sub.join(".noupdate"), b"").unwrap();
        touch(&sub.join("cur/1:2,S"));

        let candidates = walk(root, &WalkPolicy::default(), &NoOracle);
        assert!(candidates.is_empty());

        let mut policy = WalkPolicy::default();
        policy.honor_noupdate = false;
        let candidates = walk(root, &policy, &NoOracle);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn relative_maildir_is_rooted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("cur")).unwrap();
        touch(&root.join("cur/1:2,S"));
        let sub = root.join("lists").join("rust-lang");
        fs::create_dir_all(sub.join("cur")).unwrap();
        touch(&sub.join("cur/2:2,S"));

        let candidates = walk(root, &WalkPolicy::default(), &NoOracle);
        let top = candidates.iter().find(|c| c.path.ends_with("cur/1:2,S")).unwrap();
        assert_eq!(top.relative_maildir, "/");
        let nested = candidates.iter().find(|c| c.path.ends_with("cur/2:2,S")).unwrap();
        assert_eq!(nested.relative_maildir, "/lists/rust-lang");
    }
}
