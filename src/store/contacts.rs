//! The Contacts cache (spec.md §3 and §6): a flat, human-readable TSV file
//! rather than a SQLite table, matching the original tool's own contacts
//! cache format. Kept separate from the main index so it can be rebuilt or
//! inspected independently.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use log::warn;

use crate::model::{Address, ContactEntry};

const HEADER_LINE: &str = "# mdex-contacts v1";

/// In-memory contacts cache, keyed by lowercased e-mail address.
#[derive(Debug, Default)]
pub struct ContactsCache {
    entries: HashMap<String, ContactEntry>,
}

impl ContactsCache {
    pub fn new() -> ContactsCache {
        ContactsCache::default()
    }

    /// Load a cache file. A missing file is treated as an empty cache
    /// rather than an error, since the first index run has nothing to
    /// load yet.
    pub fn load(path: &Path) -> Result<ContactsCache, std::io::Error> {
        let mut cache = ContactsCache::new();
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(cache),
            Err(e) => return Err(e),
        };
        for (lineno, line) in content.lines().enumerate() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                warn!("contacts cache line {}: malformed, skipping", lineno + 1);
                continue;
            }
            let email = fields[0].to_owned();
            let display_name = fields[1].to_owned();
            let last_seen: i64 = fields[2].parse().unwrap_or(0);
            let frequency: u64 = fields[3].parse().unwrap_or(0);
            let personal = fields[4] == "1";
            cache.entries.insert(
                email.clone(),
                ContactEntry {
                    email,
                    display_name,
                    last_seen,
                    frequency,
                    personal,
                },
            );
        }
        Ok(cache)
    }

    /// Atomically persist the cache: write to a sibling temp file, then
    /// rename over the destination, so a crash mid-write never leaves a
    /// truncated cache behind.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let tmp_path = path.with_extension("tmp");
        let mut entries: Vec<&ContactEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.email.cmp(&b.email));
        {
            let mut f = fs::File::create(&tmp_path)?;
            writeln!(f, "{}", HEADER_LINE)?;
            for entry in entries {
                writeln!(
                    f,
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    entry.email,
                    entry.display_name,
                    entry.last_seen,
                    entry.frequency,
                    if entry.personal { 1 } else { 0 },
                    entry.full_address(),
                )?;
            }
            f.flush()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Record a sighting of `addr` at `seen_at` (a message date), bumping
    /// frequency and, if this sighting is newer, the display name and
    /// last-seen timestamp.
    pub fn record(&mut self, addr: &Address, seen_at: i64, personal_addrs: &[String]) {
        let email = addr.canonical();
        let personal = is_personal(&email, personal_addrs);
        let entry = self.entries.entry(email.clone()).or_insert_with(|| ContactEntry {
            email: email.clone(),
            display_name: String::new(),
            last_seen: 0,
            frequency: 0,
            personal,
        });
        entry.frequency += 1;
        entry.personal = entry.personal || personal;
        if seen_at >= entry.last_seen {
            entry.last_seen = seen_at;
            if let Some(name) = &addr.display_name {
                if !name.is_empty() {
                    entry.display_name = name.clone();
                }
            }
        }
    }

    pub fn find(&self, email: &str) -> Option<&ContactEntry> {
        self.entries.get(&email.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContactEntry> {
        self.entries.values()
    }
}

/// Case-insensitive match on the address only, never the display name,
/// per the original tool's `mu-contacts.hh` semantics.
pub fn is_personal(email: &str, personal_addrs: &[String]) -> bool {
    let lower = email.to_ascii_lowercase();
    personal_addrs.iter().any(|p| p.eq_ignore_ascii_case(&lower))
}
