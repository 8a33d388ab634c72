//! In-memory record types: the parsed form of a message (spec.md §3) and
//! the per-address contact entry.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::flags::{Flags, Priority};

/// A parsed e-mail address: display name plus address, the shape
/// `mailparse::SingleInfo` already hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub display_name: Option<String>,
    pub addr: String,
}

impl Address {
    pub fn new(display_name: Option<String>, addr: String) -> Self {
        Address { display_name, addr }
    }

    /// Canonical lowercased key used by the contacts cache and personal
    /// address membership tests.
    pub fn canonical(&self) -> String {
        self.addr.to_ascii_lowercase()
    }

    /// "Name <addr>" form used for the contacts cache's `full-address`
    /// column and for display.
    pub fn decoded(&self) -> String {
        match &self.display_name {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.addr),
            _ => self.addr.clone(),
        }
    }
}

/// The in-memory parsed form of a single message (spec.md §3).
///
/// Invariants upheld by the parser: `path` is absolute, `date` is
/// non-negative, `references` contains no duplicates, and every string
/// field is valid UTF-8 (falling back to asciified text rather than
/// failing outright).
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub path: PathBuf,
    pub relative_maildir: String,
    pub mtime: i64,
    pub size: u64,
    pub message_id: String,
    pub subject: String,
    pub from: Option<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub date: i64,
    pub priority: Priority,
    pub flags: Flags,
    pub body_text: String,
    pub references: Vec<String>,
    pub tags: Vec<String>,
    pub has_attachment: bool,
}

impl MessageRecord {
    /// All distinct addresses appearing in from/to/cc/bcc, for
    /// contact-cache bookkeeping. An address repeated across headers of
    /// this message (e.g. present in both To and Cc) is returned once,
    /// so `Contacts.find(A).freq` counts messages containing A, not
    /// header occurrences of A.
    pub fn all_addresses(&self) -> Vec<&Address> {
        let mut addrs = Vec::new();
        if let Some(from) = &self.from {
            addrs.push(from);
        }
        addrs.extend(self.to.iter());
        addrs.extend(self.cc.iter());
        addrs.extend(self.bcc.iter());

        let mut seen = HashSet::new();
        addrs.retain(|a| seen.insert(a.canonical()));
        addrs
    }
}

/// A per-address record in the Contacts cache (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct ContactEntry {
    /// Lowercased e-mail, used as the cache key.
    pub email: String,
    /// Most recent display name seen for this address (may be empty).
    pub display_name: String,
    /// Max timestamp over messages where the address appeared.
    pub last_seen: i64,
    /// Count of messages containing this address in from/to/cc/bcc.
    pub frequency: u64,
    /// True iff the address matches one of the user's personal addresses.
    pub personal: bool,
}

impl ContactEntry {
    /// The "Name <email>" decoded form stored as the cache's last column.
    pub fn full_address(&self) -> String {
        if self.display_name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.display_name, self.email)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_addresses_dedupes_address_repeated_across_headers() {
        let shared = Address::new(Some("Alice".to_owned()), "alice@example.com".to_owned());
        let record = MessageRecord {
            path: PathBuf::from("/mail/cur/1:2,S"),
            relative_maildir: "/".to_owned(),
            mtime: 0,
            size: 0,
            message_id: String::new(),
            subject: String::new(),
            from: Some(shared.clone()),
            to: vec![shared.clone()],
            cc: vec![Address::new(None, "ALICE@example.com".to_owned())],
            bcc: vec![],
            date: 0,
            priority: Priority::Normal,
            flags: Flags::empty(),
            body_text: String::new(),
            references: vec![],
            tags: vec![],
            has_attachment: false,
        };
        assert_eq!(record.all_addresses().len(), 1);
    }
}
