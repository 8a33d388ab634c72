//! The Store (component D): the persistent index over parsed messages,
//! backed by `rusqlite` rather than SQLite FTS5, so the documents/terms
//! model matches spec.md §3's Document/Term/Value-slot shape exactly. The
//! Contacts cache lives alongside it in [`contacts`], its own flat TSV
//! file per spec.md §6.

pub mod contacts;
pub mod schema;

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use advisory_lock::{AdvisoryFileLock, FileLockError, FileLockMode};
use log::{debug, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::model::{ContactEntry, MessageRecord};
use crate::registry::FIELDS;
use crate::walker::DirMtimeOracle;

use contacts::ContactsCache;

/// How to open the underlying database file. `ReadWrite` opens-or-creates;
/// `ReadOnly` backs query-only tools that must not race an in-progress
/// index run; `Overwrite` drops and fully rebuilds the corpus, for
/// recovering from a schema mismatch without deleting files by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOpenMode {
    ReadWrite,
    ReadOnly,
    Overwrite,
}

struct Inner {
    conn: Connection,
    tx_open: bool,
    pending: u64,
    personal_addresses: Vec<String>,
}

/// The persistent index. A single `rusqlite::Connection` behind a
/// `parking_lot::Mutex`, which only serializes access within this
/// process; SQLite itself does not lock on open, so cross-process
/// single-writer/shared-reader semantics are enforced separately by
/// `lock_file`, an `advisory_lock`-held sibling `.lock` file acquired in
/// `open` and released when the `Store` is dropped.
pub struct Store {
    inner: Mutex<Inner>,
    path: PathBuf,
    batch_size: u64,
    contacts_path: PathBuf,
    contacts: Mutex<ContactsCache>,
    lock_file: File,
}

impl Store {
    /// Default write-batch size: commit every 10,000 documents during a
    /// bulk index run rather than after every file (spec.md §4.D).
    pub const DEFAULT_BATCH_SIZE: u64 = 10_000;

    pub fn open(path: &Path, mode: StoreOpenMode) -> Result<Store, StoreError> {
        if let Some(parent) = path.parent() {
            if parent.exists() && !parent.is_dir() {
                return Err(StoreError::NotADirectory(parent.to_path_buf()));
            }
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock_path = path.with_file_name(match path.file_name() {
            Some(name) => format!("{}.lock", name.to_string_lossy()),
            None => "index.lock".to_owned(),
        });
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        let lock_mode = match mode {
            StoreOpenMode::ReadOnly => FileLockMode::Shared,
            StoreOpenMode::ReadWrite | StoreOpenMode::Overwrite => FileLockMode::Exclusive,
        };
        lock_file.try_lock(lock_mode).map_err(|e| match e {
            FileLockError::Io(e) => StoreError::Io(e),
            FileLockError::AlreadyLocked => StoreError::Locked,
        })?;

        let conn = match mode {
            StoreOpenMode::ReadWrite | StoreOpenMode::Overwrite => Connection::open(path)?,
            StoreOpenMode::ReadOnly => Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
            )?,
        };
        if mode == StoreOpenMode::Overwrite {
            conn.execute_batch(schema::DROP_TABLES)?;
        }
        conn.execute_batch(schema::CREATE_TABLES)?;
        let contacts_path = path.with_file_name(match path.file_name() {
            Some(name) => format!("{}.contacts", name.to_string_lossy()),
            None => "contacts".to_owned(),
        });
        let contacts = if mode == StoreOpenMode::Overwrite {
            ContactsCache::new()
        } else {
            ContactsCache::load(&contacts_path)?
        };
        debug!("loaded {} cached contacts from {:?}", contacts.len(), contacts_path);
        let store = Store {
            inner: Mutex::new(Inner {
                conn,
                tx_open: false,
                pending: 0,
                personal_addresses: Vec::new(),
            }),
            path: path.to_path_buf(),
            batch_size: Store::DEFAULT_BATCH_SIZE,
            contacts_path,
            contacts: Mutex::new(contacts),
            lock_file,
        };
        store.check_schema_version()?;
        let personal = store
            .get_metadata("personal_addresses")?
            .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_owned).collect())
            .unwrap_or_default();
        store.inner.lock().personal_addresses = personal;
        Ok(store)
    }

    /// Replace the set of addresses considered "mine" for the Contacts
    /// cache's personal flag, persisting the choice to the metadata table.
    pub fn set_personal_addresses(&self, addresses: &[String]) -> Result<(), StoreError> {
        self.set_metadata("personal_addresses", &addresses.join(","))?;
        self.inner.lock().personal_addresses = addresses.to_vec();
        Ok(())
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Store {
        self.batch_size = batch_size.max(1);
        self
    }

    fn check_schema_version(&self) -> Result<(), StoreError> {
        let found = self
            .get_metadata("schema_version")?
            .and_then(|v| v.parse::<u32>().ok());
        match found {
            None => self.set_metadata("schema_version", &schema::SCHEMA_VERSION.to_string()),
            Some(v) if v == schema::SCHEMA_VERSION => Ok(()),
            Some(v) => Err(StoreError::SchemaMismatch {
                found: v,
                required: schema::SCHEMA_VERSION,
            }),
        }
    }

    fn ensure_tx(inner: &mut Inner) -> Result<(), StoreError> {
        if !inner.tx_open {
            inner.conn.execute_batch("BEGIN")?;
            inner.tx_open = true;
        }
        Ok(())
    }

    /// Commit any pending write transaction. Call at the end of an index
    /// run (or a cancellation that wants to keep progress) so documents
    /// added since the last auto-commit are durable.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.tx_open {
            inner.conn.execute_batch("COMMIT")?;
            inner.tx_open = false;
            inner.pending = 0;
        }
        drop(inner);
        self.contacts.lock().save(&self.contacts_path)?;
        Ok(())
    }

    /// Discard any pending write transaction without committing, for the
    /// "cancellation discards the partial batch" Indexer policy.
    pub fn discard(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.tx_open {
            inner.conn.execute_batch("ROLLBACK")?;
            inner.tx_open = false;
            inner.pending = 0;
        }
        Ok(())
    }

    /// Insert or, if a document with this path already exists, replace it
    /// and its indexed terms.
    pub fn add_or_update(&self, record: &MessageRecord) -> Result<(), StoreError> {
        let path_str = record.path.to_string_lossy().into_owned();
        let mut inner = self.inner.lock();
        Store::ensure_tx(&mut inner)?;

        let existing_id: Option<i64> = inner
            .conn
            .query_row(
                "SELECT id FROM documents WHERE path = ?1",
                params![path_str],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing_id {
            inner.conn.execute("DELETE FROM terms WHERE doc_id = ?1", params![id])?;
            inner.conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        }

        inner.conn.execute(
            "INSERT INTO documents (path, maildir, mtime, size, message_id, subject, date, priority, flags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                path_str,
                record.relative_maildir,
                record.mtime,
                record.size as i64,
                record.message_id,
                record.subject,
                record.date,
                record.priority.to_i64(),
                record.flags.to_bits() as i64,
            ],
        )?;
        let doc_id = inner.conn.last_insert_rowid();

        for term in terms_for(record) {
            inner
                .conn
                .execute("INSERT INTO terms (doc_id, term) VALUES (?1, ?2)", params![doc_id, term])?;
        }

        inner.pending += 1;
        if inner.pending >= self.batch_size {
            inner.conn.execute_batch("COMMIT")?;
            inner.tx_open = false;
            inner.pending = 0;
        }
        let personal_addresses = inner.personal_addresses.clone();
        drop(inner);

        let mut contacts = self.contacts.lock();
        for addr in record.all_addresses() {
            contacts.record(addr, record.date, &personal_addresses);
        }
        Ok(())
    }

    /// Look up a cached contact by e-mail address.
    pub fn contact(&self, email: &str) -> Option<ContactEntry> {
        self.contacts.lock().find(email).cloned()
    }

    /// Visit every cached contact, most-frequently-seen first, per
    /// spec.md §4.D's `--format=mail-alternatives`-style consumers.
    pub fn for_each_contact_by_frequency(&self, mut f: impl FnMut(&ContactEntry)) {
        let contacts = self.contacts.lock();
        let mut entries: Vec<&ContactEntry> = contacts.iter().collect();
        entries.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.email.cmp(&b.email)));
        for entry in entries {
            f(entry);
        }
    }

    pub fn contains(&self, path: &Path) -> Result<bool, StoreError> {
        Ok(self.mtime(path)?.is_some())
    }

    pub fn mtime(&self, path: &Path) -> Result<Option<i64>, StoreError> {
        let inner = self.inner.lock();
        let path_str = path.to_string_lossy().into_owned();
        let mtime = inner
            .conn
            .query_row(
                "SELECT mtime FROM documents WHERE path = ?1",
                params![path_str],
                |row| row.get(0),
            )
            .optional()?;
        Ok(mtime)
    }

    /// Remove the document at `path`. Fails with [`StoreError::NotFound`]
    /// if no document is indexed under that path.
    pub fn remove(&self, path: &Path) -> Result<(), StoreError> {
        let path_str = path.to_string_lossy().into_owned();
        let mut inner = self.inner.lock();
        Store::ensure_tx(&mut inner)?;
        let id: Option<i64> = inner
            .conn
            .query_row(
                "SELECT id FROM documents WHERE path = ?1",
                params![path_str],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => {
                inner.conn.execute("DELETE FROM terms WHERE doc_id = ?1", params![id])?;
                inner.conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
                inner.pending += 1;
                Ok(())
            }
            None => Err(StoreError::NotFound(path.to_path_buf())),
        }
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let inner = self.inner.lock();
        let n: i64 = inner
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn size_on_disk(&self) -> Result<u64, StoreError> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Visit every indexed path, for the Indexer's cleanup pass to compare
    /// against what currently exists on disk.
    pub fn for_each_path(&self, mut f: impl FnMut(PathBuf)) -> Result<(), StoreError> {
        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare("SELECT path FROM documents")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows {
            let path: String = row?;
            f(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock();
        let value = inner
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Store::ensure_tx(&mut inner)?;
        inner.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Record the mtime the walker observed for a maildir subtree, for the
    /// `lazy_check` optimization's [`DirMtimeOracle`].
    pub fn record_dir_mtime(&self, relative_maildir: &str, mtime: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Store::ensure_tx(&mut inner)?;
        inner.conn.execute(
            "INSERT INTO directories (maildir, last_mtime) VALUES (?1, ?2)
             ON CONFLICT(maildir) DO UPDATE SET last_mtime = excluded.last_mtime",
            params![relative_maildir, mtime],
        )?;
        Ok(())
    }

    /// Run a read against the underlying connection. Used by the Query
    /// Engine, which needs to compose SQL this module doesn't otherwise
    /// expose a typed wrapper for.
    pub(crate) fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let inner = self.inner.lock();
        f(&inner.conn)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.lock_file.unlock() {
            warn!("failed to release store lock file: {}", e);
        }
    }
}

impl DirMtimeOracle for Store {
    fn last_seen_mtime(&self, relative_maildir: &str) -> Option<i64> {
        let inner = self.inner.lock();
        inner
            .conn
            .query_row(
                "SELECT last_mtime FROM directories WHERE maildir = ?1",
                params![relative_maildir],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                warn!("lazy-check directory lookup failed: {}", e);
                None
            })
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Build the set of terms a document should be indexed under: free-text
/// tokens (field-prefixed and bare, for default-field search) for
/// `indexed_as_text` fields, and exact prefixed terms for
/// `stored_as_term` fields. See [`crate::registry`] for the prefix table.
pub fn terms_for(record: &MessageRecord) -> Vec<String> {
    let mut terms = HashSet::new();

    let from_field = crate::registry::by_id(crate::registry::FieldId::From);
    if let Some(from) = &record.from {
        index_text(&mut terms, from_field.prefix, &from.decoded());
    }
    index_addresses(&mut terms, crate::registry::FieldId::To, &record.to);
    index_addresses(&mut terms, crate::registry::FieldId::Cc, &record.cc);
    index_addresses(&mut terms, crate::registry::FieldId::Bcc, &record.bcc);

    let subject_field = crate::registry::by_id(crate::registry::FieldId::Subject);
    index_text(&mut terms, subject_field.prefix, &record.subject);

    index_text(&mut terms, None, &record.body_text);

    let maildir_field = crate::registry::by_id(crate::registry::FieldId::Maildir);
    if let Some(prefix) = maildir_field.prefix {
        terms.insert(format!("{}{}", prefix, record.relative_maildir.to_lowercase()));
    }
    let path_field = crate::registry::by_id(crate::registry::FieldId::Path);
    if let Some(prefix) = path_field.prefix {
        terms.insert(format!("{}{}", prefix, record.path.to_string_lossy()));
    }
    let msgid_field = crate::registry::by_id(crate::registry::FieldId::MessageId);
    if let (Some(prefix), false) = (msgid_field.prefix, record.message_id.is_empty()) {
        terms.insert(format!("{}{}", prefix, record.message_id));
    }
    let refs_field = crate::registry::by_id(crate::registry::FieldId::References);
    if let Some(prefix) = refs_field.prefix {
        for r in &record.references {
            terms.insert(format!("{}{}", prefix, r));
        }
    }
    let tags_field = crate::registry::by_id(crate::registry::FieldId::Tags);
    if let Some(prefix) = tags_field.prefix {
        for t in &record.tags {
            terms.insert(format!("{}{}", prefix, t.to_lowercase()));
        }
    }

    debug_assert!(FIELDS.iter().any(|f| f.id == crate::registry::FieldId::BodyText));
    terms.into_iter().collect()
}

fn index_addresses(terms: &mut HashSet<String>, id: crate::registry::FieldId, addrs: &[crate::model::Address]) {
    let field = crate::registry::by_id(id);
    for addr in addrs {
        index_text(terms, field.prefix, &addr.decoded());
    }
}

fn index_text(terms: &mut HashSet<String>, prefix: Option<&str>, text: &str) {
    for word in tokenize(text) {
        if let Some(prefix) = prefix {
            terms.insert(format!("{}{}", prefix, word));
        }
        terms.insert(word);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{Flags, Priority};
    use crate::model::{Address, MessageRecord};

    fn sample(path: &str) -> MessageRecord {
        MessageRecord {
            path: PathBuf::from(path),
            relative_maildir: "/".to_owned(),
            mtime: 100,
            size: 42,
            message_id: "abc@example.com".to_owned(),
            subject: "Hello World".to_owned(),
            from: Some(Address::new(Some("Alice".to_owned()), "alice@example.com".to_owned())),
            to: vec![Address::new(None, "bob@example.com".to_owned())],
            cc: vec![],
            bcc: vec![],
            date: 1000,
            priority: Priority::Normal,
            flags: Flags::SEEN,
            body_text: "some body text".to_owned(),
            references: vec![],
            tags: vec!["work".to_owned()],
            has_attachment: false,
        }
    }

    #[test]
    fn add_contains_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");
        let store = Store::open(&db_path, StoreOpenMode::ReadWrite).unwrap();
        let record = sample("/mail/cur/1:2,S");
        store.add_or_update(&record).unwrap();
        store.flush().unwrap();

        assert!(store.contains(&record.path).unwrap());
        assert_eq!(store.mtime(&record.path).unwrap(), Some(100));
        assert_eq!(store.count().unwrap(), 1);

        store.remove(&record.path).unwrap();
        store.flush().unwrap();
        assert!(!store.contains(&record.path).unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn remove_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");
        let store = Store::open(&db_path, StoreOpenMode::ReadWrite).unwrap();
        let err = store.remove(Path::new("/mail/cur/missing:2,S")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn second_writer_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");
        let first = Store::open(&db_path, StoreOpenMode::ReadWrite).unwrap();
        let err = Store::open(&db_path, StoreOpenMode::ReadWrite).unwrap_err();
        assert!(matches!(err, StoreError::Locked));
        drop(first);
        assert!(Store::open(&db_path, StoreOpenMode::ReadWrite).is_ok());
    }

    #[test]
    fn concurrent_readers_are_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");
        {
            Store::open(&db_path, StoreOpenMode::ReadWrite).unwrap();
        }
        let first = Store::open(&db_path, StoreOpenMode::ReadOnly).unwrap();
        let second = Store::open(&db_path, StoreOpenMode::ReadOnly).unwrap();
        drop(first);
        drop(second);
    }

    #[test]
    fn overwrite_regenerates_corpus_and_contacts() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");
        {
            let store = Store::open(&db_path, StoreOpenMode::ReadWrite).unwrap();
            store.add_or_update(&sample("/mail/cur/1:2,S")).unwrap();
            store.flush().unwrap();
            assert_eq!(store.count().unwrap(), 1);
        }

        let store = Store::open(&db_path, StoreOpenMode::Overwrite).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.contact("alice@example.com").is_none());
    }

    #[test]
    fn update_replaces_terms() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");
        let store = Store::open(&db_path, StoreOpenMode::ReadWrite).unwrap();
        let mut record = sample("/mail/cur/1:2,S");
        store.add_or_update(&record).unwrap();
        record.subject = "Completely Different".to_owned();
        store.add_or_update(&record).unwrap();
        store.flush().unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn terms_include_prefixed_and_bare_subject_tokens() {
        let record = sample("/mail/cur/1:2,S");
        let terms = terms_for(&record);
        assert!(terms.contains(&"Shello".to_owned()));
        assert!(terms.contains(&"hello".to_owned()));
        assert!(terms.contains(&"Kwork".to_owned()));
    }

    #[test]
    fn add_or_update_populates_contacts_cache() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");
        let store = Store::open(&db_path, StoreOpenMode::ReadWrite).unwrap();
        store.set_personal_addresses(&["bob@example.com".to_owned()]).unwrap();

        let mut first = sample("/mail/cur/1:2,S");
        first.date = 10;
        store.add_or_update(&first).unwrap();
        let mut second = sample("/mail/cur/2:2,S");
        second.date = 20;
        store.add_or_update(&second).unwrap();
        store.flush().unwrap();

        let alice = store.contact("alice@example.com").unwrap();
        assert_eq!(alice.frequency, 2);
        assert_eq!(alice.last_seen, 20);
        assert!(!alice.personal);

        let bob = store.contact("bob@example.com").unwrap();
        assert!(bob.personal);

        assert!(db_path.with_file_name("index.sqlite.contacts").exists());
    }
}
