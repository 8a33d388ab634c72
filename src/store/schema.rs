//! SQL schema for the persistent index. A hand-built documents/terms/
//! metadata/directories model rather than SQLite FTS5: spec.md §3's
//! Document/Term/Value-slot data model maps directly onto these tables,
//! and keeping full control of tokenization is what lets the Query Engine
//! implement field-scoped search and prefix terms exactly as the Field
//! Registry describes them.

pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    maildir TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    size INTEGER NOT NULL,
    message_id TEXT NOT NULL DEFAULT '',
    subject TEXT NOT NULL DEFAULT '',
    date INTEGER NOT NULL,
    priority INTEGER NOT NULL,
    flags INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS documents_maildir_idx ON documents(maildir);
CREATE INDEX IF NOT EXISTS documents_date_idx ON documents(date);
CREATE INDEX IF NOT EXISTS documents_msgid_idx ON documents(message_id);

CREATE TABLE IF NOT EXISTS terms (
    doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    term TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS terms_term_idx ON terms(term);
CREATE INDEX IF NOT EXISTS terms_doc_idx ON terms(doc_id);

CREATE TABLE IF NOT EXISTS directories (
    maildir TEXT PRIMARY KEY,
    last_mtime INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Dropped before `CREATE_TABLES` on `StoreOpenMode::Overwrite`, so the
/// corpus (and, via a fresh `metadata` table, the schema version) is fully
/// regenerated rather than merged with whatever was already on disk.
pub const DROP_TABLES: &str = "
DROP TABLE IF EXISTS terms;
DROP TABLE IF EXISTS documents;
DROP TABLE IF EXISTS directories;
DROP TABLE IF EXISTS metadata;
";
