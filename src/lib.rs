//! `maildex`: a Maildir indexing and search library. Walks a Maildir tree,
//! parses messages with `mailparse`, and maintains a persistent `rusqlite`
//! index plus a Contacts cache, queryable through a small expression
//! language.
//!
//! Components (spec.md §4): [`walker`] discovers candidate files,
//! [`parser`] turns them into [`model::MessageRecord`]s, [`store`] persists
//! them, [`indexer`] orchestrates a full run, and [`query`] compiles and
//! executes search expressions against the store.

pub mod config;
pub mod error;
pub mod flags;
pub mod indexer;
pub mod model;
pub mod parser;
pub mod query;
pub mod registry;
pub mod store;
pub mod walker;

pub use error::{IndexerError, ParseError, QueryError, StoreError};
pub use flags::{Flags, Priority};
pub use indexer::{CancelPolicy, Indexer, IndexerConfig, Progress};
pub use model::{Address, ContactEntry, MessageRecord};
pub use query::{explain, run, DocumentSummary, Expr, QueryResult};
pub use registry::{Field, FieldId};
pub use store::{Store, StoreOpenMode};
