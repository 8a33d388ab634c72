//! Query execution (component F, continued): turns an [`Expr`] tree into a
//! set of matching document ids, then materializes a sorted, paginated
//! iterator of hits. Runs synchronously on the caller's thread against a
//! read-only view of the Store, per spec.md §5.

use std::collections::HashSet;
use std::path::PathBuf;

use rusqlite::params;

use crate::error::QueryError;
use crate::flags::{Flags, Priority};
use crate::registry::{Field, FieldId};
use crate::store::Store;

use super::grammar::{self, Expr};

/// One row of the documents table, the stored-as-value fields retrievable
/// on demand per spec.md §4.F.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub id: i64,
    pub path: PathBuf,
    pub maildir: String,
    pub mtime: i64,
    pub size: u64,
    pub message_id: String,
    pub subject: String,
    pub date: i64,
    pub priority: Priority,
    pub flags: Flags,
}

impl DocumentSummary {
    /// The field's value rendered as a display string, for generic getters
    /// keyed by [`FieldId`] (e.g. an `--xquery`-style formatter).
    pub fn field_value(&self, id: FieldId) -> String {
        match id {
            FieldId::Path => self.path.to_string_lossy().into_owned(),
            FieldId::Maildir => self.maildir.clone(),
            FieldId::MessageId => self.message_id.clone(),
            FieldId::Subject => self.subject.clone(),
            FieldId::Date => self.date.to_string(),
            FieldId::Size => self.size.to_string(),
            FieldId::Priority => self.priority.as_str().to_owned(),
            FieldId::Flags => self.flags.to_string(),
            _ => String::new(),
        }
    }

    /// Re-parse the full message from disk, for callers that need the
    /// body or address lists a summary row doesn't carry.
    pub fn load_full(&self, in_new: bool) -> Result<crate::model::MessageRecord, crate::error::ParseError> {
        crate::parser::parse(&self.path, &self.maildir, in_new)
    }
}

/// A lazy, forward-moving, sort-ordered result set. Hits are fetched
/// eagerly into memory at `run()` time (ids are cheap; this crate targets
/// desktop-scale archives, not web-scale corpora), but the public surface
/// only exposes forward iteration, matching spec.md's "read-only,
/// forward-moving" contract.
pub struct QueryResult {
    hits: Vec<DocumentSummary>,
    pos: usize,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

impl Iterator for QueryResult {
    type Item = DocumentSummary;

    fn next(&mut self) -> Option<DocumentSummary> {
        let hit = self.hits.get(self.pos)?.clone();
        self.pos += 1;
        Some(hit)
    }
}

/// Compile and execute `expression` against `store`. `sort_field`, when
/// given, must be a `stored_as_value` field name/shortcut; ties are
/// broken by document id. `limit` of 0 (or `None`) means unlimited.
pub fn run(
    store: &Store,
    expression: &str,
    sort_field: Option<&str>,
    ascending: bool,
    limit: Option<u64>,
) -> Result<QueryResult, QueryError> {
    let expr = compile(expression)?;
    let sort = match sort_field {
        Some(name) => Some(resolve_sort_field(name)?),
        None => None,
    };

    let ids = eval(&expr, store);
    let mut hits = fetch_summaries(store, &ids);
    sort_hits(&mut hits, sort, ascending);
    if let Some(limit) = limit {
        if limit > 0 {
            hits.truncate(limit as usize);
        }
    }
    Ok(QueryResult { hits, pos: 0 })
}

/// Render the parsed query tree, for `--xquery`-style debugging
/// (spec.md §4.F).
pub fn explain(expression: &str) -> Result<String, QueryError> {
    let expr = compile(expression)?;
    Ok(grammar::render(&expr))
}

fn compile(expression: &str) -> Result<Expr, QueryError> {
    let normalized = grammar::preprocess(expression);
    grammar::parse(&normalized).map_err(|e| QueryError::Parse {
        position: Some(e.location.offset),
        reason: e.to_string(),
    })
}

fn resolve_sort_field(name: &str) -> Result<&'static Field, QueryError> {
    match crate::registry::resolve(name) {
        Some(field) if field.caps.stored_as_value => Ok(field),
        _ => Err(QueryError::UnknownSortField(name.to_owned())),
    }
}

fn eval(expr: &Expr, store: &Store) -> HashSet<i64> {
    match expr {
        Expr::All => all_doc_ids(store),
        Expr::Term(word) => doc_ids_with_term(store, word),
        Expr::FieldWord { field, word } => {
            let term = prefixed(field, word);
            doc_ids_with_term(store, &term)
        }
        Expr::FieldPrefix { field, prefix } => doc_ids_with_term_prefix(store, field, prefix),
        Expr::Range { field, lo, hi } => doc_ids_in_range(store, field, *lo, *hi),
        Expr::And(a, b) => {
            let sa = eval(a, store);
            let sb = eval(b, store);
            sa.intersection(&sb).copied().collect()
        }
        Expr::Or(a, b) => {
            let mut sa = eval(a, store);
            sa.extend(eval(b, store));
            sa
        }
        Expr::Not(a) => {
            let universe = all_doc_ids(store);
            let sa = eval(a, store);
            universe.difference(&sa).copied().collect()
        }
    }
}

fn prefixed(field: &Field, word: &str) -> String {
    match field.prefix {
        Some(p) => format!("{}{}", p, word),
        None => word.to_owned(),
    }
}

fn all_doc_ids(store: &Store) -> HashSet<i64> {
    store.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT id FROM documents").expect("valid sql");
        stmt.query_map([], |row| row.get::<_, i64>(0))
            .expect("valid query")
            .filter_map(Result::ok)
            .collect()
    })
}

fn doc_ids_with_term(store: &Store, term: &str) -> HashSet<i64> {
    store.with_connection(|conn| {
        let mut stmt = conn
            .prepare("SELECT doc_id FROM terms WHERE term = ?1")
            .expect("valid sql");
        stmt.query_map(params![term], |row| row.get::<_, i64>(0))
            .expect("valid query")
            .filter_map(Result::ok)
            .collect()
    })
}

fn doc_ids_with_term_prefix(store: &Store, field: &Field, prefix: &str) -> HashSet<i64> {
    let full_prefix = prefixed(field, prefix);
    let escaped = full_prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    let like_pattern = format!("{}%", escaped);
    store.with_connection(|conn| {
        let mut stmt = conn
            .prepare("SELECT doc_id FROM terms WHERE term LIKE ?1 ESCAPE '\\'")
            .expect("valid sql");
        stmt.query_map(params![like_pattern], |row| row.get::<_, i64>(0))
            .expect("valid query")
            .filter_map(Result::ok)
            .collect()
    })
}

fn doc_ids_in_range(store: &Store, field: &Field, lo: i64, hi: i64) -> HashSet<i64> {
    let column = match field.id {
        FieldId::Date => "date",
        FieldId::Size => "size",
        FieldId::Priority => "priority",
        FieldId::Flags => "flags",
        _ => return HashSet::new(),
    };
    let sql = format!("SELECT id FROM documents WHERE {} BETWEEN ?1 AND ?2", column);
    store.with_connection(|conn| {
        let mut stmt = conn.prepare(&sql).expect("valid sql");
        stmt.query_map(params![lo, hi], |row| row.get::<_, i64>(0))
            .expect("valid query")
            .filter_map(Result::ok)
            .collect()
    })
}

fn fetch_summaries(store: &Store, ids: &HashSet<i64>) -> Vec<DocumentSummary> {
    if ids.is_empty() {
        return Vec::new();
    }
    store.with_connection(|conn| {
        let mut stmt = conn
            .prepare(
                "SELECT id, path, maildir, mtime, size, message_id, subject, date, priority, flags
                 FROM documents",
            )
            .expect("valid sql");
        let rows = stmt
            .query_map([], |row| {
                Ok(DocumentSummary {
                    id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    maildir: row.get(2)?,
                    mtime: row.get(3)?,
                    size: row.get::<_, i64>(4)? as u64,
                    message_id: row.get(5)?,
                    subject: row.get(6)?,
                    date: row.get(7)?,
                    priority: Priority::from_i64(row.get(8)?),
                    flags: Flags::from_bits_value(row.get::<_, i64>(9)? as u16),
                })
            })
            .expect("valid query");
        rows.filter_map(Result::ok).filter(|doc| ids.contains(&doc.id)).collect()
    })
}

fn sort_hits(hits: &mut [DocumentSummary], sort: Option<&'static Field>, ascending: bool) {
    hits.sort_by(|a, b| {
        let ordering = match sort.map(|f| f.id) {
            Some(FieldId::Date) => a.date.cmp(&b.date),
            Some(FieldId::Size) => a.size.cmp(&b.size),
            Some(FieldId::Priority) => a.priority.cmp(&b.priority),
            Some(FieldId::Flags) => a.flags.bits().cmp(&b.flags.bits()),
            Some(FieldId::Subject) => a.subject.cmp(&b.subject),
            Some(FieldId::Maildir) => a.maildir.cmp(&b.maildir),
            Some(FieldId::Path) => a.path.cmp(&b.path),
            Some(FieldId::MessageId) => a.message_id.cmp(&b.message_id),
            _ => std::cmp::Ordering::Equal,
        }
        .then_with(|| a.id.cmp(&b.id));
        if ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
}
