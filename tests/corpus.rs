//! End-to-end scenarios over a fixed 13-message corpus, exercising the
//! full walk -> parse -> store -> query pipeline against a whole binary
//! rather than a single module.

use std::fs;
use std::path::{Path, PathBuf};

use maildex::indexer::{Indexer, IndexerConfig};
use maildex::query;
use maildex::store::{Store, StoreOpenMode};

struct Fixture {
    root: PathBuf,
    _root_dir: tempfile::TempDir,
    store: Store,
    _store_dir: tempfile::TempDir,
}

fn write_message(root: &Path, filename: &str, content: &[u8]) -> PathBuf {
    let cur = root.join("cur");
    fs::create_dir_all(&cur).unwrap();
    let path = cur.join(filename);
    fs::write(&path, content).unwrap();
    path
}

/// Build an RFC 5322 message, padding the body with filler bytes until the
/// whole file reaches `target_size`, so size-range scenarios get an exact,
/// arithmetic-derived byte count instead of a guessed literal.
fn build_message(
    subject: &str,
    from: &str,
    date: &str,
    precedence: Option<&str>,
    body: &str,
    target_size: Option<usize>,
) -> Vec<u8> {
    let mut msg = String::new();
    msg.push_str(&format!("From: {}\r\n", from));
    msg.push_str("To: reader@example.com\r\n");
    msg.push_str(&format!("Subject: {}\r\n", subject));
    msg.push_str(&format!("Date: {}\r\n", date));
    msg.push_str(&format!(
        "Message-Id: <{}@example.com>\r\n",
        subject.split_whitespace().next().unwrap_or("msg")
    ));
    if let Some(prec) = precedence {
        msg.push_str(&format!("Precedence: {}\r\n", prec));
    }
    msg.push_str("\r\n");
    msg.push_str(body);

    let mut bytes = msg.into_bytes();
    if let Some(target) = target_size {
        while bytes.len() < target {
            bytes.push(b'z');
        }
    }
    bytes
}

fn build_corpus(root: &Path) {
    // 1: contains "gcc" in subject, dated inside the query-5 range.
    write_message(
        root,
        "gcc:2,S",
        &build_message(
            "gcc compiler benchmarks",
            "Dev One <dev1@example.com>",
            "Fri, 01 Aug 2008 12:00:00 +0000",
            None,
            "benchmark results attached",
            None,
        ),
    );
    // 2: contains "lisp" in subject.
    write_message(
        root,
        "lisp:2,S",
        &build_message(
            "lisp hacking session",
            "Dev Two <dev2@example.com>",
            "Sun, 01 Jun 2008 09:00:00 +0000",
            None,
            "notes from tonight's session",
            None,
        ),
    );
    // 3: contains both "scheme" and "elisp" in subject.
    write_message(
        root,
        "scheme-elisp:2,S",
        &build_message(
            "scheme elisp mode for emacs",
            "Dev Three <dev3@example.com>",
            "Sat, 02 Aug 2008 08:00:00 +0000",
            None,
            "a minor mode for editing scheme",
            None,
        ),
    );
    // 4-6: "basic" in subject or body.
    write_message(
        root,
        "basic1:2,S",
        &build_message(
            "basic intro to functional programming",
            "Teacher <teacher@example.com>",
            "Mon, 03 Mar 2008 10:00:00 +0000",
            None,
            "an introduction",
            None,
        ),
    );
    write_message(
        root,
        "basic2:2,S",
        &build_message(
            "a guide for newcomers",
            "Teacher <teacher@example.com>",
            "Tue, 04 Mar 2008 10:00:00 +0000",
            None,
            "this is a Basic guide covering the fundamentals",
            None,
        ),
    );
    write_message(
        root,
        "basic3:2,S",
        &build_message(
            "Basic types overview",
            "Teacher <teacher@example.com>",
            "Wed, 05 Mar 2008 10:00:00 +0000",
            None,
            "covers primitive types",
            None,
        ),
    );
    // 7: high priority via Precedence.
    write_message(
        root,
        "urgent:2,S",
        &build_message(
            "server is down",
            "Ops <ops@example.com>",
            "Thu, 06 Mar 2008 10:00:00 +0000",
            Some("high"),
            "please respond immediately",
            None,
        ),
    );
    // 8: non-ASCII From display name.
    write_message(
        root,
        "mu:2,S",
        &build_message(
            "greetings",
            "M\u{fc} <mu@example.com>",
            "Fri, 07 Mar 2008 10:00:00 +0000",
            None,
            "hello from the sender",
            None,
        ),
    );
    // 9-10: sized into [2000, 4000] bytes.
    write_message(
        root,
        "sized1:2,S",
        &build_message(
            "quarterly report",
            "Finance <finance@example.com>",
            "Mon, 10 Mar 2008 10:00:00 +0000",
            None,
            "see attached figures\r\n",
            Some(2500),
        ),
    );
    write_message(
        root,
        "sized2:2,S",
        &build_message(
            "annual summary",
            "Finance <finance@example.com>",
            "Tue, 11 Mar 2008 10:00:00 +0000",
            None,
            "see attached figures\r\n",
            Some(3500),
        ),
    );
    // 11-12: plain filler messages, small, unrelated to any scenario term.
    write_message(
        root,
        "plain1:2,S",
        &build_message(
            "weekly standup notes",
            "Pm <pm@example.com>",
            "Wed, 12 Mar 2008 10:00:00 +0000",
            None,
            "nothing notable this week",
            None,
        ),
    );
    write_message(
        root,
        "plain2:2,S",
        &build_message(
            "lunch plans",
            "Pm <pm@example.com>",
            "Thu, 13 Mar 2008 10:00:00 +0000",
            None,
            "sushi at noon?",
            None,
        ),
    );
    // 13: slated for deletion in the cleanup scenario.
    write_message(
        root,
        "ephemeral:2,S",
        &build_message(
            "to be deleted",
            "Pm <pm@example.com>",
            "Fri, 14 Mar 2008 10:00:00 +0000",
            None,
            "this message goes away",
            None,
        ),
    );
}

fn setup() -> Fixture {
    let root_dir = tempfile::tempdir().unwrap();
    let root = root_dir.path().to_path_buf();
    build_corpus(&root);

    let store_dir = tempfile::tempdir().unwrap();
    let store = Store::open(&store_dir.path().join("index.sqlite"), StoreOpenMode::ReadWrite).unwrap();

    let indexer = Indexer::new(root.clone());
    indexer.start(&store, &IndexerConfig::default()).unwrap();

    Fixture {
        root,
        _root_dir: root_dir,
        store,
        _store_dir: store_dir,
    }
}

#[test]
fn scenario_1_empty_query_matches_all() {
    let fx = setup();
    let result = query::run(&fx.store, "", None, true, None).unwrap();
    assert_eq!(result.len(), 13);
}

#[test]
fn scenario_2_basic_term_matches_three() {
    let fx = setup();
    let result = query::run(&fx.store, "basic", None, true, None).unwrap();
    assert_eq!(result.len(), 3);
    for hit in result {
        let haystack = format!("{} {}", hit.subject, hit.load_full(false).unwrap().body_text).to_lowercase();
        assert!(haystack.contains("basic"));
    }
}

#[test]
fn scenario_3_subject_or_matches_two() {
    let fx = setup();
    let result = query::run(&fx.store, "subject:gcc OR subject:lisp", None, true, None).unwrap();
    assert_eq!(result.len(), 2);
}

#[test]
fn scenario_4_grouped_and_or() {
    let fx = setup();
    let result = query::run(
        &fx.store,
        "(subject:gcc OR subject:scheme) AND subject:elisp",
        None,
        true,
        None,
    )
    .unwrap();
    assert_eq!(result.len(), 1);
}

#[test]
fn scenario_5_date_range_and_subject() {
    let fx = setup();
    let result = query::run(&fx.store, "date:20080731..20080804 subject:gcc", None, true, None).unwrap();
    assert_eq!(result.len(), 1);
}

#[test]
fn scenario_6_size_range() {
    let fx = setup();
    let result = query::run(&fx.store, "size:2k..4k", None, true, None).unwrap();
    assert_eq!(result.len(), 2);
    for hit in result {
        assert!(hit.size >= 2000 && hit.size <= 4000);
    }
}

#[test]
fn scenario_7_cleanup_removes_deleted_file() {
    let fx = setup();
    assert_eq!(fx.store.count().unwrap(), 13);

    fs::remove_file(fx.root.join("cur/ephemeral:2,S")).unwrap();

    let indexer = Indexer::new(fx.root.clone());
    indexer.start(&fx.store, &IndexerConfig::default()).unwrap();

    assert_eq!(indexer.progress().removed, 1);
    assert_eq!(fx.store.count().unwrap(), 12);
}

#[test]
fn scenario_8_priority_field() {
    let fx = setup();
    let result = query::run(&fx.store, "prio:high", None, true, None).unwrap();
    let hits: Vec<_> = result.collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].priority.as_str(), "high");
}

#[test]
fn scenario_9_unicode_from_field() {
    let fx = setup();
    let result = query::run(&fx.store, "f:m\u{fc}", None, true, None).unwrap();
    let hits: Vec<_> = result.collect();
    assert_eq!(hits.len(), 1);
    let full = hits[0].load_full(false).unwrap();
    let from = full.from.unwrap();
    assert!(from.decoded().to_lowercase().contains("m\u{fc}"));
}

#[test]
fn indexing_is_idempotent() {
    let fx = setup();
    let before = fx.store.count().unwrap();
    let indexer = Indexer::new(fx.root.clone());
    indexer.start(&fx.store, &IndexerConfig::default()).unwrap();
    assert_eq!(fx.store.count().unwrap(), before);
}

#[test]
fn contact_frequency_counts_one_per_message() {
    let fx = setup();
    let pm = fx.store.contact("pm@example.com").unwrap();
    assert_eq!(pm.frequency, 3);
}
