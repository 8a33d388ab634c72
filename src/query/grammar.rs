//! The query expression grammar (spec.md §4.F): a `peg::parser!` grammar in
//! the style `kevinboulain-sin/source/imap.rs` uses for its IMAP command
//! grammar, compiling a normalized expression string into an [`Expr`] tree.

use chrono::{Local, NaiveDate, TimeZone};

use crate::registry::{self, Field, FieldId, FieldKind};

/// The parsed query tree. Boolean structure is explicit; leaves resolve
/// field names against the registry at parse time so execution never has
/// to.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    All,
    /// A bare free-text word, matched against the unprefixed token index.
    Term(String),
    /// `field:word` or `field:"phrase"` — an exact token match scoped to
    /// one field (ANDed across every word in a phrase).
    FieldWord { field: &'static Field, word: String },
    /// `field:word*` — a prefix match scoped to one field.
    FieldPrefix { field: &'static Field, prefix: String },
    /// `field:a..b`, endpoints already resolved to their field's native
    /// integer representation (epoch seconds, bytes, or raw integer).
    Range { field: &'static Field, lo: i64, hi: i64 },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// Render the parenthesized AST the way `mu-cmd-find.c`'s `--xquery` dumps
/// the Xapian query tree, for [`crate::query::exec::explain`].
pub fn render(expr: &Expr) -> String {
    match expr {
        Expr::All => "(ALL)".to_owned(),
        Expr::Term(word) => format!("(TERM {})", word),
        Expr::FieldWord { field, word } => format!("(TERM {}:{})", field.name, word),
        Expr::FieldPrefix { field, prefix } => format!("(PREFIX {}:{}*)", field.name, prefix),
        Expr::Range { field, lo, hi } => format!("(RANGE {}:{}..{})", field.name, lo, hi),
        Expr::And(a, b) => format!("(AND {} {})", render(a), render(b)),
        Expr::Or(a, b) => format!("(OR {} {})", render(a), render(b)),
        Expr::Not(a) => format!("(NOT {})", render(a)),
    }
}

/// Preprocess the raw user input before parsing (spec.md §4.F):
/// non-alphanumeric/underscore/hyphen/colon/dot/quote/paren/asterisk/
/// whitespace characters become `_`; bracketed tokens like `[Gmail]`
/// become `__gmail__`; everything outside quoted phrases is lowercased.
/// Idempotent: re-running this on its own output is a no-op.
pub fn preprocess(input: &str) -> String {
    let bracketed = replace_bracketed_tokens(input);
    let mut out = String::with_capacity(bracketed.len());
    let mut in_quotes = false;
    for c in bracketed.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            out.push(c);
            continue;
        }
        if in_quotes {
            out.push(c);
            continue;
        }
        if is_allowed(c) {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    out
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '_' | '-' | ':' | '.' | '"' | '(' | ')' | '*' | ' ' | '\t' | '\n' | '\r'
        )
}

fn replace_bracketed_tokens(input: &str) -> String {
    let mut out = String::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '[' {
            out.push(c);
            continue;
        }
        let mut inner = String::new();
        let mut closed = false;
        while let Some(nc) = chars.next() {
            if nc == ']' {
                closed = true;
                break;
            }
            inner.push(nc);
        }
        if !closed {
            out.push('[');
            out.push_str(&inner);
            continue;
        }
        out.push_str("__");
        for ic in inner.chars() {
            out.push(if ic.is_alphanumeric() { ic.to_ascii_lowercase() } else { '_' });
        }
        out.push_str("__");
    }
    out
}

/// Resolve a numeric range bound against a field's native representation:
/// dates to epoch seconds, byte sizes with SI `k`/`m` suffixes, everything
/// else as a plain integer. Matches `mu-util.c`'s multiplier table
/// (1000/1_000_000, SI — not binary 1024/1048576).
pub fn resolve_bound(field: &Field, raw: &str) -> Option<i64> {
    match field.kind {
        FieldKind::Timestamp => resolve_date_bound(raw),
        FieldKind::ByteSize => resolve_size_bound(raw),
        FieldKind::Integer if field.id == FieldId::Priority => {
            crate::flags::Priority::from_str_loose(raw).map(|p| p.to_i64()).or_else(|| raw.parse::<i64>().ok())
        }
        _ => raw.parse::<i64>().ok(),
    }
}

fn resolve_size_bound(raw: &str) -> Option<i64> {
    let lower = raw.to_ascii_lowercase();
    let (digits, multiplier) = if let Some(stripped) = lower.strip_suffix('k') {
        (stripped, 1_000i64)
    } else if let Some(stripped) = lower.strip_suffix('m') {
        (stripped, 1_000_000i64)
    } else {
        (lower.as_str(), 1i64)
    };
    digits.parse::<i64>().ok().map(|n| n * multiplier)
}

fn resolve_date_bound(raw: &str) -> Option<i64> {
    let lower = raw.to_ascii_lowercase();
    if lower == "now" {
        return Some(Local::now().timestamp());
    }
    if lower == "today" {
        let midnight = Local::now().date_naive().and_hms_opt(0, 0, 0)?;
        return Local.from_local_datetime(&midnight).single().map(|dt| dt.timestamp());
    }
    if let Some(ts) = parse_compact_datetime(&lower) {
        return Some(ts);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&lower, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Local.from_local_datetime(&midnight).single().map(|dt| dt.timestamp());
    }
    None
}

/// `YYYYMMDD` or `YYYYMMDDHHMMSS`.
fn parse_compact_datetime(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != raw.len() {
        return None;
    }
    match digits.len() {
        8 => {
            let date = NaiveDate::parse_from_str(&digits, "%Y%m%d").ok()?;
            let midnight = date.and_hms_opt(0, 0, 0)?;
            Local.from_local_datetime(&midnight).single().map(|dt| dt.timestamp())
        }
        14 => {
            let naive = chrono::NaiveDateTime::parse_from_str(&digits, "%Y%m%d%H%M%S").ok()?;
            Local.from_local_datetime(&naive).single().map(|dt| dt.timestamp())
        }
        _ => None,
    }
}

fn word_sequence(field: Option<&'static Field>, words: &[String]) -> Expr {
    let make = |word: &str| match field {
        Some(f) => Expr::FieldWord { field: f, word: word.to_owned() },
        None => Expr::Term(word.to_owned()),
    };
    let mut iter = words.iter();
    let first = match iter.next() {
        Some(w) => make(w),
        None => return Expr::All,
    };
    iter.fold(first, |acc, w| Expr::And(Box::new(acc), Box::new(make(w))))
}

fn tokenize_phrase(phrase: &str) -> Vec<String> {
    phrase
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

peg::parser! {
    pub grammar query_grammar() for str {
        rule _() = quiet!{[' ' | '\t' | '\n' | '\r']*}

        rule ident_char() -> char
            = c:[_] {? if c.is_alphanumeric() || c == '_' || c == '.' { Ok(c) } else { Err("ident_char") } }

        rule ident() -> &'input str
            = $(ident_char()+)

        rule field_name() -> &'input str
            = $(['a'..='z']+)

        rule range_bound() -> &'input str
            = $(['a'..='z' | 'A'..='Z' | '0'..='9' | '-']+)

        rule kw_or() -> () = "or" !ident_char()
        rule kw_and() -> () = "and" !ident_char()
        rule kw_not() -> () = "not" !ident_char()

        rule quoted_phrase() -> String
            = "\"" s:$([^'"']*) "\"" { s.to_string() }

        rule wildcard_value() -> String
            = s:ident() "*" { s.to_string() }

        rule range_expr() -> Expr
            = f:field_name() ":" a:range_bound() ".." b:range_bound() {
                build_range(f, a, b)
            }

        rule field_term() -> Expr
            = f:field_name() ":" p:wildcard_value() {
                build_field_prefix(f, &p)
            }
            / f:field_name() ":" v:quoted_phrase() {
                build_field_words(f, &tokenize_phrase(&v))
            }
            / f:field_name() ":" v:ident() {
                build_field_words(f, &[v.to_owned()])
            }

        rule bare_term() -> Expr
            = v:quoted_phrase() { word_sequence(None, &tokenize_phrase(&v)) }
            / v:wildcard_value() { Expr::FieldPrefix { field: registry::by_id(FieldId::BodyText), prefix: v } }
            / v:ident() { Expr::Term(v.to_lowercase()) }

        rule atom() -> Expr
            = "(" _ e:disjunction() _ ")" { e }
            / range_expr()
            / field_term()
            / bare_term()

        rule negation() -> Expr
            = kw_not() _ e:negation() { Expr::Not(Box::new(e)) }
            / "-" e:negation() { Expr::Not(Box::new(e)) }
            / atom()

        rule conjunction() -> Expr
            = first:negation() rest:(_ kw_and() _ e:negation() { e } / _ !kw_or() e:negation() { e })* {
                rest.into_iter().fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e)))
            }

        pub rule disjunction() -> Expr
            = first:conjunction() rest:(_ kw_or() _ e:conjunction() { e })* {
                rest.into_iter().fold(first, |acc, e| Expr::Or(Box::new(acc), Box::new(e)))
            }

        rule eof() = ![_]

        pub rule top() -> Expr
            = _ e:disjunction() _ eof() { e }
            / _ eof() { Expr::All }
    }
}

fn build_range(field_name: &str, a: &str, b: &str) -> Expr {
    let field = match registry::resolve(field_name) {
        Some(f) if f.caps.stored_as_value => f,
        _ => return word_sequence(None, &[field_name.to_owned(), a.to_owned(), b.to_owned()]),
    };
    let bounds = (resolve_bound(field, a), resolve_bound(field, b));
    let (lo_raw, hi_raw) = match bounds {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => return word_sequence(None, &[field_name.to_owned(), a.to_owned(), b.to_owned()]),
    };
    let (lo, hi) = if hi_raw < lo_raw { (hi_raw, lo_raw) } else { (lo_raw, hi_raw) };
    Expr::Range { field, lo, hi }
}

fn build_field_prefix(field_name: &str, prefix: &str) -> Expr {
    match registry::resolve(field_name) {
        Some(field) if field.caps.indexed_as_text || field.caps.stored_as_term => Expr::FieldPrefix {
            field,
            prefix: prefix.to_lowercase(),
        },
        _ => word_sequence(None, &[field_name.to_owned(), prefix.to_owned()]),
    }
}

fn build_field_words(field_name: &str, words: &[String]) -> Expr {
    match registry::resolve(field_name) {
        Some(field) if field.caps.indexed_as_text || field.caps.stored_as_term => {
            word_sequence(Some(field), &words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>())
        }
        Some(field) if field.kind == FieldKind::Integer || field.kind == FieldKind::Timestamp || field.kind == FieldKind::ByteSize => {
            match words.first().and_then(|w| resolve_bound(field, w)) {
                Some(v) => Expr::Range { field, lo: v, hi: v },
                None => word_sequence(None, &std::iter::once(field_name.to_owned()).chain(words.iter().cloned()).collect::<Vec<_>>()),
            }
        }
        _ => word_sequence(None, &std::iter::once(field_name.to_owned()).chain(words.iter().cloned()).collect::<Vec<_>>()),
    }
}

/// Parse a preprocessed expression string into an [`Expr`] tree. Empty
/// input matches all documents (spec.md §4.F).
pub fn parse(preprocessed: &str) -> Result<Expr, peg::error::ParseError<peg::str::LineCol>> {
    if preprocessed.trim().is_empty() {
        return Ok(Expr::All);
    }
    query_grammar::top(preprocessed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_expression_matches_all() {
        assert_eq!(parse("").unwrap(), Expr::All);
    }

    #[test]
    fn bracketed_tokens_are_normalized() {
        assert_eq!(preprocess("[Gmail]/Sent"), "__gmail__/sent");
    }

    #[test]
    fn preprocess_is_idempotent() {
        let once = preprocess("Subject: GCC AND Lisp!");
        let twice = preprocess(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn parses_field_term() {
        let expr = parse("subject:gcc").unwrap();
        match expr {
            Expr::FieldWord { field, word } => {
                assert_eq!(field.name, "subject");
                assert_eq!(word, "gcc");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_boolean_or() {
        let expr = parse("subject:gcc or subject:lisp").unwrap();
        assert!(matches!(expr, Expr::Or(_, _)));
    }

    #[test]
    fn juxtaposition_is_and() {
        let expr = parse("gcc lisp").unwrap();
        assert!(matches!(expr, Expr::And(_, _)));
    }

    #[test]
    fn negation_both_forms() {
        assert!(matches!(parse("not gcc").unwrap(), Expr::Not(_)));
        assert!(matches!(parse("-gcc").unwrap(), Expr::Not(_)));
    }

    #[test]
    fn priority_word_resolves_to_level() {
        let expr = parse("prio:high").unwrap();
        match expr {
            Expr::Range { lo, hi, field } => {
                assert_eq!(field.name, "prio");
                assert_eq!(lo, 2);
                assert_eq!(hi, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn size_suffix_range() {
        let expr = parse("size:2k..4k").unwrap();
        match expr {
            Expr::Range { lo, hi, .. } => {
                assert_eq!(lo, 2000);
                assert_eq!(hi, 4000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
