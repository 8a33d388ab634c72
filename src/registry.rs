//! The Field Registry (component A): a static, process-wide table describing
//! every indexable field. Centralizing this metadata is what lets the
//! Parser, Store, and Query Engine agree on how a field is named, stored,
//! and addressed from the query language without drifting apart — adding a
//! field is a one-row change to [`FIELDS`].

/// A dense, stable identifier for each field. The discriminant order here
/// doubles as the iteration order `for_each` consumers see; it is not
/// meaningful beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FieldId {
    From = 0,
    To,
    Cc,
    Bcc,
    Subject,
    BodyText,
    Maildir,
    Path,
    MessageId,
    References,
    Tags,
    Date,
    Size,
    Priority,
    Flags,
}

impl FieldId {
    pub const ALL: [FieldId; 15] = [
        FieldId::From,
        FieldId::To,
        FieldId::Cc,
        FieldId::Bcc,
        FieldId::Subject,
        FieldId::BodyText,
        FieldId::Maildir,
        FieldId::Path,
        FieldId::MessageId,
        FieldId::References,
        FieldId::Tags,
        FieldId::Date,
        FieldId::Size,
        FieldId::Priority,
        FieldId::Flags,
    ];

    pub fn as_index(self) -> usize {
        self as u8 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Timestamp,
    ByteSize,
    Address,
    StringList,
}

/// Storage capability flags, per spec.md §4.A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Tokens participate in free-text search.
    pub indexed_as_text: bool,
    /// Exact-match lookup via a prefixed term.
    pub stored_as_term: bool,
    /// Retrievable verbatim and usable for sort/range.
    pub stored_as_value: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub id: FieldId,
    pub kind: FieldKind,
    pub name: &'static str,
    pub shortcut: char,
    /// Storage prefix namespacing this field's terms in the index. `None`
    /// for fields that are never stored as terms.
    pub prefix: Option<&'static str>,
    pub caps: Capabilities,
}

const fn cap(indexed_as_text: bool, stored_as_term: bool, stored_as_value: bool) -> Capabilities {
    Capabilities {
        indexed_as_text,
        stored_as_term,
        stored_as_value,
    }
}

/// The fixed set of indexable fields. Order matches [`FieldId::ALL`].
pub static FIELDS: [Field; 15] = [
    Field {
        id: FieldId::From,
        kind: FieldKind::Address,
        name: "from",
        shortcut: 'f',
        prefix: Some("F"),
        caps: cap(true, false, true),
    },
    Field {
        id: FieldId::To,
        kind: FieldKind::Address,
        name: "to",
        shortcut: 't',
        prefix: Some("T"),
        caps: cap(true, false, true),
    },
    Field {
        id: FieldId::Cc,
        kind: FieldKind::Address,
        name: "cc",
        shortcut: 'c',
        prefix: Some("C"),
        caps: cap(true, false, true),
    },
    Field {
        id: FieldId::Bcc,
        kind: FieldKind::Address,
        name: "bcc",
        shortcut: 'j',
        prefix: Some("J"),
        caps: cap(true, false, true),
    },
    Field {
        id: FieldId::Subject,
        kind: FieldKind::Text,
        name: "subject",
        shortcut: 's',
        prefix: Some("S"),
        caps: cap(true, false, true),
    },
    Field {
        id: FieldId::BodyText,
        kind: FieldKind::Text,
        name: "body",
        shortcut: 'b',
        prefix: None,
        caps: cap(true, false, false),
    },
    Field {
        id: FieldId::Maildir,
        kind: FieldKind::Text,
        name: "maildir",
        shortcut: 'm',
        prefix: Some("M"),
        caps: cap(false, true, true),
    },
    Field {
        id: FieldId::Path,
        kind: FieldKind::Text,
        name: "path",
        shortcut: 'l',
        prefix: Some("L"),
        caps: cap(false, true, true),
    },
    Field {
        id: FieldId::MessageId,
        kind: FieldKind::Text,
        name: "msgid",
        shortcut: 'i',
        prefix: Some("I"),
        caps: cap(false, true, false),
    },
    Field {
        id: FieldId::References,
        kind: FieldKind::StringList,
        name: "references",
        shortcut: 'r',
        prefix: Some("R"),
        caps: cap(false, true, true),
    },
    Field {
        id: FieldId::Tags,
        kind: FieldKind::StringList,
        name: "tag",
        shortcut: 'k',
        prefix: Some("K"),
        caps: cap(false, true, true),
    },
    Field {
        id: FieldId::Date,
        kind: FieldKind::Timestamp,
        name: "date",
        shortcut: 'd',
        prefix: None,
        caps: cap(false, false, true),
    },
    Field {
        id: FieldId::Size,
        kind: FieldKind::ByteSize,
        name: "size",
        shortcut: 'z',
        prefix: None,
        caps: cap(false, false, true),
    },
    Field {
        id: FieldId::Priority,
        kind: FieldKind::Integer,
        name: "prio",
        shortcut: 'p',
        prefix: None,
        caps: cap(false, false, true),
    },
    Field {
        id: FieldId::Flags,
        kind: FieldKind::Integer,
        name: "flags",
        shortcut: 'g',
        prefix: None,
        caps: cap(false, false, true),
    },
];

pub fn by_id(id: FieldId) -> &'static Field {
    &FIELDS[id.as_index()]
}

pub fn by_name(name: &str) -> Option<&'static Field> {
    FIELDS.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

pub fn by_shortcut(shortcut: char) -> Option<&'static Field> {
    FIELDS.iter().find(|f| f.shortcut == shortcut)
}

/// Resolve either a full field name or a single-character shortcut, as the
/// query language's `name:value` / `shortcut:value` forms require.
pub fn resolve(name_or_shortcut: &str) -> Option<&'static Field> {
    if let Some(f) = by_name(name_or_shortcut) {
        return Some(f);
    }
    let mut chars = name_or_shortcut.chars();
    let first = chars.next()?;
    if chars.next().is_none() {
        by_shortcut(first)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for f in &FIELDS {
            assert!(seen.insert(f.shortcut), "duplicate shortcut {:?}", f.shortcut);
        }
    }

    #[test]
    fn names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for f in &FIELDS {
            assert!(seen.insert(f.name), "duplicate name {:?}", f.name);
        }
    }

    #[test]
    fn by_id_round_trips() {
        for id in FieldId::ALL {
            assert_eq!(by_id(id).id, id);
        }
    }

    #[test]
    fn resolve_handles_name_and_shortcut() {
        assert_eq!(resolve("subject").unwrap().id, FieldId::Subject);
        assert_eq!(resolve("s").unwrap().id, FieldId::Subject);
        assert!(resolve("nonexistent").is_none());
        assert!(resolve("ss").is_none());
    }
}
