//! The Message Parser (component C): turns a single maildir file into a
//! [`MessageRecord`]. Grounded in `MaildirExtension::get_mails`'s header and
//! body handling, generalized to the full field set spec.md §4.C asks for.

pub mod address;
pub mod body;

use std::fs;
use std::path::Path;

use mailparse::{parse_mail, MailHeaderMap};

use crate::error::ParseError;
use crate::flags::{Flags, Priority};
use crate::model::MessageRecord;

use address::{parse_address_list, parse_single_address};
use body::{asciify_bytes, extract_body_text, has_attachment, is_encrypted, is_signed};

/// Ordered substring table used to derive [`Priority`] from the first of
/// Precedence/X-Priority/Importance that carries a value. Checked in this
/// exact order; the first substring found anywhere in the lowercased header
/// value wins (spec.md §4.C).
const PRIORITY_TABLE: &[(&str, Priority)] = &[
    ("high", Priority::High),
    ("1", Priority::High),
    ("2", Priority::High),
    ("normal", Priority::Normal),
    ("3", Priority::Normal),
    ("low", Priority::Low),
    ("list", Priority::Low),
    ("bulk", Priority::Low),
    ("4", Priority::Low),
    ("5", Priority::Low),
];

const PRIORITY_HEADERS: [&str; 3] = ["Precedence", "X-Priority", "Importance"];

/// Parse the message at `path` into a [`MessageRecord`].
///
/// `relative_maildir` is the folder path as produced by the walker;
/// `in_new` tells us whether the file was found under `new/` (used to set
/// the `New` pseudo-flag, since an unread message moved to `cur/` without
/// a `S` flag is still new in the maildir sense).
pub fn parse(path: &Path, relative_maildir: &str, in_new: bool) -> Result<MessageRecord, ParseError> {
    let meta = fs::metadata(path).map_err(|e| ParseError::FileUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    if !meta.is_file() {
        return Err(ParseError::NotRegularFile);
    }
    let raw = fs::read(path).map_err(|e| ParseError::FileUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mail = parse_mail(&raw).map_err(|e| ParseError::MimeParseFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let headers = &mail.headers;

    let message_id = decoded_header(headers, "Message-Id")
        .unwrap_or_default()
        .trim_matches(|c| c == '<' || c == '>')
        .to_owned();
    let subject = decoded_header(headers, "Subject").unwrap_or_default();

    let from = headers
        .get_first_value("From")
        .and_then(|raw| parse_single_address(&raw));
    let to = headers
        .get_first_value("To")
        .map(|raw| parse_address_list(&raw))
        .unwrap_or_default();
    let cc = headers
        .get_first_value("Cc")
        .map(|raw| parse_address_list(&raw))
        .unwrap_or_default();
    let bcc = headers
        .get_first_value("Bcc")
        .map(|raw| parse_address_list(&raw))
        .unwrap_or_default();

    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let size = meta.len();

    let date = headers
        .get_first_value("Date")
        .and_then(|raw| mailparse::dateparse(&raw).ok())
        .unwrap_or(mtime);

    let priority = parse_priority(headers);

    let filename_flags = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .and_then(|name| {
            name.rsplit_once(":2,")
                .map(|(_, suffix)| Flags::from_maildir_chars(suffix))
        })
        .unwrap_or_else(Flags::empty);
    let mut flags = filename_flags;
    if in_new {
        flags |= Flags::NEW;
    }
    if has_attachment(&mail) {
        flags |= Flags::HAS_ATTACH;
    }
    if is_signed(&mail) {
        flags |= Flags::SIGNED;
    }
    if is_encrypted(&mail) {
        flags |= Flags::ENCRYPTED;
    }

    let body_text = extract_body_text(&mail);
    let references = parse_references(headers);
    let tags = parse_tags(headers);

    Ok(MessageRecord {
        path: path.to_path_buf(),
        relative_maildir: relative_maildir.to_owned(),
        mtime,
        size,
        message_id,
        subject,
        from,
        to,
        cc,
        bcc,
        date,
        priority,
        flags,
        body_text,
        references,
        tags,
        has_attachment: flags.contains(Flags::HAS_ATTACH),
    })
}

/// Decode a header's value, falling back to asciifying its raw bytes if
/// RFC 2047 decoding or UTF-8 validation fails (spec.md §4.C).
fn decoded_header(headers: &[mailparse::MailHeader], name: &str) -> Option<String> {
    let header = headers.iter().find(|h| h.get_key_ref().eq_ignore_ascii_case(name))?;
    match header.get_value() {
        Ok(v) => Some(v),
        Err(_) => Some(asciify_bytes(header.get_value_raw())),
    }
}

fn parse_priority(headers: &[mailparse::MailHeader]) -> Priority {
    for name in PRIORITY_HEADERS {
        if let Some(value) = headers.get_first_value(name) {
            if value.trim().is_empty() {
                continue;
            }
            let lower = value.to_ascii_lowercase();
            for (needle, prio) in PRIORITY_TABLE {
                if lower.contains(needle) {
                    return *prio;
                }
            }
            return Priority::Normal;
        }
    }
    Priority::Normal
}

/// Harvest References (oldest-first already, by RFC convention) and append
/// the In-Reply-To id if it isn't already present, preserving the
/// oldest-first order. Later duplicates are dropped.
fn parse_references(headers: &[mailparse::MailHeader]) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(raw) = headers.get_first_value("References") {
        for id in extract_msgids(&raw) {
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    if let Some(raw) = headers.get_first_value("In-Reply-To") {
        for id in extract_msgids(&raw) {
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

fn extract_msgids(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .filter_map(|tok| {
            let trimmed = tok.trim_matches(|c| c == ',' || c == ';');
            if trimmed.starts_with('<') && trimmed.ends_with('>') {
                Some(trimmed.to_owned())
            } else {
                None
            }
        })
        .collect()
}

fn parse_tags(headers: &[mailparse::MailHeader]) -> Vec<String> {
    headers
        .get_first_value("X-Label")
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_msg(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    #[test]
    fn parses_basic_headers() {
        let dir = tempfile::tempdir().unwrap();
        let msg = b"From: Alice <alice@example.com>\r\nTo: bob@example.com\r\nSubject: hello\r\nMessage-Id: <abc@example.com>\r\nDate: Mon, 1 Jan 2024 00:00:00 +0000\r\n\r\nbody text";
        let path = write_msg(&dir, "1:2,S", msg);
        let record = parse(&path, "/", false).unwrap();
        assert_eq!(record.subject, "hello");
        assert_eq!(record.message_id, "abc@example.com");
        assert_eq!(record.from.unwrap().addr, "alice@example.com");
        assert_eq!(record.to.len(), 1);
        assert!(record.flags.contains(Flags::SEEN));
        assert!(!record.flags.contains(Flags::NEW));
        assert_eq!(record.body_text, "body text");
    }

    #[test]
    fn precedence_beats_x_priority() {
        let dir = tempfile::tempdir().unwrap();
        let msg = b"Precedence: bulk\r\nX-Priority: 1\r\nSubject: s\r\n\r\nb";
        let path = write_msg(&dir, "1:2,", msg);
        let record = parse(&path, "/", true).unwrap();
        assert_eq!(record.priority, Priority::Low);
        assert!(record.flags.contains(Flags::NEW));
    }

    #[test]
    fn references_append_in_reply_to() {
        let dir = tempfile::tempdir().unwrap();
        let msg = b"References: <a@x> <b@x>\r\nIn-Reply-To: <c@x>\r\nSubject: s\r\n\r\nb";
        let path = write_msg(&dir, "1:2,", msg);
        let record = parse(&path, "/", false).unwrap();
        assert_eq!(record.references, vec!["<a@x>", "<b@x>", "<c@x>"]);
    }

    #[test]
    fn directory_path_is_not_a_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse(dir.path(), "/", false).unwrap_err();
        assert!(matches!(err, ParseError::NotRegularFile));
    }

    #[test]
    fn tags_from_x_label() {
        let dir = tempfile::tempdir().unwrap();
        let msg = b"X-Label: work, urgent\r\nSubject: s\r\n\r\nb";
        let path = write_msg(&dir, "1:2,", msg);
        let record = parse(&path, "/", false).unwrap();
        assert_eq!(record.tags, vec!["work", "urgent"]);
    }
}
