//! Body text extraction and the content-derived flags (HasAttach, Signed,
//! Encrypted), split out from `mod.rs` since both walk the MIME tree.

use mailparse::{DispositionType, ParsedMail};

/// Decode a raw body using its declared charset, falling back to UTF-8
/// validation and then ASCII-only rendering. Mirrors an iconv-with-fallback
/// pipeline: a recognized charset is decoded leniently (invalid sequences
/// become `.`); an unrecognized or absent charset falls through to plain
/// UTF-8 validation, and only then to asciification.
pub fn decode_body(raw: &[u8], charset: &str) -> String {
    let label = charset.trim();
    if !label.is_empty() && !label.eq_ignore_ascii_case("us-ascii") {
        if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
            let (text, _, _had_errors) = encoding.decode(raw);
            return text.replace('\u{FFFD}', ".");
        }
    }
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_owned(),
        Err(_) => asciify_bytes(raw),
    }
}

pub fn asciify_bytes(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| if b < 0x80 { b as char } else { '.' })
        .collect()
}

/// Depth-first search for the first inline `text/plain` part, skipping any
/// part whose disposition is `attachment`. Returns an empty string when no
/// such part exists.
pub fn extract_body_text(mail: &ParsedMail) -> String {
    if let Some(part) = find_first_text_part(mail) {
        let charset = part.ctype.charset.as_str();
        match part.get_body_raw() {
            Ok(raw) => decode_body(&raw, charset),
            Err(_) => String::new(),
        }
    } else {
        String::new()
    }
}

fn find_first_text_part<'a>(mail: &'a ParsedMail<'a>) -> Option<&'a ParsedMail<'a>> {
    if mail.subparts.is_empty() {
        if is_inline_text_plain(mail) {
            return Some(mail);
        }
        return None;
    }
    for sub in &mail.subparts {
        if let Some(found) = find_first_text_part(sub) {
            return Some(found);
        }
    }
    None
}

fn is_inline_text_plain(mail: &ParsedMail) -> bool {
    if !mail.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
        return false;
    }
    mail.get_content_disposition().disposition != DispositionType::Attachment
}

/// True if any part (recursively) looks like an attachment: an explicit
/// `Content-Disposition: attachment`, or an inline part whose content-type
/// is not text (image/*, application/*, message/* are treated as
/// attachments even without an explicit disposition).
pub fn has_attachment(mail: &ParsedMail) -> bool {
    let disposition = mail.get_content_disposition();
    if disposition.disposition == DispositionType::Attachment {
        return true;
    }
    if mail.subparts.is_empty() {
        let mimetype = mail.ctype.mimetype.to_ascii_lowercase();
        let is_body_candidate = mimetype == "text/plain" || mimetype == "text/html";
        return !is_body_candidate && !mimetype.starts_with("multipart/");
    }
    mail.subparts.iter().any(has_attachment)
}

/// Signed/Encrypted are derived from the top-level part's content-type
/// only, not recursively.
pub fn is_signed(mail: &ParsedMail) -> bool {
    mail.ctype.mimetype.to_ascii_lowercase().ends_with("/signed")
}

pub fn is_encrypted(mail: &ParsedMail) -> bool {
    mail.ctype.mimetype.to_ascii_lowercase().ends_with("/encrypted")
}
