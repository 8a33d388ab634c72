//! Recipient address-list parsing, split out from `mod.rs` since every one
//! of From/To/Cc/Bcc goes through the same normalization.

use mailparse::{addrparse, MailAddr};

use crate::model::Address;

/// Parse a raw header value into an address list. Whitespace-only input
/// (or input that fails to parse at all) becomes an empty list rather than
/// an error, per spec.md §4.C.
pub fn parse_address_list(raw: &str) -> Vec<Address> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match addrparse(raw) {
        Ok(list) => {
            let mut out = Vec::new();
            flatten(&list, &mut out);
            out
        }
        Err(_) => Vec::new(),
    }
}

fn flatten(list: &mailparse::MailAddrList, out: &mut Vec<Address>) {
    for addr in list.iter() {
        match addr {
            MailAddr::Single(info) => {
                out.push(Address::new(info.display_name.clone(), info.addr.clone()));
            }
            MailAddr::Group(group) => {
                for info in &group.addrs {
                    out.push(Address::new(info.display_name.clone(), info.addr.clone()));
                }
            }
        }
    }
}

/// Parse a single address (From), taking the first entry if several are
/// present (a malformed From occasionally lists more than one mailbox).
pub fn parse_single_address(raw: &str) -> Option<Address> {
    parse_address_list(raw).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_is_empty() {
        assert!(parse_address_list("   ").is_empty());
    }

    #[test]
    fn parses_display_name_and_addr() {
        let addrs = parse_address_list("J. Doe <j@example.com>");
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].addr, "j@example.com");
        assert_eq!(addrs[0].display_name.as_deref(), Some("J. Doe"));
    }

    #[test]
    fn flattens_groups() {
        let addrs = parse_address_list("undisclosed-recipients: a@b.c, d@e.f;");
        assert_eq!(addrs.len(), 2);
    }
}
