//! TLS record-layer and ClientHello/SNI extraction.
//!
//! Two paths, selected per [`crate::config::SniDetection`]: a parser
//! that walks the wire format precisely (the default), and a "brute"
//! path that scans the raw payload against the section's trie without
//! caring whether it is looking at a real TLS record at all.

use crate::config::Section;
use crate::logger::{self, BreadcrumbFlags};
use crate::trie::LookupMode;

const HANDSHAKE_CONTENT_TYPE: u8 = 22;
const CLIENT_HELLO_TYPE: u8 = 0x01;
const SERVER_NAME_EXTENSION: u16 = 0x0000;
const SERVER_NAME_TYPE_HOSTNAME: u8 = 0x00;

/// Result of analyzing one TCP payload against one section.
///
/// `target_sni` false covers every non-match case the original
/// distinguishes internally (truncated record, bad version, no SNI
/// extension, SNI present but excluded) — the engine only ever branches
/// on this one bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsVerdict {
    pub target_sni: bool,
    pub sni_ptr: usize,
    pub sni_len: u16,
    pub target_sni_ptr: usize,
    pub target_sni_len: u16,
}

pub fn analyze_tls_data(section: &Section, payload: &[u8]) -> TlsVerdict {
    if section.sni_detection.is_brute() {
        return analyze_brute(section, payload);
    }
    analyze_parse(section, payload)
}

fn analyze_parse(section: &Section, payload: &[u8]) -> TlsVerdict {
    const RECORD_HEADER_LEN: usize = 5;
    let mut cursor = 0usize;

    while cursor + RECORD_HEADER_LEN <= payload.len() {
        let content_type = payload[cursor];
        let version_major = payload[cursor + 1];
        let record_len = u16::from_be_bytes([payload[cursor + 3], payload[cursor + 4]]) as usize;
        let body_start = cursor + RECORD_HEADER_LEN;

        if version_major != 3 {
            logger::breadcrumb(BreadcrumbFlags::TLS, "record version_major != 3, invalid");
            return TlsVerdict::default();
        }

        // The record may legitimately span TCP segments; analyze only
        // what is present in this payload.
        let body_end = payload.len().min(body_start + record_len);

        if content_type == HANDSHAKE_CONTENT_TYPE {
            if let Some(sni) = parse_client_hello(&payload[body_start..body_end]) {
                let sni_ptr = body_start + sni.0;
                let sni_len = sni.1 as u16;
                return sni_to_verdict(section, payload, sni_ptr, sni_len);
            }
        }

        if body_start + record_len > payload.len() {
            // Declared record length runs past what we have; nothing
            // more to walk.
            break;
        }
        cursor = body_start + record_len;
    }

    TlsVerdict::default()
}

/// Descends a single Handshake record body into the ClientHello and
/// returns `(offset, length)` of the SNI hostname relative to the start
/// of `body`, if the record is a well-formed ClientHello carrying one.
fn parse_client_hello(body: &[u8]) -> Option<(usize, usize)> {
    // handshake_type(1) + length(3) + legacy_version(2) + random(32)
    let mut cursor = 1 + 3 + 2 + 32;
    if body.first()? != &CLIENT_HELLO_TYPE {
        return None;
    }
    if cursor > body.len() {
        return None;
    }

    let session_id_len = *body.get(cursor)? as usize;
    cursor += 1 + session_id_len;
    if cursor + 2 > body.len() {
        return None;
    }

    let cipher_suites_len = u16::from_be_bytes([body[cursor], body[cursor + 1]]) as usize;
    cursor += 2 + cipher_suites_len;
    if cursor + 1 > body.len() {
        return None;
    }

    let compression_methods_len = *body.get(cursor)? as usize;
    cursor += 1 + compression_methods_len;
    if cursor + 2 > body.len() {
        return None;
    }

    let extensions_len = u16::from_be_bytes([body[cursor], body[cursor + 1]]) as usize;
    cursor += 2;
    let extensions_end = body.len().min(cursor + extensions_len);

    while cursor + 4 <= extensions_end {
        let ext_type = u16::from_be_bytes([body[cursor], body[cursor + 1]]);
        let ext_len = u16::from_be_bytes([body[cursor + 2], body[cursor + 3]]) as usize;
        cursor += 4;
        if cursor + ext_len > extensions_end {
            return None;
        }
        if ext_type == SERVER_NAME_EXTENSION {
            return parse_server_name_extension(&body[cursor..cursor + ext_len])
                .map(|(offset, len)| (cursor + offset, len));
        }
        cursor += ext_len;
    }
    None
}

fn parse_server_name_extension(ext_body: &[u8]) -> Option<(usize, usize)> {
    if ext_body.len() < 2 {
        return None;
    }
    let list_len = u16::from_be_bytes([ext_body[0], ext_body[1]]) as usize;
    let mut cursor = 2;
    let list_end = ext_body.len().min(2 + list_len);
    if cursor + 3 > list_end {
        return None;
    }
    let name_type = ext_body[cursor];
    let name_len = u16::from_be_bytes([ext_body[cursor + 1], ext_body[cursor + 2]]) as usize;
    cursor += 3;
    if cursor + name_len > list_end || name_type != SERVER_NAME_TYPE_HOSTNAME {
        return None;
    }
    Some((cursor, name_len))
}

fn sni_to_verdict(section: &Section, payload: &[u8], sni_ptr: usize, sni_len: u16) -> TlsVerdict {
    let hostname = &payload[sni_ptr..sni_ptr + sni_len as usize];
    match crate::matcher::match_hostname(section, hostname) {
        Some((target_offset, target_len)) => TlsVerdict {
            target_sni: true,
            sni_ptr,
            sni_len,
            target_sni_ptr: sni_ptr + target_offset,
            target_sni_len: target_len as u16,
        },
        None => TlsVerdict::default(),
    }
}

fn analyze_brute(section: &Section, payload: &[u8]) -> TlsVerdict {
    if section.all_domains && payload.len() > 1 {
        let midpoint = payload.len() / 2;
        return TlsVerdict {
            target_sni: true,
            sni_ptr: midpoint,
            sni_len: 0,
            target_sni_ptr: midpoint,
            target_sni_len: 0,
        };
    }

    match section.sni_domains.lookup(payload, LookupMode::Unanchored) {
        Some((offset, len)) => {
            let excluded = section
                .exclude_sni_domains
                .lookup(payload, LookupMode::Unanchored)
                .is_some();
            if excluded {
                TlsVerdict::default()
            } else {
                TlsVerdict {
                    target_sni: true,
                    sni_ptr: offset,
                    sni_len: len as u16,
                    target_sni_ptr: offset,
                    target_sni_len: len as u16,
                }
            }
        }
        None => TlsVerdict::default(),
    }
}

#[cfg(test)]
mod tests;
