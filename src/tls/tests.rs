use super::*;
use crate::config::{Section, SniDetection};
use crate::trie::Trie;

fn section_targeting(domains: &[&str]) -> Section {
    let mut sni_domains = Trie::new();
    for d in domains {
        sni_domains.add(d.as_bytes());
    }
    Section {
        sni_domains,
        sni_detection: SniDetection::Parse,
        ..Section::default()
    }
}

fn client_hello_with_sni(hostname: &[u8]) -> Vec<u8> {
    let mut extension = Vec::new();
    extension.extend_from_slice(&(3 + hostname.len() as u16).to_be_bytes()); // server_name_list length
    extension.push(SERVER_NAME_TYPE_HOSTNAME);
    extension.extend_from_slice(&(hostname.len() as u16).to_be_bytes());
    extension.extend_from_slice(hostname);

    let mut extensions = Vec::new();
    extensions.extend_from_slice(&SERVER_NAME_EXTENSION.to_be_bytes());
    extensions.extend_from_slice(&(extension.len() as u16).to_be_bytes());
    extensions.extend_from_slice(&extension);

    let mut body = Vec::new();
    body.push(CLIENT_HELLO_TYPE);
    body.extend_from_slice(&[0u8; 3]); // handshake length, patched below
    body.extend_from_slice(&[3, 3]); // legacy_version
    body.extend_from_slice(&[0u8; 32]); // random
    body.push(0); // session_id_len
    body.extend_from_slice(&[0u8, 0]); // cipher_suites_len
    body.push(0); // compression_methods_len
    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);

    let handshake_len = (body.len() - 4) as u32;
    body[1] = (handshake_len >> 16) as u8;
    body[2] = (handshake_len >> 8) as u8;
    body[3] = handshake_len as u8;

    let mut record = Vec::new();
    record.push(HANDSHAKE_CONTENT_TYPE);
    record.extend_from_slice(&[3, 3]); // record version
    record.extend_from_slice(&(body.len() as u16).to_be_bytes());
    record.extend_from_slice(&body);
    record
}

#[test]
fn extracts_sni_from_a_well_formed_client_hello() {
    let section = section_targeting(&["ndev"]);
    let payload = client_hello_with_sni(b"abc.defghijklm.ndev");

    let verdict = analyze_tls_data(&section, &payload);
    assert!(verdict.target_sni);
    assert_eq!(verdict.sni_len, 19);
    let sni = &payload[verdict.sni_ptr..verdict.sni_ptr + verdict.sni_len as usize];
    assert_eq!(sni, b"abc.defghijklm.ndev");
}

#[test]
fn exclude_wins_even_when_include_matches() {
    let mut section = section_targeting(&["youtube.com"]);
    section.exclude_sni_domains.add(b"music.youtube.com");
    let payload = client_hello_with_sni(b"music.youtube.com");

    let verdict = analyze_tls_data(&section, &payload);
    assert!(!verdict.target_sni);
}

#[test]
fn non_handshake_record_never_matches() {
    let section = section_targeting(&["ndev"]);
    let mut payload = vec![23u8, 3, 3]; // application_data
    payload.extend_from_slice(&0u16.to_be_bytes());
    assert!(!analyze_tls_data(&section, &payload).target_sni);
}

#[test]
fn record_version_mismatch_is_rejected() {
    let section = section_targeting(&["ndev"]);
    let payload = vec![HANDSHAKE_CONTENT_TYPE, 2, 0, 0, 0];
    assert!(!analyze_tls_data(&section, &payload).target_sni);
}

#[test]
fn truncated_record_does_not_panic() {
    let section = section_targeting(&["ndev"]);
    let full = client_hello_with_sni(b"abc.ndev");
    for cut in 0..full.len() {
        let verdict = analyze_tls_data(&section, &full[..cut]);
        assert!(!verdict.target_sni || cut == full.len());
    }
}

#[test]
fn brute_force_path_matches_substring_without_tls_parsing() {
    let mut section = section_targeting(&["youtube.com"]);
    section.sni_detection = SniDetection::Brute;
    let payload = b"random garbage host=m.youtube.com trailer";
    let verdict = analyze_tls_data(&section, payload);
    assert!(verdict.target_sni);
    assert_eq!(verdict.sni_len, 11);
}

#[test]
fn brute_force_exclude_wins_even_though_it_lies_outside_the_matched_substring() {
    let mut section = section_targeting(&["youtube.com"]);
    section.sni_detection = SniDetection::Brute;
    section.exclude_sni_domains.add(b"music.youtube.com");
    let payload = b"random garbage host=m.music.youtube.com trailer";

    let verdict = analyze_tls_data(&section, payload);
    assert!(!verdict.target_sni);
}

#[test]
fn brute_force_all_domains_always_targets_midpoint() {
    let mut section = section_targeting(&[]);
    section.sni_detection = SniDetection::Brute;
    section.all_domains = true;
    let payload = b"anything at all here";
    let verdict = analyze_tls_data(&section, payload);
    assert!(verdict.target_sni);
    assert_eq!(verdict.sni_ptr, payload.len() / 2);
}
