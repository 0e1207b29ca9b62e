//! Decoy-packet strategies: fake SNI payloads, SYN flooding, and a
//! single out-of-band byte (4.5).
//!
//! Corruption-technique set (TTL override, checksum corruption,
//! truncated length, MD5 option) assembled through the same manual
//! offset-write buffer builder the other strategies use.

use super::builder::{self, Overrides};
use crate::config::{FakeSniConfig, FakeStrategies};
use crate::entropy;
use crate::packet::{PacketView, TcpFlags};

const MAX_RANDOM_FAKE_LEN: usize = 1200;

/// Produces `fake_sni_seq_len` decoy buffers sharing the 5-tuple of
/// `view`, each corrupted by at least one configured strategy, plus the
/// untouched real packet at the end: `[decoy, decoy, ..., original]`.
/// Decoys never validate at the real endpoint; they exist only to
/// confuse on-path inspection.
pub fn fake_sni(view: &PacketView<'_>, config: &FakeSniConfig) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(config.seq_len as usize + 1);
    for _ in 0..config.seq_len {
        out.push(build_decoy(view, config));
    }
    out.push(view.buf.to_vec());
    out
}

fn build_decoy(view: &PacketView<'_>, config: &FakeSniConfig) -> Vec<u8> {
    let payload = decoy_payload(config);

    let seq_number = if config.strategies.contains(FakeStrategies::PASTSEQ)
        || matches!(config.seq_type, crate::config::FakeSeqType::Past)
    {
        view.seq_number.wrapping_sub(payload.len() as u32)
    } else if matches!(config.seq_type, crate::config::FakeSeqType::Random) {
        let mut bytes = [0u8; 4];
        entropy::fill_random(&mut bytes);
        u32::from_be_bytes(bytes)
    } else {
        view.seq_number
    };

    let mut flags = view.flags;
    let ack_number = if config.strategies.contains(FakeStrategies::ACK_SEQ) {
        flags.ack = true;
        0
    } else {
        view.ack_number
    };

    let ttl = if config.strategies.contains(FakeStrategies::TTL_OVERRIDE) {
        config.ttl
    } else {
        None
    };

    let overrides = Overrides {
        seq_number: Some(seq_number),
        ack_number: Some(ack_number),
        flags: Some(flags),
        ttl,
        ..Overrides::default()
    };

    let mut buffer = builder::rebuild(view, &payload, &overrides);

    if config.strategies.contains(FakeStrategies::CORRUPT_CHECKSUM) {
        super::header::corrupt_checksum(&mut buffer, view.ip_hdr_len);
    }
    if config.strategies.contains(FakeStrategies::TRUNCATED_LENGTH) {
        truncate_declared_length(&mut buffer);
    }
    if config.strategies.contains(FakeStrategies::TCP_MD5SUM) {
        super::header::insert_md5_option(&mut buffer, view.ip_hdr_len);
    }

    buffer
}

fn decoy_payload(config: &FakeSniConfig) -> Vec<u8> {
    match config.kind {
        crate::config::FakeSniType::Data => config.fake_data.clone(),
        crate::config::FakeSniType::Random => {
            let len = if config.fake_data.is_empty() {
                MAX_RANDOM_FAKE_LEN
            } else {
                config.fake_data.len().min(MAX_RANDOM_FAKE_LEN)
            };
            let mut bytes = vec![0u8; len];
            entropy::fill_random(&mut bytes);
            bytes
        }
    }
}

/// Shrinks the IPv4 total-length field so it understates the buffer's
/// real size, making it look truncated to a naive length-based parser
/// without actually shortening what's sent on the wire.
fn truncate_declared_length(buffer: &mut [u8]) {
    if buffer.len() < 20 || buffer[0] >> 4 != 4 {
        return;
    }
    let declared = (buffer.len() as u16 / 2).max(20);
    buffer[2..4].copy_from_slice(&declared.to_be_bytes());
}

/// Emits `count` additional SYN decoys ahead of a real SYN packet, each
/// with a randomized initial sequence number, to poison classifiers
/// that fingerprint connections by their first SYN.
pub fn synfaking(view: &PacketView<'_>, count: u8) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(count as usize + 1);
    for _ in 0..count {
        let mut bytes = [0u8; 4];
        entropy::fill_random(&mut bytes);
        let overrides = Overrides {
            seq_number: Some(u32::from_be_bytes(bytes)),
            flags: Some(TcpFlags {
                syn: true,
                ..TcpFlags::default()
            }),
            ..Overrides::default()
        };
        out.push(builder::rebuild(view, &[], &overrides));
    }
    out.push(view.buf.to_vec());
    out
}

/// A single urgent out-of-band byte, sent before (`lead = true`) or
/// after the real packet, to desynchronize DPI reassembly state.
pub fn oob_send(view: &PacketView<'_>, byte: u8, lead: bool) -> Vec<Vec<u8>> {
    let mut flags = view.flags;
    flags.urg = true;
    let overrides = Overrides {
        flags: Some(flags),
        ..Overrides::default()
    };
    let mut oob = builder::rebuild(view, &[byte], &overrides);
    set_urgent_pointer(&mut oob, view.ip_hdr_len, 1);

    let original = view.buf.to_vec();
    if lead {
        vec![oob, original]
    } else {
        vec![original, oob]
    }
}

fn set_urgent_pointer(buffer: &mut [u8], ip_hdr_len: usize, pointer: u16) {
    if buffer.len() < ip_hdr_len + 20 {
        return;
    }
    buffer[ip_hdr_len + 18..ip_hdr_len + 20].copy_from_slice(&pointer.to_be_bytes());
}
