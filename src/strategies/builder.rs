//! Shared buffer-rebuilding helpers for the mutation strategies.
//!
//! Manual offset-write idiom: every field is written at a literal byte
//! offset, then checksums are recomputed from scratch over the finished
//! buffer.

use crate::packet::{checksum, PacketView, TcpFlags};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Everything a rebuilt TCP segment might override relative to the
/// packet it is derived from; `None` means "keep the source value".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub seq_number: Option<u32>,
    pub ack_number: Option<u32>,
    pub flags: Option<TcpFlags>,
    pub ttl: Option<u8>,
    pub window: Option<u16>,
    pub ip_id: Option<u16>,
}

/// Rebuilds a full IPv4 or IPv6 datagram from `view`'s header bytes
/// (TCP options carried through unchanged), a replacement `payload`,
/// and field overrides. The checksum is always recomputed.
pub fn rebuild(view: &PacketView<'_>, payload: &[u8], overrides: &Overrides) -> Vec<u8> {
    match (view.src, view.dst) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => rebuild_v4(view, src, dst, payload, overrides),
        (IpAddr::V6(src), IpAddr::V6(dst)) => rebuild_v6(view, src, dst, payload, overrides),
        _ => unreachable!("PacketView src/dst are always the same IP version"),
    }
}

fn rebuild_v4(
    view: &PacketView<'_>,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    payload: &[u8],
    overrides: &Overrides,
) -> Vec<u8> {
    let ip_header = &view.buf[view.ip_hdr..view.ip_hdr + view.ip_hdr_len];
    let tcp_header = &view.buf[view.l4_hdr..view.l4_hdr + view.l4_hdr_len];
    let total_len = view.ip_hdr_len + view.l4_hdr_len + payload.len();

    let mut buffer = vec![0u8; total_len];
    buffer[..view.ip_hdr_len].copy_from_slice(ip_header);
    buffer[view.ip_hdr_len..view.ip_hdr_len + view.l4_hdr_len].copy_from_slice(tcp_header);
    buffer[view.ip_hdr_len + view.l4_hdr_len..].copy_from_slice(payload);

    buffer[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    if let Some(id) = overrides.ip_id {
        buffer[4..6].copy_from_slice(&id.to_be_bytes());
    }
    if let Some(ttl) = overrides.ttl {
        buffer[8] = ttl;
    }

    let tcp_off = view.ip_hdr_len;
    if let Some(seq) = overrides.seq_number {
        buffer[tcp_off + 4..tcp_off + 8].copy_from_slice(&seq.to_be_bytes());
    }
    if let Some(ack) = overrides.ack_number {
        buffer[tcp_off + 8..tcp_off + 12].copy_from_slice(&ack.to_be_bytes());
    }
    if let Some(flags) = overrides.flags {
        buffer[tcp_off + 13] = flags.to_byte();
    }
    if let Some(window) = overrides.window {
        buffer[tcp_off + 14..tcp_off + 16].copy_from_slice(&window.to_be_bytes());
    }

    checksum::recompute_tcp_ipv4(&mut buffer, view.ip_hdr_len, src, dst);
    checksum::recompute_ipv4_header(&mut buffer, view.ip_hdr_len);
    buffer
}

fn rebuild_v6(
    view: &PacketView<'_>,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    payload: &[u8],
    overrides: &Overrides,
) -> Vec<u8> {
    let tcp_header = &view.buf[view.l4_hdr..view.l4_hdr + view.l4_hdr_len];
    let tcp_len = view.l4_hdr_len + payload.len();
    let total_len = view.ip_hdr_len + tcp_len;

    let mut buffer = vec![0u8; total_len];
    buffer[..view.ip_hdr_len].copy_from_slice(&view.buf[view.ip_hdr..view.ip_hdr + view.ip_hdr_len]);
    buffer[view.ip_hdr_len..view.ip_hdr_len + view.l4_hdr_len].copy_from_slice(tcp_header);
    buffer[view.ip_hdr_len + view.l4_hdr_len..].copy_from_slice(payload);

    buffer[4..6].copy_from_slice(&(tcp_len as u16).to_be_bytes());
    if let Some(ttl) = overrides.ttl {
        buffer[7] = ttl; // hop limit
    }

    let tcp_off = view.ip_hdr_len;
    if let Some(seq) = overrides.seq_number {
        buffer[tcp_off + 4..tcp_off + 8].copy_from_slice(&seq.to_be_bytes());
    }
    if let Some(ack) = overrides.ack_number {
        buffer[tcp_off + 8..tcp_off + 12].copy_from_slice(&ack.to_be_bytes());
    }
    if let Some(flags) = overrides.flags {
        buffer[tcp_off + 13] = flags.to_byte();
    }
    if let Some(window) = overrides.window {
        buffer[tcp_off + 14..tcp_off + 16].copy_from_slice(&window.to_be_bytes());
    }

    checksum::recompute_tcp_ipv6(&mut buffer, view.ip_hdr_len, src, dst);
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{self, Parsed};

    fn sample_ipv4_tcp(payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 20 + 20 + payload.len()];
        buf[0] = 0x45;
        let total_len = buf.len() as u16;
        buf[2..4].copy_from_slice(&total_len.to_be_bytes());
        buf[8] = 64;
        buf[9] = 6;
        buf[12..16].copy_from_slice(&[10, 0, 0, 1]);
        buf[16..20].copy_from_slice(&[10, 0, 0, 2]);
        buf[20..22].copy_from_slice(&1234u16.to_be_bytes());
        buf[22..24].copy_from_slice(&443u16.to_be_bytes());
        buf[32] = 5 << 4;
        buf[40..].copy_from_slice(payload);
        checksum::recompute_ipv4_header(&mut buf, 20);
        checksum::recompute_tcp_ipv4(
            &mut buf,
            20,
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
        );
        buf
    }

    #[test]
    fn rebuild_preserves_addresses_and_ports() {
        let raw = sample_ipv4_tcp(b"hello world");
        let view = match packet::parse(&raw).unwrap() {
            Parsed::Tcp(v) => v,
            _ => panic!("expected tcp"),
        };
        let rebuilt = rebuild(&view, b"hi", &Overrides::default());
        let reparsed = match packet::parse(&rebuilt).unwrap() {
            Parsed::Tcp(v) => v,
            _ => panic!("expected tcp"),
        };
        assert_eq!(reparsed.src, view.src);
        assert_eq!(reparsed.dst, view.dst);
        assert_eq!(reparsed.src_port, view.src_port);
        assert_eq!(reparsed.payload(), b"hi");
    }

    #[test]
    fn overrides_apply_and_checksum_still_validates() {
        let raw = sample_ipv4_tcp(b"hello world");
        let view = match packet::parse(&raw).unwrap() {
            Parsed::Tcp(v) => v,
            _ => panic!("expected tcp"),
        };
        let overrides = Overrides {
            ttl: Some(7),
            seq_number: Some(view.seq_number.wrapping_add(5)),
            ..Overrides::default()
        };
        let rebuilt = rebuild(&view, b"x", &overrides);
        assert_eq!(rebuilt[8], 7);
        let reparsed = match packet::parse(&rebuilt).unwrap() {
            Parsed::Tcp(v) => v,
            _ => panic!("expected tcp"),
        };
        assert_eq!(reparsed.seq_number, view.seq_number.wrapping_add(5));
    }
}
