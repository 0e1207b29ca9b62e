//! Single-field header mutation and the injection-mark convention (4.5,
//! 8 invariant 5).
//!
//! The core has no netfilter mark of its own to attach to a `Vec<u8>`
//! buffer, so self-originated packets are tagged in-band: the low 16
//! bits of the IPv4 Identification field (or the low 16 bits of the
//! IPv6 Flow Label) carry `config.global.mark`. The host adapter's hook
//! filter recognizes these without needing a side channel.

use crate::packet::checksum;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Stamps `mark`'s low 16 bits into a full IPv4 or IPv6 datagram
/// in-place and recomputes checksums.
pub fn apply_injection_mark(buffer: &mut [u8], mark: u32) {
    if buffer.is_empty() {
        return;
    }
    match buffer[0] >> 4 {
        4 if buffer.len() >= 20 => {
            buffer[4..6].copy_from_slice(&(mark as u16).to_be_bytes());
            let ip_hdr_len = (usize::from(buffer[0] & 0x0F)) * 4;
            if buffer.len() >= ip_hdr_len {
                checksum::recompute_ipv4_header(buffer, ip_hdr_len);
            }
        }
        6 if buffer.len() >= 40 => {
            let tag = (mark as u16).to_be_bytes();
            buffer[2] = buffer[2] & 0xF0 | (tag[0] & 0x0F);
            buffer[3] = tag[1];
        }
        _ => {}
    }
}

/// Reads the mark that [`apply_injection_mark`] stamped, if any. Used
/// by tests and by the host adapter's own ingress filter.
pub fn read_injection_mark(buffer: &[u8]) -> Option<u32> {
    if buffer.is_empty() {
        return None;
    }
    match buffer[0] >> 4 {
        4 if buffer.len() >= 20 => {
            Some(u32::from(u16::from_be_bytes([buffer[4], buffer[5]])))
        }
        6 if buffer.len() >= 40 => {
            Some(u32::from(u16::from_be_bytes([buffer[2] & 0x0F, buffer[3]])))
        }
        _ => None,
    }
}

/// Rewrites the TTL (IPv4) or hop limit (IPv6) field and recomputes
/// checksums.
pub fn set_ttl(buffer: &mut [u8], ttl: u8) {
    if buffer.is_empty() {
        return;
    }
    match buffer[0] >> 4 {
        4 if buffer.len() >= 20 => {
            buffer[8] = ttl;
            let ip_hdr_len = (usize::from(buffer[0] & 0x0F)) * 4;
            checksum::recompute_ipv4_header(buffer, ip_hdr_len);
        }
        6 if buffer.len() >= 40 => buffer[7] = ttl,
        _ => {}
    }
}

/// Rewrites the TCP window field and recomputes the TCP checksum.
/// `ip_hdr_len` locates the TCP header within `buffer`.
pub fn set_window(buffer: &mut [u8], ip_hdr_len: usize, window: u16, src: Ipv4Addr, dst: Ipv4Addr) {
    if buffer.len() < ip_hdr_len + 16 {
        return;
    }
    buffer[ip_hdr_len + 14..ip_hdr_len + 16].copy_from_slice(&window.to_be_bytes());
    checksum::recompute_tcp_ipv4(buffer, ip_hdr_len, src, dst);
}

/// Corrupts the TCP checksum field so the packet is silently dropped by
/// any real endpoint while still reaching DPI inspection.
pub fn corrupt_checksum(buffer: &mut [u8], ip_hdr_len: usize) {
    if buffer.len() < ip_hdr_len + 18 {
        return;
    }
    let current = u16::from_be_bytes([buffer[ip_hdr_len + 16], buffer[ip_hdr_len + 17]]);
    buffer[ip_hdr_len + 16..ip_hdr_len + 18].copy_from_slice(&(!current).to_be_bytes());
}

/// Appends a TCP MD5 signature option (kind 19, length 18) carrying a
/// garbage digest. Returns `None` if there is no room in the options
/// area (data offset already at the 15-word maximum).
pub fn insert_md5_option(buffer: &mut Vec<u8>, ip_hdr_len: usize) -> Option<()> {
    const MD5_OPTION_LEN: usize = 18;
    let tcp_off = ip_hdr_len;
    let data_offset_words = buffer[tcp_off + 12] >> 4;

    let mut option = vec![19u8, MD5_OPTION_LEN as u8];
    option.extend(std::iter::repeat(0xAAu8).take(16));
    while option.len() % 4 != 0 {
        option.push(0); // pad to a 4-byte boundary
    }
    let added_words = (option.len() / 4) as u8;
    if data_offset_words + added_words > 15 {
        return None;
    }

    let insert_at = tcp_off + usize::from(data_offset_words) * 4;
    for (i, byte) in option.iter().enumerate() {
        buffer.insert(insert_at + i, *byte);
    }
    buffer[tcp_off + 12] = (data_offset_words + added_words) << 4;

    match buffer[0] >> 4 {
        4 => {
            let total_len = buffer.len() as u16;
            buffer[2..4].copy_from_slice(&total_len.to_be_bytes());
            let src = Ipv4Addr::new(buffer[12], buffer[13], buffer[14], buffer[15]);
            let dst = Ipv4Addr::new(buffer[16], buffer[17], buffer[18], buffer[19]);
            checksum::recompute_tcp_ipv4(buffer, tcp_off, src, dst);
            checksum::recompute_ipv4_header(buffer, tcp_off);
        }
        6 => {
            let payload_len = (buffer.len() - tcp_off) as u16;
            buffer[4..6].copy_from_slice(&payload_len.to_be_bytes());
            let mut src_octets = [0u8; 16];
            src_octets.copy_from_slice(&buffer[8..24]);
            let mut dst_octets = [0u8; 16];
            dst_octets.copy_from_slice(&buffer[24..40]);
            checksum::recompute_tcp_ipv6(buffer, tcp_off, Ipv6Addr::from(src_octets), Ipv6Addr::from(dst_octets));
        }
        _ => {}
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ipv4(len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        buf[0] = 0x45;
        buf[2..4].copy_from_slice(&(len as u16).to_be_bytes());
        buf[8] = 64;
        buf
    }

    #[test]
    fn injection_mark_round_trips_through_ipv4_identification() {
        let mut buf = sample_ipv4(40);
        apply_injection_mark(&mut buf, 0x2024_beef);
        assert_eq!(read_injection_mark(&buf), Some(0xbeef));
    }

    #[test]
    fn set_ttl_updates_the_byte_and_checksum_validates() {
        let mut buf = sample_ipv4(20);
        set_ttl(&mut buf, 11);
        assert_eq!(buf[8], 11);
        assert_eq!(checksum::ipv4_header(&buf), 0);
    }

    #[test]
    fn corrupt_checksum_flips_the_stored_value() {
        let mut buf = sample_ipv4(40);
        let original = u16::from_be_bytes([buf[36], buf[37]]);
        corrupt_checksum(&mut buf, 20);
        let corrupted = u16::from_be_bytes([buf[36], buf[37]]);
        assert_ne!(original, corrupted);
    }

    #[test]
    fn insert_md5_option_fixes_up_length_and_checksums() {
        let mut buf = sample_ipv4(40);
        buf[9] = 6; // TCP
        buf[32] = 5 << 4; // TCP data offset, no options
        buf[12..16].copy_from_slice(&[10, 0, 0, 1]);
        buf[16..20].copy_from_slice(&[10, 0, 0, 2]);
        checksum::recompute_ipv4_header(&mut buf, 20);
        checksum::recompute_tcp_ipv4(&mut buf, 20, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));

        let before_len = buf.len();
        insert_md5_option(&mut buf, 20).expect("room for the option");

        assert_eq!(buf.len(), before_len + 20);
        let declared_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        assert_eq!(declared_len, buf.len());
        assert_eq!(checksum::ipv4_header(&buf[..20]), 0);

        let tcp_checksum = checksum::tcp_ipv4(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            &buf[20..],
        );
        assert_eq!(tcp_checksum, 0);
    }
}
