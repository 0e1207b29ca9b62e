//! TCP- and IP-layer fragmentation strategies (4.5).
//!
//! Split-then-reorder shape follows `FragmentationStrategy::apply`-style
//! fragmenters, adapted to a byte-offset buffer idiom instead of a typed
//! `Packet` wrapper.

use super::builder::{self, Overrides};
use crate::config::Section;
use crate::error::Error;
use crate::packet::{PacketView, UdpView};
use crate::tls::TlsVerdict;

/// Splits a single TCP segment into two at payload offset `pos`. The
/// second segment's sequence number is `seq + pos`; TCP options are
/// carried unchanged on both. `pos == 0` or `pos >= payload_len` is an
/// error (nothing to split).
pub fn tcp_frag(view: &PacketView<'_>, pos: usize) -> Result<Vec<Vec<u8>>, Error> {
    let payload = view.payload();
    if pos == 0 || pos >= payload.len() {
        return Err(Error::malformed("tcp_frag position out of range"));
    }

    let first = builder::rebuild(view, &payload[..pos], &Overrides::default());
    let second = builder::rebuild(
        view,
        &payload[pos..],
        &Overrides {
            seq_number: Some(view.seq_number.wrapping_add(pos as u32)),
            ip_id: ipv4_incremented_id(view),
            ..Overrides::default()
        },
    );
    Ok(vec![first, second])
}

fn ipv4_incremented_id(view: &PacketView<'_>) -> Option<u16> {
    if view.ip_hdr_len < 6 {
        return None;
    }
    let id = u16::from_be_bytes([
        view.buf[view.ip_hdr + 4],
        view.buf[view.ip_hdr + 5],
    ]);
    Some(id.wrapping_add(1))
}

/// IPv4 fragmentation at the IP layer, offset in multiples of 8 bytes.
/// The TCP header lives in the first fragment only; later fragments
/// carry a raw payload continuation with no TCP header of their own.
/// Degrades to [`tcp_frag`] when DF is set (policy: never actually
/// fragment a flow that asked not to be).
pub fn ip_frag(view: &PacketView<'_>, pos: usize, df_set: bool) -> Result<Vec<Vec<u8>>, Error> {
    if df_set {
        return tcp_frag(view, pos);
    }
    if pos == 0 || pos % 8 != 0 || pos >= view.l4_hdr_len + view.payload_len {
        return Err(Error::malformed("ip_frag position invalid"));
    }
    let ip_header = &view.buf[view.ip_hdr..view.ip_hdr + view.ip_hdr_len];
    fragment_ip_segment(ip_header, view.ip_hdr_len, view.tcp_segment(), pos)
}

/// UDP counterpart of [`ip_frag`] (4.6 step 5): a datagram has no
/// sequence space, so there is no DF-set degrade path, just the
/// straight IP-layer split.
pub fn ip_frag_udp(view: &UdpView<'_>, pos: usize) -> Result<Vec<Vec<u8>>, Error> {
    if pos == 0 || pos % 8 != 0 || pos >= view.l4_hdr_len + view.payload_len {
        return Err(Error::malformed("ip_frag position invalid"));
    }
    let ip_header = &view.buf[view.ip_hdr..view.ip_hdr + view.ip_hdr_len];
    fragment_ip_segment(ip_header, view.ip_hdr_len, view.udp_segment(), pos)
}

fn fragment_ip_segment(
    ip_header: &[u8],
    ip_hdr_len: usize,
    segment: &[u8],
    pos: usize,
) -> Result<Vec<Vec<u8>>, Error> {
    let (first_part, second_part) = segment.split_at(pos);
    let first = build_ip_fragment(ip_header, ip_hdr_len, first_part, 0, true);
    let second = build_ip_fragment(ip_header, ip_hdr_len, second_part, pos / 8, false);
    Ok(vec![first, second])
}

fn build_ip_fragment(
    ip_header: &[u8],
    ip_hdr_len: usize,
    body: &[u8],
    frag_offset_units: usize,
    more_fragments: bool,
) -> Vec<u8> {
    let total_len = ip_hdr_len + body.len();
    let mut buffer = vec![0u8; total_len];
    buffer[..ip_hdr_len].copy_from_slice(ip_header);
    buffer[ip_hdr_len..].copy_from_slice(body);

    buffer[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    let flags_and_offset = ((more_fragments as u16) << 13) | (frag_offset_units as u16 & 0x1FFF);
    buffer[6..8].copy_from_slice(&flags_and_offset.to_be_bytes());

    crate::packet::checksum::recompute_ipv4_header(&mut buffer, ip_hdr_len);
    buffer
}

/// Where to position the fragmentation cut relative to the payload,
/// given an optional matched SNI range.
#[derive(Debug, Clone, Copy)]
pub enum SniCutMode {
    FirstByte,
    Middle,
    FixedOffset(usize),
}

/// Positions a TCP segmentation cut inside the matched SNI field (or at
/// the payload midpoint if nothing matched), then fragments there.
/// `section.frag_sni_reverse` swaps the two resulting buffers.
pub fn split_at_sni(
    view: &PacketView<'_>,
    section: &Section,
    verdict: &TlsVerdict,
) -> Result<Vec<Vec<u8>>, Error> {
    let payload_len = view.payload_len;
    let mode = if section.frag_sni_pos.is_some() {
        SniCutMode::FixedOffset(section.frag_sni_pos.unwrap())
    } else if section.frag_middle_sni {
        SniCutMode::Middle
    } else {
        SniCutMode::FirstByte
    };

    let pos = cut_position(payload_len, verdict, mode);
    let mut fragments = tcp_frag(view, pos)?;
    if section.frag_sni_reverse {
        fragments.reverse();
    }
    Ok(fragments)
}

fn cut_position(payload_len: usize, verdict: &TlsVerdict, mode: SniCutMode) -> usize {
    let sni_start = verdict.target_sni_ptr;
    let sni_len = verdict.target_sni_len as usize;
    let has_target = verdict.target_sni && sni_start < payload_len;

    let raw = match (mode, has_target) {
        (SniCutMode::FixedOffset(offset), _) => offset,
        (SniCutMode::Middle, true) => sni_start + sni_len / 2,
        (SniCutMode::FirstByte, true) => sni_start,
        (_, false) => payload_len / 2,
    };
    raw.clamp(1, payload_len.saturating_sub(1).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{self, checksum, Parsed};
    use std::net::Ipv4Addr;

    fn sample_ipv4_tcp(payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 20 + 20 + payload.len()];
        buf[0] = 0x45;
        buf[2..4].copy_from_slice(&(buf.len() as u16).to_be_bytes());
        buf[4..6].copy_from_slice(&7u16.to_be_bytes());
        buf[8] = 64;
        buf[9] = 6;
        buf[12..16].copy_from_slice(&[10, 0, 0, 1]);
        buf[16..20].copy_from_slice(&[10, 0, 0, 2]);
        buf[24..28].copy_from_slice(&1000u32.to_be_bytes()); // seq
        buf[32] = 5 << 4;
        buf[40..].copy_from_slice(payload);
        checksum::recompute_ipv4_header(&mut buf, 20);
        checksum::recompute_tcp_ipv4(&mut buf, 20, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        buf
    }

    fn parse(buf: &[u8]) -> PacketView<'_> {
        match packet::parse(buf).unwrap() {
            Parsed::Tcp(v) => v,
            _ => panic!("expected tcp"),
        }
    }

    #[test]
    fn tcp_frag_splits_payload_and_advances_seq() {
        let raw = sample_ipv4_tcp(b"0123456789");
        let view = parse(&raw);
        let fragments = tcp_frag(&view, 4).unwrap();
        assert_eq!(fragments.len(), 2);

        let first = parse(&fragments[0]);
        let second = parse(&fragments[1]);
        assert_eq!(first.payload(), b"0123");
        assert_eq!(second.payload(), b"456789");
        assert_eq!(second.seq_number, view.seq_number.wrapping_add(4));
        assert_eq!(first.payload_len + second.payload_len, 10);
    }

    #[test]
    fn tcp_frag_rejects_out_of_range_positions() {
        let raw = sample_ipv4_tcp(b"abc");
        let view = parse(&raw);
        assert!(tcp_frag(&view, 0).is_err());
        assert!(tcp_frag(&view, 3).is_err());
        assert!(tcp_frag(&view, 10).is_err());
    }

    #[test]
    fn split_at_sni_cuts_within_matched_label_when_middle_requested() {
        let raw = sample_ipv4_tcp(&[b'x'; 200]);
        let view = parse(&raw);
        let mut section = Section::default();
        section.frag_middle_sni = true;
        let verdict = TlsVerdict {
            target_sni: true,
            sni_ptr: 60,
            sni_len: 19,
            target_sni_ptr: 60,
            target_sni_len: 19,
        };
        let fragments = split_at_sni(&view, &section, &verdict).unwrap();
        let boundary = parse(&fragments[0]).payload_len;
        assert!((60..=79).contains(&boundary));
    }

    #[test]
    fn split_at_sni_reverses_order_when_configured() {
        let raw = sample_ipv4_tcp(b"0123456789");
        let view = parse(&raw);
        let mut section = Section::default();
        section.frag_sni_reverse = true;
        let verdict = TlsVerdict::default();
        let fragments = split_at_sni(&view, &section, &verdict).unwrap();
        // unreversed would be [0..5, 5..10]; reversed swaps them.
        assert_eq!(parse(&fragments[0]).payload(), b"56789");
        assert_eq!(parse(&fragments[1]).payload(), b"01234");
    }

    #[test]
    fn ip_frag_sets_more_fragments_on_first_and_clears_on_last() {
        let raw = sample_ipv4_tcp(&[0u8; 64]);
        let view = parse(&raw);
        let fragments = ip_frag(&view, 24, false).unwrap();
        let first_flags = u16::from_be_bytes([fragments[0][6], fragments[0][7]]);
        let second_flags = u16::from_be_bytes([fragments[1][6], fragments[1][7]]);
        assert_eq!(first_flags >> 13 & 1, 1);
        assert_eq!(second_flags >> 13 & 1, 0);
    }

    #[test]
    fn ip_frag_degrades_to_tcp_frag_when_df_is_set() {
        let raw = sample_ipv4_tcp(b"0123456789");
        let view = parse(&raw);
        let fragments = ip_frag(&view, 4, true).unwrap();
        assert_eq!(parse(&fragments[0]).payload(), b"0123");
    }
}
