//! Byte-level IPv4/IPv6/TCP parsing.
//!
//! Parsing produces [`PacketView`]s: derived offsets into the original
//! buffer, never owned copies. A view never outlives the buffer it
//! borrows from, and its four key offsets (`ip_hdr`, `l4_hdr`, `payload`,
//! end) are always within bounds and non-decreasing.

pub mod checksum;

use crate::error::Error;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Packets at or above this size are accepted without analysis; DPI
/// evasion is only meaningful near the start of a flow.
pub const MAX_PACKET_SIZE: usize = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub urg: bool,
}

impl TcpFlags {
    fn from_byte(byte: u8) -> Self {
        TcpFlags {
            fin: byte & 0x01 != 0,
            syn: byte & 0x02 != 0,
            rst: byte & 0x04 != 0,
            psh: byte & 0x08 != 0,
            ack: byte & 0x10 != 0,
            urg: byte & 0x20 != 0,
        }
    }

    fn to_byte(self) -> u8 {
        (self.fin as u8)
            | (self.syn as u8) << 1
            | (self.rst as u8) << 2
            | (self.psh as u8) << 3
            | (self.ack as u8) << 4
            | (self.urg as u8) << 5
    }
}

/// A borrowed byte range with derived offsets into `buf`. Invariant:
/// `ip_hdr + ip_hdr_len <= l4_hdr <= l4_hdr + l4_hdr_len <= payload <= buf.len()`.
#[derive(Debug, Clone)]
pub struct PacketView<'a> {
    pub buf: &'a [u8],
    pub ip_version: IpVersion,
    pub ip_hdr: usize,
    pub ip_hdr_len: usize,
    pub l4_hdr: usize,
    pub l4_hdr_len: usize,
    pub payload: usize,
    pub payload_len: usize,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_number: u32,
    pub ack_number: u32,
    pub flags: TcpFlags,
}

impl<'a> PacketView<'a> {
    pub fn payload(&self) -> &'a [u8] {
        &self.buf[self.payload..self.payload + self.payload_len]
    }

    pub fn tcp_segment(&self) -> &'a [u8] {
        &self.buf[self.l4_hdr..self.payload + self.payload_len]
    }

    /// Checks the struct's own offset invariant; used by tests and by
    /// the parser itself as a final guard before returning `Ok`.
    fn offsets_well_formed(&self) -> bool {
        self.ip_hdr + self.ip_hdr_len <= self.l4_hdr
            && self.l4_hdr + self.l4_hdr_len <= self.payload
            && self.payload + self.payload_len <= self.buf.len()
    }
}

/// A borrowed UDP datagram view, the symmetric counterpart of
/// [`PacketView`] at a lower level of detail (4.6 step 5): there is no
/// sequence space, so only the offsets needed for IP-layer fragmentation
/// and SNI-in-payload analysis are kept.
#[derive(Debug, Clone)]
pub struct UdpView<'a> {
    pub buf: &'a [u8],
    pub ip_version: IpVersion,
    pub ip_hdr: usize,
    pub ip_hdr_len: usize,
    pub l4_hdr: usize,
    pub l4_hdr_len: usize,
    pub payload: usize,
    pub payload_len: usize,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl<'a> UdpView<'a> {
    pub fn payload(&self) -> &'a [u8] {
        &self.buf[self.payload..self.payload + self.payload_len]
    }

    pub fn udp_segment(&self) -> &'a [u8] {
        &self.buf[self.l4_hdr..self.payload + self.payload_len]
    }
}

/// Outcome of parsing a raw datagram: a TCP segment view, a UDP
/// datagram view, or a sentinel meaning "parseable, but neither" (not
/// an error — the engine simply accepts).
#[derive(Debug, Clone)]
pub enum Parsed<'a> {
    Tcp(PacketView<'a>),
    Udp(UdpView<'a>),
    Other,
}

/// Dispatches on the IP version nibble and parses an IPv4 or IPv6 + TCP
/// datagram starting at the IP header.
pub fn parse(buf: &[u8]) -> Result<Parsed<'_>, Error> {
    if buf.is_empty() {
        return Err(Error::malformed("empty packet"));
    }
    match buf[0] >> 4 {
        4 => split_v4(buf),
        6 => split_v6(buf),
        _ => Err(Error::UnsupportedProtocol),
    }
}

/// `split_v4(buf) -> (iph, tcph, payload)`, expressed as offsets on a
/// [`PacketView`].
pub fn split_v4(buf: &[u8]) -> Result<Parsed<'_>, Error> {
    if buf.len() < 20 {
        return Err(Error::malformed("ipv4 header shorter than 20 bytes"));
    }
    let ihl = usize::from(buf[0] & 0x0F);
    if ihl < 5 {
        return Err(Error::malformed("ipv4 ihl below minimum"));
    }
    let ip_hdr_len = ihl * 4;
    if ip_hdr_len > buf.len() {
        return Err(Error::malformed("ipv4 ihl exceeds buffer"));
    }
    let total_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    if total_len > buf.len() || total_len < ip_hdr_len {
        return Err(Error::malformed("ipv4 total_length inconsistent"));
    }
    let protocol = buf[9];
    let src = IpAddr::V4(Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]));
    let dst = IpAddr::V4(Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]));

    match protocol {
        6 => {
            let view = parse_tcp(buf, IpVersion::V4, 0, ip_hdr_len, total_len, src, dst)?;
            Ok(Parsed::Tcp(view))
        }
        17 => {
            let view = parse_udp(buf, IpVersion::V4, 0, ip_hdr_len, total_len, src, dst)?;
            Ok(Parsed::Udp(view))
        }
        _ => Ok(Parsed::Other),
    }
}

/// `split_v6(buf) -> (ip6h, tcph, payload)`. Extension-header traversal
/// is out of scope: any next-header other than TCP is rejected as
/// "not TCP" without descending further.
pub fn split_v6(buf: &[u8]) -> Result<Parsed<'_>, Error> {
    const IPV6_HEADER_LEN: usize = 40;
    if buf.len() < IPV6_HEADER_LEN {
        return Err(Error::malformed("ipv6 header shorter than 40 bytes"));
    }
    let payload_len = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    let total_len = IPV6_HEADER_LEN + payload_len;
    if total_len > buf.len() {
        return Err(Error::malformed("ipv6 payload_length inconsistent"));
    }
    let next_header = buf[6];
    let src = ipv6_from_bytes(&buf[8..24]);
    let dst = ipv6_from_bytes(&buf[24..40]);

    match next_header {
        6 => {
            let view = parse_tcp(buf, IpVersion::V6, 0, IPV6_HEADER_LEN, total_len, src, dst)?;
            Ok(Parsed::Tcp(view))
        }
        17 => {
            let view = parse_udp(buf, IpVersion::V6, 0, IPV6_HEADER_LEN, total_len, src, dst)?;
            Ok(Parsed::Udp(view))
        }
        _ => Ok(Parsed::Other),
    }
}

fn ipv6_from_bytes(bytes: &[u8]) -> IpAddr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(bytes);
    IpAddr::V6(Ipv6Addr::from(octets))
}

#[allow(clippy::too_many_arguments)]
fn parse_tcp<'a>(
    buf: &'a [u8],
    ip_version: IpVersion,
    ip_hdr: usize,
    ip_hdr_len: usize,
    total_len: usize,
    src: IpAddr,
    dst: IpAddr,
) -> Result<PacketView<'a>, Error> {
    let l4_hdr = ip_hdr + ip_hdr_len;
    if l4_hdr + 20 > total_len {
        return Err(Error::malformed("tcp header shorter than 20 bytes"));
    }
    let tcp = &buf[l4_hdr..total_len];
    let src_port = u16::from_be_bytes([tcp[0], tcp[1]]);
    let dst_port = u16::from_be_bytes([tcp[2], tcp[3]]);
    let seq_number = u32::from_be_bytes([tcp[4], tcp[5], tcp[6], tcp[7]]);
    let ack_number = u32::from_be_bytes([tcp[8], tcp[9], tcp[10], tcp[11]]);
    let data_offset = usize::from(tcp[12] >> 4) * 4;
    if data_offset < 20 || l4_hdr + data_offset > total_len {
        return Err(Error::malformed("tcp data offset out of range"));
    }
    let flags = TcpFlags::from_byte(tcp[13]);
    let payload = l4_hdr + data_offset;
    let payload_len = total_len - payload;

    let view = PacketView {
        buf,
        ip_version,
        ip_hdr,
        ip_hdr_len,
        l4_hdr,
        l4_hdr_len: data_offset,
        payload,
        payload_len,
        src,
        dst,
        src_port,
        dst_port,
        seq_number,
        ack_number,
        flags,
    };
    debug_assert!(view.offsets_well_formed());
    Ok(view)
}

#[allow(clippy::too_many_arguments)]
fn parse_udp<'a>(
    buf: &'a [u8],
    ip_version: IpVersion,
    ip_hdr: usize,
    ip_hdr_len: usize,
    total_len: usize,
    src: IpAddr,
    dst: IpAddr,
) -> Result<UdpView<'a>, Error> {
    const UDP_HEADER_LEN: usize = 8;
    let l4_hdr = ip_hdr + ip_hdr_len;
    if l4_hdr + UDP_HEADER_LEN > total_len {
        return Err(Error::malformed("udp header shorter than 8 bytes"));
    }
    let udp = &buf[l4_hdr..total_len];
    let src_port = u16::from_be_bytes([udp[0], udp[1]]);
    let dst_port = u16::from_be_bytes([udp[2], udp[3]]);
    let declared_len = u16::from_be_bytes([udp[4], udp[5]]) as usize;
    if declared_len < UDP_HEADER_LEN || l4_hdr + declared_len > total_len {
        return Err(Error::malformed("udp length field inconsistent"));
    }
    let payload = l4_hdr + UDP_HEADER_LEN;
    let payload_len = declared_len - UDP_HEADER_LEN;

    Ok(UdpView {
        buf,
        ip_version,
        ip_hdr,
        ip_hdr_len,
        l4_hdr,
        l4_hdr_len: UDP_HEADER_LEN,
        payload,
        payload_len,
        src,
        dst,
        src_port,
        dst_port,
    })
}

#[cfg(test)]
mod tests;
