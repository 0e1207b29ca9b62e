//! Decision engine (4.6): per-packet driver that classifies, matches
//! configured sections in order, applies one mutation strategy set, and
//! produces a [`Verdict`]. Re-entrant and stateless beyond the
//! [`Statistics`] counters.

use crate::config::{Config, FragmentationStrategy, Section};
use crate::logger::{self, BreadcrumbFlags};
use crate::packet::{self, Parsed, PacketView, UdpView, MAX_PACKET_SIZE};
use crate::strategies;
use crate::tls::{self, TlsVerdict};
use std::sync::atomic::{AtomicU64, Ordering};

/// The engine's per-packet decision. `Replace` drops the original and
/// asks the host to inject every buffer, in order, in its place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Drop,
    Replace(Vec<Vec<u8>>),
}

/// Process-wide advisory counters (3, "Statistics"). Loss of at most one
/// increment under concurrent update is acceptable, so all operations
/// are relaxed.
#[derive(Debug, Default)]
pub struct Statistics {
    captured: AtomicU64,
    processed: AtomicU64,
    targeted: AtomicU64,
    injected: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub captured: u64,
    pub processed: u64,
    pub targeted: u64,
    pub injected: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Statistics::default()
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            captured: self.captured.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            targeted: self.targeted.load(Ordering::Relaxed),
            injected: self.injected.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Runs one packet through the pipeline described in 4.6.
pub fn process_packet(config: &Config, buf: &[u8], mark: u32, stats: &Statistics) -> Verdict {
    Statistics::bump(&stats.captured);

    if config.global.mark != 0 && mark & config.global.mark == config.global.mark {
        return Verdict::Accept;
    }
    if buf.len() >= MAX_PACKET_SIZE {
        return Verdict::Accept;
    }

    match packet::parse(buf) {
        Ok(Parsed::Tcp(view)) => process_tcp(config, &view, stats),
        Ok(Parsed::Udp(view)) => process_udp(config, &view, stats),
        Ok(Parsed::Other) | Err(_) => Verdict::Accept,
    }
}

fn process_tcp(config: &Config, view: &PacketView<'_>, stats: &Statistics) -> Verdict {
    Statistics::bump(&stats.processed);

    if view.payload_len == 0 {
        return Verdict::Accept;
    }

    for section in &config.sections {
        // `connbytes_limit` is honored by the host's conntrack lookup
        // before a packet ever reaches `process_packet` (4.6 step 3);
        // the core has no connection-tracking state of its own to
        // evaluate it against.
        let verdict = tls::analyze_tls_data(section, view.payload());
        if !verdict.target_sni {
            logger::breadcrumb(BreadcrumbFlags::ENGINE, "section did not match, trying next");
            continue;
        }

        Statistics::bump(&stats.targeted);
        let mut buffers = apply_strategies(view, section, &verdict);
        for buffer in &mut buffers {
            strategies::apply_injection_mark(buffer, config.global.mark);
        }
        Statistics::bump(&stats.injected);
        return Verdict::Replace(buffers);
    }

    Verdict::Accept
}

/// UDP path (4.6 step 5): symmetric to the TCP path at a lower level of
/// detail. There is no sequence space to fragment around and no
/// fake-SNI/synfake strategy set applies, so a matched section gets one
/// IP-layer fragmentation cut through the datagram.
fn process_udp(config: &Config, view: &UdpView<'_>, stats: &Statistics) -> Verdict {
    Statistics::bump(&stats.processed);

    if view.payload_len == 0 {
        return Verdict::Accept;
    }

    for section in &config.sections {
        if !section.udp_mode {
            continue;
        }
        let verdict = tls::analyze_tls_data(section, view.payload());
        if !verdict.target_sni {
            continue;
        }

        Statistics::bump(&stats.targeted);
        let pos = view.l4_hdr_len + (view.payload_len / 2 / 8).max(1) * 8;
        let mut buffers =
            strategies::ip_frag_udp(view, pos).unwrap_or_else(|_| vec![view.buf.to_vec()]);
        for buffer in &mut buffers {
            strategies::apply_injection_mark(buffer, config.global.mark);
        }
        Statistics::bump(&stats.injected);
        return Verdict::Replace(buffers);
    }

    Verdict::Accept
}

/// Applies one section's configured strategy set to a matched packet.
/// Precedence (most to least specific): SYN-fake on SYN packets,
/// fake-SNI decoys, SNI-aware fragmentation, and — if a section matched
/// but configured no mutation at all — a conservative midpoint
/// TCP fragmentation so a matched, unconfigured section still does
/// something observable rather than silently passing the ClientHello
/// through.
fn apply_strategies(view: &PacketView<'_>, section: &Section, verdict: &TlsVerdict) -> Vec<Vec<u8>> {
    if section.synfaking && view.flags.syn {
        let count = section.fake_sni.seq_len.max(1);
        return strategies::synfaking(view, count);
    }

    if section.fake_sni.enabled {
        return strategies::fake_sni(view, &section.fake_sni);
    }

    match section.fragmentation_strategy {
        FragmentationStrategy::Tcp => strategies::split_at_sni(view, section, verdict)
            .unwrap_or_else(|_| vec![view.buf.to_vec()]),
        FragmentationStrategy::Ip => {
            let pos = view.l4_hdr_len + (view.payload_len / 2 / 8).max(1) * 8;
            strategies::ip_frag(view, pos, false).unwrap_or_else(|_| vec![view.buf.to_vec()])
        }
        FragmentationStrategy::None => strategies::split_at_sni(view, section, verdict)
            .unwrap_or_else(|_| vec![view.buf.to_vec()]),
    }
}
