//! Canonical dump of a [`Config`] back into argv tokens (4.7, 13).
//!
//! `load_from_args(config.dump())` reproduces an equivalent `Config`:
//! the round-trip property from the testable-properties list holds up
//! to in-section flag ordering, which this module fixes to a single
//! canonical order so two dumps of the same config are byte-identical.

use super::{
    Config, FakeSeqType, FakeSniType, FragmentationStrategy, Section, SniDetection,
};
use std::fmt::Write as _;

impl Config {
    /// Renders this configuration as a token stream that
    /// [`super::load_from_args`] accepts.
    pub fn dump(&self) -> String {
        let mut out = String::new();

        write!(out, "--mark={}", self.global.mark).unwrap();
        write!(out, " --queue-num={}", self.global.queue_num).unwrap();
        write!(out, " --threads={}", self.global.threads).unwrap();
        write!(out, " --log-level={}", self.global.log_level).unwrap();
        if self.global.daemonize {
            out.push_str(" --daemonize");
        }

        for (index, section) in self.sections.iter().enumerate() {
            if index > 0 {
                out.push_str(" --new-section");
            }
            dump_section(&mut out, section);
        }

        out
    }
}

fn dump_section(out: &mut String, section: &Section) {
    dump_domain_list(out, "--sni-domains", &section.sni_domains_sorted());
    dump_domain_list(out, "--exclude-sni-domains", &section.exclude_sni_domains_sorted());

    if section.all_domains {
        out.push_str(" --all-domains");
    }
    write!(out, " --sni-detection={}", sni_detection_name(section.sni_detection)).unwrap();

    if section.tls_enabled {
        out.push_str(" --tls-enabled");
    }
    if section.udp_mode {
        out.push_str(" --udp-mode");
    }
    if let Some(limit) = section.connbytes_limit {
        write!(out, " --connbytes-limit={limit}").unwrap();
    }

    write!(out, " --frag={}", frag_strategy_name(section.fragmentation_strategy)).unwrap();
    if section.frag_sni_reverse {
        out.push_str(" --frag-sni-reverse");
    }
    if section.frag_middle_sni {
        out.push_str(" --frag-middle-sni");
    }
    if let Some(pos) = section.frag_sni_pos {
        write!(out, " --frag-sni-pos={pos}").unwrap();
    }

    if section.synfaking {
        out.push_str(" --synfaking");
    }

    if section.fake_sni.enabled {
        out.push_str(" --fake-sni");
        write!(out, " --fake-sni-seq-len={}", section.fake_sni.seq_len).unwrap();
        write!(out, " --fake-sni-type={}", fake_sni_type_name(section.fake_sni.kind)).unwrap();
        if !section.fake_sni.fake_data.is_empty() {
            out.push_str(" --fake-custom-payload=");
            for byte in &section.fake_sni.fake_data {
                write!(out, "{byte:02x}").unwrap();
            }
        }
        write!(out, " --fake-seq={}", fake_seq_type_name(section.fake_sni.seq_type)).unwrap();
        if let Some(ttl) = section.fake_sni.ttl {
            write!(out, " --fake-sni-ttl={ttl}").unwrap();
        }
        let strategies = faking_strategy_names(section.fake_sni.strategies);
        if !strategies.is_empty() {
            write!(out, " --faking-strategy={}", strategies.join(",")).unwrap();
        }
    }
}

fn dump_domain_list(out: &mut String, flag: &str, domains: &[String]) {
    if domains.is_empty() {
        return;
    }
    write!(out, " {flag}={}", domains.join(",")).unwrap();
}

fn sni_detection_name(value: SniDetection) -> &'static str {
    match value {
        SniDetection::Parse => "parse",
        SniDetection::Brute => "brute",
    }
}

fn frag_strategy_name(value: FragmentationStrategy) -> &'static str {
    match value {
        FragmentationStrategy::Tcp => "tcp",
        FragmentationStrategy::Ip => "ip",
        FragmentationStrategy::None => "none",
    }
}

fn fake_sni_type_name(value: FakeSniType) -> &'static str {
    match value {
        FakeSniType::Random => "random",
        FakeSniType::Data => "data",
    }
}

fn fake_seq_type_name(value: FakeSeqType) -> &'static str {
    match value {
        FakeSeqType::Default => "default",
        FakeSeqType::Past => "past",
        FakeSeqType::Random => "random",
    }
}

fn faking_strategy_names(strategies: super::FakeStrategies) -> Vec<&'static str> {
    use super::FakeStrategies as F;
    let mut names = Vec::new();
    if strategies.contains(F::TCP_MD5SUM) {
        names.push("tcp-md5sum");
    }
    if strategies.contains(F::PASTSEQ) {
        names.push("pastseq");
    }
    if strategies.contains(F::ACK_SEQ) {
        names.push("ack-seq");
    }
    if strategies.contains(F::TTL_OVERRIDE) {
        names.push("ttl");
    }
    if strategies.contains(F::CORRUPT_CHECKSUM) {
        names.push("corrupt-checksum");
    }
    if strategies.contains(F::TRUNCATED_LENGTH) {
        names.push("trunc-len");
    }
    names
}
