//! Immutable, reference-counted configuration: a global block plus an
//! ordered list of sections, published behind an [`arc_swap::ArcSwap`]
//! so readers never block a writer and a writer never blocks a reader
//! mid-packet (4.7, 9).

mod dump;
mod loader;

use crate::trie::Trie;
use arc_swap::ArcSwap;
use bitflags::bitflags;
use std::sync::Arc;

pub use loader::load_from_args;

bitflags! {
    /// Which decoy-corruption techniques `fake_sni` applies (4.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FakeStrategies: u32 {
        const TCP_MD5SUM        = 0b0000_0001;
        const PASTSEQ           = 0b0000_0010;
        const ACK_SEQ           = 0b0000_0100;
        const TTL_OVERRIDE      = 0b0000_1000;
        const CORRUPT_CHECKSUM  = 0b0001_0000;
        const TRUNCATED_LENGTH  = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniDetection {
    Parse,
    Brute,
}

impl SniDetection {
    pub fn is_brute(self) -> bool {
        matches!(self, SniDetection::Brute)
    }
}

impl Default for SniDetection {
    fn default() -> Self {
        SniDetection::Parse
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentationStrategy {
    Tcp,
    Ip,
    None,
}

impl Default for FragmentationStrategy {
    fn default() -> Self {
        FragmentationStrategy::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeSniType {
    Random,
    Data,
}

impl Default for FakeSniType {
    fn default() -> Self {
        FakeSniType::Random
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeSeqType {
    Default,
    Past,
    Random,
}

impl Default for FakeSeqType {
    fn default() -> Self {
        FakeSeqType::Default
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeSniConfig {
    pub enabled: bool,
    pub seq_len: u8,
    pub kind: FakeSniType,
    pub fake_data: Vec<u8>,
    pub seq_type: FakeSeqType,
    pub ttl: Option<u8>,
    pub strategies: FakeStrategies,
}

#[derive(Debug, Clone, Default)]
pub struct Section {
    pub sni_domains: Trie,
    pub exclude_sni_domains: Trie,
    pub all_domains: bool,
    pub sni_detection: SniDetection,
    pub fragmentation_strategy: FragmentationStrategy,
    pub fake_sni: FakeSniConfig,
    pub tls_enabled: bool,
    pub udp_mode: bool,
    pub connbytes_limit: Option<u32>,
    pub frag_sni_reverse: bool,
    pub frag_middle_sni: bool,
    pub frag_sni_pos: Option<usize>,
    pub synfaking: bool,
}

impl Section {
    /// Stored include domains as UTF-8 strings, sorted. Used by the
    /// dumper (4.7); lossy on non-UTF-8 patterns, which the loader never
    /// produces since domains arrive as `&str`.
    pub fn sni_domains_sorted(&self) -> Vec<String> {
        patterns_as_strings(&self.sni_domains)
    }

    pub fn exclude_sni_domains_sorted(&self) -> Vec<String> {
        patterns_as_strings(&self.exclude_sni_domains)
    }
}

fn patterns_as_strings(trie: &Trie) -> Vec<String> {
    trie.patterns()
        .into_iter()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .collect()
}

#[derive(Debug, Clone)]
pub struct Global {
    pub mark: u32,
    pub threads: usize,
    pub queue_num: u16,
    pub log_level: String,
    pub daemonize: bool,
}

impl Default for Global {
    fn default() -> Self {
        Global {
            mark: 0x2024_0000,
            threads: 1,
            queue_num: 0,
            log_level: "info".to_string(),
            daemonize: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: Global,
    pub sections: Vec<Section>,
}

/// Reference-counted, hot-swappable configuration handle. Readers
/// acquire one strong `Arc<Config>` per packet via [`ConfigHandle::load`];
/// writers publish a whole new `Config` via [`ConfigHandle::store`]. A
/// packet that has begun processing keeps its acquired `Arc` stable to
/// completion even if the handle is swapped mid-flight.
pub struct ConfigHandle(ArcSwap<Config>);

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        ConfigHandle(ArcSwap::from_pointee(config))
    }

    pub fn load(&self) -> Arc<Config> {
        self.0.load_full()
    }

    pub fn store(&self, config: Config) {
        self.0.store(Arc::new(config));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_handle_readers_see_a_stable_snapshot_after_swap() {
        let mut initial = Config::default();
        initial.global.mark = 1;
        let handle = ConfigHandle::new(initial);

        let reader_snapshot = handle.load();
        assert_eq!(reader_snapshot.global.mark, 1);

        let mut updated = Config::default();
        updated.global.mark = 2;
        handle.store(updated);

        // The snapshot taken before the swap is unaffected.
        assert_eq!(reader_snapshot.global.mark, 1);
        assert_eq!(handle.load().global.mark, 2);
    }
}
