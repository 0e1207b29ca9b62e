//! Packet-mangling core for SNI-based DPI evasion.
//!
//! The core parses raw IPv4/IPv6/TCP datagrams, recognizes TLS
//! ClientHello SNI values against a configured policy, and produces a
//! [`engine::Verdict`] plus zero or more replacement buffers. It does
//! not capture or inject packets itself — that's the host adapter's
//! job (see `src/bin/sniveild.rs`).

pub mod config;
pub mod engine;
pub mod entropy;
pub mod error;
pub mod logger;
pub mod matcher;
pub mod packet;
pub mod strategies;
pub mod tls;
pub mod trie;

pub use config::{Config, ConfigHandle};
pub use engine::{process_packet, Statistics, StatisticsSnapshot, Verdict};
pub use error::{Error, Result};
