//! Mutation strategies (4.5): pure functions over a matched packet view
//! that either mutate in place or synthesize replacement buffers. The
//! decision engine composes these; none of them do I/O.

mod builder;
pub mod fake;
pub mod fragment;
pub mod header;

pub use builder::Overrides;
pub use fake::{fake_sni, oob_send, synfaking};
pub use fragment::{ip_frag, ip_frag_udp, split_at_sni, tcp_frag, SniCutMode};
pub use header::apply_injection_mark;
