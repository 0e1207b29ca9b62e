//! Entropy source abstraction (9, "Raw random in kernel vs. user").
//!
//! Fake-SNI decoy generation is the only caller that needs randomness,
//! and it runs rarely relative to pure accept decisions, so a blocking
//! source is acceptable here even though the rest of the core never
//! suspends.

use rand::RngCore;

/// Fills `out` with random bytes. The caller is oblivious to the
/// underlying source; a kernel build would back this with its own CSPRNG.
pub fn fill_random(out: &mut [u8]) {
    rand::thread_rng().fill_bytes(out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_the_whole_slice() {
        let mut buf = [0u8; 64];
        fill_random(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
