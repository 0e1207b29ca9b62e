//! Byte trie used by the SNI matcher (4.4) and the brute-force TLS
//! analyzer path (4.3).
//!
//! Read-only after [`Trie::add`] calls finish at config-load time: lookup
//! only walks the arena by shared reference, so concurrent readers never
//! need to lock (mirrors the read-only-after-publish contract the
//! decision engine relies on for its whole `Config`).

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Suffix-anchored: a match only counts if it reaches `buf`'s end or
    /// is immediately followed by a domain-label delimiter (`.`).
    MapToEnd,
    /// No anchoring: any occurrence of a stored pattern counts.
    Unanchored,
}

const DELIMITER: u8 = b'.';

#[derive(Debug, Default, Clone)]
struct Node {
    children: FxHashMap<u8, usize>,
    terminal: bool,
}

/// Reverse-domain / substring trie over raw bytes.
#[derive(Debug, Clone)]
pub struct Trie {
    nodes: Vec<Node>,
}

impl Default for Trie {
    fn default() -> Self {
        Trie::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        Trie {
            nodes: vec![Node::default()],
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.nodes[0].terminal && self.nodes[0].children.is_empty()
    }

    /// Adds `pattern` to the trie. Idempotent: adding the same bytes
    /// twice leaves the trie structurally unchanged.
    pub fn add(&mut self, pattern: &[u8]) {
        let mut cursor = 0usize;
        for &byte in pattern {
            cursor = match self.nodes[cursor].children.get(&byte) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[cursor].children.insert(byte, next);
                    next
                }
            };
        }
        self.nodes[cursor].terminal = true;
    }

    /// Scans `buf` left-to-right and returns the first match as
    /// `(offset, length)`, or `None`.
    pub fn lookup(&self, buf: &[u8], mode: LookupMode) -> Option<(usize, usize)> {
        if self.nodes.len() == 1 {
            return None;
        }
        for start in 0..buf.len() {
            if let Some(len) = self.match_at(buf, start) {
                let end = start + len;
                match mode {
                    LookupMode::Unanchored => return Some((start, len)),
                    LookupMode::MapToEnd => {
                        let anchored = end == buf.len() || buf[end] == DELIMITER;
                        if anchored {
                            return Some((start, len));
                        }
                    }
                }
            }
        }
        None
    }

    /// Returns every stored pattern, sorted lexicographically. Used only
    /// by the configuration dumper (4.7) — never on the packet path.
    pub fn patterns(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        self.collect(0, &mut path, &mut out);
        out.sort();
        out
    }

    fn collect(&self, node: usize, path: &mut Vec<u8>, out: &mut Vec<Vec<u8>>) {
        if self.nodes[node].terminal {
            out.push(path.clone());
        }
        for (&byte, &child) in &self.nodes[node].children {
            path.push(byte);
            self.collect(child, path, out);
            path.pop();
        }
    }

    /// Walks the trie starting at `buf[start..]`, recording every prefix
    /// length at which a terminal node is reached. Returns the longest
    /// such length (the most specific stored pattern that matches here).
    fn match_at(&self, buf: &[u8], start: usize) -> Option<usize> {
        let mut cursor = 0usize;
        let mut best: Option<usize> = None;
        for (offset, &byte) in buf[start..].iter().enumerate() {
            match self.nodes[cursor].children.get(&byte) {
                Some(&next) => {
                    cursor = next;
                    if self.nodes[cursor].terminal {
                        best = Some(offset + 1);
                    }
                }
                None => break,
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut trie = Trie::new();
        trie.add(b"youtube.com");
        trie.add(b"youtube.com");
        assert_eq!(trie.lookup(b"youtube.com", LookupMode::Unanchored), Some((0, 11)));
    }

    #[test]
    fn unanchored_finds_suffix_occurrence() {
        let mut trie = Trie::new();
        trie.add(b"youtube.com");
        let payload = b"GET / HTTP/1.1 host=m.youtube.com";
        let found = trie.lookup(payload, LookupMode::Unanchored).unwrap();
        assert_eq!(found, (payload.len() - 11, 11));
    }

    #[test]
    fn map_to_end_matches_domain_tail() {
        let mut trie = Trie::new();
        trie.add(b"youtube.com");
        let hostname = b"music.youtube.com";
        let found = trie.lookup(hostname, LookupMode::MapToEnd).unwrap();
        assert_eq!(found, (6, 11));
        assert_eq!(&hostname[found.0..found.0 + found.1], b"youtube.com");
    }

    #[test]
    fn map_to_end_rejects_non_label_boundary_suffix() {
        let mut trie = Trie::new();
        trie.add(b"tube.com");
        // "tube.com" occurs inside "youtube.com" but not at a label
        // boundary and not at the buffer end preceded by a delimiter.
        let hostname = b"youtube.comx";
        assert_eq!(trie.lookup(hostname, LookupMode::MapToEnd), None);
    }

    #[test]
    fn patterns_returns_sorted_stored_entries() {
        let mut trie = Trie::new();
        trie.add(b"youtube.com");
        trie.add(b"example.com");
        let patterns = trie.patterns();
        assert_eq!(patterns, vec![b"example.com".to_vec(), b"youtube.com".to_vec()]);
    }

    #[test]
    fn empty_trie_never_matches() {
        let trie = Trie::new();
        assert_eq!(trie.lookup(b"anything", LookupMode::Unanchored), None);
    }
}
