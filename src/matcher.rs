//! SNI matcher (4.4): include-then-exclude over a section's tries,
//! exclude always wins.

use crate::config::Section;
use crate::trie::LookupMode;

/// Given a hostname slice, returns the matched sub-range (relative to
/// `hostname`) if the section targets it, or `None` if it doesn't (or
/// did, but `exclude_sni_domains` vetoed it).
pub fn match_hostname(section: &Section, hostname: &[u8]) -> Option<(usize, usize)> {
    let include = if section.all_domains {
        Some((0, hostname.len()))
    } else {
        section.sni_domains.lookup(hostname, LookupMode::MapToEnd)
    };

    let (offset, len) = include?;

    let excluded = section
        .exclude_sni_domains
        .lookup(hostname, LookupMode::MapToEnd)
        .is_some();

    if excluded {
        None
    } else {
        Some((offset, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Section, SniDetection};
    use crate::trie::Trie;

    fn section_with(include: &[&str], exclude: &[&str]) -> Section {
        let mut sni_domains = Trie::new();
        for d in include {
            sni_domains.add(d.as_bytes());
        }
        let mut exclude_sni_domains = Trie::new();
        for d in exclude {
            exclude_sni_domains.add(d.as_bytes());
        }
        Section {
            sni_domains,
            exclude_sni_domains,
            all_domains: false,
            sni_detection: SniDetection::Parse,
            ..Section::default()
        }
    }

    #[test]
    fn exclude_wins_over_include() {
        let section = section_with(&["youtube.com"], &["music.youtube.com"]);
        assert_eq!(match_hostname(&section, b"music.youtube.com"), None);
    }

    #[test]
    fn include_matches_when_not_excluded() {
        let section = section_with(&["youtube.com"], &["music.youtube.com"]);
        let result = match_hostname(&section, b"www.youtube.com").unwrap();
        assert_eq!(result, (4, 11));
    }

    #[test]
    fn all_domains_matches_unconditionally() {
        let mut section = section_with(&[], &[]);
        section.all_domains = true;
        assert_eq!(
            match_hostname(&section, b"anything.example"),
            Some((0, "anything.example".len()))
        );
    }

    #[test]
    fn no_include_match_returns_none() {
        let section = section_with(&["youtube.com"], &[]);
        assert_eq!(match_hostname(&section, b"example.com"), None);
    }
}
