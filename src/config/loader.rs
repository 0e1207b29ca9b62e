//! Argv-token configuration loader (4.7, 13).
//!
//! A manual `env::args().skip(1)` loop over a closed set of recognized
//! flags, rejecting anything else outright. Both `--flag=value` and
//! `--flag value` forms are accepted.

use super::{
    Config, FakeSeqType, FakeSniType, FakeStrategies, FragmentationStrategy, Global, Section,
    SniDetection,
};
use crate::error::Error;

/// Builds an immutable [`Config`] from an argv-like token sequence. The
/// recognized options are closed; any unrecognized token fails the
/// whole load (4.7: "unknown tokens fail").
pub fn load_from_args<I, S>(args: I) -> Result<Config, Error>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let tokens: Vec<String> = args.into_iter().map(Into::into).collect();
    let mut iter = tokens.into_iter().peekable();

    let mut global = Global::default();
    let mut sections = vec![Section::default()];

    while let Some(token) = iter.next() {
        let (flag, inline_value) = split_flag(&token);

        match flag.as_str() {
            "--new-section" => sections.push(Section::default()),
            "--mark" => global.mark = parse_u32(&take_value(inline_value, &mut iter, &flag)?, &flag)?,
            "--queue-num" => global.queue_num = parse_u16(&take_value(inline_value, &mut iter, &flag)?, &flag)?,
            "--threads" => global.threads = parse_usize(&take_value(inline_value, &mut iter, &flag)?, &flag)?,
            "--log-level" => global.log_level = take_value(inline_value, &mut iter, &flag)?,
            "--daemonize" => global.daemonize = true,

            "--sni-domains" => {
                let section = current_section(&mut sections);
                for host in take_value(inline_value, &mut iter, &flag)?.split(',') {
                    if !host.is_empty() {
                        section.sni_domains.add(host.as_bytes());
                    }
                }
            }
            "--exclude-sni-domains" => {
                let section = current_section(&mut sections);
                for host in take_value(inline_value, &mut iter, &flag)?.split(',') {
                    if !host.is_empty() {
                        section.exclude_sni_domains.add(host.as_bytes());
                    }
                }
            }
            "--all-domains" => current_section(&mut sections).all_domains = true,
            "--sni-detection" => {
                current_section(&mut sections).sni_detection =
                    parse_sni_detection(&take_value(inline_value, &mut iter, &flag)?)?
            }
            "--frag" => {
                current_section(&mut sections).fragmentation_strategy =
                    parse_frag_strategy(&take_value(inline_value, &mut iter, &flag)?)?
            }
            "--frag-sni-reverse" => current_section(&mut sections).frag_sni_reverse = true,
            "--frag-middle-sni" => current_section(&mut sections).frag_middle_sni = true,
            "--frag-sni-pos" => {
                let pos = parse_usize(&take_value(inline_value, &mut iter, &flag)?, &flag)?;
                current_section(&mut sections).frag_sni_pos = Some(pos);
            }
            "--connbytes-limit" => {
                let limit = parse_u32(&take_value(inline_value, &mut iter, &flag)?, &flag)?;
                current_section(&mut sections).connbytes_limit = Some(limit);
            }
            "--tls-enabled" => current_section(&mut sections).tls_enabled = true,
            "--udp-mode" => current_section(&mut sections).udp_mode = true,
            "--synfaking" => current_section(&mut sections).synfaking = true,

            "--fake-sni" => current_section(&mut sections).fake_sni.enabled = true,
            "--fake-sni-seq-len" => {
                let len = parse_u8(&take_value(inline_value, &mut iter, &flag)?, &flag)?;
                current_section(&mut sections).fake_sni.seq_len = len;
            }
            "--fake-sni-type" => {
                current_section(&mut sections).fake_sni.kind =
                    parse_fake_sni_type(&take_value(inline_value, &mut iter, &flag)?)?
            }
            "--fake-custom-payload" => {
                let hex = take_value(inline_value, &mut iter, &flag)?;
                current_section(&mut sections).fake_sni.fake_data = parse_hex(&hex)?;
            }
            "--fake-seq" => {
                current_section(&mut sections).fake_sni.seq_type =
                    parse_fake_seq_type(&take_value(inline_value, &mut iter, &flag)?)?
            }
            "--fake-sni-ttl" => {
                let ttl = parse_u8(&take_value(inline_value, &mut iter, &flag)?, &flag)?;
                current_section(&mut sections).fake_sni.ttl = Some(ttl);
            }
            "--faking-strategy" => {
                let value = take_value(inline_value, &mut iter, &flag)?;
                let section = current_section(&mut sections);
                for name in value.split(',') {
                    section.fake_sni.strategies |= parse_faking_strategy(name)?;
                }
            }

            other => {
                return Err(Error::config_invalid(format!(
                    "unknown argument '{other}'. Supported: --sni-domains, --exclude-sni-domains, \
                     --all-domains, --sni-detection, --fake-sni, --fake-sni-seq-len, --frag, \
                     --frag-sni-reverse, --frag-middle-sni, --frag-sni-pos, --fake-seq, \
                     --fake-sni-ttl, --fake-sni-type, --fake-custom-payload, --faking-strategy, \
                     --mark, --connbytes-limit, --queue-num, --threads, --log-level, \
                     --daemonize, --tls-enabled, --udp-mode, --synfaking, --new-section"
                )));
            }
        }
    }

    Ok(Config { global, sections })
}

fn current_section(sections: &mut [Section]) -> &mut Section {
    sections.last_mut().expect("sections is never empty")
}

fn take_value(
    inline: Option<&str>,
    iter: &mut std::iter::Peekable<std::vec::IntoIter<String>>,
    flag: &str,
) -> Result<String, Error> {
    if let Some(v) = inline {
        return Ok(v.to_string());
    }
    iter.next()
        .ok_or_else(|| Error::config_invalid(format!("'{flag}' requires a value")))
}

fn split_flag(token: &str) -> (String, Option<&str>) {
    match token.split_once('=') {
        Some((flag, value)) => (flag.to_string(), Some(value)),
        None => (token.to_string(), None),
    }
}

fn parse_u32(value: &str, flag: &str) -> Result<u32, Error> {
    value
        .parse()
        .map_err(|_| Error::config_invalid(format!("'{flag}' expects an integer, got '{value}'")))
}

fn parse_u16(value: &str, flag: &str) -> Result<u16, Error> {
    value
        .parse()
        .map_err(|_| Error::config_invalid(format!("'{flag}' expects an integer, got '{value}'")))
}

fn parse_u8(value: &str, flag: &str) -> Result<u8, Error> {
    value
        .parse()
        .map_err(|_| Error::config_invalid(format!("'{flag}' expects an integer, got '{value}'")))
}

fn parse_usize(value: &str, flag: &str) -> Result<usize, Error> {
    value
        .parse()
        .map_err(|_| Error::config_invalid(format!("'{flag}' expects an integer, got '{value}'")))
}

fn parse_sni_detection(value: &str) -> Result<SniDetection, Error> {
    match value {
        "parse" => Ok(SniDetection::Parse),
        "brute" => Ok(SniDetection::Brute),
        other => Err(Error::config_invalid(format!(
            "'--sni-detection' expects parse|brute, got '{other}'"
        ))),
    }
}

fn parse_frag_strategy(value: &str) -> Result<FragmentationStrategy, Error> {
    match value {
        "tcp" => Ok(FragmentationStrategy::Tcp),
        "ip" => Ok(FragmentationStrategy::Ip),
        "none" => Ok(FragmentationStrategy::None),
        other => Err(Error::config_invalid(format!(
            "'--frag' expects tcp|ip|none, got '{other}'"
        ))),
    }
}

fn parse_fake_sni_type(value: &str) -> Result<FakeSniType, Error> {
    match value {
        "random" => Ok(FakeSniType::Random),
        "data" => Ok(FakeSniType::Data),
        other => Err(Error::config_invalid(format!(
            "'--fake-sni-type' expects random|data, got '{other}'"
        ))),
    }
}

fn parse_fake_seq_type(value: &str) -> Result<FakeSeqType, Error> {
    match value {
        "default" => Ok(FakeSeqType::Default),
        "past" => Ok(FakeSeqType::Past),
        "random" => Ok(FakeSeqType::Random),
        other => Err(Error::config_invalid(format!(
            "'--fake-seq' expects default|past|random, got '{other}'"
        ))),
    }
}

fn parse_faking_strategy(value: &str) -> Result<FakeStrategies, Error> {
    match value {
        "tcp-md5sum" => Ok(FakeStrategies::TCP_MD5SUM),
        "pastseq" => Ok(FakeStrategies::PASTSEQ),
        "ack-seq" => Ok(FakeStrategies::ACK_SEQ),
        "ttl" => Ok(FakeStrategies::TTL_OVERRIDE),
        "corrupt-checksum" => Ok(FakeStrategies::CORRUPT_CHECKSUM),
        "trunc-len" => Ok(FakeStrategies::TRUNCATED_LENGTH),
        other => Err(Error::config_invalid(format!(
            "'--faking-strategy' unknown strategy '{other}'"
        ))),
    }
}

fn parse_hex(value: &str) -> Result<Vec<u8>, Error> {
    if value.len() % 2 != 0 {
        return Err(Error::config_invalid(
            "'--fake-custom-payload' expects an even number of hex digits",
        ));
    }
    (0..value.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&value[i..i + 2], 16)
                .map_err(|_| Error::config_invalid(format!("'{value}' is not valid hex")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_single_section_with_include_and_exclude() {
        let config = load_from_args([
            "--mark=8258",
            "--sni-domains=youtube.com",
            "--exclude-sni-domains=music.youtube.com",
            "--fake-sni",
            "--fake-sni-seq-len=2",
        ])
        .unwrap();
        assert_eq!(config.global.mark, 8258);
        assert_eq!(config.sections.len(), 1);
        assert!(config.sections[0].fake_sni.enabled);
        assert_eq!(config.sections[0].fake_sni.seq_len, 2);
    }

    #[test]
    fn new_section_token_starts_a_fresh_section() {
        let config = load_from_args([
            "--sni-domains=youtube.com",
            "--new-section",
            "--sni-domains=example.com",
        ])
        .unwrap();
        assert_eq!(config.sections.len(), 2);
    }

    #[test]
    fn unknown_token_fails_the_whole_load() {
        let result = load_from_args(["--definitely-not-a-real-flag"]);
        assert!(result.is_err());
    }

    #[test]
    fn space_separated_value_form_is_accepted() {
        let config = load_from_args(["--mark", "42"]).unwrap();
        assert_eq!(config.global.mark, 42);
    }

    #[test]
    fn hex_payload_parses_into_bytes() {
        let config = load_from_args(["--fake-custom-payload=deadbeef"]).unwrap();
        assert_eq!(
            config.sections[0].fake_sni.fake_data,
            vec![0xde, 0xad, 0xbe, 0xef]
        );
    }
}
