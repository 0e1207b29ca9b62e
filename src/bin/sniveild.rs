//! Host adapter (10): wires the packet-mangling core to a packet
//! source. Default transport is a length-prefixed stdin/stdout pipe for
//! fixture-driven testing; the `nfq` feature swaps that for a real
//! Linux netfilter queue plus a raw `IP_HDRINCL` socket for injection.
//!
//! Argument parsing is a manual loop over `env::args()`, `--flag` /
//! `--flag=value` accepted, anything left over handed to the core's
//! own argv loader. Errors bubble up through `anyhow` with `.context`
//! annotations at each fallible setup step.

use anyhow::{bail, Context, Result};
use sniveil_core::config::{self, Config};
use sniveil_core::logger::{self, BreadcrumbFlags, LogLevel};
use sniveil_core::{process_packet, ConfigHandle, Statistics, Verdict};
use std::io::{self, Read, Write};

struct Settings {
    queue_num: Option<u16>,
    dump_config: bool,
    config_tokens: Vec<String>,
}

impl Settings {
    fn parse() -> Result<Self> {
        let mut queue_num = None;
        let mut dump_config = false;
        let mut config_tokens = Vec::new();

        let mut args = std::env::args().skip(1).peekable();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--queue-num=") {
                queue_num = Some(
                    value
                        .parse::<u16>()
                        .with_context(|| format!("invalid --queue-num value '{value}'"))?,
                );
            } else if arg == "--queue-num" {
                let value = args
                    .next()
                    .context("'--queue-num' requires a value")?;
                queue_num = Some(
                    value
                        .parse::<u16>()
                        .with_context(|| format!("invalid --queue-num value '{value}'"))?,
                );
            } else if arg == "--dump-config" {
                dump_config = true;
            } else {
                config_tokens.push(arg);
            }
        }

        Ok(Settings {
            queue_num,
            dump_config,
            config_tokens,
        })
    }
}

fn install_log_sink() {
    let level = LogLevel::from_str(&std::env::var("SNIVEIL_LOG").unwrap_or_else(|_| "info".into()));
    logger::install_sink(
        Box::new(|level, flags, message| {
            let _ = flags;
            eprintln!("{level:?}: {message}");
        }),
        level,
        BreadcrumbFlags::empty(),
    );
}

fn build_config(settings: &Settings) -> Result<Config> {
    let mut config = config::load_from_args(settings.config_tokens.iter().cloned())
        .context("loading configuration from arguments")?;
    if let Some(queue_num) = settings.queue_num {
        config.global.queue_num = queue_num;
    }
    Ok(config)
}

fn main() -> Result<()> {
    install_log_sink();

    let settings = Settings::parse().context("parsing command-line arguments")?;
    let config = build_config(&settings)?;

    if settings.dump_config {
        println!("{}", config.dump());
        return Ok(());
    }

    let queue_num = config.global.queue_num;
    let handle = ConfigHandle::new(config);
    let stats = Statistics::new();

    logger::info(format!("sniveild starting, queue {queue_num}"));

    if cfg!(feature = "nfq") {
        run_nfq(&handle, &stats, queue_num).context("running the nfqueue transport")?;
    } else {
        run_stdio(&handle, &stats).context("running the stdio transport")?;
    }

    let snapshot = stats.snapshot();
    logger::info(format!(
        "sniveild stopping: captured={} processed={} targeted={} injected={}",
        snapshot.captured, snapshot.processed, snapshot.targeted, snapshot.injected
    ));
    Ok(())
}

/// Fixture transport: each frame on stdin is a 4-byte big-endian length
/// followed by that many raw packet bytes. For each input frame, writes
/// zero or more output frames to stdout in the same format — zero for
/// `Drop`, one (the original bytes) for `Accept`, and one per buffer for
/// `Replace`. Lets tests drive the engine without a real queue.
fn run_stdio(handle: &ConfigHandle, stats: &Statistics) -> Result<()> {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    loop {
        let mut len_bytes = [0u8; 4];
        match stdin.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e).context("reading frame length from stdin"),
        }
        let len = u32::from_be_bytes(len_bytes) as usize;
        let mut buf = vec![0u8; len];
        stdin
            .read_exact(&mut buf)
            .context("reading frame body from stdin")?;

        let config = handle.load();
        let verdict = process_packet(&config, &buf, 0, stats);
        match verdict {
            Verdict::Drop => {}
            Verdict::Accept => write_frame(&mut stdout, &buf)?,
            Verdict::Replace(buffers) => {
                for buffer in &buffers {
                    write_frame(&mut stdout, buffer)?;
                }
            }
        }
    }
}

fn write_frame<W: Write>(out: &mut W, buf: &[u8]) -> Result<()> {
    out.write_all(&(buf.len() as u32).to_be_bytes())
        .and_then(|()| out.write_all(buf))
        .and_then(|()| out.flush())
        .context("writing frame to stdout")
}

#[cfg(feature = "nfq")]
fn run_nfq(handle: &ConfigHandle, stats: &Statistics, queue_num: u16) -> Result<()> {
    use nfq::{Queue, Verdict as NfVerdict};

    let mut queue = Queue::open().context("opening nfqueue")?;
    queue
        .bind(u32::from(queue_num))
        .context("binding nfqueue")?;

    let injector = RawInjector::open()?;

    loop {
        let mut msg = queue.recv().context("receiving from nfqueue")?;

        let config = handle.load();
        let mark = msg.get_nfmark();
        let verdict = process_packet(&config, msg.get_payload(), mark, stats);

        match verdict {
            Verdict::Accept => msg.set_verdict(NfVerdict::Accept),
            Verdict::Drop => msg.set_verdict(NfVerdict::Drop),
            Verdict::Replace(buffers) => {
                for buffer in &buffers {
                    if let Err(e) = injector.send(buffer) {
                        logger::warn(format!("injection failed: {e}"));
                    }
                }
                msg.set_verdict(NfVerdict::Drop);
            }
        }

        queue.verdict(msg).context("setting nfqueue verdict")?;
    }
}

#[cfg(not(feature = "nfq"))]
fn run_nfq(_handle: &ConfigHandle, _stats: &Statistics, _queue_num: u16) -> Result<()> {
    unreachable!("run_nfq is only called when the nfq feature is enabled")
}

/// Raw `IP_HDRINCL` socket used to put a `Replace` verdict's synthesized
/// buffers back on the wire. IPv4 only: Linux raw sockets don't offer an
/// equivalent full-header-include mode for IPv6, so a v6 `Replace`
/// buffer is logged and dropped rather than guessed at.
#[cfg(feature = "nfq")]
struct RawInjector {
    fd: libc::c_int,
}

#[cfg(feature = "nfq")]
impl RawInjector {
    fn open() -> Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_RAW) };
        if fd < 0 {
            bail!("raw socket open failed: {}", io::Error::last_os_error());
        }
        let on: libc::c_int = 1;
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::IPPROTO_IP,
                libc::IP_HDRINCL,
                &on as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            bail!(
                "IP_HDRINCL setsockopt failed: {}",
                io::Error::last_os_error()
            );
        }
        Ok(RawInjector { fd })
    }

    fn send(&self, buffer: &[u8]) -> Result<()> {
        if buffer.len() < 20 || buffer[0] >> 4 != 4 {
            logger::warn("dropping non-ipv4 replacement buffer: no v6 raw-inject path");
            return Ok(());
        }
        let dst = &buffer[16..20];
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_addr.s_addr = u32::from_ne_bytes([dst[0], dst[1], dst[2], dst[3]]);

        let rc = unsafe {
            libc::sendto(
                self.fd,
                buffer.as_ptr() as *const libc::c_void,
                buffer.len(),
                0,
                &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error()).context("sendto on raw injection socket");
        }
        Ok(())
    }
}

#[cfg(feature = "nfq")]
impl Drop for RawInjector {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
