//! Thin, install-once logging/breadcrumb sink.
//!
//! The core never links a concrete logging backend. A host (the
//! `sniveild` binary, or a test) installs a sink closure once; everything
//! else in this crate calls the free functions below.

use bitflags::bitflags;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

static LOGGER: Lazy<LogManager> = Lazy::new(LogManager::new);

pub fn warn(message: impl Into<String>) {
    LOGGER.log(LogLevel::Warn, message.into());
}

pub fn error(message: impl Into<String>) {
    LOGGER.log(LogLevel::Error, message.into());
}

pub fn info(message: impl Into<String>) {
    LOGGER.log(LogLevel::Info, message.into());
}

pub fn debug(message: impl Into<String>) {
    LOGGER.log(LogLevel::Debug, message.into());
}

pub fn breadcrumb(flag: BreadcrumbFlags, message: impl Into<String>) {
    LOGGER.breadcrumb(flag, message.into());
}

pub fn install_sink(sink: Sink, level: LogLevel, breadcrumbs: BreadcrumbFlags) {
    LOGGER.install_sink(sink, level, breadcrumbs);
}

pub fn uninstall_sink() {
    LOGGER.uninstall_sink();
}

pub fn set_breadcrumb_mask(mask: BreadcrumbFlags) {
    LOGGER.set_breadcrumb_mask(mask);
}

pub type Sink = Box<dyn Fn(LogLevel, BreadcrumbFlags, &str) + Send + Sync>;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BreadcrumbFlags: u32 {
        const PARSER   = 0b0000_0001;
        const TLS      = 0b0000_0010;
        const TRIE     = 0b0000_0100;
        const ENGINE   = 0b0000_1000;
        const STRATEGY = 0b0001_0000;
        const CONFIG   = 0b0010_0000;
        const ALL      = u32::MAX;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "error" | "err" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "dbg" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

struct SinkInner {
    sink: Sink,
    min_level: LogLevel,
    breadcrumbs: BreadcrumbFlags,
}

struct LogManager {
    sink: Mutex<Option<SinkInner>>,
    prefix: &'static str,
}

impl LogManager {
    fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            prefix: "sniveil",
        }
    }

    fn install_sink(&self, sink: Sink, min_level: LogLevel, breadcrumbs: BreadcrumbFlags) {
        *self.sink.lock() = Some(SinkInner {
            sink,
            min_level,
            breadcrumbs,
        });
    }

    fn uninstall_sink(&self) {
        *self.sink.lock() = None;
    }

    fn set_breadcrumb_mask(&self, mask: BreadcrumbFlags) {
        if let Some(inner) = self.sink.lock().as_mut() {
            inner.breadcrumbs = mask;
        }
    }

    fn log(&self, level: LogLevel, message: String) {
        if message.is_empty() {
            return;
        }
        self.dispatch(level, BreadcrumbFlags::empty(), message);
    }

    fn breadcrumb(&self, flag: BreadcrumbFlags, message: String) {
        if message.is_empty() || flag.is_empty() {
            return;
        }
        self.dispatch(LogLevel::Debug, flag, message);
    }

    fn dispatch(&self, level: LogLevel, breadcrumbs: BreadcrumbFlags, message: String) {
        let guard = self.sink.lock();
        let Some(inner) = guard.as_ref() else { return };
        if level > inner.min_level && breadcrumbs.is_empty() {
            return;
        }
        if !breadcrumbs.is_empty() && !inner.breadcrumbs.intersects(breadcrumbs) {
            return;
        }
        let formatted = format!("[{}] {}", self.prefix, message);
        (inner.sink)(level, breadcrumbs, &formatted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn sink_receives_level_gated_messages() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        install_sink(
            Box::new(move |_level, _flags, _msg| {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
            LogLevel::Warn,
            BreadcrumbFlags::empty(),
        );
        error("boom");
        warn("careful");
        debug("should be filtered, min_level is warn");
        assert_eq!(count.load(Ordering::SeqCst), 2);
        uninstall_sink();
    }

    #[test]
    fn breadcrumb_requires_mask_intersection() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        install_sink(
            Box::new(move |_level, _flags, _msg| {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
            LogLevel::Error,
            BreadcrumbFlags::TLS,
        );
        breadcrumb(BreadcrumbFlags::PARSER, "parser event");
        breadcrumb(BreadcrumbFlags::TLS, "tls event");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        uninstall_sink();
    }
}
