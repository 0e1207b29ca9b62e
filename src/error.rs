use thiserror::Error;

/// Error kinds surfaced by the packet-mangling core.
///
/// Everything below `ConfigInvalid` is swallowed internally by
/// [`crate::engine::process_packet`] and turned into a [`crate::engine::Verdict`];
/// it never unwinds across the host boundary. Only configuration and
/// transport setup are fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed packet: {reason}")]
    MalformedPacket { reason: &'static str },

    #[error("unsupported protocol")]
    UnsupportedProtocol,

    #[error("invalid tls data: {reason}")]
    TlsInvalid { reason: &'static str },

    #[error("no section matched")]
    NotMatched,

    #[error("allocation failed")]
    AllocFailure,

    #[error("invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("transport error: {message}")]
    TransportError { message: String },
}

impl Error {
    /// True for the two variants that are fatal at process startup rather
    /// than reduced to an `Accept` verdict.
    pub fn is_fatal_at_load(&self) -> bool {
        matches!(self, Error::ConfigInvalid { .. })
    }

    pub fn malformed(reason: &'static str) -> Self {
        Error::MalformedPacket { reason }
    }

    pub fn tls_invalid(reason: &'static str) -> Self {
        Error::TlsInvalid { reason }
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Error::ConfigInvalid {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
