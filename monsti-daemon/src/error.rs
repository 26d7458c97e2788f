use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error surface for the service façade, signal bus, protocol and runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry error: {0}")]
    Registry(#[from] monsti_core::RegistryError),

    #[error("node store error: {0}")]
    Store(#[from] monsti_core::StoreError),

    #[error("site configuration error: {0}")]
    SiteConfig(#[from] monsti_core::SiteConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse daemon settings at {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("unknown site {0:?}")]
    UnknownSite(String),

    #[error("unknown signal subscriber {0:?}")]
    UnknownSubscriber(String),

    #[error("subscriber {0:?} has no signal awaiting completion")]
    NoPendingSignal(String),

    #[error("subscriber {subscriber:?} finished ticket {got}, but ticket {expected} is outstanding")]
    StaleSignalTicket {
        subscriber: String,
        expected: u64,
        got: u64,
    },

    #[error("subscriber {subscriber:?} abandoned signal {signal:?}")]
    SignalAbandoned { signal: String, subscriber: String },

    #[error("received error as signal response from {subscriber:?} to {signal:?}: {message}")]
    SignalFailed {
        signal: String,
        subscriber: String,
        message: String,
    },

    #[error("could not send mail: {0}")]
    Mail(String),

    /// An error reported by the daemon over the socket.
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },
}

/// Coarse classification carried over the wire with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Io,
    Protocol,
    Remote,
}

impl DaemonError {
    pub fn kind(&self) -> ErrorKind {
        use monsti_core::{RegistryError, StoreError};
        match self {
            DaemonError::Registry(RegistryError::DuplicateNodeType(_)) => ErrorKind::Conflict,
            DaemonError::Registry(_)
            | DaemonError::UnknownSite(_)
            | DaemonError::UnknownSubscriber(_) => ErrorKind::NotFound,
            DaemonError::Io { .. }
            | DaemonError::Store(StoreError::Io { .. })
            | DaemonError::SiteConfig(monsti_core::SiteConfigError::Io { .. })
            | DaemonError::Mail(_) => ErrorKind::Io,
            DaemonError::SignalFailed { .. } | DaemonError::SignalAbandoned { .. } => {
                ErrorKind::Remote
            }
            DaemonError::Remote { kind, .. } => *kind,
            _ => ErrorKind::Protocol,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
