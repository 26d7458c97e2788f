//! Monsti daemon: the service façade, the signal bus and the socket runtime
//! that exposes them to handler processes.

pub mod core_types;
mod error;
pub mod mail;
pub mod paths;
pub mod protocol;
pub mod requests;
mod runtime;
pub mod service;
pub mod settings;
pub mod signal;

pub use error::{DaemonError, ErrorKind};
pub use protocol::{send_request, Client, DaemonRequest, DaemonResponse};
pub use runtime::{run, serve, start_blocking};
pub use service::MonstiService;
pub use settings::DaemonSettings;
pub use signal::{ReceivedSignal, SignalBus};
