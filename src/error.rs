//! Error types for the rendezvous relay.

use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or running the relay.
#[derive(Error, Debug)]
pub enum Error {
    /// A listening socket could not be bound
    #[error("failed to bind to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// An outbound connection could not be established
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The listener loop hit an accept error it cannot recover from
    #[error("accept failed on {addr}: {source}")]
    Accept {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this error aborts startup.
    ///
    /// Setup-fatal errors are reported once and never retried.
    pub fn is_setup_fatal(&self) -> bool {
        matches!(
            self,
            Error::Bind { .. } | Error::Connect { .. } | Error::Config(_)
        )
    }

    /// Check if binding failed on a port that usually needs elevated privileges.
    pub fn is_privileged_bind(&self) -> bool {
        match self {
            Error::Bind { port, source } => {
                *port < 1024 || source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}
