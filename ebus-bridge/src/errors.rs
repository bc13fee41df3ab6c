//! Error types for ebus-bridge.

use std::{fmt, io};

/// Errors returned by [`crate::transport::AdapterTransport`] implementations.
#[derive(Debug)]
pub enum TransportError {
    /// The underlying I/O operation failed.
    Io(io::Error),
    /// The adapter did not complete its init handshake before the deadline.
    InitTimeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "adapter I/O error: {e}"),
            Self::InitTimeout => write!(f, "adapter init handshake timed out"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors returned by [`crate::broker::BrokerClient`] implementations.
#[derive(Debug)]
pub enum BrokerError {
    /// The underlying transport to the broker failed.
    Io(io::Error),
    /// The broker connection was closed by the remote.
    Disconnected,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "broker I/O error: {e}"),
            Self::Disconnected => write!(f, "broker connection closed"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<io::Error> for BrokerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// A request envelope that failed to parse or validate.
#[derive(Debug)]
pub enum RequestError {
    /// The JSON payload itself was malformed or missing the `telegram` key.
    Malformed(String),
    /// The `telegram` field's hex payload did not parse into valid octets.
    BadHex,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(s) => write!(f, "malformed request: {s}"),
            Self::BadHex => write!(f, "request telegram field is not valid hex"),
        }
    }
}

impl std::error::Error for RequestError {}
