//! Kapibara Dns Error Handle

use std::io::ErrorKind;

use hickory_resolver::{error::ResolveError, proto::error::ProtoError};
use http::StatusCode;
use thiserror::Error;
use tokio::time::error::Elapsed;

use crate::TlsError;

/// The secure server address could not be determined.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("io error ({0})")]
    Io(#[from] std::io::Error),
    #[error("bootstrap timeout")]
    Timeout(#[from] Elapsed),
    #[error("no address resolved for {0}")]
    Empty(String),
}

/// Connection, tls or http failure during one exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error ({0})")]
    Io(#[from] std::io::Error),
    #[error("tls handshake error ({0})")]
    Tls(std::io::Error),
    #[error("http error ({0})")]
    Http(#[from] hyper::Error),
    #[error("http status {0}")]
    Status(StatusCode),
    #[error("exchange timeout")]
    Timeout(#[from] Elapsed),
    #[error("invalid request ({0})")]
    InvalidRequest(String),
}

/// The server answered with something that is not a dns message frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed dns message ({0})")]
    Decode(#[from] ProtoError),
    #[error("empty dns frame")]
    EmptyFrame,
    #[error("dns message too large ({0} bytes)")]
    Oversized(usize),
    #[error("unexpected content type {0}")]
    ContentType(String),
    #[error("message id mismatch (expected {expected}, got {actual})")]
    IdMismatch { expected: u16, actual: u16 },
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport error ({0})")]
    Transport(#[from] TransportError),
    #[error("protocol error ({0})")]
    Protocol(#[from] ProtocolError),
}

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.into())
    }
}

impl From<Elapsed> for ExchangeError {
    fn from(err: Elapsed) -> Self {
        Self::Transport(err.into())
    }
}

impl From<hyper::Error> for ExchangeError {
    fn from(err: hyper::Error) -> Self {
        Self::Transport(err.into())
    }
}

impl From<ExchangeError> for ResolveError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Transport(err) => {
                let kind = match err {
                    TransportError::Io(ref e) => e.kind(),
                    TransportError::Timeout(_) => ErrorKind::TimedOut,
                    TransportError::Tls(_) => ErrorKind::ConnectionAborted,
                    _ => ErrorKind::Other,
                };
                std::io::Error::new(kind, err).into()
            }
            ExchangeError::Protocol(ProtocolError::Decode(err)) => err.into(),
            ExchangeError::Protocol(err) => ProtoError::from(err.to_string()).into(),
        }
    }
}

/// Construction of a secure resolver failed.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("bootstrap error ({0})")]
    Bootstrap(#[from] BootstrapError),
    #[error("tls error ({0})")]
    Tls(#[from] TlsError),
    #[error("option error ({0})")]
    Option(String),
}

impl ExchangeError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ExchangeError::Transport(TransportError::Timeout(_)) => true,
            ExchangeError::Transport(TransportError::Io(err)) => {
                err.kind() == ErrorKind::TimedOut
            }
            _ => false,
        }
    }
}
