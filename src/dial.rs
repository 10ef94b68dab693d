//! Low level connection opener

use std::{fmt, io, net::SocketAddr, sync::Arc};

use futures_util::future::BoxFuture;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::stream_traits_enum;

/// Network kind passed to the dial function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Network {
    Tcp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => f.write_str("tcp"),
        }
    }
}

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

pub type BoxedStream = Box<dyn AsyncStream>;

type DialFuture = BoxFuture<'static, io::Result<BoxedStream>>;

/// Replacement for the connection opener.
///
/// Called once for every physical connection, never for cache hits or reused
/// connections.
#[derive(Clone)]
pub struct DialFn(Arc<dyn Fn(Network, SocketAddr) -> DialFuture + Send + Sync>);

impl DialFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Network, SocketAddr) -> DialFuture + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for DialFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DialFn")
    }
}

stream_traits_enum! {
    pub enum DialStream {
        Tcp(TcpStream),
        Custom(BoxedStream),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dialer {
    dial: Option<DialFn>,
}

impl Dialer {
    pub fn new(dial: Option<DialFn>) -> Self {
        Self { dial }
    }

    pub async fn dial(&self, addr: SocketAddr) -> io::Result<DialStream> {
        log::debug!("dial {} {}", Network::Tcp, addr);
        match self.dial {
            Some(ref dial) => Ok(DialStream::Custom((dial.0)(Network::Tcp, addr).await?)),
            None => {
                let stream = TcpStream::connect(addr).await?;
                let _ = stream.set_nodelay(true);
                Ok(DialStream::Tcp(stream))
            }
        }
    }
}

/// Dial function that always connects to the given target, whatever address
/// the resolver asked for.
pub fn redirect(target: SocketAddr) -> DialFn {
    DialFn::new(move |_, _| {
        Box::pin(async move {
            let stream = TcpStream::connect(target).await?;
            Ok(Box::new(stream) as BoxedStream)
        })
    })
}
