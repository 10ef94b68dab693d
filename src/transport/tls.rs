//! DNS over TLS

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::TlsConnector;

use crate::{
    dial::Dialer, ExchangeResult, ProtocolError, ResolverError, TlsClientOption, TransportError,
};

use super::{check_answer, ExchangeTrait, MAX_MESSAGE_SIZE};

/// Opens one tls connection per exchange, so frames of concurrent queries
/// never share a socket.
pub struct TlsTransport {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    dialer: Dialer,
    timeout: Duration,
}

impl fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsTransport")
            .field("server_name", &self.server_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TlsTransport {
    pub fn init(
        host: &str,
        tls_opt: &TlsClientOption,
        dialer: Dialer,
        timeout: Duration,
    ) -> Result<Self, ResolverError> {
        let server_name = tls_opt.server_name(host)?;
        let config = tls_opt.client_config(&[])?;

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
            dialer,
            timeout,
        })
    }

    async fn round_trip(&self, addr: SocketAddr, query: &[u8]) -> ExchangeResult<Vec<u8>> {
        let stream = self.dialer.dial(addr).await?;
        let mut stream = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(TransportError::Tls)?;

        write_frame(&mut stream, query).await?;
        let answer = read_frame(&mut stream).await?;
        let _ = stream.shutdown().await;

        check_answer(query, &answer)?;
        Ok(answer)
    }
}

impl ExchangeTrait for TlsTransport {
    async fn exchange(&self, addr: SocketAddr, query: &[u8]) -> ExchangeResult<Vec<u8>> {
        tokio::time::timeout(self.timeout, self.round_trip(addr, query)).await?
    }
}

/// Writes `msg` prefixed by its big endian u16 length.
pub async fn write_frame<W>(stream: &mut W, msg: &[u8]) -> ExchangeResult<()>
where
    W: AsyncWrite + Unpin,
{
    if msg.len() > MAX_MESSAGE_SIZE {
        return Err(TransportError::InvalidRequest(format!(
            "dns message too large ({} bytes)",
            msg.len()
        ))
        .into());
    }

    let mut buf = Vec::with_capacity(msg.len() + 2);
    buf.extend_from_slice(&(msg.len() as u16).to_be_bytes());
    buf.extend_from_slice(msg);
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads one length prefixed frame.
pub async fn read_frame<R>(stream: &mut R) -> ExchangeResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = stream.read_u16().await? as usize;
    if len == 0 {
        return Err(ProtocolError::EmptyFrame.into());
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}
