//! Connection hook handed to hickory

use std::{fmt, net::SocketAddr, sync::Arc};

use futures_util::{
    future::{self, BoxFuture, Ready},
    stream::{self, Once},
    FutureExt,
};
use hickory_resolver::{
    config::{NameServerConfig, ResolverOpts},
    error::ResolveError,
    name_server::{ConnectionProvider, TokioRuntimeProvider},
    proto::{
        op::Message,
        xfer::{DnsHandle, DnsRequest, DnsResponse},
    },
};

use crate::{
    cache::TtlCache,
    transport::{ExchangeTrait, Transport},
    ExchangeResult,
};

struct Shared {
    transport: Transport,
    cache: Option<TtlCache>,
}

impl Shared {
    async fn exchange(&self, addr: SocketAddr, query: &[u8]) -> ExchangeResult<Vec<u8>> {
        match self.cache {
            Some(ref cache) => {
                cache
                    .lookup(query, self.transport.exchange(addr, query))
                    .await
            }
            None => self.transport.exchange(addr, query).await,
        }
    }
}

/// Hands hickory one [`SecureHandle`] per name server, i.e. per bootstrap
/// address.
#[derive(Clone)]
pub struct SecureConnectionProvider {
    shared: Arc<Shared>,
}

impl fmt::Debug for SecureConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureConnectionProvider")
            .field("transport", &self.shared.transport.name())
            .field("cache", &self.shared.cache.is_some())
            .finish()
    }
}

impl SecureConnectionProvider {
    pub fn new(transport: Transport, cache: Option<TtlCache>) -> Self {
        Self {
            shared: Arc::new(Shared { transport, cache }),
        }
    }

    pub fn cache(&self) -> Option<&TtlCache> {
        self.shared.cache.as_ref()
    }

    pub fn transport(&self) -> &Transport {
        &self.shared.transport
    }
}

impl ConnectionProvider for SecureConnectionProvider {
    type Conn = SecureHandle;
    type FutureConn = Ready<Result<SecureHandle, ResolveError>>;
    type RuntimeProvider = TokioRuntimeProvider;

    fn new_connection(&self, config: &NameServerConfig, _options: &ResolverOpts) -> Self::FutureConn {
        future::ready(Ok(SecureHandle {
            shared: self.shared.clone(),
            addr: config.socket_addr,
        }))
    }
}

/// Sends every request as one exchange with a single server address.
#[derive(Clone)]
pub struct SecureHandle {
    shared: Arc<Shared>,
    addr: SocketAddr,
}

impl fmt::Debug for SecureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureHandle")
            .field("addr", &self.addr)
            .finish()
    }
}

impl DnsHandle for SecureHandle {
    type Response = Once<BoxFuture<'static, Result<DnsResponse, ResolveError>>>;
    type Error = ResolveError;

    fn send<R: Into<DnsRequest> + Unpin + Send + 'static>(&self, request: R) -> Self::Response {
        let shared = self.shared.clone();
        let addr = self.addr;
        let request: DnsRequest = request.into();

        stream::once(
            async move {
                let query = request.to_vec()?;
                let answer = shared.exchange(addr, &query).await.map_err(|e| {
                    log::warn!("exchange with {} failed: {}", addr, e);
                    ResolveError::from(e)
                })?;
                let message = Message::from_vec(&answer)?;
                Ok::<_, ResolveError>(DnsResponse::new(message, answer))
            }
            .boxed(),
        )
    }
}
