//! DNS over HTTPS

use std::{
    fmt, io,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bytes::Bytes;
use http::{
    header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, HOST},
    Method, Request, Response, Uri,
};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    body::Incoming,
    client::conn::http1::{self, SendRequest},
};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;

use crate::{
    dial::Dialer, DohMethod, ExchangeResult, ProtocolError, ResolverError, TlsClientOption,
    TransportError,
};

use super::{check_answer, ExchangeTrait, MAX_MESSAGE_SIZE};

pub const DNS_MESSAGE: &str = "application/dns-message";

const DNS_VARIABLE: &str = "{?dns}";

/// Parsed DoH uri template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    host: String,
    port: u16,
    authority: String,
    path_and_query: String,
    method: DohMethod,
}

impl UriTemplate {
    /// Accepts `https://host[:port]/path` with an optional `{?dns}` variable.
    /// The variable selects GET, its absence selects POST.
    pub fn parse(template: &str) -> Result<Self, ResolverError> {
        let (uri, method) = match template.find(DNS_VARIABLE) {
            Some(pos) if pos + DNS_VARIABLE.len() == template.len() => {
                (&template[..pos], DohMethod::Get)
            }
            Some(_) => {
                return Err(ResolverError::Option(format!(
                    "{{?dns}} must end the uri template: {template}"
                )))
            }
            None => (template, DohMethod::Post),
        };
        if uri.contains('{') {
            return Err(ResolverError::Option(format!(
                "unsupported uri template expression: {template}"
            )));
        }

        let uri: Uri = uri
            .parse()
            .map_err(|e| ResolverError::Option(format!("invalid uri {template}: {e}")))?;
        if uri.scheme_str() != Some("https") {
            return Err(ResolverError::Option(format!(
                "doh uri must use https: {template}"
            )));
        }

        let authority = uri
            .authority()
            .ok_or_else(|| ResolverError::Option(format!("missing host in: {template}")))?;
        let host = authority.host();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(ResolverError::Option(format!("missing host in: {template}")));
        }

        let path_and_query = uri
            .path_and_query()
            .map(|p| p.as_str())
            .filter(|p| !p.is_empty())
            .unwrap_or("/");

        Ok(Self {
            host: host.to_owned(),
            port: authority.port_u16().unwrap_or(443),
            authority: authority.as_str().to_owned(),
            path_and_query: path_and_query.to_owned(),
            method,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn method(&self) -> DohMethod {
        self.method
    }

    /// Request target of a GET carrying `query`.
    pub fn expand(&self, query: &[u8]) -> String {
        let sep = if self.path_and_query.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{}dns={}",
            self.path_and_query,
            sep,
            URL_SAFE_NO_PAD.encode(query)
        )
    }

    pub fn request(&self, method: DohMethod, query: &[u8]) -> Result<Request<Full<Bytes>>, TransportError> {
        let builder = Request::builder()
            .header(HOST, self.authority.as_str())
            .header(ACCEPT, DNS_MESSAGE);

        let req = match method {
            DohMethod::Get => builder
                .method(Method::GET)
                .uri(self.expand(query))
                .body(Full::new(Bytes::new())),
            DohMethod::Post => builder
                .method(Method::POST)
                .uri(self.path_and_query.as_str())
                .header(CONTENT_TYPE, DNS_MESSAGE)
                .body(Full::new(Bytes::copy_from_slice(query))),
        };

        req.map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }
}

type Sender = SendRequest<Full<Bytes>>;

/// How long an idle connection is kept before it is dropped instead of reused.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

struct IdleSender {
    sender: Sender,
    since: Instant,
}

/// HTTP/1.1 DoH client keeping idle connections to the server.
///
/// Every bootstrap address belongs to the same server, so the idle pool is
/// shared by all of them. A query for one address may run over a connection
/// dialed for another; a new connection is dialed only when none is idle.
pub struct HttpsTransport {
    template: UriTemplate,
    method: DohMethod,
    connector: TlsConnector,
    server_name: ServerName<'static>,
    dialer: Dialer,
    timeout: Duration,
    idle_timeout: Duration,
    idle: Mutex<Vec<IdleSender>>,
}

impl fmt::Debug for HttpsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpsTransport")
            .field("template", &self.template)
            .field("method", &self.method)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpsTransport {
    pub fn init(
        template: UriTemplate,
        method: Option<DohMethod>,
        tls_opt: &TlsClientOption,
        dialer: Dialer,
        timeout: Duration,
    ) -> Result<Self, ResolverError> {
        let server_name = tls_opt.server_name(template.host())?;
        let config = tls_opt.client_config(&["http/1.1"])?;

        Ok(Self {
            method: method.unwrap_or(template.method()),
            template,
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
            dialer,
            timeout,
            idle_timeout: IDLE_TIMEOUT,
            idle: Mutex::new(Vec::new()),
        })
    }

    /// Most recently used live sender, dropping closed and stale ones.
    fn take_idle(&self) -> Option<Sender> {
        let now = Instant::now();
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        idle.retain(|i| !i.sender.is_closed() && now.duration_since(i.since) < self.idle_timeout);
        idle.pop().map(|i| i.sender)
    }

    fn put_idle(&self, sender: Sender) {
        if sender.is_closed() {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        idle.push(IdleSender {
            sender,
            since: Instant::now(),
        });
    }

    #[cfg(test)]
    fn idle_len(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn connect(&self, addr: SocketAddr) -> ExchangeResult<Sender> {
        let stream = self.dialer.dial(addr).await?;
        let stream = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(TransportError::Tls)?;

        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                log::warn!("doh connection to {} failed: {}", addr, e);
            }
        });

        Ok(sender)
    }

    async fn idle_sender(&self) -> Option<Sender> {
        while let Some(mut sender) = self.take_idle() {
            if sender.ready().await.is_ok() {
                return Some(sender);
            }
        }
        None
    }

    /// Sends `query` over an idle connection, falling back to a new one when
    /// the idle connection fails.
    async fn send(
        &self,
        addr: SocketAddr,
        query: &[u8],
    ) -> ExchangeResult<(Sender, Response<Incoming>)> {
        if let Some(mut sender) = self.idle_sender().await {
            let req = self.template.request(self.method, query)?;
            match sender.send_request(req).await {
                Ok(resp) => return Ok((sender, resp)),
                Err(e) => log::debug!("idle doh connection failed ({}), reconnecting", e),
            }
        }

        let req = self.template.request(self.method, query)?;
        let mut sender = self.connect(addr).await?;
        let resp = sender.send_request(req).await?;
        Ok((sender, resp))
    }

    async fn round_trip(&self, addr: SocketAddr, query: &[u8]) -> ExchangeResult<Vec<u8>> {
        let (sender, resp) = self.send(addr, query).await?;
        let status = resp.status();
        let content_type = resp.headers().get(CONTENT_TYPE).cloned();

        if let Some(len) = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
        {
            if len > MAX_MESSAGE_SIZE {
                return Err(ProtocolError::Oversized(len).into());
            }
        }

        let body = read_body(resp.into_body()).await?;
        self.put_idle(sender);

        if !status.is_success() {
            return Err(TransportError::Status(status).into());
        }

        if let Some(content_type) = content_type {
            let content_type = content_type.to_str().unwrap_or_default();
            if !content_type.starts_with(DNS_MESSAGE) {
                return Err(ProtocolError::ContentType(content_type.to_owned()).into());
            }
        }

        check_answer(query, &body)?;
        Ok(body.to_vec())
    }
}

/// Collects a response body of at most [`MAX_MESSAGE_SIZE`] bytes.
async fn read_body(body: Incoming) -> ExchangeResult<Bytes> {
    match Limited::new(body, MAX_MESSAGE_SIZE).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) => {
            if e.is::<LengthLimitError>() {
                return Err(ProtocolError::Oversized(MAX_MESSAGE_SIZE + 1).into());
            }
            match e.downcast::<hyper::Error>() {
                Ok(e) => Err((*e).into()),
                Err(e) => Err(TransportError::Io(io::Error::new(io::ErrorKind::Other, e)).into()),
            }
        }
    }
}

impl ExchangeTrait for HttpsTransport {
    async fn exchange(&self, addr: SocketAddr, query: &[u8]) -> ExchangeResult<Vec<u8>> {
        tokio::time::timeout(self.timeout, self.round_trip(addr, query)).await?
    }
}
