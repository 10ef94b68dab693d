//! Loopback DoT and DoH servers answering from a fixed zone

use std::{
    collections::HashMap,
    io::{BufReader, Cursor},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    body::Body,
    extract::Query as HttpQuery,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bytes::Bytes;
use futures_util::stream;
use hickory_resolver::proto::{
    op::{Message, MessageType, OpCode, Query, ResponseCode},
    rr::{rdata::SOA, Name, RData, Record, RecordType},
};
use rustls::{crypto::ring, ServerConfig};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_rustls::TlsAcceptor;

use crate::{
    tls::option::load_certs,
    transport::{
        https::DNS_MESSAGE,
        tls::{read_frame, write_frame},
    },
    TlsClientOption,
};

pub const ZONE_TTL: u32 = 300;

pub fn cloudflare_addrs() -> Vec<IpAddr> {
    vec![
        IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
        IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1)),
        IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1111)),
        IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1001)),
    ]
}

pub fn query_bytes(id: u16, name: &str, rtype: RecordType) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    msg.add_query(Query::query(Name::from_ascii(name).unwrap(), rtype));
    msg.to_vec().unwrap()
}

pub fn build_answer(
    query: &[u8],
    rcode: ResponseCode,
    answers: Vec<Record>,
    authority: Vec<Record>,
) -> Vec<u8> {
    let request = Message::from_vec(query).unwrap();
    let mut msg = Message::new();
    msg.set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(rcode);
    msg.add_queries(request.queries().to_vec());
    msg.insert_answers(answers);
    msg.insert_name_servers(authority);
    msg.to_vec().unwrap()
}

pub fn soa_record() -> Record {
    let soa = SOA::new(
        Name::from_ascii("ns.test.").unwrap(),
        Name::from_ascii("hostmaster.test.").unwrap(),
        1,
        7200,
        900,
        1209600,
        60,
    );
    Record::from_rdata(Name::from_ascii("test.").unwrap(), 3600, RData::SOA(soa))
}

/// `one.one.one.one` has the cloudflare addresses, every other name is
/// NXDOMAIN.
pub fn answer_for(query: &[u8]) -> Vec<u8> {
    let request = Message::from_vec(query).unwrap();
    let question = request.queries()[0].clone();
    let name = question.name().clone();

    if name != Name::from_ascii("one.one.one.one.").unwrap() {
        return build_answer(query, ResponseCode::NXDomain, vec![], vec![soa_record()]);
    }

    let answers: Vec<Record> = cloudflare_addrs()
        .into_iter()
        .filter_map(|ip| match (ip, question.query_type()) {
            (IpAddr::V4(ip), RecordType::A) => Some(RData::A(ip.into())),
            (IpAddr::V6(ip), RecordType::AAAA) => Some(RData::AAAA(ip.into())),
            _ => None,
        })
        .map(|rdata| Record::from_rdata(name.clone(), ZONE_TTL, rdata))
        .collect();

    if answers.is_empty() {
        build_answer(query, ResponseCode::NoError, vec![], vec![soa_record()])
    } else {
        build_answer(query, ResponseCode::NoError, answers, vec![])
    }
}

/// Self signed certificate for `dns.test` and `localhost`.
pub struct TestCert {
    pub cert_pem: String,
    pub key_pem: String,
}

impl TestCert {
    pub fn generate() -> Self {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["dns.test".to_owned(), "localhost".to_owned()])
                .unwrap();
        Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        }
    }

    pub fn client_option(&self) -> TlsClientOption {
        TlsClientOption {
            ca_certs: vec![self.cert_pem.clone()],
            ..Default::default()
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        let mut cert_reader = BufReader::new(Cursor::new(self.cert_pem.clone()));
        let mut key_reader = BufReader::new(Cursor::new(self.key_pem.clone()));
        let certs = load_certs(&mut cert_reader).unwrap();
        let key = rustls_pemfile::private_key(&mut key_reader)
            .unwrap()
            .unwrap();

        ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .unwrap()
    }
}

pub struct MockDotServer {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockDotServer {
    pub async fn start(cert: &TestCert) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(cert.server_config()));
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = connections.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let Ok(mut stream) = acceptor.accept(stream).await else {
                        return;
                    };
                    while let Ok(query) = read_frame(&mut stream).await {
                        if write_frame(&mut stream, &answer_for(&query)).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        Self {
            addr,
            connections,
            task,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockDotServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct MockDohServer {
    pub addr: SocketAddr,
    handle: Handle,
}

fn dns_response(answer: Vec<u8>) -> Response {
    ([(CONTENT_TYPE, DNS_MESSAGE)], answer).into_response()
}

async fn doh_get(HttpQuery(params): HttpQuery<HashMap<String, String>>) -> Response {
    match params.get("dns").map(|q| URL_SAFE_NO_PAD.decode(q)) {
        Some(Ok(query)) if Message::from_vec(&query).is_ok() => dns_response(answer_for(&query)),
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn doh_post(body: Bytes) -> Response {
    if Message::from_vec(&body).is_err() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    dns_response(answer_for(&body))
}

/// Body length above the largest dns message.
const OVERSIZED_BODY: usize = 70 * 1024;

async fn oversized_chunked() -> Response {
    let chunks = stream::iter(
        (0..OVERSIZED_BODY / 1024).map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![0u8; 1024]))),
    );
    ([(CONTENT_TYPE, DNS_MESSAGE)], Body::from_stream(chunks)).into_response()
}

impl MockDohServer {
    pub async fn start(cert: &TestCert) -> Self {
        let app = Router::new()
            .route("/dns-query", get(doh_get).post(doh_post))
            .route(
                "/unavailable",
                get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
            )
            .route(
                "/html",
                get(|| async { ([(CONTENT_TYPE, "text/html")], "<html></html>") }),
            )
            .route(
                "/oversized",
                get(|| async { dns_response(vec![0u8; OVERSIZED_BODY]) }),
            )
            .route("/oversized-chunked", get(oversized_chunked));

        let config = RustlsConfig::from_config(Arc::new(cert.server_config()));
        let handle = Handle::new();
        let server = axum_server::bind_rustls(([127, 0, 0, 1], 0).into(), config)
            .handle(handle.clone());
        tokio::spawn(async move {
            let _ = server.serve(app.into_make_service()).await;
        });

        let addr = handle.listening().await.unwrap();
        Self { addr, handle }
    }
}

impl Drop for MockDohServer {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}
