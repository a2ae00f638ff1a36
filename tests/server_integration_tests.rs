mod common;

use common::{StaticProvider, create_test_query, create_test_query_with_id, zone_document, zone_name};
use scwdns::dns::DNSPacket;
use scwdns::dns::enums::{DNSResourceClass, DNSResourceType, ResponseCode};
use scwdns::dns::resource::DNSResource;
use scwdns::error::DnsError;
use scwdns::handler::{Forwarder, Handler};
use scwdns::server::{run_tcp_server, run_udp_server};
use scwdns::shutdown::Shutdown;
use scwdns::{AuthoritySettings, ScalewayAuthority};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

const ORIGIN: &str = "example.com.";

struct TestServer {
    udp: SocketAddr,
    tcp: SocketAddr,
    shutdown: Shutdown,
    authority: Arc<ScalewayAuthority>,
}

impl TestServer {
    async fn start(document: String, next: Option<Arc<dyn Handler>>) -> Self {
        let provider = Arc::new(StaticProvider::new());
        provider.set(ORIGIN, document);
        let mut authority =
            ScalewayAuthority::new(AuthoritySettings::new(vec![zone_name(ORIGIN)]), provider);
        if let Some(next) = next {
            authority = authority.with_next(next);
        }
        let authority = Arc::new(authority);
        authority.start().await.unwrap();

        let udp_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let tcp_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let udp = udp_socket.local_addr().unwrap();
        let tcp = tcp_listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let handler: Arc<dyn Handler> = authority.clone();
        tokio::spawn(run_udp_server(udp_socket, Arc::clone(&handler), shutdown.subscribe()));
        tokio::spawn(run_tcp_server(tcp_listener, handler, shutdown.subscribe()));

        Self {
            udp,
            tcp,
            shutdown,
            authority,
        }
    }

    async fn stop(self) {
        self.shutdown.trigger();
        self.authority.stop().await;
    }
}

async fn udp_exchange_raw(server: SocketAddr, bytes: &[u8]) -> DNSPacket {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(bytes, server).await.unwrap();
    let mut buf = vec![0u8; 4096];
    let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .expect("no UDP response")
        .unwrap();
    DNSPacket::parse(&buf[..len]).unwrap()
}

async fn udp_exchange(server: SocketAddr, query: &DNSPacket) -> DNSPacket {
    udp_exchange_raw(server, &query.serialize().unwrap()).await
}

async fn tcp_exchange(stream: &mut TcpStream, query: &DNSPacket) -> DNSPacket {
    let bytes = query.serialize().unwrap();
    stream
        .write_all(&(bytes.len() as u16).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(&bytes).await.unwrap();

    let mut length = [0u8; 2];
    timeout(Duration::from_secs(2), stream.read_exact(&mut length))
        .await
        .expect("no TCP response")
        .unwrap();
    let mut body = vec![0u8; u16::from_be_bytes(length) as usize];
    stream.read_exact(&mut body).await.unwrap();
    DNSPacket::parse(&body).unwrap()
}

fn document_with_large_rrset() -> String {
    let mut document = zone_document(ORIGIN, 1, "192.0.2.1");
    for i in 0..10 {
        document.push_str(&format!("big IN TXT \"record {i} {}\"\n", "x".repeat(80)));
    }
    document
}

#[tokio::test]
async fn test_udp_query() {
    let server = TestServer::start(zone_document(ORIGIN, 1, "192.0.2.1"), None).await;

    let query = create_test_query_with_id(4321, "www.example.com", DNSResourceType::A);
    let response = udp_exchange(server.udp, &query).await;

    assert_eq!(response.header.id, 4321);
    assert!(response.header.qr);
    assert!(response.header.aa);
    assert_eq!(response.rcode(), Some(ResponseCode::NoError));
    assert_eq!(response.questions, query.questions);
    assert_eq!(response.answers.len(), 1);
    assert_eq!(response.answers[0].rdata, vec![192, 0, 2, 1]);

    server.stop().await;
}

#[tokio::test]
async fn test_tcp_connection_serves_several_queries() {
    let server = TestServer::start(zone_document(ORIGIN, 1, "192.0.2.1"), None).await;
    let mut stream = TcpStream::connect(server.tcp).await.unwrap();

    let response = tcp_exchange(
        &mut stream,
        &create_test_query_with_id(1, "mail.example.com", DNSResourceType::A),
    )
    .await;
    assert_eq!(response.header.id, 1);
    assert_eq!(response.answers[0].rdata, vec![192, 0, 2, 25]);

    let response = tcp_exchange(
        &mut stream,
        &create_test_query_with_id(2, "missing.example.com", DNSResourceType::A),
    )
    .await;
    assert_eq!(response.header.id, 2);
    assert_eq!(response.rcode(), Some(ResponseCode::NameError));

    server.stop().await;
}

#[tokio::test]
async fn test_large_udp_response_is_truncated() {
    let server = TestServer::start(document_with_large_rrset(), None).await;
    let query = create_test_query("big.example.com", DNSResourceType::TXT);

    let response = udp_exchange(server.udp, &query).await;
    assert!(response.header.tc);
    assert!(response.answers.is_empty());
    assert_eq!(response.questions, query.questions);

    let mut stream = TcpStream::connect(server.tcp).await.unwrap();
    let response = tcp_exchange(&mut stream, &query).await;
    assert!(!response.header.tc);
    assert_eq!(response.answers.len(), 10);

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_queries_get_formerr() {
    let server = TestServer::start(zone_document(ORIGIN, 1, "192.0.2.1"), None).await;

    // Header claims a question that is not there
    let raw = [0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0x07, b'e'];
    let response = udp_exchange_raw(server.udp, &raw).await;
    assert_eq!(response.header.id, 0x1234);
    assert_eq!(response.rcode(), Some(ResponseCode::FormatError));

    let mut query = create_test_query("www.example.com", DNSResourceType::A);
    query.questions.push(query.questions[0].clone());
    query.header.qdcount = 2;
    let response = udp_exchange(server.udp, &query).await;
    assert_eq!(response.rcode(), Some(ResponseCode::FormatError));

    server.stop().await;
}

#[tokio::test]
async fn test_unsupported_opcode_gets_notimp() {
    let server = TestServer::start(zone_document(ORIGIN, 1, "192.0.2.1"), None).await;

    let mut query = create_test_query("www.example.com", DNSResourceType::A);
    query.header.opcode = 2;
    let response = udp_exchange(server.udp, &query).await;
    assert_eq!(response.rcode(), Some(ResponseCode::NotImplemented));
    assert!(response.answers.is_empty());

    server.stop().await;
}

/// Fake upstream that answers every query with one A record
async fn spawn_upstream(answer: [u8; 4]) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        while let Ok((len, src)) = socket.recv_from(&mut buf).await {
            let Ok(query) = DNSPacket::parse(&buf[..len]) else {
                continue;
            };
            let mut response = DNSPacket::reply_to(&query);
            response.header.ra = true;
            response.answers.push(DNSResource {
                labels: query.questions[0].labels.clone(),
                rtype: DNSResourceType::A,
                rclass: DNSResourceClass::IN,
                ttl: 60,
                rdata: answer.to_vec(),
                parsed_rdata: None,
            });
            let _ = socket.send_to(&response.serialize().unwrap(), src).await;
        }
    });
    addr
}

#[tokio::test]
async fn test_forwarder_relays_to_upstream() {
    let upstream = spawn_upstream([203, 0, 113, 7]).await;
    let forwarder = Forwarder::new(upstream, Duration::from_secs(2));

    let query = create_test_query_with_id(77, "example.org", DNSResourceType::A);
    let response = forwarder.forward(&query).await.unwrap();
    assert_eq!(response.header.id, 77);
    assert!(response.header.ra);
    assert_eq!(response.answers[0].rdata, vec![203, 0, 113, 7]);
}

#[tokio::test]
async fn test_forwarder_times_out() {
    // Bound but never answers
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let forwarder = Forwarder::new(silent.local_addr().unwrap(), Duration::from_millis(200));

    let query = create_test_query("example.org", DNSResourceType::A);
    let err = forwarder.forward(&query).await.unwrap_err();
    assert!(matches!(err, DnsError::Timeout(_)));

    let response = forwarder.serve(&query).await;
    assert_eq!(response.rcode(), Some(ResponseCode::ServerFailure));
}

#[tokio::test]
async fn test_foreign_names_are_forwarded_end_to_end() {
    let upstream = spawn_upstream([198, 51, 100, 1]).await;
    let next: Arc<dyn Handler> = Arc::new(Forwarder::new(upstream, Duration::from_secs(2)));
    let server = TestServer::start(zone_document(ORIGIN, 1, "192.0.2.1"), Some(next)).await;

    let response = udp_exchange(server.udp, &create_test_query("example.org", DNSResourceType::A)).await;
    assert_eq!(response.rcode(), Some(ResponseCode::NoError));
    assert!(!response.header.aa);
    assert_eq!(response.answers[0].rdata, vec![198, 51, 100, 1]);

    // In-zone names never reach the upstream
    let response = udp_exchange(server.udp, &create_test_query("www.example.com", DNSResourceType::A)).await;
    assert!(response.header.aa);
    assert_eq!(response.answers[0].rdata, vec![192, 0, 2, 1]);

    server.stop().await;
}
