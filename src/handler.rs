use crate::dns::DNSPacket;
use crate::dns::enums::ResponseCode;
use crate::error::{DnsError, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// One element of the query handling chain
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a complete response for `query`
    async fn serve(&self, query: &DNSPacket) -> DNSPacket;
}

/// Hand `query` to `next`, or answer SERVFAIL when the chain ends here
pub async fn next_or_failure(
    from: &str,
    next: Option<&Arc<dyn Handler>>,
    query: &DNSPacket,
) -> DNSPacket {
    match next {
        Some(handler) => {
            trace!("{} passing query to {}", from, handler.name());
            handler.serve(query).await
        }
        None => {
            debug!("{}: no next handler, answering SERVFAIL", from);
            DNSPacket::error_response(query, ResponseCode::ServerFailure)
        }
    }
}

/// Relays queries to a single upstream server
pub struct Forwarder {
    upstream: SocketAddr,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(upstream: SocketAddr, timeout: Duration) -> Self {
        Self { upstream, timeout }
    }

    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    /// Send query with timeout (try UDP first, fallback to TCP if truncated)
    pub async fn forward(&self, query: &DNSPacket) -> Result<DNSPacket> {
        let query_bytes = query.serialize()?;
        let exchange = async {
            let response = self.send_udp_query(&query_bytes).await?;
            if response.header.tc {
                debug!("UDP response from {} truncated, retrying with TCP", self.upstream);
                self.send_tcp_query(&query_bytes).await
            } else {
                Ok(response)
            }
        };

        let response = timeout(self.timeout, exchange)
            .await
            .map_err(|_| DnsError::Timeout(self.timeout))??;

        if response.header.id != query.header.id {
            return Err(DnsError::InvalidPacket(format!(
                "response id {} does not match query id {}",
                response.header.id, query.header.id
            )));
        }
        Ok(response)
    }

    async fn send_udp_query(&self, query_bytes: &[u8]) -> Result<DNSPacket> {
        let bind_addr = if self.upstream.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.upstream).await?;
        socket.send(query_bytes).await?;

        let mut response_buf = vec![0u8; 4096];
        let response_len = socket.recv(&mut response_buf).await?;
        trace!(
            "Raw UDP response data ({} bytes): {:02x?}",
            response_len,
            &response_buf[..response_len.min(64)]
        );

        Ok(DNSPacket::parse(&response_buf[..response_len])?)
    }

    async fn send_tcp_query(&self, query_bytes: &[u8]) -> Result<DNSPacket> {
        let mut stream = TcpStream::connect(self.upstream).await?;

        let query_length = u16::try_from(query_bytes.len())
            .map_err(|_| DnsError::InvalidPacket("query too large for TCP".to_string()))?;
        stream.write_all(&query_length.to_be_bytes()).await?;
        stream.write_all(query_bytes).await?;
        stream.flush().await?;

        let mut length_buf = [0u8; 2];
        stream.read_exact(&mut length_buf).await?;
        let response_length = u16::from_be_bytes(length_buf) as usize;

        let mut response_buf = vec![0; response_length];
        stream.read_exact(&mut response_buf).await?;

        Ok(DNSPacket::parse(&response_buf)?)
    }
}

#[async_trait]
impl Handler for Forwarder {
    fn name(&self) -> &str {
        "forward"
    }

    async fn serve(&self, query: &DNSPacket) -> DNSPacket {
        match self.forward(query).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Forwarding to {} failed: {}", self.upstream, e);
                DNSPacket::error_response(query, ResponseCode::ServerFailure)
            }
        }
    }
}
