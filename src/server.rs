use crate::dns::enums::{DnsOpcode, ResponseCode};
use crate::dns::header::DNSHeader;
use crate::dns::{DNSPacket, HEADER_SIZE, MAX_UDP_PAYLOAD};
use crate::handler::Handler;
use crate::shutdown::ShutdownListener;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

/// Queries handled concurrently per listener before new ones are dropped
const MAX_CONCURRENT_QUERIES: usize = 1024;

/// Idle TCP connections are closed after this long
const TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

type ServerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Run UDP server with graceful shutdown support
pub async fn run_udp_server(
    sock: UdpSocket,
    handler: Arc<dyn Handler>,
    mut shutdown: ShutdownListener,
) -> ServerResult {
    let sock = Arc::new(sock);
    info!("UDP DNS server listening on {}", sock.local_addr()?);
    let query_semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_QUERIES));
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("UDP server received shutdown signal");
                break;
            }

            result = sock.recv_from(&mut buf) => {
                let (read_bytes, src_addr) = match result {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP errors from earlier sends surface here; keep serving
                        debug!("UDP receive error: {}", e);
                        continue;
                    }
                };

                let permit = match Arc::clone(&query_semaphore).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("Max concurrent queries reached, dropping query from {}", src_addr);
                        continue;
                    }
                };

                let query_data = buf[..read_bytes].to_vec();
                let sock = Arc::clone(&sock);
                let handler = Arc::clone(&handler);

                tokio::spawn(async move {
                    let _permit = permit;
                    let Some(response) = handle_query(&query_data, handler.as_ref(), src_addr).await else {
                        return;
                    };
                    let Some(bytes) = encode_udp_response(&response) else {
                        return;
                    };
                    if let Err(e) = sock.send_to(&bytes, src_addr).await {
                        error!("Failed to send UDP response to {}: {:?}", src_addr, e);
                    }
                });
            }
        }
    }

    info!("UDP server shutdown complete");
    Ok(())
}

/// Run TCP server with graceful shutdown support
pub async fn run_tcp_server(
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    mut shutdown: ShutdownListener,
) -> ServerResult {
    info!("TCP DNS server listening on {}", listener.local_addr()?);
    let query_semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_QUERIES));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("TCP server received shutdown signal");
                break;
            }

            result = listener.accept() => {
                let (stream, src_addr) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept TCP connection: {}", e);
                        continue;
                    }
                };
                let handler = Arc::clone(&handler);
                let query_semaphore = Arc::clone(&query_semaphore);
                let shutdown = shutdown.clone();

                tokio::spawn(async move {
                    if let Err(e) =
                        handle_tcp_connection(stream, src_addr, handler, query_semaphore, shutdown).await
                    {
                        debug!("TCP connection error from {}: {}", src_addr, e);
                    }
                });
            }
        }
    }

    info!("TCP server shutdown complete");
    Ok(())
}

async fn handle_tcp_connection(
    mut stream: TcpStream,
    src_addr: SocketAddr,
    handler: Arc<dyn Handler>,
    query_semaphore: Arc<Semaphore>,
    mut shutdown: ShutdownListener,
) -> std::io::Result<()> {
    trace!("TCP connection from {}", src_addr);

    loop {
        let mut length_buf = [0u8; 2];
        let read = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = timeout(TCP_IDLE_TIMEOUT, stream.read_exact(&mut length_buf)) => read,
        };
        match read {
            Ok(Ok(_)) => {}
            // Clean close between messages
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                trace!("Closing idle TCP connection from {}", src_addr);
                return Ok(());
            }
        }

        let length = u16::from_be_bytes(length_buf) as usize;
        let mut query_data = vec![0u8; length];
        timeout(TCP_IDLE_TIMEOUT, stream.read_exact(&mut query_data))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "TCP read timed out"))??;

        let Ok(_permit) = Arc::clone(&query_semaphore).try_acquire_owned() else {
            warn!("Max concurrent queries reached, closing TCP connection from {}", src_addr);
            return Ok(());
        };

        let Some(response) = handle_query(&query_data, handler.as_ref(), src_addr).await else {
            continue;
        };
        let bytes = match response.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                continue;
            }
        };
        let Ok(response_length) = u16::try_from(bytes.len()) else {
            error!("Response of {} bytes exceeds the TCP message limit", bytes.len());
            continue;
        };

        stream.write_all(&response_length.to_be_bytes()).await?;
        stream.write_all(&bytes).await?;
        stream.flush().await?;
    }
}

/// Validate and dispatch one query; `None` means drop it silently
async fn handle_query(buf: &[u8], handler: &dyn Handler, src_addr: SocketAddr) -> Option<DNSPacket> {
    let query = match DNSPacket::parse(buf) {
        Ok(query) => query,
        Err(e) => {
            debug!("Malformed packet from {}: {}", src_addr, e);
            return format_error_from_raw(buf);
        }
    };

    if query.header.qr {
        debug!("Received DNS response instead of query from {}", src_addr);
        return None;
    }

    if DnsOpcode::from(query.header.opcode) != DnsOpcode::Query {
        debug!("Unsupported opcode {} from {}", query.header.opcode, src_addr);
        return Some(DNSPacket::error_response(&query, ResponseCode::NotImplemented));
    }

    if query.questions.len() != 1 {
        debug!(
            "Query from {} has {} questions, expected 1",
            src_addr,
            query.questions.len()
        );
        return Some(DNSPacket::error_response(&query, ResponseCode::FormatError));
    }

    trace!(
        "Query from {}: {} {}",
        src_addr,
        query.questions[0].name(),
        query.questions[0].qtype
    );
    Some(handler.serve(&query).await)
}

/// FORMERR for a packet whose header is readable but whose body is not
fn format_error_from_raw(buf: &[u8]) -> Option<DNSPacket> {
    if buf.len() < HEADER_SIZE || buf[2] & 0x80 != 0 {
        return None;
    }
    Some(DNSPacket {
        header: DNSHeader {
            id: u16::from_be_bytes([buf[0], buf[1]]),
            qr: true,
            opcode: (buf[2] >> 3) & 0x0F,
            rd: buf[2] & 0x01 != 0,
            rcode: ResponseCode::FormatError.to_u8(),
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Serialize for UDP, truncating to header and question when over 512 bytes
fn encode_udp_response(response: &DNSPacket) -> Option<Vec<u8>> {
    let bytes = match response.serialize() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            return None;
        }
    };
    if bytes.len() <= MAX_UDP_PAYLOAD {
        return Some(bytes);
    }

    debug!(
        "Response too large for UDP ({}>{} bytes), sending truncated response",
        bytes.len(),
        MAX_UDP_PAYLOAD
    );
    match response.truncated().serialize() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Failed to serialize truncated response: {}", e);
            None
        }
    }
}
