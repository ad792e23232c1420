//! Transport for Stratum v1: plain TCP or TLS over TCP, framed as
//! newline-delimited lines.

use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use super::error::{StratumError, StratumResult};

/// Longest line accepted from a pool. Longer lines are discarded.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Byte stream to a pool, either plain or TLS wrapped.
pub trait PoolStream: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> PoolStream for T {}

pub type BoxedStream = Pin<Box<dyn PoolStream>>;
pub type LineReader = FramedRead<ReadHalf<BoxedStream>, LinesCodec>;
pub type LineWriter = FramedWrite<WriteHalf<BoxedStream>, LinesCodec>;

/// Pool endpoint to dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.tls { "stratum+ssl" } else { "stratum+tcp" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Dial the endpoint, upgrading to TLS (SNI = host) when requested.
pub async fn dial(endpoint: &Endpoint, dial_timeout: Duration) -> StratumResult<BoxedStream> {
    let addr = (endpoint.host.as_str(), endpoint.port);
    let tcp = timeout(dial_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| StratumError::Connection(format!("dial {}: timeout", endpoint)))?
        .map_err(|e| StratumError::Connection(format!("dial {}: {}", endpoint, e)))?;
    tcp.set_nodelay(true)?;

    if !endpoint.tls {
        return Ok(Box::pin(tcp));
    }

    let connector = native_tls::TlsConnector::new()
        .map_err(|e| StratumError::Connection(format!("tls setup: {}", e)))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);
    let tls = timeout(dial_timeout, connector.connect(&endpoint.host, tcp))
        .await
        .map_err(|_| StratumError::Connection(format!("tls handshake {}: timeout", endpoint)))?
        .map_err(|e| StratumError::Connection(format!("tls handshake {}: {}", endpoint, e)))?;

    Ok(Box::pin(tls))
}

/// Split a stream into a line reader and a line writer.
pub fn framed(stream: BoxedStream) -> (LineReader, LineWriter) {
    let (read_half, write_half) = tokio::io::split(stream);
    (
        FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
        FramedWrite::new(write_half, LinesCodec::new()),
    )
}
