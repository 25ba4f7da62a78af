//! Transport seam for the backend gateway
//!
//! The gateway speaks line-delimited JSON over TCP. These traits abstract
//! the framing and connection establishment so the adapter can be tested
//! with scripted lines instead of sockets.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{DashboardError, Result};

/// Reader and writer halves of one gateway connection
pub struct GatewayConnection {
    pub reader: Box<dyn LineReader>,
    pub writer: Box<dyn MessageWriter>,
}

/// Reads one frame (line) at a time from the gateway
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait LineReader: Send {
    /// `Ok(Some(line))` on a frame, `Ok(None)` once the peer closed the
    /// connection.
    async fn read_line(&mut self) -> Result<Option<String>>;
}

/// Writes one frame (line) at a time to the gateway
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait MessageWriter: Send {
    async fn write_message(&mut self, message: &str) -> Result<()>;

    async fn shutdown(&mut self) -> Result<()>;
}

/// Establishes gateway connections
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self, addr: &str, timeout: Duration) -> Result<GatewayConnection>;
}

/// Buffered line reader over the read half of a TCP stream
pub struct TcpLineReader {
    reader: BufReader<ReadHalf<TcpStream>>,
    buffer: String,
}

impl TcpLineReader {
    pub fn new(reader: ReadHalf<TcpStream>) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: String::new(),
        }
    }
}

#[async_trait]
impl LineReader for TcpLineReader {
    async fn read_line(&mut self) -> Result<Option<String>> {
        self.buffer.clear();
        match self.reader.read_line(&mut self.buffer).await {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(self.buffer.trim().to_string())),
            Err(e) => Err(DashboardError::Io(e)),
        }
    }
}

/// Newline-framed writer over the write half of a TCP stream
pub struct TcpMessageWriter {
    writer: WriteHalf<TcpStream>,
}

impl TcpMessageWriter {
    pub fn new(writer: WriteHalf<TcpStream>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl MessageWriter for TcpMessageWriter {
    async fn write_message(&mut self, message: &str) -> Result<()> {
        self.writer
            .write_all(format!("{}\n", message).as_bytes())
            .await
            .map_err(|e| DashboardError::SendError(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| DashboardError::SendError(e.to_string()))?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(DashboardError::Io)
    }
}

/// TCP implementation of [`GatewayConnector`]
#[derive(Default, Clone)]
pub struct TcpGatewayConnector;

impl TcpGatewayConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayConnector for TcpGatewayConnector {
    async fn connect(&self, addr: &str, timeout: Duration) -> Result<GatewayConnection> {
        debug!("connecting to backend gateway at {}", addr);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| DashboardError::Timeout(format!("connection to {} timed out", addr)))?
            .map_err(|e| {
                DashboardError::ConnectionFailed(format!("failed to connect to {}: {}", addr, e))
            })?;

        debug!("gateway connection established to {}", addr);

        let (reader, writer) = tokio::io::split(stream);
        Ok(GatewayConnection {
            reader: Box::new(TcpLineReader::new(reader)),
            writer: Box::new(TcpMessageWriter::new(writer)),
        })
    }
}
