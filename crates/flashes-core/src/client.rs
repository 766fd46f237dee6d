//! Host-side transfer client.
//!
//! Sends an image as length-prefixed blocks followed by the zero-length
//! terminator, waiting for the device's acknowledgment after each one. There is
//! exactly one block in flight; any failure ends the transfer without retry.

use std::io;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::error::{ProtocolError, TransferError, TransferResult};
use crate::protocol::{ACK, BlockHeader, LENGTH_PREFIX_LEN, with_default_port};

/// Progress events published while sending an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferProgress {
    /// A data block is about to be written to the connection.
    BlockSent {
        /// One-based block number
        index: u32,
        /// Payload length
        len: usize,
    },
    /// The device acknowledged a data block.
    BlockAcknowledged {
        /// One-based block number
        index: u32,
        /// Image bytes acknowledged so far
        bytes: u64,
    },
    /// The terminator is about to be written to the connection.
    TerminatorSent,
    /// The device acknowledged the terminator.
    Completed(TransferReport),
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Data blocks sent, not counting the terminator
    pub data_blocks: u32,
    /// Image bytes sent
    pub bytes: u64,
    /// Wall time from first block to final acknowledgment
    pub elapsed: Duration,
}

/// Drives one image transfer over a byte stream.
#[derive(Debug)]
pub struct TransferClient<S> {
    stream: S,
    config: TransferConfig,
    progress: Option<UnboundedSender<TransferProgress>>,
}

impl TransferClient<TcpStream> {
    /// Connect to a device. `address` may omit the port, in which case
    /// `config.port` is used.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an invalid configuration, `Connect` if the device
    /// cannot be reached within the connect timeout.
    pub async fn connect(address: &str, config: TransferConfig) -> TransferResult<Self> {
        config.validate()?;
        let target = with_default_port(address, config.port);
        let connect_err = |source| TransferError::Connect {
            address: target.clone(),
            source,
        };

        let stream = match timeout(config.connect_timeout(), TcpStream::connect(&target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(connect_err(e)),
            Err(_) => return Err(connect_err(io::Error::from(io::ErrorKind::TimedOut))),
        };
        stream.set_nodelay(true).map_err(connect_err)?;
        info!(address = %target, "Connected to device");
        Ok(Self::new(stream, config))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> TransferClient<S> {
    /// Wrap an established stream.
    pub fn new(stream: S, config: TransferConfig) -> Self {
        Self {
            stream,
            config,
            progress: None,
        }
    }

    /// Publish progress events on `tx`.
    #[must_use]
    pub fn with_progress(mut self, tx: UnboundedSender<TransferProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Send the whole of `image`, then the terminator.
    ///
    /// The image is read in chunks of `max_block_size`; every chunk but the
    /// last is full.
    ///
    /// # Errors
    ///
    /// - `Image` if reading the image fails
    /// - `Protocol(Timeout)` if an acknowledgment or write does not complete in time
    /// - `Protocol(ConnectionClosed)` if the device closes the connection
    /// - `Protocol(UnexpectedAck)` if the device answers with another byte
    pub async fn send_image<R: AsyncRead + Unpin>(
        &mut self,
        mut image: R,
    ) -> TransferResult<TransferReport> {
        let start = Instant::now();
        let mut chunk = vec![0u8; self.config.max_block_size];
        let mut data_blocks = 0u32;
        let mut bytes = 0u64;

        loop {
            let len = fill_chunk(&mut image, &mut chunk)
                .await
                .map_err(TransferError::Image)?;
            let Some(payload) = chunk.get(..len).filter(|p| !p.is_empty()) else {
                break;
            };
            data_blocks = data_blocks.saturating_add(1);
            self.emit(TransferProgress::BlockSent {
                index: data_blocks,
                len,
            });
            self.send_block(payload).await?;

            self.await_ack().await?;
            bytes = bytes.saturating_add(len as u64);
            debug!(block = data_blocks, len, "Block acknowledged");
            self.emit(TransferProgress::BlockAcknowledged {
                index: data_blocks,
                bytes,
            });
        }

        self.emit(TransferProgress::TerminatorSent);
        self.send_block(&[]).await?;
        self.await_ack().await?;

        let report = TransferReport {
            data_blocks,
            bytes,
            elapsed: start.elapsed(),
        };
        info!(
            blocks = report.data_blocks,
            bytes = report.bytes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Image transferred"
        );
        self.emit(TransferProgress::Completed(report.clone()));
        Ok(report)
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    async fn send_block(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        let header = BlockHeader::for_payload(payload)?;
        let mut frame = Vec::with_capacity(payload.len().saturating_add(LENGTH_PREFIX_LEN));
        frame.extend_from_slice(&header.encode());
        frame.extend_from_slice(payload);

        let limit = self.config.write_timeout();
        let stream = &mut self.stream;
        let write = async {
            stream.write_all(&frame).await?;
            stream.flush().await
        };
        match timeout(limit, write).await {
            Ok(result) => result.map_err(ProtocolError::from_io),
            Err(_) => Err(ProtocolError::Timeout),
        }
    }

    async fn await_ack(&mut self) -> Result<(), ProtocolError> {
        let mut reply = [0u8; 1];
        let read = match timeout(self.config.response_timeout(), self.stream.read(&mut reply)).await {
            Ok(read) => read.map_err(ProtocolError::from_io)?,
            Err(_) => {
                warn!(
                    timeout_ms = self.config.response_timeout_ms,
                    "No acknowledgment from device"
                );
                return Err(ProtocolError::Timeout);
            }
        };
        let [byte] = reply;
        match (read, byte) {
            (0, _) => Err(ProtocolError::ConnectionClosed),
            (_, ACK) => Ok(()),
            (_, other) => Err(ProtocolError::UnexpectedAck(other)),
        }
    }

    fn emit(&self, event: TransferProgress) {
        if let Some(tx) = &self.progress
            && tx.send(event).is_err()
        {
            debug!("Progress receiver dropped");
        }
    }
}

/// Read until `chunk` is full or the reader is exhausted.
async fn fill_chunk<R: AsyncRead + Unpin>(reader: &mut R, chunk: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while let Some(rest) = chunk.get_mut(filled..).filter(|rest| !rest.is_empty()) {
        let n = reader.read(rest).await?;
        if n == 0 {
            break;
        }
        filled = filled.saturating_add(n);
    }
    Ok(filled)
}
