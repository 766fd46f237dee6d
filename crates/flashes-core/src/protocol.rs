//! Block transfer wire format.
//!
//! An image travels as a sequence of blocks. Each block is a 2-byte
//! little-endian length followed by that many payload bytes; a block of length
//! zero terminates the image. The receiver answers every block it processed
//! with the single acknowledgment byte [`ACK`].
//!
//! ```text
//! +--------+--------+----------------------+
//! | len lo | len hi | payload (len bytes)  |
//! +--------+--------+----------------------+
//! ```

use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr};

use crate::error::ProtocolError;

/// Acknowledgment byte sent after every processed block.
pub const ACK: u8 = b'o';

/// Size of the block length prefix.
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Default device listening port.
pub const DEFAULT_PORT: u16 = 6827;

/// Default block size used by the host.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Length prefix of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Payload length in bytes.
    pub len: u16,
}

impl BlockHeader {
    /// Header for a data block of `len` bytes.
    pub fn new(len: u16) -> Self {
        Self { len }
    }

    /// Header announcing `payload`.
    ///
    /// # Errors
    ///
    /// Returns `BlockTooLarge` if the payload does not fit the 16-bit length.
    pub fn for_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let Ok(len) = u16::try_from(payload.len()) else {
            return Err(ProtocolError::BlockTooLarge {
                len: payload.len(),
                max: usize::from(u16::MAX),
            });
        };
        Ok(Self { len })
    }

    /// The terminator header.
    pub fn terminator() -> Self {
        Self { len: 0 }
    }

    /// Whether this header announces the end of the image.
    pub fn is_terminator(&self) -> bool {
        self.len == 0
    }

    /// Encode to wire format.
    pub fn encode(&self) -> [u8; LENGTH_PREFIX_LEN] {
        self.len.to_le_bytes()
    }

    /// Decode from wire format.
    pub fn decode(bytes: [u8; LENGTH_PREFIX_LEN]) -> Self {
        Self {
            len: u16::from_le_bytes(bytes),
        }
    }
}

/// Read one block into `buffer`, replacing its contents.
///
/// Returns the payload length; zero means the terminator was received. A
/// length above `max_len` is rejected before any payload byte is read.
///
/// # Errors
///
/// - `BlockTooLarge` if the announced length exceeds `max_len`
/// - `Timeout` / `ConnectionClosed` / `Io` on transport failure or short read
pub fn read_block<R: Read + ?Sized>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    max_len: usize,
) -> Result<usize, ProtocolError> {
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut prefix)?;
    let header = BlockHeader::decode(prefix);
    buffer.clear();
    if header.is_terminator() {
        return Ok(0);
    }
    let len = usize::from(header.len);
    if len > max_len {
        return Err(ProtocolError::BlockTooLarge { len, max: max_len });
    }

    buffer.resize(len, 0);
    reader.read_exact(buffer)?;
    Ok(len)
}

/// Write one block: length prefix then payload.
///
/// # Errors
///
/// Returns `BlockTooLarge` if `payload` does not fit the 16-bit length prefix,
/// or a transport error.
pub fn write_block<W: Write + ?Sized>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError> {
    let header = BlockHeader::for_payload(payload)?;
    writer.write_all(&header.encode())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Send the acknowledgment byte.
///
/// # Errors
///
/// Returns a transport error if the byte could not be written.
pub fn write_ack<W: Write + ?Sized>(writer: &mut W) -> Result<(), ProtocolError> {
    writer.write_all(&[ACK])?;
    writer.flush()?;
    Ok(())
}

/// Append `:port` to `address` unless it already names a port.
///
/// Bare IPv6 literals are bracketed.
pub fn with_default_port(address: &str, port: u16) -> String {
    if address.parse::<SocketAddr>().is_ok() {
        return address.to_string();
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return SocketAddr::new(ip, port).to_string();
    }
    if address.starts_with('[') && address.ends_with(']') {
        return format!("{address}:{port}");
    }
    match address.rsplit_once(':') {
        Some((host, p)) if !host.is_empty() && p.parse::<u16>().is_ok() => address.to_string(),
        _ => format!("{address}:{port}"),
    }
}
