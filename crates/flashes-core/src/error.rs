//! Error types for flash programming and block transfer

use std::io;

use thiserror::Error;

use crate::bank::Bank;

/// Errors reported by the platform flash primitives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The flash controller rejected the command
    #[error("Flash controller rejected command: {0}")]
    Rejected(String),

    /// Programmed data did not read back as written
    #[error("Readback mismatch at offset {offset:#x}")]
    ReadbackMismatch {
        /// Bank-relative byte offset of the failing unit
        offset: u32,
    },

    /// The controller is locked
    #[error("Flash controller is locked")]
    Locked,
}

impl PlatformError {
    /// Create a rejected-command error
    pub fn rejected(msg: impl Into<String>) -> Self {
        PlatformError::Rejected(msg.into())
    }
}

/// Errors from erasing or programming a bank
#[derive(Error, Debug)]
pub enum FlashError {
    /// Hardware erase command rejected
    #[error("Erase of {count} sector(s) from sector {first_sector} failed: {source}")]
    EraseFailed {
        /// First sector of the failed erase
        first_sector: u32,
        /// Number of sectors requested
        count: u32,
        /// Platform failure
        #[source]
        source: PlatformError,
    },

    /// Hardware program command rejected or readback mismatch
    #[error("Programming failed at offset {offset:#x}: {source}")]
    ProgramFailed {
        /// Bank-relative offset of the failing unit
        offset: u32,
        /// Platform failure
        #[source]
        source: PlatformError,
    },

    /// Address or length not a multiple of the program unit
    #[error("Write of {len} bytes at {address:#x} is not aligned to {unit}-byte program unit")]
    AlignmentError {
        /// Requested bank-relative address
        address: u32,
        /// Requested length
        len: usize,
        /// Minimum program unit
        unit: u32,
    },

    /// Write extends past the end of the bank
    #[error("Write of {len} bytes at {address:#x} exceeds bank size {bank_size:#x}")]
    OutOfRange {
        /// Requested bank-relative address
        address: u32,
        /// Requested length
        len: usize,
        /// Size of one bank
        bank_size: u32,
    },

    /// Flash controller could not be unlocked
    #[error("Flash controller could not be unlocked: {0}")]
    Locked(#[source] PlatformError),
}

/// Errors from the persisted boot-bank configuration
#[derive(Error, Debug)]
pub enum BankError {
    /// Boot configuration write did not take effect
    #[error("Boot configuration commit for bank {bank} failed: {source}")]
    CommitFailed {
        /// Bank that should have been selected
        bank: Bank,
        /// Platform failure
        #[source]
        source: PlatformError,
    },
}

/// Block-transfer protocol errors; always local to one session
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Peer did not respond within the configured timeout
    #[error("Operation timed out")]
    Timeout,

    /// Peer closed the connection or a read came up short
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Announced block length exceeds the receive buffer
    #[error("Block of {len} bytes exceeds maximum block size {max}")]
    BlockTooLarge {
        /// Announced length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Acknowledgment byte other than `'o'`
    #[error("Unexpected acknowledgment byte {0:#04x}")]
    UnexpectedAck(u8),

    /// Terminator received before any data block
    #[error("Terminator received before any image data")]
    EmptyImage,

    /// Other transport failure
    #[error("Transport error: {0}")]
    Io(#[source] io::Error),
}

impl ProtocolError {
    /// Classify an I/O error raised while reading or writing a block
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProtocolError::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::WriteZero => ProtocolError::ConnectionClosed,
            _ => ProtocolError::Io(err),
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        ProtocolError::from_io(err)
    }
}

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create an invalid configuration error
    pub fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

/// Umbrella error for one firmware transfer
#[derive(Error, Debug)]
pub enum TransferError {
    /// Protocol failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Flash erase or program failure
    #[error(transparent)]
    Flash(#[from] FlashError),

    /// Boot configuration commit failure
    #[error(transparent)]
    Bank(#[from] BankError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Reading the firmware image failed
    #[error("Reading firmware image failed: {0}")]
    Image(#[source] io::Error),

    /// Connecting to the device failed
    #[error("Connection to {address} failed: {source}")]
    Connect {
        /// Target address
        address: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Binding the device listener failed
    #[error("Listening on {address} failed: {source}")]
    Listen {
        /// Listen address
        address: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// Whether the failure only ends the current session and the listener keeps running
    pub fn is_session_local(&self) -> bool {
        matches!(
            self,
            TransferError::Protocol(_) | TransferError::Flash(_) | TransferError::Bank(_)
        )
    }
}

/// Specialized Result type for transfer operations
pub type TransferResult<T> = std::result::Result<T, TransferError>;
