//! Prelude for flashes-core.
//!
//! This module re-exports the most commonly used types for convenient importing.
//!
//! # Example
//!
//! ```rust
//! use flashes_core::prelude::*;
//!
//! let config = TransferConfig::builder().idle_fallback_ms(None).build().expect("valid");
//! assert_eq!(config.port, DEFAULT_PORT);
//! ```

pub use crate::bank::Bank;
pub use crate::client::{TransferClient, TransferProgress, TransferReport};
pub use crate::config::{TransferConfig, TransferConfigBuilder};
pub use crate::error::{
    BankError, ConfigError, FlashError, PlatformError, ProtocolError, TransferError,
    TransferResult,
};
pub use crate::geometry::{ERASED_BYTE, FlashGeometry, SectorRange};
pub use crate::platform::FlashPlatform;
pub use crate::programmer::{EraseCursor, FlashProgrammer};
pub use crate::protocol::{ACK, BlockHeader, DEFAULT_BLOCK_SIZE, DEFAULT_PORT, with_default_port};
pub use crate::selector::BankSelector;
pub use crate::server::{ServerState, TransferServer};
pub use crate::session::Session;
pub use crate::sim::{EraseRecord, SimulatedFlash};
pub use crate::transport::{Acceptor, Link};
