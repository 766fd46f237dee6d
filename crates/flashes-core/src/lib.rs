//! # flashes-core
//!
//! Dual-bank flash programming and the block-transfer protocol used to deliver
//! firmware images to a device over the network.
//!
//! This crate provides:
//! - `FlashPlatform` trait over the vendor flash, boot configuration and reset primitives
//! - `SimulatedFlash` for testing and for running the device side on a host
//! - `FlashProgrammer` with a per-session erase cursor
//! - `BankSelector` for reading, repairing and committing the boot bank
//! - `TransferServer`, the device super-loop state machine
//! - `TransferClient`, the async host side
//!
//! ## Safety Guarantees
//!
//! - Images are only ever written to the bank that is **not** running
//! - Each sector is erased at most once per session, immediately before it is
//!   first written
//! - The boot bank only changes after the terminator block is received, so a
//!   half-delivered image never becomes the boot target
//!
//! ## Wire Format
//!
//! ```text
//! host                                  device
//!  | -- [len lo][len hi][payload] -----> |
//!  | <------------------------- 'o' ---- |
//!  |   ... one block in flight ...       |
//!  | -- [0x00][0x00] ------------------> |  commit boot bank
//!  | <------------------------- 'o' ---- |  close, reset
//! ```
//!
//! ## Example
//!
//! ```rust
//! use flashes_core::prelude::*;
//!
//! let mut flash = SimulatedFlash::new(FlashGeometry::stm32f4_dual_bank());
//! let mut cursor = EraseCursor::new();
//! FlashProgrammer::new(&mut flash)
//!     .write(0, &[0xDE, 0xAD, 0xBE, 0xEF], Bank::B, &mut cursor)
//!     .expect("write");
//! BankSelector::new(&mut flash).select_bank(Bank::B).expect("commit");
//! assert_eq!(flash.boot_config(), Bank::B);
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    missing_debug_implementations
)]
#![warn(rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bank;
pub mod client;
pub mod config;
pub mod error;
pub mod geometry;
pub mod platform;
pub mod prelude;
pub mod programmer;
pub mod protocol;
pub mod selector;
pub mod server;
pub mod session;
pub mod sim;
pub mod transport;

pub use bank::Bank;
pub use client::{TransferClient, TransferProgress, TransferReport};
pub use config::{TransferConfig, TransferConfigBuilder};
pub use error::{
    BankError, ConfigError, FlashError, PlatformError, ProtocolError, TransferError,
    TransferResult,
};
pub use geometry::{FlashGeometry, SectorRange};
pub use platform::FlashPlatform;
pub use programmer::{EraseCursor, FlashProgrammer};
pub use selector::BankSelector;
pub use server::{ServerState, TransferServer};
pub use sim::SimulatedFlash;
