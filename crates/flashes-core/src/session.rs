//! Per-connection device state.

use crate::bank::Bank;
use crate::programmer::EraseCursor;

/// State of one admitted client connection.
///
/// A session always starts at address zero with a fresh erase cursor; there is
/// no resuming a previous transfer.
#[derive(Debug)]
pub struct Session<L> {
    pub(crate) link: L,
    pub(crate) address: u32,
    pub(crate) target_bank: Option<Bank>,
    pub(crate) erase_cursor: EraseCursor,
    pub(crate) blocks: u32,
}

impl<L> Session<L> {
    /// Start a session on a freshly accepted link.
    pub fn new(link: L) -> Self {
        Self {
            link,
            address: 0,
            target_bank: None,
            erase_cursor: EraseCursor::new(),
            blocks: 0,
        }
    }

    /// Next bank-relative write address.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Bank being written, once the first data block has arrived.
    pub fn target_bank(&self) -> Option<Bank> {
        self.target_bank
    }

    /// Erase progress in the target bank.
    pub fn erase_cursor(&self) -> EraseCursor {
        self.erase_cursor
    }

    /// Data blocks written so far.
    pub fn blocks(&self) -> u32 {
        self.blocks
    }
}
