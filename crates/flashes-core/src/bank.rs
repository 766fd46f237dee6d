//! Dual-bank identifiers
//!
//! The device holds two independent program-memory banks. Exactly one is active
//! (executing and selected for boot); updates are always written to the other.

use serde::{Deserialize, Serialize};

/// Program-memory bank identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bank {
    /// Bank A (hardware bank 1)
    A,
    /// Bank B (hardware bank 2)
    B,
}

impl Bank {
    /// Both banks, in hardware order
    pub const ALL: [Bank; 2] = [Bank::A, Bank::B];

    /// Get the other bank
    pub fn other(self) -> Self {
        match self {
            Bank::A => Bank::B,
            Bank::B => Bank::A,
        }
    }

    /// Build a bank from the "bank B selected" configuration flag
    pub fn from_bank_b_flag(bank_b: bool) -> Self {
        if bank_b { Bank::B } else { Bank::A }
    }

    /// Whether this is bank B
    pub fn is_b(self) -> bool {
        self == Bank::B
    }
}

impl std::fmt::Display for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bank::A => write!(f, "A"),
            Bank::B => write!(f, "B"),
        }
    }
}
