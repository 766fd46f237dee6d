//! Error types for flashit

use std::path::PathBuf;

use flashes_core::{ProtocolError, TransferError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("opening binary file failed")]
    ImageOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("socket connection failed")]
    Connect(#[source] TransferError),

    #[error("{}", transfer_message(.0))]
    Transfer(#[source] TransferError),
}

impl CliError {
    /// Whether the failure happened after blocks started flowing.
    pub fn is_transfer_failure(&self) -> bool {
        matches!(self, CliError::Transfer(_))
    }
}

fn transfer_message(err: &TransferError) -> String {
    match err {
        TransferError::Image(_) => "reading file failed".to_string(),
        TransferError::Protocol(ProtocolError::Timeout) => "waiting MCU reply timed out".to_string(),
        TransferError::Protocol(ProtocolError::ConnectionClosed) => {
            "socket connection broken".to_string()
        }
        TransferError::Protocol(ProtocolError::UnexpectedAck(byte)) => {
            format!("unexpected reply {byte:#04x}")
        }
        _ => "socket connection failed".to_string(),
    }
}
