//! Device state persisted in a directory.
//!
//! Layout:
//! - `bank_a.bin`, `bank_b.bin`: raw bank contents
//! - `boot.json`: `{"boot_bank": "A"}`
//!
//! Missing files mean an erased bank or bank A selected.

use std::fs;
use std::path::{Path, PathBuf};

use flashes_core::{Bank, FlashGeometry, SimulatedFlash};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// File holding bank A.
pub const BANK_A_FILE: &str = "bank_a.bin";
/// File holding bank B.
pub const BANK_B_FILE: &str = "bank_b.bin";
/// File holding the boot configuration.
pub const BOOT_FILE: &str = "boot.json";

/// File holding the contents of `bank`.
pub fn bank_file(bank: Bank) -> &'static str {
    match bank {
        Bank::A => BANK_A_FILE,
        Bank::B => BANK_B_FILE,
    }
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed boot configuration {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Contents of `boot.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootRecord {
    pub boot_bank: Bank,
}

impl Default for BootRecord {
    fn default() -> Self {
        Self { boot_bank: Bank::A }
    }
}

/// Directory-backed flash state.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Read the persisted boot configuration.
    pub fn load_boot(&self) -> Result<BootRecord, StateError> {
        let path = self.file(BOOT_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BootRecord::default()),
            Err(source) => return Err(StateError::Io { path, source }),
        };
        serde_json::from_str(&text).map_err(|source| StateError::Json { path, source })
    }

    /// Build a flash from the saved state.
    ///
    /// The device runs from `running`, or from the persisted boot bank when
    /// `None`.
    pub fn load(
        &self,
        geometry: FlashGeometry,
        running: Option<Bank>,
    ) -> Result<SimulatedFlash, StateError> {
        let boot = self.load_boot()?;
        let bank_size = geometry.bank_size() as usize;
        let bank_a = self.load_bank(bank_file(Bank::A), bank_size)?;
        let bank_b = self.load_bank(bank_file(Bank::B), bank_size)?;
        let running = running.unwrap_or(boot.boot_bank);
        debug!(dir = %self.root.display(), boot = %boot.boot_bank, %running, "Loaded device state");
        Ok(SimulatedFlash::from_parts(
            geometry,
            bank_a,
            bank_b,
            boot.boot_bank,
            running,
        ))
    }

    /// Write both banks and the boot configuration.
    pub fn save(&self, flash: &SimulatedFlash) -> Result<(), StateError> {
        fs::create_dir_all(&self.root).map_err(|source| StateError::Io {
            path: self.root.clone(),
            source,
        })?;
        for bank in Bank::ALL {
            let path = self.file(bank_file(bank));
            fs::write(&path, flash.bank_data(bank)).map_err(|source| StateError::Io { path, source })?;
        }

        let path = self.file(BOOT_FILE);
        let record = BootRecord {
            boot_bank: flash.boot_config(),
        };
        let text = serde_json::to_string_pretty(&record).map_err(|source| StateError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(|source| StateError::Io { path, source })?;
        debug!(dir = %self.root.display(), boot = %record.boot_bank, "Saved device state");
        Ok(())
    }

    fn load_bank(&self, name: &str, bank_size: usize) -> Result<Vec<u8>, StateError> {
        let path = self.file(name);
        match fs::read(&path) {
            Ok(data) => {
                if data.len() > bank_size {
                    warn!(path = %path.display(), len = data.len(), bank_size, "Bank image larger than bank, truncating");
                }
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(StateError::Io { path, source }),
        }
    }
}
