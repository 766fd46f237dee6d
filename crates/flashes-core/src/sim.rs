//! Simulated flash platform.
//!
//! This module provides `SimulatedFlash`, an in-memory implementation of the
//! `FlashPlatform` trait for tests and for running the device side on a host.
//!
//! The simulation follows NOR flash rules: erase sets every byte of a sector to
//! `0xFF`, programming can only clear bits, and a unit that does not read back
//! as written is reported as [`PlatformError::ReadbackMismatch`].

use tracing::{debug, info, trace};

use crate::bank::Bank;
use crate::error::PlatformError;
use crate::geometry::{ERASED_BYTE, FlashGeometry};
use crate::platform::FlashPlatform;

/// One erase command as issued to the simulated controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseRecord {
    /// Bank that was erased.
    pub bank: Bank,
    /// First bank-relative sector.
    pub first: u32,
    /// Number of sectors.
    pub count: u32,
}

/// In-memory two-bank flash.
///
/// # Example
///
/// ```rust
/// use flashes_core::prelude::*;
///
/// let mut flash = SimulatedFlash::new(FlashGeometry::stm32f4_dual_bank());
/// flash.unlock().expect("unlock");
/// flash.erase_sectors(Bank::B, 0, 1).expect("erase");
/// flash.program_unit(Bank::B, 0, &[1, 2, 3, 4]).expect("program");
/// flash.lock();
/// assert_eq!(&flash.bank_data(Bank::B)[..4], &[1, 2, 3, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedFlash {
    geometry: FlashGeometry,
    banks: [Vec<u8>; 2],
    boot_config: Bank,
    running: Bank,
    unlocked: bool,
    erase_log: Vec<EraseRecord>,
    programmed_units: u64,
    reboots: u32,
    jumps: u32,
    fail_erase_at: Option<u32>,
    fail_program_at: Option<u32>,
    fail_commit: bool,
}

impl SimulatedFlash {
    /// Create a fully erased flash running from bank A.
    #[must_use]
    pub fn new(geometry: FlashGeometry) -> Self {
        let size = geometry.bank_size() as usize;
        Self {
            banks: [vec![ERASED_BYTE; size], vec![ERASED_BYTE; size]],
            geometry,
            boot_config: Bank::A,
            running: Bank::A,
            unlocked: false,
            erase_log: Vec::new(),
            programmed_units: 0,
            reboots: 0,
            jumps: 0,
            fail_erase_at: None,
            fail_program_at: None,
            fail_commit: false,
        }
    }

    /// Restore a flash from saved bank images.
    ///
    /// Images shorter than the bank are padded with erased bytes; longer ones
    /// are truncated.
    #[must_use]
    pub fn from_parts(
        geometry: FlashGeometry,
        bank_a: Vec<u8>,
        bank_b: Vec<u8>,
        boot_config: Bank,
        running: Bank,
    ) -> Self {
        let size = geometry.bank_size() as usize;
        let fit = |mut image: Vec<u8>| {
            image.resize(size, ERASED_BYTE);
            image
        };
        Self {
            banks: [fit(bank_a), fit(bank_b)],
            boot_config,
            running,
            ..Self::new(geometry)
        }
    }

    /// Set the bank the simulated device is executing from.
    #[must_use]
    pub fn with_running_bank(mut self, bank: Bank) -> Self {
        self.running = bank;
        self
    }

    /// Set the persisted boot configuration.
    #[must_use]
    pub fn with_boot_config(mut self, bank: Bank) -> Self {
        self.boot_config = bank;
        self
    }

    /// Make the next erase that covers `sector` fail.
    pub fn inject_erase_failure(&mut self, sector: u32) {
        self.fail_erase_at = Some(sector);
    }

    /// Make programming the unit at bank-relative `offset` fail.
    pub fn inject_program_failure(&mut self, offset: u32) {
        self.fail_program_at = Some(offset);
    }

    /// Make boot configuration commits fail.
    pub fn inject_commit_failure(&mut self, fail: bool) {
        self.fail_commit = fail;
    }

    /// Contents of `bank`.
    #[must_use]
    pub fn bank_data(&self, bank: Bank) -> &[u8] {
        self.bank_slot(bank)
    }

    /// Persisted boot configuration, read without side effects.
    #[must_use]
    pub fn boot_config(&self) -> Bank {
        self.boot_config
    }

    /// Every erase issued so far, in order.
    #[must_use]
    pub fn erase_log(&self) -> &[EraseRecord] {
        &self.erase_log
    }

    /// How many times `sector` of `bank` has been erased.
    #[must_use]
    pub fn erase_count(&self, bank: Bank, sector: u32) -> usize {
        self.erase_log
            .iter()
            .filter(|r| r.bank == bank && (r.first..r.first.saturating_add(r.count)).contains(&sector))
            .count()
    }

    /// Number of program units written so far.
    #[must_use]
    pub fn programmed_units(&self) -> u64 {
        self.programmed_units
    }

    /// Number of resets triggered.
    #[must_use]
    pub fn reboot_count(&self) -> u32 {
        self.reboots
    }

    /// Number of jumps into the installed application.
    #[must_use]
    pub fn jump_count(&self) -> u32 {
        self.jumps
    }

    /// Whether the controller is currently unlocked.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    fn bank_slot(&self, bank: Bank) -> &Vec<u8> {
        let [a, b] = &self.banks;
        match bank {
            Bank::A => a,
            Bank::B => b,
        }
    }

    fn bank_slot_mut(&mut self, bank: Bank) -> &mut Vec<u8> {
        let [a, b] = &mut self.banks;
        match bank {
            Bank::A => a,
            Bank::B => b,
        }
    }
}

impl FlashPlatform for SimulatedFlash {
    fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    fn unlock(&mut self) -> Result<(), PlatformError> {
        self.unlocked = true;
        Ok(())
    }

    fn lock(&mut self) {
        self.unlocked = false;
    }

    fn erase_sectors(&mut self, bank: Bank, first: u32, count: u32) -> Result<(), PlatformError> {
        if !self.unlocked {
            return Err(PlatformError::Locked);
        }
        let end_sector = first
            .checked_add(count)
            .filter(|end| count != 0 && *end <= self.geometry.sector_count());
        let Some(end_sector) = end_sector else {
            return Err(PlatformError::rejected(format!(
                "sector range {first}+{count} outside bank"
            )));
        };
        if let Some(sector) = self.fail_erase_at
            && (first..end_sector).contains(&sector)
        {
            self.fail_erase_at = None;
            return Err(PlatformError::rejected(format!("erase of sector {sector}")));
        }

        let start = self.geometry.sector_start(first).unwrap_or(0) as usize;
        let len: usize = (first..end_sector)
            .filter_map(|s| self.geometry.sector_size(s))
            .map(|s| s as usize)
            .sum();
        if let Some(region) = self.bank_slot_mut(bank).get_mut(start..start.saturating_add(len)) {
            region.fill(ERASED_BYTE);
        }
        self.erase_log.push(EraseRecord { bank, first, count });
        debug!(%bank, first, count, "simulated erase");
        Ok(())
    }

    fn program_unit(&mut self, bank: Bank, offset: u32, unit: &[u8]) -> Result<(), PlatformError> {
        if !self.unlocked {
            return Err(PlatformError::Locked);
        }
        let unit_len = self.geometry.program_unit() as usize;
        if unit.len() != unit_len || !self.geometry.is_aligned(u64::from(offset)) {
            return Err(PlatformError::rejected(format!(
                "unaligned program of {} bytes at {offset:#x}",
                unit.len()
            )));
        }
        if self.fail_program_at == Some(offset) {
            self.fail_program_at = None;
            return Err(PlatformError::rejected(format!("program at {offset:#x}")));
        }

        let start = offset as usize;
        let Some(cells) = self.bank_slot_mut(bank).get_mut(start..start.saturating_add(unit_len)) else {
            return Err(PlatformError::rejected(format!(
                "program at {offset:#x} outside bank"
            )));
        };
        for (cell, byte) in cells.iter_mut().zip(unit) {
            *cell &= *byte;
        }
        if cells != unit {
            return Err(PlatformError::ReadbackMismatch { offset });
        }
        self.programmed_units = self.programmed_units.saturating_add(1);
        trace!(%bank, offset, "simulated program");
        Ok(())
    }

    fn read_boot_config(&mut self) -> Bank {
        self.boot_config
    }

    fn write_boot_config(&mut self, bank: Bank) -> Result<(), PlatformError> {
        if self.fail_commit {
            return Err(PlatformError::rejected("option byte launch"));
        }
        self.boot_config = bank;
        debug!(%bank, "simulated boot configuration committed");
        Ok(())
    }

    fn running_bank(&self) -> Bank {
        self.running
    }

    fn reboot(&mut self) {
        self.reboots = self.reboots.saturating_add(1);
        self.unlocked = false;
        self.running = self.boot_config;
        info!(bank = %self.running, "simulated reset");
    }

    fn jump_to_application(&mut self) {
        self.jumps = self.jumps.saturating_add(1);
        info!(bank = %self.running, "simulated jump to application");
    }
}
