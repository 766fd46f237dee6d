//! Platform capability trait.
//!
//! This module provides the `FlashPlatform` trait: the small set of vendor
//! primitives the flash programmer and bank selector are built on. Hardware
//! ports implement it on top of the vendor HAL; [`SimulatedFlash`] implements
//! it over an in-memory array.
//!
//! [`SimulatedFlash`]: crate::sim::SimulatedFlash

use crate::bank::Bank;
use crate::error::PlatformError;
use crate::geometry::FlashGeometry;

/// Vendor flash, boot configuration and reset primitives.
///
/// All calls are synchronous. Erase and program block the caller for the
/// duration of the hardware operation.
///
/// # Implementation Requirements
///
/// 1. `erase_sectors()` and `program_unit()` MUST fail with
///    [`PlatformError::Locked`] unless `unlock()` was called first
/// 2. `program_unit()` receives exactly `geometry().program_unit()` bytes at an
///    aligned bank-relative offset
/// 3. `write_boot_config()` MUST only return `Ok` once the new value is committed
/// 4. `running_bank()` reports the bank actually executing, independent of the
///    persisted boot configuration
pub trait FlashPlatform {
    /// Sector layout shared by both banks.
    fn geometry(&self) -> &FlashGeometry;

    /// Unlock the flash controller for erase and program.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller refuses the unlock sequence.
    fn unlock(&mut self) -> Result<(), PlatformError>;

    /// Lock the flash controller again.
    fn lock(&mut self);

    /// Erase `count` contiguous sectors of `bank`, starting at bank-relative
    /// sector `first`.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware rejects the erase.
    fn erase_sectors(&mut self, bank: Bank, first: u32, count: u32) -> Result<(), PlatformError>;

    /// Program one minimum-granularity unit at bank-relative `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware rejects the program command or the
    /// unit does not read back as written.
    fn program_unit(&mut self, bank: Bank, offset: u32, unit: &[u8]) -> Result<(), PlatformError>;

    /// Read the persisted boot-bank configuration.
    fn read_boot_config(&mut self) -> Bank;

    /// Write and commit the persisted boot-bank configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the option-byte write or launch did not take effect.
    fn write_boot_config(&mut self, bank: Bank) -> Result<(), PlatformError>;

    /// Bank the device is currently executing from.
    fn running_bank(&self) -> Bank;

    /// Trigger a hardware reset. Does not return on hardware.
    fn reboot(&mut self);

    /// Relocate the vector table, reload the stack pointer from the installed
    /// application's vector table and call through its reset vector. Does not
    /// return on hardware.
    fn jump_to_application(&mut self);
}

impl<P: FlashPlatform + ?Sized> FlashPlatform for &mut P {
    fn geometry(&self) -> &FlashGeometry {
        (**self).geometry()
    }

    fn unlock(&mut self) -> Result<(), PlatformError> {
        (**self).unlock()
    }

    fn lock(&mut self) {
        (**self).lock();
    }

    fn erase_sectors(&mut self, bank: Bank, first: u32, count: u32) -> Result<(), PlatformError> {
        (**self).erase_sectors(bank, first, count)
    }

    fn program_unit(&mut self, bank: Bank, offset: u32, unit: &[u8]) -> Result<(), PlatformError> {
        (**self).program_unit(bank, offset, unit)
    }

    fn read_boot_config(&mut self) -> Bank {
        (**self).read_boot_config()
    }

    fn write_boot_config(&mut self, bank: Bank) -> Result<(), PlatformError> {
        (**self).write_boot_config(bank)
    }

    fn running_bank(&self) -> Bank {
        (**self).running_bank()
    }

    fn reboot(&mut self) {
        (**self).reboot();
    }

    fn jump_to_application(&mut self) {
        (**self).jump_to_application();
    }
}
