//! Flash programming with a per-session erase cursor.
//!
//! Sectors are erased lazily: a write first erases every sector it touches
//! whose index is at or beyond the session's erase cursor, then moves the
//! cursor past the last sector touched. Sequential writes into the same bank
//! therefore erase each sector exactly once, and never erase data written
//! earlier in the session.

use tracing::{debug, error, trace};

use crate::bank::Bank;
use crate::error::FlashError;
use crate::geometry::SectorRange;
use crate::platform::FlashPlatform;

/// Index of the next sector of the target bank not yet erased in this session.
///
/// The cursor only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct EraseCursor(u32);

impl EraseCursor {
    /// Fresh cursor at sector zero.
    #[must_use]
    pub fn new() -> Self {
        Self(0)
    }

    /// Next sector not yet erased.
    #[must_use]
    pub fn next(self) -> u32 {
        self.0
    }

    /// Move the cursor to `sector` if that is further ahead.
    pub fn advance_to(&mut self, sector: u32) {
        self.0 = self.0.max(sector);
    }
}

/// Erases and programs one bank through a [`FlashPlatform`].
#[derive(Debug)]
pub struct FlashProgrammer<'a, P: FlashPlatform + ?Sized> {
    platform: &'a mut P,
}

impl<'a, P: FlashPlatform + ?Sized> FlashProgrammer<'a, P> {
    /// Wrap a platform.
    pub fn new(platform: &'a mut P) -> Self {
        Self { platform }
    }

    /// Write `data` at bank-relative `address` of `bank`.
    ///
    /// If the last sector touched by `[address, address + data.len())` is at or
    /// beyond `cursor`, sectors `max(first, cursor)..=last` are erased and the
    /// cursor moves to `last + 1`. The payload is then programmed unit by unit;
    /// units written before a failing one stay written. The controller is
    /// unlocked for the duration of the call and locked again on every path.
    ///
    /// # Errors
    ///
    /// - `AlignmentError` if the address or length is not a multiple of the
    ///   program unit
    /// - `OutOfRange` if the write runs past the end of the bank
    /// - `Locked` if the controller cannot be unlocked
    /// - `EraseFailed` / `ProgramFailed` on hardware failure
    pub fn write(
        &mut self,
        address: u32,
        data: &[u8],
        bank: Bank,
        cursor: &mut EraseCursor,
    ) -> Result<(), FlashError> {
        if data.is_empty() {
            return Ok(());
        }

        let geometry = self.platform.geometry();
        let unit = geometry.program_unit();
        if !geometry.is_aligned(u64::from(address)) || !geometry.is_aligned(data.len() as u64) {
            return Err(FlashError::AlignmentError {
                address,
                len: data.len(),
                unit,
            });
        }
        let range = geometry
            .sector_range(address, data.len())
            .ok_or_else(|| FlashError::OutOfRange {
                address,
                len: data.len(),
                bank_size: geometry.bank_size(),
            })?;

        self.platform.unlock().map_err(FlashError::Locked)?;
        let result = self.erase_and_program(address, data, bank, cursor, range);
        self.platform.lock();

        if let Err(ref err) = result {
            error!(%bank, address, len = data.len(), error = %err, "Flash write failed");
        }
        result
    }

    fn erase_and_program(
        &mut self,
        address: u32,
        data: &[u8],
        bank: Bank,
        cursor: &mut EraseCursor,
        touched: SectorRange,
    ) -> Result<(), FlashError> {
        if touched.last >= cursor.next() {
            let pending = SectorRange {
                first: touched.first.max(cursor.next()),
                last: touched.last,
            };
            let count = pending.count();

            debug!(%bank, first = pending.first, count, "Erasing sectors");
            self.platform
                .erase_sectors(bank, pending.first, count)
                .map_err(|source| FlashError::EraseFailed {
                    first_sector: pending.first,
                    count,
                    source,
                })?;
            cursor.advance_to(touched.last.saturating_add(1));
        }

        let unit = self.platform.geometry().program_unit();
        let mut offset = address;
        for chunk in data.chunks_exact(unit as usize) {
            self.platform
                .program_unit(bank, offset, chunk)
                .map_err(|source| FlashError::ProgramFailed { offset, source })?;
            offset = offset.saturating_add(unit);
        }
        trace!(%bank, address, len = data.len(), "Programmed");
        Ok(())
    }
}
