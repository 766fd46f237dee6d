//! Flash sector layout of one bank.
//!
//! Both banks share the same layout. Sector indices are bank-relative; the
//! platform maps them to hardware sector numbers.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Value of an erased flash byte.
pub const ERASED_BYTE: u8 = 0xFF;

/// Sector layout and program granularity of one bank.
///
/// Deserialized values go through [`FlashGeometry::new`] and are validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GeometryLayout")]
pub struct FlashGeometry {
    /// Size in bytes of each sector, in address order.
    sector_sizes: Vec<u32>,
    /// Minimum program unit in bytes.
    program_unit: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GeometryLayout {
    sector_sizes: Vec<u32>,
    program_unit: u32,
}

impl TryFrom<GeometryLayout> for FlashGeometry {
    type Error = ConfigError;

    fn try_from(layout: GeometryLayout) -> Result<Self, Self::Error> {
        Self::new(layout.sector_sizes, layout.program_unit)
    }
}

/// Inclusive range of bank-relative sector indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorRange {
    /// First sector touched.
    pub first: u32,
    /// Last sector touched (inclusive).
    pub last: u32,
}

impl SectorRange {
    /// Number of sectors in the range.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.last.saturating_sub(self.first).saturating_add(1)
    }
}

impl FlashGeometry {
    /// Create a geometry from explicit sector sizes.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no sectors, the program unit is not a power
    /// of two, a sector size is not a multiple of the program unit, or the bank
    /// would not be addressable with 32 bits.
    pub fn new(sector_sizes: Vec<u32>, program_unit: u32) -> Result<Self, ConfigError> {
        if sector_sizes.is_empty() {
            return Err(ConfigError::invalid("flash geometry needs at least one sector"));
        }
        if !program_unit.is_power_of_two() {
            return Err(ConfigError::invalid("program_unit must be a power of two"));
        }
        if sector_sizes
            .iter()
            .any(|size| *size == 0 || !size.is_multiple_of(program_unit))
        {
            return Err(ConfigError::invalid(
                "sector sizes must be non-zero multiples of program_unit",
            ));
        }
        let total: u64 = sector_sizes.iter().map(|s| u64::from(*s)).sum();
        if total > u64::from(u32::MAX) {
            return Err(ConfigError::invalid("bank size exceeds 32-bit address space"));
        }
        Ok(Self {
            sector_sizes,
            program_unit,
        })
    }

    /// Geometry with `count` equally sized sectors.
    ///
    /// # Errors
    ///
    /// Same conditions as [`FlashGeometry::new`].
    pub fn uniform(sector_size: u32, count: u32, program_unit: u32) -> Result<Self, ConfigError> {
        Self::new(vec![sector_size; count as usize], program_unit)
    }

    /// One 1 MiB bank of an STM32F4 dual-bank part: four 16 KiB sectors, one
    /// 64 KiB sector and seven 128 KiB sectors, programmed in 32-bit words.
    #[must_use]
    pub fn stm32f4_dual_bank() -> Self {
        let mut sector_sizes = vec![16 * 1024; 4];
        sector_sizes.push(64 * 1024);
        sector_sizes.extend([128 * 1024; 7]);
        Self {
            sector_sizes,
            program_unit: 4,
        }
    }

    /// Minimum program unit in bytes.
    #[must_use]
    pub fn program_unit(&self) -> u32 {
        self.program_unit
    }

    /// Number of sectors per bank.
    #[must_use]
    pub fn sector_count(&self) -> u32 {
        self.sector_sizes.len() as u32
    }

    /// Sector sizes in address order.
    #[must_use]
    pub fn sector_sizes(&self) -> &[u32] {
        &self.sector_sizes
    }

    /// Total size of one bank in bytes.
    #[must_use]
    pub fn bank_size(&self) -> u32 {
        self.sector_sizes.iter().sum()
    }

    /// Whether `value` is a multiple of the program unit.
    #[must_use]
    pub fn is_aligned(&self, value: u64) -> bool {
        value.is_multiple_of(u64::from(self.program_unit))
    }

    /// Bank-relative start offset of sector `index`.
    #[must_use]
    pub fn sector_start(&self, index: u32) -> Option<u32> {
        if index >= self.sector_count() {
            return None;
        }
        Some(self.sector_sizes.iter().take(index as usize).sum())
    }

    /// Size of sector `index`.
    #[must_use]
    pub fn sector_size(&self, index: u32) -> Option<u32> {
        self.sector_sizes.get(index as usize).copied()
    }

    /// Sector containing the bank-relative `offset`.
    #[must_use]
    pub fn sector_of(&self, offset: u32) -> Option<u32> {
        let mut end: u64 = 0;
        for (index, size) in self.sector_sizes.iter().enumerate() {
            end = end.saturating_add(u64::from(*size));
            if u64::from(offset) < end {
                return Some(index as u32);
            }
        }
        None
    }

    /// Inclusive sector range spanned by `[offset, offset + len)`.
    ///
    /// Returns `None` for an empty range or one that runs past the bank.
    #[must_use]
    pub fn sector_range(&self, offset: u32, len: usize) -> Option<SectorRange> {
        if len == 0 {
            return None;
        }
        let last_byte = u64::from(offset).checked_add((len as u64).saturating_sub(1))?;
        let last_byte = u32::try_from(last_byte).ok()?;
        let first = self.sector_of(offset)?;
        let last = self.sector_of(last_byte)?;
        Some(SectorRange { first, last })
    }
}

impl Default for FlashGeometry {
    fn default() -> Self {
        Self::stm32f4_dual_bank()
    }
}
