//! Boot bank selection.
//!
//! The persisted boot configuration decides which bank runs after the next
//! reset. `BankSelector` reads it, repairs it when it disagrees with the bank
//! actually executing, commits a new selection after a complete image, and
//! hands control to the installed application.

use tracing::{info, warn};

use crate::bank::Bank;
use crate::error::BankError;
use crate::platform::FlashPlatform;

/// Reads, repairs and commits the boot bank configuration.
#[derive(Debug)]
pub struct BankSelector<'a, P: FlashPlatform + ?Sized> {
    platform: &'a mut P,
}

impl<'a, P: FlashPlatform + ?Sized> BankSelector<'a, P> {
    /// Wrap a platform.
    pub fn new(platform: &'a mut P) -> Self {
        Self { platform }
    }

    /// Whether bank B is the active bank.
    ///
    /// The running bank is authoritative. If the persisted configuration
    /// names the other bank (for example after a hardware fallback boot), it
    /// is rewritten to the running bank before returning. A failed repair is
    /// logged and the running bank is still reported.
    pub fn is_bank_b_selected(&mut self) -> bool {
        self.active_bank().is_b()
    }

    /// The active bank, repairing the persisted configuration if needed.
    pub fn active_bank(&mut self) -> Bank {
        let running = self.platform.running_bank();
        let persisted = self.platform.read_boot_config();
        if persisted != running {
            warn!(
                %persisted,
                %running,
                "Boot configuration disagrees with running bank, repairing"
            );
            if let Err(e) = self.platform.write_boot_config(running) {
                warn!(error = %e, "Failed to repair boot configuration");
            }
        }
        running
    }

    /// Persist `bank` as the boot bank for the next reset.
    ///
    /// # Errors
    ///
    /// Returns `CommitFailed` if the configuration write did not take effect.
    pub fn select_bank(&mut self, bank: Bank) -> Result<(), BankError> {
        self.platform
            .write_boot_config(bank)
            .map_err(|source| BankError::CommitFailed { bank, source })?;
        info!(%bank, "Boot bank committed");
        Ok(())
    }

    /// Transfer control to the application in the active bank.
    pub fn jump_to_application(&mut self) {
        info!(bank = %self.platform.running_bank(), "Jumping to installed application");
        self.platform.jump_to_application();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FlashGeometry;
    use crate::sim::SimulatedFlash;
    use tracing_test::traced_test;

    fn flash() -> SimulatedFlash {
        SimulatedFlash::new(FlashGeometry::stm32f4_dual_bank())
    }

    #[test]
    fn test_consistent_configuration_is_left_alone() {
        let mut flash = flash().with_running_bank(Bank::B).with_boot_config(Bank::B);
        assert!(BankSelector::new(&mut flash).is_bank_b_selected());
        assert_eq!(flash.boot_config(), Bank::B);
    }

    #[test]
    #[traced_test]
    fn test_self_heal_to_bank_a() {
        let mut flash = flash().with_running_bank(Bank::A).with_boot_config(Bank::B);
        assert!(!BankSelector::new(&mut flash).is_bank_b_selected());
        assert_eq!(flash.boot_config(), Bank::A);
        assert!(logs_contain("repairing"));
    }

    #[test]
    fn test_self_heal_to_bank_b() {
        let mut flash = flash().with_running_bank(Bank::B).with_boot_config(Bank::A);
        assert_eq!(BankSelector::new(&mut flash).active_bank(), Bank::B);
        assert_eq!(flash.boot_config(), Bank::B);
    }

    #[test]
    fn test_failed_repair_still_reports_running_bank() {
        let mut flash = flash().with_running_bank(Bank::B).with_boot_config(Bank::A);
        flash.inject_commit_failure(true);
        assert!(BankSelector::new(&mut flash).is_bank_b_selected());
        assert_eq!(flash.boot_config(), Bank::A);
    }

    #[test]
    fn test_select_bank_commits() -> Result<(), BankError> {
        let mut flash = flash();
        BankSelector::new(&mut flash).select_bank(Bank::B)?;
        assert_eq!(flash.boot_config(), Bank::B);
        assert_eq!(flash.running_bank(), Bank::A);
        Ok(())
    }

    #[test]
    fn test_select_bank_failure() {
        let mut flash = flash();
        flash.inject_commit_failure(true);
        let result = BankSelector::new(&mut flash).select_bank(Bank::B);
        assert!(matches!(
            result,
            Err(BankError::CommitFailed { bank: Bank::B, .. })
        ));
    }

    #[test]
    fn test_jump_to_application() {
        let mut flash = flash();
        BankSelector::new(&mut flash).jump_to_application();
        assert_eq!(flash.jump_count(), 1);
    }
}
