//! VBIOS command-table executor.

use crate::types::PowerGatingAction;
use crate::{HwError, HwResult};

/// Result code returned by a command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpResult {
    Ok,
    Failure,
    BadInput,
    NotImplemented,
}

impl BpResult {
    /// Map the command-table code onto a hardware error.
    pub fn into_hw(self) -> HwResult<()> {
        match self {
            Self::Ok => Ok(()),
            Self::Failure | Self::BadInput => Err(HwError::FirmwareRejected),
            Self::NotImplemented => Err(HwError::FirmwareUnsupported),
        }
    }
}

/// Firmware services the DCE sequencer relies on. Every call is a remote
/// command that may fail; none is assumed to have taken effect until it
/// returns [`BpResult::Ok`].
pub trait Firmware: Send + Sync {
    /// Gate, ungate or initialise the power domain of `controller`.
    fn enable_disp_power_gating(&self, controller: usize, action: PowerGatingAction) -> BpResult;

    /// Start or stop the CRTC of `controller`.
    fn enable_crtc(&self, controller: usize, enable: bool) -> BpResult;

    /// One-time display engine init at boot.
    fn init_display_engine(&self) -> BpResult;

    /// Whether the command table for power gating is present.
    fn supports_power_gating(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bp_result_mapping() {
        assert_eq!(BpResult::Ok.into_hw(), Ok(()));
        assert_eq!(BpResult::BadInput.into_hw(), Err(HwError::FirmwareRejected));
        assert_eq!(
            BpResult::NotImplemented.into_hw(),
            Err(HwError::FirmwareUnsupported)
        );
    }
}
