//! Hardware abstraction for the display core.
//!
//! Every hardware block the core sequences is consumed through a trait in
//! [`blocks`]; the VBIOS command-table executor through [`firmware::Firmware`];
//! the ASIC capability table through [`caps::AsicCaps`]. Block instances are
//! handed out by a [`blocks::BlockFactory`] when a resource pool is built.
//!
//! Mutating calls return [`HwResult`] because both firmware command tables
//! and register acknowledgment polls can fail. Queries are infallible.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod blocks;
pub mod caps;
pub mod firmware;
#[cfg(feature = "mock")]
pub mod mock;
pub mod types;

pub use blocks::{
    AudioEndpoint, BlockFactory, ClockSourceHw, DisplayClock, InputPixelProcessor, LinkEncoder,
    MemoryInput, Mpc, OutputPixelProcessor, PowerGateController, StreamEncoder, TimingGenerator,
    Transform,
};
pub use caps::{AsicCaps, AsicFeature, FeatureValue};
pub use firmware::{BpResult, Firmware};
pub use types::*;

use dc_error::define_dc_error;

define_dc_error! {
    /// Failures reported by a hardware block or the firmware executor.
    pub enum HwError(0x21) {
        /// Firmware command table returned failure
        FirmwareRejected = 0x01 [HardwareAck] => "Firmware command table failed",
        /// Firmware does not implement the command
        FirmwareUnsupported = 0x02 [HardwareAck] => "Firmware command not implemented",
        /// A register never reported the requested state
        NotAcknowledged = 0x03 [HardwareAck] => "Register acknowledgment not observed",
        /// DP link training did not reach channel equalization
        LinkTrainingFailed = 0x04 [HardwareAck] => "Link training failed",
        /// PLL could not lock at the requested rate
        PllLockFailed = 0x05 [HardwareAck] => "PLL failed to lock",
        /// A block instance outside the pool was addressed
        InvalidInstance = 0x06 [Internal] => "Invalid block instance",
    }
}

/// Result type for mutating hardware calls.
pub type HwResult<T> = Result<T, HwError>;
