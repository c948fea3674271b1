//! Display core configuration.

use dc_utils::PollPolicy;

/// Runtime knobs for the display core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DcConfig {
    /// Frame-lock new heads with matching timings through GSL.
    pub enable_timing_sync: bool,
    /// Prefer an idle PLL over sharing a compatible one.
    pub disable_clock_sharing: bool,
    /// Wait for a timing generator to report blank.
    pub blank_poll: PollPolicy,
    /// Wait for a DCN power domain to acknowledge.
    pub power_gate_poll: PollPolicy,
    /// Frames to wait for armed reset triggers during timing sync.
    pub gsl_max_frames: u32,
    /// Delay between DP M/N programming and unblank.
    pub dp_mn_settle_us: u32,
    /// Program safe watermarks on touched pipes before raising clocks.
    pub apply_safe_watermarks: bool,
    /// Trip a debug assertion on internal invariant violations.
    pub assert_on_invariant_violation: bool,
}

impl Default for DcConfig {
    fn default() -> Self {
        Self {
            enable_timing_sync: false,
            disable_clock_sharing: false,
            // Two frames at 60 Hz
            blank_poll: PollPolicy::new(340, 100),
            power_gate_poll: PollPolicy::new(1000, 1),
            gsl_max_frames: 10,
            dp_mn_settle_us: 100,
            apply_safe_watermarks: true,
            assert_on_invariant_violation: cfg!(debug_assertions),
        }
    }
}
