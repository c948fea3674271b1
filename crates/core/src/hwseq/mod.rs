//! Hardware sequencing.
//!
//! [`HwSequencer`] holds the per-generation primitives (CRTC enable, power
//! gating, pipe locks, blending). The commit protocol built on them is shared
//! and lives in [`commit`]; timing synchronization lives in [`sync`].

pub mod commit;
mod dce110;
mod dcn10;
pub mod sync;

use alloc::boxed::Box;
use alloc::vec::Vec;

use dc_hal::{BlendMode, GamutRemap, PipeLockFlags, PowerDomain, PowerGatingAction, Watermarks};
use dc_utils::{poll_until, HashMap, HashSet};

use crate::config::DcConfig;
use crate::context::{PipeCtx, ValidationContext};
use crate::error::DcError;
use crate::link::Link;
use crate::pool::{DceVersion, ResourcePool};
use crate::power::PowerDomainRefs;
use crate::stream::StreamId;

pub use dce110::Dce110HwSeq;
pub use dcn10::Dcn10HwSeq;

/// Hardware-side bookkeeping that outlives a single commit.
#[derive(Debug, Clone, Default)]
pub struct HwState {
    pub power: PowerDomainRefs,
    /// Timing generators whose controller domain this core holds.
    pub controllers_on: HashSet<usize>,
    /// Pipes whose front end is powered.
    pub front_ends_on: HashSet<usize>,
    /// Display clock as last programmed.
    pub dispclk_khz: u32,
    /// Watermarks as last programmed, by pipe.
    pub watermarks: HashMap<usize, Watermarks>,
    /// Streams held blank by DPMS.
    pub dpms_off: HashSet<StreamId>,
    /// Gamut remap applied on top of the default, by stream.
    pub gamut: HashMap<StreamId, GamutRemap>,
    pub gsl_timeouts: u32,
    /// Candidates whose commit failed part-way; the next full reprogram
    /// tears down whatever they left enabled.
    pub stale: Vec<ValidationContext>,
}

impl HwState {
    /// Drop all tracking; hardware has just been brought to its boot state.
    pub fn reset_tracking(&mut self) {
        self.power.clear();
        self.controllers_on.clear();
        self.front_ends_on.clear();
        self.watermarks.clear();
        self.dpms_off.clear();
        self.gamut.clear();
        self.stale.clear();
    }
}

/// Everything a sequencer step may touch.
pub struct HwContext<'a> {
    pub pool: &'a ResourcePool,
    pub links: &'a [Link],
    pub config: &'a DcConfig,
    pub state: &'a mut HwState,
}

/// Counters for one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitStats {
    pub pipes_reset: u32,
    pub back_ends_programmed: u32,
    pub fast_updates: u32,
    pub medium_updates: u32,
    pub full_updates: u32,
    pub sync_timeouts: u32,
    pub dispclk_khz: u32,
    pub dispclk_raised: bool,
    pub dispclk_lowered: bool,
}

/// Per-generation hardware primitives.
pub trait HwSequencer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Generation part of boot: engine init and gating every domain.
    fn init_power(&self, hw: &mut HwContext<'_>) -> Result<(), DcError>;

    /// Bring the engine to a known idle state.
    fn init_hw(&self, hw: &mut HwContext<'_>) -> Result<(), DcError> {
        commit::init_hw(self, hw)
    }

    fn enable_crtc(&self, hw: &HwContext<'_>, tg: usize) -> Result<(), DcError>;

    fn disable_crtc(&self, hw: &HwContext<'_>, tg: usize) -> Result<(), DcError>;

    fn power_up_controller(&self, hw: &mut HwContext<'_>, tg: usize) -> Result<(), DcError>;

    fn power_down_controller(&self, hw: &mut HwContext<'_>, tg: usize) -> Result<(), DcError>;

    fn power_up_front_end(&self, hw: &mut HwContext<'_>, pipe: &PipeCtx) -> Result<(), DcError>;

    fn power_down_front_end(&self, hw: &mut HwContext<'_>, pipe: &PipeCtx)
    -> Result<(), DcError>;

    /// Lock bits that hold a pipe's double-buffered front-end registers.
    fn lock_flags(&self) -> PipeLockFlags;

    /// Program how `pipe` blends with the pipe beneath it.
    fn program_blend(&self, hw: &HwContext<'_>, pipe: &PipeCtx, mode: BlendMode)
    -> Result<(), DcError>;

    /// Move hardware from `current` to `new`.
    fn apply_ctx_to_hw(
        &self,
        hw: &mut HwContext<'_>,
        current: &ValidationContext,
        new: &ValidationContext,
        force_full: bool,
    ) -> Result<CommitStats, DcError> {
        commit::apply(self, hw, current, new, force_full)
    }
}

/// Sequencer for `version`.
pub fn create_hwseq(version: DceVersion) -> Box<dyn HwSequencer> {
    match version {
        DceVersion::Dce110 | DceVersion::Dce112 => Box::new(Dce110HwSeq::new(version)),
        DceVersion::Dcn10 => Box::new(Dcn10HwSeq),
    }
}

/// Ask firmware to gate or ungate a DCE controller domain.
fn firmware_gate(pool: &ResourcePool, controller: usize, action: PowerGatingAction) -> Result<(), DcError> {
    if !pool.firmware.supports_power_gating() {
        return Ok(());
    }
    pool.firmware
        .enable_disp_power_gating(controller, action)
        .into_hw()?;
    Ok(())
}

/// Request a DCN domain power state and wait for the acknowledgement.
fn register_gate(hw: &HwContext<'_>, domain: PowerDomain, on: bool) -> Result<(), DcError> {
    let Some(pg) = hw.pool.power_gate.as_ref() else {
        return Err(DcError::MissingBlock);
    };
    pg.set_domain_power(domain, on)?;
    poll_until(hw.pool.delay.as_ref(), hw.config.power_gate_poll, || {
        pg.domain_powered(domain) == on
    })
    .map_err(|t| {
        log::error!("[HWSEQ] {:?} power {} not acknowledged: {}", domain, on, t);
        DcError::HwAck(dc_hal::HwError::NotAcknowledged)
    })?;
    Ok(())
}
