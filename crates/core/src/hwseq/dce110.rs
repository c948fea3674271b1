//! DCE 11.x sequencing: firmware-driven CRTC and controller power gating,
//! per-controller blender.

use dc_hal::{BlendMode, PipeLockFlags, PowerDomain, PowerGatingAction};

use super::{firmware_gate, HwContext, HwSequencer};
use crate::context::PipeCtx;
use crate::error::DcError;
use crate::pool::DceVersion;

pub struct Dce110HwSeq {
    version: DceVersion,
}

impl Dce110HwSeq {
    pub fn new(version: DceVersion) -> Self {
        Self { version }
    }

    fn acquire_controller(hw: &mut HwContext<'_>, tg: usize) -> Result<(), DcError> {
        if hw.state.power.acquire(PowerDomain::Controller(tg)) {
            log::trace!("[HWSEQ] ungate controller {}", tg);
            firmware_gate(hw.pool, tg, PowerGatingAction::Disable)?;
        }
        Ok(())
    }

    fn release_controller(hw: &mut HwContext<'_>, tg: usize) -> Result<(), DcError> {
        if hw.state.power.release(PowerDomain::Controller(tg)) {
            log::trace!("[HWSEQ] gate controller {}", tg);
            firmware_gate(hw.pool, tg, PowerGatingAction::Enable)?;
        }
        Ok(())
    }
}

impl HwSequencer for Dce110HwSeq {
    fn name(&self) -> &'static str {
        self.version.name()
    }

    fn init_power(&self, hw: &mut HwContext<'_>) -> Result<(), DcError> {
        hw.pool.firmware.init_display_engine().into_hw()?;
        for slot in hw.pool.pipes.iter().filter(|s| s.tg.is_some()) {
            firmware_gate(hw.pool, slot.index, PowerGatingAction::Init)?;
            firmware_gate(hw.pool, slot.index, PowerGatingAction::Enable)?;
        }
        Ok(())
    }

    fn enable_crtc(&self, hw: &HwContext<'_>, tg: usize) -> Result<(), DcError> {
        hw.pool.firmware.enable_crtc(tg, true).into_hw()?;
        Ok(())
    }

    fn disable_crtc(&self, hw: &HwContext<'_>, tg: usize) -> Result<(), DcError> {
        hw.pool.firmware.enable_crtc(tg, false).into_hw()?;
        Ok(())
    }

    fn power_up_controller(&self, hw: &mut HwContext<'_>, tg: usize) -> Result<(), DcError> {
        if hw.state.controllers_on.insert(tg) {
            Self::acquire_controller(hw, tg)?;
        }
        Ok(())
    }

    fn power_down_controller(&self, hw: &mut HwContext<'_>, tg: usize) -> Result<(), DcError> {
        if hw.state.controllers_on.remove(&tg) {
            Self::release_controller(hw, tg)?;
        }
        Ok(())
    }

    // Front ends share their timing generator's controller domain
    fn power_up_front_end(&self, hw: &mut HwContext<'_>, pipe: &PipeCtx) -> Result<(), DcError> {
        if !hw.state.front_ends_on.insert(pipe.index) {
            return Ok(());
        }
        Self::acquire_controller(hw, pipe.tg)?;
        hw.pool.slot(pipe.index)?.mi.set_blank(false)?;
        Ok(())
    }

    fn power_down_front_end(
        &self,
        hw: &mut HwContext<'_>,
        pipe: &PipeCtx,
    ) -> Result<(), DcError> {
        if !hw.state.front_ends_on.remove(&pipe.index) {
            return Ok(());
        }
        let slot = hw.pool.slot(pipe.index)?;
        slot.mi.set_blank(true)?;
        slot.xfm.reset()?;
        Self::release_controller(hw, pipe.tg)
    }

    fn lock_flags(&self) -> PipeLockFlags {
        PipeLockFlags::DCE_FRONT_END
    }

    fn program_blend(
        &self,
        hw: &HwContext<'_>,
        pipe: &PipeCtx,
        mode: BlendMode,
    ) -> Result<(), DcError> {
        // One blender per controller, owned by the head
        if pipe.top_pipe.is_none() {
            hw.pool.tg(pipe.tg)?.set_blender_mode(mode)?;
        }
        Ok(())
    }
}
