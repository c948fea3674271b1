//! DCN 1.0 sequencing: register CRTC control, HUBP/DPP power domains with
//! acknowledgement polling, MPC blending.

use dc_hal::{BlendMode, PipeLockFlags, PowerDomain};

use super::{register_gate, HwContext, HwSequencer};
use crate::context::PipeCtx;
use crate::error::DcError;

pub struct Dcn10HwSeq;

impl Dcn10HwSeq {
    fn domains(pipe: usize) -> [PowerDomain; 2] {
        [PowerDomain::Hubp(pipe), PowerDomain::Dpp(pipe)]
    }
}

impl HwSequencer for Dcn10HwSeq {
    fn name(&self) -> &'static str {
        "dcn10"
    }

    fn init_power(&self, hw: &mut HwContext<'_>) -> Result<(), DcError> {
        for slot in &hw.pool.pipes {
            for domain in Self::domains(slot.index) {
                register_gate(hw, domain, false)?;
            }
        }
        Ok(())
    }

    fn enable_crtc(&self, hw: &HwContext<'_>, tg: usize) -> Result<(), DcError> {
        hw.pool.tg(tg)?.enable_crtc()?;
        Ok(())
    }

    fn disable_crtc(&self, hw: &HwContext<'_>, tg: usize) -> Result<(), DcError> {
        hw.pool.tg(tg)?.disable_crtc()?;
        Ok(())
    }

    // OTGs are never power gated on this generation
    fn power_up_controller(&self, hw: &mut HwContext<'_>, tg: usize) -> Result<(), DcError> {
        hw.state.controllers_on.insert(tg);
        Ok(())
    }

    fn power_down_controller(&self, hw: &mut HwContext<'_>, tg: usize) -> Result<(), DcError> {
        hw.state.controllers_on.remove(&tg);
        Ok(())
    }

    fn power_up_front_end(&self, hw: &mut HwContext<'_>, pipe: &PipeCtx) -> Result<(), DcError> {
        if !hw.state.front_ends_on.insert(pipe.index) {
            return Ok(());
        }
        for domain in Self::domains(pipe.index) {
            if hw.state.power.acquire(domain) {
                register_gate(hw, domain, true)?;
            }
        }
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
        if let Some(mpc) = hw.pool.mpc.as_ref() {
            mpc.remove_mpcc(pipe.opp, pipe.index)?;
        }
        let slot = hw.pool.slot(pipe.index)?;
        slot.mi.set_blank(true)?;
        slot.xfm.reset()?;
        for domain in Self::domains(pipe.index) {
            if hw.state.power.release(domain) {
                register_gate(hw, domain, false)?;
            }
        }
        Ok(())
    }

    fn lock_flags(&self) -> PipeLockFlags {
        PipeLockFlags::OTG_MASTER
    }

    fn program_blend(
        &self,
        hw: &HwContext<'_>,
        pipe: &PipeCtx,
        mode: BlendMode,
    ) -> Result<(), DcError> {
        let mpc = hw.pool.mpc.as_ref().ok_or(DcError::MissingBlock)?;
        mpc.update_blending(pipe.opp, pipe.index, mode)?;
        Ok(())
    }
}
