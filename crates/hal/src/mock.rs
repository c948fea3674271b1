//! Register-log test double.
//!
//! [`MockHw`] implements [`BlockFactory`] and [`Firmware`] for every block
//! type. Each mutating call is appended to a shared [`HwLog`] as
//! `(block, instance, op, arg)` so tests can assert on ordering and counts.
//! Queries are not logged. Faults are injected by op name.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use dc_utils::{Delay, FakeClock, Mutex};

use crate::blocks::{
    AudioEndpoint, BlockFactory, ClockSourceHw, DisplayClock, InputPixelProcessor, LinkEncoder,
    MemoryInput, Mpc, OutputPixelProcessor, PowerGateController, StreamEncoder, TimingGenerator,
    Transform,
};
use crate::firmware::{BpResult, Firmware};
use crate::types::{
    AudioOutput, BlendMode, ClockSourceId, ColorSpace, CrtcPosition, CrtcTiming, CursorAttributes,
    CursorPosition, DegammaMode, DrrParams, EngineId, FormatterParams, GamutRemap, GslParams,
    InfoFrames, LbPixelDepth, LinkSettings, PipeLockFlags, PixelClockParams, PlaneAddress,
    PllSettings, PowerDomain, PowerGatingAction, RegammaMode, ScalerData, ScalingTaps, SignalType,
    SurfaceConfig, SurfacePixelFormat, Watermarks,
};
use crate::{HwError, HwResult};

/// One recorded hardware call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwCall {
    pub block: &'static str,
    pub inst: usize,
    pub op: &'static str,
    pub arg: u64,
}

/// Ordered log of every mutating hardware call.
#[derive(Debug, Default)]
pub struct HwLog {
    calls: Mutex<Vec<HwCall>>,
}

impl HwLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, block: &'static str, inst: usize, op: &'static str, arg: u64) {
        self.calls.lock().push(HwCall {
            block,
            inst,
            op,
            arg,
        });
    }

    pub fn calls(&self) -> Vec<HwCall> {
        self.calls.lock().clone()
    }

    /// Calls recorded at or after `mark` (a previous [`Self::len`]).
    pub fn since(&self, mark: usize) -> Vec<HwCall> {
        self.calls.lock().get(mark..).map(<[HwCall]>::to_vec).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Number of calls to `op` on any block.
    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    /// Number of calls to `op` on `block`.
    pub fn count_block(&self, block: &str, op: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.block == block && c.op == op)
            .count()
    }

    /// Number of calls to `op` on one block instance.
    pub fn count_inst(&self, block: &str, inst: usize, op: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.block == block && c.inst == inst && c.op == op)
            .count()
    }

    /// Index of the first call to `block.op`.
    pub fn first(&self, block: &str, op: &str) -> Option<usize> {
        self.calls
            .lock()
            .iter()
            .position(|c| c.block == block && c.op == op)
    }

    /// Index of the last call to `block.op`.
    pub fn last(&self, block: &str, op: &str) -> Option<usize> {
        self.calls
            .lock()
            .iter()
            .rposition(|c| c.block == block && c.op == op)
    }

    /// All calls to `block.op`, in order.
    pub fn filter(&self, block: &str, op: &str) -> Vec<HwCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.block == block && c.op == op)
            .copied()
            .collect()
    }

    /// Call counts grouped by `(block, op)`, sorted by key.
    pub fn histogram(&self) -> Vec<(&'static str, &'static str, usize)> {
        let mut out: Vec<(&'static str, &'static str, usize)> = Vec::new();
        for call in self.calls.lock().iter() {
            match out
                .iter_mut()
                .find(|(b, o, _)| *b == call.block && *o == call.op)
            {
                Some(entry) => entry.2 += 1,
                None => out.push((call.block, call.op, 1)),
            }
        }
        out.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        out
    }
}

/// Shape of the simulated ASIC.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Timing generators.
    pub tg_count: usize,
    /// Front-end block sets (MI/XFM/IPP/OPP); may exceed `tg_count` for underlay.
    pub pipe_count: usize,
    pub stream_encoders: u8,
    pub links: usize,
    pub audio_endpoints: usize,
    pub plls: u8,
    /// Highest TMDS rate a link encoder accepts.
    pub max_tmds_khz: u32,
    /// Highest rate a PLL locks at.
    pub max_pll_khz: u32,
    pub dispclk_max_khz: u32,
    pub dispclk_boot_khz: u32,
    /// Largest downscale factor the scaler supports.
    pub max_downscale: u32,
    /// Largest upscale factor the scaler supports.
    pub max_upscale: u32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            tg_count: 6,
            pipe_count: 6,
            stream_encoders: 7,
            links: 6,
            audio_endpoints: 7,
            plls: 6,
            max_tmds_khz: 600_000,
            max_pll_khz: 600_000,
            dispclk_max_khz: 1_200_000,
            dispclk_boot_khz: 300_000,
            max_downscale: 4,
            max_upscale: 16,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TgState {
    enabled: bool,
    blanked: bool,
    blank_stuck: bool,
    timing: Option<CrtcTiming>,
    locked: Option<PipeLockFlags>,
    reset_armed: Option<usize>,
    drr: Option<DrrParams>,
}

#[derive(Debug)]
struct MockState {
    tgs: Vec<TgState>,
    blend: Vec<Option<BlendMode>>,
    addresses: Vec<Option<PlaneAddress>>,
    watermarks: Vec<Option<Watermarks>>,
    faults: Vec<(&'static str, u32)>,
    reset_trigger_fires: bool,
    dispclk_khz: u32,
    powered: Vec<(PowerDomain, bool)>,
    power_gate_stuck: bool,
    dig_enabled: Vec<bool>,
}

struct Shared {
    config: MockConfig,
    log: Arc<HwLog>,
    clock: Arc<FakeClock>,
    state: Mutex<MockState>,
}

impl Shared {
    /// Log the call, then consume one injected fault for `op` if any.
    fn call(&self, block: &'static str, inst: usize, op: &'static str, arg: u64) -> bool {
        self.log.record(block, inst, op, arg);
        let mut state = self.state.lock();
        match state.faults.iter_mut().find(|(o, n)| *o == op && *n > 0) {
            Some(fault) => {
                fault.1 -= 1;
                log::trace!("[MOCK] injected fault on {}.{}[{}]", block, op, inst);
                false
            }
            None => true,
        }
    }

    fn ack(&self, block: &'static str, inst: usize, op: &'static str, arg: u64) -> HwResult<()> {
        if self.call(block, inst, op, arg) {
            Ok(())
        } else {
            Err(HwError::NotAcknowledged)
        }
    }

    fn with_tg<R>(&self, inst: usize, f: impl FnOnce(&mut TgState) -> R) -> Option<R> {
        self.state.lock().tgs.get_mut(inst).map(f)
    }
}

fn domain_code(domain: PowerDomain) -> u64 {
    match domain {
        PowerDomain::Controller(i) => 0x100 | i as u64,
        PowerDomain::Hubp(i) => 0x200 | i as u64,
        PowerDomain::Dpp(i) => 0x300 | i as u64,
    }
}

/// Simulated display engine.
#[derive(Clone)]
pub struct MockHw {
    shared: Arc<Shared>,
}

impl Default for MockHw {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

impl MockHw {
    pub fn new(config: MockConfig) -> Self {
        let state = MockState {
            tgs: vec![TgState::default(); config.tg_count],
            blend: vec![None; config.pipe_count],
            addresses: vec![None; config.pipe_count],
            watermarks: vec![None; config.pipe_count],
            faults: Vec::new(),
            reset_trigger_fires: true,
            dispclk_khz: config.dispclk_boot_khz,
            powered: Vec::new(),
            power_gate_stuck: false,
            dig_enabled: vec![false; config.links],
        };
        Self {
            shared: Arc::new(Shared {
                config,
                log: Arc::new(HwLog::new()),
                clock: Arc::new(FakeClock::new()),
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &MockConfig {
        &self.shared.config
    }

    pub fn log(&self) -> &Arc<HwLog> {
        &self.shared.log
    }

    pub fn clock(&self) -> &Arc<FakeClock> {
        &self.shared.clock
    }

    /// Fail the next `times` calls to `op`.
    pub fn fail_times(&self, op: &'static str, times: u32) {
        self.shared.state.lock().faults.push((op, times));
    }

    pub fn fail_once(&self, op: &'static str) {
        self.fail_times(op, 1);
    }

    pub fn clear_faults(&self) {
        self.shared.state.lock().faults.clear();
    }

    /// Whether armed reset triggers ever fire.
    pub fn set_reset_trigger_fires(&self, fires: bool) {
        self.shared.state.lock().reset_trigger_fires = fires;
    }

    /// Make a TG ignore blank requests.
    pub fn set_blank_stuck(&self, tg: usize, stuck: bool) {
        self.shared.with_tg(tg, |s| s.blank_stuck = stuck);
    }

    /// Make power-gate requests never complete.
    pub fn set_power_gate_stuck(&self, stuck: bool) {
        self.shared.state.lock().power_gate_stuck = stuck;
    }

    pub fn tg_enabled(&self, tg: usize) -> bool {
        self.shared.with_tg(tg, |s| s.enabled).unwrap_or(false)
    }

    pub fn tg_blanked(&self, tg: usize) -> bool {
        self.shared.with_tg(tg, |s| s.blanked).unwrap_or(false)
    }

    pub fn tg_timing(&self, tg: usize) -> Option<CrtcTiming> {
        self.shared.with_tg(tg, |s| s.timing).flatten()
    }

    pub fn tg_locked(&self, tg: usize) -> bool {
        self.shared
            .with_tg(tg, |s| s.locked.is_some())
            .unwrap_or(false)
    }

    pub fn reset_armed(&self, tg: usize) -> bool {
        self.shared
            .with_tg(tg, |s| s.reset_armed.is_some())
            .unwrap_or(false)
    }

    pub fn drr(&self, tg: usize) -> Option<DrrParams> {
        self.shared.with_tg(tg, |s| s.drr).flatten()
    }

    /// Last blend mode programmed for pipe `inst` (TG blender or MPC).
    pub fn blend_mode(&self, inst: usize) -> Option<BlendMode> {
        self.shared.state.lock().blend.get(inst).copied().flatten()
    }

    pub fn scanout_address(&self, inst: usize) -> Option<PlaneAddress> {
        self.shared.state.lock().addresses.get(inst).copied().flatten()
    }

    pub fn watermarks(&self, inst: usize) -> Option<Watermarks> {
        self.shared.state.lock().watermarks.get(inst).copied().flatten()
    }

    pub fn dispclk_khz(&self) -> u32 {
        self.shared.state.lock().dispclk_khz
    }

    pub fn domain_powered(&self, domain: PowerDomain) -> bool {
        self.shared
            .state
            .lock()
            .powered
            .iter()
            .find(|(d, _)| *d == domain)
            .is_some_and(|(_, on)| *on)
    }

    pub fn dig_enabled(&self, link: usize) -> bool {
        self.shared
            .state
            .lock()
            .dig_enabled
            .get(link)
            .copied()
            .unwrap_or(false)
    }
}

struct MockTg {
    inst: usize,
    hw: Arc<Shared>,
}

impl TimingGenerator for MockTg {
    fn instance(&self) -> usize {
        self.inst
    }

    fn program_timing(&self, timing: &CrtcTiming) -> HwResult<()> {
        self.hw.ack("tg", self.inst, "program_timing", u64::from(timing.pix_clk_khz))?;
        self.hw.with_tg(self.inst, |s| s.timing = Some(*timing));
        Ok(())
    }

    fn enable_crtc(&self) -> HwResult<()> {
        self.hw.ack("tg", self.inst, "enable_crtc", 0)?;
        self.hw.with_tg(self.inst, |s| s.enabled = true);
        Ok(())
    }

    fn disable_crtc(&self) -> HwResult<()> {
        self.hw.ack("tg", self.inst, "disable_crtc", 0)?;
        self.hw.with_tg(self.inst, |s| s.enabled = false);
        Ok(())
    }

    fn is_crtc_enabled(&self) -> bool {
        self.hw.with_tg(self.inst, |s| s.enabled).unwrap_or(false)
    }

    fn set_blank(&self, blank: bool) -> HwResult<()> {
        self.hw.ack("tg", self.inst, "set_blank", u64::from(blank))?;
        self.hw.with_tg(self.inst, |s| {
            if !s.blank_stuck {
                s.blanked = blank;
            }
        });
        Ok(())
    }

    fn is_blanked(&self) -> bool {
        self.hw.with_tg(self.inst, |s| s.blanked).unwrap_or(false)
    }

    fn lock(&self, flags: PipeLockFlags) -> HwResult<()> {
        self.hw.ack("tg", self.inst, "lock", u64::from(flags.bits()))?;
        self.hw.with_tg(self.inst, |s| s.locked = Some(flags));
        Ok(())
    }

    fn unlock(&self, flags: PipeLockFlags) -> HwResult<()> {
        self.hw.ack("tg", self.inst, "unlock", u64::from(flags.bits()))?;
        self.hw.with_tg(self.inst, |s| s.locked = None);
        Ok(())
    }

    fn set_blender_mode(&self, mode: BlendMode) -> HwResult<()> {
        self.hw.ack("tg", self.inst, "set_blender_mode", mode as u64)?;
        if let Some(slot) = self.hw.state.lock().blend.get_mut(self.inst) {
            *slot = Some(mode);
        }
        Ok(())
    }

    fn get_frame_count(&self) -> u32 {
        let frame_us = self
            .hw
            .with_tg(self.inst, |s| s.timing.map(|t| t.frame_time_us()))
            .flatten()
            .filter(|us| *us > 0)
            .unwrap_or(16_666);
        (self.hw.clock.now_us() / u64::from(frame_us)) as u32
    }

    fn get_position(&self) -> CrtcPosition {
        let v_total = self
            .hw
            .with_tg(self.inst, |s| s.timing.map(|t| t.v_total))
            .flatten()
            .unwrap_or(1);
        CrtcPosition {
            vertical_count: (self.hw.clock.now_us() % u64::from(v_total)) as u32,
            horizontal_count: 0,
            frame_count: self.get_frame_count(),
        }
    }

    fn set_drr(&self, params: Option<&DrrParams>) -> HwResult<()> {
        let arg = params.map_or(0, |p| u64::from(p.vertical_total_max));
        self.hw.ack("tg", self.inst, "set_drr", arg)?;
        self.hw.with_tg(self.inst, |s| s.drr = params.copied());
        Ok(())
    }

    fn setup_global_swap_lock(&self, params: Option<&GslParams>) -> HwResult<()> {
        let arg = params.map_or(0, |p| u64::from(p.master));
        self.hw.ack("tg", self.inst, "setup_global_swap_lock", arg)
    }

    fn enable_reset_trigger(&self, source_tg: usize) -> HwResult<()> {
        self.hw
            .ack("tg", self.inst, "enable_reset_trigger", source_tg as u64)?;
        self.hw.with_tg(self.inst, |s| s.reset_armed = Some(source_tg));
        Ok(())
    }

    fn disable_reset_trigger(&self) -> HwResult<()> {
        self.hw.ack("tg", self.inst, "disable_reset_trigger", 0)?;
        self.hw.with_tg(self.inst, |s| s.reset_armed = None);
        Ok(())
    }

    fn did_triggered_reset_occur(&self) -> bool {
        let fires = self.hw.state.lock().reset_trigger_fires;
        fires
            && self
                .hw
                .with_tg(self.inst, |s| s.reset_armed.is_some())
                .unwrap_or(false)
    }
}

struct MockMi {
    inst: usize,
    hw: Arc<Shared>,
}

impl MemoryInput for MockMi {
    fn instance(&self) -> usize {
        self.inst
    }

    fn program_surface_config(&self, config: &SurfaceConfig) -> HwResult<()> {
        self.hw
            .ack("mi", self.inst, "program_surface_config", u64::from(config.pitch))
    }

    fn program_surface_flip_and_addr(
        &self,
        address: &PlaneAddress,
        flip_immediate: bool,
    ) -> HwResult<()> {
        let op = if flip_immediate {
            "program_surface_flip_immediate"
        } else {
            "program_surface_flip_and_addr"
        };
        self.hw.ack("mi", self.inst, op, address.primary())?;
        if let Some(slot) = self.hw.state.lock().addresses.get_mut(self.inst) {
            *slot = Some(*address);
        }
        Ok(())
    }

    fn is_flip_pending(&self) -> bool {
        false
    }

    fn program_watermarks(&self, marks: &Watermarks) -> HwResult<()> {
        self.hw.ack(
            "mi",
            self.inst,
            "program_watermarks",
            u64::from(marks.a.urgent_ns),
        )?;
        if let Some(slot) = self.hw.state.lock().watermarks.get_mut(self.inst) {
            *slot = Some(*marks);
        }
        Ok(())
    }

    fn set_blank(&self, blank: bool) -> HwResult<()> {
        self.hw.ack("mi", self.inst, "set_blank", u64::from(blank))
    }
}

struct MockXfm {
    inst: usize,
    hw: Arc<Shared>,
}

impl Transform for MockXfm {
    fn instance(&self) -> usize {
        self.inst
    }

    fn optimal_taps(&self, data: &ScalerData) -> Option<ScalingTaps> {
        let cfg = &self.hw.config;
        let max_down = dc_utils::Fixed31_32::from_int(i64::from(cfg.max_downscale));
        let min_up = dc_utils::Fixed31_32::from_fraction(1, i64::from(cfg.max_upscale.max(1)));
        let ratios = [data.ratios.horz, data.ratios.vert];
        if ratios.iter().any(|r| *r > max_down || *r < min_up) {
            return None;
        }
        if data.is_scaling() {
            Some(ScalingTaps {
                h_taps: 4,
                v_taps: 4,
                h_taps_c: 2,
                v_taps_c: 2,
            })
        } else {
            Some(ScalingTaps::uniform(1))
        }
    }

    fn set_scaler(&self, data: &ScalerData) -> HwResult<()> {
        self.hw.ack(
            "xfm",
            self.inst,
            "set_scaler",
            u64::from(data.ratios.horz.to_u3d19()),
        )
    }

    fn set_pixel_storage_depth(&self, depth: LbPixelDepth) -> HwResult<()> {
        self.hw
            .ack("xfm", self.inst, "set_pixel_storage_depth", depth as u64)
    }

    fn set_gamut_remap(&self, remap: &GamutRemap) -> HwResult<()> {
        self.hw
            .ack("xfm", self.inst, "set_gamut_remap", u64::from(remap.enabled))
    }

    fn reset(&self) -> HwResult<()> {
        self.hw.ack("xfm", self.inst, "reset", 0)
    }
}

struct MockIpp {
    inst: usize,
    hw: Arc<Shared>,
}

impl InputPixelProcessor for MockIpp {
    fn instance(&self) -> usize {
        self.inst
    }

    fn program_prescale(&self, format: SurfacePixelFormat) -> HwResult<()> {
        self.hw
            .ack("ipp", self.inst, "program_prescale", format as u64)
    }

    fn set_degamma(&self, mode: DegammaMode) -> HwResult<()> {
        self.hw.ack("ipp", self.inst, "set_degamma", mode as u64)
    }

    fn set_cursor_attributes(&self, attributes: &CursorAttributes) -> HwResult<()> {
        self.hw
            .ack("ipp", self.inst, "set_cursor_attributes", attributes.address)
    }

    fn set_cursor_position(&self, position: &CursorPosition) -> HwResult<()> {
        self.hw.ack(
            "ipp",
            self.inst,
            "set_cursor_position",
            u64::from(position.enable),
        )
    }
}

struct MockOpp {
    inst: usize,
    hw: Arc<Shared>,
}

impl OutputPixelProcessor for MockOpp {
    fn instance(&self) -> usize {
        self.inst
    }

    fn program_fmt(&self, params: &FormatterParams) -> HwResult<()> {
        self.hw.ack(
            "opp",
            self.inst,
            "program_fmt",
            u64::from(params.color_depth.bits_per_component()),
        )
    }

    fn program_csc_default(&self, color_space: ColorSpace) -> HwResult<()> {
        self.hw
            .ack("opp", self.inst, "program_csc_default", color_space as u64)
    }

    fn set_regamma(&self, mode: RegammaMode) -> HwResult<()> {
        self.hw.ack("opp", self.inst, "set_regamma", mode as u64)
    }
}

struct MockSe {
    engine: EngineId,
    hw: Arc<Shared>,
}

impl MockSe {
    fn ack(&self, op: &'static str, arg: u64) -> HwResult<()> {
        self.hw.ack("se", usize::from(self.engine.0), op, arg)
    }
}

impl StreamEncoder for MockSe {
    fn engine(&self) -> EngineId {
        self.engine
    }

    fn setup_dp(&self, timing: &CrtcTiming, _color_space: ColorSpace) -> HwResult<()> {
        self.ack("setup_dp", u64::from(timing.pix_clk_khz))
    }

    fn setup_hdmi(
        &self,
        _timing: &CrtcTiming,
        _color_space: ColorSpace,
        actual_pix_clk_khz: u32,
    ) -> HwResult<()> {
        self.ack("setup_hdmi", u64::from(actual_pix_clk_khz))
    }

    fn setup_dvi(&self, timing: &CrtcTiming, dual_link: bool) -> HwResult<()> {
        let _ = timing;
        self.ack("setup_dvi", u64::from(dual_link))
    }

    fn update_info_packets(&self, frames: &InfoFrames) -> HwResult<()> {
        self.ack("update_info_packets", u64::from(frames.avi.valid))
    }

    fn stop_info_packets(&self) -> HwResult<()> {
        self.ack("stop_info_packets", 0)
    }

    fn dp_set_mn(&self, pix_clk_khz: u32, link: &LinkSettings) -> HwResult<()> {
        let _ = link;
        self.ack("dp_set_mn", u64::from(pix_clk_khz))
    }

    fn dp_blank(&self) -> HwResult<()> {
        self.ack("dp_blank", 0)
    }

    fn dp_unblank(&self) -> HwResult<()> {
        self.ack("dp_unblank", 0)
    }

    fn set_avmute(&self, enable: bool) -> HwResult<()> {
        self.ack("set_avmute", u64::from(enable))
    }
}

struct MockLe {
    link: usize,
    hw: Arc<Shared>,
}

impl MockLe {
    fn set_dig(&self, on: bool) {
        if let Some(slot) = self.hw.state.lock().dig_enabled.get_mut(self.link) {
            *slot = on;
        }
    }
}

impl LinkEncoder for MockLe {
    fn preferred_engine(&self) -> EngineId {
        EngineId(self.link as u8)
    }

    fn validate_output_with_stream(&self, signal: SignalType, timing: &CrtcTiming) -> bool {
        let pix = timing.pix_clk_khz;
        match signal {
            SignalType::DviSingleLink => pix <= 165_000,
            SignalType::DviDualLink => pix <= 330_000,
            SignalType::Hdmi => pix <= self.hw.config.max_tmds_khz,
            SignalType::None | SignalType::Lvds => false,
            SignalType::DisplayPort
            | SignalType::DisplayPortMst
            | SignalType::Edp
            | SignalType::Virtual => true,
        }
    }

    fn enable_dp_output(&self, link: &LinkSettings, _clock_source: ClockSourceId) -> HwResult<()> {
        self.hw.ack(
            "le",
            self.link,
            "enable_dp_output",
            u64::from(link.lane_count),
        )?;
        self.set_dig(true);
        Ok(())
    }

    fn enable_tmds_output(
        &self,
        _signal: SignalType,
        _clock_source: ClockSourceId,
        pix_clk_khz: u32,
    ) -> HwResult<()> {
        self.hw
            .ack("le", self.link, "enable_tmds_output", u64::from(pix_clk_khz))?;
        self.set_dig(true);
        Ok(())
    }

    fn disable_output(&self, _signal: SignalType) -> HwResult<()> {
        self.hw.ack("le", self.link, "disable_output", 0)?;
        self.set_dig(false);
        Ok(())
    }

    fn connect_dig_be_to_fe(&self, engine: EngineId, connect: bool) -> HwResult<()> {
        let arg = (u64::from(engine.0) << 1) | u64::from(connect);
        self.hw.ack("le", self.link, "connect_dig_be_to_fe", arg)
    }

    fn perform_link_training(&self, link: &LinkSettings) -> HwResult<()> {
        if self.hw.call(
            "le",
            self.link,
            "perform_link_training",
            u64::from(link.link_rate.dpcd_code()),
        ) {
            Ok(())
        } else {
            Err(HwError::LinkTrainingFailed)
        }
    }

    fn is_dig_enabled(&self) -> bool {
        self.hw
            .state
            .lock()
            .dig_enabled
            .get(self.link)
            .copied()
            .unwrap_or(false)
    }
}

struct MockAudio {
    inst: usize,
    hw: Arc<Shared>,
}

impl AudioEndpoint for MockAudio {
    fn instance(&self) -> usize {
        self.inst
    }

    fn setup(&self, engine: EngineId, _signal: SignalType, _output: &AudioOutput) -> HwResult<()> {
        self.hw.ack("audio", self.inst, "setup", u64::from(engine.0))
    }

    fn enable_output(&self, engine: EngineId) -> HwResult<()> {
        self.hw
            .ack("audio", self.inst, "enable_output", u64::from(engine.0))
    }

    fn disable_output(&self) -> HwResult<()> {
        self.hw.ack("audio", self.inst, "disable_output", 0)
    }
}

struct MockClk {
    id: ClockSourceId,
    hw: Arc<Shared>,
}

impl MockClk {
    fn inst(&self) -> usize {
        match self.id {
            ClockSourceId::Pll(n) => usize::from(n),
            ClockSourceId::DpDto => 0xFF,
        }
    }
}

impl ClockSourceHw for MockClk {
    fn id(&self) -> ClockSourceId {
        self.id
    }

    fn compute_pll_settings(&self, params: &PixelClockParams) -> Option<PllSettings> {
        let khz = params.requested_pix_clk_khz;
        if khz == 0 {
            return None;
        }
        match self.id {
            ClockSourceId::DpDto => Some(PllSettings {
                actual_pix_clk_khz: khz,
                adjusted_pix_clk_khz: khz,
                ..PllSettings::default()
            }),
            ClockSourceId::Pll(_) if khz > self.hw.config.max_pll_khz => None,
            ClockSourceId::Pll(_) => Some(PllSettings {
                actual_pix_clk_khz: khz,
                adjusted_pix_clk_khz: khz,
                // 100 MHz reference
                reference_divider: 1,
                feedback_divider: khz / 100,
                fract_feedback_divider: khz % 100,
                pix_clk_post_divider: 10,
            }),
        }
    }

    fn program_pix_clk(&self, params: &PixelClockParams, settings: &PllSettings) -> HwResult<()> {
        let _ = params;
        if self.hw.call(
            "clk",
            self.inst(),
            "program_pix_clk",
            u64::from(settings.actual_pix_clk_khz),
        ) {
            Ok(())
        } else {
            Err(HwError::PllLockFailed)
        }
    }

    fn power_down(&self) -> HwResult<()> {
        self.hw.ack("clk", self.inst(), "power_down", 0)
    }
}

struct MockDispclk {
    hw: Arc<Shared>,
}

impl DisplayClock for MockDispclk {
    fn set_clock(&self, khz: u32) -> HwResult<u32> {
        let actual = khz.min(self.hw.config.dispclk_max_khz);
        self.hw.ack("dccg", 0, "set_clock", u64::from(actual))?;
        self.hw.state.lock().dispclk_khz = actual;
        Ok(actual)
    }

    fn current_khz(&self) -> u32 {
        self.hw.state.lock().dispclk_khz
    }

    fn max_khz(&self) -> u32 {
        self.hw.config.dispclk_max_khz
    }

    fn boot_khz(&self) -> u32 {
        self.hw.config.dispclk_boot_khz
    }
}

struct MockMpc {
    hw: Arc<Shared>,
}

impl Mpc for MockMpc {
    fn update_blending(&self, opp: usize, dpp: usize, mode: BlendMode) -> HwResult<()> {
        let _ = opp;
        self.hw.ack("mpc", dpp, "update_blending", mode as u64)?;
        if let Some(slot) = self.hw.state.lock().blend.get_mut(dpp) {
            *slot = Some(mode);
        }
        Ok(())
    }

    fn remove_mpcc(&self, opp: usize, dpp: usize) -> HwResult<()> {
        self.hw.ack("mpc", dpp, "remove_mpcc", opp as u64)?;
        if let Some(slot) = self.hw.state.lock().blend.get_mut(dpp) {
            *slot = None;
        }
        Ok(())
    }
}

struct MockPg {
    hw: Arc<Shared>,
}

impl PowerGateController for MockPg {
    fn set_domain_power(&self, domain: PowerDomain, on: bool) -> HwResult<()> {
        let op = if on { "power_on" } else { "power_off" };
        self.hw.ack("pg", 0, op, domain_code(domain))?;
        let mut state = self.hw.state.lock();
        if state.power_gate_stuck {
            return Ok(());
        }
        match state.powered.iter_mut().find(|(d, _)| *d == domain) {
            Some(entry) => entry.1 = on,
            None => state.powered.push((domain, on)),
        }
        Ok(())
    }

    fn domain_powered(&self, domain: PowerDomain) -> bool {
        self.hw
            .state
            .lock()
            .powered
            .iter()
            .find(|(d, _)| *d == domain)
            .is_some_and(|(_, on)| *on)
    }
}

impl Firmware for MockHw {
    fn enable_disp_power_gating(&self, controller: usize, action: PowerGatingAction) -> BpResult {
        let op = match action {
            PowerGatingAction::Enable => "power_gate",
            PowerGatingAction::Disable => "power_ungate",
            PowerGatingAction::Init => "power_gate_init",
        };
        if !self.shared.call("fw", controller, op, 0) {
            return BpResult::Failure;
        }
        let on = action != PowerGatingAction::Enable;
        let domain = PowerDomain::Controller(controller);
        let mut state = self.shared.state.lock();
        match state.powered.iter_mut().find(|(d, _)| *d == domain) {
            Some(entry) => entry.1 = on,
            None => state.powered.push((domain, on)),
        }
        BpResult::Ok
    }

    fn enable_crtc(&self, controller: usize, enable: bool) -> BpResult {
        if !self
            .shared
            .call("fw", controller, "enable_crtc", u64::from(enable))
        {
            return BpResult::Failure;
        }
        self.shared.with_tg(controller, |s| s.enabled = enable);
        BpResult::Ok
    }

    fn init_display_engine(&self) -> BpResult {
        if self.shared.call("fw", 0, "init_display_engine", 0) {
            BpResult::Ok
        } else {
            BpResult::Failure
        }
    }
}

impl BlockFactory for MockHw {
    fn timing_generator(&self, inst: usize) -> Option<Arc<dyn TimingGenerator>> {
        (inst < self.shared.config.tg_count).then(|| {
            Arc::new(MockTg {
                inst,
                hw: self.shared.clone(),
            }) as Arc<dyn TimingGenerator>
        })
    }

    fn memory_input(&self, inst: usize) -> Option<Arc<dyn MemoryInput>> {
        (inst < self.shared.config.pipe_count).then(|| {
            Arc::new(MockMi {
                inst,
                hw: self.shared.clone(),
            }) as Arc<dyn MemoryInput>
        })
    }

    fn transform(&self, inst: usize) -> Option<Arc<dyn Transform>> {
        (inst < self.shared.config.pipe_count).then(|| {
            Arc::new(MockXfm {
                inst,
                hw: self.shared.clone(),
            }) as Arc<dyn Transform>
        })
    }

    fn input_pixel_processor(&self, inst: usize) -> Option<Arc<dyn InputPixelProcessor>> {
        (inst < self.shared.config.pipe_count).then(|| {
            Arc::new(MockIpp {
                inst,
                hw: self.shared.clone(),
            }) as Arc<dyn InputPixelProcessor>
        })
    }

    fn output_pixel_processor(&self, inst: usize) -> Option<Arc<dyn OutputPixelProcessor>> {
        (inst < self.shared.config.pipe_count).then(|| {
            Arc::new(MockOpp {
                inst,
                hw: self.shared.clone(),
            }) as Arc<dyn OutputPixelProcessor>
        })
    }

    fn stream_encoder(&self, engine: EngineId) -> Option<Arc<dyn StreamEncoder>> {
        (engine.0 < self.shared.config.stream_encoders).then(|| {
            Arc::new(MockSe {
                engine,
                hw: self.shared.clone(),
            }) as Arc<dyn StreamEncoder>
        })
    }

    fn link_encoder(&self, link: usize) -> Option<Arc<dyn LinkEncoder>> {
        (link < self.shared.config.links).then(|| {
            Arc::new(MockLe {
                link,
                hw: self.shared.clone(),
            }) as Arc<dyn LinkEncoder>
        })
    }

    fn audio_endpoint(&self, inst: usize) -> Option<Arc<dyn AudioEndpoint>> {
        (inst < self.shared.config.audio_endpoints).then(|| {
            Arc::new(MockAudio {
                inst,
                hw: self.shared.clone(),
            }) as Arc<dyn AudioEndpoint>
        })
    }

    fn clock_source(&self, id: ClockSourceId) -> Option<Arc<dyn ClockSourceHw>> {
        let present = match id {
            ClockSourceId::Pll(n) => n < self.shared.config.plls,
            ClockSourceId::DpDto => true,
        };
        present.then(|| {
            Arc::new(MockClk {
                id,
                hw: self.shared.clone(),
            }) as Arc<dyn ClockSourceHw>
        })
    }

    fn display_clock(&self) -> Option<Arc<dyn DisplayClock>> {
        Some(Arc::new(MockDispclk {
            hw: self.shared.clone(),
        }))
    }

    fn mpc(&self) -> Option<Arc<dyn Mpc>> {
        Some(Arc::new(MockMpc {
            hw: self.shared.clone(),
        }))
    }

    fn power_gate_controller(&self) -> Option<Arc<dyn PowerGateController>> {
        Some(Arc::new(MockPg {
            hw: self.shared.clone(),
        }))
    }

    fn firmware(&self) -> Arc<dyn Firmware> {
        Arc::new(self.clone())
    }

    fn delay(&self) -> Arc<dyn Delay> {
        self.shared.clock.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TIMING_1920X1080_60;

    #[test]
    fn test_log_records_mutations_only() {
        let hw = MockHw::default();
        let tg = hw.timing_generator(0).unwrap();
        tg.program_timing(&TIMING_1920X1080_60).unwrap();
        let _ = tg.is_blanked();
        let _ = tg.get_frame_count();
        tg.set_blank(true).unwrap();

        assert_eq!(hw.log().len(), 2);
        assert_eq!(hw.log().count("program_timing"), 1);
        assert!(hw.tg_blanked(0));
        assert_eq!(hw.tg_timing(0), Some(TIMING_1920X1080_60));
    }

    #[test]
    fn test_fault_injection_is_consumed() {
        let hw = MockHw::default();
        let clk = hw.clock_source(ClockSourceId::Pll(0)).unwrap();
        let params = PixelClockParams {
            requested_pix_clk_khz: 148_500,
            ..PixelClockParams::default()
        };
        let settings = clk.compute_pll_settings(&params).unwrap();

        hw.fail_once("program_pix_clk");
        assert_eq!(
            clk.program_pix_clk(&params, &settings),
            Err(HwError::PllLockFailed)
        );
        assert_eq!(clk.program_pix_clk(&params, &settings), Ok(()));
        // The failed attempt is still logged
        assert_eq!(hw.log().count("program_pix_clk"), 2);
    }

    #[test]
    fn test_blank_stuck() {
        let hw = MockHw::default();
        hw.set_blank_stuck(1, true);
        let tg = hw.timing_generator(1).unwrap();
        tg.set_blank(true).unwrap();
        assert!(!tg.is_blanked());
    }

    #[test]
    fn test_frame_count_follows_fake_clock() {
        let hw = MockHw::default();
        let tg = hw.timing_generator(0).unwrap();
        tg.program_timing(&TIMING_1920X1080_60).unwrap();
        assert_eq!(tg.get_frame_count(), 0);
        hw.delay().delay_us(16_666 * 3);
        assert_eq!(tg.get_frame_count(), 3);
    }

    #[test]
    fn test_firmware_power_gating_tracks_domains() {
        let hw = MockHw::default();
        assert_eq!(
            hw.enable_disp_power_gating(2, PowerGatingAction::Disable),
            BpResult::Ok
        );
        assert!(hw.domain_powered(PowerDomain::Controller(2)));
        hw.fail_once("power_gate");
        assert_eq!(
            hw.enable_disp_power_gating(2, PowerGatingAction::Enable),
            BpResult::Failure
        );
        assert!(hw.domain_powered(PowerDomain::Controller(2)));
    }

    #[test]
    fn test_histogram_groups_calls() {
        let hw = MockHw::default();
        let dccg = hw.display_clock().unwrap();
        dccg.set_clock(400_000).unwrap();
        dccg.set_clock(2_000_000).unwrap();
        assert_eq!(hw.dispclk_khz(), 1_200_000);
        assert_eq!(hw.log().histogram(), vec![("dccg", "set_clock", 2)]);
    }
}
