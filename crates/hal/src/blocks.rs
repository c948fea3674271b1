//! Per-block hardware interfaces.
//!
//! One trait per block type. Implementations wrap a register bank (or, for
//! tests, the [`crate::mock`] register log) for a single block instance.
//! All methods take `&self`: blocks are shared between the resource pool and
//! the pipe contexts that reference them, and interior state lives in the
//! hardware itself.

use alloc::sync::Arc;

use dc_utils::Delay;

use crate::firmware::Firmware;
use crate::types::{
    AudioOutput, BlendMode, ClockSourceId, ColorSpace, CrtcPosition, CrtcTiming, CursorAttributes,
    CursorPosition, DegammaMode, DrrParams, EngineId, FormatterParams, GamutRemap, GslParams,
    InfoFrames, LbPixelDepth, LinkSettings, PixelClockParams, PlaneAddress, PipeLockFlags,
    PllSettings, PowerDomain, RegammaMode, ScalerData, ScalingTaps, SignalType, SurfaceConfig,
    SurfacePixelFormat, Watermarks,
};
use crate::HwResult;

/// CRTC / OTG: generates the scan timing for one head pipe.
pub trait TimingGenerator: Send + Sync {
    fn instance(&self) -> usize;

    /// Program h/v totals, porches and sync widths. CRTC must be disabled.
    fn program_timing(&self, timing: &CrtcTiming) -> HwResult<()>;

    /// Start scanning via registers (DCN). DCE goes through firmware instead.
    fn enable_crtc(&self) -> HwResult<()>;

    fn disable_crtc(&self) -> HwResult<()>;

    fn is_crtc_enabled(&self) -> bool;

    /// Request blank or unblank. Blank completes at the next vblank.
    fn set_blank(&self, blank: bool) -> HwResult<()>;

    fn is_blanked(&self) -> bool;

    /// Hold double-buffered registers until [`Self::unlock`].
    fn lock(&self, flags: PipeLockFlags) -> HwResult<()>;

    fn unlock(&self, flags: PipeLockFlags) -> HwResult<()>;

    /// Per-controller blender (DCE). DCN blends in the MPC.
    fn set_blender_mode(&self, mode: BlendMode) -> HwResult<()>;

    fn get_frame_count(&self) -> u32;

    fn get_position(&self) -> CrtcPosition;

    /// `None` disables variable refresh.
    fn set_drr(&self, params: Option<&DrrParams>) -> HwResult<()>;

    /// `None` releases the swap-lock group.
    fn setup_global_swap_lock(&self, params: Option<&GslParams>) -> HwResult<()>;

    /// Reset this CRTC when `source_tg` signals its next frame.
    fn enable_reset_trigger(&self, source_tg: usize) -> HwResult<()>;

    fn disable_reset_trigger(&self) -> HwResult<()>;

    fn did_triggered_reset_occur(&self) -> bool;
}

/// Memory fetch unit (DCE MI / DCN HUBP).
pub trait MemoryInput: Send + Sync {
    fn instance(&self) -> usize;

    fn program_surface_config(&self, config: &SurfaceConfig) -> HwResult<()>;

    /// Latch a new scan-out address. `flip_immediate` skips the vsync wait.
    fn program_surface_flip_and_addr(&self, address: &PlaneAddress, flip_immediate: bool)
    -> HwResult<()>;

    fn is_flip_pending(&self) -> bool;

    fn program_watermarks(&self, marks: &Watermarks) -> HwResult<()>;

    /// Stop or resume fetching.
    fn set_blank(&self, blank: bool) -> HwResult<()>;
}

/// Scaler and line buffer.
pub trait Transform: Send + Sync {
    fn instance(&self) -> usize;

    /// Filter taps able to realise `data`'s ratios, or `None` when the
    /// scaler cannot.
    fn optimal_taps(&self, data: &ScalerData) -> Option<ScalingTaps>;

    fn set_scaler(&self, data: &ScalerData) -> HwResult<()>;

    fn set_pixel_storage_depth(&self, depth: LbPixelDepth) -> HwResult<()>;

    fn set_gamut_remap(&self, remap: &GamutRemap) -> HwResult<()>;

    fn reset(&self) -> HwResult<()>;
}

/// Input pixel processing: prescale, degamma, cursor.
pub trait InputPixelProcessor: Send + Sync {
    fn instance(&self) -> usize;

    fn program_prescale(&self, format: SurfacePixelFormat) -> HwResult<()>;

    fn set_degamma(&self, mode: DegammaMode) -> HwResult<()>;

    fn set_cursor_attributes(&self, attributes: &CursorAttributes) -> HwResult<()>;

    fn set_cursor_position(&self, position: &CursorPosition) -> HwResult<()>;
}

/// Output pixel processing: formatter, output CSC, regamma.
pub trait OutputPixelProcessor: Send + Sync {
    fn instance(&self) -> usize;

    fn program_fmt(&self, params: &FormatterParams) -> HwResult<()>;

    fn program_csc_default(&self, color_space: ColorSpace) -> HwResult<()>;

    fn set_regamma(&self, mode: RegammaMode) -> HwResult<()>;
}

/// DIG front end: packs pixels into the stream protocol.
pub trait StreamEncoder: Send + Sync {
    fn engine(&self) -> EngineId;

    fn setup_dp(&self, timing: &CrtcTiming, color_space: ColorSpace) -> HwResult<()>;

    fn setup_hdmi(
        &self,
        timing: &CrtcTiming,
        color_space: ColorSpace,
        actual_pix_clk_khz: u32,
    ) -> HwResult<()>;

    fn setup_dvi(&self, timing: &CrtcTiming, dual_link: bool) -> HwResult<()>;

    fn update_info_packets(&self, frames: &InfoFrames) -> HwResult<()>;

    fn stop_info_packets(&self) -> HwResult<()>;

    /// Program the DP pixel-to-link-rate ratio.
    fn dp_set_mn(&self, pix_clk_khz: u32, link: &LinkSettings) -> HwResult<()>;

    fn dp_blank(&self) -> HwResult<()>;

    fn dp_unblank(&self) -> HwResult<()>;

    fn set_avmute(&self, enable: bool) -> HwResult<()>;
}

/// DIG back end / PHY owned by one connector.
pub trait LinkEncoder: Send + Sync {
    /// Engine this encoder is hard-wired to when free.
    fn preferred_engine(&self) -> EngineId;

    /// Capability check: can this encoder carry `signal` at `timing`?
    fn validate_output_with_stream(&self, signal: SignalType, timing: &CrtcTiming) -> bool;

    fn enable_dp_output(&self, link: &LinkSettings, clock_source: ClockSourceId) -> HwResult<()>;

    fn enable_tmds_output(
        &self,
        signal: SignalType,
        clock_source: ClockSourceId,
        pix_clk_khz: u32,
    ) -> HwResult<()>;

    fn disable_output(&self, signal: SignalType) -> HwResult<()>;

    fn connect_dig_be_to_fe(&self, engine: EngineId, connect: bool) -> HwResult<()>;

    /// External DP link training.
    fn perform_link_training(&self, link: &LinkSettings) -> HwResult<()>;

    fn is_dig_enabled(&self) -> bool;
}

/// Azalia audio endpoint.
pub trait AudioEndpoint: Send + Sync {
    fn instance(&self) -> usize;

    fn setup(&self, engine: EngineId, signal: SignalType, output: &AudioOutput) -> HwResult<()>;

    fn enable_output(&self, engine: EngineId) -> HwResult<()>;

    fn disable_output(&self) -> HwResult<()>;
}

/// PLL or DP DTO.
pub trait ClockSourceHw: Send + Sync {
    fn id(&self) -> ClockSourceId;

    /// Divider settings for `params`, or `None` when the rate is out of range.
    fn compute_pll_settings(&self, params: &PixelClockParams) -> Option<PllSettings>;

    fn program_pix_clk(&self, params: &PixelClockParams, settings: &PllSettings) -> HwResult<()>;

    fn power_down(&self) -> HwResult<()>;
}

/// Display engine clock (DISPCLK).
pub trait DisplayClock: Send + Sync {
    /// Program `khz` and return the clock actually achieved.
    fn set_clock(&self, khz: u32) -> HwResult<u32>;

    fn current_khz(&self) -> u32;

    fn max_khz(&self) -> u32;

    /// Clock left running after boot and after power down.
    fn boot_khz(&self) -> u32;
}

/// Multi-pipe combiner (DCN). Blends DPP outputs into one OPP.
pub trait Mpc: Send + Sync {
    /// Insert or update `dpp` in `opp`'s tree with `mode` against the layer below.
    fn update_blending(&self, opp: usize, dpp: usize, mode: BlendMode) -> HwResult<()>;

    fn remove_mpcc(&self, opp: usize, dpp: usize) -> HwResult<()>;
}

/// Register-driven power gating (DCN).
pub trait PowerGateController: Send + Sync {
    /// Request a power state. Completion is observed via [`Self::domain_powered`].
    fn set_domain_power(&self, domain: PowerDomain, on: bool) -> HwResult<()>;

    fn domain_powered(&self, domain: PowerDomain) -> bool;
}

/// Hands out block instances while a resource pool is constructed.
///
/// `None` means the ASIC has no such instance; the pool treats that as a
/// construction failure for instances it requires.
pub trait BlockFactory: Send + Sync {
    fn timing_generator(&self, inst: usize) -> Option<Arc<dyn TimingGenerator>>;

    fn memory_input(&self, inst: usize) -> Option<Arc<dyn MemoryInput>>;

    fn transform(&self, inst: usize) -> Option<Arc<dyn Transform>>;

    fn input_pixel_processor(&self, inst: usize) -> Option<Arc<dyn InputPixelProcessor>>;

    fn output_pixel_processor(&self, inst: usize) -> Option<Arc<dyn OutputPixelProcessor>>;

    fn stream_encoder(&self, engine: EngineId) -> Option<Arc<dyn StreamEncoder>>;

    /// Link encoder behind connector `link`.
    fn link_encoder(&self, link: usize) -> Option<Arc<dyn LinkEncoder>>;

    fn audio_endpoint(&self, inst: usize) -> Option<Arc<dyn AudioEndpoint>>;

    fn clock_source(&self, id: ClockSourceId) -> Option<Arc<dyn ClockSourceHw>>;

    fn display_clock(&self) -> Option<Arc<dyn DisplayClock>>;

    fn mpc(&self) -> Option<Arc<dyn Mpc>>;

    fn power_gate_controller(&self) -> Option<Arc<dyn PowerGateController>>;

    fn firmware(&self) -> Arc<dyn Firmware>;

    fn delay(&self) -> Arc<dyn Delay>;
}
