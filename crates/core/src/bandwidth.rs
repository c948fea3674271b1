//! Bandwidth and watermark admission control.
//!
//! The numeric model is pluggable. [`validate_bandwidth`] gathers per-pipe
//! inputs from a candidate snapshot, asks the model, and caches the answer on
//! the snapshot for the sequencer. Nothing here touches hardware.

use alloc::vec::Vec;

use dc_hal::{ScalingTaps, TilingMode, WatermarkSet, Watermarks};
use dc_utils::Fixed31_32;

use crate::context::ValidationContext;
use crate::error::DcError;
use crate::pool::ResourcePool;

/// What the model needs to know about one active pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeBandwidthInput {
    pub pipe: usize,
    pub pix_clk_khz: u32,
    pub h_total: u32,
    pub v_total: u32,
    pub refresh_mhz: u32,
    pub line_time_ns: u32,
    /// Fetched region; zero when the pipe shows nothing.
    pub src_width: u32,
    pub src_height: u32,
    pub dst_width: u32,
    pub dst_height: u32,
    pub horz_ratio: Fixed31_32,
    pub vert_ratio: Fixed31_32,
    pub taps: ScalingTaps,
    /// Fetch cost in half bytes per pixel.
    pub half_bytes_per_pixel: u32,
    pub tiling: TilingMode,
}

impl PipeBandwidthInput {
    pub fn fetches(&self) -> bool {
        self.half_bytes_per_pixel != 0 && self.src_width != 0 && self.src_height != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandwidthInput {
    pub pipes: Vec<PipeBandwidthInput>,
    pub max_dispclk_khz: u32,
}

/// Cached result of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandwidthResult {
    pub required_dispclk_khz: u32,
    /// DRAM fetch rate in KB/s.
    pub dram_bw_used: u64,
    pub stutter_allowed: bool,
    /// Exact watermarks by pipe index.
    pub watermarks: Vec<(usize, Watermarks)>,
}

impl BandwidthResult {
    pub fn watermarks_for(&self, pipe: usize) -> Option<&Watermarks> {
        self.watermarks
            .iter()
            .find(|(p, _)| *p == pipe)
            .map(|(_, w)| w)
    }
}

/// A generation's bandwidth oracle.
pub trait BandwidthModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Accept with results, or reject with `BandwidthExceeded` /
    /// `DisplayClockExceeded`.
    fn evaluate(&self, input: &BandwidthInput) -> Result<BandwidthResult, DcError>;
}

/// Simple model shipped for hosts and tests.
///
/// Fetch rate is viewport area times bytes per pixel times refresh. The
/// default budget admits three 4K60 ARGB8888 planes but not four.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceBandwidthModel {
    /// DRAM budget in KB/s.
    pub dram_budget: u64,
    pub urgent_latency_ns: u32,
    pub stutter_exit_latency_ns: u32,
    pub pstate_latency_ns: u32,
    /// Extra latency added per lower clock state (B, C, D).
    pub state_step_ns: u32,
}

impl Default for ReferenceBandwidthModel {
    fn default() -> Self {
        Self {
            dram_budget: 7_000_000,
            urgent_latency_ns: 4_000,
            stutter_exit_latency_ns: 8_000,
            pstate_latency_ns: 12_000,
            state_step_ns: 2_000,
        }
    }
}

impl ReferenceBandwidthModel {
    /// Fetch rate of one pipe in KB/s.
    fn fetch_rate(pipe: &PipeBandwidthInput) -> u64 {
        if !pipe.fetches() {
            return 0;
        }
        let bytes_per_frame = u64::from(pipe.src_width)
            * u64::from(pipe.src_height)
            * u64::from(pipe.half_bytes_per_pixel)
            / 2;
        bytes_per_frame * u64::from(pipe.refresh_mhz) / 1_000_000
    }

    /// Display clock one pipe needs. Downscaling fetches more pixels per
    /// output pixel; upscaling needs nothing extra.
    fn dispclk_for(pipe: &PipeBandwidthInput) -> u32 {
        let pix = Fixed31_32::from_int(i64::from(pipe.pix_clk_khz));
        let h = pipe.horz_ratio.max(Fixed31_32::ONE);
        let v = pipe.vert_ratio.max(Fixed31_32::ONE);
        let mut khz = (pix * h * v).ceil();
        // Wide vertical filters cost a second pass per line
        if pipe.taps.v_taps > 2 && pipe.vert_ratio > Fixed31_32::ONE {
            khz = khz * 5 / 4;
        }
        u32::try_from(khz).unwrap_or(u32::MAX)
    }

    fn watermarks_for(&self, pipe: &PipeBandwidthInput) -> Watermarks {
        // Lines fetched per output line under vertical downscale
        let lines = pipe.vert_ratio.ceil().max(1) as u32;
        let urgent_base = self.urgent_latency_ns + pipe.line_time_ns.saturating_mul(lines) / 2;
        let set = |step: u32| {
            let extra = self.state_step_ns * step;
            WatermarkSet {
                urgent_ns: urgent_base + extra,
                stutter_exit_ns: urgent_base + self.stutter_exit_latency_ns + extra,
                pstate_change_ns: urgent_base + self.pstate_latency_ns + extra,
            }
        };
        Watermarks {
            a: set(0),
            b: set(1),
            c: set(2),
            d: set(3),
        }
    }
}

impl BandwidthModel for ReferenceBandwidthModel {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn evaluate(&self, input: &BandwidthInput) -> Result<BandwidthResult, DcError> {
        let dram_bw_used: u64 = input.pipes.iter().map(Self::fetch_rate).sum();
        if dram_bw_used > self.dram_budget {
            log::debug!(
                "[BW] rejected: {} KB/s over budget {} KB/s",
                dram_bw_used,
                self.dram_budget
            );
            return Err(DcError::BandwidthExceeded);
        }

        let required_dispclk_khz = input.pipes.iter().map(Self::dispclk_for).max().unwrap_or(0);
        if required_dispclk_khz > input.max_dispclk_khz {
            log::debug!(
                "[BW] rejected: dispclk {} kHz over max {} kHz",
                required_dispclk_khz,
                input.max_dispclk_khz
            );
            return Err(DcError::DisplayClockExceeded);
        }

        // Self refresh needs headroom and tiled fetches
        let stutter_allowed = dram_bw_used <= self.dram_budget / 2
            && input
                .pipes
                .iter()
                .filter(|p| p.fetches())
                .all(|p| !p.tiling.is_linear());

        Ok(BandwidthResult {
            required_dispclk_khz,
            dram_bw_used,
            stutter_allowed,
            watermarks: input
                .pipes
                .iter()
                .map(|p| (p.pipe, self.watermarks_for(p)))
                .collect(),
        })
    }
}

/// Collect the model inputs for every active pipe of `ctx`.
pub fn bandwidth_input(pool: &ResourcePool, ctx: &ValidationContext) -> BandwidthInput {
    let pipes = ctx
        .res
        .active()
        .filter_map(|pipe| {
            let stream = pipe.stream.as_ref()?;
            let timing = stream.timing();
            let visible = pipe.surface.as_ref().filter(|s| s.is_visible());
            let (src_width, src_height, half_bytes_per_pixel, tiling) = match visible {
                Some(surface) => (
                    pipe.scaler.viewport.width,
                    pipe.scaler.viewport.height,
                    surface.format().fetch_half_bytes_per_pixel(),
                    surface.desc().tiling,
                ),
                None => (0, 0, 0, TilingMode::Linear),
            };
            Some(PipeBandwidthInput {
                pipe: pipe.index,
                pix_clk_khz: stream.requested_pix_clk_khz(),
                h_total: timing.h_total,
                v_total: timing.v_total,
                refresh_mhz: timing.refresh_mhz(),
                line_time_ns: timing.line_time_ns(),
                src_width,
                src_height,
                dst_width: pipe.scaler.recout.width,
                dst_height: pipe.scaler.recout.height,
                horz_ratio: pipe.scaler.ratios.horz,
                vert_ratio: pipe.scaler.ratios.vert,
                taps: pipe.scaler.taps,
                half_bytes_per_pixel,
                tiling,
            })
        })
        .collect();
    BandwidthInput {
        pipes,
        max_dispclk_khz: pool.display_clock.max_khz(),
    }
}

/// Evaluate `ctx` against `model` and cache the result on it.
pub fn validate_bandwidth(
    model: &dyn BandwidthModel,
    pool: &ResourcePool,
    ctx: &mut ValidationContext,
) -> Result<(), DcError> {
    let input = bandwidth_input(pool, ctx);
    let result = model.evaluate(&input)?;
    log::debug!(
        "[BW] {}: {} pipes, {} KB/s, dispclk {} kHz, stutter {}",
        model.name(),
        input.pipes.len(),
        result.dram_bw_used,
        result.required_dispclk_khz,
        result.stutter_allowed
    );
    ctx.res.bandwidth = Some(result);
    Ok(())
}
