//! The commit protocol shared by every generation.
//!
//! Order of a commit:
//! 1. reset heads that go away or must be reprogrammed, and power down
//!    front ends that lose their surface
//! 2. stop here if nothing remains
//! 3. raise the display clock if the new configuration needs more
//! 4. program back ends of new heads
//! 5. program front ends, locking live pipes for Medium/Full writes
//! 6. enable outputs of new heads, then unblank
//! 7. frame-lock heads with matching timings
//! 8. exact watermarks, lower the display clock, power down idle PLLs
//!
//! Any hardware error aborts the sequence where it stands. Nothing is rolled
//! back; the caller decides how to recover.

use alloc::vec;
use alloc::vec::Vec;

use dc_hal::{
    BlendMode, ClockSourceId, DegammaMode, FormatterParams, RegammaMode, SignalType,
    SurfaceConfig, Watermarks,
};
use dc_utils::poll_until;

use super::{sync, CommitStats, HwContext, HwSequencer, HwState};
use crate::clock_source::{ClockSourceError, ClockSourceRegistry};
use crate::context::{needs_reprogram, PipeCtx, ResourceContext, ValidationContext};
use crate::error::DcError;
use crate::surface::{Surface, SurfaceUpdateFlags, UpdateType};

/// Boot-time bring-up to an idle, known state.
pub fn init_hw<S: HwSequencer + ?Sized>(seq: &S, hw: &mut HwContext<'_>) -> Result<(), DcError> {
    log::info!("[HWSEQ] {} init", seq.name());
    let pool = hw.pool;

    for slot in &pool.pipes {
        let Some(tg) = slot.tg.as_ref() else {
            continue;
        };
        if tg.is_crtc_enabled() {
            tg.set_blank(true)?;
            seq.disable_crtc(hw, slot.index)?;
        }
    }
    if pool.limits.skip_power_down_inactive_encoder {
        log::debug!("[HWSEQ] leaving inactive encoders powered");
    } else {
        for link in hw.links {
            if let Some(enc) = link.encoder.as_ref() {
                enc.disable_output(link.connector.native_signal())?;
            }
        }
    }
    for cs in pool.clock_sources.iter().filter(|c| c.id() != ClockSourceId::DpDto) {
        cs.power_down()?;
    }

    seq.init_power(hw)?;
    hw.state.reset_tracking();

    hw.state.dispclk_khz = pool.display_clock.set_clock(pool.display_clock.boot_khz())?;
    log::debug!("[HWSEQ] dispclk at boot level {} kHz", hw.state.dispclk_khz);
    Ok(())
}

/// Move hardware from `current` to `new`.
///
/// Under `force_full`, heads left behind by failed commits (`HwState::stale`)
/// are torn down too. They stay queued if this commit fails as well.
pub fn apply<S: HwSequencer + ?Sized>(
    seq: &S,
    hw: &mut HwContext<'_>,
    current: &ValidationContext,
    new: &ValidationContext,
    force_full: bool,
) -> Result<CommitStats, DcError> {
    let stale = if force_full {
        core::mem::take(&mut hw.state.stale)
    } else {
        Vec::new()
    };
    let result = apply_with_stale(seq, hw, current, new, &stale, force_full);
    if result.is_err() {
        hw.state.stale.extend(stale);
    }
    result
}

fn apply_with_stale<S: HwSequencer + ?Sized>(
    seq: &S,
    hw: &mut HwContext<'_>,
    current: &ValidationContext,
    new: &ValidationContext,
    stale: &[ValidationContext],
    force_full: bool,
) -> Result<CommitStats, DcError> {
    let mut stats = CommitStats::default();
    // Current references minus the heads torn down below
    let mut retired = current.res.clocks.clone();

    let reset = reset_pass(seq, hw, current, new, force_full, &mut retired, &mut stats)?;
    reset_stale(seq, hw, current, stale, &mut stats)?;

    if new.streams.is_empty() {
        finalize(hw, current, new, &retired, stale, &mut stats)?;
        return Ok(stats);
    }

    raise_dispclk(hw, new, &mut stats)?;

    // Heads whose back end is (re)programmed in this commit, by pipe index
    let mut programmed = vec![false; new.res.pipes.len()];
    for head in new.res.heads() {
        let was_head = current
            .res
            .pipes
            .get(head.index)
            .is_some_and(PipeCtx::is_head);
        if force_full || !was_head || reset.get(head.index).copied().unwrap_or(true) {
            program_back_end(seq, hw, head)?;
            programmed[head.index] = true;
            stats.back_ends_programmed += 1;
        }
    }

    let updates = classify(&*hw.state, current, new, &programmed, force_full);
    program_front_ends(seq, hw, new, &updates, &programmed, &mut stats)?;

    for head in new.res.heads() {
        if programmed[head.index] {
            enable_stream(hw, head)?;
        }
        if programmed[head.index] || !head.unchanged {
            update_blank(hw, &new.res, head)?;
        }
    }

    if hw.config.enable_timing_sync && hw.pool.limits.timing_sync_supported {
        stats.sync_timeouts = sync::synchronize_timings(hw, new, &programmed)?;
    }

    finalize(hw, current, new, &retired, stale, &mut stats)?;

    log::debug!(
        "[HWSEQ] commit: {} reset, {} back ends, {}/{}/{} full/medium/fast",
        stats.pipes_reset,
        stats.back_ends_programmed,
        stats.full_updates,
        stats.medium_updates,
        stats.fast_updates
    );
    Ok(stats)
}

/// Whether pipe `old`'s front end keeps scanning into the new context.
fn front_end_kept(old: &PipeCtx, new: &ResourceContext, reset: &[bool]) -> bool {
    !reset.get(old.tg).copied().unwrap_or(true)
        && new
            .pipes
            .get(old.index)
            .is_some_and(|p| p.is_active() && p.tg == old.tg && p.surface.is_some())
}

fn reset_pass<S: HwSequencer + ?Sized>(
    seq: &S,
    hw: &mut HwContext<'_>,
    current: &ValidationContext,
    new: &ValidationContext,
    force_full: bool,
    retired: &mut ClockSourceRegistry,
    stats: &mut CommitStats,
) -> Result<Vec<bool>, DcError> {
    let mut reset = vec![false; current.res.pipes.len()];
    for old in current.res.heads() {
        reset[old.index] = match new.res.pipes.get(old.index) {
            Some(n) if n.is_head() => force_full || needs_reprogram(old, n),
            _ => true,
        };
    }

    for old in current.res.heads().collect::<Vec<_>>().into_iter().rev() {
        if reset[old.index] {
            reset_head(seq, hw, &current.res, old)?;
            if let Some(cs) = old.clock_source {
                let remaining = retired.release(cs)?;
                log::trace!("[CLK] {:?} released, {} users left", cs, remaining);
            }
            stats.pipes_reset += 1;
        }
    }

    // Sub-pipes and surfaces dropped from heads that stay up
    for old in current.res.pipes.iter().rev() {
        if old.is_active() && !front_end_kept(old, &new.res, &reset) {
            seq.power_down_front_end(hw, old)?;
        }
    }
    Ok(reset)
}

/// Tear down what failed commits left programmed. Heads sharing a pipe with
/// a current head were already reset with it.
fn reset_stale<S: HwSequencer + ?Sized>(
    seq: &S,
    hw: &mut HwContext<'_>,
    current: &ValidationContext,
    stale: &[ValidationContext],
    stats: &mut CommitStats,
) -> Result<(), DcError> {
    for ctx in stale {
        for old in ctx.res.heads().collect::<Vec<_>>().into_iter().rev() {
            if current.res.pipes.get(old.index).is_some_and(PipeCtx::is_head) {
                continue;
            }
            log::warn!("[HWSEQ] pipe {} left by a failed commit, resetting", old.index);
            reset_head(seq, hw, &ctx.res, old)?;
            stats.pipes_reset += 1;
        }
        for old in ctx.res.pipes.iter().rev().filter(|p| p.is_active()) {
            seq.power_down_front_end(hw, old)?;
        }
    }
    Ok(())
}

fn reset_head<S: HwSequencer + ?Sized>(
    seq: &S,
    hw: &mut HwContext<'_>,
    res: &ResourceContext,
    old: &PipeCtx,
) -> Result<(), DcError> {
    let pool = hw.pool;
    let stream = old.stream.as_ref().ok_or(DcError::InvalidPipeChain)?;
    let signal = stream.signal();
    log::debug!(
        "[HWSEQ] reset pipe {} (stream {}, {})",
        old.index,
        stream.id().0,
        signal.name()
    );

    if let Some(audio) = old.audio {
        pool.audio(audio)?.disable_output()?;
    }
    if let Some(engine) = old.stream_enc {
        let se = pool.stream_encoder(engine)?;
        if signal.is_dp() {
            se.dp_blank()?;
        }
        se.stop_info_packets()?;
    }
    if let Some(enc) = hw.links.get(stream.link()).and_then(|l| l.encoder.as_ref()) {
        enc.disable_output(signal)?;
        if let Some(engine) = old.stream_enc {
            enc.connect_dig_be_to_fe(engine, false)?;
        }
    }

    let tg = pool.tg(old.tg)?;
    if tg.is_crtc_enabled() {
        tg.set_blank(true)?;
        poll_until(pool.delay.as_ref(), hw.config.blank_poll, || tg.is_blanked()).map_err(
            |t| {
                log::error!("[HWSEQ] tg {} did not blank: {}", old.tg, t);
                DcError::BlankTimeout
            },
        )?;
        seq.disable_crtc(hw, old.tg)?;
    }

    for index in res.chain(old.index).into_iter().rev() {
        if let Some(pipe) = res.pipes.get(index) {
            seq.power_down_front_end(hw, pipe)?;
        }
    }
    seq.power_down_controller(hw, old.tg)
}

fn required_dispclk(hw: &HwContext<'_>, new: &ValidationContext) -> u32 {
    let boot = hw.pool.display_clock.boot_khz();
    new.res
        .bandwidth
        .as_ref()
        .map_or(boot, |b| b.required_dispclk_khz.max(boot))
}

fn raise_dispclk(
    hw: &mut HwContext<'_>,
    new: &ValidationContext,
    stats: &mut CommitStats,
) -> Result<(), DcError> {
    let target = required_dispclk(hw, new);
    if target <= hw.state.dispclk_khz {
        return Ok(());
    }
    let pool = hw.pool;
    if hw.config.apply_safe_watermarks {
        // Pipes already fetching must survive the clock switch
        for pipe in new.res.active() {
            if hw.state.front_ends_on.contains(&pipe.index) {
                pool.slot(pipe.index)?
                    .mi
                    .program_watermarks(&Watermarks::SAFE)?;
                hw.state.watermarks.insert(pipe.index, Watermarks::SAFE);
            }
        }
    }
    log::debug!(
        "[HWSEQ] raise dispclk {} -> {} kHz",
        hw.state.dispclk_khz,
        target
    );
    hw.state.dispclk_khz = pool.display_clock.set_clock(target)?;
    stats.dispclk_raised = true;
    Ok(())
}

fn program_back_end<S: HwSequencer + ?Sized>(
    seq: &S,
    hw: &mut HwContext<'_>,
    head: &PipeCtx,
) -> Result<(), DcError> {
    let pool = hw.pool;
    let stream = head.stream.as_ref().ok_or(DcError::InvalidPipeChain)?;
    let timing = stream.timing();
    let signal = stream.signal();
    log::debug!(
        "[HWSEQ] back end pipe {}: {} {}x{} @ {} kHz",
        head.index,
        signal.name(),
        timing.h_addressable,
        timing.v_addressable,
        head.pix_clk_params.requested_pix_clk_khz
    );

    seq.power_up_controller(hw, head.tg)?;
    if let Some(cs) = head.clock_source {
        pool.clock_source(cs)?
            .program_pix_clk(&head.pix_clk_params, &head.pll_settings)?;
    }
    let tg = pool.tg(head.tg)?;
    tg.program_timing(timing)?;
    seq.enable_crtc(hw, head.tg)?;
    tg.set_blank(true)?;

    let encoder = hw.links.get(stream.link()).and_then(|l| l.encoder.as_ref());
    if let (Some(enc), Some(engine)) = (encoder, head.stream_enc) {
        enc.connect_dig_be_to_fe(engine, true)?;
    }

    let opp = &pool.slot(head.opp)?.opp;
    let color_space = stream.output_color_space();
    opp.program_fmt(&FormatterParams {
        color_depth: timing.color_depth,
        pixel_encoding: timing.pixel_encoding,
        spatial_dither: timing.color_depth.bits_per_component() < 8,
        truncate: false,
        limited_range: color_space.is_ycbcr(),
    })?;
    opp.program_csc_default(color_space)?;
    opp.set_regamma(RegammaMode::Srgb)?;

    if let Some(engine) = head.stream_enc {
        let se = pool.stream_encoder(engine)?;
        if signal.is_dp() {
            se.setup_dp(timing, color_space)?;
        } else if signal.is_hdmi() {
            se.setup_hdmi(timing, color_space, head.pll_settings.actual_pix_clk_khz)?;
        } else if signal.is_dvi() {
            se.setup_dvi(timing, signal == SignalType::DviDualLink)?;
        }
    }
    Ok(())
}

/// How much of each pipe's front end to rewrite, by pipe index.
fn classify(
    state: &HwState,
    current: &ValidationContext,
    new: &ValidationContext,
    programmed: &[bool],
    force_full: bool,
) -> Vec<UpdateType> {
    new.res
        .pipes
        .iter()
        .map(|pipe| {
            let Some(surface) = pipe.surface.as_ref() else {
                return UpdateType::None;
            };
            if force_full || programmed.get(pipe.tg).copied().unwrap_or(true) {
                return UpdateType::Full;
            }
            if pipe.unchanged {
                return UpdateType::None;
            }
            let old = current
                .res
                .pipes
                .get(pipe.index)
                .filter(|o| o.is_active() && o.tg == pipe.tg);
            let (Some(old), true) = (old, state.front_ends_on.contains(&pipe.index)) else {
                return UpdateType::Full;
            };
            let Some(old_surface) = old.surface.as_ref().filter(|s| s.id() == surface.id())
            else {
                return UpdateType::Full;
            };
            let mut flags = surface.changes_from(old_surface);
            flags.set(
                SurfaceUpdateFlags::CHAIN,
                old.bottom_pipe != pipe.bottom_pipe
                    || current.res.bottom_visible(old) != new.res.bottom_visible(pipe),
            );
            flags.update_type()
        })
        .collect()
}

/// Blend rule for a pipe against the pipe beneath it.
pub fn blend_mode(res: &ResourceContext, pipe: &PipeCtx) -> BlendMode {
    match (res.bottom_visible(pipe), pipe.is_visible()) {
        (true, true) => BlendMode::Blending,
        (true, false) => BlendMode::OtherPipeOnly,
        (false, _) => BlendMode::CurrentPipeOnly,
    }
}

fn program_front_ends<S: HwSequencer + ?Sized>(
    seq: &S,
    hw: &mut HwContext<'_>,
    new: &ValidationContext,
    updates: &[UpdateType],
    programmed: &[bool],
    stats: &mut CommitStats,
) -> Result<(), DcError> {
    let pool = hw.pool;
    let flags = seq.lock_flags();

    // Live timing generators with Medium/Full work, ascending
    let mut lock_tgs: Vec<usize> = new
        .res
        .pipes
        .iter()
        .zip(updates)
        .filter(|(p, u)| {
            **u >= UpdateType::Medium && !programmed.get(p.tg).copied().unwrap_or(false)
        })
        .map(|(p, _)| p.tg)
        .collect();
    lock_tgs.sort_unstable();
    lock_tgs.dedup();

    let mut locked = Vec::with_capacity(lock_tgs.len());
    let mut result = Ok(());
    for &tg in &lock_tgs {
        match pool.tg(tg).and_then(|t| t.lock(flags).map_err(DcError::from)) {
            Ok(()) => locked.push(tg),
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    if result.is_ok() {
        result = program_pipes(seq, hw, new, updates, stats);
    }
    // Unlock in reverse so pipe 0 releases last
    for &tg in locked.iter().rev() {
        let unlocked = pool
            .tg(tg)
            .and_then(|t| t.unlock(flags).map_err(DcError::from));
        result = result.and(unlocked);
    }
    result
}

fn program_pipes<S: HwSequencer + ?Sized>(
    seq: &S,
    hw: &mut HwContext<'_>,
    new: &ValidationContext,
    updates: &[UpdateType],
    stats: &mut CommitStats,
) -> Result<(), DcError> {
    let pool = hw.pool;
    for (pipe, update) in new.res.pipes.iter().zip(updates) {
        let Some(surface) = pipe.surface.as_ref() else {
            continue;
        };
        let slot = pool.slot(pipe.index)?;
        match update {
            UpdateType::None => continue,
            UpdateType::Fast => stats.fast_updates += 1,
            UpdateType::Medium => {
                slot.xfm.set_scaler(&pipe.scaler)?;
                seq.program_blend(hw, pipe, blend_mode(&new.res, pipe))?;
                stats.medium_updates += 1;
            }
            UpdateType::Full => {
                program_full(seq, hw, new, pipe, surface)?;
                stats.full_updates += 1;
            }
        }
        verbose!("[HWSEQ] pipe {} {:?} update", pipe.index, update);
        slot.mi
            .program_surface_flip_and_addr(&surface.address(), surface.desc().flip_immediate)?;
    }
    Ok(())
}

fn program_full<S: HwSequencer + ?Sized>(
    seq: &S,
    hw: &mut HwContext<'_>,
    new: &ValidationContext,
    pipe: &PipeCtx,
    surface: &Surface,
) -> Result<(), DcError> {
    let pool = hw.pool;
    let slot = pool.slot(pipe.index)?;
    let desc = surface.desc();

    seq.power_up_front_end(hw, pipe)?;
    slot.mi.program_surface_config(&SurfaceConfig {
        format: desc.format,
        tiling: desc.tiling,
        width: desc.width,
        height: desc.height,
        pitch: desc.pitch,
        rotation: desc.rotation,
        horizontal_mirror: desc.horizontal_mirror,
    })?;
    slot.ipp.program_prescale(desc.format)?;
    slot.ipp.set_degamma(if desc.format.is_video() {
        DegammaMode::Bypass
    } else {
        DegammaMode::Srgb
    })?;
    slot.xfm.set_pixel_storage_depth(pipe.scaler.lb_depth)?;
    slot.xfm.set_scaler(&pipe.scaler)?;
    let remap = pipe
        .stream
        .as_ref()
        .and_then(|s| hw.state.gamut.get(&s.id()).copied())
        .unwrap_or_default();
    slot.xfm.set_gamut_remap(&remap)?;
    seq.program_blend(hw, pipe, blend_mode(&new.res, pipe))
}

fn enable_stream(hw: &HwContext<'_>, head: &PipeCtx) -> Result<(), DcError> {
    let pool = hw.pool;
    let stream = head.stream.as_ref().ok_or(DcError::InvalidPipeChain)?;
    let signal = stream.signal();
    let encoder = hw.links.get(stream.link()).and_then(|l| l.encoder.as_ref());

    if let Some(enc) = encoder {
        let cs = head.clock_source.ok_or(DcError::InvalidPipeChain)?;
        if signal.is_dp() {
            let link = head.link_settings.ok_or(DcError::InvalidPipeChain)?;
            enc.enable_dp_output(&link, cs)?;
            enc.perform_link_training(&link)?;
        } else if signal.is_hdmi() || signal.is_dvi() {
            enc.enable_tmds_output(signal, cs, head.pll_settings.actual_pix_clk_khz)?;
        }
    }

    let Some(engine) = head.stream_enc else {
        return Ok(());
    };
    let se = pool.stream_encoder(engine)?;
    if !signal.is_dvi() {
        se.update_info_packets(stream.info_frames())?;
    }
    if let (Some(audio), Some(output)) = (head.audio, stream.audio()) {
        let endpoint = pool.audio(audio)?;
        endpoint.setup(engine, signal, output)?;
        endpoint.enable_output(engine)?;
    }
    if signal.is_dp() {
        let link = head.link_settings.ok_or(DcError::InvalidPipeChain)?;
        se.dp_set_mn(head.pix_clk_params.requested_pix_clk_khz, &link)?;
        pool.delay.delay_us(hw.config.dp_mn_settle_us);
        se.dp_unblank()?;
    }
    Ok(())
}

/// Blank a head when nothing in its chain is visible or DPMS holds it off.
fn update_blank(hw: &HwContext<'_>, res: &ResourceContext, head: &PipeCtx) -> Result<(), DcError> {
    let stream = head.stream.as_ref().ok_or(DcError::InvalidPipeChain)?;
    let blank = !res.chain_visible(head.index) || hw.state.dpms_off.contains(&stream.id());
    let tg = hw.pool.tg(head.tg)?;
    if tg.is_blanked() != blank {
        tg.set_blank(blank)?;
    }
    Ok(())
}

fn finalize(
    hw: &mut HwContext<'_>,
    current: &ValidationContext,
    new: &ValidationContext,
    retired: &ClockSourceRegistry,
    stale: &[ValidationContext],
    stats: &mut CommitStats,
) -> Result<(), DcError> {
    let pool = hw.pool;

    if let Some(bw) = new.res.bandwidth.as_ref() {
        for pipe in new.res.active() {
            let Some(marks) = bw.watermarks_for(pipe.index) else {
                continue;
            };
            if hw.state.watermarks.get(&pipe.index) != Some(marks) {
                pool.slot(pipe.index)?.mi.program_watermarks(marks)?;
                hw.state.watermarks.insert(pipe.index, *marks);
            }
        }
    }
    hw.state
        .watermarks
        .retain(|i, _| new.res.pipes.get(*i).is_some_and(PipeCtx::is_active));

    let target = required_dispclk(hw, new);
    if target < hw.state.dispclk_khz {
        log::debug!(
            "[HWSEQ] lower dispclk {} -> {} kHz",
            hw.state.dispclk_khz,
            target
        );
        hw.state.dispclk_khz = pool.display_clock.set_clock(target)?;
        stats.dispclk_lowered = true;
    }
    stats.dispclk_khz = hw.state.dispclk_khz;

    let live: Vec<_> = new.streams.iter().map(|s| s.stream.id()).collect();
    hw.state.dpms_off.retain(|id| live.contains(id));
    hw.state.gamut.retain(|id, _| live.contains(id));

    let stale: Vec<_> = stale.iter().map(|ctx| &ctx.res.clocks).collect();
    for id in idle_clock_sources(&current.res.clocks, &new.res.clocks, retired, &stale)? {
        log::debug!("[CLK] {:?} idle, powering down", id);
        pool.clock_source(id)?.power_down()?;
    }
    Ok(())
}

/// PLLs that lost their last user in this commit, either a head reset here
/// or a head a failed commit left behind.
///
/// `retired` is `current` minus the references of every head torn down; a
/// source it still counts must be held by a kept pipe.
fn idle_clock_sources(
    current: &ClockSourceRegistry,
    new: &ClockSourceRegistry,
    retired: &ClockSourceRegistry,
    stale: &[&ClockSourceRegistry],
) -> Result<Vec<ClockSourceId>, DcError> {
    let mut idle = Vec::new();
    for id in current.ids() {
        if new.ref_count(id) > 0 {
            continue;
        }
        if retired.ref_count(id) > 0 {
            log::error!("[CLK] {:?} held by a pipe that was not reset", id);
            return Err(ClockSourceError::RetiredStillReferenced.into());
        }
        let last_user_reset = current.ref_count(id) > 0;
        let left_by_failure = stale.iter().any(|clocks| clocks.ref_count(id) > 0);
        if id != ClockSourceId::DpDto && (last_user_reset || left_by_failure) {
            idle.push(id);
        }
    }
    Ok(idle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use crate::clock_source::ClockRequirement;
    use crate::link::ConnectorType;
    use crate::stream::{Sink, Stream, StreamDesc, StreamId};
    use crate::surface::{SurfaceDesc, SurfaceId};
    use dc_hal::{SurfacePixelFormat, TIMING_1920X1080_60};

    fn chain(top_visible: bool, bottom_visible: Option<bool>) -> ResourceContext {
        let sink = Arc::new(Sink::new(0, ConnectorType::Hdmi));
        let stream = Arc::new(Stream::new(
            StreamId(1),
            StreamDesc::new(sink, TIMING_1920X1080_60),
        ));
        let surface = |id, visible| {
            let mut desc = SurfaceDesc::fullscreen(SurfacePixelFormat::Argb8888, 1920, 1080, 0);
            desc.visible = visible;
            Some(Arc::new(Surface::new(SurfaceId(id), desc)))
        };
        let mut pipes: Vec<PipeCtx> = (0..2).map(PipeCtx::idle).collect();
        pipes[0].stream = Some(stream.clone());
        pipes[0].surface = surface(1, top_visible);
        if let Some(visible) = bottom_visible {
            pipes[0].bottom_pipe = Some(1);
            pipes[1] = PipeCtx {
                stream: Some(stream),
                surface: surface(2, visible),
                top_pipe: Some(0),
                tg: 0,
                opp: 0,
                ..PipeCtx::idle(1)
            };
        }
        ResourceContext {
            pipes,
            clocks: ClockSourceRegistry::new(&[ClockSourceId::DpDto]),
            stream_enc_used: Vec::new(),
            audio_used: Vec::new(),
            bandwidth: None,
        }
    }

    #[test]
    fn test_blend_rule() {
        let res = chain(true, Some(true));
        assert_eq!(blend_mode(&res, &res.pipes[0]), BlendMode::Blending);
        assert_eq!(blend_mode(&res, &res.pipes[1]), BlendMode::CurrentPipeOnly);

        let res = chain(false, Some(true));
        assert_eq!(blend_mode(&res, &res.pipes[0]), BlendMode::OtherPipeOnly);

        let res = chain(true, Some(false));
        assert_eq!(blend_mode(&res, &res.pipes[0]), BlendMode::CurrentPipeOnly);

        let res = chain(true, None);
        assert_eq!(blend_mode(&res, &res.pipes[0]), BlendMode::CurrentPipeOnly);
    }

    #[test]
    fn test_front_end_kept_only_for_live_heads() {
        let old = chain(true, Some(true));
        let new = chain(true, None);
        // Bottom pipe left the chain
        assert!(front_end_kept(&old.pipes[0], &new, &[false, false]));
        assert!(!front_end_kept(&old.pipes[1], &new, &[false, false]));
        // Head reset takes the whole chain down
        assert!(!front_end_kept(&old.pipes[0], &old, &[true, false]));
    }

    fn clocks(refs: &[(ClockSourceId, u32)]) -> ClockSourceRegistry {
        let req = ClockRequirement {
            signal: SignalType::Hdmi,
            pix_clk_khz: 148_500,
            h_total: 2200,
            v_total: 1125,
        };
        let mut reg = ClockSourceRegistry::new(&[
            ClockSourceId::Pll(0),
            ClockSourceId::Pll(1),
            ClockSourceId::DpDto,
        ]);
        for &(id, n) in refs {
            for _ in 0..n {
                reg.retain(id, &req).unwrap();
            }
        }
        reg
    }

    #[test]
    fn test_pll_powered_down_with_last_user() {
        let current = clocks(&[(ClockSourceId::Pll(0), 2), (ClockSourceId::DpDto, 1)]);
        let new = clocks(&[]);
        let retired = clocks(&[]);
        assert_eq!(
            idle_clock_sources(&current, &new, &retired, &[]),
            Ok(vec![ClockSourceId::Pll(0)])
        );

        // One user stays on
        let new = clocks(&[(ClockSourceId::Pll(0), 1)]);
        let retired = clocks(&[(ClockSourceId::Pll(0), 1)]);
        assert_eq!(idle_clock_sources(&current, &new, &retired, &[]), Ok(vec![]));
    }

    #[test]
    fn test_pll_left_by_failed_commit_powered_down() {
        let current = clocks(&[(ClockSourceId::Pll(0), 1)]);
        let new = clocks(&[(ClockSourceId::Pll(0), 1)]);
        let retired = clocks(&[]);
        let failed = clocks(&[(ClockSourceId::Pll(0), 1), (ClockSourceId::Pll(1), 1)]);
        assert_eq!(
            idle_clock_sources(&current, &new, &retired, &[&failed]),
            Ok(vec![ClockSourceId::Pll(1)])
        );
    }

    #[test]
    fn test_unreleased_reference_without_new_user_is_an_error() {
        let current = clocks(&[(ClockSourceId::Pll(1), 1)]);
        let new = clocks(&[]);
        let retired = clocks(&[(ClockSourceId::Pll(1), 1)]);
        assert_eq!(
            idle_clock_sources(&current, &new, &retired, &[]),
            Err(DcError::ClockSource(ClockSourceError::RetiredStillReferenced))
        );
    }
}
