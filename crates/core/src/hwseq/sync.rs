//! Frame-locking heads through the global swap lock.
//!
//! Heads whose timings can be synchronized form a group. One head is the
//! master; every other head arms a reset trigger on the master and waits for
//! it to fire. Triggers are disarmed and the lock released whether or not the
//! wait succeeded.

use alloc::vec::Vec;

use dc_hal::GslParams;
use dc_utils::{poll_until, PollPolicy};

use super::HwContext;
use crate::context::{PipeCtx, ValidationContext};
use crate::error::DcError;

/// Heads of `ctx` grouped by synchronizable timing, in pipe order. Only
/// groups of two or more that contain a freshly programmed head are kept.
pub fn sync_groups<'a>(
    ctx: &'a ValidationContext,
    programmed: &[bool],
) -> Vec<Vec<&'a PipeCtx>> {
    let mut groups: Vec<Vec<&PipeCtx>> = Vec::new();
    for head in ctx.res.heads() {
        let Some(timing) = head.stream.as_ref().map(|s| s.timing()) else {
            continue;
        };
        let group = groups.iter_mut().find(|g| {
            g.first()
                .and_then(|p| p.stream.as_ref())
                .is_some_and(|s| s.timing().is_synchronizable_with(timing))
        });
        match group {
            Some(g) => g.push(head),
            None => groups.push(alloc::vec![head]),
        }
    }
    groups.retain(|g| {
        g.len() > 1
            && g
                .iter()
                .any(|p| programmed.get(p.index).copied().unwrap_or(false))
    });
    groups
}

fn arm_and_wait(
    hw: &HwContext<'_>,
    group_id: u8,
    master_tg: usize,
    slaves: &[usize],
    policy: PollPolicy,
) -> Result<bool, DcError> {
    hw.pool.tg(master_tg)?.setup_global_swap_lock(Some(&GslParams {
        group: group_id,
        master: true,
    }))?;
    for &tg in slaves {
        let tg = hw.pool.tg(tg)?;
        tg.setup_global_swap_lock(Some(&GslParams {
            group: group_id,
            master: false,
        }))?;
        tg.enable_reset_trigger(master_tg)?;
    }
    let synced = poll_until(hw.pool.delay.as_ref(), policy, || {
        slaves.iter().all(|&tg| {
            hw.pool
                .tg(tg)
                .is_ok_and(|t| t.did_triggered_reset_occur())
        })
    });
    Ok(synced.is_ok())
}

/// Arm, wait and disarm one group. Returns `true` if every slave reset.
fn sync_group(
    hw: &HwContext<'_>,
    group_id: u8,
    group: &[&PipeCtx],
    programmed: &[bool],
) -> Result<bool, DcError> {
    // Prefer a head that is already scanning as master
    let master = group
        .iter()
        .position(|p| !programmed.get(p.index).copied().unwrap_or(false))
        .unwrap_or(0);
    let master_tg = group
        .get(master)
        .map(|p| p.tg)
        .ok_or(DcError::InvalidPipeChain)?;
    let slaves: Vec<usize> = group
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != master)
        .map(|(_, p)| p.tg)
        .collect();

    log::debug!(
        "[GSL] group {}: master tg {}, slaves {:?}",
        group_id,
        master_tg,
        slaves
    );

    let frame_us = group
        .first()
        .and_then(|p| p.stream.as_ref())
        .map_or(16_666, |s| s.timing().frame_time_us().max(1));
    let policy = PollPolicy::new(hw.config.gsl_max_frames, frame_us);

    let armed = arm_and_wait(hw, group_id, master_tg, &slaves, policy);

    // Keep going on failure so nothing is left armed; report the first error
    let mut disarmed: Result<(), DcError> = Ok(());
    for &tg in &slaves {
        let result = hw
            .pool
            .tg(tg)
            .and_then(|t| t.disable_reset_trigger().map_err(DcError::from));
        disarmed = disarmed.and(result);
    }
    for tg in core::iter::once(master_tg).chain(slaves.iter().copied()) {
        let result = hw
            .pool
            .tg(tg)
            .and_then(|t| t.setup_global_swap_lock(None).map_err(DcError::from));
        disarmed = disarmed.and(result);
    }

    let synced = armed?;
    disarmed?;
    Ok(synced)
}

/// Synchronize every eligible group. Returns the number of groups that
/// timed out; timeouts are not errors.
pub fn synchronize_timings(
    hw: &mut HwContext<'_>,
    ctx: &ValidationContext,
    programmed: &[bool],
) -> Result<u32, DcError> {
    let mut timeouts = 0;
    for (id, group) in sync_groups(ctx, programmed).iter().enumerate() {
        let group_id = u8::try_from(id).unwrap_or(u8::MAX);
        if !sync_group(hw, group_id, group, programmed)? {
            log::warn!(
                "[GSL] group {} did not lock within {} frames",
                group_id,
                hw.config.gsl_max_frames
            );
            timeouts += 1;
        }
    }
    hw.state.gsl_timeouts += timeouts;
    Ok(timeouts)
}
