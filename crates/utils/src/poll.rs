//! Bounded polling of free-running hardware.
//!
//! Scan-out hardware is never waited on with interrupts inside the display
//! core. Every wait is a bounded loop: check a condition, sleep, retry, and
//! give up with a typed [`PollTimeout`] once the attempt budget is spent.
//! Whether a timeout is fatal is the caller's decision.

use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Platform sleep service.
pub trait Delay: Send + Sync {
    /// Busy-wait or sleep for `us` microseconds.
    fn delay_us(&self, us: u32);

    /// Convenience: millisecond sleep.
    fn delay_ms(&self, ms: u32) {
        self.delay_us(ms.saturating_mul(1000));
    }
}

/// Attempt budget for one polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Number of times the condition is checked before giving up.
    pub max_attempts: u32,
    /// Sleep between two checks.
    pub interval_us: u32,
}

impl PollPolicy {
    pub const fn new(max_attempts: u32, interval_us: u32) -> Self {
        Self {
            max_attempts,
            interval_us,
        }
    }

    /// Upper bound on time spent sleeping before a timeout is reported.
    pub const fn budget_us(&self) -> u64 {
        self.max_attempts as u64 * self.interval_us as u64
    }
}

/// The condition never became true within the policy's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
    pub attempts: u32,
    pub waited_us: u64,
}

impl fmt::Display for PollTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "condition not met after {} attempts ({} us)",
            self.attempts, self.waited_us
        )
    }
}

/// Check `ready` up to `policy.max_attempts` times, sleeping
/// `policy.interval_us` after every failed check.
///
/// Returns the 1-based attempt on which the condition held.
pub fn poll_until<D, F>(delay: &D, policy: PollPolicy, mut ready: F) -> Result<u32, PollTimeout>
where
    D: Delay + ?Sized,
    F: FnMut() -> bool,
{
    let attempts = policy.max_attempts.max(1);
    let mut waited_us = 0u64;

    for attempt in 1..=attempts {
        if ready() {
            return Ok(attempt);
        }
        delay.delay_us(policy.interval_us);
        waited_us += u64::from(policy.interval_us);
    }

    Err(PollTimeout {
        attempts,
        waited_us,
    })
}

/// Deterministic [`Delay`] for host tests and simulation.
///
/// Sleeping advances a virtual clock instead of blocking, so conditions can
/// be written against [`FakeClock::now_us`].
#[derive(Debug, Default)]
pub struct FakeClock {
    now_us: AtomicU64,
    sleeps: AtomicU32,
}

impl FakeClock {
    pub const fn new() -> Self {
        Self {
            now_us: AtomicU64::new(0),
            sleeps: AtomicU32::new(0),
        }
    }

    /// Virtual time elapsed since creation.
    pub fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::Relaxed)
    }

    /// Number of `delay_us` calls observed.
    pub fn sleeps(&self) -> u32 {
        self.sleeps.load(Ordering::Relaxed)
    }

    /// Move the clock forward without counting a sleep.
    pub fn advance(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::Relaxed);
    }
}

impl Delay for FakeClock {
    fn delay_us(&self, us: u32) {
        self.sleeps.fetch_add(1, Ordering::Relaxed);
        self.now_us.fetch_add(u64::from(us), Ordering::Relaxed);
    }
}
