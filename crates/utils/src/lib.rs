#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Root re-exports the lock and collection types used across the display core,
// plus the polling and fixed-point helpers that stand in for busy-wait loops
// and floating point in register math.

pub mod fixpt;
pub mod poll;

pub use fixpt::Fixed31_32;
pub use poll::{poll_until, Delay, FakeClock, PollPolicy, PollTimeout};

// Re-export spin crate types as our lock API
pub use spin::{Mutex, MutexGuard, Once};

// Re-export hashbrown collections
pub use hashbrown::{HashMap, HashSet};
