//! Display core: resource allocation, bandwidth admission and hardware
//! commit sequencing for a multi-pipe display engine.
//!
//! A client describes what should be on screen as a list of
//! [`StreamRequest`]s and hands it to [`Dc::commit`]. The core assigns pipes,
//! encoders and clock sources, checks the result against the memory
//! bandwidth model, and then moves the hardware from the current
//! configuration to the new one with the minimum of disruption: untouched
//! streams keep scanning, surface-only changes take the front-end path, and
//! address-only flips bypass validation entirely through
//! [`Dc::flip_surface_addrs`].
//!
//! Hardware blocks are consumed through the traits in [`dc_hal`]; the core
//! never touches a register directly.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[cfg(feature = "verbose")]
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => { log::info!($($arg)*) };
}

#[cfg(not(feature = "verbose"))]
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {};
}

pub mod bandwidth;
pub mod clock_source;
pub mod config;
pub mod context;
pub mod dc;
pub mod error;
pub mod hwseq;
pub mod link;
pub mod pool;
pub mod power;
pub mod resource;
pub mod stream;
pub mod surface;

pub use bandwidth::{BandwidthInput, BandwidthModel, BandwidthResult, ReferenceBandwidthModel};
pub use clock_source::{ClockSourceError, ClockSourceRegistry};
pub use config::DcConfig;
pub use context::{PipeCtx, StreamRequest, StreamStatus, ValidationContext};
pub use dc::{Dc, DcInitData, DcState, DcTelemetry, SurfaceFlip};
pub use error::{DcError, ResourceKind};
pub use hwseq::{CommitStats, HwSequencer, HwState};
pub use link::{ConnectorType, Link, LinkDesc};
pub use pool::{DceVersion, ResourcePool};
pub use stream::{Sink, Stream, StreamDesc, StreamId};
pub use surface::{Surface, SurfaceDesc, SurfaceId, SurfaceUpdateFlags, UpdateType};
