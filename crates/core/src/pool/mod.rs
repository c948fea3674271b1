//! Static hardware inventory for one boot.
//!
//! The pool is built once per device from a [`BlockFactory`] and the
//! generation's layout. It never changes afterwards; which blocks are in use
//! is tracked per snapshot in the resource context.

mod dce110;
mod dce112;
mod dcn10;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use dc_hal::{
    AsicCaps, AsicFeature, AudioEndpoint, BlockFactory, ClockSourceHw, ClockSourceId, DisplayClock,
    EngineId, Firmware, InputPixelProcessor, MemoryInput, Mpc, OutputPixelProcessor,
    PowerGateController, StreamEncoder, SurfacePixelFormat, TimingGenerator, Transform,
};
use dc_utils::Delay;

use crate::error::DcError;

/// Display engine generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DceVersion {
    /// DCE 11.0 (Carrizo).
    Dce110,
    /// DCE 11.2 (Polaris).
    Dce112,
    /// DCN 1.0 (Raven).
    Dcn10,
}

impl DceVersion {
    pub fn is_dcn(self) -> bool {
        self == Self::Dcn10
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Dce110 => "dce110",
            Self::Dce112 => "dce112",
            Self::Dcn10 => "dcn10",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Dce110, Self::Dce112, Self::Dcn10]
            .into_iter()
            .find(|v| v.name() == name)
    }

    fn layout(self) -> PoolLayout {
        match self {
            Self::Dce110 => dce110::LAYOUT,
            Self::Dce112 => dce112::LAYOUT,
            Self::Dcn10 => dcn10::LAYOUT,
        }
    }

    /// Capability defaults for this generation.
    pub fn default_caps(self) -> AsicCaps {
        match self {
            Self::Dce110 => dce110::default_caps(),
            Self::Dce112 => dce112::default_caps(),
            Self::Dcn10 => dcn10::default_caps(),
        }
    }
}

impl fmt::Display for DceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Block counts for one generation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PoolLayout {
    pub pipes: usize,
    pub underlay: bool,
    pub plls: u8,
    pub stream_encoders: u8,
    pub audio_endpoints: usize,
    pub has_mpc: bool,
    pub has_power_gate: bool,
}

/// Limits resolved from the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Pipes usable as heads.
    pub max_controllers: usize,
    pub max_cursor_size: u32,
    pub max_pix_clk_khz: u32,
    pub timing_sync_supported: bool,
    pub skip_power_down_inactive_encoder: bool,
    pub disable_clock_sharing: bool,
}

/// One pipe slot's blocks. Underlay slots have no timing generator and can
/// only sit beneath a head.
pub struct PipeSlot {
    pub index: usize,
    pub tg: Option<Arc<dyn TimingGenerator>>,
    pub mi: Arc<dyn MemoryInput>,
    pub xfm: Arc<dyn Transform>,
    pub ipp: Arc<dyn InputPixelProcessor>,
    pub opp: Arc<dyn OutputPixelProcessor>,
    pub underlay: bool,
}

impl PipeSlot {
    /// Whether this slot's fetch unit can read `format`.
    ///
    /// DCE graphics pipes cannot fetch planar video; underlay pipes fetch
    /// nothing else.
    pub fn can_fetch(&self, format: SurfacePixelFormat, version: DceVersion) -> bool {
        if self.underlay {
            format.is_video()
        } else {
            version.is_dcn() || !format.is_video()
        }
    }
}

pub struct ResourcePool {
    pub version: DceVersion,
    pub pipes: Vec<PipeSlot>,
    pub stream_encoders: Vec<Arc<dyn StreamEncoder>>,
    pub audio_endpoints: Vec<Arc<dyn AudioEndpoint>>,
    /// PLLs in index order, then the DP DTO.
    pub clock_sources: Vec<Arc<dyn ClockSourceHw>>,
    pub display_clock: Arc<dyn DisplayClock>,
    pub mpc: Option<Arc<dyn Mpc>>,
    pub power_gate: Option<Arc<dyn PowerGateController>>,
    pub firmware: Arc<dyn Firmware>,
    pub delay: Arc<dyn Delay>,
    pub caps: AsicCaps,
    pub limits: PoolLimits,
}

impl ResourcePool {
    /// Build the pool for `version`. `caps` overrides generation defaults.
    pub fn create(
        version: DceVersion,
        factory: &dyn BlockFactory,
        mut caps: AsicCaps,
    ) -> Result<Self, DcError> {
        caps.merge_defaults(&version.default_caps());
        let layout = version.layout();

        let limits = PoolLimits {
            max_controllers: (caps.value(AsicFeature::MaxControllers, layout.pipes as u32) as usize)
                .min(layout.pipes),
            max_cursor_size: caps.value(AsicFeature::MaxCursorSize, 128),
            max_pix_clk_khz: caps.value(AsicFeature::MaxPixelClockKhz, 600_000),
            timing_sync_supported: caps.flag(AsicFeature::TimingSyncSupported, false),
            skip_power_down_inactive_encoder: caps
                .flag(AsicFeature::SkipPowerDownInactiveEncoder, false),
            disable_clock_sharing: caps.flag(AsicFeature::DisableClockSharing, false),
        };
        let with_underlay = layout.underlay && caps.flag(AsicFeature::SupportsUnderlay, true);

        let mut pipes = Vec::with_capacity(layout.pipes + 1);
        for index in 0..limits.max_controllers {
            let tg = factory.timing_generator(index).ok_or(DcError::MissingBlock)?;
            pipes.push(Self::front_end(factory, index, index, Some(tg))?);
        }
        if with_underlay {
            // Underlay blocks sit after the full set of graphics pipes
            pipes.push(Self::front_end(factory, pipes.len(), layout.pipes, None)?);
        }

        // Stream encoders and audio are optional extras; take what exists
        let stream_encoders: Vec<_> = (0..layout.stream_encoders)
            .filter_map(|e| factory.stream_encoder(EngineId(e)))
            .collect();
        let audio_endpoints: Vec<_> = (0..layout.audio_endpoints)
            .filter_map(|i| factory.audio_endpoint(i))
            .collect();

        let mut clock_sources = Vec::with_capacity(usize::from(layout.plls) + 1);
        for n in 0..layout.plls {
            clock_sources.push(
                factory
                    .clock_source(ClockSourceId::Pll(n))
                    .ok_or(DcError::MissingBlock)?,
            );
        }
        clock_sources.push(
            factory
                .clock_source(ClockSourceId::DpDto)
                .ok_or(DcError::MissingBlock)?,
        );

        let display_clock = factory.display_clock().ok_or(DcError::MissingBlock)?;
        let mpc = if layout.has_mpc {
            Some(factory.mpc().ok_or(DcError::MissingBlock)?)
        } else {
            None
        };
        let power_gate = if layout.has_power_gate {
            Some(factory.power_gate_controller().ok_or(DcError::MissingBlock)?)
        } else {
            None
        };

        log::info!(
            "[RESOURCE] {} pool: {} pipes ({} heads{}), {} stream encoders, {} audio, {} PLLs + DTO",
            version,
            pipes.len(),
            limits.max_controllers,
            if with_underlay { ", underlay" } else { "" },
            stream_encoders.len(),
            audio_endpoints.len(),
            layout.plls
        );

        Ok(Self {
            version,
            pipes,
            stream_encoders,
            audio_endpoints,
            clock_sources,
            display_clock,
            mpc,
            power_gate,
            firmware: factory.firmware(),
            delay: factory.delay(),
            caps,
            limits,
        })
    }

    fn front_end(
        factory: &dyn BlockFactory,
        index: usize,
        inst: usize,
        tg: Option<Arc<dyn TimingGenerator>>,
    ) -> Result<PipeSlot, DcError> {
        Ok(PipeSlot {
            index,
            underlay: tg.is_none(),
            tg,
            mi: factory.memory_input(inst).ok_or(DcError::MissingBlock)?,
            xfm: factory.transform(inst).ok_or(DcError::MissingBlock)?,
            ipp: factory
                .input_pixel_processor(inst)
                .ok_or(DcError::MissingBlock)?,
            opp: factory
                .output_pixel_processor(inst)
                .ok_or(DcError::MissingBlock)?,
        })
    }

    pub fn pipe_count(&self) -> usize {
        self.pipes.len()
    }

    pub fn clock_source_ids(&self) -> Vec<ClockSourceId> {
        self.clock_sources.iter().map(|c| c.id()).collect()
    }

    pub fn slot(&self, pipe: usize) -> Result<&PipeSlot, DcError> {
        self.pipes.get(pipe).ok_or(DcError::MissingBlock)
    }

    /// Timing generator of slot `tg`.
    pub fn tg(&self, tg: usize) -> Result<&Arc<dyn TimingGenerator>, DcError> {
        self.slot(tg)?.tg.as_ref().ok_or(DcError::MissingBlock)
    }

    pub fn clock_source(&self, id: ClockSourceId) -> Result<&Arc<dyn ClockSourceHw>, DcError> {
        self.clock_sources
            .iter()
            .find(|c| c.id() == id)
            .ok_or(DcError::MissingBlock)
    }

    pub fn stream_encoder(&self, engine: EngineId) -> Result<&Arc<dyn StreamEncoder>, DcError> {
        self.stream_encoders
            .iter()
            .find(|s| s.engine() == engine)
            .ok_or(DcError::MissingBlock)
    }

    pub fn audio(&self, inst: usize) -> Result<&Arc<dyn AudioEndpoint>, DcError> {
        self.audio_endpoints
            .iter()
            .find(|a| a.instance() == inst)
            .ok_or(DcError::MissingBlock)
    }
}

impl fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("version", &self.version)
            .field("pipes", &self.pipes.len())
            .field("stream_encoders", &self.stream_encoders.len())
            .field("audio_endpoints", &self.audio_endpoints.len())
            .field("clock_sources", &self.clock_source_ids())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_hal::mock::MockHw;
    use dc_hal::{FeatureValue, SurfacePixelFormat};

    #[test]
    fn test_dce110_has_underlay() {
        let hw = MockHw::default();
        let pool = ResourcePool::create(DceVersion::Dce110, &hw, AsicCaps::new()).unwrap();
        assert_eq!(pool.pipe_count(), 4);
        assert!(pool.pipes[3].underlay);
        assert!(pool.pipes[3].tg.is_none());
        assert_eq!(
            pool.clock_source_ids(),
            vec![ClockSourceId::Pll(0), ClockSourceId::Pll(1), ClockSourceId::DpDto]
        );
        assert!(pool.mpc.is_none());
    }

    #[test]
    fn test_dce112_six_plls() {
        let hw = MockHw::default();
        let pool = ResourcePool::create(DceVersion::Dce112, &hw, AsicCaps::new()).unwrap();
        assert_eq!(pool.pipe_count(), 6);
        assert_eq!(pool.clock_sources.len(), 7);
    }

    #[test]
    fn test_dcn10_has_mpc_and_power_gate() {
        let hw = MockHw::default();
        let pool = ResourcePool::create(DceVersion::Dcn10, &hw, AsicCaps::new()).unwrap();
        assert_eq!(pool.pipe_count(), 4);
        assert!(pool.mpc.is_some());
        assert!(pool.power_gate.is_some());
        assert!(pool.limits.timing_sync_supported);
    }

    #[test]
    fn test_max_controllers_cap_limits_heads() {
        let hw = MockHw::default();
        let caps = AsicCaps::new().with(AsicFeature::MaxControllers, FeatureValue::U32(2));
        let pool = ResourcePool::create(DceVersion::Dce112, &hw, caps).unwrap();
        assert_eq!(pool.pipe_count(), 2);
    }

    #[test]
    fn test_missing_blocks_fail_construction() {
        let hw = MockHw::new(dc_hal::mock::MockConfig {
            tg_count: 2,
            ..Default::default()
        });
        assert_eq!(
            ResourcePool::create(DceVersion::Dce112, &hw, AsicCaps::new()).err(),
            Some(DcError::MissingBlock)
        );
    }

    #[test]
    fn test_fetch_rules() {
        let hw = MockHw::default();
        let dce = ResourcePool::create(DceVersion::Dce110, &hw, AsicCaps::new()).unwrap();
        assert!(!dce.pipes[0].can_fetch(SurfacePixelFormat::Nv12, dce.version));
        assert!(dce.pipes[3].can_fetch(SurfacePixelFormat::Nv12, dce.version));
        assert!(!dce.pipes[3].can_fetch(SurfacePixelFormat::Argb8888, dce.version));

        let dcn = ResourcePool::create(DceVersion::Dcn10, &hw, AsicCaps::new()).unwrap();
        assert!(dcn.pipes[0].can_fetch(SurfacePixelFormat::Nv12, dcn.version));
    }

    #[test]
    fn test_version_names() {
        assert_eq!(DceVersion::from_name("dcn10"), Some(DceVersion::Dcn10));
        assert_eq!(DceVersion::from_name("dce80"), None);
    }
}
