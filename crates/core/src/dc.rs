//! The display controller: public entry point of the core.
//!
//! `Dc` owns the resource pool, the current context and the per-generation
//! sequencer. A commit builds a candidate context, has it admitted by the
//! bandwidth model, lets the sequencer move the hardware, and only then
//! adopts the candidate. Callers serialize access; nothing here locks.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use dc_error::ErrorClass;
use dc_hal::{
    AsicCaps, BlockFactory, CrtcPosition, CrtcTiming, CursorAttributes, CursorPosition, DrrParams,
    GamutRemap, HwError, PlaneAddress,
};

use crate::bandwidth::{validate_bandwidth, BandwidthModel, ReferenceBandwidthModel};
use crate::config::DcConfig;
use crate::context::{PipeCtx, StreamRequest, ValidationContext};
use crate::error::DcError;
use crate::hwseq::{create_hwseq, CommitStats, HwContext, HwSequencer, HwState};
use crate::link::{ConnectorType, Link, LinkDesc};
use crate::pool::{DceVersion, ResourcePool};
use crate::resource::Allocator;
use crate::stream::{Sink, Stream, StreamDesc, StreamId};
use crate::surface::{Surface, SurfaceDesc, SurfaceId};

/// Everything needed to bring up one display engine.
pub struct DcInitData {
    pub version: DceVersion,
    pub factory: Arc<dyn BlockFactory>,
    /// Overrides on top of the generation's capability defaults.
    pub caps: AsicCaps,
    /// Connectors in board order.
    pub links: Vec<LinkDesc>,
    pub config: DcConfig,
    /// `None` selects [`ReferenceBandwidthModel`].
    pub bandwidth_model: Option<Box<dyn BandwidthModel>>,
}

impl DcInitData {
    pub fn new(version: DceVersion, factory: Arc<dyn BlockFactory>, links: Vec<LinkDesc>) -> Self {
        Self {
            version,
            factory,
            caps: AsicCaps::new(),
            links,
            config: DcConfig::default(),
            bandwidth_model: None,
        }
    }
}

/// Whether hardware is known to match the current context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcState {
    Ready,
    /// A hardware step failed mid-commit. The next commit resets and
    /// reprograms everything.
    HardwareUncertain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DcTelemetry {
    pub commits: u32,
    /// Commits short-circuited because nothing changed.
    pub skipped: u32,
    /// Requests refused by validation.
    pub rejected: u32,
    pub hw_failures: u32,
    pub flips: u32,
    pub gsl_timeouts: u32,
    pub last_commit: Option<CommitStats>,
}

/// One fast-path address update.
#[derive(Debug, Clone)]
pub struct SurfaceFlip {
    pub surface: Arc<Surface>,
    pub address: PlaneAddress,
    pub flip_immediate: bool,
}

pub struct Dc {
    config: DcConfig,
    pool: ResourcePool,
    links: Vec<Link>,
    hwseq: Box<dyn HwSequencer>,
    bandwidth: Box<dyn BandwidthModel>,
    current: ValidationContext,
    hw: HwState,
    state: DcState,
    telemetry: DcTelemetry,
    next_stream_id: u32,
    next_surface_id: u32,
}

impl Dc {
    /// Build the pool, bind links and bring hardware to its idle state.
    pub fn create(init: DcInitData) -> Result<Self, DcError> {
        let pool = ResourcePool::create(init.version, init.factory.as_ref(), init.caps)?;

        let mut links = Vec::with_capacity(init.links.len());
        for (index, desc) in init.links.iter().enumerate() {
            let encoder = if desc.connector == ConnectorType::Virtual {
                None
            } else {
                Some(
                    init.factory
                        .link_encoder(index)
                        .ok_or(DcError::MissingBlock)?,
                )
            };
            links.push(Link {
                index,
                connector: desc.connector,
                max_link: desc.max_link,
                encoder,
            });
        }

        let mut dc = Self {
            config: init.config,
            current: ValidationContext::empty(&pool),
            pool,
            links,
            hwseq: create_hwseq(init.version),
            bandwidth: init
                .bandwidth_model
                .unwrap_or_else(|| Box::new(ReferenceBandwidthModel::default())),
            hw: HwState::default(),
            state: DcState::Ready,
            telemetry: DcTelemetry::default(),
            next_stream_id: 1,
            next_surface_id: 1,
        };

        let mut hw = HwContext {
            pool: &dc.pool,
            links: &dc.links,
            config: &dc.config,
            state: &mut dc.hw,
        };
        dc.hwseq.init_hw(&mut hw)?;

        log::info!(
            "[DC] {} ready: {} pipes, {} links, bandwidth model {}",
            dc.hwseq.name(),
            dc.pool.pipe_count(),
            dc.links.len(),
            dc.bandwidth.name()
        );
        Ok(dc)
    }

    pub fn create_stream_for_sink(&mut self, sink: Arc<Sink>, timing: CrtcTiming) -> Arc<Stream> {
        self.create_stream(StreamDesc::new(sink, timing))
    }

    pub fn create_stream(&mut self, desc: StreamDesc) -> Arc<Stream> {
        let id = StreamId(self.next_stream_id);
        self.next_stream_id += 1;
        let stream = Stream::new(id, desc);
        log::debug!(
            "[DC] stream {} on link {}: {} {}x{}",
            id.0,
            stream.link(),
            stream.signal().name(),
            stream.timing().h_addressable,
            stream.timing().v_addressable
        );
        Arc::new(stream)
    }

    pub fn create_surface(&mut self, desc: SurfaceDesc) -> Arc<Surface> {
        let id = SurfaceId(self.next_surface_id);
        self.next_surface_id += 1;
        Arc::new(Surface::new(id, desc))
    }

    fn build_context(
        &self,
        requests: &[StreamRequest],
        force_full: bool,
    ) -> Result<ValidationContext, DcError> {
        let allocator = Allocator {
            pool: &self.pool,
            links: &self.links,
            config: &self.config,
            current: &self.current,
            force_full,
        };
        let mut ctx = allocator.build(requests)?;
        validate_bandwidth(self.bandwidth.as_ref(), &self.pool, &mut ctx)?;
        Ok(ctx)
    }

    /// Check that `requests` fit without touching hardware.
    pub fn validate_resources(&self, requests: &[StreamRequest]) -> Result<(), DcError> {
        self.build_context(requests, false)
            .map(|_| ())
            .inspect_err(|e| self.report_rejection(*e))
    }

    fn report_rejection(&self, e: DcError) {
        if e.class() == ErrorClass::Internal {
            self.invariant_violated(e);
        } else {
            log::debug!("[DC] request rejected: {}", e);
        }
    }

    fn invariant_violated(&self, e: DcError) {
        log::error!("[DC] internal invariant violated: {}", e);
        debug_assert!(
            !self.config.assert_on_invariant_violation,
            "internal invariant violated: {e}"
        );
    }

    /// Record a failure raised while hardware was being written.
    fn hardware_failed(&mut self, e: DcError) -> DcError {
        let class = e.class();
        if class == ErrorClass::Internal {
            self.invariant_violated(e);
        } else {
            log::error!("[DC] hardware step failed: {}", e);
        }
        if class.may_leave_partial_state() {
            self.state = DcState::HardwareUncertain;
            self.telemetry.hw_failures += 1;
        }
        e
    }

    /// Make `requests` the displayed configuration.
    ///
    /// Identical requests return without touching hardware unless a previous
    /// failure left it uncertain.
    pub fn commit(&mut self, requests: &[StreamRequest]) -> Result<CommitStats, DcError> {
        let force_full = self.state == DcState::HardwareUncertain;
        if !force_full && self.current.matches(requests) {
            self.telemetry.skipped += 1;
            log::debug!("[DC] commit unchanged, skipped");
            return Ok(CommitStats::default());
        }
        if force_full {
            log::warn!("[DC] hardware state uncertain, reprogramming everything");
        }

        let new = match self.build_context(requests, force_full) {
            Ok(ctx) => ctx,
            Err(e) => {
                self.report_rejection(e);
                self.telemetry.rejected += 1;
                return Err(e);
            }
        };

        let mut hw = HwContext {
            pool: &self.pool,
            links: &self.links,
            config: &self.config,
            state: &mut self.hw,
        };
        let result = self
            .hwseq
            .apply_ctx_to_hw(&mut hw, &self.current, &new, force_full);

        match result {
            Ok(stats) => {
                self.current = new;
                self.state = DcState::Ready;
                self.telemetry.commits += 1;
                self.telemetry.gsl_timeouts += stats.sync_timeouts;
                self.telemetry.last_commit = Some(stats);
                Ok(stats)
            }
            Err(e) => {
                let e = self.hardware_failed(e);
                if self.state == DcState::HardwareUncertain {
                    self.hw.stale.push(new);
                }
                Err(e)
            }
        }
    }

    /// Replace the surfaces of one committed stream.
    pub fn commit_surfaces_to_stream(
        &mut self,
        stream: &Arc<Stream>,
        surfaces: Vec<Arc<Surface>>,
    ) -> Result<CommitStats, DcError> {
        let mut requests = self.current.requests();
        let request = requests
            .iter_mut()
            .find(|r| Arc::ptr_eq(&r.stream, stream))
            .ok_or(DcError::StreamNotFound)?;
        request.surfaces = surfaces;
        self.commit(&requests)
    }

    /// Point committed surfaces at new framebuffers.
    ///
    /// Only the scan-out address is written; no lock, no revalidation.
    /// Returns the new handles in `flips` order.
    pub fn flip_surface_addrs(&mut self, flips: &[SurfaceFlip]) -> Result<Vec<Arc<Surface>>, DcError> {
        let mut targets = Vec::with_capacity(flips.len());
        for flip in flips {
            let pipe = self
                .current
                .res
                .pipes
                .iter()
                .position(|p| p.surface.as_ref().is_some_and(|s| Arc::ptr_eq(s, &flip.surface)))
                .ok_or(DcError::SurfaceNotFound)?;
            targets.push(pipe);
        }

        let mut flipped = Vec::with_capacity(flips.len());
        for (flip, &pipe) in flips.iter().zip(&targets) {
            let surface = Arc::new(flip.surface.with_address(flip.address, flip.flip_immediate));
            let written = self
                .pool
                .slot(pipe)
                .and_then(|slot| {
                    slot.mi
                        .program_surface_flip_and_addr(&flip.address, flip.flip_immediate)
                        .map_err(DcError::from)
                });
            if let Err(e) = written {
                return Err(self.hardware_failed(e));
            }

            if let Some(p) = self.current.res.pipes.get_mut(pipe) {
                p.surface = Some(surface.clone());
            }
            for status in &mut self.current.streams {
                for s in &mut status.surfaces {
                    if Arc::ptr_eq(s, &flip.surface) {
                        *s = surface.clone();
                    }
                }
            }
            self.telemetry.flips += 1;
            flipped.push(surface);
        }
        Ok(flipped)
    }

    fn head(&self, stream: &Arc<Stream>) -> Result<&PipeCtx, DcError> {
        self.current
            .res
            .head_for(stream)
            .ok_or(DcError::StreamNotFound)
    }

    /// Run a direct hardware write, marking hardware uncertain on failure.
    fn hw_write(&mut self, result: Result<(), HwError>) -> Result<(), DcError> {
        result.map_err(|e| self.hardware_failed(e.into()))
    }

    pub fn set_cursor_attributes(
        &mut self,
        stream: &Arc<Stream>,
        attributes: &CursorAttributes,
    ) -> Result<(), DcError> {
        let max = self.pool.limits.max_cursor_size;
        if attributes.width > max || attributes.height > max {
            return Err(DcError::CursorTooLarge);
        }
        let pipe = self.head(stream)?.index;
        let result = self.pool.slot(pipe)?.ipp.set_cursor_attributes(attributes);
        self.hw_write(result)
    }

    pub fn set_cursor_position(
        &mut self,
        stream: &Arc<Stream>,
        position: &CursorPosition,
    ) -> Result<(), DcError> {
        let pipe = self.head(stream)?.index;
        let result = self.pool.slot(pipe)?.ipp.set_cursor_position(position);
        self.hw_write(result)
    }

    /// Enable variable refresh within `params`, or disable it with `None`.
    pub fn set_drr(&mut self, stream: &Arc<Stream>, params: Option<DrrParams>) -> Result<(), DcError> {
        let tg = self.head(stream)?.tg;
        let result = self.pool.tg(tg)?.set_drr(params.as_ref());
        self.hw_write(result)
    }

    pub fn get_vblank_counter(&self, stream: &Arc<Stream>) -> Result<u32, DcError> {
        let tg = self.head(stream)?.tg;
        Ok(self.pool.tg(tg)?.get_frame_count())
    }

    pub fn get_scanout_position(&self, stream: &Arc<Stream>) -> Result<CrtcPosition, DcError> {
        let tg = self.head(stream)?.tg;
        Ok(self.pool.tg(tg)?.get_position())
    }

    /// Apply `remap` to every pipe of the stream. It sticks across commits.
    pub fn set_gamut_remap(&mut self, stream: &Arc<Stream>, remap: GamutRemap) -> Result<(), DcError> {
        let head = self.head(stream)?.index;
        let pipes = self.current.res.chain(head);
        self.hw.gamut.insert(stream.id(), remap);
        for pipe in pipes {
            let result = self.pool.slot(pipe)?.xfm.set_gamut_remap(&remap);
            self.hw_write(result)?;
        }
        Ok(())
    }

    /// Blank or unblank a stream without releasing its resources.
    pub fn set_dpms(&mut self, stream: &Arc<Stream>, on: bool) -> Result<(), DcError> {
        let head = self.head(stream)?;
        let (index, tg_index, engine) = (head.index, head.tg, head.stream_enc);
        if on {
            self.hw.dpms_off.remove(&stream.id());
        } else {
            self.hw.dpms_off.insert(stream.id());
        }
        let blank = !on || !self.current.res.chain_visible(index);
        log::debug!("[DC] dpms {} for stream {}", if on { "on" } else { "off" }, stream.id().0);

        let tg = self.pool.tg(tg_index)?.clone();
        if tg.is_blanked() != blank {
            let result = tg.set_blank(blank);
            self.hw_write(result)?;
        }
        if let (true, Some(engine)) = (stream.signal().is_hdmi(), engine) {
            let result = self.pool.stream_encoder(engine)?.set_avmute(!on);
            self.hw_write(result)?;
        }
        Ok(())
    }

    /// Tear every stream down and drop to the boot display clock.
    pub fn power_down(&mut self) -> Result<(), DcError> {
        self.commit(&[])?;
        let boot = self.pool.display_clock.boot_khz();
        if self.hw.dispclk_khz != boot {
            match self.pool.display_clock.set_clock(boot) {
                Ok(khz) => self.hw.dispclk_khz = khz,
                Err(e) => return Err(self.hardware_failed(e.into())),
            }
        }
        log::info!("[DC] powered down");
        Ok(())
    }

    pub fn config(&self) -> &DcConfig {
        &self.config
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn current(&self) -> &ValidationContext {
        &self.current
    }

    pub fn hw_state(&self) -> &HwState {
        &self.hw
    }

    pub fn state(&self) -> DcState {
        self.state
    }

    pub fn telemetry(&self) -> &DcTelemetry {
        &self.telemetry
    }

    pub fn sequencer_name(&self) -> &'static str {
        self.hwseq.name()
    }
}

impl core::fmt::Debug for Dc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dc")
            .field("sequencer", &self.hwseq.name())
            .field("pool", &self.pool)
            .field("links", &self.links)
            .field("streams", &self.current.streams.len())
            .field("state", &self.state)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}
