//! Resource allocation: requests in, candidate snapshot out.
//!
//! Streams already on screen are placed first so they keep their head pipe
//! and back end. A stream whose surface set is unchanged is copied verbatim
//! and flagged `unchanged`; otherwise only its front-end chain is rebuilt.
//! New streams then take the lowest idle head pipe, and extra surfaces take
//! secondary pipes from the top of the pool down.
//!
//! Nothing here touches hardware beyond capability queries.

pub mod scaling;

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use dc_hal::{EngineId, PixelClockParams, PixelEncoding};

use crate::clock_source::{ClockRequirement, ClockSourceError};
use crate::config::DcConfig;
use crate::context::{
    PipeCtx, ResourceContext, StreamRequest, StreamStatus, ValidationContext,
};
use crate::error::{DcError, ResourceKind};
use crate::link::{decide_link_settings, Link};
use crate::pool::ResourcePool;
use crate::stream::Stream;
use crate::surface::Surface;

pub use scaling::build_scaler_data;

/// Inputs shared by every allocation step.
pub struct Allocator<'a> {
    pub pool: &'a ResourcePool,
    pub links: &'a [Link],
    pub config: &'a DcConfig,
    pub current: &'a ValidationContext,
    /// Ignore `unchanged` shortcuts; every pipe is rebuilt.
    pub force_full: bool,
}

impl Allocator<'_> {
    fn allow_sharing(&self) -> bool {
        !(self.config.disable_clock_sharing || self.pool.limits.disable_clock_sharing)
    }

    /// Build a complete candidate snapshot for `requests`.
    pub fn build(&self, requests: &[StreamRequest]) -> Result<ValidationContext, DcError> {
        self.check_requests(requests)?;

        let mut res = ResourceContext::new(self.pool);
        let mut heads: Vec<Option<usize>> = vec![None; requests.len()];

        // Streams already on screen keep their head pipe
        for (slot, req) in heads.iter_mut().zip(requests) {
            let Some(old_head) = self.current.res.head_for(&req.stream) else {
                continue;
            };
            let same_surfaces = !self.force_full
                && self
                    .current
                    .status_for(&req.stream)
                    .is_some_and(|s| same_surface_set(&s.surfaces, &req.surfaces));
            if same_surfaces {
                self.copy_chain(&mut res, old_head.index)?;
                log::debug!(
                    "[RESOURCE] stream {} unchanged on pipe {}",
                    req.stream.id().0,
                    old_head.index
                );
            } else {
                self.copy_head(&mut res, old_head)?;
            }
            *slot = Some(old_head.index);
        }

        for (slot, req) in heads.iter_mut().zip(requests) {
            if slot.is_none() {
                *slot = Some(self.acquire_head(&mut res, &req.stream)?);
            }
        }

        let mut streams = Vec::with_capacity(requests.len());
        for (slot, req) in heads.iter().zip(requests) {
            let head = slot.ok_or(DcError::InvalidPipeChain)?;
            let unchanged = res.pipes.get(head).is_some_and(|p| p.unchanged);
            if !unchanged {
                self.attach_surfaces(&mut res, head, &req.surfaces)?;
            }
            streams.push(StreamStatus {
                stream: req.stream.clone(),
                surfaces: req.surfaces.clone(),
                primary_pipe: head,
            });
        }

        Ok(ValidationContext { streams, res })
    }

    fn check_requests(&self, requests: &[StreamRequest]) -> Result<(), DcError> {
        for (i, req) in requests.iter().enumerate() {
            if req.stream.link() >= self.links.len() {
                return Err(DcError::LinkNotFound);
            }
            for other in &requests[..i] {
                if Arc::ptr_eq(&other.stream, &req.stream) {
                    return Err(DcError::DuplicateStream);
                }
                if other.stream.link() == req.stream.link() {
                    log::warn!(
                        "[RESOURCE] link {} requested by two streams",
                        req.stream.link()
                    );
                    return Err(DcError::DuplicateStream);
                }
            }
        }
        Ok(())
    }

    /// Take a pipe slot in `res`, refusing slots already claimed.
    fn claim(res: &mut ResourceContext, pipe: PipeCtx) -> Result<(), DcError> {
        let slot = res
            .pipes
            .get_mut(pipe.index)
            .ok_or(DcError::InvalidPipeChain)?;
        if slot.is_active() {
            return Err(DcError::InvalidPipeChain);
        }
        *slot = pipe;
        Ok(())
    }

    /// Reference the head's shared back-end resources in `res`.
    fn mark_back_end(&self, res: &mut ResourceContext, head: &PipeCtx) -> Result<(), DcError> {
        if let (Some(cs), Some(req)) = (head.clock_source, head.clock_requirement()) {
            res.clocks.retain(cs, &req)?;
        }
        if let Some(engine) = head.stream_enc {
            let pos = self.encoder_position(engine)?;
            res.stream_enc_used[pos] = true;
        }
        if let Some(audio) = head.audio {
            let pos = self
                .pool
                .audio_endpoints
                .iter()
                .position(|a| a.instance() == audio)
                .ok_or(DcError::MissingBlock)?;
            res.audio_used[pos] = true;
        }
        Ok(())
    }

    fn encoder_position(&self, engine: EngineId) -> Result<usize, DcError> {
        self.pool
            .stream_encoders
            .iter()
            .position(|s| s.engine() == engine)
            .ok_or(DcError::MissingBlock)
    }

    fn copy_chain(&self, res: &mut ResourceContext, head: usize) -> Result<(), DcError> {
        for index in self.current.res.chain(head) {
            let mut pipe = self
                .current
                .res
                .pipes
                .get(index)
                .cloned()
                .ok_or(DcError::InvalidPipeChain)?;
            pipe.unchanged = true;
            if index == head {
                self.mark_back_end(res, &pipe)?;
            }
            Self::claim(res, pipe)?;
        }
        Ok(())
    }

    fn copy_head(&self, res: &mut ResourceContext, old: &PipeCtx) -> Result<(), DcError> {
        let pipe = PipeCtx {
            surface: None,
            bottom_pipe: None,
            scaler: dc_hal::ScalerData::default(),
            unchanged: false,
            ..old.clone()
        };
        self.mark_back_end(res, &pipe)?;
        Self::claim(res, pipe)
    }

    fn pick_stream_encoder(
        &self,
        res: &ResourceContext,
        link: &Link,
    ) -> Result<Option<EngineId>, DcError> {
        let Some(encoder) = &link.encoder else {
            return Ok(None);
        };
        let preferred = encoder.preferred_engine();
        let free = |pos: &usize| !res.stream_enc_used.get(*pos).copied().unwrap_or(true);

        let pos = self
            .pool
            .stream_encoders
            .iter()
            .position(|s| s.engine() == preferred)
            .filter(free)
            .or_else(|| (0..self.pool.stream_encoders.len()).find(free))
            .ok_or(DcError::InsufficientResources(ResourceKind::StreamEncoder))?;
        Ok(self.pool.stream_encoders.get(pos).map(|s| s.engine()))
    }

    fn acquire_head(&self, res: &mut ResourceContext, stream: &Arc<Stream>) -> Result<usize, DcError> {
        let link = self
            .links
            .get(stream.link())
            .ok_or(DcError::LinkNotFound)?;
        let timing = stream.timing();
        let signal = stream.signal();

        if !link.validate_output(signal, timing) {
            log::debug!(
                "[RESOURCE] link {} rejects {} at {} kHz",
                link.index,
                signal.name(),
                timing.pix_clk_khz
            );
            return Err(DcError::EncoderValidationFailed);
        }
        let pix_clk_khz = stream.requested_pix_clk_khz();
        if pix_clk_khz > self.pool.limits.max_pix_clk_khz {
            return Err(DcError::PixelClockUnsupported);
        }

        let index = res
            .first_free_pipe(self.pool)
            .ok_or(DcError::InsufficientResources(ResourceKind::Pipe))?;
        let stream_enc = self.pick_stream_encoder(res, link)?;

        let audio = if stream.audio().is_some() {
            let pos = res.audio_used.iter().position(|used| !used);
            if pos.is_none() {
                log::warn!("[RESOURCE] no free audio endpoint for stream {}", stream.id().0);
            }
            pos.and_then(|p| self.pool.audio_endpoints.get(p))
                .map(|a| a.instance())
        } else {
            None
        };

        let link_settings = if signal.is_dp() {
            Some(
                decide_link_settings(&link.max_link, stream.bandwidth_kbps())
                    .ok_or(DcError::EncoderValidationFailed)?,
            )
        } else {
            None
        };

        let req = ClockRequirement {
            signal,
            pix_clk_khz,
            h_total: timing.h_total,
            v_total: timing.v_total,
        };
        let allow_sharing = self.allow_sharing();
        let clock_source = match res.clocks.acquire(&req, allow_sharing) {
            Ok(id) => id,
            Err(ClockSourceError::NotAvailable) if !allow_sharing => {
                log::warn!("[RESOURCE] PLLs exhausted with sharing disabled, sharing instead");
                res.clocks.acquire(&req, true)?
            }
            Err(e) => return Err(e.into()),
        };

        let pix_clk_params = PixelClockParams {
            requested_pix_clk_khz: pix_clk_khz,
            controller: index,
            signal: Some(signal),
            color_depth_bpc: timing.color_depth.bits_per_component(),
            ycbcr420: timing.pixel_encoding == PixelEncoding::YCbCr420,
            ss_enabled: false,
        };
        let pll_settings = self
            .pool
            .clock_source(clock_source)?
            .compute_pll_settings(&pix_clk_params)
            .ok_or(DcError::PixelClockUnsupported)?;

        let pipe = PipeCtx {
            index,
            stream: Some(stream.clone()),
            tg: index,
            opp: index,
            stream_enc,
            audio,
            clock_source: Some(clock_source),
            pix_clk_params,
            pll_settings,
            link_settings,
            ..PipeCtx::idle(index)
        };
        // Clock is already referenced above
        if let Some(engine) = stream_enc {
            let pos = self.encoder_position(engine)?;
            res.stream_enc_used[pos] = true;
        }
        if let Some(inst) = audio {
            if let Some(pos) = self
                .pool
                .audio_endpoints
                .iter()
                .position(|a| a.instance() == inst)
            {
                res.audio_used[pos] = true;
            }
        }
        Self::claim(res, pipe)?;

        log::debug!(
            "[RESOURCE] stream {} -> pipe {} ({}, {:?}, engine {:?}, audio {:?})",
            stream.id().0,
            index,
            signal.name(),
            clock_source,
            stream_enc,
            audio
        );
        Ok(index)
    }

    /// Free pipe for a surface beneath a head.
    ///
    /// Keeps the pipe that showed the same surface last time when possible,
    /// otherwise takes the highest eligible index.
    fn pick_secondary(&self, res: &ResourceContext, surface: &Surface) -> Result<usize, DcError> {
        let version = self.pool.version;
        let eligible: Vec<usize> = self
            .pool
            .pipes
            .iter()
            .filter(|slot| !res.pipes.get(slot.index).is_some_and(PipeCtx::is_active))
            .filter(|slot| version.is_dcn() || slot.underlay)
            .map(|slot| slot.index)
            .collect();
        if eligible.is_empty() {
            return Err(DcError::TooManySurfaces);
        }

        let fetchable: Vec<usize> = eligible
            .into_iter()
            .filter(|&i| {
                self.pool
                    .pipes
                    .get(i)
                    .is_some_and(|slot| slot.can_fetch(surface.format(), version))
            })
            .collect();

        let previous = fetchable.iter().copied().find(|&i| {
            self.current
                .res
                .pipes
                .get(i)
                .and_then(|p| p.surface.as_ref())
                .is_some_and(|s| s.id() == surface.id())
        });
        previous
            .or_else(|| fetchable.last().copied())
            .ok_or(DcError::SurfaceFormatUnsupported)
    }

    fn place_surface(
        &self,
        res: &mut ResourceContext,
        index: usize,
        surface: &Arc<Surface>,
    ) -> Result<(), DcError> {
        let slot = self.pool.slot(index)?;
        if !slot.can_fetch(surface.format(), self.pool.version) {
            return Err(DcError::SurfaceFormatUnsupported);
        }
        let pipe = res.pipes.get_mut(index).ok_or(DcError::InvalidPipeChain)?;
        let stream = pipe.stream.as_ref().ok_or(DcError::InvalidPipeChain)?;
        let mut scaler = build_scaler_data(surface, stream.timing());
        scaler.taps = slot
            .xfm
            .optimal_taps(&scaler)
            .ok_or(DcError::ScalingNotSupported)?;
        pipe.scaler = scaler;
        pipe.surface = Some(surface.clone());
        Ok(())
    }

    fn attach_surfaces(
        &self,
        res: &mut ResourceContext,
        head: usize,
        surfaces: &[Arc<Surface>],
    ) -> Result<(), DcError> {
        let Some((first, rest)) = surfaces.split_first() else {
            return Ok(());
        };
        self.place_surface(res, head, first)?;

        let head_pipe = res.pipes.get(head).cloned().ok_or(DcError::InvalidPipeChain)?;
        let mut tail = head;
        for surface in rest {
            let index = self.pick_secondary(res, surface)?;
            let pipe = PipeCtx {
                index,
                stream: head_pipe.stream.clone(),
                tg: head_pipe.tg,
                opp: head_pipe.opp,
                stream_enc: head_pipe.stream_enc,
                clock_source: head_pipe.clock_source,
                pix_clk_params: head_pipe.pix_clk_params,
                pll_settings: head_pipe.pll_settings,
                link_settings: head_pipe.link_settings,
                top_pipe: Some(tail),
                ..PipeCtx::idle(index)
            };
            Self::claim(res, pipe)?;
            if let Some(t) = res.pipes.get_mut(tail) {
                t.bottom_pipe = Some(index);
            }
            self.place_surface(res, index, surface)?;
            log::debug!(
                "[RESOURCE] surface {} -> pipe {} beneath pipe {}",
                surface.id().0,
                index,
                tail
            );
            tail = index;
        }
        Ok(())
    }
}

fn same_surface_set(a: &[Arc<Surface>], b: &[Arc<Surface>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
}
