//! Pipe, resource and validation contexts.
//!
//! A [`ValidationContext`] is a complete snapshot of what the hardware should
//! show. Pipe contexts live in one arena per snapshot and reference their
//! chain neighbours by index. Snapshots are rebuilt by every validation and
//! never mutated once committed, except for surface handles swapped in by
//! the flip fast path.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use dc_hal::{ClockSourceId, EngineId, LinkSettings, PixelClockParams, PllSettings, ScalerData};

use crate::bandwidth::BandwidthResult;
use crate::clock_source::{ClockRequirement, ClockSourceRegistry};
use crate::pool::ResourcePool;
use crate::stream::Stream;
use crate::surface::Surface;

/// One stream with the surfaces to show on it, top first.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub stream: Arc<Stream>,
    pub surfaces: Vec<Arc<Surface>>,
}

impl StreamRequest {
    pub fn new(stream: Arc<Stream>, surfaces: Vec<Arc<Surface>>) -> Self {
        Self { stream, surfaces }
    }
}

/// Block assignment for one pipe slot.
#[derive(Debug, Clone, Default)]
pub struct PipeCtx {
    /// Slot index in the pool; also the front-end block instance.
    pub index: usize,
    pub stream: Option<Arc<Stream>>,
    pub surface: Option<Arc<Surface>>,
    /// Timing generator driving this pipe (the head's slot).
    pub tg: usize,
    /// Output pixel processor feeding the encoder (the head's slot).
    pub opp: usize,
    pub stream_enc: Option<EngineId>,
    pub audio: Option<usize>,
    pub clock_source: Option<ClockSourceId>,
    pub top_pipe: Option<usize>,
    pub bottom_pipe: Option<usize>,
    pub scaler: ScalerData,
    pub pix_clk_params: PixelClockParams,
    pub pll_settings: PllSettings,
    pub link_settings: Option<LinkSettings>,
    /// Copied verbatim from the current context; nothing to program.
    pub unchanged: bool,
}

impl PipeCtx {
    pub fn idle(index: usize) -> Self {
        Self {
            index,
            tg: index,
            opp: index,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Owns the timing generator and back end.
    pub fn is_head(&self) -> bool {
        self.stream.is_some() && self.top_pipe.is_none()
    }

    pub fn is_visible(&self) -> bool {
        self.surface.as_ref().is_some_and(|s| s.is_visible())
    }

    pub fn same_stream(&self, other: &PipeCtx) -> bool {
        match (&self.stream, &other.stream) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn clock_requirement(&self) -> Option<ClockRequirement> {
        self.stream.as_ref().map(|s| ClockRequirement {
            signal: s.signal(),
            pix_clk_khz: s.requested_pix_clk_khz(),
            h_total: s.timing().h_total,
            v_total: s.timing().v_total,
        })
    }
}

/// Whether the back end of `new` differs from `old` enough that the old
/// head must be torn down first.
///
/// Compares sink, signal, audio, timing (including depth and encoding),
/// clock source and stream encoder.
pub fn needs_reprogram(old: &PipeCtx, new: &PipeCtx) -> bool {
    let (Some(old_stream), Some(new_stream)) = (&old.stream, &new.stream) else {
        return old.stream.is_some();
    };
    let resources_changed = old.clock_source != new.clock_source
        || old.stream_enc != new.stream_enc
        || old.audio != new.audio;
    if Arc::ptr_eq(old_stream, new_stream) {
        return resources_changed;
    }
    let sink_changed = !Arc::ptr_eq(old_stream.sink(), new_stream.sink())
        && **old_stream.sink() != **new_stream.sink();
    sink_changed
        || resources_changed
        || old_stream.signal() != new_stream.signal()
        || old_stream.audio() != new_stream.audio()
        || old_stream.timing() != new_stream.timing()
}

/// All pipe assignments plus per-snapshot bookkeeping.
#[derive(Debug, Clone)]
pub struct ResourceContext {
    pub pipes: Vec<PipeCtx>,
    pub clocks: ClockSourceRegistry,
    /// Indexed by pool position.
    pub stream_enc_used: Vec<bool>,
    /// Indexed by pool position.
    pub audio_used: Vec<bool>,
    pub bandwidth: Option<BandwidthResult>,
}

impl ResourceContext {
    pub fn new(pool: &ResourcePool) -> Self {
        Self {
            pipes: (0..pool.pipe_count()).map(PipeCtx::idle).collect(),
            clocks: ClockSourceRegistry::new(&pool.clock_source_ids()),
            stream_enc_used: vec![false; pool.stream_encoders.len()],
            audio_used: vec![false; pool.audio_endpoints.len()],
            bandwidth: None,
        }
    }

    pub fn heads(&self) -> impl Iterator<Item = &PipeCtx> {
        self.pipes.iter().filter(|p| p.is_head())
    }

    pub fn active(&self) -> impl Iterator<Item = &PipeCtx> {
        self.pipes.iter().filter(|p| p.is_active())
    }

    /// Head pipe of `stream`.
    pub fn head_for(&self, stream: &Arc<Stream>) -> Option<&PipeCtx> {
        self.heads()
            .find(|p| p.stream.as_ref().is_some_and(|s| Arc::ptr_eq(s, stream)))
    }

    /// Indices from `head` down the bottom-pipe links.
    ///
    /// Stops at the pool size so a corrupt cycle cannot loop forever.
    pub fn chain(&self, head: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cur = Some(head);
        while let Some(i) = cur {
            if out.len() >= self.pipes.len() {
                break;
            }
            out.push(i);
            cur = self.pipes.get(i).and_then(|p| p.bottom_pipe);
        }
        out
    }

    /// Whether the pipe directly beneath `pipe` shows something.
    pub fn bottom_visible(&self, pipe: &PipeCtx) -> bool {
        pipe.bottom_pipe
            .and_then(|b| self.pipes.get(b))
            .is_some_and(PipeCtx::is_visible)
    }

    /// Any pipe in `head`'s chain shows something.
    pub fn chain_visible(&self, head: usize) -> bool {
        self.chain(head)
            .into_iter()
            .any(|i| self.pipes.get(i).is_some_and(PipeCtx::is_visible))
    }

    pub fn first_free_pipe(&self, pool: &ResourcePool) -> Option<usize> {
        self.pipes
            .iter()
            .zip(&pool.pipes)
            .find(|(p, slot)| !p.is_active() && slot.tg.is_some())
            .map(|(p, _)| p.index)
    }
}

/// Status of one stream in a snapshot.
#[derive(Debug, Clone)]
pub struct StreamStatus {
    pub stream: Arc<Stream>,
    pub surfaces: Vec<Arc<Surface>>,
    pub primary_pipe: usize,
}

/// A complete candidate (or current) hardware snapshot.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub streams: Vec<StreamStatus>,
    pub res: ResourceContext,
}

impl ValidationContext {
    pub fn empty(pool: &ResourcePool) -> Self {
        Self {
            streams: Vec::new(),
            res: ResourceContext::new(pool),
        }
    }

    pub fn status_for(&self, stream: &Arc<Stream>) -> Option<&StreamStatus> {
        self.streams.iter().find(|s| Arc::ptr_eq(&s.stream, stream))
    }

    /// Whether this snapshot already shows exactly `requests`.
    pub fn matches(&self, requests: &[StreamRequest]) -> bool {
        self.streams.len() == requests.len()
            && self.streams.iter().zip(requests).all(|(cur, req)| {
                Arc::ptr_eq(&cur.stream, &req.stream)
                    && cur.surfaces.len() == req.surfaces.len()
                    && cur
                        .surfaces
                        .iter()
                        .zip(&req.surfaces)
                        .all(|(a, b)| Arc::ptr_eq(a, b))
            })
    }

    /// Rebuild the request list this snapshot was created from.
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.streams
            .iter()
            .map(|s| StreamRequest::new(s.stream.clone(), s.surfaces.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ConnectorType;
    use crate::stream::{Sink, StreamDesc, StreamId};
    use dc_hal::{SignalType, TIMING_1280X720_60, TIMING_1920X1080_60};

    fn stream(timing: dc_hal::CrtcTiming) -> Arc<Stream> {
        let sink = Arc::new(Sink::new(0, ConnectorType::Hdmi));
        Arc::new(Stream::new(StreamId(1), StreamDesc::new(sink, timing)))
    }

    fn head(s: &Arc<Stream>) -> PipeCtx {
        PipeCtx {
            stream: Some(s.clone()),
            clock_source: Some(ClockSourceId::Pll(0)),
            stream_enc: Some(EngineId(0)),
            ..PipeCtx::idle(0)
        }
    }

    #[test]
    fn test_same_stream_same_resources_is_kept() {
        let s = stream(TIMING_1920X1080_60);
        assert!(!needs_reprogram(&head(&s), &head(&s)));
    }

    #[test]
    fn test_timing_change_reprograms() {
        let a = head(&stream(TIMING_1920X1080_60));
        let b = head(&stream(TIMING_1280X720_60));
        assert!(needs_reprogram(&a, &b));
    }

    #[test]
    fn test_equal_content_new_handle_is_kept() {
        let a = head(&stream(TIMING_1920X1080_60));
        let b = head(&stream(TIMING_1920X1080_60));
        assert!(!needs_reprogram(&a, &b));
    }

    #[test]
    fn test_clock_source_change_reprograms() {
        let s = stream(TIMING_1920X1080_60);
        let a = head(&s);
        let mut b = head(&s);
        b.clock_source = Some(ClockSourceId::Pll(1));
        assert!(needs_reprogram(&a, &b));
    }

    #[test]
    fn test_removed_stream_reprograms() {
        let a = head(&stream(TIMING_1920X1080_60));
        assert!(needs_reprogram(&a, &PipeCtx::idle(0)));
        assert!(!needs_reprogram(&PipeCtx::idle(0), &a));
    }

    #[test]
    fn test_signal_change_reprograms() {
        let sink = Arc::new(Sink::new(0, ConnectorType::Hdmi));
        let mut desc = StreamDesc::new(sink.clone(), TIMING_1920X1080_60);
        desc.signal = Some(SignalType::DviSingleLink);
        let dvi = Arc::new(Stream::new(StreamId(2), desc));
        let hdmi = Arc::new(Stream::new(
            StreamId(3),
            StreamDesc::new(sink, TIMING_1920X1080_60),
        ));
        assert!(needs_reprogram(&head(&hdmi), &head(&dvi)));
    }

    #[test]
    fn test_chain_walk() {
        let s = stream(TIMING_1920X1080_60);
        let mut res_pipes: Vec<PipeCtx> = (0..4).map(PipeCtx::idle).collect();
        res_pipes[0] = PipeCtx {
            bottom_pipe: Some(3),
            ..head(&s)
        };
        res_pipes[3] = PipeCtx {
            stream: Some(s.clone()),
            top_pipe: Some(0),
            tg: 0,
            opp: 0,
            ..PipeCtx::idle(3)
        };
        let ctx = ResourceContext {
            pipes: res_pipes,
            clocks: ClockSourceRegistry::new(&[ClockSourceId::DpDto]),
            stream_enc_used: Vec::new(),
            audio_used: Vec::new(),
            bandwidth: None,
        };
        assert_eq!(ctx.chain(0), vec![0, 3]);
        assert_eq!(ctx.heads().count(), 1);
        assert_eq!(ctx.active().count(), 2);
        assert!(!ctx.chain_visible(0));
    }
}
