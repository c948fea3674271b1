//! Shared harness for display core integration tests.
//!
//! Builds a [`Dc`] on top of [`MockHw`] and keeps a mark into the hardware
//! log so each test can inspect only the calls its own step produced.

#![allow(dead_code, clippy::expect_used)]

use std::sync::Arc;

use dc_core::{
    ConnectorType, Dc, DcConfig, DcInitData, DceVersion, LinkDesc, Sink, Stream, StreamRequest,
    Surface, SurfaceDesc,
};
use dc_hal::mock::{HwCall, MockHw};
use dc_hal::{CrtcTiming, SurfacePixelFormat};

pub struct Harness {
    pub hw: MockHw,
    pub dc: Dc,
    mark: usize,
    next_addr: u64,
}

impl Harness {
    pub fn new(version: DceVersion, connectors: &[ConnectorType]) -> Self {
        Self::with_config(version, connectors, DcConfig::default())
    }

    pub fn with_config(version: DceVersion, connectors: &[ConnectorType], config: DcConfig) -> Self {
        let hw = MockHw::default();
        let mut init = DcInitData::new(
            version,
            Arc::new(hw.clone()),
            connectors.iter().map(|c| LinkDesc::new(*c)).collect(),
        );
        init.config = config;
        let dc = Dc::create(init).expect("dc create");
        let mark = hw.log().len();
        Self {
            hw,
            dc,
            mark,
            next_addr: 0x1_0000_0000,
        }
    }

    /// A stream on `link` using the connector the link was created with.
    pub fn stream(&mut self, link: usize, timing: CrtcTiming) -> Arc<Stream> {
        let connector = self.dc.links()[link].connector;
        self.dc
            .create_stream_for_sink(Arc::new(Sink::new(link, connector)), timing)
    }

    pub fn surface(&mut self, format: SurfacePixelFormat, timing: &CrtcTiming) -> Arc<Surface> {
        let addr = self.next_addr;
        self.next_addr += 0x1000_0000;
        self.dc.create_surface(SurfaceDesc::fullscreen(
            format,
            timing.h_addressable,
            timing.v_addressable,
            addr,
        ))
    }

    /// Full-screen ARGB surface matching `timing`.
    pub fn graphics(&mut self, timing: &CrtcTiming) -> Arc<Surface> {
        self.surface(SurfacePixelFormat::Argb8888, timing)
    }

    /// Forget everything logged so far.
    pub fn mark(&mut self) {
        self.mark = self.hw.log().len();
    }

    /// Calls logged since the last [`Self::mark`].
    pub fn calls(&self) -> Vec<HwCall> {
        self.hw.log().since(self.mark)
    }

    pub fn count(&self, block: &str, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.block == block && c.op == op)
            .count()
    }

    /// Position of the first `block.op` since the mark.
    pub fn position(&self, block: &str, op: &str) -> Option<usize> {
        self.calls()
            .iter()
            .position(|c| c.block == block && c.op == op)
    }

    pub fn commit(&mut self, requests: &[StreamRequest]) {
        self.dc.commit(requests).expect("commit");
    }
}

pub fn request(stream: &Arc<Stream>, surfaces: &[&Arc<Surface>]) -> StreamRequest {
    StreamRequest::new(
        stream.clone(),
        surfaces.iter().map(|s| Arc::clone(s)).collect(),
    )
}

pub const HDMI_X6: [ConnectorType; 6] = [ConnectorType::Hdmi; 6];
