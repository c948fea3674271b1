//! Streams: one output timing driven over one link.

use alloc::sync::Arc;

use dc_hal::{AudioOutput, ColorDepth, ColorSpace, CrtcTiming, InfoFrames, PixelEncoding, SignalType};

use crate::link::ConnectorType;

/// A display attached to a link, as identified from its EDID/DPCD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sink {
    pub link: usize,
    pub connector: ConnectorType,
    /// Sink speaks HDMI rather than plain DVI over a TMDS connector.
    pub hdmi_capable: bool,
    pub audio: Option<AudioOutput>,
}

impl Sink {
    pub fn new(link: usize, connector: ConnectorType) -> Self {
        Self {
            link,
            connector,
            hdmi_capable: connector == ConnectorType::Hdmi,
            audio: None,
        }
    }

    #[must_use]
    pub fn with_audio(mut self, audio: AudioOutput) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Signal used to drive `timing` on this sink.
    ///
    /// DVI falls over to dual link above the single-link TMDS limit.
    pub fn signal_for(&self, timing: &CrtcTiming) -> SignalType {
        match self.connector {
            ConnectorType::Hdmi if self.hdmi_capable => SignalType::Hdmi,
            ConnectorType::DviD if timing.pix_clk_khz > DVI_SINGLE_LINK_MAX_KHZ => {
                SignalType::DviDualLink
            }
            ConnectorType::Hdmi | ConnectorType::DviSingle | ConnectorType::DviD => {
                SignalType::DviSingleLink
            }
            ConnectorType::DisplayPort => SignalType::DisplayPort,
            ConnectorType::Edp => SignalType::Edp,
            ConnectorType::Virtual => SignalType::Virtual,
        }
    }
}

/// Single-link TMDS ceiling.
pub const DVI_SINGLE_LINK_MAX_KHZ: u32 = 165_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

/// Everything needed to create a stream.
#[derive(Debug, Clone)]
pub struct StreamDesc {
    pub sink: Arc<Sink>,
    pub timing: CrtcTiming,
    pub output_color_space: ColorSpace,
    /// Overrides the sink's signal when set.
    pub signal: Option<SignalType>,
    pub audio: Option<AudioOutput>,
    pub info_frames: InfoFrames,
}

impl StreamDesc {
    pub fn new(sink: Arc<Sink>, timing: CrtcTiming) -> Self {
        let audio = sink.audio;
        Self {
            sink,
            timing,
            output_color_space: ColorSpace::Srgb,
            signal: None,
            audio,
            info_frames: InfoFrames::default(),
        }
    }
}

/// An output timing bound to a sink. Identity is the `Arc`.
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    sink: Arc<Sink>,
    signal: SignalType,
    timing: CrtcTiming,
    output_color_space: ColorSpace,
    audio: Option<AudioOutput>,
    info_frames: InfoFrames,
}

impl Stream {
    pub(crate) fn new(id: StreamId, desc: StreamDesc) -> Self {
        let signal = desc.signal.unwrap_or_else(|| desc.sink.signal_for(&desc.timing));
        // Audio rides only on signals that carry it
        let audio = desc.audio.filter(|_| signal.has_audio());
        Self {
            id,
            sink: desc.sink,
            signal,
            timing: desc.timing,
            output_color_space: desc.output_color_space,
            audio,
            info_frames: desc.info_frames,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn sink(&self) -> &Arc<Sink> {
        &self.sink
    }

    pub fn link(&self) -> usize {
        self.sink.link
    }

    pub fn signal(&self) -> SignalType {
        self.signal
    }

    pub fn timing(&self) -> &CrtcTiming {
        &self.timing
    }

    pub fn output_color_space(&self) -> ColorSpace {
        self.output_color_space
    }

    pub fn audio(&self) -> Option<&AudioOutput> {
        self.audio.as_ref()
    }

    pub fn info_frames(&self) -> &InfoFrames {
        &self.info_frames
    }

    /// Wire bandwidth of the active stream in kbps.
    pub fn bandwidth_kbps(&self) -> u64 {
        u64::from(self.timing.pix_clk_khz) * u64::from(self.timing.bits_per_pixel())
    }

    /// Pixel clock the PLL must generate.
    ///
    /// HDMI deep color raises the TMDS rate by bpc/8; 4:2:0 halves it.
    pub fn requested_pix_clk_khz(&self) -> u32 {
        let mut khz = self.timing.pix_clk_khz;
        if self.signal.is_hdmi() {
            khz = match self.timing.color_depth {
                ColorDepth::Bpc10 => khz * 5 / 4,
                ColorDepth::Bpc12 => khz * 3 / 2,
                ColorDepth::Bpc16 => khz * 2,
                ColorDepth::Bpc6 | ColorDepth::Bpc8 => khz,
            };
        }
        if self.timing.pixel_encoding == PixelEncoding::YCbCr420 {
            khz /= 2;
        }
        khz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_hal::{TIMING_1920X1080_60, TIMING_2560X1440_60, TIMING_3840X2160_60};

    #[test]
    fn test_dvi_dual_link_above_165mhz() {
        let sink = Sink::new(0, ConnectorType::DviD);
        assert_eq!(sink.signal_for(&TIMING_1920X1080_60), SignalType::DviSingleLink);
        assert_eq!(sink.signal_for(&TIMING_2560X1440_60), SignalType::DviDualLink);
    }

    #[test]
    fn test_hdmi_connector_with_dvi_sink() {
        let mut sink = Sink::new(0, ConnectorType::Hdmi);
        sink.hdmi_capable = false;
        assert_eq!(sink.signal_for(&TIMING_1920X1080_60), SignalType::DviSingleLink);
    }

    #[test]
    fn test_deep_color_and_420_adjustment() {
        let sink = Arc::new(Sink::new(0, ConnectorType::Hdmi));
        let mut desc = StreamDesc::new(sink.clone(), TIMING_1920X1080_60);
        desc.timing.color_depth = ColorDepth::Bpc12;
        let s = Stream::new(StreamId(1), desc);
        assert_eq!(s.requested_pix_clk_khz(), 222_750);

        let mut desc = StreamDesc::new(sink, TIMING_3840X2160_60);
        desc.timing.pixel_encoding = PixelEncoding::YCbCr420;
        let s = Stream::new(StreamId(2), desc);
        assert_eq!(s.requested_pix_clk_khz(), 297_000);
    }

    #[test]
    fn test_audio_dropped_on_dvi() {
        let audio = AudioOutput {
            channel_count: 2,
            sample_rate_hz: 48_000,
        };
        let sink = Arc::new(Sink::new(0, ConnectorType::DviD).with_audio(audio));
        let s = Stream::new(StreamId(1), StreamDesc::new(sink, TIMING_1920X1080_60));
        assert!(s.audio().is_none());

        let sink = Arc::new(Sink::new(1, ConnectorType::Hdmi).with_audio(audio));
        let s = Stream::new(StreamId(2), StreamDesc::new(sink, TIMING_1920X1080_60));
        assert_eq!(s.audio(), Some(&audio));
    }
}
