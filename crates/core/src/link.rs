//! Connectors and their link encoders.

use alloc::sync::Arc;

use dc_hal::{CrtcTiming, LinkEncoder, LinkRate, LinkSettings, SignalType};

/// Physical connector behind a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorType {
    Hdmi,
    DisplayPort,
    Edp,
    /// Dual-link capable DVI-D.
    DviD,
    /// Single-link DVI.
    DviSingle,
    /// Software-only output with no encoder.
    Virtual,
}

impl ConnectorType {
    pub fn is_dp(self) -> bool {
        matches!(self, Self::DisplayPort | Self::Edp)
    }

    /// Signal the connector carries with no sink attached.
    pub fn native_signal(self) -> SignalType {
        match self {
            Self::Hdmi => SignalType::Hdmi,
            Self::DisplayPort => SignalType::DisplayPort,
            Self::Edp => SignalType::Edp,
            Self::DviD => SignalType::DviDualLink,
            Self::DviSingle => SignalType::DviSingleLink,
            Self::Virtual => SignalType::Virtual,
        }
    }
}

/// Board description of one link, supplied at [`crate::Dc::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkDesc {
    pub connector: ConnectorType,
    /// Highest lane count and rate the sink and board support (DP only).
    pub max_link: LinkSettings,
}

impl LinkDesc {
    pub const fn new(connector: ConnectorType) -> Self {
        Self {
            connector,
            max_link: LinkSettings {
                lane_count: 4,
                link_rate: LinkRate::Hbr2,
            },
        }
    }
}

pub struct Link {
    pub index: usize,
    pub connector: ConnectorType,
    pub max_link: LinkSettings,
    /// `None` for virtual links.
    pub encoder: Option<Arc<dyn LinkEncoder>>,
}

impl Link {
    /// Whether the link encoder accepts `signal` at `timing`.
    pub fn validate_output(&self, signal: SignalType, timing: &CrtcTiming) -> bool {
        match &self.encoder {
            Some(enc) => enc.validate_output_with_stream(signal, timing),
            None => signal.is_virtual(),
        }
    }
}

impl core::fmt::Debug for Link {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Link")
            .field("index", &self.index)
            .field("connector", &self.connector)
            .field("max_link", &self.max_link)
            .finish_non_exhaustive()
    }
}

/// Smallest link configuration whose payload covers `stream_kbps`.
///
/// Lane count is kept as low as possible; the rate is raised first.
pub fn decide_link_settings(max: &LinkSettings, stream_kbps: u64) -> Option<LinkSettings> {
    [1u8, 2, 4]
        .into_iter()
        .filter(|&lanes| lanes <= max.lane_count)
        .flat_map(|lane_count| {
            LinkRate::ALL
                .into_iter()
                .filter(|&rate| rate <= max.link_rate)
                .map(move |link_rate| LinkSettings {
                    lane_count,
                    link_rate,
                })
        })
        .find(|ls| ls.payload_kbps() >= stream_kbps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_hal::{TIMING_1920X1080_60, TIMING_3840X2160_60};

    fn stream_kbps(t: &CrtcTiming) -> u64 {
        u64::from(t.pix_clk_khz) * u64::from(t.bits_per_pixel())
    }

    #[test]
    fn test_1080p_fits_single_lane_hbr2() {
        let max = LinkDesc::new(ConnectorType::DisplayPort).max_link;
        let ls = decide_link_settings(&max, stream_kbps(&TIMING_1920X1080_60)).unwrap();
        // 148.5 MHz * 24 bpp = 3.564 Gbps
        assert_eq!(ls.lane_count, 1);
        assert_eq!(ls.link_rate, LinkRate::Hbr2);
    }

    #[test]
    fn test_4k_needs_four_lanes() {
        let max = LinkDesc::new(ConnectorType::DisplayPort).max_link;
        let ls = decide_link_settings(&max, stream_kbps(&TIMING_3840X2160_60)).unwrap();
        assert_eq!(ls.lane_count, 4);
        assert_eq!(ls.link_rate, LinkRate::Hbr2);
    }

    #[test]
    fn test_over_budget_has_no_settings() {
        let max = LinkSettings {
            lane_count: 2,
            link_rate: LinkRate::Hbr,
        };
        assert_eq!(
            decide_link_settings(&max, stream_kbps(&TIMING_3840X2160_60)),
            None
        );
    }
}
