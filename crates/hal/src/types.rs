//! Plain data passed between the display core and hardware blocks.

use bitflags::bitflags;
use dc_utils::Fixed31_32;

/// Electrical/protocol signal carried by a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalType {
    None,
    DviSingleLink,
    DviDualLink,
    Hdmi,
    DisplayPort,
    DisplayPortMst,
    Edp,
    Lvds,
    Virtual,
}

impl SignalType {
    pub fn is_dp(self) -> bool {
        matches!(self, Self::DisplayPort | Self::DisplayPortMst | Self::Edp)
    }

    pub fn is_hdmi(self) -> bool {
        self == Self::Hdmi
    }

    pub fn is_dvi(self) -> bool {
        matches!(self, Self::DviSingleLink | Self::DviDualLink)
    }

    pub fn is_virtual(self) -> bool {
        self == Self::Virtual
    }

    /// Signals that can carry audio.
    pub fn has_audio(self) -> bool {
        self.is_hdmi() || matches!(self, Self::DisplayPort | Self::DisplayPortMst)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::DviSingleLink => "dvi-sl",
            Self::DviDualLink => "dvi-dl",
            Self::Hdmi => "hdmi",
            Self::DisplayPort => "dp",
            Self::DisplayPortMst => "dp-mst",
            Self::Edp => "edp",
            Self::Lvds => "lvds",
            Self::Virtual => "virtual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorDepth {
    Bpc6,
    Bpc8,
    Bpc10,
    Bpc12,
    Bpc16,
}

impl ColorDepth {
    pub fn bits_per_component(self) -> u32 {
        match self {
            Self::Bpc6 => 6,
            Self::Bpc8 => 8,
            Self::Bpc10 => 10,
            Self::Bpc12 => 12,
            Self::Bpc16 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelEncoding {
    Rgb,
    YCbCr422,
    YCbCr444,
    YCbCr420,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    SrgbLimited,
    YCbCr601,
    YCbCr709,
    YCbCr601Limited,
    YCbCr709Limited,
}

impl ColorSpace {
    pub fn is_ycbcr(self) -> bool {
        !matches!(self, Self::Srgb | Self::SrgbLimited)
    }
}

/// CRTC timing, in pixels/lines and kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrtcTiming {
    pub h_total: u32,
    pub h_addressable: u32,
    pub h_front_porch: u32,
    pub h_sync_width: u32,
    pub v_total: u32,
    pub v_addressable: u32,
    pub v_front_porch: u32,
    pub v_sync_width: u32,
    pub pix_clk_khz: u32,
    pub h_sync_positive: bool,
    pub v_sync_positive: bool,
    pub interlaced: bool,
    pub color_depth: ColorDepth,
    pub pixel_encoding: PixelEncoding,
}

impl CrtcTiming {
    /// Build a progressive RGB 8bpc timing from porch/sync widths.
    #[allow(clippy::too_many_arguments)]
    pub const fn progressive(
        h_active: u32,
        h_front_porch: u32,
        h_sync_width: u32,
        h_back_porch: u32,
        v_active: u32,
        v_front_porch: u32,
        v_sync_width: u32,
        v_back_porch: u32,
        pix_clk_khz: u32,
    ) -> Self {
        Self {
            h_total: h_active + h_front_porch + h_sync_width + h_back_porch,
            h_addressable: h_active,
            h_front_porch,
            h_sync_width,
            v_total: v_active + v_front_porch + v_sync_width + v_back_porch,
            v_addressable: v_active,
            v_front_porch,
            v_sync_width,
            pix_clk_khz,
            h_sync_positive: true,
            v_sync_positive: true,
            interlaced: false,
            color_depth: ColorDepth::Bpc8,
            pixel_encoding: PixelEncoding::Rgb,
        }
    }

    /// Refresh rate in millihertz.
    pub fn refresh_mhz(&self) -> u32 {
        let frame = u64::from(self.h_total) * u64::from(self.v_total);
        if frame == 0 {
            return 0;
        }
        (u64::from(self.pix_clk_khz) * 1_000_000 / frame) as u32
    }

    /// Refresh rate rounded to whole hertz.
    pub fn refresh_hz(&self) -> u32 {
        (self.refresh_mhz() + 500) / 1000
    }

    /// Duration of one frame in microseconds.
    pub fn frame_time_us(&self) -> u32 {
        let mhz = self.refresh_mhz();
        if mhz == 0 {
            return 0;
        }
        (1_000_000_000u64 / u64::from(mhz)) as u32
    }

    /// Duration of one line in nanoseconds.
    pub fn line_time_ns(&self) -> u32 {
        if self.pix_clk_khz == 0 {
            return 0;
        }
        (u64::from(self.h_total) * 1_000_000 / u64::from(self.pix_clk_khz)) as u32
    }

    /// Bits per pixel on the wire for this encoding and depth.
    pub fn bits_per_pixel(&self) -> u32 {
        let bpc = self.color_depth.bits_per_component();
        match self.pixel_encoding {
            PixelEncoding::Rgb | PixelEncoding::YCbCr444 => bpc * 3,
            PixelEncoding::YCbCr422 => bpc * 2,
            PixelEncoding::YCbCr420 => bpc * 3 / 2,
        }
    }

    /// Same scan geometry and pixel rate; two such timings can be frame-locked.
    pub fn is_synchronizable_with(&self, other: &Self) -> bool {
        self.h_total == other.h_total
            && self.v_total == other.v_total
            && self.h_addressable == other.h_addressable
            && self.v_addressable == other.v_addressable
            && self.pix_clk_khz == other.pix_clk_khz
            && self.interlaced == other.interlaced
    }
}

/// 640x480@60
pub const TIMING_640X480_60: CrtcTiming =
    CrtcTiming::progressive(640, 16, 96, 48, 480, 10, 2, 33, 25_175);
/// 1280x720@60
pub const TIMING_1280X720_60: CrtcTiming =
    CrtcTiming::progressive(1280, 110, 40, 220, 720, 5, 5, 20, 74_250);
/// 1920x1080@60
pub const TIMING_1920X1080_60: CrtcTiming =
    CrtcTiming::progressive(1920, 88, 44, 148, 1080, 4, 5, 36, 148_500);
/// 2560x1440@60 (reduced blanking)
pub const TIMING_2560X1440_60: CrtcTiming =
    CrtcTiming::progressive(2560, 48, 32, 80, 1440, 3, 5, 33, 241_500);
/// 3840x2160@60
pub const TIMING_3840X2160_60: CrtcTiming =
    CrtcTiming::progressive(3840, 176, 88, 296, 2160, 8, 10, 72, 594_000);

/// Look up one of the built-in timings by `WxH@R`.
pub fn standard_timing(width: u32, height: u32, refresh_hz: u32) -> Option<CrtcTiming> {
    [
        TIMING_640X480_60,
        TIMING_1280X720_60,
        TIMING_1920X1080_60,
        TIMING_2560X1440_60,
        TIMING_3840X2160_60,
    ]
    .into_iter()
    .find(|t| t.h_addressable == width && t.v_addressable == height && t.refresh_hz() == refresh_hz)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Overlap of two rectangles, empty when disjoint.
    pub fn intersect(&self, other: &Self) -> Self {
        let x = i64::from(self.x).max(i64::from(other.x));
        let y = i64::from(self.y).max(i64::from(other.y));
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        if r <= x || b <= y {
            return Self::new(x as i32, y as i32, 0, 0);
        }
        Self::new(x as i32, y as i32, (r - x) as u32, (b - y) as u32)
    }
}

/// Framebuffer pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfacePixelFormat {
    Argb1555,
    Rgb565,
    Argb8888,
    Abgr8888,
    Argb2101010,
    Abgr2101010,
    Fp16,
    /// Video formats start here.
    Nv12,
    Nv21,
    P010,
}

impl SurfacePixelFormat {
    /// Planar YUV formats fetched by video-capable pipes.
    pub fn is_video(self) -> bool {
        matches!(self, Self::Nv12 | Self::Nv21 | Self::P010)
    }

    /// Bytes per pixel of the (luma) plane.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Nv12 | Self::Nv21 => 1,
            Self::Argb1555 | Self::Rgb565 | Self::P010 => 2,
            Self::Argb8888 | Self::Abgr8888 | Self::Argb2101010 | Self::Abgr2101010 => 4,
            Self::Fp16 => 8,
        }
    }

    /// Average fetched bytes per pixel across all planes, in 1/2 byte units.
    pub fn fetch_half_bytes_per_pixel(self) -> u32 {
        match self {
            // 4:2:0 chroma adds half a luma sample per pixel
            Self::Nv12 | Self::Nv21 => 3,
            Self::P010 => 6,
            other => other.bytes_per_pixel() * 2,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            Self::Argb1555 | Self::Argb8888 | Self::Abgr8888 | Self::Argb2101010 | Self::Abgr2101010 | Self::Fp16
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TilingMode {
    Linear,
    /// Macro-tiled 2D layout.
    Tiled2d {
        num_banks: u8,
        bank_width: u8,
        bank_height: u8,
        tile_split: u16,
    },
}

impl TilingMode {
    pub fn is_linear(self) -> bool {
        self == Self::Linear
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Rotate90 | Self::Rotate270)
    }
}

/// Scan-out address of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneAddress {
    Graphics { addr: u64 },
    VideoProgressive { luma: u64, chroma: u64 },
}

impl PlaneAddress {
    pub fn primary(&self) -> u64 {
        match *self {
            Self::Graphics { addr } => addr,
            Self::VideoProgressive { luma, .. } => luma,
        }
    }
}

/// Surface fetch configuration for a memory-fetch unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub format: SurfacePixelFormat,
    pub tiling: TilingMode,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub rotation: Rotation,
    pub horizontal_mirror: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScalingTaps {
    pub h_taps: u8,
    pub v_taps: u8,
    pub h_taps_c: u8,
    pub v_taps_c: u8,
}

impl ScalingTaps {
    pub const fn uniform(taps: u8) -> Self {
        Self {
            h_taps: taps,
            v_taps: taps,
            h_taps_c: taps,
            v_taps_c: taps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScalingRatios {
    pub horz: Fixed31_32,
    pub vert: Fixed31_32,
    pub horz_c: Fixed31_32,
    pub vert_c: Fixed31_32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LbPixelDepth {
    Bpp18,
    Bpp24,
    #[default]
    Bpp30,
    Bpp36,
}

/// Everything a scaler needs for one pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScalerData {
    /// Source region fetched from the surface.
    pub viewport: Rect,
    /// Chroma viewport for planar formats.
    pub viewport_c: Rect,
    /// Destination region on the stream's active area.
    pub recout: Rect,
    pub h_active: u32,
    pub v_active: u32,
    pub ratios: ScalingRatios,
    pub taps: ScalingTaps,
    pub lb_depth: LbPixelDepth,
}

impl ScalerData {
    /// True when any axis scales.
    pub fn is_scaling(&self) -> bool {
        self.ratios.horz != Fixed31_32::ONE || self.ratios.vert != Fixed31_32::ONE
    }
}

/// One watermark set, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatermarkSet {
    pub urgent_ns: u32,
    pub stutter_exit_ns: u32,
    pub pstate_change_ns: u32,
}

/// Watermarks for the four clock states A..D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Watermarks {
    pub a: WatermarkSet,
    pub b: WatermarkSet,
    pub c: WatermarkSet,
    pub d: WatermarkSet,
}

impl Watermarks {
    /// Conservative marks that cannot underflow against any clock state.
    pub const SAFE: Self = Self::uniform(WatermarkSet {
        urgent_ns: 0x1F_FFFF,
        stutter_exit_ns: 0x1F_FFFF,
        pstate_change_ns: 0x1F_FFFF,
    });

    pub const fn uniform(set: WatermarkSet) -> Self {
        Self {
            a: set,
            b: set,
            c: set,
            d: set,
        }
    }

    pub fn is_safe(&self) -> bool {
        *self == Self::SAFE
    }
}

/// Blender mode between a pipe and the pipe beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    CurrentPipeOnly,
    OtherPipeOnly,
    Blending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClockSourceId {
    Pll(u8),
    DpDto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockSourceKind {
    Pll,
    DpDto,
}

/// Request handed to a clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelClockParams {
    pub requested_pix_clk_khz: u32,
    pub controller: usize,
    pub signal: Option<SignalType>,
    pub color_depth_bpc: u32,
    pub ycbcr420: bool,
    pub ss_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PllSettings {
    pub actual_pix_clk_khz: u32,
    pub adjusted_pix_clk_khz: u32,
    pub reference_divider: u32,
    pub feedback_divider: u32,
    pub fract_feedback_divider: u32,
    pub pix_clk_post_divider: u32,
}

/// Stream encoder engine (DIG front end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(pub u8);

impl EngineId {
    pub const VIRTUAL: Self = Self(0xFF);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkRate {
    /// 1.62 Gbps
    Rbr,
    /// 2.7 Gbps
    Hbr,
    /// 5.4 Gbps
    Hbr2,
    /// 8.1 Gbps
    Hbr3,
}

impl LinkRate {
    pub const ALL: [Self; 4] = [Self::Rbr, Self::Hbr, Self::Hbr2, Self::Hbr3];

    /// Raw lane rate in Mbps.
    pub fn lane_mbps(self) -> u32 {
        match self {
            Self::Rbr => 1620,
            Self::Hbr => 2700,
            Self::Hbr2 => 5400,
            Self::Hbr3 => 8100,
        }
    }

    /// DPCD link-rate code (multiples of 0.27 Gbps).
    pub fn dpcd_code(self) -> u8 {
        match self {
            Self::Rbr => 0x06,
            Self::Hbr => 0x0A,
            Self::Hbr2 => 0x14,
            Self::Hbr3 => 0x1E,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkSettings {
    pub lane_count: u8,
    pub link_rate: LinkRate,
}

impl LinkSettings {
    /// Payload bandwidth after 8b/10b coding, in kbps.
    pub fn payload_kbps(&self) -> u64 {
        u64::from(self.lane_count) * u64::from(self.link_rate.lane_mbps()) * 1000 * 8 / 10
    }
}

/// One secondary data packet / info frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InfoPacket {
    pub valid: bool,
    pub hb: [u8; 4],
    pub sb: [u8; 28],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InfoFrames {
    pub avi: InfoPacket,
    pub vendor: InfoPacket,
    pub spd: InfoPacket,
    pub gamut: InfoPacket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioOutput {
    pub channel_count: u8,
    pub sample_rate_hz: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegammaMode {
    Bypass,
    Srgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegammaMode {
    Bypass,
    Srgb,
}

/// Output formatter (bit-depth reduction and clamping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatterParams {
    pub color_depth: ColorDepth,
    pub pixel_encoding: PixelEncoding,
    pub spatial_dither: bool,
    pub truncate: bool,
    pub limited_range: bool,
}

/// 3x4 color matrix in S2.13 fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GamutRemap {
    pub enabled: bool,
    pub matrix: [i32; 12],
}

impl GamutRemap {
    pub const IDENTITY: Self = Self {
        enabled: false,
        matrix: [0x2000, 0, 0, 0, 0, 0x2000, 0, 0, 0, 0, 0x2000, 0],
    };
}

impl Default for GamutRemap {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorColorFormat {
    Mono,
    Color24,
    PreMultipliedAlpha,
    UnpreMultipliedAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorAttributes {
    pub address: u64,
    pub width: u32,
    pub height: u32,
    pub color_format: CursorColorFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPosition {
    pub x: u32,
    pub y: u32,
    pub x_hotspot: u32,
    pub y_hotspot: u32,
    pub enable: bool,
}

/// Variable refresh bounds, in lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrrParams {
    pub vertical_total_min: u32,
    pub vertical_total_max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrtcPosition {
    pub vertical_count: u32,
    pub horizontal_count: u32,
    pub frame_count: u32,
}

/// Global swap lock parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GslParams {
    pub group: u8,
    pub master: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerGatingAction {
    /// Gate the domain (power off).
    Enable,
    /// Ungate the domain (power on).
    Disable,
    /// Boot-time default programming.
    Init,
}

/// Power domains the core tracks with reference counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PowerDomain {
    /// DCE controller domain: timing generator plus its front end.
    Controller(usize),
    /// DCN fetch unit domain.
    Hubp(usize),
    /// DCN pixel processing domain.
    Dpp(usize),
}

bitflags! {
    /// Double-buffer lock bits of a timing generator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipeLockFlags: u8 {
        /// Graphics surface registers.
        const GRAPHICS = 1 << 0;
        /// Scaler registers.
        const SCALER   = 1 << 1;
        /// Blender registers.
        const BLENDER  = 1 << 2;
        /// Surface address update.
        const SURFACE  = 1 << 3;
        /// DCN master update lock covering the whole pipe.
        const OTG_MASTER = 1 << 4;
    }
}

impl PipeLockFlags {
    /// All DCE front-end double-buffer groups.
    pub const DCE_FRONT_END: Self = Self::GRAPHICS
        .union(Self::SCALER)
        .union(Self::BLENDER)
        .union(Self::SURFACE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_timings() {
        assert_eq!(TIMING_1920X1080_60.h_total, 2200);
        assert_eq!(TIMING_1920X1080_60.v_total, 1125);
        assert_eq!(TIMING_1920X1080_60.refresh_hz(), 60);
        assert_eq!(TIMING_3840X2160_60.refresh_hz(), 60);
        assert_eq!(standard_timing(1920, 1080, 60), Some(TIMING_1920X1080_60));
        assert_eq!(standard_timing(1920, 1080, 75), None);
    }

    #[test]
    fn test_frame_and_line_time() {
        let t = TIMING_1920X1080_60;
        assert_eq!(t.frame_time_us(), 16_666);
        // 2200 px at 148.5 MHz
        assert_eq!(t.line_time_ns(), 14_814);
        assert_eq!(t.bits_per_pixel(), 24);
    }

    #[test]
    fn test_rect_intersect() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 60, 100, 100);
        assert_eq!(a.intersect(&b), Rect::new(50, 60, 50, 40));
        assert!(a.intersect(&Rect::new(200, 200, 10, 10)).is_empty());
    }

    #[test]
    fn test_link_payload() {
        let ls = LinkSettings {
            lane_count: 4,
            link_rate: LinkRate::Hbr2,
        };
        assert_eq!(ls.payload_kbps(), 17_280_000);
    }

    #[test]
    fn test_signal_classes() {
        assert!(SignalType::Edp.is_dp());
        assert!(SignalType::DviDualLink.is_dvi());
        assert!(!SignalType::DviDualLink.has_audio());
        assert!(SignalType::Hdmi.has_audio());
    }
}
