//! Scaling parameters for one surface on one stream.

use dc_hal::{CrtcTiming, LbPixelDepth, Rect, ScalerData, ScalingRatios, SurfacePixelFormat};
use dc_utils::Fixed31_32;

use crate::surface::Surface;

fn ratio(src: u32, dst: u32) -> Fixed31_32 {
    if dst == 0 || src == 0 {
        Fixed31_32::ONE
    } else {
        Fixed31_32::from_fraction(i64::from(src), i64::from(dst))
    }
}

/// Viewport, recout and ratios; taps are left for the transform to choose.
pub fn build_scaler_data(surface: &Surface, timing: &CrtcTiming) -> ScalerData {
    let desc = surface.desc();
    let active = Rect::from_size(timing.h_addressable, timing.v_addressable);
    let clip = desc.clip_rect.unwrap_or(active).intersect(&active);
    let recout = desc.dst_rect.intersect(&clip);

    let (src_w, src_h) = if desc.rotation.swaps_axes() {
        (desc.src_rect.height, desc.src_rect.width)
    } else {
        (desc.src_rect.width, desc.src_rect.height)
    };
    let horz = ratio(src_w, desc.dst_rect.width);
    let vert = ratio(src_h, desc.dst_rect.height);

    // Source region that lands inside recout
    let skip_x = i64::from(recout.x) - i64::from(desc.dst_rect.x);
    let skip_y = i64::from(recout.y) - i64::from(desc.dst_rect.y);
    let viewport = Rect::new(
        desc.src_rect.x + horz.mul_int(skip_x).floor() as i32,
        desc.src_rect.y + vert.mul_int(skip_y).floor() as i32,
        (horz.mul_int(i64::from(recout.width)).ceil() as u32).min(src_w),
        (vert.mul_int(i64::from(recout.height)).ceil() as u32).min(src_h),
    );

    let half = Fixed31_32::from_fraction(1, 2);
    let (viewport_c, horz_c, vert_c) = if is_420(desc.format) {
        (
            Rect::new(
                viewport.x / 2,
                viewport.y / 2,
                viewport.width.div_ceil(2),
                viewport.height.div_ceil(2),
            ),
            horz * half,
            vert * half,
        )
    } else {
        (viewport, horz, vert)
    };

    ScalerData {
        viewport,
        viewport_c,
        recout,
        h_active: timing.h_addressable,
        v_active: timing.v_addressable,
        ratios: ScalingRatios {
            horz,
            vert,
            horz_c,
            vert_c,
        },
        taps: dc_hal::ScalingTaps::default(),
        lb_depth: LbPixelDepth::Bpp30,
    }
}

fn is_420(format: SurfacePixelFormat) -> bool {
    format.is_video()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{SurfaceDesc, SurfaceId};
    use dc_hal::{TIMING_1920X1080_60, TIMING_3840X2160_60};

    #[test]
    fn test_identity_scaling() {
        let s = Surface::new(
            SurfaceId(1),
            SurfaceDesc::fullscreen(SurfacePixelFormat::Argb8888, 1920, 1080, 0),
        );
        let data = build_scaler_data(&s, &TIMING_1920X1080_60);
        assert_eq!(data.ratios.horz, Fixed31_32::ONE);
        assert_eq!(data.recout, Rect::from_size(1920, 1080));
        assert_eq!(data.viewport, Rect::from_size(1920, 1080));
        assert!(!data.is_scaling());
    }

    #[test]
    fn test_upscale_1080p_to_4k() {
        let mut desc = SurfaceDesc::fullscreen(SurfacePixelFormat::Argb8888, 1920, 1080, 0);
        desc.dst_rect = Rect::from_size(3840, 2160);
        let s = Surface::new(SurfaceId(1), desc);
        let data = build_scaler_data(&s, &TIMING_3840X2160_60);
        assert_eq!(data.ratios.horz, Fixed31_32::from_fraction(1, 2));
        assert_eq!(data.viewport, Rect::from_size(1920, 1080));
        assert_eq!(data.recout, Rect::from_size(3840, 2160));
    }

    #[test]
    fn test_clipped_destination_shrinks_viewport() {
        let mut desc = SurfaceDesc::fullscreen(SurfacePixelFormat::Argb8888, 1920, 1080, 0);
        // Half of the plane hangs off the right edge
        desc.dst_rect = Rect::new(960, 0, 1920, 1080);
        let s = Surface::new(SurfaceId(1), desc);
        let data = build_scaler_data(&s, &TIMING_1920X1080_60);
        assert_eq!(data.recout, Rect::new(960, 0, 960, 1080));
        assert_eq!(data.viewport, Rect::new(0, 0, 960, 1080));
    }

    #[test]
    fn test_video_chroma_is_subsampled() {
        let s = Surface::new(
            SurfaceId(2),
            SurfaceDesc::fullscreen(SurfacePixelFormat::Nv12, 1280, 720, 0),
        );
        let mut desc = *s.desc();
        desc.dst_rect = Rect::from_size(1920, 1080);
        let s = Surface::new(SurfaceId(2), desc);
        let data = build_scaler_data(&s, &TIMING_1920X1080_60);
        assert_eq!(data.viewport_c, Rect::from_size(640, 360));
        assert!(data.ratios.horz_c < data.ratios.horz);
    }
}
