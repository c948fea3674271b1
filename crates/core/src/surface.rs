//! Surfaces and update classification.

use bitflags::bitflags;
use dc_hal::{PlaneAddress, Rect, Rotation, SurfacePixelFormat, TilingMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

/// Everything needed to create a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub format: SurfacePixelFormat,
    pub tiling: TilingMode,
    /// Allocated size of the framebuffer.
    pub width: u32,
    pub height: u32,
    /// Pitch in pixels.
    pub pitch: u32,
    /// Region of the framebuffer to show.
    pub src_rect: Rect,
    /// Where `src_rect` lands on the stream, before clipping.
    pub dst_rect: Rect,
    /// Visible region on the stream; `None` means the whole stream.
    pub clip_rect: Option<Rect>,
    pub address: PlaneAddress,
    pub visible: bool,
    pub rotation: Rotation,
    pub horizontal_mirror: bool,
    pub per_pixel_alpha: bool,
    pub flip_immediate: bool,
}

impl SurfaceDesc {
    /// Full-screen linear surface of `width` x `height`.
    pub fn fullscreen(format: SurfacePixelFormat, width: u32, height: u32, addr: u64) -> Self {
        let address = if format.is_video() {
            PlaneAddress::VideoProgressive {
                luma: addr,
                chroma: addr + u64::from(width) * u64::from(height),
            }
        } else {
            PlaneAddress::Graphics { addr }
        };
        Self {
            format,
            tiling: TilingMode::Linear,
            width,
            height,
            pitch: width,
            src_rect: Rect::from_size(width, height),
            dst_rect: Rect::from_size(width, height),
            clip_rect: None,
            address,
            visible: true,
            rotation: Rotation::Rotate0,
            horizontal_mirror: false,
            per_pixel_alpha: format.has_alpha(),
            flip_immediate: false,
        }
    }
}

/// A framebuffer composited onto a stream. Identity is the `Arc`; a flip
/// yields a new handle with the same [`SurfaceId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    id: SurfaceId,
    desc: SurfaceDesc,
}

bitflags! {
    /// What changed between two versions of a surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SurfaceUpdateFlags: u16 {
        const ADDRESS     = 1 << 0;
        const FLIP_MODE   = 1 << 1;
        const SCALING     = 1 << 2;
        const VISIBILITY  = 1 << 3;
        const ALPHA       = 1 << 4;
        const FORMAT      = 1 << 5;
        const TILING      = 1 << 6;
        const SIZE        = 1 << 7;
        const ROTATION    = 1 << 8;
        /// Blending partner beneath this pipe changed.
        const CHAIN       = 1 << 9;
    }
}

/// How much of a pipe's front end must be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateType {
    /// Nothing to write.
    None,
    /// Scan-out address only. Needs no pipe lock.
    Fast,
    /// Scaler, blend and address.
    Medium,
    /// Whole front end.
    Full,
}

impl SurfaceUpdateFlags {
    pub fn update_type(self) -> UpdateType {
        if self.is_empty() {
            UpdateType::None
        } else if self.intersects(Self::FORMAT | Self::TILING | Self::SIZE | Self::ROTATION) {
            UpdateType::Full
        } else if self.intersects(Self::SCALING | Self::VISIBILITY | Self::ALPHA | Self::CHAIN) {
            UpdateType::Medium
        } else {
            UpdateType::Fast
        }
    }
}

impl Surface {
    pub(crate) fn new(id: SurfaceId, desc: SurfaceDesc) -> Self {
        Self { id, desc }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn desc(&self) -> &SurfaceDesc {
        &self.desc
    }

    pub fn format(&self) -> SurfacePixelFormat {
        self.desc.format
    }

    pub fn address(&self) -> PlaneAddress {
        self.desc.address
    }

    pub fn is_visible(&self) -> bool {
        self.desc.visible
    }

    /// Same surface scanning out from `address`.
    #[must_use]
    pub fn with_address(&self, address: PlaneAddress, flip_immediate: bool) -> Self {
        let mut desc = self.desc;
        desc.address = address;
        desc.flip_immediate = flip_immediate;
        Self { id: self.id, desc }
    }

    /// Fields that differ from `old`.
    pub fn changes_from(&self, old: &Surface) -> SurfaceUpdateFlags {
        let (a, b) = (&self.desc, &old.desc);
        let mut flags = SurfaceUpdateFlags::empty();
        flags.set(SurfaceUpdateFlags::ADDRESS, a.address != b.address);
        flags.set(SurfaceUpdateFlags::FLIP_MODE, a.flip_immediate != b.flip_immediate);
        flags.set(
            SurfaceUpdateFlags::SCALING,
            a.src_rect != b.src_rect || a.dst_rect != b.dst_rect || a.clip_rect != b.clip_rect,
        );
        flags.set(SurfaceUpdateFlags::VISIBILITY, a.visible != b.visible);
        flags.set(SurfaceUpdateFlags::ALPHA, a.per_pixel_alpha != b.per_pixel_alpha);
        flags.set(SurfaceUpdateFlags::FORMAT, a.format != b.format);
        flags.set(SurfaceUpdateFlags::TILING, a.tiling != b.tiling);
        flags.set(
            SurfaceUpdateFlags::SIZE,
            a.width != b.width || a.height != b.height || a.pitch != b.pitch,
        );
        flags.set(
            SurfaceUpdateFlags::ROTATION,
            a.rotation != b.rotation || a.horizontal_mirror != b.horizontal_mirror,
        );
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Surface {
        Surface::new(
            SurfaceId(1),
            SurfaceDesc::fullscreen(SurfacePixelFormat::Argb8888, 1920, 1080, 0x1000_0000),
        )
    }

    #[test]
    fn test_address_only_is_fast() {
        let a = base();
        let b = a.with_address(PlaneAddress::Graphics { addr: 0x2000_0000 }, false);
        assert_eq!(b.id(), a.id());
        assert_eq!(b.changes_from(&a), SurfaceUpdateFlags::ADDRESS);
        assert_eq!(b.changes_from(&a).update_type(), UpdateType::Fast);
        assert_eq!(a.changes_from(&a).update_type(), UpdateType::None);
    }

    #[test]
    fn test_scaling_is_medium() {
        let a = base();
        let mut desc = *a.desc();
        desc.dst_rect = Rect::new(100, 100, 960, 540);
        let b = Surface::new(SurfaceId(1), desc);
        assert_eq!(b.changes_from(&a).update_type(), UpdateType::Medium);
    }

    #[test]
    fn test_format_is_full() {
        let a = base();
        let mut desc = *a.desc();
        desc.format = SurfacePixelFormat::Argb2101010;
        desc.address = PlaneAddress::Graphics { addr: 0x3000_0000 };
        let b = Surface::new(SurfaceId(1), desc);
        assert_eq!(b.changes_from(&a).update_type(), UpdateType::Full);
    }

    #[test]
    fn test_chain_flag_forces_medium() {
        assert_eq!(
            (SurfaceUpdateFlags::ADDRESS | SurfaceUpdateFlags::CHAIN).update_type(),
            UpdateType::Medium
        );
    }
}
