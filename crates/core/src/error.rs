//! Display core error taxonomy.

use core::fmt;

use dc_error::define_dc_error;
use dc_hal::HwError;

use crate::clock_source::ClockSourceError;

/// Resource the allocator ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pipe,
    StreamEncoder,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipe => f.write_str("pipe"),
            Self::StreamEncoder => f.write_str("stream encoder"),
        }
    }
}

define_dc_error! {
    /// Errors returned by validation and commit.
    pub enum DcError(0x30) {
        /// No free block of the given kind
        InsufficientResources(ResourceKind) = 0x01 [ResourceExhaustion] => "Insufficient resources",
        /// Every PLL is busy with an incompatible stream
        ClockSourceUnavailable = 0x02 [ResourceExhaustion] => "No clock source available",
        /// Link encoder cannot carry the signal at this timing
        EncoderValidationFailed = 0x03 [CapabilityMismatch] => "Encoder cannot drive stream",
        /// Pixel clock beyond PLL or ASIC limits
        PixelClockUnsupported = 0x04 [CapabilityMismatch] => "Pixel clock unsupported",
        /// Scaler cannot realise the requested ratio
        ScalingNotSupported = 0x05 [CapabilityMismatch] => "Scaling not supported",
        /// No free pipe can fetch this pixel format
        SurfaceFormatUnsupported = 0x06 [CapabilityMismatch] => "Surface format unsupported",
        /// More surfaces than free pipes
        TooManySurfaces = 0x07 [ResourceExhaustion] => "Too many surfaces",
        /// The same stream appears twice in one request
        DuplicateStream = 0x08 [CapabilityMismatch] => "Duplicate stream",
        /// Stream references a connector that does not exist
        LinkNotFound = 0x09 [CapabilityMismatch] => "Link not found",
        /// Cursor larger than the hardware supports
        CursorTooLarge = 0x0A [CapabilityMismatch] => "Cursor too large",
        /// Stream is not part of the current context
        StreamNotFound = 0x0B [CapabilityMismatch] => "Stream not committed",
        /// Surface is not part of the current context
        SurfaceNotFound = 0x0C [CapabilityMismatch] => "Surface not committed",
        /// Memory bandwidth budget exceeded
        BandwidthExceeded = 0x10 [BandwidthExceeded] => "Bandwidth exceeded",
        /// Required display clock above the maximum
        DisplayClockExceeded = 0x11 [BandwidthExceeded] => "Display clock exceeded",
        /// Hardware or firmware did not acknowledge a step
        HwAck(HwError) = 0x20 [HardwareAck] => "Hardware acknowledgment failed",
        /// Timing generator never reported blank
        BlankTimeout = 0x30 [Internal] => "Timing generator blank timeout",
        /// Clock source bookkeeping broken
        ClockSource(ClockSourceError) = 0x31 [Internal] => "Clock source invariant violated",
        /// Pool has no block where a pipe context expects one
        MissingBlock = 0x32 [Internal] => "Missing hardware block",
        /// Pipe chain links are inconsistent
        InvalidPipeChain = 0x33 [Internal] => "Invalid pipe chain",
    }
}

impl From<HwError> for DcError {
    fn from(e: HwError) -> Self {
        Self::HwAck(e)
    }
}

impl From<ClockSourceError> for DcError {
    fn from(e: ClockSourceError) -> Self {
        match e {
            ClockSourceError::NotAvailable => Self::ClockSourceUnavailable,
            other => Self::ClockSource(other),
        }
    }
}
