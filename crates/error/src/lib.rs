//! Display core error handling infrastructure.
//!
//! Provides the `define_dc_error!` macro for consistent error type definitions
//! and the [`ErrorClass`] taxonomy every display-core error maps onto.
//!
//! ## Usage
//!
//! ### Simple errors (no inner data)
//! ```ignore
//! define_dc_error! {
//!     pub enum ClockSourceError(0x31) {
//!         NotAvailable = 0x01 [ResourceExhaustion] => "No clock source available",
//!         RefCountUnderflow = 0x02 [Internal] => "Clock source released more often than acquired",
//!     }
//! }
//! ```
//!
//! ### Nested errors (with inner error type)
//! ```ignore
//! define_dc_error! {
//!     pub enum DcError(0x30) {
//!         HwAck(HwError) = 0x20 [HardwareAck] => "Hardware did not acknowledge",
//!     }
//! }
//! ```

#![no_std]

/// Broad failure kinds. Callers branch on the class, not on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// No free pipe, encoder or clock source for the request.
    ResourceExhaustion,
    /// An encoder, scaler or fetch unit cannot carry the requested signal, timing or format.
    CapabilityMismatch,
    /// The bandwidth/watermark model rejected the configuration.
    BandwidthExceeded,
    /// A firmware call or register acknowledgment reported failure mid-commit.
    HardwareAck,
    /// A structural assumption of the allocator/sequencer contract was broken.
    Internal,
}

impl ErrorClass {
    /// Expected outcomes the caller resolves by changing the request.
    pub const fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::ResourceExhaustion | Self::CapabilityMismatch | Self::BandwidthExceeded
        )
    }

    /// Failures that can surface between two hardware writes and leave the
    /// engine partially programmed.
    pub const fn may_leave_partial_state(self) -> bool {
        matches!(self, Self::HardwareAck | Self::Internal)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::ResourceExhaustion => "resource-exhaustion",
            Self::CapabilityMismatch => "capability-mismatch",
            Self::BandwidthExceeded => "bandwidth-exceeded",
            Self::HardwareAck => "hardware-ack",
            Self::Internal => "internal",
        }
    }
}

impl core::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Macro to define a display-core error type with consistent handling.
///
/// Every variant carries a numeric code, an [`ErrorClass`] and a description.
/// Supports both simple variants and nested variants containing inner errors.
#[macro_export]
macro_rules! define_dc_error {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident($subsystem:literal) {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $(($inner:ty))? = $code:literal [$class:ident] => $desc:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant $(($inner))?,
            )*
        }

        impl $name {
            /// Subsystem identifier for this error type.
            pub const SUBSYSTEM: u8 = $subsystem;

            /// Get numeric error code for debugging.
            pub const fn code(&self) -> u16 {
                match self {
                    $(
                        $crate::define_dc_error!(@pattern $variant $(($inner))? _unused) => {
                            (($subsystem as u16) << 8) | $code
                        }
                    )*
                }
            }

            /// Get error name for logging.
            pub const fn name(&self) -> &'static str {
                match self {
                    $(
                        $crate::define_dc_error!(@pattern $variant $(($inner))? _unused) => {
                            $desc
                        }
                    )*
                }
            }

            /// Failure class used for propagation policy.
            pub const fn class(&self) -> $crate::ErrorClass {
                match self {
                    $(
                        $crate::define_dc_error!(@pattern $variant $(($inner))? _unused) => {
                            $crate::ErrorClass::$class
                        }
                    )*
                }
            }

            /// True for outcomes the caller handles by adjusting the request.
            pub const fn is_recoverable(&self) -> bool {
                self.class().is_recoverable()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $(
                        $crate::define_dc_error!(@pattern $variant $(($inner))? inner) => {
                            $crate::define_dc_error!(@display_body self f $desc $(($inner))? inner)
                        }
                    )*
                }
            }
        }

        impl core::error::Error for $name {}
    };

    // Helper to generate patterns
    (@pattern $variant:ident ($inner:ty) $bind:ident) => { Self::$variant($bind) };
    (@pattern $variant:ident $bind:ident) => { Self::$variant };

    // Helper to generate display bodies
    (@display_body $self:ident $f:ident $desc:literal ($inner:ty) $bind:ident) => {
        write!($f, "E{:04X}: {} ({})", $self.code(), $desc, $bind)
    };
    (@display_body $self:ident $f:ident $desc:literal $bind:ident) => {
        write!($f, "E{:04X}: {}", $self.code(), $desc)
    };
}

#[cfg(test)]
mod tests {
    use super::ErrorClass;

    define_dc_error! {
        /// Test error type
        pub enum TestError(0xFF) {
            /// Pool ran dry
            Exhausted = 0x01 [ResourceExhaustion] => "Exhausted",
            /// Firmware said no
            Firmware = 0x02 [HardwareAck] => "Firmware rejected call",
        }
    }

    define_dc_error! {
        pub enum NestedTestError(0xFE) {
            Inner(TestError) = 0x01 [Internal] => "Nested error",
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(TestError::Exhausted.code(), 0xFF01);
        assert_eq!(TestError::Firmware.code(), 0xFF02);
        assert_eq!(NestedTestError::Inner(TestError::Exhausted).code(), 0xFE01);
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(TestError::Exhausted.class(), ErrorClass::ResourceExhaustion);
        assert!(TestError::Exhausted.is_recoverable());
        assert_eq!(TestError::Firmware.class(), ErrorClass::HardwareAck);
        assert!(!TestError::Firmware.is_recoverable());
        assert!(TestError::Firmware.class().may_leave_partial_state());
        assert!(ErrorClass::Internal.may_leave_partial_state());
        assert!(!TestError::Exhausted.class().may_leave_partial_state());
        assert!(!ErrorClass::BandwidthExceeded.may_leave_partial_state());
        // Nested variants use their own class, not the inner one.
        assert_eq!(
            NestedTestError::Inner(TestError::Exhausted).class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn test_display_format() {
        extern crate std;
        use std::format;
        assert_eq!(format!("{}", TestError::Exhausted), "EFF01: Exhausted");
        assert_eq!(
            format!("{}", NestedTestError::Inner(TestError::Firmware)),
            "EFE01: Nested error (EFF02: Firmware rejected call)"
        );
        assert_eq!(format!("{}", ErrorClass::BandwidthExceeded), "bandwidth-exceeded");
    }

    #[test]
    fn test_subsystem_constant() {
        assert_eq!(TestError::SUBSYSTEM, 0xFF);
        assert_eq!(NestedTestError::SUBSYSTEM, 0xFE);
    }
}
