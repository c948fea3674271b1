//! DCE 11.2: six graphics pipes, one PLL per pipe.

use dc_hal::{AsicCaps, AsicFeature, FeatureValue};

use super::PoolLayout;

pub(crate) const LAYOUT: PoolLayout = PoolLayout {
    pipes: 6,
    underlay: false,
    plls: 6,
    stream_encoders: 6,
    audio_endpoints: 6,
    has_mpc: false,
    has_power_gate: false,
};

pub(crate) fn default_caps() -> AsicCaps {
    AsicCaps::new()
        .with(AsicFeature::MaxControllers, FeatureValue::U32(6))
        .with(AsicFeature::SupportsUnderlay, FeatureValue::Bool(false))
        .with(AsicFeature::MaxCursorSize, FeatureValue::U32(128))
        .with(AsicFeature::MaxPixelClockKhz, FeatureValue::U32(600_000))
        .with(AsicFeature::TimingSyncSupported, FeatureValue::Bool(true))
}
