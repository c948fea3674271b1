//! DCE 11.0: three graphics pipes plus one video underlay.

use dc_hal::{AsicCaps, AsicFeature, FeatureValue};

use super::PoolLayout;

pub(crate) const LAYOUT: PoolLayout = PoolLayout {
    pipes: 3,
    underlay: true,
    plls: 2,
    stream_encoders: 3,
    audio_endpoints: 3,
    has_mpc: false,
    has_power_gate: false,
};

pub(crate) fn default_caps() -> AsicCaps {
    AsicCaps::new()
        .with(AsicFeature::MaxControllers, FeatureValue::U32(3))
        .with(AsicFeature::SupportsUnderlay, FeatureValue::Bool(true))
        .with(AsicFeature::MaxCursorSize, FeatureValue::U32(128))
        .with(AsicFeature::MaxPixelClockKhz, FeatureValue::U32(600_000))
        .with(AsicFeature::TimingSyncSupported, FeatureValue::Bool(true))
}
