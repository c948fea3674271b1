//! DCN 1.0: four pipes blended through the MPC, register power gating.

use dc_hal::{AsicCaps, AsicFeature, FeatureValue};

use super::PoolLayout;

pub(crate) const LAYOUT: PoolLayout = PoolLayout {
    pipes: 4,
    underlay: false,
    plls: 4,
    stream_encoders: 4,
    audio_endpoints: 4,
    has_mpc: true,
    has_power_gate: true,
};

pub(crate) fn default_caps() -> AsicCaps {
    AsicCaps::new()
        .with(AsicFeature::MaxControllers, FeatureValue::U32(4))
        .with(AsicFeature::SupportsUnderlay, FeatureValue::Bool(false))
        .with(AsicFeature::MaxCursorSize, FeatureValue::U32(256))
        .with(AsicFeature::MaxPixelClockKhz, FeatureValue::U32(600_000))
        .with(AsicFeature::TimingSyncSupported, FeatureValue::Bool(true))
}
