//! ASIC capability / feature-flag table.
//!
//! Read once when the resource pool is built. Missing entries fall back to
//! the generation default supplied by the caller.

use dc_utils::HashMap;

/// Named capability keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsicFeature {
    /// Leave encoders without a stream powered at init.
    SkipPowerDownInactiveEncoder,
    /// Number of timing generators usable on this board.
    MaxControllers,
    /// Underlay (video-only) pipe present.
    SupportsUnderlay,
    /// Never share a PLL between two streams.
    DisableClockSharing,
    /// Largest cursor edge, in pixels.
    MaxCursorSize,
    /// Largest pixel clock the PLLs can generate.
    MaxPixelClockKhz,
    /// GSL reset triggers are wired.
    TimingSyncSupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureValue {
    Bool(bool),
    U32(u32),
}

#[derive(Debug, Clone, Default)]
pub struct AsicCaps {
    values: HashMap<AsicFeature, FeatureValue>,
}

impl AsicCaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, feature: AsicFeature, value: FeatureValue) -> Self {
        self.set(feature, value);
        self
    }

    pub fn set(&mut self, feature: AsicFeature, value: FeatureValue) {
        self.values.insert(feature, value);
    }

    pub fn get(&self, feature: AsicFeature) -> Option<FeatureValue> {
        self.values.get(&feature).copied()
    }

    /// Boolean lookup. A missing or non-boolean entry yields `default`.
    pub fn flag(&self, feature: AsicFeature, default: bool) -> bool {
        match self.get(feature) {
            Some(FeatureValue::Bool(v)) => v,
            _ => default,
        }
    }

    /// Integer lookup. A missing or non-integer entry yields `default`.
    pub fn value(&self, feature: AsicFeature, default: u32) -> u32 {
        match self.get(feature) {
            Some(FeatureValue::U32(v)) => v,
            _ => default,
        }
    }

    /// Fill every key absent here from `defaults`.
    pub fn merge_defaults(&mut self, defaults: &AsicCaps) {
        for (feature, value) in &defaults.values {
            self.values.entry(*feature).or_insert(*value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_with_defaults() {
        let caps = AsicCaps::new()
            .with(AsicFeature::MaxControllers, FeatureValue::U32(2))
            .with(AsicFeature::DisableClockSharing, FeatureValue::Bool(true));

        assert_eq!(caps.value(AsicFeature::MaxControllers, 6), 2);
        assert!(caps.flag(AsicFeature::DisableClockSharing, false));
        assert!(!caps.flag(AsicFeature::SupportsUnderlay, false));
        // Wrong value type falls back
        assert_eq!(caps.value(AsicFeature::DisableClockSharing, 7), 7);
    }

    #[test]
    fn test_merge_keeps_overrides() {
        let mut caps = AsicCaps::new().with(AsicFeature::MaxCursorSize, FeatureValue::U32(64));
        let defaults = AsicCaps::new()
            .with(AsicFeature::MaxCursorSize, FeatureValue::U32(128))
            .with(AsicFeature::TimingSyncSupported, FeatureValue::Bool(true));
        caps.merge_defaults(&defaults);

        assert_eq!(caps.value(AsicFeature::MaxCursorSize, 0), 64);
        assert!(caps.flag(AsicFeature::TimingSyncSupported, false));
    }
}
