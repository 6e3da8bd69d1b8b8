//! Renderer configuration.
//!
//! [`RenderConfig`] collects every knob that decides resource sizes and
//! temporal behaviour. It follows the same builder style as the rest of the
//! crate and can also be read from TOML:
//!
//! ```
//! use lucent::RenderConfig;
//!
//! let config = RenderConfig::from_toml_str(
//!     r#"
//!     resolution_scale = 0.5
//!     list_multiplier = 8
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.list_multiplier, 8);
//! assert_eq!(config.frames_in_flight, 2);
//! ```

use serde::Deserialize;

use crate::error::ConfigError;

/// Average number of fragment slots reserved per pixel.
pub const DEFAULT_LIST_MULTIPLIER: u32 = 4;

/// Number of frame-constant slots kept alive at once.
pub const DEFAULT_FRAMES_IN_FLIGHT: u32 = 2;

/// Configuration for [`TransparencyRenderer`](crate::TransparencyRenderer).
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Internal resolution relative to the output resolution.
    pub resolution_scale: f32,
    /// Fragment list capacity is `list_multiplier * pixel_count`.
    pub list_multiplier: u32,
    /// Ring size of the frame-constant buffer.
    pub frames_in_flight: u32,
    /// Enables jitter and history blending.
    pub temporal_accumulation: bool,
    /// Weight of the history sample in the accumulation blend.
    pub history_weight: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            resolution_scale: 1.0,
            list_multiplier: DEFAULT_LIST_MULTIPLIER,
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            temporal_accumulation: true,
            history_weight: 0.9,
        }
    }
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution_scale(mut self, scale: f32) -> Self {
        self.resolution_scale = scale;
        self
    }

    pub fn list_multiplier(mut self, multiplier: u32) -> Self {
        self.list_multiplier = multiplier;
        self
    }

    pub fn frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn temporal_accumulation(mut self, enabled: bool) -> Self {
        self.temporal_accumulation = enabled;
        self
    }

    pub fn history_weight(mut self, weight: f32) -> Self {
        self.history_weight = weight;
        self
    }

    /// Parses a config from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field that does not depend on the output resolution.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.resolution_scale.is_finite() || self.resolution_scale <= 0.0 {
            return Err(ConfigError::InvalidResolutionScale(self.resolution_scale));
        }
        if self.list_multiplier == 0 {
            return Err(ConfigError::ZeroListMultiplier);
        }
        if self.frames_in_flight == 0 {
            return Err(ConfigError::ZeroFramesInFlight);
        }
        if !(0.0..1.0).contains(&self.history_weight) {
            return Err(ConfigError::InvalidHistoryWeight(self.history_weight));
        }
        Ok(())
    }

    /// Internal render resolution for a given output resolution.
    ///
    /// Each axis is rounded and clamped to at least one pixel, so a tiny
    /// scale never produces an empty target.
    pub fn render_extent(&self, width: u32, height: u32) -> Result<(u32, u32), ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroResolution { width, height });
        }
        let scale = |v: u32| {
            let scaled = (v as f32 * self.resolution_scale).round() as u32;
            if scaled == 0 {
                log::warn!("resolution scale {} rounds {v} to zero, clamping to 1", self.resolution_scale);
            }
            scaled.max(1)
        };
        Ok((scale(width), scale(height)))
    }

    /// Whether switching from `self` to `other` invalidates sized resources.
    pub(crate) fn needs_reallocation(&self, other: &RenderConfig) -> bool {
        self.resolution_scale != other.resolution_scale
            || self.list_multiplier != other.list_multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.list_multiplier, 4);
        assert_eq!(config.frames_in_flight, 2);
        assert!(config.temporal_accumulation);
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = RenderConfig::from_toml_str(
            "frames_in_flight = 3\ntemporal_accumulation = false\n",
        )
        .unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert!(!config.temporal_accumulation);
        assert_eq!(config.list_multiplier, DEFAULT_LIST_MULTIPLIER);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let err = RenderConfig::from_toml_str("list_multipler = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn toml_runs_validation() {
        let err = RenderConfig::from_toml_str("list_multiplier = 0").unwrap_err();
        assert_eq!(err, ConfigError::ZeroListMultiplier);
    }

    #[test]
    fn invalid_fields_are_rejected() {
        assert_eq!(
            RenderConfig::new().frames_in_flight(0).validate(),
            Err(ConfigError::ZeroFramesInFlight)
        );
        assert!(matches!(
            RenderConfig::new().resolution_scale(0.0).validate(),
            Err(ConfigError::InvalidResolutionScale(_))
        ));
        assert!(matches!(
            RenderConfig::new().resolution_scale(f32::NAN).validate(),
            Err(ConfigError::InvalidResolutionScale(_))
        ));
        assert!(matches!(
            RenderConfig::new().history_weight(1.0).validate(),
            Err(ConfigError::InvalidHistoryWeight(_))
        ));
    }

    #[test]
    fn render_extent_scales_and_clamps() {
        let config = RenderConfig::new().resolution_scale(0.5);
        assert_eq!(config.render_extent(1920, 1080).unwrap(), (960, 540));

        let tiny = RenderConfig::new().resolution_scale(0.001);
        assert_eq!(tiny.render_extent(100, 100).unwrap(), (1, 1));

        assert_eq!(
            config.render_extent(0, 10),
            Err(ConfigError::ZeroResolution {
                width: 0,
                height: 10
            })
        );
    }

    #[test]
    fn reallocation_tracks_sizing_fields_only() {
        let base = RenderConfig::default();
        assert!(!base.needs_reallocation(&base.history_weight(0.5)));
        assert!(!base.needs_reallocation(&base.temporal_accumulation(false)));
        assert!(base.needs_reallocation(&base.list_multiplier(8)));
        assert!(base.needs_reallocation(&base.resolution_scale(0.75)));
    }
}
