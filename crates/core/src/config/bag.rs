//! The raw, caller-supplied parameter bag.
//!
//! Every field is optional; unset fields normalize to the engine's
//! documented defaults. The bag is deliberately flat — backend ownership
//! of the individual fields is declared in [`super::rules`] and enforced
//! by the normalizer, not by the type.

use serde::{Deserialize, Serialize};

use super::{Backend, HandDrawnPreset};

/// Raw configuration as submitted by the caller. May be partially invalid;
/// only [`super::normalize`] turns it into engine-ready settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigBag {
    pub backend: Option<Backend>,

    // -- shared --------------------------------------------------------------
    pub detail: Option<f32>,
    pub stroke_width: Option<f32>,
    pub multipass: Option<bool>,
    pub pass_count: Option<u32>,
    pub reverse_pass: Option<bool>,
    pub diagonal_pass: Option<bool>,
    pub directional_threshold: Option<f32>,
    pub noise_filtering: Option<bool>,
    pub noise_filter_spatial_sigma: Option<f32>,
    pub noise_filter_range_sigma: Option<f32>,
    pub background_removal: Option<bool>,
    pub background_removal_strength: Option<f32>,
    pub max_image_size: Option<u32>,
    pub svg_precision: Option<u32>,
    pub deadline_override_ms: Option<u64>,

    // -- edge ----------------------------------------------------------------
    pub etf_fdog: Option<bool>,
    pub flow_tracing: Option<bool>,
    pub bezier_fitting: Option<bool>,
    pub line_color_accuracy: Option<f32>,
    pub max_colors_per_path: Option<u32>,
    pub custom_tremor: Option<f32>,
    pub custom_variable_weights: Option<f32>,
    pub custom_tapering: Option<f32>,

    // -- line backends (edge + centerline) -----------------------------------
    pub line_preserve_colors: Option<bool>,
    pub hand_drawn: Option<HandDrawnPreset>,

    // -- centerline ----------------------------------------------------------
    pub adaptive_threshold: Option<bool>,
    pub window_size: Option<u32>,
    pub sensitivity_k: Option<f32>,
    pub width_modulation: Option<bool>,
    pub min_branch_length: Option<f32>,
    pub douglas_peucker_epsilon: Option<f32>,

    // -- superpixel ----------------------------------------------------------
    pub num_superpixels: Option<u32>,
    pub compactness: Option<f32>,
    pub slic_iterations: Option<u32>,
    pub fill_regions: Option<bool>,
    pub stroke_regions: Option<bool>,
    pub simplify_boundaries: Option<bool>,
    pub boundary_epsilon: Option<f32>,
    pub superpixel_preserve_colors: Option<bool>,

    // -- dots ----------------------------------------------------------------
    pub dot_density: Option<f32>,
    pub dot_min_radius: Option<f32>,
    pub dot_max_radius: Option<f32>,
    pub adaptive_sizing: Option<bool>,
    pub poisson_disk_sampling: Option<bool>,
    pub gradient_based_sizing: Option<bool>,
    pub dot_preserve_colors: Option<bool>,
    pub background_tolerance: Option<f32>,
}

macro_rules! merge_fields {
    ($self:ident, $delta:ident, $($field:ident),+ $(,)?) => {
        $(if $delta.$field.is_some() {
            $self.$field = $delta.$field;
        })+
    };
}

impl ConfigBag {
    /// Overlay `delta` onto `self`: every field set in the delta replaces
    /// the corresponding field here, unset delta fields leave the current
    /// value alone. This backs the `Configure { config_delta }` operation.
    pub fn merge(&mut self, delta: &ConfigBag) {
        merge_fields!(
            self, delta, backend, detail, stroke_width, multipass, pass_count, reverse_pass,
            diagonal_pass, directional_threshold, noise_filtering, noise_filter_spatial_sigma,
            noise_filter_range_sigma, background_removal, background_removal_strength,
            max_image_size, svg_precision, deadline_override_ms, etf_fdog, flow_tracing,
            bezier_fitting, line_color_accuracy, max_colors_per_path, line_preserve_colors,
            hand_drawn, custom_tremor, custom_variable_weights, custom_tapering,
            adaptive_threshold, window_size, sensitivity_k, width_modulation, min_branch_length,
            douglas_peucker_epsilon, num_superpixels, compactness, slic_iterations, fill_regions,
            stroke_regions, simplify_boundaries, boundary_epsilon, superpixel_preserve_colors,
            dot_density, dot_min_radius, dot_max_radius, adaptive_sizing, poisson_disk_sampling,
            gradient_based_sizing, dot_preserve_colors, background_tolerance,
        );
    }

    // -- presets -------------------------------------------------------------
    //
    // Pre-populated bags for common use cases. These are plain bags, not
    // privileged configurations: they go through normalization like any
    // caller input.

    /// Clean line art: single-pass edge tracing.
    pub fn line_art() -> Self {
        Self {
            backend: Some(Backend::Edge),
            detail: Some(0.4),
            stroke_width: Some(1.2),
            multipass: Some(false),
            noise_filtering: Some(false),
            ..Self::default()
        }
    }

    /// Sketchy, hand-drawn style.
    pub fn sketch() -> Self {
        Self {
            backend: Some(Backend::Edge),
            detail: Some(0.35),
            stroke_width: Some(1.5),
            multipass: Some(true),
            noise_filtering: Some(true),
            hand_drawn: Some(HandDrawnPreset::Medium),
            ..Self::default()
        }
    }

    /// Technical / architectural drawings: directional multipass
    /// centerline tracing with adaptive thresholding.
    pub fn technical() -> Self {
        Self {
            backend: Some(Backend::Centerline),
            detail: Some(0.6),
            stroke_width: Some(1.0),
            multipass: Some(true),
            pass_count: Some(2),
            reverse_pass: Some(true),
            diagonal_pass: Some(true),
            adaptive_threshold: Some(true),
            window_size: Some(25),
            sensitivity_k: Some(0.3),
            min_branch_length: Some(8.0),
            douglas_peucker_epsilon: Some(1.0),
            ..Self::default()
        }
    }

    /// Dense monochrome stippling.
    pub fn dense_stippling() -> Self {
        Self {
            backend: Some(Backend::Dots),
            detail: Some(0.3),
            dot_density: Some(0.05),
            dot_min_radius: Some(0.3),
            dot_max_radius: Some(1.0),
            adaptive_sizing: Some(true),
            dot_preserve_colors: Some(false),
            ..Self::default()
        }
    }

    /// Colorful pointillism.
    pub fn pointillism() -> Self {
        Self {
            backend: Some(Backend::Dots),
            detail: Some(0.4),
            dot_density: Some(0.15),
            dot_min_radius: Some(1.0),
            dot_max_radius: Some(4.0),
            adaptive_sizing: Some(true),
            dot_preserve_colors: Some(true),
            poisson_disk_sampling: Some(true),
            gradient_based_sizing: Some(true),
            ..Self::default()
        }
    }

    /// Sparse artistic dots.
    pub fn sparse_dots() -> Self {
        Self {
            backend: Some(Backend::Dots),
            detail: Some(0.5),
            dot_density: Some(0.3),
            dot_min_radius: Some(2.0),
            dot_max_radius: Some(6.0),
            adaptive_sizing: Some(true),
            dot_preserve_colors: Some(true),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overlays_only_set_fields() {
        let mut base = ConfigBag::line_art();
        let delta = ConfigBag {
            detail: Some(0.9),
            ..ConfigBag::default()
        };
        base.merge(&delta);
        assert_eq!(base.detail, Some(0.9));
        // Untouched by the delta.
        assert_eq!(base.backend, Some(Backend::Edge));
        assert_eq!(base.stroke_width, Some(1.2));
    }

    #[test]
    fn merge_can_switch_backend() {
        let mut base = ConfigBag::line_art();
        let delta = ConfigBag {
            backend: Some(Backend::Dots),
            ..ConfigBag::default()
        };
        base.merge(&delta);
        assert_eq!(base.backend, Some(Backend::Dots));
    }

    #[test]
    fn empty_delta_is_a_no_op() {
        let mut base = ConfigBag::technical();
        let before = base.clone();
        base.merge(&ConfigBag::default());
        assert_eq!(base, before);
    }

    #[test]
    fn bag_round_trips_through_json() {
        let bag = ConfigBag::pointillism();
        let json = serde_json::to_string(&bag).unwrap();
        let back: ConfigBag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bag);
    }

    #[test]
    fn unknown_fields_default_to_unset() {
        let bag: ConfigBag = serde_json::from_str(r#"{"detail": 0.5}"#).unwrap();
        assert_eq!(bag.detail, Some(0.5));
        assert!(bag.backend.is_none());
        assert!(bag.dot_density.is_none());
    }
}
