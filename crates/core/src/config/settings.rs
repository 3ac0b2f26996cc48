//! Engine-ready settings.
//!
//! [`EngineSettings`] is the normalizer's output: a shared cross-cutting
//! block plus exactly one backend-specific variant. All fields are
//! concrete — defaults have been applied, dependencies resolved, and
//! values clamped. This is what gets applied to an engine instance,
//! strictly before its processing call begins.

use serde::{Deserialize, Serialize};

use super::bag::ConfigBag;
use super::{Backend, HandDrawnPreset};

/// Validated, backend-specific engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub shared: SharedSettings,
    pub backend: BackendSettings,
}

/// The per-backend half of [`EngineSettings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BackendSettings {
    Edge(EdgeSettings),
    Centerline(CenterlineSettings),
    Superpixel(SuperpixelSettings),
    Dots(DotsSettings),
}

impl EngineSettings {
    /// The engine's documented defaults for a backend.
    pub fn default_for(backend: Backend) -> Self {
        let backend = match backend {
            Backend::Edge => BackendSettings::Edge(EdgeSettings::default()),
            Backend::Centerline => BackendSettings::Centerline(CenterlineSettings::default()),
            Backend::Superpixel => BackendSettings::Superpixel(SuperpixelSettings::default()),
            Backend::Dots => BackendSettings::Dots(DotsSettings::default()),
        };
        Self {
            shared: SharedSettings::default(),
            backend,
        }
    }

    pub fn backend_kind(&self) -> Backend {
        match &self.backend {
            BackendSettings::Edge(_) => Backend::Edge,
            BackendSettings::Centerline(_) => Backend::Centerline,
            BackendSettings::Superpixel(_) => Backend::Superpixel,
            BackendSettings::Dots(_) => Backend::Dots,
        }
    }

    /// Re-express these settings as a raw bag.
    ///
    /// Used to reflect normalized values back to the caller and by the
    /// idempotence property: normalizing the bag produced here yields the
    /// same settings with no further violations.
    pub fn to_bag(&self) -> ConfigBag {
        let s = &self.shared;
        let mut bag = ConfigBag {
            backend: Some(self.backend_kind()),
            detail: Some(s.detail),
            stroke_width: Some(s.stroke_width),
            multipass: Some(s.multipass),
            pass_count: Some(s.pass_count),
            reverse_pass: Some(s.reverse_pass),
            diagonal_pass: Some(s.diagonal_pass),
            directional_threshold: Some(s.directional_threshold),
            noise_filtering: Some(s.noise_filtering),
            noise_filter_spatial_sigma: Some(s.noise_filter_spatial_sigma),
            noise_filter_range_sigma: Some(s.noise_filter_range_sigma),
            background_removal: Some(s.background_removal),
            background_removal_strength: Some(s.background_removal_strength),
            max_image_size: Some(s.max_image_size),
            svg_precision: Some(s.svg_precision),
            deadline_override_ms: s.deadline_override_ms,
            ..ConfigBag::default()
        };
        match &self.backend {
            BackendSettings::Edge(e) => {
                bag.etf_fdog = Some(e.etf_fdog);
                bag.flow_tracing = Some(e.flow_tracing);
                bag.bezier_fitting = Some(e.bezier_fitting);
                bag.line_preserve_colors = Some(e.preserve_colors);
                bag.line_color_accuracy = Some(e.color_accuracy);
                bag.max_colors_per_path = Some(e.max_colors_per_path);
                bag.hand_drawn = Some(e.hand_drawn);
                bag.custom_tremor = e.custom_tremor;
                bag.custom_variable_weights = e.custom_variable_weights;
                bag.custom_tapering = e.custom_tapering;
            }
            BackendSettings::Centerline(c) => {
                bag.adaptive_threshold = Some(c.adaptive_threshold);
                bag.window_size = Some(c.window_size);
                bag.sensitivity_k = Some(c.sensitivity_k);
                bag.width_modulation = Some(c.width_modulation);
                bag.min_branch_length = Some(c.min_branch_length);
                bag.douglas_peucker_epsilon = Some(c.douglas_peucker_epsilon);
                bag.line_preserve_colors = Some(c.preserve_colors);
                bag.hand_drawn = Some(c.hand_drawn);
            }
            BackendSettings::Superpixel(p) => {
                bag.num_superpixels = Some(p.num_superpixels);
                bag.compactness = Some(p.compactness);
                bag.slic_iterations = Some(p.slic_iterations);
                bag.fill_regions = Some(p.fill_regions);
                bag.stroke_regions = Some(p.stroke_regions);
                bag.simplify_boundaries = Some(p.simplify_boundaries);
                bag.boundary_epsilon = Some(p.boundary_epsilon);
                bag.superpixel_preserve_colors = Some(p.preserve_colors);
            }
            BackendSettings::Dots(d) => {
                bag.dot_density = Some(d.density);
                bag.dot_min_radius = Some(d.min_radius);
                bag.dot_max_radius = Some(d.max_radius);
                bag.adaptive_sizing = Some(d.adaptive_sizing);
                bag.poisson_disk_sampling = Some(d.poisson_disk_sampling);
                bag.gradient_based_sizing = Some(d.gradient_based_sizing);
                bag.dot_preserve_colors = Some(d.preserve_colors);
                bag.background_tolerance = Some(d.background_tolerance);
            }
        }
        bag
    }
}

// ---------------------------------------------------------------------------
// Shared settings
// ---------------------------------------------------------------------------

/// Settings shared by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedSettings {
    /// Trace detail level; 0.0 is very sparse, 1.0 traces everything.
    pub detail: f32,
    /// Stroke width at the 1080p reference resolution.
    pub stroke_width: f32,
    pub multipass: bool,
    pub pass_count: u32,
    pub reverse_pass: bool,
    pub diagonal_pass: bool,
    pub directional_threshold: f32,
    pub noise_filtering: bool,
    pub noise_filter_spatial_sigma: f32,
    pub noise_filter_range_sigma: f32,
    pub background_removal: bool,
    pub background_removal_strength: f32,
    /// Images larger than this (per side) are downscaled by the engine.
    pub max_image_size: u32,
    /// SVG coordinate precision in decimal places.
    pub svg_precision: u32,
    /// Caller override for the job deadline; `None` means policy default.
    pub deadline_override_ms: Option<u64>,
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self {
            detail: 0.4,
            stroke_width: 1.5,
            multipass: false,
            pass_count: 1,
            reverse_pass: false,
            diagonal_pass: false,
            directional_threshold: 0.3,
            noise_filtering: false,
            noise_filter_spatial_sigma: 1.2,
            noise_filter_range_sigma: 50.0,
            background_removal: false,
            background_removal_strength: 0.5,
            max_image_size: 4096,
            svg_precision: 2,
            deadline_override_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSettings {
    /// Edge-tangent-flow / flow-based difference-of-Gaussians edge
    /// detection.
    pub etf_fdog: bool,
    /// Flow-guided tracing. Requires `etf_fdog`.
    pub flow_tracing: bool,
    /// Bézier curve fitting. Requires `flow_tracing`.
    pub bezier_fitting: bool,
    pub preserve_colors: bool,
    pub color_accuracy: f32,
    pub max_colors_per_path: u32,
    pub hand_drawn: HandDrawnPreset,
    /// Custom overrides on top of the preset; `None` keeps preset values.
    pub custom_tremor: Option<f32>,
    pub custom_variable_weights: Option<f32>,
    pub custom_tapering: Option<f32>,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            etf_fdog: false,
            flow_tracing: false,
            bezier_fitting: false,
            preserve_colors: false,
            color_accuracy: 0.7,
            max_colors_per_path: 3,
            hand_drawn: HandDrawnPreset::None,
            custom_tremor: None,
            custom_variable_weights: None,
            custom_tapering: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterlineSettings {
    /// Sauvola adaptive thresholding instead of a global threshold.
    pub adaptive_threshold: bool,
    /// Adaptive threshold window size in pixels.
    pub window_size: u32,
    /// Sauvola sensitivity parameter k.
    pub sensitivity_k: f32,
    pub width_modulation: bool,
    pub min_branch_length: f32,
    pub douglas_peucker_epsilon: f32,
    pub preserve_colors: bool,
    pub hand_drawn: HandDrawnPreset,
}

impl Default for CenterlineSettings {
    fn default() -> Self {
        Self {
            adaptive_threshold: false,
            window_size: 25,
            sensitivity_k: 0.3,
            width_modulation: false,
            min_branch_length: 8.0,
            douglas_peucker_epsilon: 1.0,
            preserve_colors: false,
            hand_drawn: HandDrawnPreset::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperpixelSettings {
    pub num_superpixels: u32,
    /// SLIC compactness; higher values produce more regular cells.
    pub compactness: f32,
    pub slic_iterations: u32,
    pub fill_regions: bool,
    pub stroke_regions: bool,
    pub simplify_boundaries: bool,
    /// Boundary simplification tolerance. Only meaningful when
    /// `simplify_boundaries` is on.
    pub boundary_epsilon: f32,
    pub preserve_colors: bool,
}

impl Default for SuperpixelSettings {
    fn default() -> Self {
        Self {
            num_superpixels: 150,
            compactness: 10.0,
            slic_iterations: 10,
            fill_regions: true,
            stroke_regions: false,
            simplify_boundaries: false,
            boundary_epsilon: 1.0,
            preserve_colors: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DotsSettings {
    /// Density threshold; lower values place more dots.
    pub density: f32,
    pub min_radius: f32,
    pub max_radius: f32,
    pub adaptive_sizing: bool,
    pub poisson_disk_sampling: bool,
    /// Scale dots by local gradient magnitude. Requires `adaptive_sizing`.
    pub gradient_based_sizing: bool,
    pub preserve_colors: bool,
    pub background_tolerance: f32,
}

impl Default for DotsSettings {
    fn default() -> Self {
        Self {
            density: 0.15,
            min_radius: 0.5,
            max_radius: 3.0,
            adaptive_sizing: true,
            poisson_disk_sampling: false,
            gradient_based_sizing: false,
            preserve_colors: false,
            background_tolerance: 0.1,
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
    fn defaults_are_within_documented_bounds() {
        use super::super::bounds;

        let s = SharedSettings::default();
        assert!(bounds::DETAIL.contains(s.detail));
        assert!(bounds::STROKE_WIDTH.contains(s.stroke_width));
        assert!(bounds::DIRECTIONAL_THRESHOLD.contains(s.directional_threshold));
        assert!(bounds::NOISE_FILTER_SPATIAL_SIGMA.contains(s.noise_filter_spatial_sigma));
        assert!(bounds::NOISE_FILTER_RANGE_SIGMA.contains(s.noise_filter_range_sigma));

        let d = DotsSettings::default();
        assert!(bounds::DOT_RADIUS.contains(d.min_radius));
        assert!(bounds::DOT_RADIUS.contains(d.max_radius));
        assert!(d.min_radius < d.max_radius);
    }

    #[test]
    fn default_for_matches_backend_kind() {
        for backend in [
            Backend::Edge,
            Backend::Centerline,
            Backend::Superpixel,
            Backend::Dots,
        ] {
            assert_eq!(EngineSettings::default_for(backend).backend_kind(), backend);
        }
    }

    #[test]
    fn to_bag_round_trips_backend() {
        let settings = EngineSettings::default_for(Backend::Superpixel);
        let bag = settings.to_bag();
        assert_eq!(bag.backend, Some(Backend::Superpixel));
        assert_eq!(bag.num_superpixels, Some(150));
        // Foreign-backend fields stay unset.
        assert!(bag.dot_density.is_none());
        assert!(bag.etf_fdog.is_none());
    }

    #[test]
    fn settings_serialize_with_backend_tag() {
        let settings = EngineSettings::default_for(Backend::Dots);
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["backend"]["backend"], "dots");
    }
}
