//! Declarative configuration rules.
//!
//! Three rule tables drive the normalizer:
//!
//! - [`BACKEND_FIELDS`] declares which backend(s) each backend-specific
//!   field belongs to. Supplying a field for a foreign backend is a fatal
//!   `Incompatible` violation.
//! - [`SUPPLIED_IMPLICATIONS`] declares gates implied by their tuning
//!   parameters: supplying the parameter without the gate turns the gate
//!   on, recorded as `AutoFixed`. These key off the raw bag — after
//!   defaults are applied, "supplied" is no longer visible.
//! - [`DEPENDENCY_RULES`] declares feature prerequisites. A dependent
//!   feature enabled without its prerequisite force-enables the
//!   prerequisite and records an `AutoFixed` violation. The table is
//!   evaluated to a fixpoint, so transitive chains resolve fully.
//!
//! Rules are data; no rule owns any job state.

use super::bag::ConfigBag;
use super::settings::{BackendSettings, EngineSettings};
use super::{Backend, HandDrawnPreset};

// ---------------------------------------------------------------------------
// Field ownership
// ---------------------------------------------------------------------------

/// Which backend(s) a configuration field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOwner {
    Edge,
    Centerline,
    Superpixel,
    Dots,
    /// Edge and centerline both draw line work.
    LineBackends,
}

impl FieldOwner {
    pub fn allows(self, backend: Backend) -> bool {
        match self {
            FieldOwner::Edge => backend == Backend::Edge,
            FieldOwner::Centerline => backend == Backend::Centerline,
            FieldOwner::Superpixel => backend == Backend::Superpixel,
            FieldOwner::Dots => backend == Backend::Dots,
            FieldOwner::LineBackends => backend.is_line_backend(),
        }
    }
}

/// A backend-specific field: its name, owner, and a probe telling whether
/// the caller supplied it.
pub struct OwnedField {
    pub name: &'static str,
    pub owner: FieldOwner,
    pub supplied: fn(&ConfigBag) -> bool,
}

/// Every backend-specific field of the bag. Shared fields are absent by
/// construction — they are valid under every backend.
pub const BACKEND_FIELDS: &[OwnedField] = &[
    // edge
    OwnedField { name: "etf_fdog", owner: FieldOwner::Edge, supplied: |b| b.etf_fdog.is_some() },
    OwnedField { name: "flow_tracing", owner: FieldOwner::Edge, supplied: |b| b.flow_tracing.is_some() },
    OwnedField { name: "bezier_fitting", owner: FieldOwner::Edge, supplied: |b| b.bezier_fitting.is_some() },
    OwnedField { name: "line_color_accuracy", owner: FieldOwner::Edge, supplied: |b| b.line_color_accuracy.is_some() },
    OwnedField { name: "max_colors_per_path", owner: FieldOwner::Edge, supplied: |b| b.max_colors_per_path.is_some() },
    OwnedField { name: "custom_tremor", owner: FieldOwner::Edge, supplied: |b| b.custom_tremor.is_some() },
    OwnedField { name: "custom_variable_weights", owner: FieldOwner::Edge, supplied: |b| b.custom_variable_weights.is_some() },
    OwnedField { name: "custom_tapering", owner: FieldOwner::Edge, supplied: |b| b.custom_tapering.is_some() },
    // line backends
    OwnedField { name: "line_preserve_colors", owner: FieldOwner::LineBackends, supplied: |b| b.line_preserve_colors.is_some() },
    OwnedField { name: "hand_drawn", owner: FieldOwner::LineBackends, supplied: |b| b.hand_drawn.is_some() },
    // centerline
    OwnedField { name: "adaptive_threshold", owner: FieldOwner::Centerline, supplied: |b| b.adaptive_threshold.is_some() },
    OwnedField { name: "window_size", owner: FieldOwner::Centerline, supplied: |b| b.window_size.is_some() },
    OwnedField { name: "sensitivity_k", owner: FieldOwner::Centerline, supplied: |b| b.sensitivity_k.is_some() },
    OwnedField { name: "width_modulation", owner: FieldOwner::Centerline, supplied: |b| b.width_modulation.is_some() },
    OwnedField { name: "min_branch_length", owner: FieldOwner::Centerline, supplied: |b| b.min_branch_length.is_some() },
    OwnedField { name: "douglas_peucker_epsilon", owner: FieldOwner::Centerline, supplied: |b| b.douglas_peucker_epsilon.is_some() },
    // superpixel
    OwnedField { name: "num_superpixels", owner: FieldOwner::Superpixel, supplied: |b| b.num_superpixels.is_some() },
    OwnedField { name: "compactness", owner: FieldOwner::Superpixel, supplied: |b| b.compactness.is_some() },
    OwnedField { name: "slic_iterations", owner: FieldOwner::Superpixel, supplied: |b| b.slic_iterations.is_some() },
    OwnedField { name: "fill_regions", owner: FieldOwner::Superpixel, supplied: |b| b.fill_regions.is_some() },
    OwnedField { name: "stroke_regions", owner: FieldOwner::Superpixel, supplied: |b| b.stroke_regions.is_some() },
    OwnedField { name: "simplify_boundaries", owner: FieldOwner::Superpixel, supplied: |b| b.simplify_boundaries.is_some() },
    OwnedField { name: "boundary_epsilon", owner: FieldOwner::Superpixel, supplied: |b| b.boundary_epsilon.is_some() },
    OwnedField { name: "superpixel_preserve_colors", owner: FieldOwner::Superpixel, supplied: |b| b.superpixel_preserve_colors.is_some() },
    // dots
    OwnedField { name: "dot_density", owner: FieldOwner::Dots, supplied: |b| b.dot_density.is_some() },
    OwnedField { name: "dot_min_radius", owner: FieldOwner::Dots, supplied: |b| b.dot_min_radius.is_some() },
    OwnedField { name: "dot_max_radius", owner: FieldOwner::Dots, supplied: |b| b.dot_max_radius.is_some() },
    OwnedField { name: "adaptive_sizing", owner: FieldOwner::Dots, supplied: |b| b.adaptive_sizing.is_some() },
    OwnedField { name: "poisson_disk_sampling", owner: FieldOwner::Dots, supplied: |b| b.poisson_disk_sampling.is_some() },
    OwnedField { name: "gradient_based_sizing", owner: FieldOwner::Dots, supplied: |b| b.gradient_based_sizing.is_some() },
    OwnedField { name: "dot_preserve_colors", owner: FieldOwner::Dots, supplied: |b| b.dot_preserve_colors.is_some() },
    OwnedField { name: "background_tolerance", owner: FieldOwner::Dots, supplied: |b| b.background_tolerance.is_some() },
];

// ---------------------------------------------------------------------------
// Supplied implications
// ---------------------------------------------------------------------------

/// A gate feature implied by the caller supplying one of its tuning
/// parameters.
///
/// Fires only when a tuning field was supplied and the gate was not: an
/// explicit gate value is respected either way. Probes look at the raw
/// bag because a normalized [`EngineSettings`] carries every field and
/// cannot distinguish supplied from defaulted.
pub struct SuppliedImplication {
    /// Field the violation is recorded against (the gate).
    pub fixes: &'static str,
    pub detail: &'static str,
    pub tuning_supplied: fn(&ConfigBag) -> bool,
    pub gate_supplied: fn(&ConfigBag) -> bool,
    pub satisfied: fn(&EngineSettings) -> bool,
    pub resolve: fn(&mut EngineSettings),
}

pub const SUPPLIED_IMPLICATIONS: &[SuppliedImplication] = &[
    SuppliedImplication {
        fixes: "adaptive_threshold",
        detail: "enabled because window_size or sensitivity_k was supplied",
        tuning_supplied: |b| b.window_size.is_some() || b.sensitivity_k.is_some(),
        gate_supplied: |b| b.adaptive_threshold.is_some(),
        satisfied: |s| centerline(s).is_some_and(|c| c.adaptive_threshold),
        resolve: |s| {
            if let BackendSettings::Centerline(c) = &mut s.backend {
                c.adaptive_threshold = true;
            }
        },
    },
    SuppliedImplication {
        fixes: "simplify_boundaries",
        detail: "enabled because boundary_epsilon was supplied",
        tuning_supplied: |b| b.boundary_epsilon.is_some(),
        gate_supplied: |b| b.simplify_boundaries.is_some(),
        satisfied: |s| superpixel(s).is_some_and(|p| p.simplify_boundaries),
        resolve: |s| {
            if let BackendSettings::Superpixel(p) = &mut s.backend {
                p.simplify_boundaries = true;
            }
        },
    },
];

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// A prerequisite relation between two features.
///
/// `active` probes whether the dependent feature is enabled, `satisfied`
/// whether the prerequisite already holds, and `resolve` force-enables the
/// prerequisite. All three operate on the working [`EngineSettings`].
pub struct DependencyRule {
    /// Field the violation is recorded against (the prerequisite).
    pub fixes: &'static str,
    /// Human-readable description of the applied fix.
    pub detail: &'static str,
    pub active: fn(&EngineSettings) -> bool,
    pub satisfied: fn(&EngineSettings) -> bool,
    pub resolve: fn(&mut EngineSettings),
}

fn edge(settings: &EngineSettings) -> Option<&super::settings::EdgeSettings> {
    match &settings.backend {
        BackendSettings::Edge(e) => Some(e),
        _ => None,
    }
}

fn dots(settings: &EngineSettings) -> Option<&super::settings::DotsSettings> {
    match &settings.backend {
        BackendSettings::Dots(d) => Some(d),
        _ => None,
    }
}

fn centerline(settings: &EngineSettings) -> Option<&super::settings::CenterlineSettings> {
    match &settings.backend {
        BackendSettings::Centerline(c) => Some(c),
        _ => None,
    }
}

fn superpixel(settings: &EngineSettings) -> Option<&super::settings::SuperpixelSettings> {
    match &settings.backend {
        BackendSettings::Superpixel(p) => Some(p),
        _ => None,
    }
}

/// The dependency table, evaluated to a fixpoint.
pub const DEPENDENCY_RULES: &[DependencyRule] = &[
    DependencyRule {
        fixes: "flow_tracing",
        detail: "enabled because bezier_fitting requires it",
        active: |s| edge(s).is_some_and(|e| e.bezier_fitting),
        satisfied: |s| edge(s).is_some_and(|e| e.flow_tracing),
        resolve: |s| {
            if let BackendSettings::Edge(e) = &mut s.backend {
                e.flow_tracing = true;
            }
        },
    },
    DependencyRule {
        fixes: "etf_fdog",
        detail: "enabled because flow_tracing requires it",
        active: |s| edge(s).is_some_and(|e| e.flow_tracing),
        satisfied: |s| edge(s).is_some_and(|e| e.etf_fdog),
        resolve: |s| {
            if let BackendSettings::Edge(e) = &mut s.backend {
                e.etf_fdog = true;
            }
        },
    },
    DependencyRule {
        fixes: "hand_drawn",
        detail: "preset set to subtle because custom hand-drawn values require one",
        active: |s| {
            edge(s).is_some_and(|e| {
                e.custom_tremor.is_some()
                    || e.custom_variable_weights.is_some()
                    || e.custom_tapering.is_some()
            })
        },
        satisfied: |s| edge(s).is_some_and(|e| e.hand_drawn != HandDrawnPreset::None),
        resolve: |s| {
            if let BackendSettings::Edge(e) = &mut s.backend {
                e.hand_drawn = HandDrawnPreset::Subtle;
            }
        },
    },
    DependencyRule {
        fixes: "adaptive_sizing",
        detail: "enabled because gradient_based_sizing requires it",
        active: |s| dots(s).is_some_and(|d| d.gradient_based_sizing),
        satisfied: |s| dots(s).is_some_and(|d| d.adaptive_sizing),
        resolve: |s| {
            if let BackendSettings::Dots(d) = &mut s.backend {
                d.adaptive_sizing = true;
            }
        },
    },
    DependencyRule {
        fixes: "multipass",
        detail: "enabled because reverse_pass requires multipass",
        active: |s| s.shared.reverse_pass,
        satisfied: |s| s.shared.multipass,
        resolve: |s| s.shared.multipass = true,
    },
    DependencyRule {
        fixes: "multipass",
        detail: "enabled because diagonal_pass requires multipass",
        active: |s| s.shared.diagonal_pass,
        satisfied: |s| s.shared.multipass,
        resolve: |s| s.shared.multipass = true,
    },
    DependencyRule {
        fixes: "pass_count",
        detail: "raised to 2 because directional passes need at least two passes",
        active: |s| s.shared.reverse_pass || s.shared.diagonal_pass,
        satisfied: |s| s.shared.pass_count >= 2,
        resolve: |s| s.shared.pass_count = 2,
    },
    DependencyRule {
        fixes: "multipass",
        detail: "enabled because pass_count is greater than 1",
        active: |s| s.shared.pass_count >= 2,
        satisfied: |s| s.shared.multipass,
        resolve: |s| s.shared.multipass = true,
    },
];

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
