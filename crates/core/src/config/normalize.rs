//! The normalization pipeline.
//!
//! Three passes over the raw bag, in order:
//!
//! 1. **Backend-incompatibility rejection** — any backend-specific field
//!    supplied for a foreign backend is fatal; the full list is returned.
//! 2. **Defaults + range clamping** — supplied values overlay the
//!    documented defaults; out-of-bounds numerics are pulled to the
//!    nearest bound and recorded as `Clamped`.
//! 3. **Dependency auto-resolution** — gates implied by their supplied
//!    tuning parameters are turned on, then the dependency table is
//!    evaluated to a fixpoint; every applied fix is recorded as
//!    `AutoFixed`.

use super::bag::ConfigBag;
use super::bounds::{self, FBounds, UBounds};
use super::rules::{BACKEND_FIELDS, DEPENDENCY_RULES, SUPPLIED_IMPLICATIONS};
use super::settings::{
    BackendSettings, CenterlineSettings, DotsSettings, EdgeSettings, EngineSettings,
    SharedSettings, SuperpixelSettings,
};
use super::{Backend, ConfigRejection, NormalizeOutcome, Violation};

/// Backend used when the caller does not pick one.
pub const DEFAULT_BACKEND: Backend = Backend::Edge;

/// Normalize a raw configuration bag into engine-ready settings.
///
/// Pure and deterministic. An empty bag normalizes to the engine's
/// documented defaults with zero violations; normalizing the bag obtained
/// from [`EngineSettings::to_bag`] is a fixed point.
pub fn normalize(bag: &ConfigBag) -> Result<NormalizeOutcome, ConfigRejection> {
    let backend = bag.backend.unwrap_or(DEFAULT_BACKEND);

    // Pass 1: reject fields the selected backend cannot interpret.
    let fatal: Vec<Violation> = BACKEND_FIELDS
        .iter()
        .filter(|f| (f.supplied)(bag) && !f.owner.allows(backend))
        .map(|f| Violation::incompatible(f.name, backend))
        .collect();
    if !fatal.is_empty() {
        return Err(ConfigRejection { violations: fatal });
    }

    // Pass 2: overlay supplied values onto defaults, clamping as we go.
    let mut violations = Vec::new();
    let shared = normalize_shared(bag, &mut violations);
    let variant = match backend {
        Backend::Edge => BackendSettings::Edge(normalize_edge(bag, &mut violations)),
        Backend::Centerline => {
            BackendSettings::Centerline(normalize_centerline(bag, &mut violations))
        }
        Backend::Superpixel => {
            BackendSettings::Superpixel(normalize_superpixel(bag, &mut violations))
        }
        Backend::Dots => BackendSettings::Dots(normalize_dots(bag, &mut violations)),
    };
    let mut settings = EngineSettings {
        shared,
        backend: variant,
    };

    // Pass 3: supplying a tuning parameter without its gate turns the
    // gate on, then feature dependencies resolve to a fixpoint.
    apply_supplied_implications(bag, &mut settings, &mut violations);
    apply_dependencies(&mut settings, &mut violations);

    Ok(NormalizeOutcome {
        settings,
        violations,
    })
}

// ---------------------------------------------------------------------------
// Per-field helpers
// ---------------------------------------------------------------------------

/// Resolve a float field: default when unset, clamped (and recorded) when
/// supplied out of bounds. Non-finite input falls back to the default.
fn fval(
    field: &'static str,
    supplied: Option<f32>,
    default: f32,
    b: FBounds,
    out: &mut Vec<Violation>,
) -> f32 {
    match supplied {
        None => default,
        Some(x) if !x.is_finite() => {
            out.push(Violation::clamped(field, f64::from(x), f64::from(default)));
            default
        }
        Some(x) => {
            let clamped = b.clamp(x);
            if clamped != x {
                out.push(Violation::clamped(field, f64::from(x), f64::from(clamped)));
            }
            clamped
        }
    }
}

/// Resolve an integer field the same way.
fn uval(
    field: &'static str,
    supplied: Option<u32>,
    default: u32,
    b: UBounds,
    out: &mut Vec<Violation>,
) -> u32 {
    match supplied {
        None => default,
        Some(x) => {
            let clamped = b.clamp(x);
            if clamped != x {
                out.push(Violation::clamped(field, f64::from(x), f64::from(clamped)));
            }
            clamped
        }
    }
}

fn bval(supplied: Option<bool>, default: bool) -> bool {
    supplied.unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Per-variant normalization
// ---------------------------------------------------------------------------

fn normalize_shared(bag: &ConfigBag, out: &mut Vec<Violation>) -> SharedSettings {
    let d = SharedSettings::default();
    SharedSettings {
        detail: fval("detail", bag.detail, d.detail, bounds::DETAIL, out),
        stroke_width: fval(
            "stroke_width",
            bag.stroke_width,
            d.stroke_width,
            bounds::STROKE_WIDTH,
            out,
        ),
        multipass: bval(bag.multipass, d.multipass),
        pass_count: uval("pass_count", bag.pass_count, d.pass_count, bounds::PASS_COUNT, out),
        reverse_pass: bval(bag.reverse_pass, d.reverse_pass),
        diagonal_pass: bval(bag.diagonal_pass, d.diagonal_pass),
        directional_threshold: fval(
            "directional_threshold",
            bag.directional_threshold,
            d.directional_threshold,
            bounds::DIRECTIONAL_THRESHOLD,
            out,
        ),
        noise_filtering: bval(bag.noise_filtering, d.noise_filtering),
        noise_filter_spatial_sigma: fval(
            "noise_filter_spatial_sigma",
            bag.noise_filter_spatial_sigma,
            d.noise_filter_spatial_sigma,
            bounds::NOISE_FILTER_SPATIAL_SIGMA,
            out,
        ),
        noise_filter_range_sigma: fval(
            "noise_filter_range_sigma",
            bag.noise_filter_range_sigma,
            d.noise_filter_range_sigma,
            bounds::NOISE_FILTER_RANGE_SIGMA,
            out,
        ),
        background_removal: bval(bag.background_removal, d.background_removal),
        background_removal_strength: fval(
            "background_removal_strength",
            bag.background_removal_strength,
            d.background_removal_strength,
            bounds::BACKGROUND_REMOVAL_STRENGTH,
            out,
        ),
        max_image_size: uval(
            "max_image_size",
            bag.max_image_size,
            d.max_image_size,
            bounds::MAX_IMAGE_SIZE,
            out,
        ),
        svg_precision: uval(
            "svg_precision",
            bag.svg_precision,
            d.svg_precision,
            bounds::SVG_PRECISION,
            out,
        ),
        deadline_override_ms: bag.deadline_override_ms,
    }
}

fn normalize_edge(bag: &ConfigBag, out: &mut Vec<Violation>) -> EdgeSettings {
    let d = EdgeSettings::default();
    EdgeSettings {
        etf_fdog: bval(bag.etf_fdog, d.etf_fdog),
        flow_tracing: bval(bag.flow_tracing, d.flow_tracing),
        bezier_fitting: bval(bag.bezier_fitting, d.bezier_fitting),
        preserve_colors: bval(bag.line_preserve_colors, d.preserve_colors),
        color_accuracy: fval(
            "line_color_accuracy",
            bag.line_color_accuracy,
            d.color_accuracy,
            bounds::COLOR_ACCURACY,
            out,
        ),
        max_colors_per_path: uval(
            "max_colors_per_path",
            bag.max_colors_per_path,
            d.max_colors_per_path,
            bounds::MAX_COLORS_PER_PATH,
            out,
        ),
        hand_drawn: bag.hand_drawn.unwrap_or(d.hand_drawn),
        custom_tremor: bag
            .custom_tremor
            .map(|t| fval("custom_tremor", Some(t), 0.0, bounds::TREMOR, out)),
        custom_variable_weights: bag.custom_variable_weights.map(|w| {
            fval(
                "custom_variable_weights",
                Some(w),
                0.0,
                bounds::VARIABLE_WEIGHTS,
                out,
            )
        }),
        custom_tapering: bag
            .custom_tapering
            .map(|t| fval("custom_tapering", Some(t), 0.0, bounds::TAPERING, out)),
    }
}

fn normalize_centerline(bag: &ConfigBag, out: &mut Vec<Violation>) -> CenterlineSettings {
    let d = CenterlineSettings::default();
    CenterlineSettings {
        adaptive_threshold: bval(bag.adaptive_threshold, d.adaptive_threshold),
        window_size: uval(
            "window_size",
            bag.window_size,
            d.window_size,
            bounds::WINDOW_SIZE,
            out,
        ),
        sensitivity_k: fval(
            "sensitivity_k",
            bag.sensitivity_k,
            d.sensitivity_k,
            bounds::SENSITIVITY_K,
            out,
        ),
        width_modulation: bval(bag.width_modulation, d.width_modulation),
        min_branch_length: fval(
            "min_branch_length",
            bag.min_branch_length,
            d.min_branch_length,
            bounds::MIN_BRANCH_LENGTH,
            out,
        ),
        douglas_peucker_epsilon: fval(
            "douglas_peucker_epsilon",
            bag.douglas_peucker_epsilon,
            d.douglas_peucker_epsilon,
            bounds::DOUGLAS_PEUCKER_EPSILON,
            out,
        ),
        preserve_colors: bval(bag.line_preserve_colors, d.preserve_colors),
        hand_drawn: bag.hand_drawn.unwrap_or(d.hand_drawn),
    }
}

fn normalize_superpixel(bag: &ConfigBag, out: &mut Vec<Violation>) -> SuperpixelSettings {
    let d = SuperpixelSettings::default();
    SuperpixelSettings {
        num_superpixels: uval(
            "num_superpixels",
            bag.num_superpixels,
            d.num_superpixels,
            bounds::NUM_SUPERPIXELS,
            out,
        ),
        compactness: fval(
            "compactness",
            bag.compactness,
            d.compactness,
            bounds::COMPACTNESS,
            out,
        ),
        slic_iterations: uval(
            "slic_iterations",
            bag.slic_iterations,
            d.slic_iterations,
            bounds::SLIC_ITERATIONS,
            out,
        ),
        fill_regions: bval(bag.fill_regions, d.fill_regions),
        stroke_regions: bval(bag.stroke_regions, d.stroke_regions),
        simplify_boundaries: bval(bag.simplify_boundaries, d.simplify_boundaries),
        boundary_epsilon: fval(
            "boundary_epsilon",
            bag.boundary_epsilon,
            d.boundary_epsilon,
            bounds::BOUNDARY_EPSILON,
            out,
        ),
        preserve_colors: bval(bag.superpixel_preserve_colors, d.preserve_colors),
    }
}

fn normalize_dots(bag: &ConfigBag, out: &mut Vec<Violation>) -> DotsSettings {
    let d = DotsSettings::default();
    let mut settings = DotsSettings {
        density: fval(
            "dot_density",
            bag.dot_density,
            d.density,
            bounds::DOT_DENSITY,
            out,
        ),
        min_radius: fval(
            "dot_min_radius",
            bag.dot_min_radius,
            d.min_radius,
            bounds::DOT_RADIUS,
            out,
        ),
        max_radius: fval(
            "dot_max_radius",
            bag.dot_max_radius,
            d.max_radius,
            bounds::DOT_RADIUS,
            out,
        ),
        adaptive_sizing: bval(bag.adaptive_sizing, d.adaptive_sizing),
        poisson_disk_sampling: bval(bag.poisson_disk_sampling, d.poisson_disk_sampling),
        gradient_based_sizing: bval(bag.gradient_based_sizing, d.gradient_based_sizing),
        preserve_colors: bval(bag.dot_preserve_colors, d.preserve_colors),
        background_tolerance: fval(
            "background_tolerance",
            bag.background_tolerance,
            d.background_tolerance,
            bounds::BACKGROUND_TOLERANCE,
            out,
        ),
    };
    repair_dot_radii(&mut settings, out);
    settings
}

/// Ensure `min_radius < max_radius` after clamping.
///
/// An inverted pair is swapped; a degenerate (equal) pair is widened by
/// 0.1 on whichever side has room. Both repairs are recorded `AutoFixed`.
fn repair_dot_radii(settings: &mut DotsSettings, out: &mut Vec<Violation>) {
    if settings.min_radius > settings.max_radius {
        std::mem::swap(&mut settings.min_radius, &mut settings.max_radius);
        out.push(Violation::auto_fixed(
            "dot_min_radius",
            "swapped with dot_max_radius so that min < max",
        ));
    }
    if settings.min_radius == settings.max_radius {
        if settings.max_radius < bounds::DOT_RADIUS.max {
            settings.max_radius = bounds::DOT_RADIUS.clamp(settings.max_radius + 0.1);
        } else {
            settings.min_radius = bounds::DOT_RADIUS.clamp(settings.min_radius - 0.1);
        }
        out.push(Violation::auto_fixed(
            "dot_max_radius",
            "widened a degenerate radius range",
        ));
    }
}

// ---------------------------------------------------------------------------
// Dependency resolution
// ---------------------------------------------------------------------------

/// Turn on gates whose tuning parameters were supplied without them.
///
/// An explicit gate value in the bag is respected, so a bag obtained from
/// [`EngineSettings::to_bag`] (where every gate is present) never fires
/// these again. Backend mismatches cannot reach here — a tuning field
/// under a foreign backend is fatal in pass 1.
fn apply_supplied_implications(
    bag: &ConfigBag,
    settings: &mut EngineSettings,
    out: &mut Vec<Violation>,
) {
    for rule in SUPPLIED_IMPLICATIONS {
        if (rule.tuning_supplied)(bag) && !(rule.gate_supplied)(bag) && !(rule.satisfied)(settings)
        {
            (rule.resolve)(settings);
            out.push(Violation::auto_fixed(rule.fixes, rule.detail));
        }
    }
}

/// Evaluate the dependency rule table until no rule fires.
///
/// The table is acyclic, so the loop is bounded by the number of rules.
fn apply_dependencies(settings: &mut EngineSettings, out: &mut Vec<Violation>) {
    loop {
        let mut changed = false;
        for rule in DEPENDENCY_RULES {
            if (rule.active)(settings) && !(rule.satisfied)(settings) {
                (rule.resolve)(settings);
                out.push(Violation::auto_fixed(rule.fixes, rule.detail));
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
