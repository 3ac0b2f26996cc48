//! Documented parameter bounds.
//!
//! Every numeric field the normalizer clamps has its range declared here,
//! in one place, so the clamping pass and the documentation cannot drift
//! apart.

/// Inclusive bounds for a float parameter.
#[derive(Debug, Clone, Copy)]
pub struct FBounds {
    pub min: f32,
    pub max: f32,
}

impl FBounds {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Inclusive bounds for an integer parameter.
#[derive(Debug, Clone, Copy)]
pub struct UBounds {
    pub min: u32,
    pub max: u32,
}

impl UBounds {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: u32) -> u32 {
        value.clamp(self.min, self.max)
    }
}

// -- shared ------------------------------------------------------------------

pub const DETAIL: FBounds = FBounds::new(0.0, 1.0);
pub const STROKE_WIDTH: FBounds = FBounds::new(0.1, 10.0);
pub const PASS_COUNT: UBounds = UBounds::new(1, 10);
pub const DIRECTIONAL_THRESHOLD: FBounds = FBounds::new(0.0, 1.0);
pub const NOISE_FILTER_SPATIAL_SIGMA: FBounds = FBounds::new(0.5, 5.0);
pub const NOISE_FILTER_RANGE_SIGMA: FBounds = FBounds::new(10.0, 100.0);
pub const BACKGROUND_REMOVAL_STRENGTH: FBounds = FBounds::new(0.0, 1.0);
pub const MAX_IMAGE_SIZE: UBounds = UBounds::new(512, 8192);
pub const SVG_PRECISION: UBounds = UBounds::new(0, 4);

// -- edge --------------------------------------------------------------------

pub const COLOR_ACCURACY: FBounds = FBounds::new(0.0, 1.0);
pub const MAX_COLORS_PER_PATH: UBounds = UBounds::new(1, 10);
pub const TREMOR: FBounds = FBounds::new(0.0, 0.5);
pub const VARIABLE_WEIGHTS: FBounds = FBounds::new(0.0, 1.0);
pub const TAPERING: FBounds = FBounds::new(0.0, 1.0);

// -- centerline --------------------------------------------------------------

pub const WINDOW_SIZE: UBounds = UBounds::new(15, 50);
pub const SENSITIVITY_K: FBounds = FBounds::new(0.1, 1.0);
pub const MIN_BRANCH_LENGTH: FBounds = FBounds::new(4.0, 24.0);
pub const DOUGLAS_PEUCKER_EPSILON: FBounds = FBounds::new(0.5, 3.0);

// -- superpixel --------------------------------------------------------------

pub const NUM_SUPERPIXELS: UBounds = UBounds::new(20, 1000);
pub const COMPACTNESS: FBounds = FBounds::new(1.0, 50.0);
pub const SLIC_ITERATIONS: UBounds = UBounds::new(5, 15);
pub const BOUNDARY_EPSILON: FBounds = FBounds::new(0.5, 3.0);

// -- dots --------------------------------------------------------------------

pub const DOT_DENSITY: FBounds = FBounds::new(0.0, 1.0);
pub const DOT_RADIUS: FBounds = FBounds::new(0.1, 10.0);
pub const BACKGROUND_TOLERANCE: FBounds = FBounds::new(0.0, 1.0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fbounds_clamps_both_ends() {
        assert_eq!(STROKE_WIDTH.clamp(999.0), 10.0);
        assert_eq!(STROKE_WIDTH.clamp(0.0), 0.1);
        assert_eq!(STROKE_WIDTH.clamp(1.5), 1.5);
    }

    #[test]
    fn ubounds_clamps_both_ends() {
        assert_eq!(PASS_COUNT.clamp(0), 1);
        assert_eq!(PASS_COUNT.clamp(99), 10);
        assert_eq!(PASS_COUNT.clamp(3), 3);
    }

    #[test]
    fn contains_matches_clamp_fixpoints() {
        assert!(DETAIL.contains(0.0));
        assert!(DETAIL.contains(1.0));
        assert!(!DETAIL.contains(1.01));
    }
}
