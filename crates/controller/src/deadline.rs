//! Deadline computation.
//!
//! Each job races against one effective deadline derived in three steps:
//! a base (default or caller override), a size multiplier tiered by input
//! pixel count, and an emergency cutoff applied when a configuration is
//! on the known-pathological list. Pathological combinations hang rather
//! than run slowly, so a tighter bound fails them faster and more
//! actionably.
//!
//! All thresholds here are tuning data, not load-bearing constants.

use tracekit_core::config::{BackendSettings, EngineSettings};
use tracekit_core::types::ImageDescriptor;

/// Default base deadline in milliseconds.
pub const DEFAULT_BASE_MS: u64 = 30_000;

/// Default emergency cutoff in milliseconds.
pub const DEFAULT_EMERGENCY_MS: u64 = 10_000;

/// One size bucket: inputs up to `max_pixels` get `multiplier` times the
/// base deadline.
#[derive(Debug, Clone, Copy)]
pub struct SizeTier {
    pub max_pixels: u64,
    pub multiplier: f64,
}

/// A feature+backend combination empirically known to hang the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownPathology {
    /// The edge backend with flow-guided tracing enabled.
    EdgeFlowTracing,
}

impl KnownPathology {
    pub fn matches(self, settings: &EngineSettings) -> bool {
        match self {
            KnownPathology::EdgeFlowTracing => match &settings.backend {
                BackendSettings::Edge(edge) => edge.flow_tracing,
                _ => false,
            },
        }
    }
}

/// The resolved deadline for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveDeadline {
    pub deadline_ms: u64,
    /// Whether the emergency cutoff applied.
    pub emergency: bool,
}

/// Deadline tuning data.
#[derive(Debug, Clone)]
pub struct DeadlinePolicy {
    /// Base deadline when the caller supplies no override.
    pub base_ms: u64,
    /// Size buckets in ascending `max_pixels` order. Inputs larger than
    /// every bucket use `oversize_multiplier`.
    pub size_tiers: Vec<SizeTier>,
    pub oversize_multiplier: f64,
    /// Cutoff applied to pathological configurations. Strictly shorter
    /// than any derived deadline it replaces.
    pub emergency_ms: u64,
    pub pathologies: Vec<KnownPathology>,
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BASE_MS,
            size_tiers: vec![
                SizeTier {
                    max_pixels: 1_000_000,
                    multiplier: 1.0,
                },
                SizeTier {
                    max_pixels: 4_000_000,
                    multiplier: 1.5,
                },
                SizeTier {
                    max_pixels: 8_000_000,
                    multiplier: 2.0,
                },
            ],
            oversize_multiplier: 3.0,
            emergency_ms: DEFAULT_EMERGENCY_MS,
            pathologies: vec![KnownPathology::EdgeFlowTracing],
        }
    }
}

impl DeadlinePolicy {
    /// Compute the effective deadline for one job.
    ///
    /// Caller override (via normalized settings) replaces the base; the
    /// size multiplier applies on top of either; the emergency cutoff
    /// then caps the result for pathological configurations.
    pub fn effective_deadline(
        &self,
        image: &ImageDescriptor,
        settings: &EngineSettings,
    ) -> EffectiveDeadline {
        let base = settings.shared.deadline_override_ms.unwrap_or(self.base_ms);
        let derived = (base as f64 * self.size_multiplier(image.pixel_count())) as u64;

        let pathological = self.pathologies.iter().any(|p| p.matches(settings));
        if pathological && self.emergency_ms < derived {
            EffectiveDeadline {
                deadline_ms: self.emergency_ms,
                emergency: true,
            }
        } else {
            EffectiveDeadline {
                deadline_ms: derived,
                emergency: false,
            }
        }
    }

    fn size_multiplier(&self, pixels: u64) -> f64 {
        for tier in &self.size_tiers {
            if pixels <= tier.max_pixels {
                return tier.multiplier;
            }
        }
        self.oversize_multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracekit_core::config::Backend;

    fn image(width: u32, height: u32) -> ImageDescriptor {
        ImageDescriptor {
            pixels: Vec::new(),
            width,
            height,
        }
    }

    fn edge_settings() -> EngineSettings {
        EngineSettings::default_for(Backend::Edge)
    }

    fn flow_tracing_settings() -> EngineSettings {
        let mut settings = edge_settings();
        if let BackendSettings::Edge(edge) = &mut settings.backend {
            edge.flow_tracing = true;
            edge.etf_fdog = true;
        }
        settings
    }

    #[test]
    fn small_inputs_get_the_base_deadline() {
        let policy = DeadlinePolicy::default();
        let d = policy.effective_deadline(&image(800, 600), &edge_settings());
        assert_eq!(d.deadline_ms, 30_000);
        assert!(!d.emergency);
    }

    #[test]
    fn deadline_grows_by_tier_not_linearly() {
        let policy = DeadlinePolicy::default();
        // 2 MP -> x1.5
        assert_eq!(
            policy
                .effective_deadline(&image(2000, 1000), &edge_settings())
                .deadline_ms,
            45_000
        );
        // 6 MP -> x2.0
        assert_eq!(
            policy
                .effective_deadline(&image(3000, 2000), &edge_settings())
                .deadline_ms,
            60_000
        );
        // 12 MP -> oversize x3.0, not 12x anything
        assert_eq!(
            policy
                .effective_deadline(&image(4000, 3000), &edge_settings())
                .deadline_ms,
            90_000
        );
    }

    #[test]
    fn caller_override_replaces_the_base() {
        let policy = DeadlinePolicy::default();
        let mut settings = edge_settings();
        settings.shared.deadline_override_ms = Some(5_000);
        let d = policy.effective_deadline(&image(800, 600), &settings);
        assert_eq!(d.deadline_ms, 5_000);
    }

    #[test]
    fn pathological_combination_takes_the_emergency_cutoff() {
        let policy = DeadlinePolicy::default();
        let d = policy.effective_deadline(&image(3000, 2000), &flow_tracing_settings());
        assert_eq!(d.deadline_ms, 10_000);
        assert!(d.emergency);
    }

    #[test]
    fn emergency_never_lengthens_a_short_deadline() {
        let policy = DeadlinePolicy::default();
        let mut settings = flow_tracing_settings();
        settings.shared.deadline_override_ms = Some(2_000);
        let d = policy.effective_deadline(&image(800, 600), &settings);
        assert_eq!(d.deadline_ms, 2_000);
        assert!(!d.emergency);
    }

    #[test]
    fn non_pathological_backends_are_unaffected() {
        let policy = DeadlinePolicy::default();
        let d = policy.effective_deadline(
            &image(800, 600),
            &EngineSettings::default_for(Backend::Dots),
        );
        assert!(!d.emergency);
        assert_eq!(d.deadline_ms, 30_000);
    }
}
