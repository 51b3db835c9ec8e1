//! Inference limits.

use serde::Deserialize;

/// Bounds on the two fixpoint loops of an inference run.
///
/// Loaded from the `[infer]` table of a `garnet.toml` by the driver; every
/// field falls back to its default when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InferConfig {
    /// Re-inference passes allowed for one recursive specialization (and for
    /// one loop body or block body) before it is reported as non-convergent.
    pub max_fixpoint_passes: u32,
    /// Whole-program passes allowed while instance-variable tables keep
    /// widening.
    pub max_program_passes: u32,
    /// Specializations allowed to be open at once, each inferred from inside
    /// the previous one.
    pub max_specialization_depth: u32,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            max_fixpoint_passes: 16,
            max_program_passes: 8,
            max_specialization_depth: 64,
        }
    }
}
