//! The scoring law: five rubric inputs in, one 0–100 integer out.
//!
//! ```text
//! score = 100 × (0.30·ms + 0.20·nov + 0.20·mon
//!                + 0.15·(5 − ci)/5 + 0.15·(5 − ec)/5) / 5
//! ```
//!
//! Competition intensity (`ci`) and execution complexity (`ec`) are
//! inverted: more of either lowers the score. The raw value is rounded
//! half-up and clamped to `[0, 100]`.
//!
//! The arithmetic is evaluated in `f64` in exactly the order above.
//! Reordering it can move a stored score by one point, so don't.
//!
//! Inputs are expected in `[0, 5]`. They are not re-validated here.

use crate::models::RubricInputs;

/// Round half-up to the nearest integer and clamp into `[0, 100]`.
///
/// `f64::round` rounds half away from zero, which matches half-up for
/// every value that survives the lower clamp.
pub fn clamp_score(score: f64) -> i64 {
    score.round().clamp(0.0, 100.0) as i64
}

/// Compute the 0–100 score for a set of rubric inputs.
pub fn compute_score(inputs: &RubricInputs) -> i64 {
    let ms = inputs.market_size as f64;
    let ci = inputs.competition_intensity as f64;
    let nov = inputs.novelty as f64;
    let ec = inputs.execution_complexity as f64;
    let mon = inputs.monetization_clarity as f64;

    let raw = 100.0
        * (0.3 * ms + 0.2 * nov + 0.2 * mon + 0.15 * (5.0 - ci) / 5.0
            + 0.15 * (5.0 - ec) / 5.0)
        / 5.0;

    clamp_score(raw)
}
