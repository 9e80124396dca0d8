// ============================================
// Decay Engine
// ============================================
//
// Exponential recency decay with a half-life measured in days:
//
//     factor = 0.5 ^ (Δdays / half_life)
//
// Δdays = reference - event, fractional. A future event yields a factor
// above 1.0 (growth); callers that need decay-only semantics clamp upstream.
//
// Degenerate half-lives:
// - ∞ (`NO_DECAY`): factor is exactly 1.0 for every input
// - 0: a step function, 1.0 at Δ = 0, 0.0 for Δ > 0, +∞ for Δ < 0
//
// Nothing here returns an error; non-finite results follow IEEE semantics
// and are sanitised by the consumers (see services::knn).

use crate::services::preprocess::DwellTimeMatrix;
use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayView1};
use tracing::debug;

/// Half-life that disables decay.
pub const NO_DECAY: f64 = f64::INFINITY;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Fractional days between `event` and `reference` (positive when the event
/// happened before the reference).
pub fn days_between(reference: DateTime<Utc>, event: DateTime<Utc>) -> f64 {
    (reference - event).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// Decay factor for a gap of `delta_days` under `half_life_days`.
pub fn decay_for_delta(delta_days: f64, half_life_days: f64) -> f64 {
    if half_life_days == f64::INFINITY {
        return 1.0;
    }
    if half_life_days == 0.0 {
        return if delta_days == 0.0 {
            1.0
        } else if delta_days > 0.0 {
            0.0
        } else {
            f64::INFINITY
        };
    }
    0.5_f64.powf(delta_days / half_life_days)
}

/// `0.5 ^ ((reference - event) / half_life)` with the gap in days.
pub fn decay_factor(reference: DateTime<Utc>, event: DateTime<Utc>, half_life_days: f64) -> f64 {
    decay_for_delta(days_between(reference, event), half_life_days)
}

/// Vectorised [`decay_factor`] over a slice of event times.
pub fn decay_factors(
    reference: DateTime<Utc>,
    events: &[DateTime<Utc>],
    half_life_days: f64,
) -> Array1<f64> {
    events
        .iter()
        .map(|event| decay_factor(reference, *event, half_life_days))
        .collect()
}

/// `values * decay_for_delta(delta_days, half_life_days)`, elementwise.
///
/// Chaining is exact because `0.5^((T3-T1)/h) = 0.5^((T3-T2)/h) * 0.5^((T2-T1)/h)`,
/// which is what [`cumulative_time_decay`] relies on.
pub fn apply_decay(values: ArrayView1<'_, f64>, delta_days: f64, half_life_days: f64) -> Array1<f64> {
    let factor = decay_for_delta(delta_days, half_life_days);
    values.mapv(|v| v * factor)
}

/// Per user, rolls dwell time forward through the user's dates:
/// `row[t] += decay(row[t-1], date[t] - date[t-1])`. The chain restarts at
/// each new user. Rows must be sorted by (user, date), which
/// [`DwellTimeMatrix`] guarantees.
pub fn cumulative_time_decay(matrix: &DwellTimeMatrix, half_life_days: f64) -> DwellTimeMatrix {
    let mut values = matrix.values().to_owned();
    let rows = matrix.rows();

    for i in 1..rows.len() {
        let (prev_user, prev_date) = &rows[i - 1];
        let (user, date) = &rows[i];
        if user != prev_user {
            continue;
        }

        let delta_days = (*date - *prev_date).num_days() as f64;
        let factor = decay_for_delta(delta_days, half_life_days);
        let previous = values.row(i - 1).to_owned();
        values.row_mut(i).scaled_add(factor, &previous);
    }

    debug!(
        rows = rows.len(),
        items = matrix.items().len(),
        half_life_days,
        "Cumulative time decay applied"
    );

    matrix.with_values(values)
}

/// Decay settings handed to the components that need them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayEngine {
    half_life_days: f64,
}

impl DecayEngine {
    pub fn new(half_life_days: f64) -> Self {
        Self { half_life_days }
    }

    pub fn no_decay() -> Self {
        Self::new(NO_DECAY)
    }

    pub fn half_life_days(&self) -> f64 {
        self.half_life_days
    }

    pub fn factor(&self, reference: DateTime<Utc>, event: DateTime<Utc>) -> f64 {
        decay_factor(reference, event, self.half_life_days)
    }

    pub fn factors(&self, reference: DateTime<Utc>, events: &[DateTime<Utc>]) -> Array1<f64> {
        decay_factors(reference, events, self.half_life_days)
    }

    pub fn apply(&self, values: ArrayView1<'_, f64>, delta_days: f64) -> Array1<f64> {
        apply_decay(values, delta_days, self.half_life_days)
    }

    pub fn cumulative(&self, matrix: &DwellTimeMatrix) -> DwellTimeMatrix {
        cumulative_time_decay(matrix, self.half_life_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ndarray::array;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_decay_at_reference_is_one() {
        for half_life in [0.5, 1.0, 10.0, 365.0] {
            assert_eq!(decay_factor(reference(), reference(), half_life), 1.0);
        }
    }

    #[test]
    fn test_decay_one_half_life() {
        let event = reference() - Duration::days(10);
        assert!((decay_factor(reference(), event, 10.0) - 0.5).abs() < 1e-12);

        let event = reference() - Duration::days(20);
        assert!((decay_factor(reference(), event, 10.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_decay_bounds_for_past_events() {
        for days in [0_i64, 1, 3, 30, 400] {
            for half_life in [0.1, 1.0, 7.0, 90.0] {
                let factor = decay_factor(reference(), reference() - Duration::days(days), half_life);
                assert!(factor > 0.0 && factor <= 1.0, "factor {} out of bounds", factor);
            }
        }
    }

    #[test]
    fn test_fractional_days() {
        let event = reference() - Duration::hours(12);
        let expected = 0.5_f64.powf(0.5);
        assert!((decay_factor(reference(), event, 1.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_infinite_half_life_never_decays() {
        for days in [-30_i64, 0, 1, 10_000] {
            let event = reference() - Duration::days(days);
            assert_eq!(decay_factor(reference(), event, NO_DECAY), 1.0);
        }
    }

    #[test]
    fn test_future_event_grows() {
        let event = reference() + Duration::days(10);
        assert!((decay_factor(reference(), event, 10.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_half_life_is_step_function() {
        assert_eq!(decay_factor(reference(), reference(), 0.0), 1.0);
        assert_eq!(
            decay_factor(reference(), reference() - Duration::hours(1), 0.0),
            0.0
        );
        assert_eq!(
            decay_factor(reference(), reference() + Duration::hours(1), 0.0),
            f64::INFINITY
        );
    }

    #[test]
    fn test_chained_decay_identity() {
        let t3 = reference();
        let t2 = t3 - Duration::hours(50);
        let t1 = t2 - Duration::days(4);
        let half_life = 3.5;

        let direct = decay_factor(t3, t1, half_life);
        let chained = decay_factor(t3, t2, half_life) * decay_factor(t2, t1, half_life);
        assert!((direct - chained).abs() < 1e-12);
    }

    #[test]
    fn test_decay_factors_vectorised() {
        let events = vec![
            reference(),
            reference() - Duration::days(2),
            reference() - Duration::days(4),
        ];
        let factors = decay_factors(reference(), &events, 2.0);
        assert_eq!(factors.len(), 3);
        assert!((factors[0] - 1.0).abs() < 1e-12);
        assert!((factors[1] - 0.5).abs() < 1e-12);
        assert!((factors[2] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_apply_decay() {
        let values = array![4.0, 8.0, 0.0];
        let decayed = apply_decay(values.view(), 1.0, 1.0);
        assert_eq!(decayed, array![2.0, 4.0, 0.0]);

        let untouched = apply_decay(values.view(), 5.0, NO_DECAY);
        assert_eq!(untouched, values);
    }

    #[test]
    fn test_engine_wraps_half_life() {
        let engine = DecayEngine::new(10.0);
        let event = reference() - Duration::days(10);
        assert!((engine.factor(reference(), event) - 0.5).abs() < 1e-12);
        assert_eq!(DecayEngine::no_decay().factor(reference(), event), 1.0);
    }
}
