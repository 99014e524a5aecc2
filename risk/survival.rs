use ndarray::{Array1, ArrayView1};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("Row has {found} columns, but the model was trained on {expected}.")]
    MismatchedFeatureCount { found: usize, expected: usize },
    #[error("Row contains a non-finite value in column {column}.")]
    NonFiniteInput { column: usize },
    #[error("Model returned {found} survival functions for a single-row batch.")]
    UnexpectedBatchSize { found: usize },
    #[error("Time {time} lies outside the survival function domain [{lower}, {upper}].")]
    OutsideDomain { time: f64, lower: f64, upper: f64 },
    #[error("Survival function is malformed: {0}")]
    InvalidCurve(String),
}

/// A right-continuous step function giving the probability of no event by time `t`.
///
/// The value at `t` is the probability at the last knot not after `t`. Before the
/// first knot nothing has happened yet, so the value is 1. The domain ends at the
/// last knot; evaluating past it is an error rather than an extrapolation.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalFunction {
    times: Array1<f64>,
    probabilities: Array1<f64>,
}

impl SurvivalFunction {
    /// Builds a curve, checking that it is a valid survival function: strictly
    /// increasing non-negative times, probabilities in [0, 1] that never increase.
    pub fn new(times: Array1<f64>, probabilities: Array1<f64>) -> Result<Self, PredictionError> {
        if times.is_empty() {
            return Err(PredictionError::InvalidCurve("no knot points".to_string()));
        }
        if times.len() != probabilities.len() {
            return Err(PredictionError::InvalidCurve(format!(
                "{} time points but {} probabilities",
                times.len(),
                probabilities.len()
            )));
        }
        check_time_grid(times.view()).map_err(PredictionError::InvalidCurve)?;
        check_survival_values(probabilities.view()).map_err(PredictionError::InvalidCurve)?;
        Ok(Self {
            times,
            probabilities,
        })
    }

    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    pub fn probabilities(&self) -> ArrayView1<'_, f64> {
        self.probabilities.view()
    }

    /// Raw `(time, probability)` knot points, in time order.
    pub fn knots(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.probabilities.iter().copied())
    }

    /// Last time point at which the function is defined.
    pub fn domain_end(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    pub fn evaluate(&self, time: f64) -> Result<f64, PredictionError> {
        let upper = self.domain_end();
        if !time.is_finite() || time < 0.0 || time > upper {
            return Err(PredictionError::OutsideDomain {
                time,
                lower: 0.0,
                upper,
            });
        }
        // Number of knots at or before `time`.
        let reached = self.times.iter().take_while(|&&t| t <= time).count();
        if reached == 0 {
            Ok(1.0)
        } else {
            Ok(self.probabilities[reached - 1])
        }
    }
}

/// Validates an event-time grid. Shared with the forest loader.
pub(crate) fn check_time_grid(times: ArrayView1<'_, f64>) -> Result<(), String> {
    for (idx, &t) in times.iter().enumerate() {
        if !t.is_finite() || t < 0.0 {
            return Err(format!("time point {idx} is {t}, expected a finite value >= 0"));
        }
        if idx > 0 && t <= times[idx - 1] {
            return Err(format!(
                "time points must be strictly increasing, but {} follows {}",
                t,
                times[idx - 1]
            ));
        }
    }
    Ok(())
}

/// Validates that a sequence is a survival curve: bounded in [0, 1] and non-increasing.
pub(crate) fn check_survival_values(values: ArrayView1<'_, f64>) -> Result<(), String> {
    for (idx, &s) in values.iter().enumerate() {
        if !(0.0..=1.0).contains(&s) {
            return Err(format!("probability {idx} is {s}, expected a value in [0, 1]"));
        }
        if idx > 0 && s > values[idx - 1] {
            return Err(format!(
                "probabilities must not increase over time, but {} follows {}",
                s,
                values[idx - 1]
            ));
        }
    }
    Ok(())
}
