use crate::align::AlignedRow;
use crate::forest::SurvivalModel;
use crate::survival::{PredictionError, SurvivalFunction};
use ndarray::Axis;

/// Runs the model on a single aligned row and returns its survival function.
///
/// Every call is a fresh prediction; nothing is cached or retried.
pub fn predict(
    model: &dyn SurvivalModel,
    row: &AlignedRow,
) -> Result<SurvivalFunction, PredictionError> {
    let batch = row.values().insert_axis(Axis(0));
    let mut functions = model.predict_survival_function(batch)?;
    if functions.len() != 1 {
        return Err(PredictionError::UnexpectedBatchSize {
            found: functions.len(),
        });
    }
    Ok(functions.remove(0))
}
