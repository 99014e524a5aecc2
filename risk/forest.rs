use crate::survival::{PredictionError, SurvivalFunction, check_survival_values, check_time_grid};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// The one capability the pipeline needs from a trained model.
///
/// Rows are positional: column `j` of every row must hold the feature at
/// position `j` of the schema the model was trained with.
pub trait SurvivalModel: Send + Sync {
    /// Number of columns each row must have.
    fn n_features(&self) -> usize;

    /// Produces one survival function per row, in row order.
    fn predict_survival_function(
        &self,
        rows: ArrayView2<'_, f64>,
    ) -> Result<Vec<SurvivalFunction>, PredictionError>;
}

/// A node of a fitted survival tree, as stored in the model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Rows with `x[feature] <= threshold` continue at `left`, the rest at `right`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Survival probabilities on the forest's `unique_times` grid.
    Leaf { survival: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalTree {
    pub nodes: Vec<TreeNode>,
}

impl SurvivalTree {
    /// Walks from the root to the leaf that `row` falls into.
    ///
    /// Children always sit after their parent, which `validate` enforces, so the
    /// walk terminates.
    fn leaf_for(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { survival } => return survival,
            }
        }
    }

    fn validate(&self, n_features: usize, n_times: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {idx} splits on feature {feature}, but the model has {n_features} features"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx} has a non-finite threshold"));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!(
                                "node {idx} points to child {child}; children must follow their parent within {} nodes",
                                self.nodes.len()
                            ));
                        }
                    }
                }
                TreeNode::Leaf { survival } => {
                    if survival.len() != n_times {
                        return Err(format!(
                            "leaf {idx} has {} survival values for {n_times} time points",
                            survival.len()
                        ));
                    }
                    check_survival_values(ArrayView1::from(survival.as_slice()))
                        .map_err(|reason| format!("leaf {idx}: {reason}"))?;
                }
            }
        }
        Ok(())
    }
}

/// A random survival forest: the ensemble survival function of a row is the mean
/// of the leaf survival functions it reaches across all trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomSurvivalForest {
    pub n_features: usize,
    /// Event times seen during training, ascending, in years.
    pub unique_times: Vec<f64>,
    pub trees: Vec<SurvivalTree>,
}

impl RandomSurvivalForest {
    /// Checks the structural invariants prediction relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.n_features == 0 {
            return Err("model declares zero features".to_string());
        }
        if self.unique_times.is_empty() {
            return Err("model has an empty time grid".to_string());
        }
        check_time_grid(ArrayView1::from(self.unique_times.as_slice()))?;
        if self.trees.is_empty() {
            return Err("model has no trees".to_string());
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.unique_times.len())
                .map_err(|reason| format!("tree {idx}: {reason}"))?;
        }
        Ok(())
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> Result<SurvivalFunction, PredictionError> {
        // Trees are summed in storage order so repeated calls agree bit for bit.
        let mut total = Array1::<f64>::zeros(self.unique_times.len());
        for tree in &self.trees {
            total += &ArrayView1::from(tree.leaf_for(row));
        }
        total /= self.trees.len() as f64;
        SurvivalFunction::new(Array1::from(self.unique_times.clone()), total)
    }
}

impl SurvivalModel for RandomSurvivalForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_survival_function(
        &self,
        rows: ArrayView2<'_, f64>,
    ) -> Result<Vec<SurvivalFunction>, PredictionError> {
        if rows.ncols() != self.n_features {
            return Err(PredictionError::MismatchedFeatureCount {
                found: rows.ncols(),
                expected: self.n_features,
            });
        }
        if let Some(pos) = rows.iter().position(|v| !v.is_finite()) {
            return Err(PredictionError::NonFiniteInput {
                column: pos % self.n_features,
            });
        }
        rows.axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| self.predict_row(row))
            .collect()
    }
}
