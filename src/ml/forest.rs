use crate::error::{AppError, Result};
use crate::ml::models::{ClassWeight, Hyperparameters};
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bagged ensemble of decision trees over a binary target.
///
/// Each tree is grown on a bootstrap sample with class-balancing sample
/// weights. The positive-class probability is the fraction of trees voting 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: Hyperparameters,
    trees: Vec<DecisionTree<f64, usize>>,
    n_features: usize,
}

impl RandomForest {
    /// Fit the ensemble. Trees are grown in parallel, each from its own
    /// seed derived from `seed`, so results are reproducible.
    pub fn fit(x: &Array2<f64>, y: &[u8], params: &Hyperparameters, seed: u64) -> Result<Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(AppError::Training(format!(
                "cannot fit a forest on a {}x{} matrix",
                n_samples, n_features
            )));
        }
        if y.len() != n_samples {
            return Err(AppError::Training(format!(
                "{} labels for {} rows",
                y.len(),
                n_samples
            )));
        }
        if params.n_estimators == 0 {
            return Err(AppError::Training("n_estimators must be positive".to_string()));
        }

        let labels: Vec<usize> = y.iter().map(|&v| usize::from(v > 0)).collect();
        let global_weights = balanced_weights(&labels);

        let trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                let boot_labels: Vec<usize> = sample.iter().map(|&j| labels[j]).collect();

                let class_weights = match params.class_weight {
                    ClassWeight::Balanced => global_weights,
                    ClassWeight::BalancedSubsample => balanced_weights(&boot_labels),
                };
                fit_tree(x.select(Axis(0), &sample), boot_labels, class_weights, params)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            params: params.clone(),
            trees,
            n_features,
        })
    }

    /// Fraction of trees voting for the positive class, per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features {
            return Err(AppError::Prediction(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }

        let votes = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .reduce(
                || Array1::<usize>::zeros(x.nrows()),
                |acc, predicted| acc + predicted,
            );

        let n_trees = self.trees.len() as f64;
        Ok(votes.iter().map(|&v| v as f64 / n_trees).collect())
    }

    /// Impurity-based importances averaged over trees, summing to 1
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (total, value) in totals.iter_mut().zip(tree.feature_importance()) {
                *total += value;
            }
        }

        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

/// `n_samples / (n_classes * count)` per class; absent classes weigh 0
fn balanced_weights(labels: &[usize]) -> [f64; 2] {
    let mut counts = [0usize; 2];
    for &label in labels {
        counts[label.min(1)] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1);
    let n = labels.len() as f64;

    let mut weights = [0.0; 2];
    for (weight, &count) in weights.iter_mut().zip(&counts) {
        if count > 0 {
            *weight = n / (present as f64 * count as f64);
        }
    }
    weights
}

fn fit_tree(
    records: Array2<f64>,
    labels: Vec<usize>,
    class_weights: [f64; 2],
    params: &Hyperparameters,
) -> Result<DecisionTree<f64, usize>> {
    let weights: Array1<f32> = labels
        .iter()
        .map(|&label| class_weights[label] as f32)
        .collect();

    // leaf size is expressed in sample weight, so scale by the lightest sample
    let unit = weights
        .iter()
        .copied()
        .filter(|w| *w > 0.0)
        .fold(f32::INFINITY, f32::min);
    let unit = if unit.is_finite() { unit } else { 1.0 };
    let min_leaf = params.min_samples_leaf.max(1) as f32 * unit;

    let dataset = Dataset::new(records, Array1::from(labels)).with_weights(weights);

    DecisionTree::params()
        .split_quality(SplitQuality::Gini)
        .max_depth(params.max_depth)
        .min_weight_leaf(min_leaf)
        .min_weight_split(2.0 * min_leaf)
        .fit(&dataset)
        .map_err(|e| AppError::Training(format!("decision tree fit failed: {}", e)))
}
