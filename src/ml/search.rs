use crate::data::table::Table;
use crate::error::{AppError, Result};
use crate::ml::evaluation::recall_score;
use crate::ml::models::{ClassWeight, Hyperparameters};
use crate::ml::pipeline::{RiskModel, RiskPipeline};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Stratified train/test split; returns `(train, test)` row indices.
///
/// Each class contributes `round(count * test_size)` rows to the test side.
pub fn stratified_split(y: &[u8], test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(0.0..1.0).contains(&test_size) || test_size == 0.0 {
        return Err(AppError::Validation(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for mut members in class_members(y) {
        members.shuffle(&mut rng);
        let n_test = (members.len() as f64 * test_size).round() as usize;
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    if train.is_empty() || test.is_empty() {
        return Err(AppError::Training(format!(
            "split of {} rows left an empty side",
            y.len()
        )));
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok((train, test))
}

/// Stratified k-fold; returns `(train, validation)` index pairs
pub fn stratified_kfold(y: &[u8], k: usize, seed: u64) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if k < 2 {
        return Err(AppError::Validation(format!("need at least 2 folds, got {}", k)));
    }
    if y.len() < k {
        return Err(AppError::Training(format!(
            "cannot build {} folds from {} rows",
            k,
            y.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; y.len()];
    let mut next = 0;
    for mut members in class_members(y) {
        members.shuffle(&mut rng);
        for idx in members {
            fold_of[idx] = next % k;
            next += 1;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (validation, train): (Vec<usize>, Vec<usize>) =
                (0..y.len()).partition(|&i| fold_of[i] == fold);
            (train, validation)
        })
        .collect())
}

fn class_members(y: &[u8]) -> [Vec<usize>; 2] {
    let mut members = [Vec::new(), Vec::new()];
    for (i, &label) in y.iter().enumerate() {
        members[usize::from(label > 0)].push(i);
    }
    members
}

/// Hyperparameter grid the search samples from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_leaf: Vec<usize>,
    pub class_weight: Vec<ClassWeight>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            n_estimators: vec![100, 200, 300],
            max_depth: vec![Some(10), Some(20), None],
            min_samples_leaf: vec![1, 2, 4],
            class_weight: vec![ClassWeight::Balanced, ClassWeight::BalancedSubsample],
        }
    }
}

impl SearchSpace {
    /// Every combination, in a fixed order
    pub fn grid(&self) -> Vec<Hyperparameters> {
        let mut grid = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_leaf in &self.min_samples_leaf {
                    for &class_weight in &self.class_weight {
                        grid.push(Hyperparameters {
                            n_estimators,
                            max_depth,
                            min_samples_leaf,
                            class_weight,
                        });
                    }
                }
            }
        }
        grid
    }

    /// Draw up to `n_iter` distinct combinations
    pub fn sample(&self, n_iter: usize, seed: u64) -> Vec<Hyperparameters> {
        let grid = self.grid();
        let amount = n_iter.min(grid.len());
        let mut rng = StdRng::seed_from_u64(seed);
        index::sample(&mut rng, grid.len(), amount)
            .into_iter()
            .map(|i| grid[i].clone())
            .collect()
    }
}

/// Cross-validated score of one sampled combination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub params: Hyperparameters,
    pub fold_recalls: Vec<f64>,
    pub mean_recall: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub best_params: Hyperparameters,
    pub best_score: f64,
    pub trials: Vec<TrialResult>,
}

/// Randomized search scored by cross-validated recall
#[derive(Debug, Clone)]
pub struct RandomizedSearch {
    pub space: SearchSpace,
    pub n_iter: usize,
    pub cv_folds: usize,
    pub seed: u64,
}

impl RandomizedSearch {
    pub fn new(space: SearchSpace, n_iter: usize, cv_folds: usize, seed: u64) -> Self {
        Self {
            space,
            n_iter,
            cv_folds,
            seed,
        }
    }

    /// Score every sampled combination; trials run in parallel. The best
    /// mean recall wins and ties go to the earliest trial.
    pub fn fit(&self, x: &Table, y: &[u8]) -> Result<SearchResult> {
        let candidates = self.space.sample(self.n_iter, self.seed);
        if candidates.is_empty() {
            return Err(AppError::Training("search space is empty".to_string()));
        }
        let folds = stratified_kfold(y, self.cv_folds, self.seed)?;

        info!(
            candidates = candidates.len(),
            folds = folds.len(),
            fits = candidates.len() * folds.len(),
            "Starting randomized search"
        );

        let trials = candidates
            .into_par_iter()
            .map(|params| self.score(&params, x, y, &folds).map(|fold_recalls| {
                let mean_recall = fold_recalls.iter().sum::<f64>() / fold_recalls.len() as f64;
                debug!(params = %params, mean_recall, "Scored candidate");
                TrialResult {
                    params,
                    fold_recalls,
                    mean_recall,
                }
            }))
            .collect::<Result<Vec<_>>>()?;

        let best = trials
            .iter()
            .enumerate()
            .fold(None::<(usize, f64)>, |best, (i, trial)| match best {
                Some((_, score)) if score >= trial.mean_recall => best,
                _ => Some((i, trial.mean_recall)),
            })
            .map(|(i, _)| i)
            .ok_or_else(|| AppError::Training("no trial produced a score".to_string()))?;

        let result = SearchResult {
            best_params: trials[best].params.clone(),
            best_score: trials[best].mean_recall,
            trials,
        };
        info!(
            best_params = %result.best_params,
            best_recall = result.best_score,
            "Randomized search finished"
        );
        Ok(result)
    }

    fn score(
        &self,
        params: &Hyperparameters,
        x: &Table,
        y: &[u8],
        folds: &[(Vec<usize>, Vec<usize>)],
    ) -> Result<Vec<f64>> {
        folds
            .iter()
            .map(|(train, validation)| {
                let y_train: Vec<u8> = train.iter().map(|&i| y[i]).collect();
                let y_val: Vec<u8> = validation.iter().map(|&i| y[i]).collect();

                let model = RiskPipeline::fit(&x.take_rows(train), &y_train, params, self.seed)?;
                let proba = model.predict_proba(&x.take_rows(validation))?;
                // majority vote, as a plain classifier would predict
                let predicted: Vec<u8> = proba.iter().map(|&p| u8::from(p > 0.5)).collect();
                Ok(recall_score(&y_val, &predicted))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Column;
    use std::collections::HashSet;

    fn labels(n: usize) -> Vec<u8> {
        (0..n).map(|i| u8::from(i % 4 == 0)).collect()
    }

    #[test]
    fn test_stratified_split_preserves_ratio() {
        let y = labels(100);
        let (train, test) = stratified_split(&y, 0.2, 42).unwrap();

        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
        assert_eq!(test.iter().filter(|&&i| y[i] == 1).count(), 5);

        let all: HashSet<usize> = train.iter().chain(&test).copied().collect();
        assert_eq!(all.len(), 100);
    }

    #[test]
    fn test_stratified_split_is_seeded() {
        let y = labels(50);
        assert_eq!(
            stratified_split(&y, 0.2, 42).unwrap(),
            stratified_split(&y, 0.2, 42).unwrap()
        );
    }

    #[test]
    fn test_stratified_split_rejects_bad_size() {
        assert!(stratified_split(&labels(10), 0.0, 1).is_err());
        assert!(stratified_split(&labels(10), 1.0, 1).is_err());
    }

    #[test]
    fn test_kfold_partitions_rows() {
        let y = labels(30);
        let folds = stratified_kfold(&y, 3, 42).unwrap();
        assert_eq!(folds.len(), 3);

        let mut seen = HashSet::new();
        for (train, validation) in &folds {
            assert_eq!(train.len() + validation.len(), 30);
            assert!(validation.iter().any(|&i| y[i] == 1));
            for &i in validation {
                assert!(seen.insert(i));
            }
        }
        assert_eq!(seen.len(), 30);
    }

    #[test]
    fn test_kfold_needs_enough_rows() {
        assert!(stratified_kfold(&labels(2), 3, 1).is_err());
        assert!(stratified_kfold(&labels(10), 1, 1).is_err());
    }

    #[test]
    fn test_default_space_sampling() {
        let space = SearchSpace::default();
        assert_eq!(space.grid().len(), 54);

        let sampled = space.sample(10, 42);
        assert_eq!(sampled.len(), 10);
        let distinct: HashSet<String> = sampled.iter().map(|p| p.to_string()).collect();
        assert_eq!(distinct.len(), 10);
        assert_eq!(sampled, space.sample(10, 42));
        assert_eq!(space.sample(100, 42).len(), 54);
    }

    #[test]
    fn test_search_finds_recall() {
        let n = 36;
        let y = labels(n);
        let x = Table::from_columns(vec![Column::from_values(
            "IDA",
            (0..n).map(|i| if y[i] == 1 { 1.0 } else { 9.0 }).collect::<Vec<_>>(),
        )])
        .unwrap();

        let space = SearchSpace {
            n_estimators: vec![5, 10],
            max_depth: vec![Some(3)],
            min_samples_leaf: vec![1],
            class_weight: vec![ClassWeight::Balanced],
        };
        let result = RandomizedSearch::new(space, 10, 3, 42).fit(&x, &y).unwrap();

        assert_eq!(result.trials.len(), 2);
        assert_eq!(result.best_score, 1.0);
        assert!(result.trials.iter().all(|t| t.fold_recalls.len() == 3));
    }
}
