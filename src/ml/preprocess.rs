use crate::data::table::{Table, Value};
use crate::error::{AppError, Result};
use crate::ml::models::{ColumnKind, SignatureColumn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Fitted transform for one input column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnTransform {
    /// Median imputation
    Numeric { name: String, median: f64 },

    /// Mode imputation followed by one-hot encoding
    Categorical {
        name: String,
        mode: String,
        categories: Vec<String>,
    },
}

impl ColumnTransform {
    pub fn name(&self) -> &str {
        match self {
            ColumnTransform::Numeric { name, .. } => name,
            ColumnTransform::Categorical { name, .. } => name,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnTransform::Numeric { .. } => ColumnKind::Numeric,
            ColumnTransform::Categorical { .. } => ColumnKind::Categorical,
        }
    }

    fn width(&self) -> usize {
        match self {
            ColumnTransform::Numeric { .. } => 1,
            ColumnTransform::Categorical { categories, .. } => categories.len(),
        }
    }
}

/// Imputation and encoding stage, bound to the column schema seen at fit time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    columns: Vec<ColumnTransform>,
}

impl Preprocessor {
    /// Learn medians, modes and category sets from the training table
    pub fn fit(x: &Table) -> Result<Self> {
        if x.n_cols() == 0 {
            return Err(AppError::Training("feature table has no columns".to_string()));
        }

        let columns = x
            .columns()
            .iter()
            .map(|column| {
                if column.is_text() {
                    let tokens: Vec<String> = column.values.iter().filter_map(category_token).collect();
                    let mode = mode(&tokens).unwrap_or_default();
                    let mut categories: BTreeSet<String> = tokens.into_iter().collect();
                    if categories.is_empty() {
                        categories.insert(mode.clone());
                    }
                    ColumnTransform::Categorical {
                        name: column.name.clone(),
                        mode,
                        categories: categories.into_iter().collect(),
                    }
                } else {
                    let present: Vec<f64> = column.as_f64_vec().into_iter().flatten().collect();
                    let median = median(&present).unwrap_or_else(|| {
                        debug!(column = %column.name, "All values missing, imputing 0");
                        0.0
                    });
                    ColumnTransform::Numeric {
                        name: column.name.clone(),
                        median,
                    }
                }
            })
            .collect();

        Ok(Self { columns })
    }

    /// Dense matrix in fitted column order.
    ///
    /// Columns are looked up by name; extra columns are ignored and absent
    /// ones are imputed entirely. Unseen categories encode as all zeros.
    pub fn transform(&self, x: &Table) -> Result<Array2<f64>> {
        let n_rows = x.n_rows();
        let width: usize = self.columns.iter().map(ColumnTransform::width).sum();
        let mut matrix = Array2::<f64>::zeros((n_rows, width));

        let mut offset = 0;
        for transform in &self.columns {
            let source = x.column(transform.name());
            if source.is_none() {
                debug!(column = %transform.name(), "Column absent at transform, imputing");
            }

            match transform {
                ColumnTransform::Numeric { median, .. } => {
                    for row in 0..n_rows {
                        let value = source
                            .and_then(|c| c.values.get(row))
                            .and_then(numeric_value)
                            .unwrap_or(*median);
                        matrix[[row, offset]] = value;
                    }
                }
                ColumnTransform::Categorical {
                    mode, categories, ..
                } => {
                    for row in 0..n_rows {
                        let token = source
                            .and_then(|c| c.values.get(row))
                            .and_then(category_token)
                            .unwrap_or_else(|| mode.clone());
                        if let Ok(idx) = categories.binary_search(&token) {
                            matrix[[row, offset + idx]] = 1.0;
                        }
                    }
                }
            }
            offset += transform.width();
        }

        Ok(matrix)
    }

    /// Output feature names after encoding (`<column>_<category>` for
    /// one-hot columns)
    pub fn feature_names_out(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|transform| match transform {
                ColumnTransform::Numeric { name, .. } => vec![name.clone()],
                ColumnTransform::Categorical {
                    name, categories, ..
                } => categories
                    .iter()
                    .map(|category| format!("{}_{}", name, category))
                    .collect(),
            })
            .collect()
    }

    /// Input schema, in fitted order
    pub fn input_columns(&self) -> Vec<SignatureColumn> {
        self.columns
            .iter()
            .map(|t| SignatureColumn {
                name: t.name().to_string(),
                kind: t.kind(),
            })
            .collect()
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

fn category_token(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        Value::Number(n) if n.is_finite() => Some(n.to_string()),
        _ => None,
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Most frequent token; ties go to the smallest
fn mode(tokens: &[String]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_default() += 1;
    }
    let best = counts.values().copied().max()?;
    counts
        .into_iter()
        .find(|(_, count)| *count == best)
        .map(|(token, _)| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Column;

    fn training_table() -> Table {
        Table::from_columns(vec![
            Column::from_values("IAA", vec![Some(1.0), None, Some(3.0), Some(10.0)]),
            Column::from_values("Pedra", vec![Some("AGATA"), Some("QUARTZO"), None, Some("AGATA")]),
        ])
        .unwrap()
    }

    #[test]
    fn test_median_and_mode() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);

        let tokens: Vec<String> = ["B", "A", "B", "A"].iter().map(|s| s.to_string()).collect();
        assert_eq!(mode(&tokens), Some("A".to_string()));
    }

    #[test]
    fn test_fit_and_transform() {
        let pre = Preprocessor::fit(&training_table()).unwrap();
        assert_eq!(
            pre.feature_names_out(),
            vec!["IAA", "Pedra_AGATA", "Pedra_QUARTZO"]
        );

        let matrix = pre.transform(&training_table()).unwrap();
        assert_eq!(matrix.dim(), (4, 3));
        // median of 1, 3, 10
        assert_eq!(matrix[[1, 0]], 3.0);
        // mode imputation
        assert_eq!(matrix.row(2).to_vec(), vec![3.0, 1.0, 0.0]);
        assert_eq!(matrix.row(1).to_vec(), vec![3.0, 0.0, 1.0]);
    }

    #[test]
    fn test_transform_aligns_by_name() {
        let pre = Preprocessor::fit(&training_table()).unwrap();
        let request = Table::from_columns(vec![
            Column::from_values("Extra", vec![99.0]),
            Column::from_values("Pedra", vec!["RUBI"]),
            Column::from_values("IAA", vec![7.0]),
        ])
        .unwrap();

        let matrix = pre.transform(&request).unwrap();
        assert_eq!(matrix.row(0).to_vec(), vec![7.0, 0.0, 0.0]);
    }

    #[test]
    fn test_absent_columns_are_imputed() {
        let pre = Preprocessor::fit(&training_table()).unwrap();
        let request = Table::from_columns(vec![Column::from_values("IAA", vec![2.0])]).unwrap();

        let matrix = pre.transform(&request).unwrap();
        assert_eq!(matrix.row(0).to_vec(), vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_input_schema() {
        let pre = Preprocessor::fit(&training_table()).unwrap();
        let kinds: Vec<ColumnKind> = pre.input_columns().iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ColumnKind::Numeric, ColumnKind::Categorical]);
    }

    #[test]
    fn test_empty_table_is_rejected() {
        assert!(Preprocessor::fit(&Table::new()).is_err());
    }
}
