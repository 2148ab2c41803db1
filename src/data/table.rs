use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single nullable cell
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Missing or unparseable
    #[default]
    Null,

    /// Parsed numeric value
    Number(f64),

    /// Raw or normalized text
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric content, if this cell holds a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Text content, if this cell holds text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A named column of cells
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Build a column from anything convertible into cells
    pub fn from_values<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(name, values.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A column is text-typed as soon as any cell holds text
    pub fn is_text(&self) -> bool {
        self.values.iter().any(|v| matches!(v, Value::Text(_)))
    }

    /// Numeric view of the column; text cells read as null
    pub fn as_f64_vec(&self) -> Vec<Option<f64>> {
        self.values.iter().map(Value::as_f64).collect()
    }
}

/// Column-oriented table of nullable cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table, checking column lengths and name uniqueness
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut table = Table::new();
        for column in columns {
            if table.has_column(&column.name) {
                return Err(AppError::Validation(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
            table.set_column(column)?;
        }
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Replace the column with the same name, or append it
    pub fn set_column(&mut self, column: Column) -> Result<()> {
        if self.columns.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            return Err(AppError::Validation(format!(
                "column '{}' has {} rows, table has {}",
                column.name,
                column.len(),
                self.n_rows
            )));
        }

        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Keep only the columns whose name satisfies the predicate
    pub fn retain_columns<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.columns.retain(|c| keep(&c.name));
    }

    /// Rename a column if present; returns whether anything was renamed
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if from == to || self.has_column(to) {
            return false;
        }
        match self.column_mut(from) {
            Some(column) => {
                column.name = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Columns in the requested order; names that are absent are skipped
    pub fn select_columns(&self, names: &[&str]) -> Table {
        let columns = names
            .iter()
            .filter_map(|name| self.column(name).cloned())
            .collect::<Vec<_>>();
        Table {
            n_rows: if columns.is_empty() { 0 } else { self.n_rows },
            columns,
        }
    }

    /// Rows where the mask is true
    pub fn filter_rows(&self, mask: &[bool]) -> Table {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(i, _)| i)
            .collect();
        self.take_rows(&indices)
    }

    /// Rows at the given indices, in that order
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: indices
                    .iter()
                    .map(|&i| c.values.get(i).cloned().unwrap_or_default())
                    .collect(),
            })
            .collect();
        Table {
            columns,
            n_rows: indices.len(),
        }
    }

    /// Row-wise concatenation; the column set is the union in first-seen
    /// order and cells a table does not have are null
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for table in &tables {
            for column in &table.columns {
                if seen.insert(column.name.clone()) {
                    names.push(column.name.clone());
                }
            }
        }

        let n_rows: usize = tables.iter().map(|t| t.n_rows).sum();
        let mut columns: Vec<Column> = names
            .iter()
            .map(|name| Column::new(name.clone(), Vec::with_capacity(n_rows)))
            .collect();

        for table in &tables {
            for column in columns.iter_mut() {
                match table.column(&column.name) {
                    Some(source) => column.values.extend(source.values.iter().cloned()),
                    None => column
                        .values
                        .extend(std::iter::repeat(Value::Null).take(table.n_rows)),
                }
            }
        }

        Table {
            n_rows: if columns.is_empty() { 0 } else { n_rows },
            columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns(vec![
            Column::from_values("IAA", vec![Some(1.0), None, Some(3.0)]),
            Column::from_values("Fase", vec!["8", "ALFA", "2"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_rejects_ragged_columns() {
        let result = Table::from_columns(vec![
            Column::from_values("a", vec![1.0, 2.0]),
            Column::from_values("b", vec![1.0]),
        ]);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_from_columns_rejects_duplicate_names() {
        let result = Table::from_columns(vec![
            Column::from_values("a", vec![1.0]),
            Column::from_values("a", vec![2.0]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_set_column_replaces_in_place() {
        let mut table = sample();
        table
            .set_column(Column::from_values("IAA", vec![9.0, 9.0, 9.0]))
            .unwrap();
        assert_eq!(table.column_names(), vec!["IAA", "Fase"]);
        assert_eq!(table.column("IAA").unwrap().values[1], Value::Number(9.0));
    }

    #[test]
    fn test_filter_and_take_rows() {
        let table = sample();
        let filtered = table.filter_rows(&[true, false, true]);
        assert_eq!(filtered.n_rows(), 2);
        assert_eq!(
            filtered.column("Fase").unwrap().values,
            vec![Value::from("8"), Value::from("2")]
        );

        let taken = table.take_rows(&[2, 0]);
        assert_eq!(taken.column("IAA").unwrap().as_f64_vec(), vec![Some(3.0), Some(1.0)]);
    }

    #[test]
    fn test_concat_unions_columns() {
        let a = Table::from_columns(vec![Column::from_values("x", vec![1.0])]).unwrap();
        let b = Table::from_columns(vec![
            Column::from_values("x", vec![2.0]),
            Column::from_values("y", vec!["k"]),
        ])
        .unwrap();

        let joined = Table::concat(vec![a, b]);
        assert_eq!(joined.n_rows(), 2);
        assert_eq!(joined.column_names(), vec!["x", "y"]);
        assert_eq!(joined.column("y").unwrap().values[0], Value::Null);
        assert_eq!(joined.column("y").unwrap().values[1], Value::from("k"));
    }

    #[test]
    fn test_rename_does_not_clobber() {
        let mut table = sample();
        assert!(!table.rename_column("IAA", "Fase"));
        assert!(table.rename_column("IAA", "IAA_2022"));
        assert!(table.has_column("IAA_2022"));
        assert!(!table.rename_column("missing", "other"));
    }

    #[test]
    fn test_text_detection() {
        let table = sample();
        assert!(table.column("Fase").unwrap().is_text());
        assert!(!table.column("IAA").unwrap().is_text());
    }
}
