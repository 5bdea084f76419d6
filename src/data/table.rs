//! In-memory typed table used by training and serving

use crate::error::{ExoError, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Cell storage of a single column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the column has numeric storage
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnData::Numeric(_))
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(v) => !v[row].is_some_and(f64::is_finite),
            ColumnData::Categorical(v) => v[row].is_none(),
        }
    }

    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_missing(i)).count()
    }

    /// Cells as numbers. NaN, infinities and text that does not parse
    /// become missing.
    pub fn to_numeric(&self) -> Vec<Option<f64>> {
        match self {
            ColumnData::Numeric(v) => v.iter().map(|x| x.filter(|f| f.is_finite())).collect(),
            ColumnData::Categorical(v) => v
                .iter()
                .map(|x| x.as_deref().and_then(|s| s.trim().parse::<f64>().ok()).filter(|f| f.is_finite()))
                .collect(),
        }
    }

    /// Cells as text labels
    pub fn to_labels(&self) -> Vec<Option<String>> {
        match self {
            ColumnData::Numeric(v) => v
                .iter()
                .map(|x| x.filter(|f| !f.is_nan()).map(format_label))
                .collect(),
            ColumnData::Categorical(v) => v.clone(),
        }
    }

    fn take(&self, indices: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Categorical(v) => {
                ColumnData::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// Render a numeric cell the way it reads in a CSV (`1` rather than `1.0`)
pub fn format_label(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct DataColumn {
    pub name: String,
    pub data: ColumnData,
}

impl DataColumn {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self { name: name.into(), data: ColumnData::Numeric(values) }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self { name: name.into(), data: ColumnData::Categorical(values) }
    }
}

/// Table of equally long named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<DataColumn>,
    n_rows: usize,
}

impl Dataset {
    pub fn new(columns: Vec<DataColumn>) -> Result<Self> {
        let n_rows = columns.first().map_or(0, |c| c.data.len());
        let mut seen = HashSet::new();
        for col in &columns {
            if col.data.len() != n_rows {
                return Err(ExoError::ShapeError {
                    expected: format!("{} rows", n_rows),
                    actual: format!("{} rows in column '{}'", col.data.len(), col.name),
                });
            }
            if !seen.insert(col.name.as_str()) {
                return Err(ExoError::InvalidInput(format!("Duplicate column '{}'", col.name)));
            }
        }
        Ok(Self { columns, n_rows })
    }

    /// Build a table from JSON objects, one per row.
    ///
    /// Columns appear in first-seen key order. A column whose present values
    /// are all JSON numbers is numeric; anything else is categorical.
    pub fn from_records(records: &[Map<String, Value>]) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for record in records {
            for key in record.keys() {
                if seen.insert(key.clone()) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let cells: Vec<Option<&Value>> = records
                    .iter()
                    .map(|r| r.get(&name).filter(|v| !v.is_null()))
                    .collect();
                let all_numeric = cells.iter().flatten().all(|v| v.is_number());
                if all_numeric {
                    let values = cells.iter().map(|c| c.and_then(Value::as_f64)).collect();
                    DataColumn::numeric(name, values)
                } else {
                    let values = cells
                        .iter()
                        .map(|c| {
                            c.map(|v| match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                        })
                        .collect();
                    DataColumn::categorical(name, values)
                }
            })
            .collect();

        Self::new(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&DataColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Split off a column, returning the remaining table and the column
    pub fn split_off(&self, name: &str) -> Option<(Dataset, DataColumn)> {
        let target = self.column(name)?.clone();
        let rest = self.columns.iter().filter(|c| c.name != name).cloned().collect();
        Some((Dataset { columns: rest, n_rows: self.n_rows }, target))
    }

    /// Rows at `indices`, in that order
    pub fn take_rows(&self, indices: &[usize]) -> Dataset {
        Dataset {
            columns: self
                .columns
                .iter()
                .map(|c| DataColumn { name: c.name.clone(), data: c.data.take(indices) })
                .collect(),
            n_rows: indices.len(),
        }
    }

    /// Names from `required` that this table lacks, in `required` order
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        required.iter().filter(|n| !self.has_column(n)).cloned().collect()
    }

    /// Reorder to `names`, dropping every other column
    pub fn select(&self, names: &[String]) -> Result<Dataset> {
        let missing = self.missing_columns(names);
        if !missing.is_empty() {
            return Err(ExoError::SchemaMismatch { missing });
        }
        let columns = names
            .iter()
            .filter_map(|n| self.column(n).cloned())
            .collect();
        Ok(Dataset { columns, n_rows: self.n_rows })
    }
}
