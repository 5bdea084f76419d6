//! CSV ingestion through polars

use super::table::{ColumnData, DataColumn, Dataset};
use crate::error::{ExoError, Result};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

/// Rows scanned when inferring column types
const INFER_SCHEMA_ROWS: usize = 1000;

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Parse CSV bytes with a header row
pub fn read_csv_bytes(bytes: &[u8]) -> Result<Dataset> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ExoError::InvalidInput("CSV file is empty".to_string()));
    }

    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| ExoError::InvalidInput(format!("Invalid CSV: {}", e)))?;

    if df.height() == 0 {
        return Err(ExoError::InvalidInput("CSV file contains no rows".to_string()));
    }

    from_dataframe(&df)
}

/// Read a CSV file from disk
pub fn read_csv_path(path: &Path) -> Result<Dataset> {
    let bytes = std::fs::read(path)?;
    read_csv_bytes(&bytes)
}

/// Convert a polars frame into a [`Dataset`]
///
/// Integer and float columns keep numeric storage; every other dtype is
/// read as text.
pub fn from_dataframe(df: &DataFrame) -> Result<Dataset> {
    let columns = df
        .get_columns()
        .iter()
        .map(|column| -> Result<DataColumn> {
            let series = column.as_materialized_series();
            let name = series.name().to_string();
            let data = if is_numeric_dtype(series.dtype()) {
                let cast = series.cast(&DataType::Float64)?;
                ColumnData::Numeric(cast.f64()?.into_iter().map(|v| v.filter(|f| f.is_finite())).collect())
            } else {
                let cast = series.cast(&DataType::String)?;
                ColumnData::Categorical(
                    cast.str()?
                        .into_iter()
                        .map(|v| v.map(str::to_string))
                        .collect(),
                )
            };
            Ok(DataColumn { name, data })
        })
        .collect::<Result<Vec<_>>>()?;

    Dataset::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv_infers_types() {
        let csv = b"koi_period,koi_disposition,koi_score\n9.48,CONFIRMED,1.0\n54.4,FALSE POSITIVE,\n";
        let ds = read_csv_bytes(csv).unwrap();
        assert_eq!(ds.n_rows(), 2);
        assert!(ds.column("koi_period").unwrap().data.is_numeric());
        assert!(!ds.column("koi_disposition").unwrap().data.is_numeric());
        assert_eq!(ds.column("koi_score").unwrap().data.missing_count(), 1);
    }

    #[test]
    fn test_read_csv_rejects_empty() {
        assert!(matches!(read_csv_bytes(b"  \n"), Err(ExoError::InvalidInput(_))));
    }

    #[test]
    fn test_read_csv_infinity_is_missing() {
        let csv = b"koi_period,koi_prad\n1.5,inf\n2.5,-inf\n3.5,0.9\n";
        let ds = read_csv_bytes(csv).unwrap();
        let prad = &ds.column("koi_prad").unwrap().data;
        assert_eq!(prad.to_numeric(), vec![None, None, Some(0.9)]);
    }

    #[test]
    fn test_from_dataframe() {
        let df = df! {
            "x" => &[1i64, 2, 3],
            "label" => &["a", "b", "a"],
        }
        .unwrap();
        let ds = from_dataframe(&df).unwrap();
        assert_eq!(ds.column_names(), vec!["x", "label"]);
        assert_eq!(
            ds.column("x").unwrap().data,
            ColumnData::Numeric(vec![Some(1.0), Some(2.0), Some(3.0)])
        );
    }
}
