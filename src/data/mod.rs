//! Tabular data handling: typed in-memory tables and CSV ingestion

mod loader;
mod table;

pub use loader::{from_dataframe, read_csv_bytes, read_csv_path};
pub use table::{format_label, ColumnData, DataColumn, Dataset};

/// Column names tried, in order, when a ground-truth column is not named explicitly
pub const TARGET_CANDIDATES: [&str; 4] = ["koi_disposition", "target", "label", "class"];

/// First candidate target column present in `dataset`
pub fn detect_target_column(dataset: &Dataset) -> Option<String> {
    TARGET_CANDIDATES
        .iter()
        .find(|name| dataset.has_column(name))
        .map(|name| name.to_string())
}
