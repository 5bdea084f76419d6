//! Multipart form reading for CSV uploads

use super::error::{Result, ServerError};
use crate::data::{self, Dataset};
use axum::body::Bytes;
use axum::extract::Multipart;
use std::collections::HashMap;
use tracing::info;

/// Uploaded CSV plus the form's text fields
pub struct UploadForm {
    pub filename: String,
    file: Bytes,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Read every part; the `file` part must carry a `.csv` file name
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut file = None;
        let mut fields = HashMap::new();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let filename = field.file_name().unwrap_or_default().to_string();
                if !filename.to_lowercase().ends_with(".csv") {
                    return Err(ServerError::BadRequest("File must be a CSV".to_string()));
                }
                let bytes = field.bytes().await?;
                info!(file = %filename, bytes = bytes.len(), "Received upload");
                file = Some((filename, bytes));
            } else {
                fields.insert(name, field.text().await?);
            }
        }

        let (filename, file) = file.ok_or_else(|| ServerError::BadRequest("No file uploaded".to_string()))?;
        Ok(Self { filename, file, fields })
    }

    pub fn dataset(&self) -> Result<Dataset> {
        Ok(data::read_csv_bytes(&self.file)?)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    pub fn required(&self, name: &str) -> Result<&str> {
        self.field(name)
            .ok_or_else(|| ServerError::BadRequest(format!("Missing form field '{}'", name)))
    }
}
