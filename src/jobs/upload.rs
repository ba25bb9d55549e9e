use std::path::Path;

use sanitize_filename::sanitize;
use tracing::info;

use crate::{
    error::{ClientError, ClientResult},
    http::{ApiClient, JobSubmission},
};

pub const NO_FILE_SELECTED: &str = "Please select a file";
const FALLBACK_FILE_NAME: &str = "upload.bin";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_MIME: &str = "application/vnd.ms-excel";
const MPP_MIME: &str = "application/vnd.ms-project";

/// A file chosen for upload, fully loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Self {
        let sanitized = sanitize(file_name);
        let file_name = if sanitized.trim().is_empty() {
            FALLBACK_FILE_NAME.to_string()
        } else {
            sanitized
        };
        let content_type = guess_content_type(&file_name);
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::validation(format!("unable to derive filename from {}", path.display()))
            })?;
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            ClientError::validation(format!("failed to read {}: {err}", path.display()))
        })?;
        Ok(Self::from_bytes(name, bytes))
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

fn guess_content_type(file_name: &str) -> String {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => mime::APPLICATION_PDF.to_string(),
        "csv" => mime::TEXT_CSV.to_string(),
        "txt" => mime::TEXT_PLAIN.to_string(),
        "json" => mime::APPLICATION_JSON.to_string(),
        "xml" | "xer" => mime::TEXT_XML.to_string(),
        "xlsx" => XLSX_MIME.to_string(),
        "xls" => XLS_MIME.to_string(),
        "mpp" => MPP_MIME.to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}

/// Upload the selected file and return the job the service created.
///
/// Fails before touching the network when nothing is selected.
pub async fn submit(api: &ApiClient, file: Option<&SelectedFile>) -> ClientResult<JobSubmission> {
    let file = file.ok_or_else(|| ClientError::validation(NO_FILE_SELECTED))?;
    let submission = api.submit_analysis(file).await?;
    info!(job_id = %submission.job_id, status = %submission.status, "analysis job submitted");
    Ok(submission)
}
