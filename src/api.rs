use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use metrics::counter;
use serde_json::{Value, json};

use crate::AppState;
use crate::dataset::Dataset;
use crate::error::{ApiError, ApiResult};
use crate::report::TestReport;
use crate::types::{DatasetList, Selection, StartTestRequest, UploadResponse};

/// Every multipart part carrying a file name becomes one dataset, labeled with
/// that file's base name. A body that is not multipart at all carries no files.
#[tracing::instrument(skip_all)]
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!(%rejection, "Upload is not a multipart form");
        ApiError::BadRequest("No files uploaded".to_string())
    })?;
    let mut datasets = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if file_name.is_empty() {
            continue;
        }

        let bytes = field.bytes().await?;
        let dataset = Dataset::from_csv(&file_name, &bytes)?;
        tracing::info!(
            file = %file_name,
            intent = %dataset.name,
            rows = dataset.records.len(),
            "Dataset received"
        );
        datasets.push(dataset);
    }

    if datasets.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".to_string()));
    }

    counter!("datasets_uploaded_total").increment(datasets.len() as u64);
    let files = state.store().store(datasets).await?;

    Ok(Json(UploadResponse {
        message: "Files uploaded successfully".to_string(),
        files,
    }))
}

/// Parse an optional start-test body. Blank means every uploaded dataset.
pub fn parse_selection(body: &[u8]) -> ApiResult<Selection> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Selection::All);
    }
    let request: StartTestRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid start_test request: {e}")))?;
    Ok(request.selection())
}

#[tracing::instrument(skip_all)]
pub async fn start_test(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<TestReport>> {
    let selection = parse_selection(&body)?;
    tracing::info!(?selection, "Starting test run");
    let report = state.run_test(&selection).await?;
    Ok(Json(report))
}

pub async fn list_datasets(State(state): State<AppState>) -> ApiResult<Json<DatasetList>> {
    let datasets = state.store().names().await?;
    Ok(Json(DatasetList { datasets }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_body_selects_everything() {
        assert_eq!(parse_selection(b"").unwrap(), Selection::All);
        assert_eq!(parse_selection(b"  \n").unwrap(), Selection::All);
        assert_eq!(parse_selection(b"{\"use_all\": true}").unwrap(), Selection::All);
    }

    #[test]
    fn named_datasets() {
        let selection = parse_selection(br#"{"datasets": ["Greeting"]}"#).unwrap();
        assert_eq!(selection, Selection::Named(vec!["Greeting".to_string()]));
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let err = parse_selection(b"{datasets:").unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
