use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde_json::json;

use crate::AppState;

/// Serves the frontend's index page. Also the fallback for any unmatched
/// path, so client-side routes resolve to the single page app.
pub async fn serve_index(State(state): State<AppState>) -> Response {
    let index_file = &state.http_config().index_file;
    match tokio::fs::read_to_string(index_file).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::warn!(path = %index_file.display(), error = %e, "Index page unavailable");
            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": format!("File not found at {}", index_file.display())
                })),
            )
                .into_response()
        }
    }
}
