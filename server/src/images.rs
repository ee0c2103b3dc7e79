use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::{with_vault, AppState, MutationResponse};

const SUBJECT: &str = "Image";
const FILE_FIELD: &str = "file";

/// `POST /images/upload` takes a multipart form with a single `file` field.
pub async fn upload_image(
    _user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MutationResponse>, ApiError> {
    let multipart_error =
        |error: axum::extract::multipart::MultipartError| ApiError::new(error.status(), error.body_text());

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let saved = with_vault(&state, move |vault| vault.save_image(&file_name, &content_type, &bytes))
            .await
            .map_err(|error| ApiError::vault(error, SUBJECT))?;
        return Ok(MutationResponse::new("Image uploaded successfully", &saved));
    }

    Err(ApiError::unprocessable("Missing form field: file"))
}

/// `GET /images/{path}` serves a file from `_resources/` only.
pub async fn get_image(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let image = with_vault(&state, move |vault| vault.read_image(&raw))
        .await
        .map_err(|error| ApiError::vault(error, SUBJECT))?;
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.bytes).into_response())
}
