use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use kbase::vault::DirectoryListing;
use kbase::VaultPath;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::{parse_body, with_vault, AppState, MutationResponse};

const SUBJECT: &str = "Directory";

#[derive(Debug, Deserialize)]
struct RenameRequest {
    new_name: String,
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    destination: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    recursive: bool,
}

fn parse_path(raw: &str) -> Result<VaultPath, ApiError> {
    VaultPath::parse(raw).map_err(|error| ApiError::vault(error, SUBJECT))
}

async fn listing(state: &AppState, path: VaultPath) -> Result<Json<DirectoryListing>, ApiError> {
    with_vault(state, move |vault| vault.get_directory(&path))
        .await
        .map(Json)
        .map_err(|error| ApiError::vault(error, SUBJECT))
}

pub async fn get_root(_user: AuthUser, State(state): State<AppState>) -> Result<Json<DirectoryListing>, ApiError> {
    listing(&state, VaultPath::root()).await
}

pub async fn get_directory(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<DirectoryListing>, ApiError> {
    listing(&state, parse_path(&raw)?).await
}

pub async fn rename_directory(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Result<Json<MutationResponse>, ApiError> {
    let path = parse_path(&raw)?;
    let RenameRequest { new_name } = parse_body(&body)?;
    let renamed = with_vault(&state, move |vault| vault.rename_directory(&path, &new_name))
        .await
        .map_err(|error| ApiError::vault(error, SUBJECT))?;
    Ok(MutationResponse::new("Directory renamed successfully", &renamed))
}

pub async fn delete_directory(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<MutationResponse>, ApiError> {
    let path = parse_path(&raw)?;
    let deleted = with_vault(&state, move |vault| vault.delete_directory(&path, params.recursive))
        .await
        .map_err(|error| ApiError::vault(error, SUBJECT))?;
    Ok(MutationResponse::new("Directory deleted successfully", &deleted))
}

/// `POST /directories/{path}` creates a directory; `.../move` and `.../copy` relocate one.
pub async fn post_directory(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Result<Json<MutationResponse>, ApiError> {
    if let Some(source) = raw.strip_suffix("/move") {
        let (source, destination) = transfer_paths(source, &body)?;
        let moved = with_vault(&state, move |vault| vault.move_directory(&source, &destination))
            .await
            .map_err(|error| ApiError::vault(error, SUBJECT))?;
        return Ok(MutationResponse::new("Directory renamed successfully", &moved));
    }
    if let Some(source) = raw.strip_suffix("/copy") {
        let (source, destination) = transfer_paths(source, &body)?;
        let copied = with_vault(&state, move |vault| vault.copy_directory(&source, &destination))
            .await
            .map_err(|error| ApiError::vault(error, SUBJECT))?;
        return Ok(MutationResponse::new("Directory copied successfully", &copied));
    }

    let path = parse_path(&raw)?;
    let created = with_vault(&state, move |vault| vault.create_directory(&path))
        .await
        .map_err(|error| ApiError::vault(error, SUBJECT))?;
    Ok(MutationResponse::new("Directory created successfully", &created))
}

fn transfer_paths(source: &str, body: &Bytes) -> Result<(VaultPath, VaultPath), ApiError> {
    let request: TransferRequest = parse_body(body)?;
    Ok((parse_path(source)?, parse_path(&request.destination)?))
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn root_listing_puts_directories_first() {
        let (_temp, app, token) = test_app();
        let (status, body) = send(&app, "GET", "/api/v1/directories/", Some(&token), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "test_vault");
        assert_eq!(body["item_count"], 3);
        assert_eq!(body["contents"][0]["name"], "subdir");
        assert_eq!(body["contents"][0]["type"], "directory");
    }

    #[tokio::test]
    async fn create_and_list_directory() {
        let (_temp, app, token) = test_app();

        let (status, body) = send(&app, "POST", "/api/v1/directories/projects/2024", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Directory created successfully");
        assert_eq!(body["path"], "/projects/2024");

        let (status, _) = send(&app, "POST", "/api/v1/directories/projects/2024", Some(&token), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, "GET", "/api/v1/directories/projects", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["item_count"], 1);
    }

    #[tokio::test]
    async fn missing_directory_is_404() {
        let (_temp, app, token) = test_app();
        let (status, body) = send(&app, "GET", "/api/v1/directories/nope", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Directory not found: /nope");
    }

    #[tokio::test]
    async fn rename_directory_keeps_parent() {
        let (_temp, app, token) = test_app();
        let (status, body) = send(
            &app,
            "PUT",
            "/api/v1/directories/subdir",
            Some(&token),
            Some(json!({ "new_name": "renamed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Directory renamed successfully");
        assert_eq!(body["path"], "/renamed");

        let (status, _) = send(&app, "GET", "/api/v1/notes/renamed/note3.md", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/v1/directories/renamed",
            Some(&token),
            Some(json!({ "new_name": "../escape" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_needs_recursive_when_not_empty() {
        let (_temp, app, token) = test_app();

        let (status, _) = send(&app, "DELETE", "/api/v1/directories/subdir", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "DELETE",
            "/api/v1/directories/subdir?recursive=true",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Directory deleted successfully");
    }

    #[tokio::test]
    async fn move_into_itself_is_rejected() {
        let (_temp, app, token) = test_app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/directories/subdir/move",
            Some(&token),
            Some(json!({ "destination": "subdir/inner" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("into itself"));
    }

    #[tokio::test]
    async fn copy_directory_recursively() {
        let (_temp, app, token) = test_app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/directories/subdir/copy",
            Some(&token),
            Some(json!({ "destination": "backup/subdir" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Directory copied successfully");

        let (_, body) = send(&app, "GET", "/api/v1/notes/backup/subdir/note3.md", Some(&token), None).await;
        assert_eq!(body["content"], "# Test Note 3\n\nNested test note.");

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/directories/subdir/copy",
            Some(&token),
            Some(json!({ "destination": "backup/subdir" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
