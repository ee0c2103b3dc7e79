use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use kbase::vault::{Note, TreeNode};
use kbase::VaultPath;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::{parse_body, with_vault, AppState, MutationResponse};

const SUBJECT: &str = "Note";

#[derive(Debug, Default, Deserialize)]
struct NoteContent {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    destination: String,
}

fn parse_path(raw: &str) -> Result<VaultPath, ApiError> {
    VaultPath::parse(raw).map_err(|error| ApiError::vault(error, SUBJECT))
}

pub async fn list_tree(_user: AuthUser, State(state): State<AppState>) -> Result<Json<TreeNode>, ApiError> {
    with_vault(&state, |vault| vault.list_tree())
        .await
        .map(Json)
        .map_err(|error| ApiError::vault(error, SUBJECT))
}

pub async fn get_note(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Note>, ApiError> {
    let path = parse_path(&raw)?;
    with_vault(&state, move |vault| vault.get_note(&path))
        .await
        .map(Json)
        .map_err(|error| ApiError::vault(error, SUBJECT))
}

pub async fn update_note(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Result<Json<MutationResponse>, ApiError> {
    let path = parse_path(&raw)?;
    let NoteContent { content } = parse_body(&body)?;
    let saved = with_vault(&state, move |vault| vault.update_note(&path, &content))
        .await
        .map_err(|error| ApiError::vault(error, SUBJECT))?;
    Ok(MutationResponse::new("Note updated successfully", &saved))
}

pub async fn delete_note(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<MutationResponse>, ApiError> {
    let path = parse_path(&raw)?;
    let deleted = with_vault(&state, move |vault| vault.delete_note(&path))
        .await
        .map_err(|error| ApiError::vault(error, SUBJECT))?;
    Ok(MutationResponse::new("Note deleted successfully", &deleted))
}

/// `POST /notes/{path}` creates a note; `.../move` and `.../copy` relocate one.
pub async fn post_note(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Result<Json<MutationResponse>, ApiError> {
    if let Some(source) = raw.strip_suffix("/move") {
        let (source, destination) = transfer_paths(source, &body)?;
        let moved = with_vault(&state, move |vault| vault.move_note(&source, &destination))
            .await
            .map_err(|error| ApiError::vault(error, SUBJECT))?;
        return Ok(MutationResponse::new("Note renamed successfully", &moved));
    }
    if let Some(source) = raw.strip_suffix("/copy") {
        let (source, destination) = transfer_paths(source, &body)?;
        let copied = with_vault(&state, move |vault| vault.copy_note(&source, &destination))
            .await
            .map_err(|error| ApiError::vault(error, SUBJECT))?;
        return Ok(MutationResponse::new("Note copied successfully", &copied));
    }

    let path = parse_path(&raw)?;
    let NoteContent { content } = if body.is_empty() {
        NoteContent::default()
    } else {
        parse_body(&body)?
    };
    let created = with_vault(&state, move |vault| vault.create_note(&path, &content))
        .await
        .map_err(|error| ApiError::vault(error, SUBJECT))?;
    Ok(MutationResponse::new("Note created successfully", &created))
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
    async fn tree_lists_every_note() {
        let (_temp, app, token) = test_app();
        let (status, body) = send(&app, "GET", "/api/v1/notes/", Some(&token), None).await;

        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["children"]
            .as_array()
            .unwrap()
            .iter()
            .map(|child| child["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"note1.md"));
        assert!(names.contains(&"subdir"));
    }

    #[tokio::test]
    async fn get_note_returns_content() {
        let (_temp, app, token) = test_app();
        let (status, body) = send(&app, "GET", "/api/v1/notes/subdir/note3.md", Some(&token), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "# Test Note 3\n\nNested test note.");
        assert_eq!(body["path"], "/subdir/note3.md");
    }

    #[tokio::test]
    async fn missing_note_is_404() {
        let (_temp, app, token) = test_app();
        let (status, body) = send(&app, "GET", "/api/v1/notes/missing.md", Some(&token), None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Note not found: /missing.md");
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (_temp, app, token) = test_app();
        let (status, _) = send(&app, "GET", "/api/v1/notes/%2E%2E/%2E%2E/etc/passwd", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_update_and_delete() {
        let (_temp, app, token) = test_app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/notes/ideas/new",
            Some(&token),
            Some(json!({ "content": "# New" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Note created successfully");
        assert_eq!(body["path"], "/ideas/new.md");

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/notes/ideas/new.md",
            Some(&token),
            Some(json!({ "content": "again" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "PUT",
            "/api/v1/notes/ideas/new.md",
            Some(&token),
            Some(json!({ "content": "updated" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Note updated successfully");

        let (_, body) = send(&app, "GET", "/api/v1/notes/ideas/new.md", Some(&token), None).await;
        assert_eq!(body["content"], "updated");

        let (status, body) = send(&app, "DELETE", "/api/v1/notes/ideas/new.md", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Note deleted successfully");

        let (status, _) = send(&app, "DELETE", "/api/v1/notes/ideas/new.md", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_without_body_makes_empty_note() {
        let (_temp, app, token) = test_app();
        let (status, _) = send(&app, "POST", "/api/v1/notes/empty.md", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, "GET", "/api/v1/notes/empty.md", Some(&token), None).await;
        assert_eq!(body["content"], "");
    }

    #[tokio::test]
    async fn update_missing_note_is_404() {
        let (_temp, app, token) = test_app();
        let (status, _) = send(
            &app,
            "PUT",
            "/api/v1/notes/missing.md",
            Some(&token),
            Some(json!({ "content": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_body_is_422() {
        let (_temp, app, token) = test_app();
        let (status, _) = send(
            &app,
            "PUT",
            "/api/v1/notes/note1.md",
            Some(&token),
            Some(json!({ "content": 42 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn move_and_copy() {
        let (_temp, app, token) = test_app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/notes/note1.md/move",
            Some(&token),
            Some(json!({ "destination": "archive/moved" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Note renamed successfully");
        assert_eq!(body["path"], "/archive/moved.md");

        let (status, _) = send(&app, "GET", "/api/v1/notes/note1.md", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/notes/note2.md/copy",
            Some(&token),
            Some(json!({ "destination": "/note2-copy.md" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Note copied successfully");

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/notes/note2.md/move",
            Some(&token),
            Some(json!({ "destination": "note2-copy.md" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
