//! REST API over a KBase vault.

pub mod auth;
pub mod config;
pub mod directories;
pub mod error;
pub mod images;
pub mod notes;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use kbase::{KbaseError, Vault};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::error::{ApiError, ServerError};

/// Room for the multipart framing around a maximum-size image.
const UPLOAD_BODY_LIMIT: usize = kbase::vault::MAX_IMAGE_SIZE as usize + 64 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub vault: Arc<Vault>,
    pub config: Arc<ServerConfig>,
    /// Key used to sign and check bearer tokens.
    pub secret: Arc<str>,
}

impl AppState {
    /// Opens the configured vault. Without a configured secret key a random
    /// one is used, so tokens do not survive a restart.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let vault = Vault::open(&config.vault_dir()?)?;
        if config.auth_enabled() && config.password.is_none() {
            return Err(ServerError::Config(
                "PASSWORD must be set unless DISABLE_AUTH is true".to_string(),
            ));
        }
        let secret = match &config.secret_key {
            Some(secret) => secret.clone(),
            None => {
                log::warn!("SECRET_KEY is not set; issued tokens will not survive a restart");
                uuid::Uuid::new_v4().simple().to_string()
            }
        };
        Ok(Self {
            vault: Arc::new(vault),
            config: Arc::new(config),
            secret: secret.into(),
        })
    }
}

/// Body of every successful mutation.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub message: &'static str,
    pub path: String,
}

impl MutationResponse {
    pub fn new(message: &'static str, path: &kbase::VaultPath) -> Json<Self> {
        Json(Self {
            message,
            path: path.to_url_path(),
        })
    }
}

/// Decodes a JSON request body; malformed or incomplete bodies are a 422.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|error| ApiError::unprocessable(error.to_string()))
}

/// Runs a filesystem operation on the blocking pool.
pub(crate) async fn with_vault<T, F>(state: &AppState, f: F) -> Result<T, KbaseError>
where
    F: FnOnce(&Vault) -> Result<T, KbaseError> + Send + 'static,
    T: Send + 'static,
{
    let vault = state.vault.clone();
    tokio::task::spawn_blocking(move || f(&vault))
        .await
        .map_err(|error| KbaseError::Io(std::io::Error::other(error)))?
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": format!("Welcome to {}", state.config.app_name),
        "version": state.config.app_version,
        "vault_path": state.vault.root().display().to_string(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "vault_path": state.vault.root().display().to_string(),
    }))
}

async fn public_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "auth_enabled": state.config.auth_enabled() }))
}

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/verify", get(auth::verify))
        .route("/config/", get(public_config))
        .route("/notes/", get(notes::list_tree))
        .route(
            "/notes/{*path}",
            get(notes::get_note)
                .put(notes::update_note)
                .post(notes::post_note)
                .delete(notes::delete_note),
        )
        .route("/directories/", get(directories::get_root))
        .route(
            "/directories/{*path}",
            get(directories::get_directory)
                .put(directories::rename_directory)
                .post(directories::post_directory)
                .delete(directories::delete_directory),
        )
        .route(
            "/images/upload",
            post(images::upload_image).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/images/{*path}", get(images::get_image));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    pub const PASSWORD: &str = "test-password";

    /// A vault with `note1.md`, `note2.md` and `subdir/note3.md`, served with auth enabled.
    pub fn test_app() -> (TempDir, Router, String) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("test_vault");
        std::fs::create_dir_all(root.join("subdir")).unwrap();
        std::fs::write(root.join("note1.md"), "# Test Note 1\n\nThis is a test note.").unwrap();
        std::fs::write(root.join("note2.md"), "# Test Note 2\n\nAnother test note.").unwrap();
        std::fs::write(root.join("subdir/note3.md"), "# Test Note 3\n\nNested test note.").unwrap();

        let config = ServerConfig {
            vault_path: Some(root),
            password: Some(PASSWORD.to_string()),
            secret_key: Some("test-secret".to_string()),
            ..ServerConfig::default()
        };
        let state = AppState::new(config).unwrap();
        let token = auth::issue_token(&state.secret, std::time::Duration::from_secs(600)).unwrap();
        (temp, app(state), token)
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}
