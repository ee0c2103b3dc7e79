//! Single-password login issuing HS256 bearer tokens.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::{parse_body, AppState};

const REMEMBER_ME_LIFETIME: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const SUBJECT: &str = "user";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: u64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}

pub fn issue_token(secret: &str, lifetime: Duration) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: SUBJECT.to_string(),
        exp: now_seconds() + lifetime.as_secs(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// The token's subject, or `None` if it is malformed, forged or expired.
pub fn verify_token(secret: &str, token: &str) -> Option<String> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims.sub)
        .ok()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// An authenticated caller. Every vault route takes one.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !state.config.auth_enabled() {
            return Ok(Self {
                subject: SUBJECT.to_string(),
            });
        }
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::new(StatusCode::FORBIDDEN, "Not authenticated"))?;
        let subject = verify_token(&state.secret, token)
            .ok_or_else(|| ApiError::unauthorized("Invalid authentication credentials"))?;
        Ok(Self { subject })
    }
}

pub async fn login(State(state): State<AppState>, body: Bytes) -> Result<Json<LoginResponse>, ApiError> {
    let request: LoginRequest = parse_body(&body)?;
    if state.config.password.as_deref() != Some(request.password.as_str()) {
        log::warn!("Rejected login attempt");
        return Err(ApiError::unauthorized("Incorrect password"));
    }

    let lifetime = if request.remember_me {
        REMEMBER_ME_LIFETIME
    } else {
        Duration::from_secs(state.config.token_expire_minutes.max(0) as u64 * 60)
    };
    let access_token = issue_token(&state.secret, lifetime).map_err(|error| {
        log::error!("Failed to sign token: {error}");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create access token")
    })?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

pub async fn verify(_user: AuthUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "valid": true }))
}
