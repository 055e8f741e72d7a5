use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Deserialize;

use ripple_db::Database;
use ripple_db::models::UserRow;
use ripple_gateway::dispatcher::Dispatcher;
use ripple_types::api::{
    AuthResponse, Claims, LoginRequest, OAuthRequest, RegisterRequest, SessionUser,
};

use crate::error::ApiError;
use crate::reconcile::{self, OAuthIdentity};
use crate::util;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub media_dir: PathBuf,
    pub oauth_userinfo_url: Option<String>,
    pub http: reqwest::Client,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    reconcile::validate_username(&req.username)?;
    reconcile::validate_password(&req.password)?;
    if !req.email.contains('@') {
        return Err(ApiError::Validation("a valid email is required".into()));
    }

    let password_hash = reconcile::hash_password(&req.password)?;

    let db = state.clone();
    let user = tokio::task::spawn_blocking(move || {
        reconcile::register_user(
            &db.db,
            &req.email,
            &req.username,
            req.full_name.as_deref(),
            &password_hash,
        )
    })
    .await??;

    let token = create_token(&state.jwt_secret, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: session_user(&user),
            route: ripple_types::api::PostLoginRoute::Home,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        reconcile::sign_in_with_credentials(&db.db, &req.login, &req.password)
    })
    .await??;

    let token = create_token(&state.jwt_secret, &outcome.user)?;

    Ok(Json(AuthResponse {
        token,
        user: session_user(&outcome.user),
        route: outcome.route,
    }))
}

/// Profile claim shape the userinfo endpoint returns (OpenID Connect field
/// names, which Google and most providers use).
#[derive(Debug, Deserialize)]
struct UserInfoClaims {
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// OAuth sign-in: verifies the provider access token against the configured
/// userinfo endpoint, then reconciles the asserted identity against the
/// user table.
pub async fn oauth(
    State(state): State<AppState>,
    Json(req): Json<OAuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let url = state
        .oauth_userinfo_url
        .clone()
        .ok_or_else(|| ApiError::Backend(anyhow!("RIPPLE_OAUTH_USERINFO_URL is not configured")))?;

    let response = state
        .http
        .get(&url)
        .bearer_auth(&req.access_token)
        .send()
        .await
        .map_err(|e| ApiError::Backend(anyhow!("userinfo request failed: {e}")))?;

    // The provider rejecting the token is the user's problem; anything else
    // is ours.
    if response.status().is_client_error() {
        return Err(ApiError::InvalidCredentials);
    }
    let claims: UserInfoClaims = response
        .error_for_status()
        .map_err(|e| ApiError::Backend(anyhow!("userinfo endpoint error: {e}")))?
        .json()
        .await
        .map_err(|e| ApiError::Backend(anyhow!("userinfo response malformed: {e}")))?;

    let assertion = OAuthIdentity {
        email: claims.email.ok_or(ApiError::InvalidCredentials)?,
        name: claims.name,
        avatar_url: claims.picture,
    };

    let db = state.clone();
    let outcome =
        tokio::task::spawn_blocking(move || reconcile::sign_in_with_oauth(&db.db, &assertion))
            .await??;

    let token = create_token(&state.jwt_secret, &outcome.user)?;

    Ok(Json(AuthResponse {
        token,
        user: session_user(&outcome.user),
        route: outcome.route,
    }))
}

/// The client session context projection: who the bearer token belongs to.
pub async fn session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SessionUser>, ApiError> {
    let db = state.clone();
    let id = claims.sub.to_string();
    let user = tokio::task::spawn_blocking(move || db.db.get_user_by_id(&id))
        .await??
        .ok_or(ApiError::NotFound)?;

    Ok(Json(session_user(&user)))
}

pub(crate) fn session_user(user: &UserRow) -> SessionUser {
    SessionUser {
        id: util::parse_uuid(&user.id, "user id"),
        email: user.email.clone(),
        username: user.username.clone(),
        full_name: user.full_name.clone(),
        avatar_url: user.avatar_url.clone(),
    }
}

pub(crate) fn create_token(secret: &str, user: &UserRow) -> Result<String, ApiError> {
    let claims = Claims {
        sub: util::parse_uuid(&user.id, "user id"),
        username: user.username.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Backend(anyhow!("token encoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn token_round_trips_claims() {
        let user = UserRow {
            id: uuid::Uuid::new_v4().to_string(),
            email: "a@x.com".into(),
            username: "alice01".into(),
            full_name: None,
            bio: None,
            avatar_url: None,
            created_at: "2026-03-01 12:30:45".into(),
        };

        let token = create_token("test-secret", &user).unwrap();
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();

        assert_eq!(decoded.claims.sub.to_string(), user.id);
        assert_eq!(decoded.claims.username, "alice01");
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let user = UserRow {
            id: uuid::Uuid::new_v4().to_string(),
            email: "a@x.com".into(),
            username: "alice01".into(),
            full_name: None,
            bio: None,
            avatar_url: None,
            created_at: "2026-03-01 12:30:45".into(),
        };

        let token = create_token("test-secret", &user).unwrap();
        assert!(
            decode::<Claims>(
                &token,
                &DecodingKey::from_secret(b"other-secret"),
                &Validation::default(),
            )
            .is_err()
        );
    }
}
