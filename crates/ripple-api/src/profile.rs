use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use ripple_db::Database;
use ripple_db::models::UserRow;
use ripple_types::api::{AuthResponse, Claims, CompleteProfileRequest, ProfileResponse};

use crate::auth::{self, AppState};
use crate::error::ApiError;
use crate::reconcile;
use crate::util;

/// Profile completion core: claims a permanent username and sets the
/// identity's password. Kept synchronous so it is testable without HTTP.
pub fn apply_profile_completion(
    db: &Database,
    user_id: &Uuid,
    username: &str,
    password: &str,
) -> Result<UserRow, ApiError> {
    reconcile::validate_username(username)?;
    reconcile::validate_password(password)?;

    let user = db
        .get_user_by_id(&user_id.to_string())?
        .ok_or(ApiError::NotFound)?;

    if let Some(existing) = db.get_user_by_username(username)? {
        if existing.id != user.id {
            return Err(ApiError::Validation("username is already taken".into()));
        }
    }

    let password_hash = reconcile::hash_password(password)?;
    db.update_username(&user.id, username)?;
    db.set_identity_password(&user.email, &password_hash)?;

    db.get_user_by_id(&user.id)?.ok_or(ApiError::NotFound)
}

pub async fn complete_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CompleteProfileRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let db = state.clone();
    let user_id = claims.sub;
    let user = tokio::task::spawn_blocking(move || {
        apply_profile_completion(&db.db, &user_id, &req.username, &req.password)
    })
    .await??;

    // Reissue the token: the username inside the claims just changed
    let token = auth::create_token(&state.jwt_secret, &user)?;

    Ok(Json(AuthResponse {
        token,
        user: auth::session_user(&user),
        route: ripple_types::api::PostLoginRoute::Home,
    }))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let db = state.clone();
    let viewer = claims.sub.to_string();

    let response = tokio::task::spawn_blocking(move || {
        let user = db
            .db
            .get_user_by_username(&username)?
            .ok_or(ApiError::NotFound)?;

        let followers_count = db.db.follower_count(&user.id)?;
        let following_count = db.db.following_count(&user.id)?;
        let is_following = db.db.is_following(&viewer, &user.id)?;
        let posts = db.db.get_feed(&viewer, Some(&user.id), 50, None)?;

        Ok::<_, ApiError>(ProfileResponse {
            user: util::user_summary(&user),
            bio: user.bio.clone(),
            followers_count,
            following_count,
            is_following,
            posts: posts.iter().map(util::post_from_row).collect(),
        })
    })
    .await??;

    Ok(Json(response))
}

pub async fn follow(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if user_id == claims.sub {
        return Err(ApiError::Validation("you cannot follow yourself".into()));
    }

    let db = state.clone();
    let follower = claims.sub.to_string();
    let target = user_id.to_string();
    tokio::task::spawn_blocking(move || {
        if db.db.get_user_by_id(&target)?.is_none() {
            return Err(ApiError::NotFound);
        }
        db.db.follow(&Uuid::new_v4().to_string(), &follower, &target)?;
        Ok::<_, ApiError>(())
    })
    .await??;

    Ok(Json(serde_json::json!({ "following": true })))
}

pub async fn unfollow(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let follower = claims.sub.to_string();
    let target = user_id.to_string();
    tokio::task::spawn_blocking(move || {
        if db.db.get_user_by_id(&target)?.is_none() {
            return Err(ApiError::NotFound);
        }
        db.db.unfollow(&follower, &target)?;
        Ok::<_, ApiError>(())
    })
    .await??;

    Ok(Json(serde_json::json!({ "following": false })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{hash_password, is_placeholder, sign_in_with_oauth, OAuthIdentity};
    use ripple_types::api::PostLoginRoute;

    fn provision_oauth_user(db: &Database, email: &str) -> UserRow {
        let assertion = OAuthIdentity {
            email: email.into(),
            name: Some("Alice".into()),
            avatar_url: None,
        };
        sign_in_with_oauth(db, &assertion).unwrap().user
    }

    #[test]
    fn completion_claims_username_and_sets_password() {
        let db = Database::open_in_memory().unwrap();
        let user = provision_oauth_user(&db, "a@x.com");
        assert!(is_placeholder(&user.username));

        let uid: Uuid = user.id.parse().unwrap();
        let updated = apply_profile_completion(&db, &uid, "alice01", "secret1").unwrap();
        assert_eq!(updated.username, "alice01");

        // Credentials now work, and the next sign-in routes home
        let outcome =
            crate::reconcile::sign_in_with_credentials(&db, "a@x.com", "secret1").unwrap();
        assert_eq!(outcome.route, PostLoginRoute::Home);
    }

    #[test]
    fn completion_rejects_taken_username_and_leaves_owner_untouched() {
        let db = Database::open_in_memory().unwrap();
        let hash = hash_password("secret1").unwrap();
        let first =
            crate::reconcile::register_user(&db, "first@x.com", "alice01", None, &hash).unwrap();

        let second = provision_oauth_user(&db, "second@x.com");
        let uid: Uuid = second.id.parse().unwrap();

        let err = apply_profile_completion(&db, &uid, "alice01", "secret1").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let owner = db.get_user_by_id(&first.id).unwrap().unwrap();
        assert_eq!(owner.username, "alice01");
        let claimant = db.get_user_by_id(&second.id).unwrap().unwrap();
        assert!(is_placeholder(&claimant.username));
    }

    #[test]
    fn completion_is_a_noop_conflict_for_own_username() {
        let db = Database::open_in_memory().unwrap();
        let hash = hash_password("secret1").unwrap();
        let user =
            crate::reconcile::register_user(&db, "a@x.com", "alice01", None, &hash).unwrap();

        // Re-claiming your own current username is allowed
        let uid: Uuid = user.id.parse().unwrap();
        let updated = apply_profile_completion(&db, &uid, "alice01", "newpass1").unwrap();
        assert_eq!(updated.username, "alice01");
    }

    #[test]
    fn completion_validates_shapes() {
        let db = Database::open_in_memory().unwrap();
        let user = provision_oauth_user(&db, "a@x.com");
        let uid: Uuid = user.id.parse().unwrap();

        assert!(matches!(
            apply_profile_completion(&db, &uid, "bad name", "secret1"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            apply_profile_completion(&db, &uid, "alice01", "short"),
            Err(ApiError::Validation(_))
        ));
        // Neither attempt may have claimed the username
        assert!(db.get_user_by_username("alice01").unwrap().is_none());
    }
}
