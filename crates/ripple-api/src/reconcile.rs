//! Session reconciliation: bridges a successful authentication event
//! (credential check or OAuth assertion) to the application's user row and
//! decides the post-login route. The canonical lookup key is email on every
//! path, and identity/user-row provisioning is two-phase with an idempotent
//! repair on the next sign-in.

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use uuid::Uuid;

use ripple_db::Database;
use ripple_db::models::UserRow;
use ripple_types::api::PostLoginRoute;

use crate::error::ApiError;

/// Usernames with this prefix are auto-generated placeholders; the user is
/// routed to profile completion until they pick a real one.
pub const PLACEHOLDER_PREFIX: &str = "user_";

/// The profile claim of an external identity provider after it verified the
/// sign-in.
#[derive(Debug, Clone)]
pub struct OAuthIdentity {
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug)]
pub struct SignInOutcome {
    pub user: UserRow,
    pub route: PostLoginRoute,
}

pub fn is_placeholder(username: &str) -> bool {
    username.starts_with(PLACEHOLDER_PREFIX)
}

/// Generated placeholder username. The suffix comes from a UUIDv4 so
/// concurrent provisioning cannot collide the way a timestamp suffix could.
pub fn placeholder_username() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{PLACEHOLDER_PREFIX}{}", &suffix[..12])
}

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::Validation("username is required".into()));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::Validation(
            "username can only contain letters, numbers, and underscores".into(),
        ));
    }
    // Keeps the placeholder predicate unambiguous
    if is_placeholder(username) {
        return Err(ApiError::Validation(
            "usernames starting with user_ are reserved".into(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 6 {
        return Err(ApiError::Validation(
            "password must be at least 6 characters".into(),
        ));
    }
    Ok(())
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Backend(anyhow!("password hashing failed: {e}")))
}

/// Credential registration: creates the identity record and the user row.
pub fn register_user(
    db: &Database,
    email: &str,
    username: &str,
    full_name: Option<&str>,
    password_hash: &str,
) -> Result<UserRow, ApiError> {
    if db.get_identity_by_email(email)?.is_some() || db.get_user_by_email(email)?.is_some() {
        return Err(ApiError::Validation("email is already registered".into()));
    }
    if db.get_user_by_username(username)?.is_some() {
        return Err(ApiError::Validation("username is already taken".into()));
    }

    db.create_identity(
        &Uuid::new_v4().to_string(),
        email,
        Some(password_hash),
        "credentials",
    )
    .map_err(|_| ApiError::Provisioning)?;

    let user_id = Uuid::new_v4().to_string();
    db.create_user(&user_id, email, username, full_name, None)
        .map_err(|_| ApiError::Provisioning)?;

    db.get_user_by_id(&user_id)?.ok_or(ApiError::Provisioning)
}

/// Credentials sign-in. The login key may be an email or a username; either
/// way the identity is resolved through email. A missing identity, an
/// identity without a password, and a failed verification are
/// indistinguishable to the caller.
pub fn sign_in_with_credentials(
    db: &Database,
    login: &str,
    password: &str,
) -> Result<SignInOutcome, ApiError> {
    let email = if login.contains('@') {
        login.to_string()
    } else {
        db.get_user_by_username(login)?
            .map(|u| u.email)
            .ok_or(ApiError::InvalidCredentials)?
    };

    let identity = db
        .get_identity_by_email(&email)?
        .ok_or(ApiError::InvalidCredentials)?;
    let hash = identity
        .password_hash
        .as_deref()
        .ok_or(ApiError::InvalidCredentials)?;

    let parsed =
        PasswordHash::new(hash).map_err(|e| ApiError::Backend(anyhow!("corrupt password hash: {e}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::InvalidCredentials)?;

    let user = ensure_user_row(db, &identity.email, None, None)?;
    Ok(SignInOutcome {
        route: route_for(&user),
        user,
    })
}

/// OAuth sign-in. Looks the user up by the asserted email; provisions an
/// identity and a placeholder user row when neither exists yet.
pub fn sign_in_with_oauth(
    db: &Database,
    assertion: &OAuthIdentity,
) -> Result<SignInOutcome, ApiError> {
    if db.get_identity_by_email(&assertion.email)?.is_none() {
        // Phase one of provisioning. Not atomic with the user-row insert in
        // ensure_user_row: a failure between the two leaves an orphaned
        // identity that the next sign-in repairs.
        db.create_identity(&Uuid::new_v4().to_string(), &assertion.email, None, "oauth")
            .map_err(|_| ApiError::Provisioning)?;
    }

    let user = ensure_user_row(
        db,
        &assertion.email,
        assertion.name.as_deref(),
        assertion.avatar_url.as_deref(),
    )?;
    Ok(SignInOutcome {
        route: route_for(&user),
        user,
    })
}

fn route_for(user: &UserRow) -> PostLoginRoute {
    if is_placeholder(&user.username) {
        PostLoginRoute::CompleteProfile
    } else {
        PostLoginRoute::Home
    }
}

/// Fetch the user row for an identity, synthesizing one with a placeholder
/// username when it is missing (fresh OAuth provision, or an orphan left by
/// an earlier partial failure).
fn ensure_user_row(
    db: &Database,
    email: &str,
    full_name: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<UserRow, ApiError> {
    if let Some(user) = db.get_user_by_email(email)? {
        return Ok(user);
    }

    let user_id = Uuid::new_v4().to_string();
    db.create_user(&user_id, email, &placeholder_username(), full_name, avatar_url)
        .map_err(|_| ApiError::Provisioning)?;
    db.get_user_by_id(&user_id)?.ok_or(ApiError::Provisioning)
}
