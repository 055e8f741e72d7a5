use std::path::PathBuf;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;

use ripple_types::api::Claims;

/// Cookie carrying the same JWT the API takes as a bearer token. Set by the
/// frontend after sign-in so page navigation can be gated server-side.
pub const SESSION_COOKIE: &str = "ripple_session";

const FALLBACK_SHELL: &str =
    "<!doctype html><html><head><title>Ripple</title></head><body><p>Ripple server is running.</p></body></html>";

#[derive(Clone)]
pub struct PageState {
    pub jwt_secret: String,
    pub static_dir: Option<PathBuf>,
}

/// Page routes for the SPA shell, gated by the redirect filter:
/// unauthenticated requests go to /signin, authenticated requests are kept
/// away from /signin and /register, and / resolves to one or the other.
pub fn router(state: PageState) -> Router {
    Router::new()
        .route("/", get(serve_shell))
        .route("/home", get(serve_shell))
        .route("/search", get(serve_shell))
        .route("/chat", get(serve_shell))
        .route("/profile/{username}", get(serve_shell))
        .route("/complete-profile", get(serve_shell))
        .route("/signin", get(serve_shell))
        .route("/register", get(serve_shell))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            redirect_filter,
        ))
        .with_state(state)
}

async fn redirect_filter(
    State(state): State<PageState>,
    req: Request,
    next: Next,
) -> Response {
    let authed = session_claims(req.headers(), &state.jwt_secret).is_some();
    if let Some(target) = page_redirect(req.uri().path(), authed) {
        return Redirect::to(target).into_response();
    }
    next.run(req).await
}

/// Where a page request should be redirected, if anywhere.
fn page_redirect(path: &str, authed: bool) -> Option<&'static str> {
    let public = matches!(path, "/signin" | "/register");
    if path == "/" {
        return Some(if authed { "/home" } else { "/signin" });
    }
    if !authed && !public {
        return Some("/signin");
    }
    if authed && public {
        return Some("/home");
    }
    None
}

fn session_claims(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    let token = cookies
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(SESSION_COOKIE)?.strip_prefix('='));

    decode::<Claims>(
        token?,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

async fn serve_shell(State(state): State<PageState>) -> Response {
    if let Some(dir) = &state.static_dir {
        match tokio::fs::read_to_string(dir.join("index.html")).await {
            Ok(html) => return Html(html).into_response(),
            Err(e) => warn!("Failed to read SPA shell: {}", e),
        }
    }
    Html(FALLBACK_SHELL).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_resolves_by_auth_state() {
        assert_eq!(page_redirect("/", false), Some("/signin"));
        assert_eq!(page_redirect("/", true), Some("/home"));
    }

    #[test]
    fn unauthenticated_users_are_sent_to_signin() {
        assert_eq!(page_redirect("/home", false), Some("/signin"));
        assert_eq!(page_redirect("/chat", false), Some("/signin"));
        assert_eq!(page_redirect("/profile/alice01", false), Some("/signin"));
        assert_eq!(page_redirect("/signin", false), None);
        assert_eq!(page_redirect("/register", false), None);
    }

    #[test]
    fn authenticated_users_skip_the_auth_pages() {
        assert_eq!(page_redirect("/signin", true), Some("/home"));
        assert_eq!(page_redirect("/register", true), Some("/home"));
        assert_eq!(page_redirect("/home", true), None);
        assert_eq!(page_redirect("/complete-profile", true), None);
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        use jsonwebtoken::{EncodingKey, Header, encode};
        use uuid::Uuid;

        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "alice01".into(),
            exp: (chrono::Utc::now() + chrono::Duration::days(1)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("theme=dark; ripple_session={token}; lang=en")
                .parse()
                .unwrap(),
        );

        let parsed = session_claims(&headers, "test-secret").unwrap();
        assert_eq!(parsed.username, "alice01");

        assert!(session_claims(&headers, "other-secret").is_none());
    }
}
