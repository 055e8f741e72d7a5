mod pages;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use ripple_api::auth::{self, AppState, AppStateInner};
use ripple_api::media;
use ripple_api::messages;
use ripple_api::middleware::require_auth;
use ripple_api::posts;
use ripple_api::profile;
use ripple_api::search;
use ripple_gateway::connection;
use ripple_gateway::dispatcher::Dispatcher;

use crate::pages::PageState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ripple=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("RIPPLE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("RIPPLE_DB_PATH").unwrap_or_else(|_| "ripple.db".into());
    let host = std::env::var("RIPPLE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("RIPPLE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let media_dir = std::env::var("RIPPLE_MEDIA_DIR").unwrap_or_else(|_| "./media".into());
    let oauth_userinfo_url = std::env::var("RIPPLE_OAUTH_USERINFO_URL").ok();
    let static_dir = std::env::var("RIPPLE_STATIC_DIR").ok().map(PathBuf::from);

    // Init database
    let db = ripple_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
        media_dir: PathBuf::from(media_dir),
        oauth_userinfo_url,
        http: reqwest::Client::new(),
    });

    // Routes
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/oauth", post(auth::oauth))
        .route("/media/{media_id}", get(media::download))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/complete-profile", post(profile::complete_profile))
        .route("/api/posts", get(posts::get_feed).post(posts::create_post))
        .route("/api/posts/{post_id}", delete(posts::delete_post))
        .route(
            "/api/posts/{post_id}/like",
            put(posts::like_post).delete(posts::unlike_post),
        )
        .route(
            "/api/posts/{post_id}/comments",
            get(posts::get_comments).post(posts::create_comment),
        )
        .route("/api/users/search", get(search::search_users))
        .route("/api/users/{username}", get(profile::get_profile))
        .route(
            "/api/users/{user_id}/follow",
            put(profile::follow).delete(profile::unfollow),
        )
        .route(
            "/api/messages/{user_id}",
            get(messages::get_conversation).post(messages::send_message),
        )
        .route("/api/contacts", get(messages::list_contacts))
        .route("/api/media", post(media::upload))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state.clone());

    let ws_route = Router::new()
        .route("/api/gateway", get(ws_upgrade))
        .with_state(app_state.clone());

    let page_routes = pages::router(PageState {
        jwt_secret: jwt_secret.clone(),
        static_dir,
    });

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .merge(page_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Ripple server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, jwt_secret))
}
