pub mod auth;
pub mod error;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod posts;
pub mod profile;
pub mod reconcile;
pub mod search;

mod util;
