//! Database row types, mapped directly from SQLite rows. Distinct from the
//! ripple-types API models so the DB layer stays independent of the wire
//! shapes.

pub struct IdentityRow {
    pub id: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub provider: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub author_full_name: Option<String>,
    pub author_avatar_url: Option<String>,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: String,
    pub likes_count: i64,
    pub comments_count: i64,
    pub has_liked: bool,
}

pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_username: String,
    pub author_full_name: Option<String>,
    pub author_avatar_url: Option<String>,
    pub content: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
}

pub struct ContactRow {
    pub id: String,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub unread_count: i64,
}

pub struct MediaRow {
    pub id: String,
    pub owner_id: String,
    pub size: i64,
    pub created_at: String,
}
