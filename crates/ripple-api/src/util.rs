use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use ripple_db::models::{CommentRow, MessageRow, PostRow, UserRow};
use ripple_types::models::{Comment, Message, Post, UserSummary};

pub(crate) fn parse_uuid(value: &str, context: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", context, value, e);
        Uuid::default()
    })
}

pub(crate) fn parse_created_at(value: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            // Parse as naive UTC and convert.
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}': {}", value, e);
            DateTime::default()
        })
}

pub(crate) fn user_summary(row: &UserRow) -> UserSummary {
    UserSummary {
        id: parse_uuid(&row.id, "user id"),
        username: row.username.clone(),
        full_name: row.full_name.clone(),
        avatar_url: row.avatar_url.clone(),
    }
}

pub(crate) fn post_from_row(row: &PostRow) -> Post {
    Post {
        id: parse_uuid(&row.id, "post id"),
        author: UserSummary {
            id: parse_uuid(&row.author_id, "post author id"),
            username: row.author_username.clone(),
            full_name: row.author_full_name.clone(),
            avatar_url: row.author_avatar_url.clone(),
        },
        content: row.content.clone(),
        image_url: row.image_url.clone(),
        created_at: parse_created_at(&row.created_at),
        likes_count: row.likes_count,
        comments_count: row.comments_count,
        has_liked: row.has_liked,
    }
}

pub(crate) fn comment_from_row(row: &CommentRow) -> Comment {
    Comment {
        id: parse_uuid(&row.id, "comment id"),
        post_id: parse_uuid(&row.post_id, "comment post id"),
        author: UserSummary {
            id: parse_uuid(&row.author_id, "comment author id"),
            username: row.author_username.clone(),
            full_name: row.author_full_name.clone(),
            avatar_url: row.author_avatar_url.clone(),
        },
        content: row.content.clone(),
        created_at: parse_created_at(&row.created_at),
    }
}

pub(crate) fn message_from_row(row: &MessageRow) -> Message {
    Message {
        id: parse_uuid(&row.id, "message id"),
        sender_id: parse_uuid(&row.sender_id, "message sender id"),
        receiver_id: parse_uuid(&row.receiver_id, "message receiver id"),
        content: row.content.clone(),
        read: row.read,
        created_at: parse_created_at(&row.created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_naive_timestamps_parse_as_utc() {
        let parsed = parse_created_at("2026-03-01 12:30:45");
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T12:30:45+00:00");
    }

    #[test]
    fn rfc3339_timestamps_parse_directly() {
        let naive = parse_created_at("2026-03-01 12:30:45");
        let rfc = parse_created_at("2026-03-01T12:30:45Z");
        assert_eq!(naive, rfc);
    }
}
