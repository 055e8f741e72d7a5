use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Comment, Message, Post};

/// Row-change events pushed to clients over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new post was created
    PostCreate { post: Post },

    /// A post was deleted by its owner
    PostDelete { post_id: Uuid, author_id: Uuid },

    /// A comment was added to a post
    CommentCreate { post_id: Uuid, comment: Comment },

    /// A post's like count changed
    LikeUpdate { post_id: Uuid, likes_count: i64 },

    /// A direct message was sent. Delivered only to the two endpoints of the
    /// conversation, never broadcast.
    MessageCreate { message: Message },
}

impl GatewayEvent {
    /// Returns the author whose feed this event belongs to, if any.
    /// Clients subscribed to a single author's feed only receive events
    /// where this matches; `None` means the event is not author-scoped.
    pub fn feed_author(&self) -> Option<Uuid> {
        match self {
            Self::PostCreate { post } => Some(post.author.id),
            Self::PostDelete { author_id, .. } => Some(*author_id),
            // Ready and MessageCreate are targeted; comments/likes apply to
            // whatever feed currently shows the post
            _ => None,
        }
    }

    /// True for events that belong on a feed subscription at all.
    pub fn is_feed_event(&self) -> bool {
        matches!(
            self,
            Self::PostCreate { .. }
                | Self::PostDelete { .. }
                | Self::CommentCreate { .. }
                | Self::LikeUpdate { .. }
        )
    }
}

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to feed events. With `user_id` set, only that author's
    /// post events are delivered (a profile page feed); without it, the
    /// whole home feed.
    SubscribeFeed { user_id: Option<Uuid> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserSummary;
    use chrono::Utc;

    fn post(author_id: Uuid) -> Post {
        Post {
            id: Uuid::new_v4(),
            author: UserSummary {
                id: author_id,
                username: "alice01".into(),
                full_name: None,
                avatar_url: None,
            },
            content: "hello".into(),
            image_url: None,
            created_at: Utc::now(),
            likes_count: 0,
            comments_count: 0,
            has_liked: false,
        }
    }

    #[test]
    fn post_events_are_author_scoped() {
        let author = Uuid::new_v4();
        let create = GatewayEvent::PostCreate { post: post(author) };
        assert_eq!(create.feed_author(), Some(author));
        assert!(create.is_feed_event());

        let delete = GatewayEvent::PostDelete {
            post_id: Uuid::new_v4(),
            author_id: author,
        };
        assert_eq!(delete.feed_author(), Some(author));
    }

    #[test]
    fn like_update_reaches_any_feed_subscriber() {
        let event = GatewayEvent::LikeUpdate {
            post_id: Uuid::new_v4(),
            likes_count: 3,
        };
        assert!(event.is_feed_event());
        assert_eq!(event.feed_author(), None);
    }

    #[test]
    fn ready_is_not_a_feed_event() {
        let event = GatewayEvent::Ready {
            user_id: Uuid::new_v4(),
            username: "alice01".into(),
        };
        assert!(!event.is_feed_event());
    }

    #[test]
    fn command_round_trips_through_tagged_json() {
        let json = r#"{"type":"SubscribeFeed","data":{"user_id":null}}"#;
        let cmd: GatewayCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, GatewayCommand::SubscribeFeed { user_id: None }));
    }
}
