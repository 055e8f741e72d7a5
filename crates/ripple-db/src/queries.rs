use crate::Database;
use crate::models::{
    CommentRow, ContactRow, IdentityRow, MediaRow, MessageRow, PostRow, UserRow,
};
use anyhow::Result;
use rusqlite::{Connection, Row};

impl Database {
    // -- Identities --

    pub fn create_identity(
        &self,
        id: &str,
        email: &str,
        password_hash: Option<&str>,
        provider: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO identities (id, email, password_hash, provider) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, email, password_hash, provider],
            )?;
            Ok(())
        })
    }

    pub fn get_identity_by_email(&self, email: &str) -> Result<Option<IdentityRow>> {
        self.with_conn(|conn| {
            conn.prepare(
                "SELECT id, email, password_hash, provider, created_at
                 FROM identities WHERE email = ?1",
            )?
            .query_row([email], |row| {
                Ok(IdentityRow {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    provider: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .optional()
        })
    }

    pub fn set_identity_password(&self, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE identities SET password_hash = ?2 WHERE email = ?1",
                rusqlite::params![email, password_hash],
            )?;
            Ok(())
        })
    }

    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        username: &str,
        full_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, username, full_name, avatar_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, email, username, full_name, avatar_url],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn update_username(&self, id: &str, username: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET username = ?2 WHERE id = ?1",
                rusqlite::params![id, username],
            )?;
            Ok(())
        })
    }

    /// Case-insensitive substring search on username, excluding the caller.
    pub fn search_users(&self, query: &str, exclude_id: &str, limit: u32) -> Result<Vec<UserRow>> {
        let pattern = format!("%{}%", escape_like(query));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, username, full_name, bio, avatar_url, created_at
                 FROM users
                 WHERE username LIKE ?1 ESCAPE '\\' AND id != ?2
                 ORDER BY username
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, exclude_id, limit], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Posts --

    pub fn insert_post(
        &self,
        id: &str,
        user_id: &str,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, user_id, content, image_url) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, user_id, content, image_url],
            )?;
            Ok(())
        })
    }

    /// Newest-first feed with author join and per-post counts in one query.
    /// `author_id` restricts to one author (profile pages); `before` is a
    /// created_at cursor for older pages.
    pub fn get_feed(
        &self,
        viewer_id: &str,
        author_id: Option<&str>,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{POST_SELECT} {POST_FEED_TAIL}"))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![viewer_id, author_id, before, limit],
                    map_post_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_post(&self, viewer_id: &str, post_id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            conn.prepare(&format!("{POST_SELECT} WHERE p.id = ?2"))?
                .query_row(rusqlite::params![viewer_id, post_id], map_post_row)
                .optional()
        })
    }

    pub fn post_exists(&self, post_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
                [post_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Delete a post and its dependent rows, but only if `owner_id` wrote it.
    /// Returns false when the post is missing or owned by someone else.
    pub fn delete_post(&self, post_id: &str, owner_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let owner: Option<String> = conn
                .query_row("SELECT user_id FROM posts WHERE id = ?1", [post_id], |row| {
                    row.get(0)
                })
                .optional()?;

            match owner {
                Some(uid) if uid == owner_id => {
                    conn.execute("DELETE FROM likes WHERE post_id = ?1", [post_id])?;
                    conn.execute("DELETE FROM comments WHERE post_id = ?1", [post_id])?;
                    conn.execute("DELETE FROM posts WHERE id = ?1", [post_id])?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    // -- Likes --

    /// Idempotent like. Returns true if a row was inserted, false if the
    /// user had already liked the post.
    pub fn like_post(&self, id: &str, post_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO likes (id, post_id, user_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, post_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn unlike_post(&self, post_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM likes WHERE post_id = ?1 AND user_id = ?2",
                rusqlite::params![post_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn count_likes(&self, post_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
                [post_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Comments --

    pub fn insert_comment(
        &self,
        id: &str,
        post_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, user_id, content) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, post_id, user_id, content],
            )?;
            Ok(())
        })
    }

    pub fn get_comments(&self, post_id: &str) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.user_id, u.username, u.full_name, u.avatar_url,
                        c.content, c.created_at
                 FROM comments c
                 JOIN users u ON c.user_id = u.id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at DESC, c.rowid DESC",
            )?;
            let rows = stmt
                .query_map([post_id], |row| {
                    Ok(CommentRow {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                        author_id: row.get(2)?,
                        author_username: row.get(3)?,
                        author_full_name: row.get(4)?,
                        author_avatar_url: row.get(5)?,
                        content: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            conn.prepare(
                "SELECT c.id, c.post_id, c.user_id, u.username, u.full_name, u.avatar_url,
                        c.content, c.created_at
                 FROM comments c
                 JOIN users u ON c.user_id = u.id
                 WHERE c.id = ?1",
            )?
            .query_row([id], |row| {
                Ok(CommentRow {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    author_id: row.get(2)?,
                    author_username: row.get(3)?,
                    author_full_name: row.get(4)?,
                    author_avatar_url: row.get(5)?,
                    content: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })
            .optional()
        })
    }

    // -- Follows --

    /// Idempotent follow. Self-follows are rejected at the handler level.
    pub fn follow(&self, id: &str, follower_id: &str, following_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO follows (id, follower_id, following_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, follower_id, following_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn unfollow(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                rusqlite::params![follower_id, following_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND following_id = ?2)",
                rusqlite::params![follower_id, following_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn follower_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM follows WHERE following_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn following_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, sender_id, receiver_id, content],
            )?;
            Ok(())
        })
    }

    /// Both directions of a conversation, oldest first.
    pub fn get_conversation(&self, a: &str, b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, read, created_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![a, b], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark everything the peer sent to the reader as read.
    /// Returns the number of rows flipped.
    pub fn mark_conversation_read(&self, peer_id: &str, reader_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND read = 0",
                rusqlite::params![peer_id, reader_id],
            )?;
            Ok(changed)
        })
    }

    /// Every other user, with how many of their messages to `user_id` are
    /// still unread. Ordered by username for a stable sidebar.
    pub fn list_contacts(&self, user_id: &str) -> Result<Vec<ContactRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.full_name, u.avatar_url,
                        (SELECT COUNT(*) FROM messages m
                         WHERE m.sender_id = u.id AND m.receiver_id = ?1 AND m.read = 0)
                 FROM users u
                 WHERE u.id != ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ContactRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        full_name: row.get(2)?,
                        avatar_url: row.get(3)?,
                        unread_count: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Media --

    pub fn insert_media(&self, id: &str, owner_id: &str, size: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO media (id, owner_id, size) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, owner_id, size],
            )?;
            Ok(())
        })
    }

    pub fn get_media(&self, id: &str) -> Result<Option<MediaRow>> {
        self.with_conn(|conn| {
            conn.prepare("SELECT id, owner_id, size, created_at FROM media WHERE id = ?1")?
                .query_row([id], |row| {
                    Ok(MediaRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        size: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()
        })
    }
}

/// Shared post projection: author joined in, like/comment counts and the
/// viewer's own like as subqueries (eliminates N+1 per post). ?1 is always
/// the viewing user.
const POST_SELECT: &str = "
    SELECT p.id, p.user_id, u.username, u.full_name, u.avatar_url,
           p.content, p.image_url, p.created_at,
           (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
           EXISTS(SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ?1)
    FROM posts p
    JOIN users u ON p.user_id = u.id";

const POST_FEED_TAIL: &str = "
    WHERE (?2 IS NULL OR p.user_id = ?2)
      AND (?3 IS NULL OR p.created_at < ?3)
    ORDER BY p.created_at DESC, p.rowid DESC
    LIMIT ?4";

fn map_post_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_username: row.get(2)?,
        author_full_name: row.get(3)?,
        author_avatar_url: row.get(4)?,
        content: row.get(5)?,
        image_url: row.get(6)?,
        created_at: row.get(7)?,
        likes_count: row.get(8)?,
        comments_count: row.get(9)?,
        has_liked: row.get(10)?,
    })
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        full_name: row.get(3)?,
        bio: row.get(4)?,
        avatar_url: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always a compile-time constant from this module
    let sql = format!(
        "SELECT id, email, username, full_name, bio, avatar_url, created_at
         FROM users WHERE {column} = ?1"
    );
    conn.prepare(&sql)?.query_row([value], map_user_row).optional()
}

/// Escape LIKE wildcards in user input. Pattern uses ESCAPE '\'.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let email = format!("{username}@example.com");
        db.create_user(&id, &email, username, None, None).unwrap();
        id
    }

    fn add_post(db: &Database, user_id: &str, content: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_post(&id, user_id, content, None).unwrap();
        id
    }

    #[test]
    fn feed_is_newest_first_with_counts() {
        let db = db();
        let alice = add_user(&db, "alice01");
        let bob = add_user(&db, "bob");

        let first = add_post(&db, &alice, "first");
        let second = add_post(&db, &bob, "second");

        db.like_post(&Uuid::new_v4().to_string(), &first, &bob).unwrap();
        db.insert_comment(&Uuid::new_v4().to_string(), &first, &bob, "nice").unwrap();

        let feed = db.get_feed(&bob, None, 20, None).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].id, second);
        assert_eq!(feed[1].id, first);
        assert_eq!(feed[1].likes_count, 1);
        assert_eq!(feed[1].comments_count, 1);
        assert!(feed[1].has_liked);
        assert!(!feed[0].has_liked);
        assert_eq!(feed[1].author_username, "alice01");
    }

    #[test]
    fn feed_filters_by_author() {
        let db = db();
        let alice = add_user(&db, "alice01");
        let bob = add_user(&db, "bob");
        add_post(&db, &alice, "from alice");
        add_post(&db, &bob, "from bob");

        let feed = db.get_feed(&bob, Some(&alice), 20, None).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].author_id, alice);
    }

    #[test]
    fn like_is_idempotent() {
        let db = db();
        let alice = add_user(&db, "alice01");
        let post = add_post(&db, &alice, "hello");

        assert!(db.like_post(&Uuid::new_v4().to_string(), &post, &alice).unwrap());
        assert!(!db.like_post(&Uuid::new_v4().to_string(), &post, &alice).unwrap());
        assert_eq!(db.count_likes(&post).unwrap(), 1);

        assert!(db.unlike_post(&post, &alice).unwrap());
        assert!(!db.unlike_post(&post, &alice).unwrap());
        assert_eq!(db.count_likes(&post).unwrap(), 0);
    }

    #[test]
    fn delete_post_requires_ownership() {
        let db = db();
        let alice = add_user(&db, "alice01");
        let bob = add_user(&db, "bob");
        let post = add_post(&db, &alice, "mine");
        db.like_post(&Uuid::new_v4().to_string(), &post, &bob).unwrap();

        assert!(!db.delete_post(&post, &bob).unwrap());
        assert!(db.post_exists(&post).unwrap());

        assert!(db.delete_post(&post, &alice).unwrap());
        assert!(!db.post_exists(&post).unwrap());
        assert_eq!(db.count_likes(&post).unwrap(), 0);
    }

    #[test]
    fn conversation_marks_peer_messages_read() {
        let db = db();
        let alice = add_user(&db, "alice01");
        let bob = add_user(&db, "bob");

        db.insert_message(&Uuid::new_v4().to_string(), &alice, &bob, "hi bob").unwrap();
        db.insert_message(&Uuid::new_v4().to_string(), &bob, &alice, "hi alice").unwrap();

        // Bob opens the conversation: alice -> bob flips to read,
        // bob -> alice stays unread on alice's side.
        let flipped = db.mark_conversation_read(&alice, &bob).unwrap();
        assert_eq!(flipped, 1);

        let convo = db.get_conversation(&alice, &bob).unwrap();
        assert_eq!(convo.len(), 2);
        assert!(convo[0].read);
        assert!(!convo[1].read);

        let contacts = db.list_contacts(&alice).unwrap();
        let bob_entry = contacts.iter().find(|c| c.id == bob).unwrap();
        assert_eq!(bob_entry.unread_count, 1);
    }

    #[test]
    fn contacts_exclude_self_and_order_by_username() {
        let db = db();
        let alice = add_user(&db, "alice01");
        add_user(&db, "zoe");
        add_user(&db, "bob");

        let contacts = db.list_contacts(&alice).unwrap();
        let names: Vec<&str> = contacts.iter().map(|c| c.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "zoe"]);
    }

    #[test]
    fn follow_is_idempotent_and_counted() {
        let db = db();
        let alice = add_user(&db, "alice01");
        let bob = add_user(&db, "bob");

        assert!(db.follow(&Uuid::new_v4().to_string(), &alice, &bob).unwrap());
        assert!(!db.follow(&Uuid::new_v4().to_string(), &alice, &bob).unwrap());
        assert!(db.is_following(&alice, &bob).unwrap());
        assert_eq!(db.follower_count(&bob).unwrap(), 1);
        assert_eq!(db.following_count(&alice).unwrap(), 1);

        assert!(db.unfollow(&alice, &bob).unwrap());
        assert!(!db.is_following(&alice, &bob).unwrap());
        assert_eq!(db.follower_count(&bob).unwrap(), 0);
    }

    #[test]
    fn search_escapes_like_wildcards() {
        let db = db();
        let viewer = add_user(&db, "viewer");
        add_user(&db, "alice01");
        add_user(&db, "a_lice");

        // An underscore in the query must not act as a single-char wildcard
        let hits = db.search_users("a_l", &viewer, 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].username, "a_lice");

        // Case-insensitive substring match, caller excluded
        let hits = db.search_users("ALICE", &viewer, 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].username, "alice01");

        let hits = db.search_users("viewer", &viewer, 20).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn duplicate_username_insert_fails() {
        let db = db();
        add_user(&db, "alice01");
        let id = Uuid::new_v4().to_string();
        let err = db.create_user(&id, "other@example.com", "alice01", None, None);
        assert!(err.is_err());
    }

    #[test]
    fn identity_password_can_be_set_later() {
        let db = db();
        db.create_identity(&Uuid::new_v4().to_string(), "a@x.com", None, "oauth").unwrap();

        let identity = db.get_identity_by_email("a@x.com").unwrap().unwrap();
        assert!(identity.password_hash.is_none());
        assert_eq!(identity.provider, "oauth");

        db.set_identity_password("a@x.com", "argon2-hash").unwrap();
        let identity = db.get_identity_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(identity.password_hash.as_deref(), Some("argon2-hash"));
    }
}
