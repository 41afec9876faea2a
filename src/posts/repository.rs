use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::db::models::{Comment, Post, PostKind, ReactionKind, SavedPost};
use crate::error::{AppError, AppResult};
use crate::users::repository::{row_to_summary, SUMMARY_COLUMNS};

/// Content of a post about to be stored.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub kind: Option<PostKind>,
    pub text: Option<String>,
    pub images: Vec<String>,
    pub background: Option<String>,
}

fn post_select() -> String {
    format!(
        "SELECT p.id, p.kind, p.text, p.images, p.background, p.created_at, p.updated_at,
                {SUMMARY_COLUMNS}
         FROM posts p
         JOIN users u ON u.id = p.user_id"
    )
}

fn row_to_post(row: &Row) -> rusqlite::Result<Post> {
    let kind: Option<String> = row.get(1)?;
    let kind = kind
        .map(|k| k.parse::<PostKind>())
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let images: String = row.get(3)?;
    let images: Vec<String> = serde_json::from_str(&images).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Post {
        id: row.get(0)?,
        kind,
        text: row.get(2)?,
        images,
        background: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        user: row_to_summary(row, 7)?,
        comments: Vec::new(),
    })
}

/// Run a post query and attach each post's comments.
fn load_posts(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> AppResult<Vec<Post>> {
    let mut stmt = conn.prepare(sql)?;
    let mut posts = stmt
        .query_map(params, row_to_post)?
        .collect::<Result<Vec<_>, _>>()?;

    for post in &mut posts {
        post.comments = comments_for(conn, &post.id)?;
    }
    Ok(posts)
}

pub fn comments_for(conn: &Connection, post_id: &str) -> AppResult<Vec<Comment>> {
    let sql = format!(
        "SELECT c.id, c.comment, c.image, c.comment_at, {SUMMARY_COLUMNS}
         FROM comments c
         JOIN users u ON u.id = c.comment_by
         WHERE c.post_id = ?1
         ORDER BY c.id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![post_id], |row| {
        Ok(Comment {
            id: row.get(0)?,
            comment: row.get(1)?,
            image: row.get(2)?,
            comment_at: row.get(3)?,
            comment_by: row_to_summary(row, 4)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn find_post(conn: &Connection, post_id: &str) -> AppResult<Option<Post>> {
    let sql = format!("{} WHERE p.id = ?1", post_select());
    let post = conn.query_row(&sql, params![post_id], row_to_post).optional()?;
    match post {
        Some(mut post) => {
            post.comments = comments_for(conn, &post.id)?;
            Ok(Some(post))
        }
        None => Ok(None),
    }
}

fn post_exists(conn: &Connection, post_id: &str) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?)
}

pub fn create_post(
    conn: &Connection,
    user_id: &str,
    post: &NewPost,
    now: DateTime<Utc>,
) -> AppResult<Post> {
    let has_text = post.text.as_deref().is_some_and(|t| !t.trim().is_empty());
    if !has_text && post.images.is_empty() {
        return Err(AppError::Validation(
            "A post needs text or at least one image.".into(),
        ));
    }

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO posts (id, user_id, kind, text, images, background, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id,
            user_id,
            post.kind.map(|k| k.as_str()),
            post.text,
            serde_json::to_string(&post.images)?,
            post.background,
            now,
        ],
    )?;

    tracing::info!(post_id = %id, user_id = %user_id, "Post created");

    find_post(conn, &id)?.ok_or_else(|| AppError::Internal("Inserted post vanished".into()))
}

/// Most recent posts by one author, newest first.
pub fn posts_by_user(conn: &Connection, user_id: &str, limit: Option<u32>) -> AppResult<Vec<Post>> {
    let sql = format!(
        "{} WHERE p.user_id = ?1 ORDER BY p.created_at DESC LIMIT ?2",
        post_select()
    );
    // LIMIT -1 is unbounded in SQLite
    let limit = limit.map(i64::from).unwrap_or(-1);
    load_posts(conn, &sql, params![user_id, limit])
}

/// Posts created in `[start, end)`, newest first.
pub fn posts_between(
    conn: &Connection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: u32,
) -> AppResult<Vec<Post>> {
    let sql = format!(
        "{} WHERE p.created_at >= ?1 AND p.created_at < ?2 ORDER BY p.created_at DESC LIMIT ?3",
        post_select()
    );
    load_posts(conn, &sql, params![start, end, limit])
}

/// Append a comment and return the post's full comment list.
pub fn add_comment(
    conn: &Connection,
    post_id: &str,
    user_id: &str,
    comment: &str,
    image: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Vec<Comment>> {
    if comment.trim().is_empty() && image.is_none() {
        return Err(AppError::Validation("Comment cannot be empty".into()));
    }
    if !post_exists(conn, post_id)? {
        return Err(AppError::NotFound("Post not found".into()));
    }

    conn.execute(
        "INSERT INTO comments (post_id, comment_by, comment, image, comment_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![post_id, user_id, comment, image, now],
    )?;

    comments_for(conn, post_id)
}

/// Only the author may delete a post.
pub fn delete_post(conn: &Connection, post_id: &str, user_id: &str) -> AppResult<()> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT user_id FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .optional()?;

    match owner {
        None => Err(AppError::NotFound("Post not found".into())),
        Some(owner) if owner != user_id => Err(AppError::Forbidden(
            "You can only delete your own posts.".into(),
        )),
        Some(_) => {
            conn.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
            tracing::info!(post_id = %post_id, user_id = %user_id, "Post deleted");
            Ok(())
        }
    }
}

/// Toggle the saved marker for (user, post). Returns whether it is now saved.
pub fn toggle_saved(conn: &Connection, user_id: &str, post_id: &str, now: DateTime<Utc>) -> AppResult<bool> {
    if !post_exists(conn, post_id)? {
        return Err(AppError::NotFound("Post not found".into()));
    }

    let removed = conn.execute(
        "DELETE FROM saved_posts WHERE user_id = ?1 AND post_id = ?2",
        params![user_id, post_id],
    )?;
    if removed > 0 {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO saved_posts (user_id, post_id, saved_at) VALUES (?1, ?2, ?3)",
        params![user_id, post_id, now],
    )?;
    Ok(true)
}

pub fn saved_posts(conn: &Connection, user_id: &str) -> AppResult<Vec<SavedPost>> {
    let mut stmt = conn.prepare(
        "SELECT post_id, saved_at FROM saved_posts WHERE user_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(SavedPost {
            post_id: row.get(0)?,
            saved_at: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Set, replace or clear the caller's reaction. Reacting with the kind already
/// held clears it. Returns the reaction now held.
pub fn react(
    conn: &Connection,
    post_id: &str,
    user_id: &str,
    kind: ReactionKind,
    now: DateTime<Utc>,
) -> AppResult<Option<ReactionKind>> {
    if !post_exists(conn, post_id)? {
        return Err(AppError::NotFound("Post not found".into()));
    }

    let current = current_reaction(conn, post_id, user_id)?;
    if current == Some(kind) {
        conn.execute(
            "DELETE FROM reactions WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
        )?;
        return Ok(None);
    }

    conn.execute(
        "INSERT INTO reactions (id, post_id, user_id, react, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (post_id, user_id) DO UPDATE SET react = excluded.react,
                                                     created_at = excluded.created_at",
        params![
            uuid::Uuid::now_v7().to_string(),
            post_id,
            user_id,
            kind.as_str(),
            now
        ],
    )?;
    Ok(Some(kind))
}

fn current_reaction(conn: &Connection, post_id: &str, user_id: &str) -> AppResult<Option<ReactionKind>> {
    let react: Option<String> = conn
        .query_row(
            "SELECT react FROM reactions WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    react
        .map(|r| r.parse::<ReactionKind>())
        .transpose()
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionCount {
    pub react: ReactionKind,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionSummary {
    /// Every kind, most used first
    pub reacts: Vec<ReactionCount>,
    pub total: i64,
    pub check: Option<ReactionKind>,
}

pub fn reaction_summary(conn: &Connection, post_id: &str, viewer_id: &str) -> AppResult<ReactionSummary> {
    if !post_exists(conn, post_id)? {
        return Err(AppError::NotFound("Post not found".into()));
    }

    let mut reacts = Vec::with_capacity(ReactionKind::ALL.len());
    for kind in ReactionKind::ALL {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reactions WHERE post_id = ?1 AND react = ?2",
            params![post_id, kind.as_str()],
            |row| row.get(0),
        )?;
        reacts.push(ReactionCount { react: kind, count });
    }
    // stable sort keeps declaration order among ties
    reacts.sort_by(|a, b| b.count.cmp(&a.count));

    let total = reacts.iter().map(|r| r.count).sum();
    Ok(ReactionSummary {
        reacts,
        total,
        check: current_reaction(conn, post_id, viewer_id)?,
    })
}
