use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};

use crate::db::models::Post;
use crate::error::AppResult;
use crate::posts::repository::{posts_by_user, posts_between};

/// Posts taken from each followed author and from the viewer.
pub const PER_AUTHOR: u32 = 10;

/// Cap on the public feed.
pub const PUBLIC_LIMIT: u32 = 10;

/// Flatten per-author batches and order newest first.
pub fn merge(batches: Vec<Vec<Post>>) -> Vec<Post> {
    let mut posts: Vec<Post> = batches.into_iter().flatten().collect();
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts
}

fn following_ids(conn: &Connection, viewer_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT member_id FROM user_relations
         WHERE user_id = ?1 AND list = 'following'
         ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![viewer_id], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<String>, _>>()?)
}

/// Home feed: the latest posts of every followed identity plus the viewer's own.
pub fn home_feed(conn: &Connection, viewer_id: &str) -> AppResult<Vec<Post>> {
    let mut batches = Vec::new();
    for author in following_ids(conn, viewer_id)? {
        batches.push(posts_by_user(conn, &author, Some(PER_AUTHOR))?);
    }
    batches.push(posts_by_user(conn, viewer_id, Some(PER_AUTHOR))?);
    Ok(merge(batches))
}

/// Start and end of the UTC calendar day containing `now`.
pub fn utc_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now);
    (start, start + Duration::days(1))
}

/// Today's posts from every author, newest first.
pub fn public_feed(conn: &Connection, now: DateTime<Utc>) -> AppResult<Vec<Post>> {
    let (start, end) = utc_day_bounds(now);
    posts_between(conn, start, end, PUBLIC_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::UserSummary;
    use crate::graph::{GraphRepository, RelationOp, SqliteGraphRepository};
    use crate::posts::repository::{create_post, NewPost};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn post_at(id: &str, at: DateTime<Utc>) -> Post {
        Post {
            id: id.to_string(),
            kind: None,
            text: None,
            images: Vec::new(),
            background: None,
            user: UserSummary {
                id: "u".into(),
                first_name: "U".into(),
                last_name: "U".into(),
                username: "u".into(),
                picture: "pic".into(),
                cover: None,
            },
            comments: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn merge_orders_across_batches() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let merged = merge(vec![
            vec![post_at("x2", t + Duration::minutes(5)), post_at("x1", t)],
            vec![post_at("y1", t + Duration::minutes(3))],
            vec![],
            vec![post_at("v1", t + Duration::minutes(9))],
        ]);
        let ids: Vec<_> = merged.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "x2", "y1", "x1"]);
    }

    #[test]
    fn day_bounds_cover_the_utc_day() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap();
        let (start, end) = utc_day_bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
    }

    fn setup() -> (crate::state::DbPool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        for name in ["viewer", "x", "y", "stranger"] {
            conn.execute(
                "INSERT INTO users (id, email, username, password_hash, first_name, last_name,
                                    picture, b_year, b_month, b_day, created_at, updated_at)
                 VALUES (?1, ?2, ?1, 'hash', ?1, ?1, 'pic', 1990, 1, 1, ?3, ?3)",
                params![name, format!("{name}@x.com"), Utc::now()],
            )
            .unwrap();
        }
        drop(conn);
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn home_feed_takes_ten_per_author_strictly_descending() {
        let (pool, _tmp) = setup();
        let graph = SqliteGraphRepository::new(pool.clone());
        graph.apply(RelationOp::Follow, "viewer", "x").await.unwrap();
        graph.apply(RelationOp::Follow, "viewer", "y").await.unwrap();

        let conn = pool.get().unwrap();
        let base = Utc::now() - Duration::days(2);
        let mut minute = 0;
        for author in ["x", "y", "viewer", "stranger"] {
            for i in 0..12 {
                let post = NewPost {
                    text: Some(format!("{author}-{i}")),
                    ..Default::default()
                };
                create_post(&conn, author, &post, base + Duration::minutes(minute)).unwrap();
                minute += 1;
            }
        }

        let feed = home_feed(&conn, "viewer").unwrap();
        assert_eq!(feed.len(), 30);
        for author in ["x", "y", "viewer"] {
            assert_eq!(feed.iter().filter(|p| p.user.id == author).count(), 10);
        }
        assert!(feed.iter().all(|p| p.user.id != "stranger"));
        assert!(feed.windows(2).all(|w| w[0].created_at > w[1].created_at));
    }

    #[test]
    fn public_feed_is_today_only_and_capped() {
        let (pool, _tmp) = setup();
        let conn = pool.get().unwrap();
        let now = Utc::now();
        let (start, _) = utc_day_bounds(now);

        create_post(
            &conn,
            "x",
            &NewPost {
                text: Some("yesterday".into()),
                ..Default::default()
            },
            start - Duration::seconds(1),
        )
        .unwrap();
        for i in 0..12 {
            create_post(
                &conn,
                "y",
                &NewPost {
                    text: Some(format!("today-{i}")),
                    ..Default::default()
                },
                start + Duration::milliseconds(i),
            )
            .unwrap();
        }

        let feed = public_feed(&conn, now).unwrap();
        assert_eq!(feed.len(), 10);
        assert!(feed.iter().all(|p| p.created_at >= start));
        assert_eq!(feed[0].text.as_deref(), Some("today-11"));
    }
}
