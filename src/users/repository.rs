use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{Details, ResetCode, SearchEntry, User, UserSummary};
use crate::error::{AppError, AppResult};
use crate::graph::RelationList;

const USER_COLUMNS: &str = "id, email, username, password_hash, federation_id, first_name, last_name,
     picture, cover, b_year, b_month, b_day, gender, verified, details, created_at, updated_at";

pub(crate) const SUMMARY_COLUMNS: &str =
    "u.id, u.first_name, u.last_name, u.username, u.picture, u.cover";

/// Fields required to create an identity.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub federation_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub picture: String,
    pub b_year: i32,
    pub b_month: u32,
    pub b_day: u32,
    pub gender: Option<String>,
    pub verified: bool,
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let details: String = row.get(14)?;
    let details: Details = serde_json::from_str(&details).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(14, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        federation_id: row.get(4)?,
        first_name: row.get(5)?,
        last_name: row.get(6)?,
        picture: row.get(7)?,
        cover: row.get(8)?,
        b_year: row.get(9)?,
        b_month: row.get(10)?,
        b_day: row.get(11)?,
        gender: row.get(12)?,
        verified: row.get(13)?,
        details,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// Map a row starting at `offset` holding [`SUMMARY_COLUMNS`].
pub(crate) fn row_to_summary(row: &Row, offset: usize) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: row.get(offset)?,
        first_name: row.get(offset + 1)?,
        last_name: row.get(offset + 2)?,
        username: row.get(offset + 3)?,
        picture: row.get(offset + 4)?,
        cover: row.get(offset + 5)?,
    })
}

fn find_one(conn: &Connection, filter: &str, value: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}");
    Ok(conn
        .query_row(&sql, params![value], row_to_user)
        .optional()?)
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    find_one(conn, "id = ?1", id)
}

pub fn find_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
    find_one(conn, "email = ?1 COLLATE NOCASE", email)
}

pub fn find_by_username(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    find_one(conn, "username = ?1", username)
}

/// Bearer tokens name either the internal id or a federation subject.
pub fn find_by_id_or_federation(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    find_one(
        conn,
        "id = ?1 OR federation_id = ?1 ORDER BY (id = ?1) DESC LIMIT 1",
        id,
    )
}

pub fn create_user(conn: &Connection, new: &NewUser, now: DateTime<Utc>) -> AppResult<User> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, email, username, password_hash, federation_id, first_name,
                            last_name, picture, b_year, b_month, b_day, gender, verified,
                            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
        params![
            id,
            new.email,
            new.username,
            new.password_hash,
            new.federation_id,
            new.first_name,
            new.last_name,
            new.picture,
            new.b_year,
            new.b_month,
            new.b_day,
            new.gender,
            new.verified,
            now,
        ],
    )?;

    tracing::info!(user_id = %id, username = %new.username, "User created");

    find_by_id(conn, &id)?.ok_or_else(|| AppError::Internal("Inserted user vanished".into()))
}

pub fn username_taken(conn: &Connection, username: &str) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )?)
}

/// `base` if free, otherwise `base` plus a random numeric suffix.
pub fn unique_username(conn: &Connection, base: &str) -> AppResult<String> {
    if !username_taken(conn, base)? {
        return Ok(base.to_string());
    }

    let mut rng = rand::thread_rng();
    loop {
        let candidate = format!("{base}{}", rng.gen_range(0..1_000_000_000u32));
        if !username_taken(conn, &candidate)? {
            return Ok(candidate);
        }
    }
}

pub const EMAIL_TAKEN: &str =
    "This email address already exists. Please try again with a different email address.";

/// Column named by a UNIQUE violation, e.g. `users.email`.
fn unique_violation(err: &AppError) -> Option<&str> {
    match err {
        AppError::Database(rusqlite::Error::SqliteFailure(e, Some(msg)))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            msg.strip_prefix("UNIQUE constraint failed: ")
        }
        _ => None,
    }
}

fn unique_to_conflict(err: AppError) -> AppError {
    let column = unique_violation(&err).map(str::to_owned);
    match column.as_deref() {
        Some("users.email") => AppError::Conflict(EMAIL_TAKEN.into()),
        Some("users.username") => {
            AppError::Conflict("This username is already taken. Please try again.".into())
        }
        Some(_) => AppError::Conflict("This account already exists.".into()),
        None => err,
    }
}

/// Create an identity for a signup. A username claimed between
/// [`unique_username`] and the insert is re-rolled once; other unique
/// collisions become a `Conflict` naming what was taken.
pub fn register_user(conn: &Connection, mut new: NewUser, now: DateTime<Utc>) -> AppResult<User> {
    match create_user(conn, &new, now) {
        Err(e) if unique_violation(&e) == Some("users.username") => {
            new.username = unique_username(conn, &new.username)?;
            create_user(conn, &new, now).map_err(unique_to_conflict)
        }
        other => other.map_err(unique_to_conflict),
    }
}

/// Fields a password registration fills in on a federation-only account.
#[derive(Debug, Clone)]
pub struct PasswordProfile {
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub b_year: i32,
    pub b_month: u32,
    pub b_day: u32,
    pub gender: Option<String>,
}

pub fn add_password(
    conn: &Connection,
    user_id: &str,
    profile: &PasswordProfile,
    now: DateTime<Utc>,
) -> AppResult<User> {
    conn.execute(
        "UPDATE users SET
            password_hash = ?2,
            first_name = CASE WHEN first_name = '' THEN ?3 ELSE first_name END,
            last_name = CASE WHEN last_name = '' THEN ?4 ELSE last_name END,
            b_year = ?5, b_month = ?6, b_day = ?7, gender = ?8,
            updated_at = ?9
         WHERE id = ?1",
        params![
            user_id,
            profile.password_hash,
            profile.first_name,
            profile.last_name,
            profile.b_year,
            profile.b_month,
            profile.b_day,
            profile.gender,
            now,
        ],
    )?;

    find_by_id(conn, user_id)?.ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub fn link_federation(conn: &Connection, user_id: &str, subject: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE users SET federation_id = ?2, updated_at = ?3
         WHERE id = ?1 AND federation_id IS NULL",
        params![user_id, subject, Utc::now()],
    )?;
    Ok(())
}

pub fn set_verified(conn: &Connection, user_id: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE users SET verified = 1, updated_at = ?2 WHERE id = ?1",
        params![user_id, Utc::now()],
    )?;
    Ok(())
}

/// Returns false when no account has that email.
pub fn set_password_by_email(conn: &Connection, email: &str, password_hash: &str) -> AppResult<bool> {
    let updated = conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE email = ?1 COLLATE NOCASE",
        params![email, password_hash, Utc::now()],
    )?;
    Ok(updated > 0)
}

pub fn update_picture(conn: &Connection, user_id: &str, url: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE users SET picture = ?2, updated_at = ?3 WHERE id = ?1",
        params![user_id, url, Utc::now()],
    )?;
    Ok(())
}

pub fn update_cover(conn: &Connection, user_id: &str, url: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE users SET cover = ?2, updated_at = ?3 WHERE id = ?1",
        params![user_id, url, Utc::now()],
    )?;
    Ok(())
}

pub fn update_details(conn: &Connection, user_id: &str, details: &Details) -> AppResult<Details> {
    let json = serde_json::to_string(details)?;
    let updated = conn.execute(
        "UPDATE users SET details = ?2, updated_at = ?3 WHERE id = ?1",
        params![user_id, json, Utc::now()],
    )?;
    if updated == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }
    Ok(details.clone())
}

fn collect_summaries(conn: &Connection, sql: &str, value: &str) -> AppResult<Vec<UserSummary>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![value], |row| row_to_summary(row, 0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Members of one relationship list, in list order.
pub fn list_members(conn: &Connection, user_id: &str, list: RelationList) -> AppResult<Vec<UserSummary>> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM user_relations r
         JOIN users u ON u.id = r.member_id
         WHERE r.user_id = ?1 AND r.list = '{}'
         ORDER BY r.id ASC",
        list.as_str()
    );
    collect_summaries(conn, &sql, user_id)
}

/// Identities holding a pending request from `user_id`.
pub fn sent_requests(conn: &Connection, user_id: &str) -> AppResult<Vec<UserSummary>> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM user_relations r
         JOIN users u ON u.id = r.user_id
         WHERE r.member_id = ?1 AND r.list = 'requests'
         ORDER BY r.id ASC"
    );
    collect_summaries(conn, &sql, user_id)
}

/// Case-insensitive substring match on first name, last name and username.
pub fn search_users(conn: &Connection, term: &str) -> AppResult<Vec<UserSummary>> {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    if escaped.is_empty() {
        return Ok(Vec::new());
    }
    let pattern = format!("%{escaped}%");

    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM users u
         WHERE u.first_name LIKE ?1 ESCAPE '\\'
            OR u.last_name LIKE ?1 ESCAPE '\\'
            OR u.username LIKE ?1 ESCAPE '\\'
         ORDER BY u.first_name, u.last_name
         LIMIT 50"
    );
    collect_summaries(conn, &sql, &pattern)
}

/// One entry per searched identity; repeating a search refreshes its time.
pub fn add_search(conn: &Connection, user_id: &str, searched_id: &str, now: DateTime<Utc>) -> AppResult<()> {
    if find_by_id(conn, searched_id)?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }

    conn.execute(
        "INSERT INTO search_history (user_id, searched_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id, searched_id) DO UPDATE SET created_at = excluded.created_at",
        params![user_id, searched_id, now],
    )?;
    Ok(())
}

pub fn search_history(conn: &Connection, user_id: &str) -> AppResult<Vec<SearchEntry>> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS}, s.created_at FROM search_history s
         JOIN users u ON u.id = s.searched_id
         WHERE s.user_id = ?1
         ORDER BY s.created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(SearchEntry {
            user: row_to_summary(row, 0)?,
            created_at: row.get(6)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Returns false when the identity was not in the history.
pub fn remove_search(conn: &Connection, user_id: &str, searched_id: &str) -> AppResult<bool> {
    let removed = conn.execute(
        "DELETE FROM search_history WHERE user_id = ?1 AND searched_id = ?2",
        params![user_id, searched_id],
    )?;
    Ok(removed > 0)
}

pub fn generate_code(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Replace any live code for the user with a fresh one.
pub fn replace_reset_code(
    conn: &Connection,
    user_id: &str,
    code: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> AppResult<ResetCode> {
    let reset = ResetCode {
        id: uuid::Uuid::now_v7().to_string(),
        user_id: user_id.to_string(),
        code: code.to_string(),
        created_at: now,
        expires_at: now + ttl,
    };

    conn.execute("DELETE FROM reset_codes WHERE user_id = ?1", params![user_id])?;
    conn.execute(
        "INSERT INTO reset_codes (id, user_id, code, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            reset.id,
            reset.user_id,
            reset.code,
            reset.created_at,
            reset.expires_at
        ],
    )?;
    Ok(reset)
}

pub fn find_reset_code(conn: &Connection, user_id: &str) -> AppResult<Option<ResetCode>> {
    Ok(conn
        .query_row(
            "SELECT id, user_id, code, created_at, expires_at FROM reset_codes WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(ResetCode {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    code: row.get(2)?,
                    created_at: row.get(3)?,
                    expires_at: row.get(4)?,
                })
            },
        )
        .optional()?)
}

pub fn delete_reset_code(conn: &Connection, user_id: &str) -> AppResult<()> {
    conn.execute("DELETE FROM reset_codes WHERE user_id = ?1", params![user_id])?;
    Ok(())
}
