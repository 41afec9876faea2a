// Repository pattern - the only place relationship lists are written
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::Arc;
use thiserror::Error;

use crate::error::AppError;
use crate::graph::domain::*;
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Relation(#[from] RelationError),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

impl From<GraphError> for AppError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Relation(e) => e.into(),
            GraphError::UserNotFound(_) => AppError::NotFound("User not found".into()),
            GraphError::Pool(e) => AppError::Pool(e),
            GraphError::Sql(e) => AppError::Database(e),
        }
    }
}

/// Outcome of a relationship operation that passed its precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub op: RelationOp,
    pub changes: usize,
}

#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Load the relationship lists of one identity
    async fn load(&self, user_id: &str) -> Result<Option<Relations>, GraphError>;

    /// Check the transition table and apply the resulting changes to both
    /// identities atomically
    async fn apply(
        &self,
        op: RelationOp,
        actor_id: &str,
        target_id: &str,
    ) -> Result<Applied, GraphError>;
}

pub struct SqliteGraphRepository {
    pool: DbPool,
}

impl SqliteGraphRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Read one identity's lists, or `None` if the identity does not exist.
pub fn load_relations(conn: &Connection, user_id: &str) -> Result<Option<Relations>, GraphError> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }

    let mut relations = Relations::new(user_id);
    let mut stmt = conn.prepare(
        "SELECT list, member_id FROM user_relations WHERE user_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    for row in rows {
        let (list, member) = row?;
        let list: RelationList = list.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let change = Change {
            owner: relations.id.clone(),
            list,
            member,
            action: ChangeAction::Add,
        };
        relations.apply(&change);
    }

    Ok(Some(relations))
}

fn write_change(conn: &Connection, change: &Change) -> Result<(), rusqlite::Error> {
    match change.action {
        ChangeAction::Add => {
            conn.execute(
                "INSERT OR IGNORE INTO user_relations (user_id, list, member_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![change.owner, change.list.as_str(), change.member, Utc::now()],
            )?;
        }
        ChangeAction::Remove => {
            conn.execute(
                "DELETE FROM user_relations WHERE user_id = ?1 AND list = ?2 AND member_id = ?3",
                params![change.owner, change.list.as_str(), change.member],
            )?;
        }
    }
    Ok(())
}

#[async_trait]
impl GraphRepository for SqliteGraphRepository {
    async fn load(&self, user_id: &str) -> Result<Option<Relations>, GraphError> {
        let conn = self.pool.get()?;
        load_relations(&conn, user_id)
    }

    async fn apply(
        &self,
        op: RelationOp,
        actor_id: &str,
        target_id: &str,
    ) -> Result<Applied, GraphError> {
        if actor_id == target_id {
            return Err(RelationError::SelfReference.into());
        }

        let mut conn = self.pool.get()?;

        // Both identities change in one transaction; the lists are read under
        // the same write lock so the precondition cannot go stale.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let actor = load_relations(&tx, actor_id)?
            .ok_or_else(|| GraphError::UserNotFound(actor_id.to_string()))?;
        let target = load_relations(&tx, target_id)?
            .ok_or_else(|| GraphError::UserNotFound(target_id.to_string()))?;

        let changes = plan(op, &actor, &target)?;
        for change in &changes {
            write_change(&tx, change)?;
        }
        tx.commit()?;

        tracing::info!(
            op = %op,
            actor = %actor_id,
            target = %target_id,
            changes = changes.len(),
            "Relationship updated"
        );

        Ok(Applied {
            op,
            changes: changes.len(),
        })
    }
}

pub type DynGraphRepository = Arc<dyn GraphRepository>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    fn create_test_repo() -> (SqliteGraphRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = db::create_pool(&db_path).unwrap();
        db::run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        for name in ["alice", "bob", "carol"] {
            conn.execute(
                "INSERT INTO users (id, email, username, password_hash, first_name, last_name,
                                    picture, b_year, b_month, b_day, created_at, updated_at)
                 VALUES (?1, ?2, ?1, 'hash', ?1, ?1, 'pic', 1990, 1, 1, ?3, ?3)",
                params![name, format!("{name}@x.com"), Utc::now()],
            )
            .unwrap();
        }
        drop(conn);

        (SqliteGraphRepository::new(pool), temp_dir)
    }

    async fn lists(repo: &SqliteGraphRepository, id: &str) -> Relations {
        repo.load(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_send_request_persists_on_both_sides() {
        let (repo, _temp) = create_test_repo();

        let applied = repo
            .apply(RelationOp::SendRequest, "alice", "bob")
            .await
            .unwrap();
        assert_eq!(applied.changes, 3);

        let alice = lists(&repo, "alice").await;
        let bob = lists(&repo, "bob").await;
        assert!(request_pending(&alice, &bob));
        assert!(is_following(&alice, &bob));
        assert_eq!(bob.followers, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_request_leaves_state_unchanged() {
        let (repo, _temp) = create_test_repo();
        repo.apply(RelationOp::SendRequest, "alice", "bob")
            .await
            .unwrap();
        let before = (lists(&repo, "alice").await, lists(&repo, "bob").await);

        let result = repo.apply(RelationOp::SendRequest, "alice", "bob").await;
        assert!(matches!(
            result,
            Err(GraphError::Relation(RelationError::AlreadyRequested))
        ));

        let after = (lists(&repo, "alice").await, lists(&repo, "bob").await);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_accept_then_unfriend() {
        let (repo, _temp) = create_test_repo();
        repo.apply(RelationOp::SendRequest, "alice", "bob")
            .await
            .unwrap();
        repo.apply(RelationOp::AcceptRequest, "bob", "alice")
            .await
            .unwrap();

        let alice = lists(&repo, "alice").await;
        let bob = lists(&repo, "bob").await;
        assert!(are_friends(&alice, &bob));
        assert!(is_following(&alice, &bob) && is_following(&bob, &alice));
        assert!(bob.requests.is_empty());

        repo.apply(RelationOp::Unfriend, "bob", "alice")
            .await
            .unwrap();
        assert_eq!(lists(&repo, "alice").await, Relations::new("alice"));
        assert_eq!(lists(&repo, "bob").await, Relations::new("bob"));
    }

    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let (repo, _temp) = create_test_repo();
        let result = repo.apply(RelationOp::Follow, "alice", "nobody").await;
        assert!(matches!(result, Err(GraphError::UserNotFound(id)) if id == "nobody"));
    }

    #[tokio::test]
    async fn test_self_reference_is_rejected_before_any_read() {
        let (repo, _temp) = create_test_repo();
        let result = repo.apply(RelationOp::Follow, "ghost", "ghost").await;
        assert!(matches!(
            result,
            Err(GraphError::Relation(RelationError::SelfReference))
        ));
    }

    #[tokio::test]
    async fn test_list_order_is_insertion_order() {
        let (repo, _temp) = create_test_repo();
        repo.apply(RelationOp::Follow, "alice", "carol")
            .await
            .unwrap();
        repo.apply(RelationOp::Follow, "alice", "bob").await.unwrap();

        let alice = lists(&repo, "alice").await;
        assert_eq!(alice.following, vec!["carol".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn test_load_missing_user_returns_none() {
        let (repo, _temp) = create_test_repo();
        assert!(repo.load("nobody").await.unwrap().is_none());
    }
}
