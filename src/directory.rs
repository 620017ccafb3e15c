//! Identity and target resolution.
//!
//! Users, posts, comments and communities belong to other parts of the
//! forum. The report service only needs to know that they exist and which
//! community they sit in, so it sees them through the two narrow traits
//! below. [`SqliteDirectory`] implements both over the forum tables.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;

use crate::database::Database;
use crate::error::{Result, TribunalError};
use crate::models::{Target, UserRecord};

/// Confirmation that a target exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetHandle {
    pub target: Target,
    /// Owning community; `None` for user targets.
    pub community_id: Option<i64>,
}

/// Maps usernames to forum users.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Fails with `UserNotFound` for unknown usernames.
    async fn resolve(&self, username: &str) -> Result<UserRecord>;
}

/// Confirms reported entities exist.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    /// Fails with `TargetNotFound` when the entity does not exist.
    async fn resolve(&self, target: Target) -> Result<TargetHandle>;

    /// Id of the user behind a `USER` target given by name.
    async fn resolve_username(&self, username: &str) -> Result<i64>;
}

/// Directory backed by the forum tables in the shared database.
pub struct SqliteDirectory {
    db: Arc<Database>,
}

impl SqliteDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT id, username FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to look up user: {}", e)))?;

        Ok(row.map(|row| UserRecord {
            id: row.get("id"),
            username: row.get("username"),
        }))
    }

    /// Community of the target, or `None` if the target does not exist.
    async fn find_community(&self, target: Target) -> Result<Option<Option<i64>>> {
        let sql = match target {
            Target::Post(_) => "SELECT community_id FROM posts WHERE id = ?",
            Target::Comment(_) => {
                "SELECT p.community_id FROM comments c
                 JOIN posts p ON p.id = c.post_id
                 WHERE c.id = ?"
            }
            Target::Community(_) => "SELECT id AS community_id FROM communities WHERE id = ?",
            Target::User(_) => "SELECT NULL AS community_id FROM users WHERE id = ?",
        };

        let row = sqlx::query(sql)
            .bind(target.id())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to resolve {}: {}", target, e)))?;

        Ok(row.map(|row| row.get::<Option<i64>, _>("community_id")))
    }
}

#[async_trait]
impl IdentityResolver for SqliteDirectory {
    async fn resolve(&self, username: &str) -> Result<UserRecord> {
        self.find_user(username)
            .await?
            .ok_or_else(|| TribunalError::UserNotFound(username.to_string()))
    }
}

#[async_trait]
impl TargetResolver for SqliteDirectory {
    async fn resolve(&self, target: Target) -> Result<TargetHandle> {
        match self.find_community(target).await? {
            Some(community_id) => Ok(TargetHandle {
                target,
                community_id,
            }),
            None => Err(TribunalError::TargetNotFound {
                kind: target.kind(),
                reference: target.id().to_string(),
            }),
        }
    }

    async fn resolve_username(&self, username: &str) -> Result<i64> {
        self.find_user(username)
            .await?
            .map(|user| user.id)
            .ok_or_else(|| TribunalError::UserNotFound(username.to_string()))
    }
}
