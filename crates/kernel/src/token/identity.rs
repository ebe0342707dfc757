//! Identity lookup used by full token validation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

/// A user as seen by token validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub active: bool,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Looks users up by id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>>;
}

/// In-memory user directory.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: DashMap<Uuid, UserRecord>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: UserRecord) {
        self.users.insert(user.id, user);
    }

    /// Mark a user active or inactive. Returns false if unknown.
    pub fn set_active(&self, id: Uuid, active: bool) -> bool {
        match self.users.get_mut(&id) {
            Some(mut user) => {
                user.active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }
}

/// User directory over the `users` table.
#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, (Uuid, String, bool)>(
            "SELECT id, email, active FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to look up user")?;

        Ok(row.map(|(id, email, active)| UserRecord { id, email, active }))
    }
}
