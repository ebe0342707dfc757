//! PostgreSQL role-permission store.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::store::{AUTHENTICATED_ROLE, PermissionLookup, PermissionUpsert, RolePermissionStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        code TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        created TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        permission TEXT NOT NULL,
        PRIMARY KEY (role_id, permission)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL,
        active BOOLEAN NOT NULL DEFAULT true
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id UUID NOT NULL,
        role_id UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
];

/// Role-permission store in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgRolePermissionStore {
    pool: PgPool,
}

impl PgRolePermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables this store uses if they do not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("failed to create role-permission schema")?;
        }
        Ok(())
    }

    /// Find a role by name, creating it on first use.
    async fn ensure_role(&self, name: &str) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO roles (id, name) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to ensure role '{name}'"))?;

        Ok(id)
    }

    /// Assign a role to a user.
    pub async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<()> {
        let role_id = self.ensure_role(role).await?;
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&self.pool)
        .await
        .context("failed to assign role to user")?;

        Ok(())
    }
}

#[async_trait]
impl RolePermissionStore for PgRolePermissionStore {
    async fn register_permission(
        &self,
        code: &str,
        name: &str,
        description: &str,
    ) -> Result<PermissionUpsert> {
        // No row comes back when the existing row is identical; xmax = 0
        // marks a freshly inserted row.
        let inserted = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO permissions (code, name, description) VALUES ($1, $2, $3)
            ON CONFLICT (code) DO UPDATE
                SET name = EXCLUDED.name, description = EXCLUDED.description
                WHERE permissions.name IS DISTINCT FROM EXCLUDED.name
                   OR permissions.description IS DISTINCT FROM EXCLUDED.description
            RETURNING (xmax = 0)
            "#,
        )
        .bind(code)
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to register permission '{code}'"))?;

        Ok(match inserted {
            Some(true) => PermissionUpsert::Created,
            Some(false) => PermissionUpsert::Updated,
            None => PermissionUpsert::Unchanged,
        })
    }

    async fn grant_permission_to_role(&self, role: &str, code: &str) -> Result<bool> {
        let role_id = self.ensure_role(role).await?;
        let result = sqlx::query(
            "INSERT INTO role_permissions (role_id, permission) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(code)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to grant '{code}' to role '{role}'"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn batch_grant_permissions_to_roles(
        &self,
        grants: &BTreeMap<String, Vec<String>>,
    ) -> Result<Option<usize>> {
        let mut role_ids = Vec::new();
        let mut codes = Vec::new();
        for (role, role_codes) in grants {
            let role_id = self.ensure_role(role).await?;
            for code in role_codes {
                role_ids.push(role_id);
                codes.push(code.clone());
            }
        }

        if codes.is_empty() {
            return Ok(Some(0));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission)
            SELECT * FROM UNNEST($1::uuid[], $2::text[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_ids)
        .bind(codes)
        .execute(&self.pool)
        .await
        .context("failed to batch grant role permissions")?;

        Ok(Some(result.rows_affected() as usize))
    }
}

#[async_trait]
impl PermissionLookup for PgRolePermissionStore {
    async fn permissions_for(&self, user_id: Uuid) -> Result<HashSet<String>> {
        let permissions = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT rp.permission
            FROM role_permissions rp
            JOIN roles r ON r.id = rp.role_id
            WHERE r.name = $2
               OR rp.role_id IN (SELECT role_id FROM user_roles WHERE user_id = $1)
            "#,
        )
        .bind(user_id)
        .bind(AUTHENTICATED_ROLE)
        .fetch_all(&self.pool)
        .await
        .context("failed to get user permissions")?;

        Ok(permissions.into_iter().collect())
    }
}
