//! Credential store: one record per identifier holding the password hash and
//! role. Implementations must reject a second insert for an existing
//! identifier with [`StoreError::Duplicate`] atomically, so concurrent
//! registrations cannot both succeed.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::Role;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tokio::sync::RwLock;

const USERS_MIGRATION: &str = include_str!("../migrations/0001_users.sql");

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone)]
pub struct User {
    pub identifier: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("identifier already registered")]
    Duplicate,
    #[error("stored role '{0}' is not recognised")]
    CorruptRole(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError>;

    async fn insert(&self, user: User) -> Result<User, StoreError>;
}

#[derive(FromRow)]
struct UserRow {
    identifier: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|_| StoreError::CorruptRole(row.role.clone()))?;
        Ok(User {
            identifier: row.identifier,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the bundled schema. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in USERS_MIGRATION.split(';') {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                continue;
            }
            sqlx::query(trimmed).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT identifier, password_hash, role, created_at FROM users WHERE identifier = $1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (identifier, password_hash, role, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING identifier, password_hash, role, created_at",
        )
        .bind(&user.identifier)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Duplicate
            } else {
                StoreError::Database(err)
            }
        })?;

        User::try_from(row)
    }
}

/// Process-local store. Used when no database is configured and as the fake
/// in tests.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes an account, standing in for out-of-band administrative removal.
    pub async fn remove(&self, identifier: &str) -> Option<User> {
        self.users.write().await.remove(identifier)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(identifier).cloned())
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        match users.entry(user.identifier.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate),
            Entry::Vacant(slot) => Ok(slot.insert(user).clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(identifier: &str, role: Role) -> User {
        User {
            identifier: identifier.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            role,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_find() {
        let store = InMemoryCredentialStore::new();
        store.insert(user("alice", Role::User)).await.expect("insert");

        let found = store
            .find_by_identifier("alice")
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(found.role, Role::User);
        assert!(store.find_by_identifier("bob").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn second_insert_is_duplicate() {
        let store = InMemoryCredentialStore::new();
        store.insert(user("alice", Role::User)).await.expect("insert");
        let err = store
            .insert(user("alice", Role::Admin))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::Duplicate));

        let kept = store.find_by_identifier("alice").await.unwrap().unwrap();
        assert_eq!(kept.role, Role::User);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn remove_deletes_account() {
        let store = InMemoryCredentialStore::new();
        store.insert(user("alice", Role::User)).await.expect("insert");
        assert!(store.remove("alice").await.is_some());
        assert!(store.is_empty().await);
    }

    #[test]
    fn corrupt_role_is_reported() {
        let row = UserRow {
            identifier: "alice".into(),
            password_hash: "x".into(),
            role: "root".into(),
            created_at: Utc::now(),
        };
        assert!(matches!(User::try_from(row), Err(StoreError::CorruptRole(_))));
    }
}
