// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! SQLite storage for the social graph: users, profiles, posts, member tiers
//! and the subscription relation between users.

use std::path::Path;

use anyhow::Context as _;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    models::{
        ChangePostInput, ChangeProfileInput, ChangeUserInput, CreatePostInput, CreateProfileInput,
        CreateUserInput, EntityId, MemberType, MemberTypeId, OperationRecord, Post, Profile, User,
    },
    stats::OperationLog,
};

/// Schema for the social graph tables.
const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS member_types (
    id TEXT PRIMARY KEY NOT NULL,
    discount REAL NOT NULL,
    posts_limit_per_month INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    balance REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY NOT NULL,
    is_male INTEGER NOT NULL,
    year_of_birth INTEGER NOT NULL,
    user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    member_type_id TEXT NOT NULL REFERENCES member_types(id)
);

CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS subscriptions (
    subscriber_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (subscriber_id, author_id)
);

CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts(author_id);
CREATE INDEX IF NOT EXISTS idx_subscriptions_author_id ON subscriptions(author_id);
"#;

/// Member tiers are reference data, seeded once and only read through the API.
const SEED_MEMBER_TYPES: &str = "
INSERT OR IGNORE INTO member_types (id, discount, posts_limit_per_month)
VALUES ('BASIC', 0.0, 20), ('BUSINESS', 7.5, 100);
";

const SELECT_PROFILE: &str = "SELECT p.id, p.is_male, p.year_of_birth, p.user_id, \
     m.id, m.discount, m.posts_limit_per_month \
     FROM profiles p JOIN member_types m ON m.id = p.member_type_id";

type PostRow = (String, String, String, String);
type ProfileRow = (String, bool, i32, String, String, f64, i32);
type MemberTypeRow = (String, f64, i32);

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("row not found")]
    NotFound,
    #[error(transparent)]
    Sqlite(#[from] sqlx::Error),
    #[error("malformed identifier in storage: {0}")]
    MalformedId(#[from] uuid::Error),
    #[error("unknown member type id `{0}`")]
    UnknownMemberType(String),
}

/// SQLite database holding the social graph, instrumented with an append-only
/// operation log around every public call.
pub struct Database {
    pool: SqlitePool,
    operations: OperationLog,
}

impl Database {
    /// Opens (or creates) the database at the given path and bootstraps the
    /// schema and seed rows.
    pub async fn open(database_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = database_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        info!("Connecting to SQLite database at {}", database_path.display());

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Self::bootstrap(pool).await
    }

    /// Opens a fresh in-memory database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        use std::str::FromStr as _;

        // A single connection: every pooled connection would otherwise get
        // its own private in-memory database.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::bootstrap(pool).await
    }

    async fn bootstrap(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::query(CREATE_TABLES)
            .execute(&pool)
            .await
            .context("Failed to create tables")?;
        sqlx::query(SEED_MEMBER_TYPES)
            .execute(&pool)
            .await
            .context("Failed to seed member types")?;
        info!("Database schema initialized");

        Ok(Self {
            pool,
            operations: OperationLog::new(),
        })
    }

    /// The operation log fed by this database.
    pub fn operations(&self) -> &OperationLog {
        &self.operations
    }

    async fn record(&self, model: &str, operation: &str, args: serde_json::Value) {
        self.operations
            .append(OperationRecord {
                model: model.to_string(),
                operation: operation.to_string(),
                args: args.to_string(),
            })
            .await;
    }

    /// Looks up a member tier; absence is not an error.
    pub async fn member_type(&self, id: MemberTypeId) -> Result<Option<MemberType>, DatabaseError> {
        self.record("MemberType", "findUnique", json!({ "id": id }))
            .await;
        let row: Option<MemberTypeRow> = sqlx::query_as(
            "SELECT id, discount, posts_limit_per_month FROM member_types WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(member_type_from_row).transpose()
    }

    /// Lists all member tiers.
    pub async fn member_types(&self) -> Result<Vec<MemberType>, DatabaseError> {
        self.record("MemberType", "findMany", json!({})).await;
        let rows: Vec<MemberTypeRow> = sqlx::query_as(
            "SELECT id, discount, posts_limit_per_month FROM member_types ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(member_type_from_row).collect()
    }

    /// Looks up a user, eagerly loading posts, profile (with member tier) and
    /// both subscription directions.
    pub async fn user(&self, id: EntityId) -> Result<Option<User>, DatabaseError> {
        self.record("User", "findUnique", json!({ "id": id })).await;
        self.fetch_user(id).await
    }

    /// Lists users, restricted to `filter` when present.
    ///
    /// The id filter is how relationship fields materialize subscription
    /// edges into full users; it is not part of the public API surface.
    pub async fn users(&self, filter: Option<&[EntityId]>) -> Result<Vec<User>, DatabaseError> {
        self.record("User", "findMany", json!({ "ids": filter }))
            .await;
        let rows: Vec<(String, String, f64)> = match filter {
            None => {
                sqlx::query_as("SELECT id, name, balance FROM users ORDER BY rowid")
                    .fetch_all(&self.pool)
                    .await?
            }
            Some([]) => Vec::new(),
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT id, name, balance FROM users WHERE id IN ({placeholders}) ORDER BY rowid"
                );
                let mut query = sqlx::query_as(&sql);
                for id in ids {
                    query = query.bind(id.to_string());
                }
                query.fetch_all(&self.pool).await?
            }
        };

        let mut users = Vec::with_capacity(rows.len());
        for (id, name, balance) in rows {
            users.push(self.hydrate_user(id.parse()?, name, balance).await?);
        }
        Ok(users)
    }

    /// Inserts a new user; the identifier is server-generated.
    pub async fn create_user(&self, dto: CreateUserInput) -> Result<User, DatabaseError> {
        self.record("User", "create", json!({ "dto": &dto })).await;
        let id = EntityId::generate();
        sqlx::query("INSERT INTO users (id, name, balance) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(&dto.name)
            .bind(dto.balance)
            .execute(&self.pool)
            .await?;
        debug!("Created user {id}");
        self.fetch_user(id).await?.ok_or(DatabaseError::NotFound)
    }

    /// Applies a partial update; only the supplied fields change.
    pub async fn update_user(
        &self,
        id: EntityId,
        dto: ChangeUserInput,
    ) -> Result<User, DatabaseError> {
        self.record("User", "update", json!({ "id": id, "dto": &dto }))
            .await;
        let result = sqlx::query(
            "UPDATE users SET name = COALESCE(?, name), balance = COALESCE(?, balance) \
             WHERE id = ?",
        )
        .bind(&dto.name)
        .bind(dto.balance)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        self.fetch_user(id).await?.ok_or(DatabaseError::NotFound)
    }

    /// Deletes a user; cascades to its posts, profile and subscription edges.
    pub async fn delete_user(&self, id: EntityId) -> Result<(), DatabaseError> {
        self.record("User", "delete", json!({ "id": id })).await;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        debug!("Deleted user {id}");
        Ok(())
    }

    /// Looks up a post; absence is not an error.
    pub async fn post(&self, id: EntityId) -> Result<Option<Post>, DatabaseError> {
        self.record("Post", "findUnique", json!({ "id": id })).await;
        self.fetch_post(id).await
    }

    /// Lists all posts.
    pub async fn posts(&self) -> Result<Vec<Post>, DatabaseError> {
        self.record("Post", "findMany", json!({})).await;
        let rows: Vec<PostRow> =
            sqlx::query_as("SELECT id, title, content, author_id FROM posts ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(post_from_row).collect()
    }

    /// Inserts a new post for an existing author.
    pub async fn create_post(&self, dto: CreatePostInput) -> Result<Post, DatabaseError> {
        self.record("Post", "create", json!({ "dto": &dto })).await;
        let id = EntityId::generate();
        sqlx::query("INSERT INTO posts (id, title, content, author_id) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(&dto.title)
            .bind(&dto.content)
            .bind(dto.author_id.to_string())
            .execute(&self.pool)
            .await?;
        debug!("Created post {id}");
        self.fetch_post(id).await?.ok_or(DatabaseError::NotFound)
    }

    /// Applies a partial update; only the supplied fields change.
    pub async fn update_post(
        &self,
        id: EntityId,
        dto: ChangePostInput,
    ) -> Result<Post, DatabaseError> {
        self.record("Post", "update", json!({ "id": id, "dto": &dto }))
            .await;
        let result = sqlx::query(
            "UPDATE posts SET title = COALESCE(?, title), content = COALESCE(?, content) \
             WHERE id = ?",
        )
        .bind(&dto.title)
        .bind(&dto.content)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        self.fetch_post(id).await?.ok_or(DatabaseError::NotFound)
    }

    /// Deletes a post.
    pub async fn delete_post(&self, id: EntityId) -> Result<(), DatabaseError> {
        self.record("Post", "delete", json!({ "id": id })).await;
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        debug!("Deleted post {id}");
        Ok(())
    }

    /// Looks up a profile; absence is not an error.
    pub async fn profile(&self, id: EntityId) -> Result<Option<Profile>, DatabaseError> {
        self.record("Profile", "findUnique", json!({ "id": id }))
            .await;
        self.fetch_profile(id).await
    }

    /// Lists all profiles.
    pub async fn profiles(&self) -> Result<Vec<Profile>, DatabaseError> {
        self.record("Profile", "findMany", json!({})).await;
        let sql = format!("{SELECT_PROFILE} ORDER BY p.rowid");
        let rows: Vec<ProfileRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(profile_from_row).collect()
    }

    /// Inserts a profile for an existing user. At most one profile per user.
    pub async fn create_profile(&self, dto: CreateProfileInput) -> Result<Profile, DatabaseError> {
        self.record("Profile", "create", json!({ "dto": &dto }))
            .await;
        let id = EntityId::generate();
        sqlx::query(
            "INSERT INTO profiles (id, is_male, year_of_birth, user_id, member_type_id) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(dto.is_male)
        .bind(dto.year_of_birth)
        .bind(dto.user_id.to_string())
        .bind(dto.member_type_id.as_str())
        .execute(&self.pool)
        .await?;
        debug!("Created profile {id}");
        self.fetch_profile(id).await?.ok_or(DatabaseError::NotFound)
    }

    /// Applies a partial update; only the supplied fields change.
    pub async fn update_profile(
        &self,
        id: EntityId,
        dto: ChangeProfileInput,
    ) -> Result<Profile, DatabaseError> {
        self.record("Profile", "update", json!({ "id": id, "dto": &dto }))
            .await;
        let result = sqlx::query(
            "UPDATE profiles SET is_male = COALESCE(?, is_male), \
             year_of_birth = COALESCE(?, year_of_birth), \
             member_type_id = COALESCE(?, member_type_id) \
             WHERE id = ?",
        )
        .bind(dto.is_male)
        .bind(dto.year_of_birth)
        .bind(dto.member_type_id.map(MemberTypeId::as_str))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        self.fetch_profile(id).await?.ok_or(DatabaseError::NotFound)
    }

    /// Deletes a profile.
    pub async fn delete_profile(&self, id: EntityId) -> Result<(), DatabaseError> {
        self.record("Profile", "delete", json!({ "id": id })).await;
        let result = sqlx::query("DELETE FROM profiles WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        debug!("Deleted profile {id}");
        Ok(())
    }

    /// Creates a subscription edge; a duplicate pair violates the composite
    /// key and fails.
    pub async fn subscribe(
        &self,
        subscriber_id: EntityId,
        author_id: EntityId,
    ) -> Result<(), DatabaseError> {
        self.record(
            "SubscribersOnAuthors",
            "create",
            json!({ "subscriberId": subscriber_id, "authorId": author_id }),
        )
        .await;
        sqlx::query("INSERT INTO subscriptions (subscriber_id, author_id) VALUES (?, ?)")
            .bind(subscriber_id.to_string())
            .bind(author_id.to_string())
            .execute(&self.pool)
            .await?;
        debug!("User {subscriber_id} subscribed to {author_id}");
        Ok(())
    }

    /// Removes a subscription edge.
    pub async fn unsubscribe(
        &self,
        subscriber_id: EntityId,
        author_id: EntityId,
    ) -> Result<(), DatabaseError> {
        self.record(
            "SubscribersOnAuthors",
            "delete",
            json!({ "subscriberId": subscriber_id, "authorId": author_id }),
        )
        .await;
        let result =
            sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = ? AND author_id = ?")
                .bind(subscriber_id.to_string())
                .bind(author_id.to_string())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        debug!("User {subscriber_id} unsubscribed from {author_id}");
        Ok(())
    }

    async fn fetch_user(&self, id: EntityId) -> Result<Option<User>, DatabaseError> {
        let row: Option<(String, String, f64)> =
            sqlx::query_as("SELECT id, name, balance FROM users WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        match row {
            None => Ok(None),
            Some((_, name, balance)) => Ok(Some(self.hydrate_user(id, name, balance).await?)),
        }
    }

    async fn hydrate_user(
        &self,
        id: EntityId,
        name: String,
        balance: f64,
    ) -> Result<User, DatabaseError> {
        let posts = self.fetch_posts_by_author(id).await?;
        let profile = self.fetch_profile_by_user(id).await?;
        let subscribed_to = self
            .fetch_edges(
                "SELECT author_id FROM subscriptions WHERE subscriber_id = ? ORDER BY rowid",
                id,
            )
            .await?;
        let subscribers = self
            .fetch_edges(
                "SELECT subscriber_id FROM subscriptions WHERE author_id = ? ORDER BY rowid",
                id,
            )
            .await?;
        Ok(User {
            id,
            name,
            balance,
            profile,
            posts,
            subscribed_to,
            subscribers,
        })
    }

    async fn fetch_posts_by_author(&self, author_id: EntityId) -> Result<Vec<Post>, DatabaseError> {
        let rows: Vec<PostRow> = sqlx::query_as(
            "SELECT id, title, content, author_id FROM posts WHERE author_id = ? ORDER BY rowid",
        )
        .bind(author_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(post_from_row).collect()
    }

    async fn fetch_post(&self, id: EntityId) -> Result<Option<Post>, DatabaseError> {
        let row: Option<PostRow> =
            sqlx::query_as("SELECT id, title, content, author_id FROM posts WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(post_from_row).transpose()
    }

    async fn fetch_profile(&self, id: EntityId) -> Result<Option<Profile>, DatabaseError> {
        let sql = format!("{SELECT_PROFILE} WHERE p.id = ?");
        let row: Option<ProfileRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(profile_from_row).transpose()
    }

    async fn fetch_profile_by_user(
        &self,
        user_id: EntityId,
    ) -> Result<Option<Profile>, DatabaseError> {
        let sql = format!("{SELECT_PROFILE} WHERE p.user_id = ?");
        let row: Option<ProfileRow> = sqlx::query_as(&sql)
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(profile_from_row).transpose()
    }

    async fn fetch_edges(&self, sql: &str, id: EntityId) -> Result<Vec<EntityId>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(sql)
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(other,)| other.parse::<EntityId>().map_err(DatabaseError::from))
            .collect()
    }
}

fn member_type_from_row(
    (id, discount, posts_limit_per_month): MemberTypeRow,
) -> Result<MemberType, DatabaseError> {
    let id = MemberTypeId::from_db(&id).ok_or(DatabaseError::UnknownMemberType(id))?;
    Ok(MemberType {
        id,
        discount,
        posts_limit_per_month,
    })
}

fn post_from_row((id, title, content, author_id): PostRow) -> Result<Post, DatabaseError> {
    Ok(Post {
        id: id.parse()?,
        title,
        content,
        author_id: author_id.parse()?,
    })
}

fn profile_from_row(
    (id, is_male, year_of_birth, user_id, member_type_id, discount, posts_limit_per_month): ProfileRow,
) -> Result<Profile, DatabaseError> {
    let member_type = member_type_from_row((member_type_id, discount, posts_limit_per_month))?;
    Ok(Profile {
        id: id.parse()?,
        is_male,
        year_of_birth,
        user_id: user_id.parse()?,
        member_type,
    })
}
