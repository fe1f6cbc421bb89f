//! # vh-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `vh-core` domain models.
//!
//! Every unit of work is a SQLite transaction. Writers additionally hold an
//! in-process gate so that a check-then-write sequence (vote lookup then
//! insert, slug probe then insert) never interleaves with another writer.

mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use vh_core::error::AppError;
use vh_core::models::{
    Comment, CommentId, Project, ProjectId, ProjectPatch, Target, Vote, VoteId, VoteKind,
};
use vh_core::search::title_matches;
use vh_core::traits::{EntityStore, StoreRead, StoreTx};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// Helper for UUID conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> anyhow::Result<Uuid> {
    Ok(Uuid::from_slice(blob)?)
}

fn uuid_column(row: &SqliteRow, column: &str) -> anyhow::Result<Uuid> {
    blob_to_uuid(&row.try_get::<Vec<u8>, _>(column)?)
}

fn micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn timestamp_column(row: &SqliteRow, column: &str) -> anyhow::Result<DateTime<Utc>> {
    let raw: i64 = row.try_get(column)?;
    DateTime::from_timestamp_micros(raw)
        .ok_or_else(|| anyhow::anyhow!("{column} out of range: {raw}"))
}

fn project_from_row(row: &SqliteRow) -> anyhow::Result<Project> {
    Ok(Project {
        id: uuid_column(row, "id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        main_image: row.try_get("main_image")?,
        screenshots: serde_json::from_str(&row.try_get::<String, _>("screenshots")?)?,
        link: row.try_get("link")?,
        tags: serde_json::from_str(&row.try_get::<String, _>("tags")?)?,
        creator_id: row.try_get("creator_id")?,
        creator_name: row.try_get("creator_name")?,
        creator_avatar: row.try_get("creator_avatar")?,
        vote_count: row.try_get("vote_count")?,
        comment_count: row.try_get("comment_count")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

fn comment_from_row(row: &SqliteRow) -> anyhow::Result<Comment> {
    let parent_id = row
        .try_get::<Option<Vec<u8>>, _>("parent_id")?
        .map(|blob| blob_to_uuid(&blob))
        .transpose()?;
    Ok(Comment {
        id: uuid_column(row, "id")?,
        project_id: uuid_column(row, "project_id")?,
        author_id: row.try_get("author_id")?,
        author_name: row.try_get("author_name")?,
        author_avatar: row.try_get("author_avatar")?,
        content: row.try_get("content")?,
        parent_id,
        vote_count: row.try_get("vote_count")?,
        depth: u32::try_from(row.try_get::<i64, _>("depth")?)?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

fn vote_from_row(row: &SqliteRow) -> anyhow::Result<Vote> {
    Ok(Vote {
        id: uuid_column(row, "id")?,
        project_id: uuid_column(row, "project_id")?,
        voter_id: row.try_get("voter_id")?,
        kind: row
            .try_get::<String, _>("kind")?
            .parse::<VoteKind>()
            .map_err(anyhow::Error::msg)?,
        target_id: uuid_column(row, "target_id")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

fn collect<T>(rows: &[SqliteRow], map: fn(&SqliteRow) -> anyhow::Result<T>) -> anyhow::Result<Vec<T>> {
    rows.iter().map(map).collect()
}

/// Turns a UNIQUE constraint failure into the domain error the caller expects.
fn on_unique(err: sqlx::Error, conflict: impl FnOnce() -> AppError) -> anyhow::Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict().into(),
        _ => err.into(),
    }
}

fn table_for(target: Target) -> &'static str {
    match target {
        Target::Project(_) => "projects",
        Target::Comment(_) => "comments",
    }
}

fn missing(target: Target) -> AppError {
    match target {
        Target::Project(id) => AppError::project_not_found(id),
        Target::Comment(id) => AppError::comment_not_found(id),
    }
}

async fn project(conn: &mut SqliteConnection, id: ProjectId) -> anyhow::Result<Option<Project>> {
    let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
        .bind(uuid_to_blob(id))
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(project_from_row).transpose()
}

async fn comment(conn: &mut SqliteConnection, id: CommentId) -> anyhow::Result<Option<Comment>> {
    let row = sqlx::query("SELECT * FROM comments WHERE id = ?")
        .bind(uuid_to_blob(id))
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(comment_from_row).transpose()
}

async fn existing_project(conn: &mut SqliteConnection, id: ProjectId) -> anyhow::Result<Project> {
    project(conn, id)
        .await?
        .ok_or_else(|| AppError::project_not_found(id).into())
}

async fn existing_comment(conn: &mut SqliteConnection, id: CommentId) -> anyhow::Result<Comment> {
    comment(conn, id)
        .await?
        .ok_or_else(|| AppError::comment_not_found(id).into())
}

/// One unit of work. Holds the writer gate when opened by `begin`;
/// dropping it without `commit` rolls the transaction back.
pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
    _writer: Option<OwnedMutexGuard<()>>,
}

#[async_trait]
impl StoreRead for SqliteTx {
    async fn project(&mut self, id: ProjectId) -> anyhow::Result<Option<Project>> {
        project(&mut self.tx, id).await
    }

    async fn project_by_slug(&mut self, slug: &str) -> anyhow::Result<Option<Project>> {
        if slug.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query("SELECT * FROM projects WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn projects_by_votes(&mut self) -> anyhow::Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY vote_count DESC, created_at DESC, id DESC")
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, project_from_row)
    }

    async fn projects_by_creator(&mut self, creator_id: &str) -> anyhow::Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects WHERE creator_id = ? ORDER BY created_at DESC, id DESC")
            .bind(creator_id)
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, project_from_row)
    }

    /// `LIKE` narrows the scan; word-prefix matching is settled in Rust.
    async fn search_titles(&mut self, tokens: &[String]) -> anyhow::Result<Vec<Project>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM projects WHERE 1 = 1");
        // SQLite only folds ASCII case.
        for token in tokens.iter().filter(|t| t.is_ascii()) {
            query.push(" AND lower(title) LIKE ").push_bind(format!("%{token}%"));
        }
        query.push(" ORDER BY created_at, id");
        let rows = query.build().fetch_all(&mut *self.tx).await?;
        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let project = project_from_row(row)?;
            if title_matches(&project.title, tokens) {
                hits.push(project);
            }
        }
        Ok(hits)
    }

    async fn projects_without_slug(&mut self) -> anyhow::Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects WHERE slug = '' ORDER BY created_at, id")
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, project_from_row)
    }

    async fn comment(&mut self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        comment(&mut self.tx, id).await
    }

    async fn comments_by_project(&mut self, project_id: ProjectId) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query("SELECT * FROM comments WHERE project_id = ? ORDER BY created_at, id")
            .bind(uuid_to_blob(project_id))
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, comment_from_row)
    }

    async fn replies(&mut self, parent_id: CommentId) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query("SELECT * FROM comments WHERE parent_id = ? ORDER BY created_at, id")
            .bind(uuid_to_blob(parent_id))
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, comment_from_row)
    }

    async fn comments_by_author(&mut self, author_id: &str) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query("SELECT * FROM comments WHERE author_id = ? ORDER BY created_at DESC, id DESC")
            .bind(author_id)
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, comment_from_row)
    }

    async fn find_vote(&mut self, voter_id: &str, target: Target) -> anyhow::Result<Option<Vote>> {
        let row = sqlx::query("SELECT * FROM votes WHERE voter_id = ? AND target_id = ? AND kind = ?")
            .bind(voter_id)
            .bind(uuid_to_blob(target.id()))
            .bind(target.kind().as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(vote_from_row).transpose()
    }

    async fn votes_by_user(&mut self, voter_id: &str) -> anyhow::Result<Vec<Vote>> {
        let rows = sqlx::query("SELECT * FROM votes WHERE voter_id = ? ORDER BY created_at, id")
            .bind(voter_id)
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, vote_from_row)
    }

    async fn votes_by_project(&mut self, project_id: ProjectId) -> anyhow::Result<Vec<Vote>> {
        let rows = sqlx::query("SELECT * FROM votes WHERE project_id = ? ORDER BY created_at, id")
            .bind(uuid_to_blob(project_id))
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, vote_from_row)
    }

    async fn votes_by_target(&mut self, target: Target) -> anyhow::Result<Vec<Vote>> {
        let rows = sqlx::query("SELECT * FROM votes WHERE target_id = ? AND kind = ? ORDER BY created_at, id")
            .bind(uuid_to_blob(target.id()))
            .bind(target.kind().as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, vote_from_row)
    }
}

#[async_trait]
impl StoreTx for SqliteTx {
    async fn insert_project(&mut self, project: &Project) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO projects (id, title, slug, description, main_image, screenshots, link, tags, \
             creator_id, creator_name, creator_avatar, vote_count, comment_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(project.id))
        .bind(&project.title)
        .bind(&project.slug)
        .bind(&project.description)
        .bind(&project.main_image)
        .bind(serde_json::to_string(&project.screenshots)?)
        .bind(&project.link)
        .bind(serde_json::to_string(&project.tags)?)
        .bind(&project.creator_id)
        .bind(&project.creator_name)
        .bind(&project.creator_avatar)
        .bind(project.vote_count)
        .bind(project.comment_count)
        .bind(micros(project.created_at))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            on_unique(e, || {
                AppError::Conflict(format!("project {} or slug {} already exists", project.id, project.slug))
            })
        })?;
        Ok(())
    }

    async fn patch_project(&mut self, id: ProjectId, patch: &ProjectPatch) -> anyhow::Result<Project> {
        let mut project = existing_project(&mut self.tx, id).await?;
        patch.apply(&mut project);
        sqlx::query(
            "UPDATE projects SET title = ?, description = ?, main_image = ?, screenshots = ?, link = ?, tags = ? \
             WHERE id = ?",
        )
        .bind(&project.title)
        .bind(&project.description)
        .bind(&project.main_image)
        .bind(serde_json::to_string(&project.screenshots)?)
        .bind(&project.link)
        .bind(serde_json::to_string(&project.tags)?)
        .bind(uuid_to_blob(id))
        .execute(&mut *self.tx)
        .await?;
        Ok(project)
    }

    async fn set_project_slug(&mut self, id: ProjectId, slug: &str) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE projects SET slug = ? WHERE id = ?")
            .bind(slug)
            .bind(uuid_to_blob(id))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| on_unique(e, || AppError::Conflict(format!("slug {slug} is taken"))))?;
        if result.rows_affected() == 0 {
            return Err(AppError::project_not_found(id).into());
        }
        Ok(())
    }

    async fn set_comment_count(&mut self, id: ProjectId, count: i64) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE projects SET comment_count = ? WHERE id = ?")
            .bind(count)
            .bind(uuid_to_blob(id))
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::project_not_found(id).into());
        }
        Ok(())
    }

    async fn delete_project(&mut self, id: ProjectId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_comment(&mut self, comment: &Comment) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO comments (id, project_id, author_id, author_name, author_avatar, content, \
             parent_id, vote_count, depth, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(comment.id))
        .bind(uuid_to_blob(comment.project_id))
        .bind(&comment.author_id)
        .bind(&comment.author_name)
        .bind(&comment.author_avatar)
        .bind(&comment.content)
        .bind(comment.parent_id.map(uuid_to_blob))
        .bind(comment.vote_count)
        .bind(i64::from(comment.depth))
        .bind(micros(comment.created_at))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| on_unique(e, || AppError::Conflict(format!("comment {} already exists", comment.id))))?;
        Ok(())
    }

    async fn set_comment_content(&mut self, id: CommentId, content: &str) -> anyhow::Result<Comment> {
        let result = sqlx::query("UPDATE comments SET content = ? WHERE id = ?")
            .bind(content)
            .bind(uuid_to_blob(id))
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::comment_not_found(id).into());
        }
        existing_comment(&mut self.tx, id).await
    }

    async fn delete_comment(&mut self, id: CommentId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_vote_count(&mut self, target: Target, count: i64) -> anyhow::Result<()> {
        let sql = format!("UPDATE {} SET vote_count = ? WHERE id = ?", table_for(target));
        let result = sqlx::query(&sql)
            .bind(count)
            .bind(uuid_to_blob(target.id()))
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(missing(target).into());
        }
        Ok(())
    }

    async fn insert_vote(&mut self, vote: &Vote) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO votes (id, project_id, voter_id, kind, target_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(vote.id))
        .bind(uuid_to_blob(vote.project_id))
        .bind(&vote.voter_id)
        .bind(vote.kind.as_str())
        .bind(uuid_to_blob(vote.target_id))
        .bind(micros(vote.created_at))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| on_unique(e, || AppError::AlreadyVoted(vote.target())))?;
        Ok(())
    }

    async fn delete_vote(&mut self, id: VoteId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM votes WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let SqliteTx { tx, _writer } = *self;
        tx.commit().await?;
        Ok(())
    }
}

/// SQLite-backed entity store.
#[derive(Clone)]
pub struct SqliteEntityStore {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl SqliteEntityStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::connect(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Opens the pool and creates tables and indexes if missing.
    ///
    /// In-memory databases live as long as their connection, so they get
    /// exactly one connection that is never recycled.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };
        let pool = pool_options.connect_with(options).await?;

        let store = Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        };
        store.migrate().await?;
        tracing::info!(url = database_url, in_memory, "sqlite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        for statement in schema::MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn snapshot(&self) -> anyhow::Result<Box<dyn StoreRead>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx { tx, _writer: None }))
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn StoreTx>> {
        // Gate first: on a single-connection pool the reverse order deadlocks.
        let writer = self.writer.clone().lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx {
            tx,
            _writer: Some(writer),
        }))
    }
}
