//! # Core Traits (Ports)
//!
//! Any storage plugin must implement these traits to be used by the binary.
//!
//! All access goes through a unit of work. `EntityStore::snapshot` opens a
//! read-only view; `EntityStore::begin` opens a writing unit that is
//! serialized against every other writer and rolls back when dropped
//! without `commit`. Lookups of missing keys return `Ok(None)`.

use crate::models::{Comment, CommentId, Project, ProjectId, ProjectPatch, Target, Vote, VoteId};
use async_trait::async_trait;

/// Keyed gets and indexed range queries over projects, comments and votes.
#[async_trait]
pub trait StoreRead: Send {
    // Project Operations
    async fn project(&mut self, id: ProjectId) -> anyhow::Result<Option<Project>>;
    /// Point lookup on the slug index.
    async fn project_by_slug(&mut self, slug: &str) -> anyhow::Result<Option<Project>>;
    /// Vote count descending, newest first on ties.
    async fn projects_by_votes(&mut self) -> anyhow::Result<Vec<Project>>;
    /// Newest first.
    async fn projects_by_creator(&mut self, creator_id: &str) -> anyhow::Result<Vec<Project>>;
    /// Projects whose title contains every token as a word prefix.
    async fn search_titles(&mut self, tokens: &[String]) -> anyhow::Result<Vec<Project>>;
    async fn projects_without_slug(&mut self) -> anyhow::Result<Vec<Project>>;

    // Comment Operations
    async fn comment(&mut self, id: CommentId) -> anyhow::Result<Option<Comment>>;
    async fn comments_by_project(&mut self, project_id: ProjectId) -> anyhow::Result<Vec<Comment>>;
    /// Direct children, oldest first.
    async fn replies(&mut self, parent_id: CommentId) -> anyhow::Result<Vec<Comment>>;
    /// Newest first.
    async fn comments_by_author(&mut self, author_id: &str) -> anyhow::Result<Vec<Comment>>;

    // Vote Operations
    async fn find_vote(&mut self, voter_id: &str, target: Target) -> anyhow::Result<Option<Vote>>;
    /// Oldest first.
    async fn votes_by_user(&mut self, voter_id: &str) -> anyhow::Result<Vec<Vote>>;
    /// Every vote attributed to the project, including votes on its comments.
    async fn votes_by_project(&mut self, project_id: ProjectId) -> anyhow::Result<Vec<Vote>>;
    async fn votes_by_target(&mut self, target: Target) -> anyhow::Result<Vec<Vote>>;
}

/// Mutations inside a writing unit of work.
///
/// `patch_*` and `set_*` fail when the record is missing; `delete_*`
/// report whether a row was removed so cascades can treat absence as a no-op.
#[async_trait]
pub trait StoreTx: StoreRead {
    async fn insert_project(&mut self, project: &Project) -> anyhow::Result<()>;
    async fn patch_project(&mut self, id: ProjectId, patch: &ProjectPatch) -> anyhow::Result<Project>;
    async fn set_project_slug(&mut self, id: ProjectId, slug: &str) -> anyhow::Result<()>;
    async fn set_comment_count(&mut self, id: ProjectId, count: i64) -> anyhow::Result<()>;
    async fn delete_project(&mut self, id: ProjectId) -> anyhow::Result<bool>;

    async fn insert_comment(&mut self, comment: &Comment) -> anyhow::Result<()>;
    async fn set_comment_content(&mut self, id: CommentId, content: &str) -> anyhow::Result<Comment>;
    async fn delete_comment(&mut self, id: CommentId) -> anyhow::Result<bool>;

    /// Writes the cached vote counter of a project or comment.
    async fn set_vote_count(&mut self, target: Target, count: i64) -> anyhow::Result<()>;
    async fn insert_vote(&mut self, vote: &Vote) -> anyhow::Result<()>;
    async fn delete_vote(&mut self, id: VoteId) -> anyhow::Result<bool>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
}

/// Data persistence contract for projects, comments and votes.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn snapshot(&self) -> anyhow::Result<Box<dyn StoreRead>>;
    async fn begin(&self) -> anyhow::Result<Box<dyn StoreTx>>;
}

/// Title search collaborator. Ranking is its own business; callers only
/// rely on the set of ids it returns.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TitleIndex: Send + Sync {
    async fn matching_ids(&self, term: &str) -> anyhow::Result<Vec<ProjectId>>;
}
