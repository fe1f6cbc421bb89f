//! # Domain Models
//!
//! These structs represent the core entities of the showcase.
//! We use UUID v7 for time-ordered, globally unique identification.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type CommentId = Uuid;
pub type VoteId = Uuid;

/// Deepest reply level a thread may reach (0 = top-level).
pub const MAX_COMMENT_DEPTH: u32 = 5;

/// Creation timestamp at the microsecond precision every backend can round-trip.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// The authenticated caller, supplied by the external identity provider
/// and passed explicitly into every mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar: None,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// A submitted project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    /// URL slug, unique across projects (e.g. "hello-world-1")
    pub slug: String,
    pub description: String,
    pub main_image: String,
    pub screenshots: Vec<String>,
    pub link: String,
    pub tags: Vec<String>,
    pub creator_id: String,
    pub creator_name: String,
    pub creator_avatar: Option<String>,
    /// Cached number of project votes
    pub vote_count: i64,
    /// Cached number of top-level comments
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields a creator supplies when submitting a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub main_image: String,
    pub screenshots: Vec<String>,
    pub link: String,
    pub tags: Vec<String>,
}

/// Partial update of a project. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub main_image: Option<String>,
    pub screenshots: Option<Vec<String>>,
    pub link: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.main_image.is_none()
            && self.screenshots.is_none()
            && self.link.is_none()
            && self.tags.is_none()
    }

    /// Writes the supplied fields onto `project`.
    pub fn apply(&self, project: &mut Project) {
        if let Some(title) = &self.title {
            project.title = title.clone();
        }
        if let Some(description) = &self.description {
            project.description = description.clone();
        }
        if let Some(main_image) = &self.main_image {
            project.main_image = main_image.clone();
        }
        if let Some(screenshots) = &self.screenshots {
            project.screenshots = screenshots.clone();
        }
        if let Some(link) = &self.link {
            project.link = link.clone();
        }
        if let Some(tags) = &self.tags {
            project.tags = tags.clone();
        }
    }
}

/// A threaded comment on a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub project_id: ProjectId,
    pub author_id: String,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub content: String,
    /// Comment this one replies to; always within the same project
    pub parent_id: Option<CommentId>,
    pub vote_count: i64,
    /// 0 for top-level, parent depth + 1 for replies
    pub depth: u32,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.depth == 0
    }
}

/// Fields a caller supplies when posting a comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub project_id: ProjectId,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Project,
    Comment,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKind::Project => "project",
            VoteKind::Comment => "comment",
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(VoteKind::Project),
            "comment" => Ok(VoteKind::Comment),
            other => Err(format!("unknown vote kind: {other}")),
        }
    }
}

/// The entity a vote refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Project(ProjectId),
    Comment(CommentId),
}

impl Target {
    pub fn new(kind: VoteKind, id: Uuid) -> Self {
        match kind {
            VoteKind::Project => Target::Project(id),
            VoteKind::Comment => Target::Comment(id),
        }
    }

    pub fn kind(&self) -> VoteKind {
        match self {
            Target::Project(_) => VoteKind::Project,
            Target::Comment(_) => VoteKind::Comment,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Target::Project(id) | Target::Comment(id) => *id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// One user's vote on a project or comment. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: VoteId,
    /// Owning project, also set for comment votes
    pub project_id: ProjectId,
    pub voter_id: String,
    pub kind: VoteKind,
    pub target_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    pub fn target(&self) -> Target {
        Target::new(self.kind, self.target_id)
    }
}

/// Rows removed by a cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub comments: usize,
    pub votes: usize,
}
