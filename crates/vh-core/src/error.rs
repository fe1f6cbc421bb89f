//! # AppError
//!
//! Centralized error handling for the showcase core.
//! Maps domain-specific failures to actionable error types.

use crate::models::Target;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Which kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Project,
    Comment,
    ParentComment,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Project => "project",
            Entity::Comment => "comment",
            Entity::ParentComment => "parent comment",
        })
    }
}

/// The primary error type for all vh-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (project, comment, parent comment or vote target)
    #[error("{0} not found with ID {1}")]
    NotFound(Entity, String),

    /// The actor does not own the resource
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("already voted for {0}")]
    AlreadyVoted(Target),

    #[error("no vote found for {0}")]
    VoteNotFound(Target),

    /// Reply parent belongs to another project
    #[error("parent comment {parent} does not belong to project {project}")]
    CrossProject { parent: Uuid, project: Uuid },

    #[error("maximum comment depth exceeded: {depth} > {max}")]
    DepthExceeded { depth: u32, max: u32 },

    /// Validation failure (e.g. blank title or comment)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Resource already exists (e.g. slug race in another process)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure (e.g. DB down)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn project_not_found(id: Uuid) -> Self {
        AppError::NotFound(Entity::Project, id.to_string())
    }

    pub fn comment_not_found(id: Uuid) -> Self {
        AppError::NotFound(Entity::Comment, id.to_string())
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(..) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::AlreadyVoted(_) => "already_voted",
            AppError::VoteNotFound(_) => "vote_not_found",
            AppError::CrossProject { .. } => "cross_project",
            AppError::DepthExceeded { .. } => "depth_exceeded",
            AppError::ValidationError(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Storage ports speak `anyhow`; a backend that raises an `AppError`
/// on purpose gets it back unchanged, anything else is infrastructure.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AppError>() {
            Ok(app) => app,
            Err(other) => AppError::Internal(format!("{other:#}")),
        }
    }
}

/// A specialized Result type for showcase logic.
pub type Result<T> = std::result::Result<T, AppError>;
