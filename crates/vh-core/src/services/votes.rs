//! # Vote Ledger
//!
//! At most one vote per (voter, target). Each target carries a cached
//! `vote_count`; the vote rows are the source of truth and the counter is
//! only ever written in the same unit of work as the row it reflects.

use crate::error::{AppError, Result};
use crate::models::{now, Actor, CommentId, ProjectId, Target, Vote, VoteKind};
use crate::traits::{EntityStore, StoreRead, StoreTx};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Owning project and current cached count of a vote target.
pub(crate) async fn target_state<R>(reader: &mut R, target: Target) -> Result<(ProjectId, i64)>
where
    R: StoreRead + ?Sized,
{
    match target {
        Target::Project(id) => {
            let project = reader
                .project(id)
                .await?
                .ok_or_else(|| AppError::project_not_found(id))?;
            Ok((project.id, project.vote_count))
        }
        Target::Comment(id) => {
            let comment = reader
                .comment(id)
                .await?
                .ok_or_else(|| AppError::comment_not_found(id))?;
            Ok((comment.project_id, comment.vote_count))
        }
    }
}

/// Deletes every vote on `target`, returning how many went.
pub(crate) async fn sweep_votes<T>(tx: &mut T, target: Target) -> Result<usize>
where
    T: StoreTx + ?Sized,
{
    let mut removed = 0;
    for vote in tx.votes_by_target(target).await? {
        if tx.delete_vote(vote.id).await? {
            removed += 1;
        }
    }
    Ok(removed)
}

pub struct VoteLedger {
    store: Arc<dyn EntityStore>,
}

impl VoteLedger {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Records `actor`'s vote on `target` and bumps its counter by one.
    pub async fn vote(&self, actor: &Actor, target: Target) -> Result<Vote> {
        let mut tx = self.store.begin().await?;

        if tx.find_vote(&actor.user_id, target).await?.is_some() {
            return Err(AppError::AlreadyVoted(target));
        }
        let (project_id, count) = target_state(tx.as_mut(), target).await?;

        let vote = Vote {
            id: Uuid::now_v7(),
            project_id,
            voter_id: actor.user_id.clone(),
            kind: target.kind(),
            target_id: target.id(),
            created_at: now(),
        };
        tx.insert_vote(&vote).await?;
        tx.set_vote_count(target, count + 1).await?;
        tx.commit().await?;

        info!(voter = %actor.user_id, %target, votes = count + 1, "vote recorded");
        Ok(vote)
    }

    /// Removes `actor`'s vote on `target` and lowers its counter, never below zero.
    pub async fn unvote(&self, actor: &Actor, target: Target) -> Result<()> {
        let mut tx = self.store.begin().await?;

        let vote = tx
            .find_vote(&actor.user_id, target)
            .await?
            .ok_or(AppError::VoteNotFound(target))?;
        let (_, count) = target_state(tx.as_mut(), target).await?;

        tx.delete_vote(vote.id).await?;
        if count <= 0 {
            warn!(%target, count, "vote counter already at zero, clamping");
        }
        let lowered = (count - 1).max(0);
        tx.set_vote_count(target, lowered).await?;
        tx.commit().await?;

        info!(voter = %actor.user_id, %target, votes = lowered, "vote removed");
        Ok(())
    }

    pub async fn vote_for_project(&self, actor: &Actor, project_id: ProjectId) -> Result<Vote> {
        self.vote(actor, Target::Project(project_id)).await
    }

    pub async fn unvote_for_project(&self, actor: &Actor, project_id: ProjectId) -> Result<()> {
        self.unvote(actor, Target::Project(project_id)).await
    }

    pub async fn vote_for_comment(&self, actor: &Actor, comment_id: CommentId) -> Result<Vote> {
        self.vote(actor, Target::Comment(comment_id)).await
    }

    pub async fn unvote_for_comment(&self, actor: &Actor, comment_id: CommentId) -> Result<()> {
        self.unvote(actor, Target::Comment(comment_id)).await
    }

    pub async fn has_voted(&self, kind: VoteKind, target_id: Uuid, voter_id: &str) -> Result<bool> {
        let mut reader = self.store.snapshot().await?;
        let vote = reader.find_vote(voter_id, Target::new(kind, target_id)).await?;
        Ok(vote.is_some())
    }

    pub async fn votes_by_user(&self, voter_id: &str) -> Result<Vec<Vote>> {
        let mut reader = self.store.snapshot().await?;
        Ok(reader.votes_by_user(voter_id).await?)
    }
}
