//! # Comment Tree Manager
//!
//! Depth-bounded reply threads. Deleting a comment removes its whole
//! subtree, replies by other authors included, together with every vote
//! cast on the removed comments.

use crate::error::{AppError, Entity, Result};
use crate::models::{
    now, Actor, CascadeReport, Comment, CommentId, NewComment, ProjectId, Target,
    MAX_COMMENT_DEPTH,
};
use crate::services::votes::sweep_votes;
use crate::traits::{EntityStore, StoreTx};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

fn require_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(AppError::ValidationError("comment content must not be blank".into()));
    }
    Ok(())
}

pub struct CommentTree {
    store: Arc<dyn EntityStore>,
    max_depth: u32,
}

impl CommentTree {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self::with_max_depth(store, MAX_COMMENT_DEPTH)
    }

    pub fn with_max_depth(store: Arc<dyn EntityStore>, max_depth: u32) -> Self {
        Self { store, max_depth }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Posts a comment or reply. Top-level comments bump the project's
    /// `comment_count`; replies leave it alone.
    pub async fn create(&self, actor: &Actor, new: NewComment) -> Result<Comment> {
        require_content(&new.content)?;
        let mut tx = self.store.begin().await?;

        let project = tx
            .project(new.project_id)
            .await?
            .ok_or_else(|| AppError::project_not_found(new.project_id))?;

        let depth = match new.parent_id {
            None => 0,
            Some(parent_id) => {
                let parent = tx
                    .comment(parent_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(Entity::ParentComment, parent_id.to_string()))?;
                if parent.project_id != new.project_id {
                    return Err(AppError::CrossProject {
                        parent: parent_id,
                        project: new.project_id,
                    });
                }
                let depth = parent.depth + 1;
                if depth > self.max_depth {
                    return Err(AppError::DepthExceeded {
                        depth,
                        max: self.max_depth,
                    });
                }
                depth
            }
        };

        let comment = Comment {
            id: Uuid::now_v7(),
            project_id: new.project_id,
            author_id: actor.user_id.clone(),
            author_name: actor.display_name.clone(),
            author_avatar: actor.avatar.clone(),
            content: new.content,
            parent_id: new.parent_id,
            vote_count: 0,
            depth,
            created_at: now(),
        };
        tx.insert_comment(&comment).await?;
        if comment.is_top_level() {
            tx.set_comment_count(project.id, project.comment_count + 1)
                .await?;
        }
        tx.commit().await?;

        info!(comment = %comment.id, project = %comment.project_id, depth, "comment created");
        Ok(comment)
    }

    /// Replaces the content of the actor's own comment.
    pub async fn update(&self, actor: &Actor, id: CommentId, content: &str) -> Result<Comment> {
        let mut tx = self.store.begin().await?;
        let comment = tx
            .comment(id)
            .await?
            .ok_or_else(|| AppError::comment_not_found(id))?;
        if comment.author_id != actor.user_id {
            return Err(AppError::Forbidden("only the author can update this comment".into()));
        }
        require_content(content)?;

        let updated = tx.set_comment_content(id, content).await?;
        tx.commit().await?;

        info!(comment = %id, "comment updated");
        Ok(updated)
    }

    /// Deletes the actor's comment and its transitive replies.
    ///
    /// Only the root is checked for ownership. Each comment goes in its own
    /// unit of work, children strictly before their parent, so an interrupted
    /// cascade leaves no orphans and can simply be re-run.
    pub async fn delete(&self, actor: &Actor, id: CommentId) -> Result<CascadeReport> {
        let root = {
            let mut reader = self.store.snapshot().await?;
            reader
                .comment(id)
                .await?
                .ok_or_else(|| AppError::comment_not_found(id))?
        };
        if root.author_id != actor.user_id {
            return Err(AppError::Forbidden("only the author can delete this comment".into()));
        }

        let mut report = CascadeReport::default();
        // (comment, replies already queued)
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if !expanded {
                stack.push((current, true));
                let mut reader = self.store.snapshot().await?;
                for reply in reader.replies(current).await? {
                    stack.push((reply.id, false));
                }
                continue;
            }

            let mut tx = self.store.begin().await?;
            let late = tx.replies(current).await?;
            if !late.is_empty() {
                // Replies that landed after expansion go first.
                debug!(comment = %current, replies = late.len(), "re-expanding comment");
                drop(tx);
                stack.push((current, true));
                stack.extend(late.into_iter().map(|reply| (reply.id, false)));
                continue;
            }
            self.remove_one(tx.as_mut(), current, current == id, &mut report)
                .await?;
            tx.commit().await?;
        }

        info!(
            comment = %id,
            project = %root.project_id,
            comments = report.comments,
            votes = report.votes,
            "comment subtree deleted"
        );
        Ok(report)
    }

    /// Removes one comment and its votes. Missing rows are a no-op.
    async fn remove_one<T>(
        &self,
        tx: &mut T,
        id: CommentId,
        is_root: bool,
        report: &mut CascadeReport,
    ) -> Result<()>
    where
        T: StoreTx + ?Sized,
    {
        let Some(comment) = tx.comment(id).await? else {
            debug!(comment = %id, "comment already gone");
            return Ok(());
        };

        report.votes += sweep_votes(&mut *tx, Target::Comment(id)).await?;
        if tx.delete_comment(id).await? {
            report.comments += 1;
        }

        if is_root && comment.is_top_level() {
            if let Some(project) = tx.project(comment.project_id).await? {
                if project.comment_count <= 0 {
                    warn!(project = %project.id, "comment counter already at zero, clamping");
                }
                tx.set_comment_count(project.id, (project.comment_count - 1).max(0))
                    .await?;
            }
        }
        debug!(comment = %id, depth = comment.depth, "comment removed");
        Ok(())
    }

    /// Every comment of the project: by depth, then oldest first.
    pub async fn list_thread(&self, project_id: ProjectId) -> Result<Vec<Comment>> {
        let mut reader = self.store.snapshot().await?;
        let mut comments = reader.comments_by_project(project_id).await?;
        comments.sort_by_key(|c| (c.depth, c.created_at, c.id));
        Ok(comments)
    }

    /// Direct replies only, oldest first.
    pub async fn list_replies(&self, parent_id: CommentId) -> Result<Vec<Comment>> {
        let mut reader = self.store.snapshot().await?;
        Ok(reader.replies(parent_id).await?)
    }

    /// All comments by an author, newest first.
    pub async fn list_by_author(&self, author_id: &str) -> Result<Vec<Comment>> {
        let mut reader = self.store.snapshot().await?;
        Ok(reader.comments_by_author(author_id).await?)
    }

    pub async fn get(&self, id: CommentId) -> Result<Comment> {
        let mut reader = self.store.snapshot().await?;
        reader
            .comment(id)
            .await?
            .ok_or_else(|| AppError::comment_not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Project;
    use crate::services::votes::VoteLedger;
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<dyn EntityStore>,
        tree: CommentTree,
        project: Project,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let project = Project {
            id: Uuid::now_v7(),
            title: "Shader Toy".into(),
            slug: "shader-toy".into(),
            description: String::new(),
            main_image: String::new(),
            screenshots: vec![],
            link: String::new(),
            tags: vec![],
            creator_id: "owner".into(),
            creator_name: "Owner".into(),
            creator_avatar: None,
            vote_count: 0,
            comment_count: 0,
            created_at: now(),
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_project(&project).await.unwrap();
        tx.commit().await.unwrap();
        Fixture {
            tree: CommentTree::new(store.clone()),
            store,
            project,
        }
    }

    impl Fixture {
        async fn post(&self, who: &str, parent: Option<&Comment>) -> Comment {
            self.tree
                .create(
                    &Actor::new(who, who.to_uppercase()),
                    NewComment {
                        project_id: self.project.id,
                        content: format!("from {who}"),
                        parent_id: parent.map(|p| p.id),
                    },
                )
                .await
                .unwrap()
        }

        async fn comment_count(&self) -> i64 {
            let mut reader = self.store.snapshot().await.unwrap();
            reader.project(self.project.id).await.unwrap().unwrap().comment_count
        }
    }

    #[tokio::test]
    async fn replies_do_not_touch_comment_count() {
        let fx = fixture().await;
        let root = fx.post("alice", None).await;
        let reply = fx.post("bob", Some(&root)).await;

        assert_eq!(root.depth, 0);
        assert_eq!(reply.depth, 1);
        assert_eq!(reply.parent_id, Some(root.id));
        assert_eq!(fx.comment_count().await, 1);
    }

    #[tokio::test]
    async fn depth_is_bounded() {
        let fx = fixture().await;
        let mut parent = fx.post("alice", None).await;
        for _ in 0..MAX_COMMENT_DEPTH {
            parent = fx.post("alice", Some(&parent)).await;
        }
        assert_eq!(parent.depth, MAX_COMMENT_DEPTH);

        let err = fx
            .tree
            .create(
                &Actor::new("alice", "Alice"),
                NewComment {
                    project_id: fx.project.id,
                    content: "too deep".into(),
                    parent_id: Some(parent.id),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DepthExceeded { depth: 6, max: 5 }));
    }

    #[tokio::test]
    async fn missing_parent_is_reported() {
        let fx = fixture().await;
        let err = fx
            .tree
            .create(
                &Actor::new("alice", "Alice"),
                NewComment {
                    project_id: fx.project.id,
                    content: "orphan".into(),
                    parent_id: Some(Uuid::now_v7()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(Entity::ParentComment, _)));
    }

    #[tokio::test]
    async fn blank_content_is_rejected() {
        let fx = fixture().await;
        let err = fx
            .tree
            .create(
                &Actor::new("alice", "Alice"),
                NewComment {
                    project_id: fx.project.id,
                    content: "   ".into(),
                    parent_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn only_the_author_may_edit() {
        let fx = fixture().await;
        let root = fx.post("alice", None).await;

        let err = fx
            .tree
            .update(&Actor::new("bob", "Bob"), root.id, "hijacked")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let edited = fx
            .tree
            .update(&Actor::new("alice", "Alice"), root.id, "edited")
            .await
            .unwrap();
        assert_eq!(edited.content, "edited");
        assert_eq!(edited.depth, root.depth);
        assert_eq!(edited.created_at, root.created_at);
    }

    #[tokio::test]
    async fn cascade_removes_foreign_replies_and_votes() {
        let fx = fixture().await;
        let ledger = VoteLedger::new(fx.store.clone());
        let root = fx.post("alice", None).await;
        let reply = fx.post("bob", Some(&root)).await;
        let nested = fx.post("carol", Some(&reply)).await;
        let sibling = fx.post("dave", None).await;

        ledger.vote_for_comment(&Actor::new("x", "X"), root.id).await.unwrap();
        ledger.vote_for_comment(&Actor::new("x", "X"), nested.id).await.unwrap();
        ledger.vote_for_comment(&Actor::new("y", "Y"), sibling.id).await.unwrap();

        let report = fx
            .tree
            .delete(&Actor::new("alice", "Alice"), root.id)
            .await
            .unwrap();
        assert_eq!(report, CascadeReport { comments: 3, votes: 2 });

        let remaining: Vec<CommentId> = fx
            .tree
            .list_thread(fx.project.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(remaining, vec![sibling.id]);
        assert_eq!(fx.comment_count().await, 1);
        assert_eq!(ledger.votes_by_user("x").await.unwrap().len(), 0);
        assert_eq!(ledger.votes_by_user("y").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_reply_keeps_the_thread_count() {
        let fx = fixture().await;
        let root = fx.post("alice", None).await;
        let reply = fx.post("bob", Some(&root)).await;

        fx.tree.delete(&Actor::new("bob", "Bob"), reply.id).await.unwrap();
        assert_eq!(fx.comment_count().await, 1);
        assert!(fx.tree.list_replies(root.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_the_author_may_delete() {
        let fx = fixture().await;
        let root = fx.post("alice", None).await;
        let err = fx
            .tree
            .delete(&Actor::new("bob", "Bob"), root.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(fx.tree.get(root.id).await.unwrap(), root);
    }

    #[tokio::test]
    async fn author_listing_is_newest_first() {
        let fx = fixture().await;
        let first = fx.post("alice", None).await;
        let second = fx.post("alice", Some(&first)).await;
        fx.post("bob", None).await;

        let mine = fx.tree.list_by_author("alice").await.unwrap();
        assert_eq!(mine, vec![second, first]);
    }
}
