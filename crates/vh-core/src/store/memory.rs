//! In-process `EntityStore`.
//!
//! All tables sit behind one async mutex, so every unit of work is
//! serializable. Writers journal the before-image of each row they touch
//! and replay the journal backwards when dropped without `commit`.

use crate::error::AppError;
use crate::models::{
    Comment, CommentId, Project, ProjectId, ProjectPatch, Target, Vote, VoteId, VoteKind,
};
use crate::search::title_matches;
use crate::traits::{EntityStore, StoreRead, StoreTx};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type VoteKey = (String, VoteKind, Uuid);

/// Rows plus the secondary indexes the ports query by.
#[derive(Debug, Default)]
struct Tables {
    projects: HashMap<ProjectId, Project>,
    comments: HashMap<CommentId, Comment>,
    votes: HashMap<VoteId, Vote>,

    project_by_slug: HashMap<String, ProjectId>,
    projects_by_creator: HashMap<String, BTreeSet<ProjectId>>,
    comments_by_project: HashMap<ProjectId, BTreeSet<CommentId>>,
    comments_by_parent: HashMap<CommentId, BTreeSet<CommentId>>,
    comments_by_author: HashMap<String, BTreeSet<CommentId>>,
    vote_by_key: HashMap<VoteKey, VoteId>,
    votes_by_project: HashMap<ProjectId, BTreeSet<VoteId>>,
    votes_by_user: HashMap<String, BTreeSet<VoteId>>,
    votes_by_target: HashMap<(VoteKind, Uuid), BTreeSet<VoteId>>,
}

fn link<K: Hash + Eq>(index: &mut HashMap<K, BTreeSet<Uuid>>, key: K, id: Uuid) {
    index.entry(key).or_default().insert(id);
}

fn unlink<K: Hash + Eq>(index: &mut HashMap<K, BTreeSet<Uuid>>, key: &K, id: Uuid) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

fn vote_key(vote: &Vote) -> VoteKey {
    (vote.voter_id.clone(), vote.kind, vote.target_id)
}

impl Tables {
    fn put_project(&mut self, project: Project) {
        self.remove_project(project.id);
        if !project.slug.is_empty() {
            self.project_by_slug.insert(project.slug.clone(), project.id);
        }
        link(&mut self.projects_by_creator, project.creator_id.clone(), project.id);
        self.projects.insert(project.id, project);
    }

    fn remove_project(&mut self, id: ProjectId) -> Option<Project> {
        let project = self.projects.remove(&id)?;
        if self.project_by_slug.get(&project.slug) == Some(&id) {
            self.project_by_slug.remove(&project.slug);
        }
        unlink(&mut self.projects_by_creator, &project.creator_id, id);
        Some(project)
    }

    fn put_comment(&mut self, comment: Comment) {
        self.remove_comment(comment.id);
        link(&mut self.comments_by_project, comment.project_id, comment.id);
        if let Some(parent_id) = comment.parent_id {
            link(&mut self.comments_by_parent, parent_id, comment.id);
        }
        link(&mut self.comments_by_author, comment.author_id.clone(), comment.id);
        self.comments.insert(comment.id, comment);
    }

    fn remove_comment(&mut self, id: CommentId) -> Option<Comment> {
        let comment = self.comments.remove(&id)?;
        unlink(&mut self.comments_by_project, &comment.project_id, id);
        if let Some(parent_id) = comment.parent_id {
            unlink(&mut self.comments_by_parent, &parent_id, id);
        }
        unlink(&mut self.comments_by_author, &comment.author_id, id);
        Some(comment)
    }

    fn put_vote(&mut self, vote: Vote) {
        self.remove_vote(vote.id);
        self.vote_by_key.insert(vote_key(&vote), vote.id);
        link(&mut self.votes_by_project, vote.project_id, vote.id);
        link(&mut self.votes_by_user, vote.voter_id.clone(), vote.id);
        link(&mut self.votes_by_target, (vote.kind, vote.target_id), vote.id);
        self.votes.insert(vote.id, vote);
    }

    fn remove_vote(&mut self, id: VoteId) -> Option<Vote> {
        let vote = self.votes.remove(&id)?;
        self.vote_by_key.remove(&vote_key(&vote));
        unlink(&mut self.votes_by_project, &vote.project_id, id);
        unlink(&mut self.votes_by_user, &vote.voter_id, id);
        unlink(&mut self.votes_by_target, &(vote.kind, vote.target_id), id);
        Some(vote)
    }

    fn projects_in<'a>(&self, ids: impl IntoIterator<Item = &'a ProjectId>) -> Vec<Project> {
        ids.into_iter()
            .filter_map(|id| self.projects.get(id).cloned())
            .collect()
    }

    fn comments_in(&self, ids: Option<&BTreeSet<CommentId>>) -> Vec<Comment> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.comments.get(id).cloned())
            .collect()
    }

    fn votes_in(&self, ids: Option<&BTreeSet<VoteId>>) -> Vec<Vote> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.votes.get(id).cloned())
            .collect()
    }
}

fn newest_first<T>(rows: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, Uuid)) {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
}

fn oldest_first<T>(rows: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, Uuid)) {
    rows.sort_by_key(|row| key(row));
}

/// Before-image of a row touched by a writer.
#[derive(Debug)]
enum Undo {
    Project(ProjectId, Option<Project>),
    Comment(CommentId, Option<Comment>),
    Vote(VoteId, Option<Vote>),
}

impl Undo {
    fn restore(self, tables: &mut Tables) {
        match self {
            Undo::Project(_, Some(project)) => tables.put_project(project),
            Undo::Project(id, None) => {
                tables.remove_project(id);
            }
            Undo::Comment(_, Some(comment)) => tables.put_comment(comment),
            Undo::Comment(id, None) => {
                tables.remove_comment(id);
            }
            Undo::Vote(_, Some(vote)) => tables.put_vote(vote),
            Undo::Vote(id, None) => {
                tables.remove_vote(id);
            }
        }
    }
}

/// A locked view of the tables; doubles as snapshot and writer.
pub struct MemoryTx {
    tables: OwnedMutexGuard<Tables>,
    journal: Vec<Undo>,
}

impl MemoryTx {
    fn record_project(&mut self, id: ProjectId) {
        let before = self.tables.projects.get(&id).cloned();
        self.journal.push(Undo::Project(id, before));
    }

    fn record_comment(&mut self, id: CommentId) {
        let before = self.tables.comments.get(&id).cloned();
        self.journal.push(Undo::Comment(id, before));
    }

    fn record_vote(&mut self, id: VoteId) {
        let before = self.tables.votes.get(&id).cloned();
        self.journal.push(Undo::Vote(id, before));
    }

    fn existing_project(&self, id: ProjectId) -> anyhow::Result<Project> {
        self.tables
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::project_not_found(id).into())
    }

    fn existing_comment(&self, id: CommentId) -> anyhow::Result<Comment> {
        self.tables
            .comments
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::comment_not_found(id).into())
    }

    fn write_project(&mut self, project: Project) {
        self.record_project(project.id);
        self.tables.put_project(project);
    }

    fn write_comment(&mut self, comment: Comment) {
        self.record_comment(comment.id);
        self.tables.put_comment(comment);
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        while let Some(undo) = self.journal.pop() {
            undo.restore(&mut self.tables);
        }
    }
}

#[async_trait]
impl StoreRead for MemoryTx {
    async fn project(&mut self, id: ProjectId) -> anyhow::Result<Option<Project>> {
        Ok(self.tables.projects.get(&id).cloned())
    }

    async fn project_by_slug(&mut self, slug: &str) -> anyhow::Result<Option<Project>> {
        Ok(self
            .tables
            .project_by_slug
            .get(slug)
            .and_then(|id| self.tables.projects.get(id))
            .cloned())
    }

    async fn projects_by_votes(&mut self) -> anyhow::Result<Vec<Project>> {
        let mut projects: Vec<Project> = self.tables.projects.values().cloned().collect();
        projects.sort_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then_with(|| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
        });
        Ok(projects)
    }

    async fn projects_by_creator(&mut self, creator_id: &str) -> anyhow::Result<Vec<Project>> {
        let mut projects = self
            .tables
            .projects_in(self.tables.projects_by_creator.get(creator_id).into_iter().flatten());
        newest_first(&mut projects, |p| (p.created_at, p.id));
        Ok(projects)
    }

    async fn search_titles(&mut self, tokens: &[String]) -> anyhow::Result<Vec<Project>> {
        let mut hits: Vec<Project> = self
            .tables
            .projects
            .values()
            .filter(|p| title_matches(&p.title, tokens))
            .cloned()
            .collect();
        oldest_first(&mut hits, |p| (p.created_at, p.id));
        Ok(hits)
    }

    async fn projects_without_slug(&mut self) -> anyhow::Result<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .tables
            .projects
            .values()
            .filter(|p| p.slug.is_empty())
            .cloned()
            .collect();
        oldest_first(&mut projects, |p| (p.created_at, p.id));
        Ok(projects)
    }

    async fn comment(&mut self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        Ok(self.tables.comments.get(&id).cloned())
    }

    async fn comments_by_project(&mut self, project_id: ProjectId) -> anyhow::Result<Vec<Comment>> {
        let mut comments = self
            .tables
            .comments_in(self.tables.comments_by_project.get(&project_id));
        oldest_first(&mut comments, |c| (c.created_at, c.id));
        Ok(comments)
    }

    async fn replies(&mut self, parent_id: CommentId) -> anyhow::Result<Vec<Comment>> {
        let mut replies = self
            .tables
            .comments_in(self.tables.comments_by_parent.get(&parent_id));
        oldest_first(&mut replies, |c| (c.created_at, c.id));
        Ok(replies)
    }

    async fn comments_by_author(&mut self, author_id: &str) -> anyhow::Result<Vec<Comment>> {
        let mut comments = self
            .tables
            .comments_in(self.tables.comments_by_author.get(author_id));
        newest_first(&mut comments, |c| (c.created_at, c.id));
        Ok(comments)
    }

    async fn find_vote(&mut self, voter_id: &str, target: Target) -> anyhow::Result<Option<Vote>> {
        let key = (voter_id.to_string(), target.kind(), target.id());
        Ok(self
            .tables
            .vote_by_key
            .get(&key)
            .and_then(|id| self.tables.votes.get(id))
            .cloned())
    }

    async fn votes_by_user(&mut self, voter_id: &str) -> anyhow::Result<Vec<Vote>> {
        let mut votes = self.tables.votes_in(self.tables.votes_by_user.get(voter_id));
        oldest_first(&mut votes, |v| (v.created_at, v.id));
        Ok(votes)
    }

    async fn votes_by_project(&mut self, project_id: ProjectId) -> anyhow::Result<Vec<Vote>> {
        let mut votes = self
            .tables
            .votes_in(self.tables.votes_by_project.get(&project_id));
        oldest_first(&mut votes, |v| (v.created_at, v.id));
        Ok(votes)
    }

    async fn votes_by_target(&mut self, target: Target) -> anyhow::Result<Vec<Vote>> {
        let mut votes = self
            .tables
            .votes_in(self.tables.votes_by_target.get(&(target.kind(), target.id())));
        oldest_first(&mut votes, |v| (v.created_at, v.id));
        Ok(votes)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_project(&mut self, project: &Project) -> anyhow::Result<()> {
        if self.tables.projects.contains_key(&project.id) {
            return Err(AppError::Conflict(format!("project {} already exists", project.id)).into());
        }
        if !project.slug.is_empty() && self.tables.project_by_slug.contains_key(&project.slug) {
            return Err(AppError::Conflict(format!("slug {} is taken", project.slug)).into());
        }
        self.write_project(project.clone());
        Ok(())
    }

    async fn patch_project(&mut self, id: ProjectId, patch: &ProjectPatch) -> anyhow::Result<Project> {
        let mut project = self.existing_project(id)?;
        patch.apply(&mut project);
        self.write_project(project.clone());
        Ok(project)
    }

    async fn set_project_slug(&mut self, id: ProjectId, slug: &str) -> anyhow::Result<()> {
        let mut project = self.existing_project(id)?;
        if let Some(owner) = self.tables.project_by_slug.get(slug) {
            if *owner != id {
                return Err(AppError::Conflict(format!("slug {slug} is taken")).into());
            }
        }
        project.slug = slug.to_string();
        self.write_project(project);
        Ok(())
    }

    async fn set_comment_count(&mut self, id: ProjectId, count: i64) -> anyhow::Result<()> {
        let mut project = self.existing_project(id)?;
        project.comment_count = count;
        self.write_project(project);
        Ok(())
    }

    async fn delete_project(&mut self, id: ProjectId) -> anyhow::Result<bool> {
        self.record_project(id);
        Ok(self.tables.remove_project(id).is_some())
    }

    async fn insert_comment(&mut self, comment: &Comment) -> anyhow::Result<()> {
        if self.tables.comments.contains_key(&comment.id) {
            return Err(AppError::Conflict(format!("comment {} already exists", comment.id)).into());
        }
        self.write_comment(comment.clone());
        Ok(())
    }

    async fn set_comment_content(&mut self, id: CommentId, content: &str) -> anyhow::Result<Comment> {
        let mut comment = self.existing_comment(id)?;
        comment.content = content.to_string();
        self.write_comment(comment.clone());
        Ok(comment)
    }

    async fn delete_comment(&mut self, id: CommentId) -> anyhow::Result<bool> {
        self.record_comment(id);
        Ok(self.tables.remove_comment(id).is_some())
    }

    async fn set_vote_count(&mut self, target: Target, count: i64) -> anyhow::Result<()> {
        match target {
            Target::Project(id) => {
                let mut project = self.existing_project(id)?;
                project.vote_count = count;
                self.write_project(project);
            }
            Target::Comment(id) => {
                let mut comment = self.existing_comment(id)?;
                comment.vote_count = count;
                self.write_comment(comment);
            }
        }
        Ok(())
    }

    async fn insert_vote(&mut self, vote: &Vote) -> anyhow::Result<()> {
        if self.tables.vote_by_key.contains_key(&vote_key(vote)) {
            return Err(AppError::AlreadyVoted(vote.target()).into());
        }
        self.record_vote(vote.id);
        self.tables.put_vote(vote.clone());
        Ok(())
    }

    async fn delete_vote(&mut self, id: VoteId) -> anyhow::Result<bool> {
        self.record_vote(id);
        Ok(self.tables.remove_vote(id).is_some())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let mut this = self;
        this.journal.clear();
        Ok(())
    }
}

/// Shared handle to the in-process tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn open(&self) -> MemoryTx {
        MemoryTx {
            tables: self.tables.clone().lock_owned().await,
            journal: Vec::new(),
        }
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn snapshot(&self) -> anyhow::Result<Box<dyn StoreRead>> {
        Ok(Box::new(self.open().await))
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn StoreTx>> {
        Ok(Box::new(self.open().await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now;

    fn project(slug: &str, creator: &str) -> Project {
        Project {
            id: Uuid::now_v7(),
            title: "Pixel Forge".into(),
            slug: slug.into(),
            description: "sprites".into(),
            main_image: "img/main.png".into(),
            screenshots: vec![],
            link: "https://example.com".into(),
            tags: vec!["rust".into()],
            creator_id: creator.into(),
            creator_name: "Ada".into(),
            creator_avatar: None,
            vote_count: 0,
            comment_count: 0,
            created_at: now(),
        }
    }

    fn reply(project_id: ProjectId, parent: Option<&Comment>) -> Comment {
        Comment {
            id: Uuid::now_v7(),
            project_id,
            author_id: "u1".into(),
            author_name: "Ada".into(),
            author_avatar: None,
            content: "nice".into(),
            parent_id: parent.map(|p| p.id),
            vote_count: 0,
            depth: parent.map_or(0, |p| p.depth + 1),
            created_at: now(),
        }
    }

    #[tokio::test]
    async fn dropped_writer_rolls_back_rows_and_indexes() {
        let store = MemoryStore::new();
        let p = project("pixel-forge", "u1");

        let mut tx = store.begin().await.unwrap();
        tx.insert_project(&p).await.unwrap();
        assert!(tx.project_by_slug("pixel-forge").await.unwrap().is_some());
        drop(tx);

        let mut reader = store.snapshot().await.unwrap();
        assert!(reader.project(p.id).await.unwrap().is_none());
        assert!(reader.project_by_slug("pixel-forge").await.unwrap().is_none());
        assert!(reader.projects_by_creator("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committed_writer_persists() {
        let store = MemoryStore::new();
        let p = project("pixel-forge", "u1");

        let mut tx = store.begin().await.unwrap();
        tx.insert_project(&p).await.unwrap();
        tx.set_comment_count(p.id, 3).await.unwrap();
        tx.commit().await.unwrap();

        let mut reader = store.snapshot().await.unwrap();
        let stored = reader.project(p.id).await.unwrap().unwrap();
        assert_eq!(stored.comment_count, 3);
    }

    #[tokio::test]
    async fn duplicate_slug_is_a_conflict() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_project(&project("same", "u1")).await.unwrap();
        let err = tx.insert_project(&project("same", "u2")).await.unwrap_err();
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_vote_key_is_rejected() {
        let store = MemoryStore::new();
        let p = project("p", "u1");
        let vote = Vote {
            id: Uuid::now_v7(),
            project_id: p.id,
            voter_id: "u2".into(),
            kind: VoteKind::Project,
            target_id: p.id,
            created_at: now(),
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_project(&p).await.unwrap();
        tx.insert_vote(&vote).await.unwrap();
        let again = Vote { id: Uuid::now_v7(), ..vote.clone() };
        let err = tx.insert_vote(&again).await.unwrap_err();
        assert!(matches!(AppError::from(err), AppError::AlreadyVoted(_)));
        assert!(tx.find_vote("u2", Target::Project(p.id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reply_index_tracks_deletes() {
        let store = MemoryStore::new();
        let p = project("p", "u1");
        let root = reply(p.id, None);
        let child = reply(p.id, Some(&root));

        let mut tx = store.begin().await.unwrap();
        tx.insert_project(&p).await.unwrap();
        tx.insert_comment(&root).await.unwrap();
        tx.insert_comment(&child).await.unwrap();
        assert_eq!(tx.replies(root.id).await.unwrap(), vec![child.clone()]);

        assert!(tx.delete_comment(child.id).await.unwrap());
        assert!(!tx.delete_comment(child.id).await.unwrap());
        assert!(tx.replies(root.id).await.unwrap().is_empty());
        assert_eq!(tx.comments_by_project(p.id).await.unwrap(), vec![root]);
    }

    #[tokio::test]
    async fn patching_missing_project_is_not_found() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .patch_project(Uuid::now_v7(), &ProjectPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(AppError::from(err), AppError::NotFound(..)));
    }
}
