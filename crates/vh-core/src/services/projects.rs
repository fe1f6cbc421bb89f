//! # Project Lifecycle Manager
//!
//! Slugged project submissions, creator-only edits, and project deletion
//! sweeping every comment and vote that hangs off the project.

use crate::error::{AppError, Entity, Result};
use crate::models::{now, Actor, CascadeReport, NewProject, Project, ProjectId, ProjectPatch, Target};
use crate::search::StoreTitleIndex;
use crate::services::votes::sweep_votes;
use crate::slug::{slugify, unique_slug};
use crate::traits::{EntityStore, TitleIndex};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Trims tags, drops blanks and duplicates (first occurrence wins).
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
        .collect()
}

fn normalize_refs(refs: Vec<String>) -> Vec<String> {
    refs.into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

fn require_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(AppError::ValidationError("project title must not be blank".into()));
    }
    Ok(())
}

pub struct ProjectLifecycle {
    store: Arc<dyn EntityStore>,
    index: Arc<dyn TitleIndex>,
}

impl ProjectLifecycle {
    /// Uses the store itself as the title index.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        let index = Arc::new(StoreTitleIndex::new(store.clone()));
        Self::with_title_index(store, index)
    }

    pub fn with_title_index(store: Arc<dyn EntityStore>, index: Arc<dyn TitleIndex>) -> Self {
        Self { store, index }
    }

    /// Same store, different title index.
    pub fn replace_title_index(self, index: Arc<dyn TitleIndex>) -> Self {
        Self { index, ..self }
    }

    /// Submits a project under a fresh unique slug with zeroed counters.
    pub async fn create(&self, actor: &Actor, new: NewProject) -> Result<Project> {
        require_title(&new.title)?;
        let base = slugify(&new.title);

        let mut tx = self.store.begin().await?;
        let slug = unique_slug(tx.as_mut(), &base).await?;
        let project = Project {
            id: Uuid::now_v7(),
            title: new.title,
            slug,
            description: new.description,
            main_image: new.main_image,
            screenshots: normalize_refs(new.screenshots),
            link: new.link,
            tags: normalize_tags(new.tags),
            creator_id: actor.user_id.clone(),
            creator_name: actor.display_name.clone(),
            creator_avatar: actor.avatar.clone(),
            vote_count: 0,
            comment_count: 0,
            created_at: now(),
        };
        tx.insert_project(&project).await?;
        tx.commit().await?;

        info!(project = %project.id, slug = %project.slug, creator = %project.creator_id, "project created");
        Ok(project)
    }

    pub async fn get(&self, id: ProjectId) -> Result<Project> {
        let mut reader = self.store.snapshot().await?;
        reader
            .project(id)
            .await?
            .ok_or_else(|| AppError::project_not_found(id))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Project> {
        let mut reader = self.store.snapshot().await?;
        reader
            .project_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound(Entity::Project, slug.to_string()))
    }

    /// Most voted first.
    pub async fn list_by_votes(&self) -> Result<Vec<Project>> {
        let mut reader = self.store.snapshot().await?;
        Ok(reader.projects_by_votes().await?)
    }

    /// Newest first.
    pub async fn list_by_creator(&self, creator_id: &str) -> Result<Vec<Project>> {
        let mut reader = self.store.snapshot().await?;
        Ok(reader.projects_by_creator(creator_id).await?)
    }

    /// Title search (all projects for a blank term), narrowed to projects
    /// sharing at least one of `tags` when any are given, most voted first.
    pub async fn search(&self, term: &str, tags: &[String]) -> Result<Vec<Project>> {
        let mut projects = if term.trim().is_empty() {
            let mut reader = self.store.snapshot().await?;
            reader.projects_by_votes().await?
        } else {
            let ids = self.index.matching_ids(term).await?;
            let mut reader = self.store.snapshot().await?;
            let mut seen = HashSet::new();
            let mut hits = Vec::with_capacity(ids.len());
            for id in ids {
                if !seen.insert(id) {
                    continue;
                }
                // The index may lag behind deletions.
                if let Some(project) = reader.project(id).await? {
                    hits.push(project);
                }
            }
            hits
        };

        let wanted = normalize_tags(tags.to_vec());
        if !wanted.is_empty() {
            projects.retain(|p| p.tags.iter().any(|tag| wanted.contains(tag)));
        }
        projects.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
        Ok(projects)
    }

    /// Applies the supplied fields. The slug is never regenerated.
    pub async fn update(&self, actor: &Actor, id: ProjectId, patch: ProjectPatch) -> Result<Project> {
        let mut tx = self.store.begin().await?;
        let project = tx
            .project(id)
            .await?
            .ok_or_else(|| AppError::project_not_found(id))?;
        if project.creator_id != actor.user_id {
            return Err(AppError::Forbidden("only the creator can update this project".into()));
        }
        if let Some(title) = &patch.title {
            require_title(title)?;
        }
        if patch.is_empty() {
            return Ok(project);
        }

        let patch = ProjectPatch {
            screenshots: patch.screenshots.map(normalize_refs),
            tags: patch.tags.map(normalize_tags),
            ..patch
        };
        let updated = tx.patch_project(id, &patch).await?;
        tx.commit().await?;

        info!(project = %id, "project updated");
        Ok(updated)
    }

    /// Deletes the project with all of its votes and comments in one unit of work.
    pub async fn delete(&self, actor: &Actor, id: ProjectId) -> Result<CascadeReport> {
        let mut tx = self.store.begin().await?;
        let project = tx
            .project(id)
            .await?
            .ok_or_else(|| AppError::project_not_found(id))?;
        if project.creator_id != actor.user_id {
            return Err(AppError::Forbidden("only the creator can delete this project".into()));
        }

        let mut report = CascadeReport::default();
        for vote in tx.votes_by_project(id).await? {
            if tx.delete_vote(vote.id).await? {
                report.votes += 1;
            }
        }
        for comment in tx.comments_by_project(id).await? {
            // Catches comment votes filed under another project id.
            report.votes += sweep_votes(tx.as_mut(), Target::Comment(comment.id)).await?;
            if tx.delete_comment(comment.id).await? {
                report.comments += 1;
            }
        }
        tx.delete_project(id).await?;
        tx.commit().await?;

        info!(
            project = %id,
            comments = report.comments,
            votes = report.votes,
            "project deleted"
        );
        Ok(report)
    }

    /// Gives every slug-less project a unique slug. Returns how many changed.
    pub async fn backfill_slugs(&self) -> Result<usize> {
        let mut tx = self.store.begin().await?;
        let pending = tx.projects_without_slug().await?;
        for project in &pending {
            let slug = unique_slug(tx.as_mut(), &slugify(&project.title)).await?;
            tx.set_project_slug(project.id, &slug).await?;
            debug!(project = %project.id, %slug, "slug assigned");
        }
        tx.commit().await?;

        if !pending.is_empty() {
            info!(count = pending.len(), "backfilled project slugs");
        }
        Ok(pending.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::traits::MockTitleIndex;

    fn submission(title: &str, tags: &[&str]) -> NewProject {
        NewProject {
            title: title.into(),
            description: "a thing".into(),
            main_image: "img/main.png".into(),
            screenshots: vec!["img/1.png".into(), "  ".into()],
            link: "https://example.com".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn lifecycle() -> (ProjectLifecycle, Arc<dyn EntityStore>) {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        (ProjectLifecycle::new(store.clone()), store)
    }

    #[test]
    fn tags_are_normalized() {
        let tags = vec![" rust ".into(), "".into(), "cli".into(), "rust".into()];
        assert_eq!(normalize_tags(tags), vec!["rust", "cli"]);
    }

    #[tokio::test]
    async fn colliding_titles_get_numbered_slugs() {
        let (projects, _) = lifecycle();
        let owner = Actor::new("u1", "Ada");

        let first = projects.create(&owner, submission("Hello, World!!!", &[])).await.unwrap();
        let second = projects.create(&owner, submission("Hello World", &[])).await.unwrap();
        let third = projects.create(&owner, submission("hello-world", &[])).await.unwrap();

        assert_eq!(first.slug, "hello-world");
        assert_eq!(second.slug, "hello-world-1");
        assert_eq!(third.slug, "hello-world-2");
        assert_eq!(first.screenshots, vec!["img/1.png"]);
        assert_eq!((first.vote_count, first.comment_count), (0, 0));
        assert_eq!(projects.get_by_slug("hello-world-1").await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let (projects, _) = lifecycle();
        let err = projects
            .create(&Actor::new("u1", "Ada"), submission("  ", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn update_is_creator_only_and_keeps_the_slug() {
        let (projects, _) = lifecycle();
        let owner = Actor::new("u1", "Ada");
        let project = projects.create(&owner, submission("Old Name", &["a"])).await.unwrap();

        let patch = ProjectPatch {
            title: Some("New Name".into()),
            tags: Some(vec!["b".into(), "b".into()]),
            ..Default::default()
        };
        let err = projects
            .update(&Actor::new("u2", "Bob"), project.id, patch.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let updated = projects.update(&owner, project.id, patch).await.unwrap();
        assert_eq!(updated.title, "New Name");
        assert_eq!(updated.slug, "old-name");
        assert_eq!(updated.tags, vec!["b"]);
        assert_eq!(updated.description, project.description);
    }

    #[tokio::test]
    async fn update_of_missing_project_is_not_found() {
        let (projects, _) = lifecycle();
        let err = projects
            .update(&Actor::new("u1", "Ada"), Uuid::now_v7(), ProjectPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(Entity::Project, _)));
    }

    #[tokio::test]
    async fn search_filters_by_tags_and_sorts_by_votes() {
        let (projects, store) = lifecycle();
        let owner = Actor::new("u1", "Ada");
        let cli = projects.create(&owner, submission("Rust CLI", &["rust", "cli"])).await.unwrap();
        let web = projects.create(&owner, submission("Rust Web", &["web"])).await.unwrap();
        projects.create(&owner, submission("Go Tool", &["go"])).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.set_vote_count(Target::Project(web.id), 4).await.unwrap();
        tx.commit().await.unwrap();

        let hits = projects.search("rust", &[]).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![web.id, cli.id]);

        let tagged = projects.search("", &["cli".into(), "go".into()]).await.unwrap();
        assert_eq!(tagged.len(), 2);
        assert!(tagged.iter().all(|p| p.id != web.id));
    }

    #[tokio::test]
    async fn search_delegates_to_the_title_index() {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let plain = ProjectLifecycle::new(store.clone());
        let owner = Actor::new("u1", "Ada");
        let project = plain.create(&owner, submission("Anything", &[])).await.unwrap();

        let mut index = MockTitleIndex::new();
        let hit = project.id;
        index
            .expect_matching_ids()
            .withf(|term| term == "zebra")
            .times(1)
            .returning(move |_| Ok(vec![hit, hit, Uuid::now_v7()]));
        let projects = ProjectLifecycle::with_title_index(store, Arc::new(index));

        let hits = projects.search("zebra", &[]).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, project.id);
    }

    #[tokio::test]
    async fn backfill_assigns_unique_slugs() {
        let (projects, store) = lifecycle();
        let owner = Actor::new("u1", "Ada");
        let taken = projects.create(&owner, submission("Legacy", &[])).await.unwrap();

        let mut legacy = taken.clone();
        legacy.id = Uuid::now_v7();
        legacy.slug = String::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_project(&legacy).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(projects.backfill_slugs().await.unwrap(), 1);
        assert_eq!(projects.get(legacy.id).await.unwrap().slug, "legacy-1");
        assert_eq!(projects.backfill_slugs().await.unwrap(), 0);
    }
}
