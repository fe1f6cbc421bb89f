//! vibehunt/crates/vh-core/src/lib.rs
//!
//! The central domain logic and interface definitions for the showcase:
//! projects, depth-bounded comment threads, and the vote ledger.

pub mod error;
pub mod models;
pub mod search;
pub mod services;
pub mod slug;
pub mod store;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use services::{CommentTree, ProjectLifecycle, VoteLedger};
pub use traits::*;

use std::sync::Arc;

/// The three managers over one shared store, as handed to the API layer.
pub struct Showcase {
    pub projects: ProjectLifecycle,
    pub comments: CommentTree,
    pub votes: VoteLedger,
}

impl Showcase {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self::with_max_depth(store, MAX_COMMENT_DEPTH)
    }

    pub fn with_max_depth(store: Arc<dyn EntityStore>, max_depth: u32) -> Self {
        Self {
            projects: ProjectLifecycle::new(store.clone()),
            comments: CommentTree::with_max_depth(store.clone(), max_depth),
            votes: VoteLedger::new(store),
        }
    }

    /// Swaps in an external title search collaborator.
    pub fn with_title_index(self, index: Arc<dyn TitleIndex>) -> Self {
        Self {
            projects: self.projects.replace_title_index(index),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn facade_shares_one_store() {
        let showcase = Showcase::new(Arc::new(MemoryStore::new()));
        let actor = Actor::new("u1", "Ada");
        let project = showcase
            .projects
            .create(&actor, NewProject { title: "Shared".into(), ..Default::default() })
            .await
            .unwrap();

        showcase.votes.vote_for_project(&actor, project.id).await.unwrap();
        assert_eq!(showcase.projects.get(project.id).await.unwrap().vote_count, 1);
        assert_eq!(showcase.comments.max_depth(), MAX_COMMENT_DEPTH);
    }

    #[tokio::test]
    async fn swapped_title_index_keeps_the_shared_store() {
        let mut index = MockTitleIndex::new();
        let showcase = Showcase::new(Arc::new(MemoryStore::new()));
        let actor = Actor::new("u1", "Ada");
        let project = showcase
            .projects
            .create(&actor, NewProject { title: "Indexed".into(), ..Default::default() })
            .await
            .unwrap();

        let id = project.id;
        index.expect_matching_ids().returning(move |_| Ok(vec![id]));
        let showcase = showcase.with_title_index(Arc::new(index));

        showcase.votes.vote_for_project(&actor, project.id).await.unwrap();
        let hits = showcase.projects.search("anything", &[]).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].vote_count, 1);
    }
}
