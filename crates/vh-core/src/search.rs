//! Title tokenizing shared by the store-backed title index and backends.

use crate::models::ProjectId;
use crate::traits::{EntityStore, TitleIndex};
use async_trait::async_trait;
use std::sync::Arc;

/// Lowercased alphanumeric runs of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// True when every token is a prefix of some word of `title`.
pub fn title_matches(title: &str, tokens: &[String]) -> bool {
    let words = tokenize(title);
    tokens
        .iter()
        .all(|token| words.iter().any(|word| word.starts_with(token.as_str())))
}

/// `TitleIndex` answered straight from the entity store.
pub struct StoreTitleIndex {
    store: Arc<dyn EntityStore>,
}

impl StoreTitleIndex {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TitleIndex for StoreTitleIndex {
    async fn matching_ids(&self, term: &str) -> anyhow::Result<Vec<ProjectId>> {
        let tokens = tokenize(term);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let mut reader = self.store.snapshot().await?;
        let hits = reader.search_titles(&tokens).await?;
        Ok(hits.into_iter().map(|p| p.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_on_punctuation() {
        assert_eq!(tokenize("Rust-based CLI, v2!"), vec!["rust", "based", "cli", "v2"]);
    }

    #[test]
    fn matches_word_prefixes() {
        let tokens = tokenize("pix edit");
        assert!(title_matches("Pixel Editor", &tokens));
        assert!(!title_matches("Pixel Viewer", &tokens));
        assert!(!title_matches("Unpixelated editor", &tokens));
    }
}
