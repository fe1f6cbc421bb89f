//! URL slug generation for project titles.

use crate::traits::StoreRead;

pub const MAX_SLUG_LEN: usize = 50;

/// Used when a title has no characters that survive slugging.
pub const FALLBACK_SLUG: &str = "project";

/// Derives the base slug: lowercase, `[a-z0-9-]` only, whitespace runs and
/// repeated hyphens collapsed to one hyphen, at most 50 characters.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_hyphen = false;

    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        }
    }

    // Output is ASCII, so byte truncation is a char boundary.
    slug.truncate(MAX_SLUG_LEN);
    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        trimmed.to_string()
    }
}

/// First of `base`, `base-1`, `base-2`, ... with no project behind it.
pub async fn unique_slug<R>(reader: &mut R, base: &str) -> anyhow::Result<String>
where
    R: StoreRead + ?Sized,
{
    let mut candidate = base.to_string();
    let mut counter = 1u32;
    while reader.project_by_slug(&candidate).await?.is_some() {
        candidate = format!("{base}-{counter}");
        counter += 1;
    }
    Ok(candidate)
}
