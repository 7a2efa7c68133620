//! Slug rewriting for post URLs.
//!
//! A post URL ends in a hyphen-delimited slug shaped like
//! `title-words-<author key>-<numeric id>`. Repairs replace the author key
//! component and leave everything else untouched.
use thiserror::Error;

/// Minimum number of hyphen-separated components in a repairable slug.
pub const MIN_SLUG_COMPONENTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("empty or unparseable URL")]
    EmptyOrUnparseable,
    #[error("insufficient slug components: found {found}, need at least {MIN_SLUG_COMPONENTS}")]
    InsufficientComponents { found: usize },
}

/// Replace the author key in the trailing slug of `url` with `new_author_key`.
pub fn rewrite(url: &str, new_author_key: &str) -> Result<String, SlugError> {
    let (prefix, last_segment) = split_last_segment(url)?;

    let mut parts: Vec<&str> = last_segment.split('-').collect();
    if parts.len() < MIN_SLUG_COMPONENTS {
        return Err(SlugError::InsufficientComponents { found: parts.len() });
    }
    let author_pos = parts.len() - 2;
    parts[author_pos] = new_author_key;

    Ok(format!("{}/{}", prefix, parts.join("-")))
}

/// Author key currently encoded in the slug of `url`, if the slug is well formed.
pub fn author_key(url: &str) -> Option<&str> {
    let (_, last_segment) = split_last_segment(url).ok()?;
    let parts: Vec<&str> = last_segment.split('-').collect();
    if parts.len() < MIN_SLUG_COMPONENTS {
        return None;
    }
    Some(parts[parts.len() - 2])
}

fn split_last_segment(url: &str) -> Result<(&str, &str), SlugError> {
    if url.is_empty() {
        return Err(SlugError::EmptyOrUnparseable);
    }
    url.rsplit_once('/').ok_or(SlugError::EmptyOrUnparseable)
}
