//! Records read from the stores and the partial documents sent to the search index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Post row as read from the relational store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub key: String,
    pub full_url: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub author_id: Option<String>,
}

/// Backlog row describing a legacy post whose identities need cross-referencing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokenRecord {
    pub old_id: String,
    pub author_id: String,
    pub author_key: String,
    pub created_by: String,
    pub creator_key: String,
}

/// Author document as stored in the search index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Author {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub is_brand: bool,
}

/// Partial document mirrored to the post index after a URL repair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlPatch {
    pub article_url: String,
    pub article_url_amp: String,
}

impl UrlPatch {
    pub fn new(article_url: &str) -> Self {
        Self {
            article_url: article_url.to_string(),
            article_url_amp: amp_url(article_url),
        }
    }
}

/// Partial document mirrored to the post index after a cross-reference repair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrossReferencePatch {
    pub article_url: String,
    pub article_url_amp: String,
    pub authors: Vec<Author>,
}

impl CrossReferencePatch {
    pub fn new(article_url: &str, author: Author) -> Self {
        Self {
            article_url: article_url.to_string(),
            article_url_amp: amp_url(article_url),
            authors: vec![author],
        }
    }
}

/// The closed set of partial updates the repair job sends to the search index.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DocumentPatch {
    Url(UrlPatch),
    CrossReference(CrossReferencePatch),
}

impl DocumentPatch {
    pub fn article_url(&self) -> &str {
        match self {
            DocumentPatch::Url(p) => &p.article_url,
            DocumentPatch::CrossReference(p) => &p.article_url,
        }
    }
}

fn amp_url(article_url: &str) -> String {
    format!("{}/amp", article_url)
}

/// A work item that could not be repaired during a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnfixedItem {
    pub item_id: String,
    pub reason: String,
    pub error: String,
}

impl UnfixedItem {
    pub fn new(item_id: impl Into<String>, reason: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            item_id: item_id.into(),
            reason: reason.into(),
            error: error.to_string(),
        }
    }
}

impl fmt::Display for UnfixedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error fixing post {}, caused by: {}. Error: {}",
            self.item_id, self.reason, self.error
        )
    }
}
