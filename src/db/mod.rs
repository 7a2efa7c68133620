//! Relational store access.
//!
//! This module is split into two submodules:
//! - `model`: query parameter types (the creation-time window).
//! - `repo`: `PgStore`, the Postgres implementation of [`RelationalStore`].
//!
//! The repair pipelines only see the [`RelationalStore`] trait so they can be
//! driven by a recording fake in tests.

pub mod model;
pub mod repo;

use crate::model::{BrokenRecord, Post};
use anyhow::Result;
use async_trait::async_trait;

pub use model::CreatedRange;
pub use repo::{connect, PgStore};

/// Operations the repair pipelines need from the relational store.
///
/// Methods ending in `_tx` run inside a transaction opened with [`begin`](Self::begin).
#[async_trait]
pub trait RelationalStore: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    async fn rollback(&self, tx: Self::Tx) -> Result<()>;

    /// Posts created inside `range` (inclusive), oldest first.
    async fn posts_created_between(&self, range: &CreatedRange) -> Result<Vec<Post>>;

    async fn post_by_old_id(&self, old_id: &str, publisher: &str) -> Result<Option<Post>>;

    /// Key of the lowest-ordered author associated with the post.
    async fn author_key_for_post(&self, post_id: &str) -> Result<Option<String>>;

    async fn update_post_url(&self, post_id: &str, full_url: &str) -> Result<()>;

    /// Persist `post.full_url` and `post.author_id`.
    async fn update_post_url_and_author_tx(&self, tx: &mut Self::Tx, post: &Post) -> Result<()>;

    async fn clear_post_authors_tx(&self, tx: &mut Self::Tx, post_id: &str) -> Result<()>;

    async fn insert_post_author_tx(
        &self,
        tx: &mut Self::Tx,
        post_id: &str,
        author_id: &str,
        order_number: i32,
    ) -> Result<()>;

    /// Backlog rows awaiting a cross-reference repair.
    async fn broken_records(&self) -> Result<Vec<BrokenRecord>>;
}
