#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use post_url_repair::config::{self, Config};
use post_url_repair::db::{CreatedRange, RelationalStore};
use post_url_repair::model::{Author, BrokenRecord, DocumentPatch, Post};
use post_url_repair::report::{Event, ReportSink};
use post_url_repair::search::SearchIndex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

pub fn test_config() -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.repair.chunk_size = 2;
    cfg
}

pub fn post(id: &str, full_url: &str) -> Post {
    Post {
        id: id.into(),
        title: format!("Post {}", id),
        key: format!("post-{}", id),
        full_url: full_url.into(),
        created_by: "someone".into(),
        created_at: Utc.with_ymd_and_hms(2023, 3, 1, 10, 0, 0).unwrap(),
        author_id: None,
    }
}

pub fn author(uuid: &str, key: &str) -> Author {
    Author {
        uuid: uuid.into(),
        email: format!("{}@example.com", key),
        name: key.to_uppercase(),
        key: key.into(),
        avatar: String::new(),
        is_brand: false,
    }
}

pub fn broken(old_id: &str, author_id: &str, created_by: &str) -> BrokenRecord {
    BrokenRecord {
        old_id: old_id.into(),
        author_id: author_id.into(),
        author_key: String::new(),
        created_by: created_by.into(),
        creator_key: String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Begin(u32),
    Commit(u32),
    Rollback(u32),
    UpdateUrl { post_id: String, full_url: String },
    UpdatePost { tx: u32, post: Post },
    ClearAuthors { tx: u32, post_id: String },
    InsertAuthor { tx: u32, post_id: String, author_id: String, order: i32 },
}

impl StoreOp {
    fn tx(&self) -> Option<u32> {
        match self {
            StoreOp::UpdatePost { tx, .. }
            | StoreOp::ClearAuthors { tx, .. }
            | StoreOp::InsertAuthor { tx, .. } => Some(*tx),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct StoreState {
    pub posts: Vec<Post>,
    pub author_keys: HashMap<String, String>,
    pub legacy_posts: HashMap<String, Post>,
    pub broken: Vec<BrokenRecord>,
    /// `(operation, id)` pairs that should fail.
    pub failures: HashSet<(&'static str, String)>,
    pub ops: Vec<StoreOp>,
    next_tx: u32,
}

/// In-memory store that records every write.
#[derive(Clone, Default)]
pub struct FakeStore {
    pub state: Arc<Mutex<StoreState>>,
}

impl FakeStore {
    pub async fn fail(&self, op: &'static str, id: &str) {
        self.state.lock().await.failures.insert((op, id.to_string()));
    }

    pub async fn ops(&self) -> Vec<StoreOp> {
        self.state.lock().await.ops.clone()
    }

    /// Writes that belong to committed transactions.
    pub async fn committed_writes(&self) -> Vec<StoreOp> {
        let ops = self.ops().await;
        let committed: HashSet<u32> = ops
            .iter()
            .filter_map(|op| match op {
                StoreOp::Commit(tx) => Some(*tx),
                _ => None,
            })
            .collect();
        ops.into_iter()
            .filter(|op| op.tx().map_or(false, |tx| committed.contains(&tx)))
            .collect()
    }

    pub async fn count(&self, pred: impl Fn(&StoreOp) -> bool) -> usize {
        self.ops().await.iter().filter(|op| pred(op)).count()
    }
}

fn check(state: &StoreState, op: &'static str, id: &str) -> Result<()> {
    if state.failures.contains(&(op, id.to_string())) {
        Err(anyhow!("{} failed for {}", op, id))
    } else {
        Ok(())
    }
}

#[async_trait]
impl RelationalStore for FakeStore {
    type Tx = u32;

    async fn begin(&self) -> Result<u32> {
        let mut st = self.state.lock().await;
        check(&st, "begin", "")?;
        st.next_tx += 1;
        let tx = st.next_tx;
        st.ops.push(StoreOp::Begin(tx));
        Ok(tx)
    }

    async fn commit(&self, tx: u32) -> Result<()> {
        let mut st = self.state.lock().await;
        check(&st, "commit", &tx.to_string())?;
        st.ops.push(StoreOp::Commit(tx));
        Ok(())
    }

    async fn rollback(&self, tx: u32) -> Result<()> {
        self.state.lock().await.ops.push(StoreOp::Rollback(tx));
        Ok(())
    }

    async fn posts_created_between(&self, range: &CreatedRange) -> Result<Vec<Post>> {
        let st = self.state.lock().await;
        check(&st, "fetch", "")?;
        Ok(st
            .posts
            .iter()
            .filter(|p| p.created_at >= range.start && p.created_at <= range.end)
            .cloned()
            .collect())
    }

    async fn post_by_old_id(&self, old_id: &str, _publisher: &str) -> Result<Option<Post>> {
        let st = self.state.lock().await;
        check(&st, "post_by_old_id", old_id)?;
        Ok(st.legacy_posts.get(old_id).cloned())
    }

    async fn author_key_for_post(&self, post_id: &str) -> Result<Option<String>> {
        let st = self.state.lock().await;
        check(&st, "author_key", post_id)?;
        Ok(st.author_keys.get(post_id).cloned())
    }

    async fn update_post_url(&self, post_id: &str, full_url: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        check(&st, "update_url", post_id)?;
        st.ops.push(StoreOp::UpdateUrl {
            post_id: post_id.into(),
            full_url: full_url.into(),
        });
        Ok(())
    }

    async fn update_post_url_and_author_tx(&self, tx: &mut u32, post: &Post) -> Result<()> {
        let mut st = self.state.lock().await;
        check(&st, "update_post", &post.id)?;
        st.ops.push(StoreOp::UpdatePost {
            tx: *tx,
            post: post.clone(),
        });
        Ok(())
    }

    async fn clear_post_authors_tx(&self, tx: &mut u32, post_id: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        check(&st, "clear_authors", post_id)?;
        st.ops.push(StoreOp::ClearAuthors {
            tx: *tx,
            post_id: post_id.into(),
        });
        Ok(())
    }

    async fn insert_post_author_tx(
        &self,
        tx: &mut u32,
        post_id: &str,
        author_id: &str,
        order_number: i32,
    ) -> Result<()> {
        let mut st = self.state.lock().await;
        check(&st, "insert_author", post_id)?;
        st.ops.push(StoreOp::InsertAuthor {
            tx: *tx,
            post_id: post_id.into(),
            author_id: author_id.into(),
            order: order_number,
        });
        Ok(())
    }

    async fn broken_records(&self) -> Result<Vec<BrokenRecord>> {
        let st = self.state.lock().await;
        check(&st, "fetch", "")?;
        Ok(st.broken.clone())
    }
}

#[derive(Debug, Clone)]
pub struct UpdateCall {
    pub index: String,
    pub doc_id: String,
    pub patch: DocumentPatch,
}

#[derive(Debug, Default)]
pub struct IndexState {
    pub authors: HashMap<String, Author>,
    pub failing_updates: HashSet<String>,
    pub failing_lookups: HashSet<String>,
    pub updates: Vec<UpdateCall>,
}

/// Search index fake that records document updates.
#[derive(Clone, Default)]
pub struct RecordingIndex {
    pub state: Arc<Mutex<IndexState>>,
}

impl RecordingIndex {
    pub async fn with_authors(authors: Vec<Author>) -> Self {
        let index = Self::default();
        {
            let mut st = index.state.lock().await;
            for a in authors {
                st.authors.insert(a.uuid.clone(), a);
            }
        }
        index
    }

    pub async fn updates(&self) -> Vec<UpdateCall> {
        self.state.lock().await.updates.clone()
    }
}

#[async_trait]
impl SearchIndex for RecordingIndex {
    async fn update_document(&self, index: &str, doc_id: &str, patch: &DocumentPatch) -> Result<()> {
        let mut st = self.state.lock().await;
        if st.failing_updates.contains(doc_id) {
            return Err(anyhow!("search bulk update failed: document {} missing", doc_id));
        }
        st.updates.push(UpdateCall {
            index: index.into(),
            doc_id: doc_id.into(),
            patch: patch.clone(),
        });
        Ok(())
    }

    async fn author_by_id(&self, author_id: &str) -> Result<Option<Author>> {
        let st = self.state.lock().await;
        if st.failing_lookups.contains(author_id) {
            return Err(anyhow!("search get error 500 for {}", author_id));
        }
        Ok(st.authors.get(author_id).cloned())
    }
}

/// Keeps a debug rendering of every event.
#[derive(Default)]
pub struct RecordingSink {
    pub events: std::sync::Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ReportSink for RecordingSink {
    fn report(&self, event: &Event<'_>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}
