//! URL mode: rewrite the author key in the URLs of posts created in a window.
//!
//! Each post is handled as independent steps (resolve key, rewrite, update
//! the relational row, mirror to the search index). A step that fails stops
//! that post only. The relational update is not undone when the mirror fails.
//!
//! Posts whose URL already carries the canonical key skip the rewrite and the
//! relational update but are mirrored again, so a re-run heals an index that
//! missed an earlier mirror and never rewrites a URL twice.

use super::{Outcome, RepairError, Repaired, RunTracker};
use crate::chunk::chunk;
use crate::config::Config;
use crate::db::{CreatedRange, RelationalStore};
use crate::model::{DocumentPatch, Post, UnfixedItem, UrlPatch};
use crate::report::{RepairMode, RepairSummary, ReportSink};
use crate::search::SearchIndex;
use crate::slug;
use anyhow::anyhow;
use tracing::{info, instrument};

const NO_AUTHOR: &str = "cannot find author for this post";
const BAD_URL: &str = "failed fixing url for this post";
const DB_UPDATE: &str = "failed updating DB data for this post";
const INDEX_UPDATE: &str = "failed updating search index data for this post";
const ALREADY_CANONICAL: &str = "url already carries the canonical author key";

/// Repair the URLs of every post created inside `range`.
#[instrument(skip_all, fields(start = %range.start, end = %range.end))]
pub async fn repair_urls<S, I>(
    store: &S,
    index: &I,
    cfg: &Config,
    range: &CreatedRange,
    sink: &dyn ReportSink,
) -> Result<RepairSummary, RepairError>
where
    S: RelationalStore,
    I: SearchIndex + ?Sized,
{
    let posts = store
        .posts_created_between(range)
        .await
        .map_err(RepairError::Fetch)?;
    info!(posts = posts.len(), "fetched candidate posts");

    let chunks = chunk(&posts, cfg.repair.chunk_size);
    let mut tracker = RunTracker::start(
        sink,
        RepairMode::Url,
        posts.len(),
        cfg.repair.chunk_size,
        chunks.len(),
    );

    for (ci, batch) in chunks.iter().enumerate() {
        tracker.chunk_started(ci + 1, chunks.len());
        for (i, post) in batch.iter().enumerate() {
            tracker.item_started(i + 1, batch.len());
            let result = repair_post(store, index, &cfg.search.post_index, post).await;
            tracker.record(result);
        }
        tracker.chunk_finished(ci + 1);
    }

    tracker.finish()
}

async fn repair_post<S, I>(
    store: &S,
    index: &I,
    post_index: &str,
    post: &Post,
) -> Result<Outcome, UnfixedItem>
where
    S: RelationalStore,
    I: SearchIndex + ?Sized,
{
    let fail = |reason: &str, err: anyhow::Error| UnfixedItem::new(&post.id, reason, format!("{:#}", err));

    let author_key = match store.author_key_for_post(&post.id).await {
        Ok(Some(key)) if !key.trim().is_empty() => key,
        Ok(_) => return Err(fail(NO_AUTHOR, anyhow!("post has no author key"))),
        Err(err) => return Err(fail(NO_AUTHOR, err)),
    };

    if slug::author_key(&post.full_url) == Some(author_key.as_str()) {
        mirror(index, post_index, &post.id, &post.full_url)
            .await
            .map_err(|err| fail(INDEX_UPDATE, err))?;
        return Ok(Outcome::Skipped {
            item_id: post.id.clone(),
            reason: ALREADY_CANONICAL,
        });
    }

    let fixed_url = slug::rewrite(&post.full_url, &author_key).map_err(|err| fail(BAD_URL, err.into()))?;

    store
        .update_post_url(&post.id, &fixed_url)
        .await
        .map_err(|err| fail(DB_UPDATE, err))?;

    mirror(index, post_index, &post.id, &fixed_url)
        .await
        .map_err(|err| fail(INDEX_UPDATE, err))?;

    Ok(Outcome::Repaired(Repaired {
        item_id: post.id.clone(),
        author_key,
        old_url: post.full_url.clone(),
        new_url: fixed_url,
    }))
}

async fn mirror<I>(index: &I, post_index: &str, post_id: &str, url: &str) -> anyhow::Result<()>
where
    I: SearchIndex + ?Sized,
{
    let patch = DocumentPatch::Url(UrlPatch::new(url));
    index.update_document(post_index, post_id, &patch).await
}
