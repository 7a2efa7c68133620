//! Cross-reference mode: repair backlog posts whose author and creator
//! identities must be resolved from the search index.
//!
//! All relational writes for one backlog row happen in a single transaction
//! that is committed only after the search index accepted the mirror. Any
//! failure once the transaction is open rolls it back.

use super::{Outcome, RepairError, Repaired, RunTracker};
use crate::chunk::chunk;
use crate::config::Config;
use crate::db::RelationalStore;
use crate::model::{Author, BrokenRecord, CrossReferencePatch, DocumentPatch, Post, UnfixedItem};
use crate::report::{RepairMode, RepairSummary, ReportSink};
use crate::search::SearchIndex;
use crate::slug;
use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};

const NO_AUTHOR: &str = "cannot find author of this post";
const NO_CREATOR: &str = "cannot find creator of this post";
const NO_POST: &str = "cannot find post with this old id";
const BEGIN: &str = "failed starting transaction";
const BAD_URL: &str = "failed generating fixed url for this post";
const DB_UPDATE: &str = "failed updating DB data for this post";
const FLUSH_AUTHORS: &str = "failed flushing post authors for this post";
const SET_AUTHOR: &str = "failed setting post author for this post";
const INDEX_UPDATE: &str = "failed updating search index data for this post";
const COMMIT: &str = "failed committing transaction";

/// Repair every row of the cross-reference backlog.
#[instrument(skip_all)]
pub async fn repair_cross_references<S, I>(
    store: &S,
    index: &I,
    cfg: &Config,
    sink: &dyn ReportSink,
) -> Result<RepairSummary, RepairError>
where
    S: RelationalStore,
    I: SearchIndex + ?Sized,
{
    let records = store.broken_records().await.map_err(RepairError::Fetch)?;
    info!(records = records.len(), "fetched cross-reference backlog");

    let chunks = chunk(&records, cfg.repair.chunk_size);
    let mut tracker = RunTracker::start(
        sink,
        RepairMode::CrossReference,
        records.len(),
        cfg.repair.chunk_size,
        chunks.len(),
    );

    for (ci, batch) in chunks.iter().enumerate() {
        tracker.chunk_started(ci + 1, chunks.len());
        for (i, record) in batch.iter().enumerate() {
            tracker.item_started(i + 1, batch.len());
            let result = repair_record(store, index, cfg, record).await;
            tracker.record(result);
        }
        tracker.chunk_finished(ci + 1);
    }

    tracker.finish()
}

fn failure(record: &BrokenRecord, reason: &str, err: impl Into<anyhow::Error>) -> UnfixedItem {
    UnfixedItem::new(&record.old_id, reason, format!("{:#}", err.into()))
}

async fn resolve_author<I>(
    index: &I,
    record: &BrokenRecord,
    author_id: &str,
    reason: &str,
) -> Result<Author, UnfixedItem>
where
    I: SearchIndex + ?Sized,
{
    match index.author_by_id(author_id).await {
        Ok(Some(author)) => Ok(author),
        Ok(None) => Err(failure(
            record,
            reason,
            anyhow!("author {} not found in search index", author_id),
        )),
        Err(err) => Err(failure(record, reason, err)),
    }
}

async fn repair_record<S, I>(
    store: &S,
    index: &I,
    cfg: &Config,
    record: &BrokenRecord,
) -> Result<Outcome, UnfixedItem>
where
    S: RelationalStore,
    I: SearchIndex + ?Sized,
{
    let author = resolve_author(index, record, &record.author_id, NO_AUTHOR).await?;
    let creator = resolve_author(index, record, &record.created_by, NO_CREATOR).await?;

    let mut post = match store.post_by_old_id(&record.old_id, &cfg.repair.publisher).await {
        Ok(Some(post)) => post,
        Ok(None) => {
            return Err(failure(
                record,
                NO_POST,
                anyhow!("no {} post with old id {}", cfg.repair.publisher, record.old_id),
            ))
        }
        Err(err) => return Err(failure(record, NO_POST, err)),
    };
    let old_url = post.full_url.clone();

    let mut tx = store.begin().await.map_err(|err| failure(record, BEGIN, err))?;

    let applied = apply(store, index, cfg, &mut tx, record, &mut post, &author, &creator).await;
    if let Err(item) = applied {
        if let Err(err) = store.rollback(tx).await {
            warn!(old_id = %record.old_id, ?err, "rollback failed");
        }
        return Err(item);
    }

    store
        .commit(tx)
        .await
        .map_err(|err| failure(record, COMMIT, err))?;

    Ok(Outcome::Repaired(Repaired {
        item_id: post.id,
        author_key: author.key,
        old_url,
        new_url: post.full_url,
    }))
}

/// Transactional part of a repair: rewrite, update rows, mirror.
#[allow(clippy::too_many_arguments)]
async fn apply<S, I>(
    store: &S,
    index: &I,
    cfg: &Config,
    tx: &mut S::Tx,
    record: &BrokenRecord,
    post: &mut Post,
    author: &Author,
    creator: &Author,
) -> Result<(), UnfixedItem>
where
    S: RelationalStore,
    I: SearchIndex + ?Sized,
{
    let fixed_url = slug::rewrite(&post.full_url, &author.key).map_err(|err| failure(record, BAD_URL, err))?;

    post.full_url = fixed_url.clone();
    post.created_by = creator.key.clone();
    post.author_id = Some(author.key.clone());
    debug!(post_id = %post.id, creator = %post.created_by, "post updated in memory");

    store
        .update_post_url_and_author_tx(tx, post)
        .await
        .map_err(|err| failure(record, DB_UPDATE, err))?;

    store
        .clear_post_authors_tx(tx, &post.id)
        .await
        .map_err(|err| failure(record, FLUSH_AUTHORS, err))?;

    store
        .insert_post_author_tx(tx, &post.id, &author.key, 0)
        .await
        .map_err(|err| failure(record, SET_AUTHOR, err))?;

    let patch = DocumentPatch::CrossReference(CrossReferencePatch::new(&fixed_url, author.clone()));
    index
        .update_document(&cfg.search.post_index, &post.id, &patch)
        .await
        .map_err(|err| failure(record, INDEX_UPDATE, err))?;

    Ok(())
}
