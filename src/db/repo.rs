use super::model::CreatedRange;
use super::RelationalStore;
use crate::budget::Budget;
use crate::model::{BrokenRecord, Post};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{info, instrument};

pub type Pool = PgPool;

/// Table holding the legacy rows that need a cross-reference repair.
const BACKLOG_TABLE: &str = "temp_popmama_csc";

const POST_COLUMNS: &str = "p.id::text AS id, p.title, p.key, p.full_url, \
     p.created_by::text AS created_by, p.created_at::timestamptz AS created_at, \
     p.author_id::text AS author_id";

/// Open a small pool and verify the server answers.
pub async fn connect(options: PgConnectOptions, budget: Budget) -> Result<Pool> {
    let pool = budget
        .run("connect to database", async {
            PgPoolOptions::new()
                .max_connections(2)
                .connect_with(options)
                .await
                .context("database connection failed")
        })
        .await?;
    budget
        .run("ping database", async {
            sqlx::query("SELECT 1")
                .execute(&pool)
                .await
                .context("database ping failed")
        })
        .await?;
    info!("database is connected");
    Ok(pool)
}

/// Postgres-backed [`RelationalStore`]. Every call is bounded by `budget`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Pool,
    budget: Budget,
}

impl PgStore {
    pub fn new(pool: Pool, budget: Budget) -> Self {
        Self { pool, budget }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

fn post_from_row(row: &PgRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row
            .try_get::<Option<String>, _>("title")?
            .unwrap_or_default(),
        key: row.try_get::<Option<String>, _>("key")?.unwrap_or_default(),
        full_url: row
            .try_get::<Option<String>, _>("full_url")?
            .unwrap_or_default(),
        created_by: row
            .try_get::<Option<String>, _>("created_by")?
            .unwrap_or_default(),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        author_id: row
            .try_get::<Option<String>, _>("author_id")?
            .filter(|s| !s.trim().is_empty()),
    })
}

#[async_trait]
impl RelationalStore for PgStore {
    type Tx = Transaction<'static, Postgres>;

    #[instrument(skip_all)]
    async fn begin(&self) -> Result<Self::Tx> {
        self.budget
            .run("begin transaction", async {
                self.pool.begin().await.context("failed to begin transaction")
            })
            .await
    }

    #[instrument(skip_all)]
    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        self.budget
            .run("commit transaction", async {
                tx.commit().await.context("failed to commit transaction")
            })
            .await
    }

    #[instrument(skip_all)]
    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        self.budget
            .run("rollback transaction", async {
                tx.rollback().await.context("failed to roll back transaction")
            })
            .await
    }

    #[instrument(skip_all)]
    async fn posts_created_between(&self, range: &CreatedRange) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p \
             WHERE p.created_at >= $1 AND p.created_at <= $2 \
             ORDER BY p.created_at ASC"
        );
        let rows = self
            .budget
            .run("fetch posts by creation time", async {
                sqlx::query(&sql)
                    .bind(range.start)
                    .bind(range.end)
                    .fetch_all(&self.pool)
                    .await
                    .context("failed to fetch posts by creation time")
            })
            .await?;
        rows.iter().map(post_from_row).collect()
    }

    #[instrument(skip_all)]
    async fn post_by_old_id(&self, old_id: &str, publisher: &str) -> Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.old_id::text = $1 AND p.publisher = $2");
        let row = self
            .budget
            .run("fetch post by old id", async {
                sqlx::query(&sql)
                    .bind(old_id)
                    .bind(publisher)
                    .fetch_optional(&self.pool)
                    .await
                    .with_context(|| format!("failed to fetch post with old id {}", old_id))
            })
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    #[instrument(skip_all)]
    async fn author_key_for_post(&self, post_id: &str) -> Result<Option<String>> {
        let key: Option<Option<String>> = self
            .budget
            .run("fetch author key", async {
                sqlx::query_scalar::<_, Option<String>>(
                    "SELECT u.key FROM post_authors pa \
                     LEFT JOIN users u ON u.id = pa.author_id \
                     WHERE pa.post_id::text = $1 \
                     ORDER BY pa.order_number ASC \
                     LIMIT 1",
                )
                .bind(post_id)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("failed to fetch author key for post {}", post_id))
            })
            .await?;
        Ok(key.flatten())
    }

    #[instrument(skip_all)]
    async fn update_post_url(&self, post_id: &str, full_url: &str) -> Result<()> {
        self.budget
            .run("update post url", async {
                sqlx::query("UPDATE posts SET full_url = $1 WHERE id::text = $2")
                    .bind(full_url)
                    .bind(post_id)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("failed to update url of post {}", post_id))
            })
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn update_post_url_and_author_tx(&self, tx: &mut Self::Tx, post: &Post) -> Result<()> {
        self.budget
            .run("update post url and author", async {
                sqlx::query("UPDATE posts SET full_url = $1, author_id = $2 WHERE id::text = $3")
                    .bind(&post.full_url)
                    .bind(post.author_id.as_deref())
                    .bind(&post.id)
                    .execute(&mut **tx)
                    .await
                    .with_context(|| format!("failed to update post {}", post.id))
            })
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn clear_post_authors_tx(&self, tx: &mut Self::Tx, post_id: &str) -> Result<()> {
        self.budget
            .run("delete post authors", async {
                sqlx::query("DELETE FROM post_authors WHERE post_id::text = $1")
                    .bind(post_id)
                    .execute(&mut **tx)
                    .await
                    .with_context(|| format!("failed to delete authors of post {}", post_id))
            })
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn insert_post_author_tx(
        &self,
        tx: &mut Self::Tx,
        post_id: &str,
        author_id: &str,
        order_number: i32,
    ) -> Result<()> {
        self.budget
            .run("insert post author", async {
                sqlx::query(
                    "INSERT INTO post_authors (post_id, author_id, order_number) \
                     SELECT p.id, $2, $3 FROM posts p WHERE p.id::text = $1",
                )
                .bind(post_id)
                .bind(author_id)
                .bind(order_number)
                .execute(&mut **tx)
                .await
                .with_context(|| format!("failed to insert author for post {}", post_id))
            })
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn broken_records(&self) -> Result<Vec<BrokenRecord>> {
        let sql = format!(
            "SELECT b.old_id::text AS old_id, b.author_id::text AS author_id, b.author_key, \
                    b.created_by::text AS created_by, b.creator_key \
             FROM {BACKLOG_TABLE} b"
        );
        let rows = self
            .budget
            .run("fetch backlog", async {
                sqlx::query(&sql)
                    .fetch_all(&self.pool)
                    .await
                    .context("failed to fetch cross-reference backlog")
            })
            .await?;

        rows.iter()
            .map(|row| {
                let text = |col: &str| -> Result<String> {
                    Ok(row.try_get::<Option<String>, _>(col)?.unwrap_or_default())
                };
                Ok(BrokenRecord {
                    old_id: text("old_id")?,
                    author_id: text("author_id")?,
                    author_key: text("author_key")?,
                    created_by: text("created_by")?,
                    creator_key: text("creator_key")?,
                })
            })
            .collect()
    }
}
