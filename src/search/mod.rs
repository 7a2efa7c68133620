//! Search index gateway: partial document updates and author lookups over HTTP.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, info, instrument, warn};

use crate::budget::Budget;
use crate::config::Search;
use crate::model::{Author, DocumentPatch};
use crate::search::model::{BulkResponse, GetResponse};

pub mod model;

/// Operations the repair pipelines need from the search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Merge `patch` into document `doc_id` of `index`.
    async fn update_document(&self, index: &str, doc_id: &str, patch: &DocumentPatch) -> Result<()>;

    /// Look up an author document. `Ok(None)` means the author does not exist.
    async fn author_by_id(&self, author_id: &str) -> Result<Option<Author>>;
}

#[derive(Clone)]
pub struct OpenSearchClient {
    http: Client,
    base_url: Url,
    username: String,
    password: String,
    author_index: String,
    budget: Budget,
}

impl fmt::Debug for OpenSearchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSearchClient")
            .field("base_url", &self.base_url)
            .field("author_index", &self.author_index)
            .finish_non_exhaustive()
    }
}

impl OpenSearchClient {
    pub fn from_config(cfg: &Search, budget: Budget) -> Result<Self> {
        let base_url = Url::parse(&cfg.host)
            .with_context(|| format!("invalid search host {:?}", cfg.host))?;
        let http = Client::builder()
            .user_agent("post-url-repair/0.1")
            .danger_accept_invalid_certs(cfg.accept_invalid_certs)
            .timeout(budget.per_call())
            .build()
            .context("failed to build search HTTP client")?;
        Ok(Self {
            http,
            base_url,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            author_index: cfg.author_index.clone(),
            budget,
        })
    }

    /// Base URL with `segments` appended, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("search host {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.username.is_empty() {
            req
        } else {
            req.basic_auth(&self.username, Some(&self.password))
        }
    }

    /// Check that the cluster answers with a success status.
    #[instrument(skip_all)]
    pub async fn ping(&self) -> Result<()> {
        let url = self.base_url.clone();
        self.budget
            .run("ping search index", async {
                let res = self
                    .authorized(self.http.get(url))
                    .send()
                    .await
                    .context("failed to reach search index")?;
                if res.status() != StatusCode::OK {
                    return Err(anyhow!("search index ping failed with status {}", res.status()));
                }
                res.bytes().await.context("failed to read ping response")?;
                Ok(())
            })
            .await?;
        info!("search index is connected");
        Ok(())
    }

    pub fn build_bulk_update_request(
        &self,
        index: &str,
        doc_id: &str,
        patch: &DocumentPatch,
    ) -> Result<reqwest::Request> {
        let body = build_bulk_update_body(index, doc_id, patch)?;
        self.authorized(self.http.post(self.endpoint(&["_bulk"])?))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .build()
            .context("failed to build bulk request")
    }

    pub fn build_get_request(&self, index: &str, doc_id: &str) -> Result<reqwest::Request> {
        let url = self.endpoint(&[index, "_doc", doc_id])?;
        self.authorized(self.http.get(url))
            .build()
            .context("failed to build get request")
    }

    async fn get_document<T: DeserializeOwned>(&self, index: &str, doc_id: &str) -> Result<Option<T>> {
        let request = self.build_get_request(index, doc_id)?;
        self.budget
            .run("get search document", async {
                let res = self
                    .http
                    .execute(request)
                    .await
                    .context("failed to reach search index")?;

                let status = res.status();
                if status == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !status.is_success() {
                    let body = res.text().await.unwrap_or_default();
                    return Err(anyhow!("search get error {}: {}", status, body));
                }
                let payload: GetResponse<T> = res.json().await.context("invalid get response")?;
                Ok(if payload.found { payload.source } else { None })
            })
            .await
    }
}

/// Two-line bulk body: the `update` action followed by the `doc` merge patch.
pub fn build_bulk_update_body(index: &str, doc_id: &str, patch: &DocumentPatch) -> Result<String> {
    let action = serde_json::json!({ "update": { "_id": doc_id, "_index": index } });
    let doc = serde_json::json!({ "doc": patch });
    Ok(format!(
        "{}\n{}\n",
        serde_json::to_string(&action)?,
        serde_json::to_string(&doc)?
    ))
}

#[async_trait]
impl SearchIndex for OpenSearchClient {
    #[instrument(skip_all, fields(index = %index, doc_id = %doc_id))]
    async fn update_document(&self, index: &str, doc_id: &str, patch: &DocumentPatch) -> Result<()> {
        let request = self.build_bulk_update_request(index, doc_id, patch)?;
        debug!(url=%request.url(), "sending bulk update");
        let payload: BulkResponse = self
            .budget
            .run("bulk update", async {
                let res = self
                    .http
                    .execute(request)
                    .await
                    .context("failed to reach search index")?;

                let status = res.status();
                if !status.is_success() {
                    let body = res.text().await.unwrap_or_default();
                    warn!(%status, "bulk update rejected");
                    return Err(anyhow!("search bulk error {}: {}", status, body));
                }
                res.json().await.context("invalid bulk response")
            })
            .await?;
        if payload.errors {
            let detail = payload
                .first_error()
                .unwrap_or_else(|| "unknown item failure".to_string());
            return Err(anyhow!("search bulk update failed: {}", detail));
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn author_by_id(&self, author_id: &str) -> Result<Option<Author>> {
        let index = self.author_index.clone();
        self.get_document(&index, author_id).await
    }
}
