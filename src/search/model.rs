use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Response of a single-document `GET /{index}/_doc/{id}`.
#[derive(Deserialize, Debug)]
pub struct GetResponse<T> {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub found: bool,
    #[serde(rename = "_source")]
    pub source: Option<T>,
}

/// Response of `POST /_bulk`. `items` holds one `{action: result}` map per line pair.
#[derive(Deserialize, Debug, Default)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Deserialize, Debug)]
pub struct BulkItemResult {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub status: u16,
    pub error: Option<Value>,
}

impl BulkResponse {
    /// First per-item failure, formatted for reporting.
    pub fn first_error(&self) -> Option<String> {
        self.items
            .iter()
            .flat_map(|item| item.values())
            .find_map(|res| {
                res.error.as_ref().map(|err| {
                    let reason = err
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| err.to_string());
                    format!("document {} failed with status {}: {}", res.id, res.status, reason)
                })
            })
    }
}
