//! REST client for an Elasticsearch-compatible search engine.
//!
//! Process-scoped handle: each binary builds one at startup and passes it
//! explicitly to the components that need it. No global state.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::document::ProductSearchDocument;
use crate::{SearchError, SearchResult};

/// Result of a create-index call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateIndexOutcome {
    Created,
    /// A racing initializer won the create; the index is there either way.
    AlreadyExists,
}

/// Index lifecycle surface, split out so the index manager can be tested
/// without a live engine.
#[async_trait]
pub trait SearchIndexApi: Send + Sync {
    async fn index_exists(&self, index: &str) -> SearchResult<bool>;
    async fn create_index(&self, index: &str, body: &Value) -> SearchResult<CreateIndexOutcome>;
    async fn delete_index(&self, index: &str) -> SearchResult<()>;
}

/// One page of full-text search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub products: Vec<ProductSearchDocument>,
}

#[derive(Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl SearchClient {
    /// Create a client for the engine at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> SearchResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SearchError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Upsert one document. The document id is the product id, so
    /// re-indexing after a redelivery replaces rather than duplicates.
    pub async fn index_document<T: Serialize>(
        &self,
        index: &str,
        id: &str,
        document: &T,
    ) -> SearchResult<()> {
        let response = self
            .http
            .put(self.url(&format!("{index}/_doc/{id}")))
            .json(document)
            .send()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(engine_error(response).await)
        }
    }

    /// Remove one document. A 404 counts as success: deleting an already
    /// deleted product is an idempotent redelivery, not a failure.
    pub async fn delete_document(&self, index: &str, id: &str) -> SearchResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("{index}/_doc/{id}")))
            .send()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(engine_error(response).await)
        }
    }

    /// Full-text search over name, description, and brand; filtered to
    /// active products. Consumed by the search HTTP endpoint (external)
    /// and the integration tests.
    pub async fn search(
        &self,
        index: &str,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> SearchResult<SearchPage> {
        let page = page.max(1);
        let body = json!({
            "from": (page - 1) * page_size,
            "size": page_size,
            "query": {
                "bool": {
                    "must": { "query_string": { "query": query } },
                    "filter": { "term": { "is_active": true } }
                }
            }
        });

        let response = self
            .http
            .post(self.url(&format!("{index}/_search")))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(engine_error(response).await);
        }

        let raw: SearchResponse<ProductSearchDocument> = response
            .json()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        Ok(SearchPage {
            total: raw.hits.total.value,
            page,
            page_size,
            products: raw.hits.hits.into_iter().map(|h| h.source).collect(),
        })
    }
}

#[async_trait]
impl SearchIndexApi for SearchClient {
    async fn index_exists(&self, index: &str) -> SearchResult<bool> {
        let response = self
            .http
            .head(self.url(index))
            .send()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(engine_error(response).await),
        }
    }

    async fn create_index(&self, index: &str, body: &Value) -> SearchResult<CreateIndexOutcome> {
        let response = self
            .http
            .put(self.url(index))
            .json(body)
            .send()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        if response.status().is_success() {
            return Ok(CreateIndexOutcome::Created);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if is_already_exists(&body) {
            Ok(CreateIndexOutcome::AlreadyExists)
        } else {
            Err(SearchError::Engine { status, body })
        }
    }

    async fn delete_index(&self, index: &str) -> SearchResult<()> {
        let response = self
            .http
            .delete(self.url(index))
            .send()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(engine_error(response).await)
        }
    }
}

async fn engine_error(response: reqwest::Response) -> SearchError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    SearchError::Engine { status, body }
}

/// Check-then-create is not atomic between instances; the engine reports
/// the loser of the race with this error type, which is a success for us.
fn is_already_exists(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/type")
                .and_then(|t| t.as_str())
                .map(|t| t == "resource_already_exists_exception")
        })
        .unwrap_or(false)
}

#[derive(Debug, serde::Deserialize)]
struct SearchResponse<T> {
    hits: Hits<T>,
}

#[derive(Debug, serde::Deserialize)]
struct Hits<T> {
    total: HitsTotal,
    hits: Vec<Hit<T>>,
}

#[derive(Debug, serde::Deserialize)]
struct HitsTotal {
    value: u64,
}

#[derive(Debug, serde::Deserialize)]
struct Hit<T> {
    #[serde(rename = "_source")]
    source: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_already_exists_conflict() {
        let body = r#"{
            "error": {
                "type": "resource_already_exists_exception",
                "reason": "index [productindexdocument/abc] already exists"
            },
            "status": 400
        }"#;

        assert!(is_already_exists(body));
    }

    #[test]
    fn other_errors_are_not_conflicts() {
        assert!(!is_already_exists(
            r#"{"error":{"type":"mapper_parsing_exception"},"status":400}"#
        ));
        assert!(!is_already_exists("not json"));
        assert!(!is_already_exists(""));
    }

    #[test]
    fn search_response_parses_totals_and_sources() {
        let raw = r#"{
            "hits": {
                "total": { "value": 2, "relation": "eq" },
                "hits": [
                    { "_source": { "a": 1 } },
                    { "_source": { "a": 2 } }
                ]
            }
        }"#;

        let parsed: SearchResponse<Value> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.hits.total.value, 2);
        assert_eq!(parsed.hits.hits.len(), 2);
        assert_eq!(parsed.hits.hits[1].source["a"], 2);
    }
}
