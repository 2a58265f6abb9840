//! Search index synchronization against an Elasticsearch-compatible HTTP API.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::SearchConfig;
use crate::error::{PopularityError, Result};
use crate::models::{EntityScore, SearchDocument};

pub const SCORE_FIELD: &str = "metricsScore";

/// Boost applied at query time: `factor / (score + offset)`.
const BOOST_FACTOR: f64 = 2.0;
const BOOST_OFFSET: f64 = 0.1;

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Upserts one full document.
    async fn publish(&self, document: &SearchDocument) -> Result<()>;

    /// Updates only the score field of existing documents in a single bulk request.
    /// Returns how many documents were sent.
    async fn publish_scores(&self, scores: &[EntityScore]) -> Result<usize>;

    async fn search(&self, query: &str) -> Result<Vec<SearchDocument>>;
}

pub struct ElasticsearchClient {
    http_client: reqwest::Client,
    config: SearchConfig,
}

impl ElasticsearchClient {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("popularity-rank/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.config.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                PopularityError::Config(format!(
                    "search url {} cannot be used as a base",
                    self.config.base_url
                ))
            })?;
            path.pop_if_empty().push(&self.config.index).extend(segments);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        content_type: &str,
        body: String,
    ) -> Result<Value> {
        let response = self
            .http_client
            .request(method, url.clone())
            .header(CONTENT_TYPE, content_type)
            .timeout(self.config.timeout)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PopularityError::IndexUnavailable(format!(
                "{url} returned {status}: {error_text}"
            )));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            PopularityError::IndexUnavailable(format!("unreadable response from {url}: {e}"))
        })
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchClient {
    async fn publish(&self, document: &SearchDocument) -> Result<()> {
        if let Some(score) = document.metrics_score {
            ensure_finite(&document.entity_id, score)?;
        }
        let url = self.endpoint(&["_doc", document.entity_id.as_str()])?;
        let body = serde_json::to_string(document)
            .map_err(|e| PopularityError::Config(format!("unserializable document: {e}")))?;

        self.send(Method::PUT, url, "application/json", body).await?;
        tracing::debug!(entity_id = %document.entity_id, "search document upserted");
        Ok(())
    }

    async fn publish_scores(&self, scores: &[EntityScore]) -> Result<usize> {
        if scores.is_empty() {
            return Ok(0);
        }

        let body = bulk_score_body(scores)?;
        let url = self.endpoint(&["_bulk"])?;
        let response = self
            .send(Method::POST, url, "application/x-ndjson", body)
            .await?;

        if response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            let failed = failed_bulk_items(&response);
            return Err(PopularityError::IndexUnavailable(format!(
                "bulk score update rejected for {} of {} documents",
                failed,
                scores.len()
            )));
        }

        tracing::info!(documents = scores.len(), "scores published");
        Ok(scores.len())
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchDocument>> {
        let url = self.endpoint(&["_search"])?;
        let body = search_query(query).to_string();
        let response = self.send(Method::POST, url, "application/json", body).await?;

        let parsed: SearchResponse = serde_json::from_value(response).map_err(|e| {
            PopularityError::IndexUnavailable(format!("unreadable search response: {e}"))
        })?;
        Ok(parsed.hits.hits.into_iter().map(|hit| hit.source).collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitList,
}

#[derive(Debug, Deserialize)]
struct HitList {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: SearchDocument,
}

fn ensure_finite(entity_id: &str, score: f64) -> Result<()> {
    if score.is_finite() {
        Ok(())
    } else {
        Err(PopularityError::DegenerateScoreInput(format!(
            "refusing to publish non-finite score for {entity_id}"
        )))
    }
}

/// Newline-delimited pairs: an update directive, then a partial document holding
/// only the score field. The `update` action rejects a bare source line, so the
/// partial document goes inside `doc`; other fields of the stored document are kept.
pub fn bulk_score_body(scores: &[EntityScore]) -> Result<String> {
    let mut body = String::new();
    for score in scores {
        ensure_finite(&score.entity_id, score.score)?;
        body.push_str(&json!({ "update": { "_id": score.entity_id } }).to_string());
        body.push('\n');
        body.push_str(&json!({ "doc": { "metricsScore": score.score } }).to_string());
        body.push('\n');
    }
    Ok(body)
}

fn failed_bulk_items(response: &Value) -> usize {
    response
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| {
                    item.get("update")
                        .and_then(|update| update.get("error"))
                        .is_some()
                })
                .count()
        })
        .unwrap_or(0)
}

/// Text relevance over name and cuisine, boosted so smaller published scores rank higher.
pub fn search_query(query: &str) -> Value {
    let query = query.trim();
    let text_query = if query.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({
            "multi_match": {
                "query": query,
                "fields": ["name", "cuisine"]
            }
        })
    };

    json!({
        "query": {
            "function_score": {
                "query": text_query,
                "script_score": {
                    "script": {
                        "source": format!(
                            "doc['{f}'].size() == 0 ? params.factor / (1.0 + params.offset) \
                             : params.factor / (doc['{f}'].value + params.offset)",
                            f = SCORE_FIELD
                        ),
                        "params": { "factor": BOOST_FACTOR, "offset": BOOST_OFFSET }
                    }
                },
                "boost_mode": "multiply"
            }
        }
    })
}
