use anyhow::Context;
use reqwest::{Client, StatusCode, Url, header::ACCEPT};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::constants;
use crate::normalize::{Chapter, ChapterVideo, ListItem, extract_chapters, extract_list, extract_suggestions};
use crate::playback::Direction;

/// Why an upstream call produced nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  /// The request never completed (DNS, connect, timeout, body read).
  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),
  /// The server answered with a non-2xx status.
  #[error("upstream returned HTTP {0}")]
  Status(StatusCode),
  /// The envelope said `success: false`, carried no data, or could not be decoded.
  #[error("{0}")]
  Upstream(String),
}

impl ApiError {
  /// The upstream's own error text, when it sent one.
  pub fn upstream_message(&self) -> Option<&str> {
    match self {
      ApiError::Upstream(msg) if !msg.is_empty() => Some(msg),
      _ => None,
    }
  }

  pub fn is_network(&self) -> bool {
    matches!(self, ApiError::Network(_) | ApiError::Status(_))
  }
}

/// The `{success, data?, error?}` wrapper around every upstream response.
#[derive(Debug, Deserialize)]
struct Envelope {
  #[serde(default)]
  success: bool,
  #[serde(default)]
  data: Option<Value>,
  #[serde(default)]
  error: Option<String>,
}

impl Envelope {
  fn into_data(self) -> Result<Option<Value>, ApiError> {
    if !self.success {
      return Err(ApiError::Upstream(self.error.unwrap_or_else(|| "request was not successful".to_string())));
    }
    Ok(self.data.filter(|d| !d.is_null()))
  }
}

/// Client for the drama-streaming API.
#[derive(Debug, Clone)]
pub struct DramaClient {
  http: Client,
  base: Url,
  lang: String,
}

impl DramaClient {
  pub fn new(base_url: &str, lang: &str) -> anyhow::Result<Self> {
    let base = Url::parse(base_url).with_context(|| format!("Invalid API base URL '{}'", base_url))?;
    if base.cannot_be_a_base() {
      anyhow::bail!("API base URL '{}' cannot carry a path", base_url);
    }
    let http = Client::builder()
      .timeout(Duration::from_secs(constants().request_timeout_secs))
      .build()
      .context("Failed to build HTTP client")?;
    Ok(Self { http, base, lang: lang.to_string() })
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  pub fn lang(&self) -> &str {
    &self.lang
  }

  /// Build `<base>/<segments...>?<query>`; each segment is percent-encoded.
  fn url(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    if !query.is_empty() {
      url.query_pairs_mut().extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    url
  }

  async fn fetch(&self, url: Url) -> Result<Option<Value>, ApiError> {
    debug!(url = %url, "api: GET");
    let response = self.http.get(url.clone()).header(ACCEPT, "application/json").send().await?;
    let status = response.status();
    if !status.is_success() {
      warn!(url = %url, status = %status, "api: request failed");
      return Err(ApiError::Status(status));
    }
    let body = response.bytes().await?;
    let envelope: Envelope = serde_json::from_slice(&body).map_err(|e| {
      warn!(url = %url, err = %e, "api: undecodable envelope");
      ApiError::Upstream(format!("malformed response: {}", e))
    })?;
    envelope.into_data()
  }

  /// `GET /api/watch/{bookId}/{chapterIndex}?source&keyword&direction`
  pub async fn watch(
    &self,
    book_id: &str,
    index: u32,
    source: &str,
    keyword: &str,
    direction: Direction,
  ) -> Result<ChapterVideo, ApiError> {
    let url = self.url(
      &["api", "watch", book_id, &index.to_string()],
      &[
        ("source", source.to_string()),
        ("keyword", keyword.to_string()),
        ("direction", direction.wire_code().to_string()),
      ],
    );
    let data = self.fetch(url).await?.ok_or_else(|| ApiError::Upstream(String::new()))?;
    serde_json::from_value(data).map_err(|e| ApiError::Upstream(format!("malformed chapter payload: {}", e)))
  }

  /// `GET /api/chapters/{bookId}?lang`
  pub async fn chapters(&self, book_id: &str) -> Result<Vec<Chapter>, ApiError> {
    let url = self.url(&["api", "chapters", book_id], &[("lang", self.lang.clone())]);
    Ok(extract_chapters(self.fetch(url).await?.as_ref()))
  }

  /// `GET /api/rank/{rankType}?lang`
  pub async fn rank(&self, rank_type: u32) -> Result<Vec<ListItem>, ApiError> {
    let url = self.url(&["api", "rank", &rank_type.to_string()], &[("lang", self.lang.clone())]);
    Ok(extract_list(self.fetch(url).await?.as_ref()))
  }

  /// `GET /api/search/{keyword}/{pageNo}?pageSize&lang`
  pub async fn search(&self, keyword: &str, page_no: u32, page_size: u32) -> Result<Vec<ListItem>, ApiError> {
    let url = self.url(
      &["api", "search", keyword, &page_no.to_string()],
      &[("pageSize", page_size.to_string()), ("lang", self.lang.clone())],
    );
    Ok(extract_list(self.fetch(url).await?.as_ref()))
  }

  /// `GET /api/foryou/{pageNo}?channelId&index&lang`
  pub async fn for_you(&self, page_no: u32, channel_id: u32, index: u32) -> Result<Vec<ListItem>, ApiError> {
    let url = self.url(
      &["api", "foryou", &page_no.to_string()],
      &[("channelId", channel_id.to_string()), ("index", index.to_string()), ("lang", self.lang.clone())],
    );
    Ok(extract_list(self.fetch(url).await?.as_ref()))
  }

  /// `GET /api/new/{pageNo}?pageSize&lang`
  pub async fn new_releases(&self, page_no: u32, page_size: u32) -> Result<Vec<ListItem>, ApiError> {
    let url = self.url(
      &["api", "new", &page_no.to_string()],
      &[("pageSize", page_size.to_string()), ("lang", self.lang.clone())],
    );
    Ok(extract_list(self.fetch(url).await?.as_ref()))
  }

  /// `GET /api/suggest/{keyword}?lang`
  pub async fn suggest(&self, keyword: &str) -> Result<Vec<String>, ApiError> {
    let url = self.url(&["api", "suggest", keyword], &[("lang", self.lang.clone())]);
    Ok(extract_suggestions(self.fetch(url).await?.as_ref()))
  }
}
