//! Search session: trending feed on mount, debounced as-you-type search,
//! explicit submit that records a location entry.
//!
//! Like the playback session this never performs I/O. It emits
//! [`SearchRequest`]s and accepts their completions, discarding any answer
//! that no longer matches what the user is looking at.

use std::time::Instant;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::constants::constants;
use crate::location::{Location, Navigator};
use crate::normalize::ListItem;
use crate::notice::Notice;
use crate::timer::Deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
  Idle,
  Debouncing,
  Searching,
  Ready,
  ShowingTrending,
}

/// What started a search. Only explicit submits report failures to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTrigger {
  Debounce,
  Submit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
  pub seq: u64,
  pub query: String,
  pub trigger: SearchTrigger,
}

/// Work to start when the search screen first appears.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MountPlan {
  pub fetch_trending: bool,
  pub search: Option<SearchRequest>,
}

#[derive(Debug)]
pub struct SearchSession {
  query: String,
  results: Vec<ListItem>,
  trending: Vec<ListItem>,
  phase: SearchPhase,
  seq: u64,
  in_flight: Option<u64>,
  debounce: Deadline,
  mounted: bool,
  notices: Vec<Notice>,
}

impl SearchSession {
  pub fn new(initial_query: Option<&str>) -> Self {
    Self {
      query: initial_query.unwrap_or_default().to_string(),
      results: Vec::new(),
      trending: Vec::new(),
      phase: SearchPhase::Idle,
      seq: 0,
      in_flight: None,
      debounce: Deadline::default(),
      mounted: false,
      notices: Vec::new(),
    }
  }

  /// Number of characters (not bytes) a query must have to be searched.
  fn searchable(query: &str) -> bool {
    query.chars().count() >= constants().min_query_chars
  }

  // --- Accessors ---

  pub fn query(&self) -> &str {
    &self.query
  }

  pub fn trimmed_query(&self) -> &str {
    self.query.trim()
  }

  pub fn phase(&self) -> SearchPhase {
    self.phase
  }

  #[cfg(test)]
  pub fn results(&self) -> &[ListItem] {
    &self.results
  }

  #[cfg(test)]
  pub fn trending(&self) -> &[ListItem] {
    &self.trending
  }

  pub fn is_searching(&self) -> bool {
    self.in_flight.is_some()
  }

  /// A keystroke is waiting out the debounce window.
  pub fn is_debouncing(&self) -> bool {
    self.debounce.is_armed()
  }

  /// Whether the visible list is search results rather than the trending feed.
  pub fn shows_results(&self) -> bool {
    Self::searchable(self.trimmed_query())
  }

  /// Search results while a query is active, otherwise the trending feed.
  pub fn visible_items(&self) -> &[ListItem] {
    if self.shows_results() { &self.results } else { &self.trending }
  }

  pub fn take_notices(&mut self) -> Vec<Notice> {
    std::mem::take(&mut self.notices)
  }

  // --- Lifecycle ---

  /// Called when the screen appears. Trending is requested only once per
  /// session; a query restored from the location is searched immediately.
  pub fn mount(&mut self) -> MountPlan {
    let fetch_trending = !self.mounted;
    self.mounted = true;
    let search = if Self::searchable(self.trimmed_query()) {
      Some(self.start(SearchTrigger::Debounce))
    } else {
      self.phase = SearchPhase::ShowingTrending;
      None
    };
    MountPlan { fetch_trending, search }
  }

  /// Trending is best-effort: a failure leaves the feed empty.
  pub fn on_trending_result(&mut self, result: Result<Vec<ListItem>, ApiError>) {
    match result {
      Ok(items) => {
        debug!(count = items.len(), "search: trending loaded");
        self.trending = items;
      }
      Err(e) => {
        warn!(err = %e, "search: trending unavailable");
        self.trending.clear();
      }
    }
  }

  /// Replace the query text. Short queries reset to the trending feed;
  /// anything else restarts the debounce window.
  pub fn set_query(&mut self, text: impl Into<String>, now: Instant) {
    self.query = text.into();
    if Self::searchable(self.trimmed_query()) {
      self.debounce.arm(now, constants().search_debounce());
      self.phase = SearchPhase::Debouncing;
    } else {
      self.reset_to_trending();
    }
  }

  fn reset_to_trending(&mut self) {
    self.debounce.cancel();
    self.results.clear();
    self.in_flight = None;
    self.phase = SearchPhase::ShowingTrending;
  }

  /// Advance the debounce timer; returns a search to run once it expires.
  pub fn poll(&mut self, now: Instant) -> Option<SearchRequest> {
    if !self.debounce.fire(now) {
      return None;
    }
    Self::searchable(self.trimmed_query()).then(|| self.start(SearchTrigger::Debounce))
  }

  /// Explicit submit: skip the debounce and record the query as a location.
  pub fn submit(&mut self, nav: &mut impl Navigator) -> Option<SearchRequest> {
    self.debounce.cancel();
    nav.push(Location::home(&self.query));
    if Self::searchable(self.trimmed_query()) {
      Some(self.start(SearchTrigger::Submit))
    } else {
      self.reset_to_trending();
      None
    }
  }

  /// Empty the query and return to the bare search location.
  pub fn clear(&mut self, nav: &mut impl Navigator) {
    self.query.clear();
    self.reset_to_trending();
    nav.push(Location::default());
  }

  fn start(&mut self, trigger: SearchTrigger) -> SearchRequest {
    self.debounce.cancel();
    self.seq += 1;
    self.in_flight = Some(self.seq);
    self.phase = SearchPhase::Searching;
    let query = self.trimmed_query().to_string();
    debug!(seq = self.seq, query = %query, ?trigger, "search: start");
    SearchRequest { seq: self.seq, query, trigger }
  }

  /// Apply a search completion. Results are kept only if they answer the
  /// latest request and the query text has not changed since.
  pub fn on_search_result(&mut self, request: &SearchRequest, result: Result<Vec<ListItem>, ApiError>) {
    if self.in_flight != Some(request.seq) || request.query != self.trimmed_query() {
      debug!(seq = request.seq, query = %request.query, "search: dropping stale response");
      return;
    }
    self.in_flight = None;
    match result {
      Ok(items) => {
        debug!(seq = request.seq, count = items.len(), "search: results");
        self.results = items;
      }
      Err(e) => {
        warn!(seq = request.seq, err = %e, "search: failed");
        self.results.clear();
        if request.trigger == SearchTrigger::Submit {
          let message = e.upstream_message().map(str::to_string).unwrap_or_else(|| "Search failed.".to_string());
          self.notices.push(Notice::error(message));
        }
      }
    }
    self.phase = SearchPhase::Ready;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::location::History;
  use serde_json::json;
  use std::time::Duration;

  fn items(ids: &[&str]) -> Vec<ListItem> {
    ids.iter().map(|id| serde_json::from_value(json!({ "bookId": id, "bookName": id })).unwrap()).collect()
  }

  fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
  }

  /// Type `text` one character at a time, `gap` apart, polling between keystrokes.
  fn type_text(s: &mut SearchSession, text: &str, t0: Instant, gap: Duration) -> (Vec<SearchRequest>, Instant) {
    let mut reqs = Vec::new();
    let mut now = t0;
    let mut typed = String::new();
    for c in text.chars() {
      typed.push(c);
      s.set_query(typed.clone(), now);
      reqs.extend(s.poll(now));
      now += gap;
    }
    (reqs, now)
  }

  #[test]
  fn mount_fetches_trending_once() {
    let mut s = SearchSession::new(None);
    assert_eq!(s.mount(), MountPlan { fetch_trending: true, search: None });
    assert_eq!(s.phase(), SearchPhase::ShowingTrending);
    assert_eq!(s.mount(), MountPlan { fetch_trending: false, search: None });
  }

  #[test]
  fn mount_with_restored_query_searches() {
    let mut s = SearchSession::new(Some("ceo"));
    let plan = s.mount();
    assert!(plan.fetch_trending);
    assert_eq!(plan.search.map(|r| r.query), Some("ceo".to_string()));
    assert_eq!(s.phase(), SearchPhase::Searching);
  }

  #[test]
  fn trending_failure_leaves_feed_empty_without_notice() {
    let mut s = SearchSession::new(None);
    s.mount();
    s.on_trending_result(Ok(items(&["a", "b"])));
    assert_eq!(s.visible_items().len(), 2);
    s.on_trending_result(Err(ApiError::Upstream("down".into())));
    assert!(s.trending().is_empty());
    assert!(s.take_notices().is_empty());
  }

  #[test]
  fn fast_typing_issues_one_request_for_final_text() {
    let t0 = Instant::now();
    let mut s = SearchSession::new(None);
    s.mount();
    let (mut reqs, end) = type_text(&mut s, "abcdef", t0, ms(40));
    assert!(reqs.is_empty());
    assert_eq!(s.phase(), SearchPhase::Debouncing);

    // Last keystroke at t0 + 200 ms; the window closes 500 ms later.
    let last = end - ms(40);
    assert!(s.poll(last + ms(499)).is_none());
    reqs.extend(s.poll(last + ms(500)));
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].query, "abcdef");
    assert_eq!(reqs[0].trigger, SearchTrigger::Debounce);
    assert!(s.poll(last + ms(2000)).is_none());
  }

  #[test]
  fn short_queries_never_search() {
    let t0 = Instant::now();
    let mut s = SearchSession::new(None);
    s.mount();
    for text in ["", "a", " a ", "   "] {
      s.set_query(text, t0);
      assert!(s.poll(t0 + ms(10_000)).is_none(), "{text:?}");
      assert_eq!(s.phase(), SearchPhase::ShowingTrending);
    }
  }

  #[test]
  fn min_length_counts_characters_not_bytes() {
    let t0 = Instant::now();
    let mut s = SearchSession::new(None);
    s.set_query("é", t0);
    assert!(s.poll(t0 + ms(600)).is_none());
    s.set_query("爱情", t0);
    assert!(s.poll(t0 + ms(600)).is_some());
  }

  #[test]
  fn shrinking_query_clears_results_and_drops_in_flight() {
    let t0 = Instant::now();
    let mut s = SearchSession::new(None);
    s.set_query("abc", t0);
    let req = s.poll(t0 + ms(500)).unwrap();
    s.set_query("a", t0 + ms(600));
    s.on_search_result(&req, Ok(items(&["x"])));
    assert!(s.results().is_empty());
    assert_eq!(s.phase(), SearchPhase::ShowingTrending);
  }

  #[test]
  fn stale_responses_are_discarded() {
    let t0 = Instant::now();
    let mut s = SearchSession::new(None);
    s.set_query("ab", t0);
    let first = s.poll(t0 + ms(500)).unwrap();
    s.set_query("abc", t0 + ms(600));
    let second = s.poll(t0 + ms(1100)).unwrap();

    s.on_search_result(&second, Ok(items(&["new"])));
    s.on_search_result(&first, Ok(items(&["old"])));
    assert_eq!(s.results()[0].book_id, "new");
    assert_eq!(s.phase(), SearchPhase::Ready);
  }

  #[test]
  fn response_for_edited_query_is_discarded() {
    let t0 = Instant::now();
    let mut s = SearchSession::new(None);
    s.set_query("abc", t0);
    let req = s.poll(t0 + ms(500)).unwrap();
    s.set_query("abcd", t0 + ms(600));
    s.on_search_result(&req, Ok(items(&["x"])));
    assert!(s.results().is_empty());
    assert_eq!(s.phase(), SearchPhase::Debouncing);
  }

  #[test]
  fn submit_skips_debounce_and_pushes_location() {
    let t0 = Instant::now();
    let mut s = SearchSession::new(None);
    let mut h = History::new(Location::default());
    s.set_query("  ceo bride ", t0);
    let req = s.submit(&mut h).unwrap();
    assert_eq!(req.query, "ceo bride");
    assert_eq!(req.trigger, SearchTrigger::Submit);
    assert_eq!(h.current().to_string(), "/?q=ceo+bride");
    assert!(s.poll(t0 + ms(1000)).is_none());
  }

  #[test]
  fn submit_failure_notifies_once_debounce_failure_is_silent() {
    let t0 = Instant::now();
    let mut s = SearchSession::new(None);
    let mut h = History::new(Location::default());

    s.set_query("abc", t0);
    let req = s.poll(t0 + ms(500)).unwrap();
    s.on_search_result(&req, Err(ApiError::Upstream("boom".into())));
    assert!(s.take_notices().is_empty());

    let req = s.submit(&mut h).unwrap();
    s.on_search_result(&req, Err(ApiError::Upstream(String::new())));
    assert_eq!(s.take_notices(), [Notice::error("Search failed.")]);
    assert!(s.results().is_empty());
  }

  #[test]
  fn failed_refinement_empties_previous_results() {
    let failures = [ApiError::Status(reqwest::StatusCode::BAD_GATEWAY), ApiError::Upstream("no results".into())];
    for failure in failures {
      let t0 = Instant::now();
      let mut s = SearchSession::new(None);
      s.set_query("abc", t0);
      let req = s.poll(t0 + ms(500)).unwrap();
      s.on_search_result(&req, Ok(items(&["a", "b"])));
      assert_eq!(s.results().len(), 2);

      s.set_query("abcd", t0 + ms(600));
      let req = s.poll(t0 + ms(1100)).unwrap();
      assert_eq!(req.query, "abcd");
      s.on_search_result(&req, Err(failure));
      assert!(s.results().is_empty());
      assert_eq!(s.phase(), SearchPhase::Ready);
      assert!(s.take_notices().is_empty());
    }
  }

  #[test]
  fn clear_resets_to_root_location() {
    let t0 = Instant::now();
    let mut s = SearchSession::new(None);
    let mut h = History::new(Location::default());
    s.set_query("abc", t0);
    s.submit(&mut h);
    s.clear(&mut h);
    assert_eq!(s.query(), "");
    assert_eq!(h.current(), &Location::default());
    assert_eq!(s.phase(), SearchPhase::ShowingTrending);
  }
}
