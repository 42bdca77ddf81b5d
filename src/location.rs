//! Navigable, shareable session state.
//!
//! A location is the string a user can bookmark or pass back with `--open`:
//! `/?q=<text>` for the search screen and
//! `/watch?bookId=<id>&index=<n>&source=<origin>` for playback.

use anyhow::{Result, anyhow};
use reqwest::Url;
use std::fmt;
use std::sync::LazyLock;

use crate::constants::constants;

static ORIGIN: LazyLock<Url> =
  LazyLock::new(|| Url::parse("http://local/").expect("static origin URL must parse (compile-time literal)"));

/// Everything needed to reconstruct a playback session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
  pub book_id: String,
  pub index: u32,
  pub source: String,
  pub keyword: Option<String>,
}

impl WatchTarget {
  pub fn new(book_id: impl Into<String>, index: u32, source: impl Into<String>) -> Self {
    Self { book_id: book_id.into(), index, source: source.into(), keyword: None }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
  Home { query: Option<String> },
  Watch(WatchTarget),
}

impl Default for Location {
  fn default() -> Self {
    Location::Home { query: None }
  }
}

impl Location {
  pub fn home(query: &str) -> Self {
    let query = query.trim();
    Location::Home { query: (!query.is_empty()).then(|| query.to_string()) }
  }

  /// Parse a location string. A missing or non-numeric `index` means chapter 0;
  /// a watch location without a `bookId` is rejected.
  pub fn parse(s: &str) -> Result<Self> {
    let url = ORIGIN.join(s.trim()).map_err(|e| anyhow!("invalid location '{}': {}", s, e))?;
    let param = |name: &str| url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned());

    match url.path().trim_end_matches('/') {
      "" => Ok(Location::home(&param("q").unwrap_or_default())),
      "/watch" => {
        let book_id = param("bookId").map(|b| b.trim().to_string()).filter(|b| !b.is_empty());
        let Some(book_id) = book_id else {
          return Err(anyhow!("invalid location '{}': missing bookId", s));
        };
        let index = param("index").and_then(|i| i.trim().parse::<u32>().ok()).unwrap_or(0);
        let source = param("source").filter(|s| !s.is_empty()).unwrap_or_else(|| constants().default_source.clone());
        let keyword = param("keyword").filter(|k| !k.is_empty());
        Ok(Location::Watch(WatchTarget { book_id, index, source, keyword }))
      }
      other => Err(anyhow!("unknown location path '{}'", other)),
    }
  }
}

fn render(path: &str, pairs: &[(&str, &str)]) -> String {
  if pairs.is_empty() {
    return path.to_string();
  }
  let mut url = ORIGIN.clone();
  url.query_pairs_mut().extend_pairs(pairs);
  format!("{}?{}", path, url.query().unwrap_or_default())
}

impl fmt::Display for Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = match self {
      Location::Home { query: None } => render("/", &[]),
      Location::Home { query: Some(q) } => render("/", &[("q", q.as_str())]),
      Location::Watch(t) => {
        let index = t.index.to_string();
        let mut pairs = vec![("bookId", t.book_id.as_str()), ("index", index.as_str()), ("source", t.source.as_str())];
        if let Some(ref kw) = t.keyword {
          pairs.push(("keyword", kw.as_str()));
        }
        render("/watch", &pairs)
      }
    };
    f.write_str(&text)
  }
}

// --- Navigation ---

/// Sink for location changes. Sessions report where they are through this so
/// the embedding screen decides what "navigating" means.
pub trait Navigator {
  /// Record a new entry (e.g. an explicit search submit).
  fn push(&mut self, location: Location);
  /// Overwrite the current entry (e.g. the chapter index changing during playback).
  fn replace(&mut self, location: Location);
}

/// In-memory back stack. Never empty.
#[derive(Debug, Clone)]
pub struct History {
  entries: Vec<Location>,
}

impl History {
  pub fn new(start: Location) -> Self {
    Self { entries: vec![start] }
  }

  pub fn current(&self) -> &Location {
    // Safety: entries is seeded in new() and back() never pops the last one.
    &self.entries[self.entries.len() - 1]
  }

  /// Pop the current entry. Returns `false` when already at the root.
  pub fn back(&mut self) -> bool {
    if self.entries.len() > 1 {
      self.entries.pop();
      true
    } else {
      false
    }
  }

  #[cfg(test)]
  pub fn depth(&self) -> usize {
    self.entries.len()
  }
}

impl Navigator for History {
  fn push(&mut self, location: Location) {
    if self.current() != &location {
      self.entries.push(location);
    }
  }

  fn replace(&mut self, location: Location) {
    let last = self.entries.len() - 1;
    self.entries[last] = location;
  }
}
