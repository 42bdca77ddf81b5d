//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! with no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Upstream API
  pub default_api_base: String,
  pub default_lang: String,
  pub request_timeout_secs: u64,
  pub rank_type: u32,
  pub search_page_size: u32,
  pub new_page_size: u32,
  pub foryou_channel_id: u32,

  // Navigation sources
  pub default_source: String,
  pub search_view_source: String,

  // Search session
  pub search_debounce_ms: u64,
  pub min_query_chars: usize,

  // Normalizer
  pub default_tag: String,
  pub count_placeholder: String,

  // Playback session
  pub controls_hide_ms: u64,
  pub seek_step_secs: f64,

  // mpv transport
  pub mpv_connect_attempts: u32,
  pub mpv_connect_delay_ms: u64,

  // UI
  pub error_dismiss_secs: u64,
}

impl Constants {
  pub fn search_debounce(&self) -> Duration {
    Duration::from_millis(self.search_debounce_ms)
  }

  pub fn controls_hide(&self) -> Duration {
    Duration::from_millis(self.controls_hide_ms)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
