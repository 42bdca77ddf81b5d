//! Playback session: one title, one active chapter, one media transport.
//!
//! The session owns the transport exclusively. Network work is described by
//! [`WatchRequest`]s the session hands out; the embedding screen runs them and
//! feeds completions back, tagged, so out-of-order answers can be dropped.

use std::time::Instant;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::constants::constants;
use crate::location::{Location, Navigator, WatchTarget};
use crate::normalize::{Chapter, ChapterVideo, QualityVariant};
use crate::notice::Notice;
use crate::player::{FitMode, MediaTransport, TransportEvent};
use crate::timer::Deadline;

/// Which way the viewer moved between chapters. Sent upstream as a
/// prefetch/recommendation hint only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
  #[default]
  None,
  Backward,
  Forward,
}

impl Direction {
  pub fn between(previous: Option<u32>, next: u32) -> Self {
    match previous {
      Some(prev) if next > prev => Direction::Forward,
      Some(prev) if next < prev => Direction::Backward,
      _ => Direction::None,
    }
  }

  pub fn wire_code(self) -> u8 {
    match self {
      Direction::None => 0,
      Direction::Backward => 1,
      Direction::Forward => 2,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
  Idle,
  Loading,
  Ready,
  Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayPhase {
  Paused,
  Playing,
  Buffering,
}

/// A chapter fetch to run against the upstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
  pub seq: u64,
  pub book_id: String,
  pub index: u32,
  pub source: String,
  pub keyword: String,
  pub direction: Direction,
}

pub struct PlaybackSession<T: MediaTransport> {
  transport: T,
  target: WatchTarget,
  prev_index: Option<u32>,
  seq: u64,
  video: Option<ChapterVideo>,
  quality: Option<u32>,
  chapters: Vec<Chapter>,
  fetch: FetchPhase,
  play: PlayPhase,
  current_time: f64,
  duration: f64,
  progress: f64,
  controls_visible: bool,
  controls_timer: Deadline,
  fullscreen: bool,
  fit: FitMode,
  notices: Vec<Notice>,
}

impl<T: MediaTransport> PlaybackSession<T> {
  pub fn new(transport: T, target: WatchTarget, fit: FitMode) -> Self {
    Self {
      transport,
      target,
      prev_index: None,
      seq: 0,
      video: None,
      quality: None,
      chapters: Vec::new(),
      fetch: FetchPhase::Idle,
      play: PlayPhase::Paused,
      current_time: 0.0,
      duration: 0.0,
      progress: 0.0,
      controls_visible: true,
      controls_timer: Deadline::default(),
      fullscreen: false,
      fit,
      notices: Vec::new(),
    }
  }

  // --- Accessors ---

  pub fn book_id(&self) -> &str {
    &self.target.book_id
  }

  pub fn index(&self) -> u32 {
    self.target.index
  }

  pub fn video(&self) -> Option<&ChapterVideo> {
    self.video.as_ref()
  }

  pub fn quality(&self) -> Option<u32> {
    self.quality
  }

  pub fn chapters(&self) -> &[Chapter] {
    &self.chapters
  }

  pub fn fetch_phase(&self) -> FetchPhase {
    self.fetch
  }

  pub fn play_phase(&self) -> PlayPhase {
    self.play
  }

  pub fn is_playing(&self) -> bool {
    matches!(self.play, PlayPhase::Playing | PlayPhase::Buffering)
  }

  pub fn current_time(&self) -> f64 {
    self.current_time
  }

  pub fn duration(&self) -> f64 {
    self.duration
  }

  /// Position as a percentage of duration, `0..=100`.
  pub fn progress(&self) -> f64 {
    self.progress
  }

  pub fn controls_visible(&self) -> bool {
    self.controls_visible
  }

  pub fn is_fullscreen(&self) -> bool {
    self.fullscreen
  }

  pub fn fit(&self) -> FitMode {
    self.fit
  }

  #[cfg(test)]
  pub fn transport(&self) -> &T {
    &self.transport
  }

  pub fn take_notices(&mut self) -> Vec<Notice> {
    std::mem::take(&mut self.notices)
  }

  /// Variants for the quality menu, highest first.
  pub fn qualities_desc(&self) -> Vec<&QualityVariant> {
    let mut variants: Vec<&QualityVariant> = self.video.iter().flat_map(|v| v.qualities.iter()).collect();
    variants.sort_by(|a, b| b.quality.cmp(&a.quality));
    variants
  }

  fn set_play_phase(&mut self, phase: PlayPhase) {
    self.play = phase;
    if phase == PlayPhase::Paused {
      self.controls_visible = true;
      self.controls_timer.cancel();
    }
  }

  // --- Chapter navigation ---

  /// Enter Loading for the current chapter and describe the fetch to run.
  pub fn begin_fetch(&mut self, nav: &mut impl Navigator) -> WatchRequest {
    let index = self.target.index;
    let direction = Direction::between(self.prev_index, index);
    self.prev_index = Some(index);
    self.seq += 1;
    self.fetch = FetchPhase::Loading;
    if self.transport.has_media() {
      self.transport.pause();
    }
    self.set_play_phase(PlayPhase::Paused);

    nav.replace(Location::Watch(WatchTarget { keyword: None, ..self.target.clone() }));

    debug!(book_id = %self.target.book_id, index, ?direction, seq = self.seq, "playback: fetch chapter");
    WatchRequest {
      seq: self.seq,
      book_id: self.target.book_id.clone(),
      index,
      source: self.target.source.clone(),
      keyword: self.target.keyword.clone().unwrap_or_default(),
      direction,
    }
  }

  /// Jump to an explicit chapter. Jumping to the current chapter refetches it.
  pub fn jump_to(&mut self, index: u32, nav: &mut impl Navigator) -> WatchRequest {
    self.target.index = index;
    self.begin_fetch(nav)
  }

  pub fn next(&mut self, nav: &mut impl Navigator) -> WatchRequest {
    self.jump_to(self.target.index.saturating_add(1), nav)
  }

  pub fn on_watch_result(&mut self, request: &WatchRequest, result: Result<ChapterVideo, ApiError>) {
    if request.seq != self.seq {
      debug!(seq = request.seq, latest = self.seq, "playback: dropping stale chapter response");
      return;
    }
    match result {
      Ok(video) => {
        let quality = video.initial_quality();
        let url = if video.video_url.is_empty() {
          quality.and_then(|q| video.variant(q)).map(|v| v.video_path.clone()).unwrap_or_default()
        } else {
          video.video_url.clone()
        };
        if url.is_empty() {
          warn!(book_id = %request.book_id, index = request.index, "playback: chapter has no playable source");
          self.notices.push(Notice::error("No playable source for this episode."));
          self.fetch = FetchPhase::Error;
          return;
        }
        if video.unlocked_now {
          self.notices.push(Notice::success("Episode unlocked!"));
        }
        info!(book_id = %request.book_id, index = request.index, quality = ?quality, "playback: chapter ready");
        self.current_time = 0.0;
        self.duration = 0.0;
        self.progress = 0.0;
        self.quality = quality;
        self.transport.load(&url, 0.0, true);
        self.video = Some(video);
        self.fetch = FetchPhase::Ready;
      }
      Err(e) => {
        warn!(book_id = %request.book_id, index = request.index, err = %e, "playback: chapter fetch failed");
        let message = match e.upstream_message() {
          Some(msg) => msg.to_string(),
          None if e.is_network() => "Network error.".to_string(),
          None => "Failed to load video.".to_string(),
        };
        self.notices.push(Notice::error(message));
        self.fetch = FetchPhase::Error;
      }
    }
  }

  /// The chapter list is a navigation aid; failures leave it empty.
  pub fn on_chapters_result(&mut self, book_id: &str, result: Result<Vec<Chapter>, ApiError>) {
    if book_id != self.target.book_id {
      return;
    }
    match result {
      Ok(chapters) => self.chapters = chapters,
      Err(e) => {
        debug!(book_id, err = %e, "playback: chapter list unavailable");
        self.chapters.clear();
      }
    }
  }

  // --- Transport controls ---

  /// Swap to another quality level without losing position or play state.
  /// Returns `false` (and does nothing) if no media is loaded or the level is unknown.
  pub fn switch_quality(&mut self, level: u32) -> bool {
    if !self.transport.has_media() {
      return false;
    }
    let Some(variant) = self.video.as_ref().and_then(|v| v.variant(level)) else {
      return false;
    };
    let url = variant.video_path.clone();
    let position = self.transport.position();
    let was_playing = !self.transport.is_paused();
    self.transport.load(&url, position, was_playing);
    self.quality = Some(level);
    self.current_time = position;
    info!(level, position, was_playing, "playback: quality switched");
    self.notices.push(Notice::success(format!("Quality: {}p", level)));
    true
  }

  pub fn toggle_play(&mut self) {
    if !self.transport.has_media() {
      return;
    }
    if self.is_playing() {
      self.transport.pause();
      self.set_play_phase(PlayPhase::Paused);
    } else {
      self.transport.play();
      self.set_play_phase(PlayPhase::Playing);
    }
  }

  /// Seek to `percent` of the duration. A no-op while the duration is unknown.
  pub fn seek_percent(&mut self, percent: f64) -> bool {
    if !self.transport.has_media() || !(self.duration.is_finite() && self.duration > 0.0) || !percent.is_finite() {
      return false;
    }
    let percent = percent.clamp(0.0, 100.0);
    let secs = percent / 100.0 * self.duration;
    self.transport.seek(secs);
    self.current_time = secs;
    self.progress = percent;
    true
  }

  pub fn seek_relative(&mut self, delta: f64) -> bool {
    if !self.transport.has_media() {
      return false;
    }
    let mut secs = (self.transport.position() + delta).max(0.0);
    if self.duration.is_finite() && self.duration > 0.0 {
      secs = secs.min(self.duration);
      self.progress = secs / self.duration * 100.0;
    }
    self.transport.seek(secs);
    self.current_time = secs;
    true
  }

  pub fn seek_step(&mut self, forward: bool) -> bool {
    let step = constants().seek_step_secs;
    self.seek_relative(if forward { step } else { -step })
  }

  pub fn toggle_fullscreen(&mut self) {
    self.fullscreen = !self.fullscreen;
    self.transport.set_fullscreen(self.fullscreen);
  }

  pub fn toggle_fit(&mut self) -> FitMode {
    self.fit = self.fit.toggled();
    self.transport.set_fit(self.fit);
    self.fit
  }

  /// Apply a transport event. End of media advances to the next chapter and
  /// returns the fetch to run.
  pub fn on_transport_event(&mut self, event: TransportEvent, nav: &mut impl Navigator) -> Option<WatchRequest> {
    self.transport.observe(&event);
    match event {
      TransportEvent::Loaded => {
        let phase = if self.transport.is_paused() { PlayPhase::Paused } else { PlayPhase::Playing };
        self.set_play_phase(phase);
      }
      TransportEvent::Position(p) => {
        if p.is_finite() {
          self.current_time = p;
          if self.duration > 0.0 {
            self.progress = (p / self.duration * 100.0).clamp(0.0, 100.0);
          }
        }
      }
      TransportEvent::Duration(d) => {
        if d.is_finite() && d > 0.0 {
          self.duration = d;
          self.progress = (self.current_time / d * 100.0).clamp(0.0, 100.0);
        }
      }
      TransportEvent::Paused(true) => self.set_play_phase(PlayPhase::Paused),
      TransportEvent::Paused(false) => {
        if self.play != PlayPhase::Buffering {
          self.set_play_phase(PlayPhase::Playing);
        }
      }
      TransportEvent::Buffering(true) => self.set_play_phase(PlayPhase::Buffering),
      TransportEvent::Buffering(false) => {
        let phase = if self.transport.is_paused() { PlayPhase::Paused } else { PlayPhase::Playing };
        self.set_play_phase(phase);
      }
      TransportEvent::Ended => {
        info!(index = self.target.index, "playback: chapter ended, advancing");
        return Some(self.next(nav));
      }
    }
    None
  }

  // --- Controls overlay ---

  /// Pointer or key activity: show the controls and restart the idle timer.
  pub fn activity(&mut self, now: Instant) {
    self.controls_visible = true;
    self.controls_timer.arm(now, constants().controls_hide());
  }

  /// Advance timers. Controls hide on expiry only while playing.
  pub fn poll(&mut self, now: Instant) {
    if self.controls_timer.fire(now) && self.is_playing() {
      self.controls_visible = false;
    }
  }

  /// Release the transport. The session is unusable afterwards.
  pub fn close(&mut self) {
    self.transport.stop();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::location::History;
  use serde_json::json;
  use std::time::Duration;

  #[derive(Default)]
  struct FakeTransport {
    has_media: bool,
    paused: bool,
    position: f64,
    duration: f64,
    loads: Vec<(String, f64, bool)>,
    seeks: Vec<f64>,
    fullscreen: bool,
    fit: Option<FitMode>,
    stopped: bool,
  }

  impl MediaTransport for FakeTransport {
    fn has_media(&self) -> bool {
      self.has_media
    }
    fn load(&mut self, url: &str, start: f64, autoplay: bool) {
      self.loads.push((url.to_string(), start, autoplay));
      self.has_media = true;
      self.position = start;
      self.paused = !autoplay;
    }
    fn play(&mut self) {
      self.paused = false;
    }
    fn pause(&mut self) {
      self.paused = true;
    }
    fn is_paused(&self) -> bool {
      self.paused
    }
    fn position(&self) -> f64 {
      self.position
    }
    fn duration(&self) -> f64 {
      self.duration
    }
    fn seek(&mut self, secs: f64) {
      self.seeks.push(secs);
      self.position = secs;
    }
    fn set_fullscreen(&mut self, on: bool) {
      self.fullscreen = on;
    }
    fn set_fit(&mut self, fit: FitMode) {
      self.fit = Some(fit);
    }
    fn stop(&mut self) {
      self.stopped = true;
    }
    fn observe(&mut self, event: &TransportEvent) {
      match *event {
        TransportEvent::Position(p) => self.position = p,
        TransportEvent::Duration(d) => self.duration = d,
        TransportEvent::Paused(p) => self.paused = p,
        _ => {}
      }
    }
  }

  fn video(index: u32) -> ChapterVideo {
    serde_json::from_value(json!({
      "bookId": "b1",
      "chapterIndex": index,
      "videoUrl": format!("https://cdn/{index}.mp4"),
      "cover": "https://img/b1.jpg",
      "qualities": [
        { "quality": 480, "videoPath": format!("https://cdn/{index}-480.mp4") },
        { "quality": 720, "videoPath": format!("https://cdn/{index}-720.mp4"), "isDefault": 1 },
        { "quality": 1080, "videoPath": format!("https://cdn/{index}-1080.mp4"), "isVipEquity": 1 },
      ],
    }))
    .unwrap()
  }

  fn chapter(index: u32) -> Chapter {
    Chapter { chapter_id: None, chapter_index: index, chapter_name: None, is_charge: false }
  }

  fn session(index: u32) -> (PlaybackSession<FakeTransport>, History) {
    let target = WatchTarget::new("b1", index, "search_result");
    let history = History::new(Location::Watch(target.clone()));
    (PlaybackSession::new(FakeTransport::default(), target, FitMode::Cover), history)
  }

  /// Session with chapter `index` loaded and playing at `position` of a 100 s video.
  fn playing(index: u32, position: f64) -> (PlaybackSession<FakeTransport>, History) {
    let (mut s, mut h) = session(index);
    let req = s.begin_fetch(&mut h);
    s.on_watch_result(&req, Ok(video(index)));
    s.on_transport_event(TransportEvent::Loaded, &mut h);
    s.on_transport_event(TransportEvent::Duration(100.0), &mut h);
    s.on_transport_event(TransportEvent::Position(position), &mut h);
    s.take_notices();
    (s, h)
  }

  // --- direction ---

  #[test]
  fn direction_hints_follow_index_deltas() {
    let (mut s, mut h) = session(3);
    let mut hints = vec![s.begin_fetch(&mut h).direction];
    for idx in [5, 5, 2] {
      hints.push(s.jump_to(idx, &mut h).direction);
    }
    assert_eq!(hints, [Direction::None, Direction::Forward, Direction::None, Direction::Backward]);
  }

  #[test]
  fn direction_wire_codes() {
    assert_eq!(Direction::None.wire_code(), 0);
    assert_eq!(Direction::Backward.wire_code(), 1);
    assert_eq!(Direction::Forward.wire_code(), 2);
  }

  // --- fetch lifecycle ---

  #[test]
  fn begin_fetch_enters_loading_and_syncs_location() {
    let (mut s, mut h) = session(0);
    let req = s.jump_to(4, &mut h);
    assert_eq!(s.fetch_phase(), FetchPhase::Loading);
    assert_eq!(s.play_phase(), PlayPhase::Paused);
    assert_eq!(req.index, 4);
    assert_eq!(h.current().to_string(), "/watch?bookId=b1&index=4&source=search_result");
    assert_eq!(h.depth(), 1);
  }

  #[test]
  fn successful_fetch_selects_default_quality_and_loads() {
    let (mut s, mut h) = session(2);
    let req = s.begin_fetch(&mut h);
    s.on_watch_result(&req, Ok(video(2)));
    assert_eq!(s.fetch_phase(), FetchPhase::Ready);
    assert_eq!(s.quality(), Some(720));
    assert_eq!(s.transport().loads, [("https://cdn/2.mp4".to_string(), 0.0, true)]);
    assert!(s.take_notices().is_empty());

    s.on_transport_event(TransportEvent::Loaded, &mut h);
    assert_eq!(s.play_phase(), PlayPhase::Playing);
  }

  #[test]
  fn unlock_emits_one_success_notice() {
    let (mut s, mut h) = session(0);
    let req = s.begin_fetch(&mut h);
    let mut v = video(0);
    v.unlocked_now = true;
    s.on_watch_result(&req, Ok(v));
    let notices = s.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0], Notice::success("Episode unlocked!"));
  }

  #[test]
  fn null_video_url_plays_selected_variant() {
    let (mut s, mut h) = session(2);
    let req = s.begin_fetch(&mut h);
    let v: ChapterVideo = serde_json::from_value(json!({
      "bookId": "b1",
      "chapterIndex": "2",
      "videoUrl": null,
      "qualities": [{ "quality": "720", "videoPath": "https://cdn/2-720.mp4", "isDefault": 1 }],
    }))
    .unwrap();
    s.on_watch_result(&req, Ok(v));
    assert_eq!(s.fetch_phase(), FetchPhase::Ready);
    assert_eq!(s.quality(), Some(720));
    assert_eq!(s.transport().loads.last().map(|l| l.0.as_str()), Some("https://cdn/2-720.mp4"));
    assert!(s.take_notices().is_empty());
  }

  #[test]
  fn failed_fetch_on_first_load_keeps_video_empty() {
    let (mut s, mut h) = session(0);
    let req = s.begin_fetch(&mut h);
    s.on_watch_result(&req, Err(ApiError::Upstream("Episode locked".into())));
    assert!(s.video().is_none());
    assert_eq!(s.fetch_phase(), FetchPhase::Error);
    assert_eq!(s.take_notices(), [Notice::error("Episode locked")]);
  }

  #[test]
  fn failed_fetch_keeps_previous_video() {
    let (mut s, mut h) = playing(1, 10.0);
    let req = s.next(&mut h);
    s.on_watch_result(&req, Err(ApiError::Upstream(String::new())));
    assert_eq!(s.video().map(|v| v.chapter_index), Some(1));
    let notices = s.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0], Notice::error("Failed to load video."));
    assert!(s.take_notices().is_empty());
  }

  #[test]
  fn stale_response_is_dropped() {
    let (mut s, mut h) = session(0);
    let first = s.begin_fetch(&mut h);
    let second = s.jump_to(1, &mut h);
    s.on_watch_result(&second, Ok(video(1)));
    s.on_watch_result(&first, Ok(video(0)));
    assert_eq!(s.video().map(|v| v.chapter_index), Some(1));
    assert_eq!(s.transport().loads.len(), 1);
  }

  #[test]
  fn chapter_list_failure_is_silent() {
    let (mut s, _) = session(0);
    s.on_chapters_result("b1", Ok(vec![chapter(0)]));
    assert_eq!(s.chapters().len(), 1);
    s.on_chapters_result("b1", Err(ApiError::Upstream("boom".into())));
    assert!(s.chapters().is_empty());
    assert!(s.take_notices().is_empty());
  }

  #[test]
  fn chapter_list_for_other_book_is_ignored() {
    let (mut s, _) = session(0);
    s.on_chapters_result("other", Ok(vec![chapter(0)]));
    assert!(s.chapters().is_empty());
  }

  // --- auto-advance ---

  #[test]
  fn end_of_media_advances_one_chapter() {
    let (mut s, mut h) = playing(6, 99.0);
    let req = s.on_transport_event(TransportEvent::Ended, &mut h).expect("advance request");
    assert_eq!(req.index, 7);
    assert_eq!(req.direction, Direction::Forward);
    assert_eq!(s.index(), 7);
    assert_eq!(s.fetch_phase(), FetchPhase::Loading);
  }

  // --- quality ---

  #[test]
  fn quality_switch_preserves_position_and_play_state() {
    let (mut s, _) = playing(0, 42.5);
    assert_eq!(s.quality(), Some(720));
    assert!(s.switch_quality(480));
    assert_eq!(s.quality(), Some(480));
    assert_eq!(s.transport().loads.last(), Some(&("https://cdn/0-480.mp4".to_string(), 42.5, true)));
    assert_eq!(s.transport().position(), 42.5);
    assert!(!s.transport().is_paused());
    assert_eq!(s.play_phase(), PlayPhase::Playing);
    assert_eq!(s.take_notices(), [Notice::success("Quality: 480p")]);
  }

  #[test]
  fn quality_switch_while_paused_stays_paused() {
    let (mut s, _) = playing(0, 12.0);
    s.toggle_play();
    assert!(s.switch_quality(1080));
    assert_eq!(s.transport().loads.last(), Some(&("https://cdn/0-1080.mp4".to_string(), 12.0, false)));
    assert_eq!(s.play_phase(), PlayPhase::Paused);
  }

  #[test]
  fn unknown_quality_is_noop() {
    let (mut s, _) = playing(0, 5.0);
    let loads = s.transport().loads.len();
    assert!(!s.switch_quality(360));
    assert_eq!(s.transport().loads.len(), loads);
    assert_eq!(s.quality(), Some(720));
    assert!(s.take_notices().is_empty());
  }

  #[test]
  fn quality_switch_without_media_is_noop() {
    let (mut s, _) = session(0);
    assert!(!s.switch_quality(720));
  }

  #[test]
  fn qualities_sorted_high_to_low() {
    let (s, _) = playing(0, 0.0);
    assert_eq!(s.qualities_desc().iter().map(|q| q.quality).collect::<Vec<_>>(), [1080, 720, 480]);
  }

  // --- seeking ---

  #[test]
  fn seek_percent_uses_duration() {
    let (mut s, _) = playing(0, 0.0);
    assert!(s.seek_percent(25.0));
    assert_eq!(s.transport().seeks, [25.0]);
    assert_eq!(s.progress(), 25.0);
  }

  #[test]
  fn seek_without_duration_is_noop() {
    let (mut s, mut h) = session(0);
    let req = s.begin_fetch(&mut h);
    s.on_watch_result(&req, Ok(video(0)));
    assert!(!s.seek_percent(50.0));
    s.on_transport_event(TransportEvent::Duration(f64::NAN), &mut h);
    assert!(!s.seek_percent(50.0));
    s.on_transport_event(TransportEvent::Duration(0.0), &mut h);
    assert!(!s.seek_percent(50.0));
    assert!(s.transport().seeks.is_empty());
    assert_eq!(s.progress(), 0.0);
  }

  #[test]
  fn seek_step_clamps_to_bounds() {
    let (mut s, _) = playing(0, 3.0);
    assert!(s.seek_step(false));
    assert_eq!(s.transport().position(), 0.0);
    s.seek_relative(500.0);
    assert_eq!(s.transport().position(), 100.0);
  }

  // --- play / pause / buffering ---

  #[test]
  fn toggle_play_flips_phase() {
    let (mut s, _) = playing(0, 1.0);
    s.toggle_play();
    assert_eq!(s.play_phase(), PlayPhase::Paused);
    assert!(s.transport().is_paused());
    s.toggle_play();
    assert_eq!(s.play_phase(), PlayPhase::Playing);
  }

  #[test]
  fn buffering_events() {
    let (mut s, mut h) = playing(0, 1.0);
    s.on_transport_event(TransportEvent::Buffering(true), &mut h);
    assert_eq!(s.play_phase(), PlayPhase::Buffering);
    assert!(s.is_playing());
    s.on_transport_event(TransportEvent::Buffering(false), &mut h);
    assert_eq!(s.play_phase(), PlayPhase::Playing);
  }

  #[test]
  fn fullscreen_and_fit_forward_to_transport() {
    let (mut s, _) = playing(0, 1.0);
    s.toggle_fullscreen();
    assert!(s.is_fullscreen());
    assert!(s.transport().fullscreen);
    assert_eq!(s.toggle_fit(), FitMode::Contain);
    assert_eq!(s.transport().fit, Some(FitMode::Contain));
  }

  // --- controls overlay ---

  #[test]
  fn controls_hide_after_idle_only_while_playing() {
    let t0 = Instant::now();
    let (mut s, _) = playing(0, 1.0);
    s.activity(t0);
    s.poll(t0 + Duration::from_millis(2999));
    assert!(s.controls_visible());
    s.poll(t0 + Duration::from_millis(3000));
    assert!(!s.controls_visible());

    s.activity(t0 + Duration::from_secs(4));
    s.toggle_play();
    s.poll(t0 + Duration::from_secs(10));
    assert!(s.controls_visible());
  }

  #[test]
  fn activity_resets_idle_timer() {
    let t0 = Instant::now();
    let (mut s, _) = playing(0, 1.0);
    s.activity(t0);
    s.activity(t0 + Duration::from_secs(2));
    s.poll(t0 + Duration::from_secs(4));
    assert!(s.controls_visible());
    s.poll(t0 + Duration::from_secs(5));
    assert!(!s.controls_visible());
  }

  #[test]
  fn close_stops_transport() {
    let (mut s, _) = playing(0, 1.0);
    s.close();
    assert!(s.transport().stopped);
  }
}
