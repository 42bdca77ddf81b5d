use anyhow::Result;
use ratatui::widgets::ListState;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, DramaClient};
use crate::config::Config;
use crate::constants::constants;
use crate::location::{History, Location, Navigator, WatchTarget};
use crate::normalize::{Chapter, ChapterVideo, ListItem};
use crate::notice::{Notice, NoticeLevel};
use crate::playback::{FetchPhase, PlaybackSession, WatchRequest};
use crate::player::{FitMode, MpvTransport, TransportEvent};
use crate::search::{MountPlan, SearchRequest, SearchSession};

// --- Types ---

/// A started mpv window and its event stream.
pub type SpawnedTransport = (MpvTransport, mpsc::UnboundedReceiver<TransportEvent>);

/// Results of spawned fetches, funnelled back to the UI loop.
#[derive(Debug)]
pub enum Completion {
  Trending(Result<Vec<ListItem>, ApiError>),
  Search(SearchRequest, Result<Vec<ListItem>, ApiError>),
  Watch(WatchRequest, Result<ChapterVideo, ApiError>),
  Chapters(String, Result<Vec<Chapter>, ApiError>),
  /// The media transport for the watch screen opened with this sequence number.
  Transport(u64, Result<SpawnedTransport>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  /// Editing the search query.
  Input,
  /// Browsing the search results or trending feed.
  Results,
  /// Watching; keys drive the player.
  Watch,
  /// Watching, with focus in the chapter sidebar.
  Chapters,
  /// Watching, with the quality menu open.
  Quality,
}

/// Everything owned by the playback screen. Dropped as a unit when the user
/// navigates away.
pub struct WatchScreen {
  pub session: PlaybackSession<MpvTransport>,
  /// Display name, known when opened from a listing.
  pub title: Option<String>,
  events: mpsc::UnboundedReceiver<TransportEvent>,
  handles: Vec<JoinHandle<()>>,
  pub sidebar_visible: bool,
  pub chapter_state: ListState,
  pub quality_state: ListState,
}

impl WatchScreen {
  fn abort_tasks(&mut self) {
    for handle in self.handles.drain(..) {
      handle.abort();
    }
  }
}

/// A watch screen waiting for its media transport to come up.
struct PendingWatch {
  seq: u64,
  target: WatchTarget,
  title: Option<String>,
  handle: JoinHandle<()>,
}

pub struct App {
  client: DramaClient,
  pub history: History,
  pub search: SearchSession,
  pub watch: Option<WatchScreen>,
  pending_watch: Option<PendingWatch>,
  watch_seq: u64,
  pub mode: AppMode,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub list_state: ListState,
  pub fit: FitMode,
  pub last_error: Option<String>,
  /// Informational message shown with a check mark, lower priority than errors.
  pub info_message: Option<String>,
  pub should_quit: bool,
  completions_tx: mpsc::UnboundedSender<Completion>,
  completions_rx: mpsc::UnboundedReceiver<Completion>,
  search_handles: Vec<JoinHandle<()>>,
  /// When the last error was set, for auto-dismiss.
  error_time: Option<Instant>,
  info_time: Option<Instant>,
}

impl App {
  pub fn new(client: DramaClient, config: &Config, start: Location) -> Self {
    let fit = config.fit_mode.as_deref().map(FitMode::from_config).unwrap_or_default();
    let initial_query = match &start {
      Location::Home { query } => query.clone(),
      Location::Watch(_) => None,
    };
    let search = SearchSession::new(initial_query.as_deref());
    let cursor_position = search.query().chars().count();
    let (completions_tx, completions_rx) = mpsc::unbounded_channel();

    Self {
      client,
      history: History::new(start),
      search,
      watch: None,
      pending_watch: None,
      watch_seq: 0,
      mode: AppMode::Input,
      cursor_position,
      input_scroll: 0,
      list_state: ListState::default(),
      fit,
      last_error: None,
      info_message: None,
      should_quit: false,
      completions_tx,
      completions_rx,
      search_handles: Vec::new(),
      error_time: None,
      info_time: None,
    }
  }

  /// Enter whichever screen the starting location names.
  pub fn start(&mut self) {
    match self.history.current().clone() {
      Location::Home { .. } => self.mount_search(),
      Location::Watch(target) => {
        // Mount search underneath so the feed is ready when the user backs out.
        self.mount_search();
        self.enter_watch(target, None);
      }
    }
  }

  // --- Messages ---

  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  fn set_info(&mut self, msg: String) {
    self.info_message = Some(msg);
    self.info_time = Some(Instant::now());
  }

  /// Clear stale messages after the dismiss interval.
  pub fn expire_messages(&mut self) {
    let ttl = Duration::from_secs(constants().error_dismiss_secs);
    if let Some(t) = self.error_time
      && t.elapsed() >= ttl
    {
      self.clear_error();
    }
    if let Some(t) = self.info_time
      && t.elapsed() >= ttl
    {
      self.info_message = None;
      self.info_time = None;
    }
  }

  fn show_notices(&mut self, notices: Vec<Notice>) {
    for notice in notices {
      match notice.level {
        NoticeLevel::Error => self.set_error(notice.message),
        NoticeLevel::Success => self.set_info(notice.message),
      }
    }
  }

  // --- Search screen ---

  fn mount_search(&mut self) {
    let MountPlan { fetch_trending, search } = self.search.mount();
    if fetch_trending {
      self.spawn_trending();
    }
    if let Some(req) = search {
      self.spawn_search(req);
    }
  }

  fn spawn_trending(&mut self) {
    let client = self.client.clone();
    let tx = self.completions_tx.clone();
    let handle = tokio::spawn(async move {
      let result = client.rank(constants().rank_type).await;
      let _ = tx.send(Completion::Trending(result));
    });
    self.track_search_task(handle);
  }

  fn spawn_search(&mut self, req: SearchRequest) {
    info!(query = %req.query, trigger = ?req.trigger, "search triggered");
    let client = self.client.clone();
    let tx = self.completions_tx.clone();
    let handle = tokio::spawn(async move {
      let result = client.search(&req.query, 1, constants().search_page_size).await;
      let _ = tx.send(Completion::Search(req, result));
    });
    self.track_search_task(handle);
  }

  fn track_search_task(&mut self, handle: JoinHandle<()>) {
    self.search_handles.retain(|h| !h.is_finished());
    self.search_handles.push(handle);
  }

  /// Replace the query text (after an edit) and restart the debounce.
  pub fn update_query(&mut self, text: String) {
    self.search.set_query(text, Instant::now());
    if !self.search.shows_results() {
      self.list_state.select(None);
    }
  }

  pub fn submit_search(&mut self) {
    self.clear_error();
    if let Some(req) = self.search.submit(&mut self.history) {
      self.spawn_search(req);
    }
  }

  pub fn clear_search(&mut self) {
    self.search.clear(&mut self.history);
    self.cursor_position = 0;
    self.input_scroll = 0;
    self.list_state.select(None);
  }

  /// Open the highlighted result on the watch screen.
  pub fn open_selected(&mut self) {
    let Some(selected) = self.list_state.selected() else { return };
    let Some(item) = self.search.visible_items().get(selected) else { return };
    let title = Some(item.book_name.clone()).filter(|n| !n.is_empty());
    let mut target = WatchTarget::new(item.book_id.clone(), 0, constants().search_view_source.clone());
    if self.search.shows_results() {
      target.keyword = Some(self.search.trimmed_query().to_string());
    }
    self.history.push(Location::Watch(target.clone()));
    self.enter_watch(target, title);
  }

  // --- Watch screen ---

  /// Switch to the watch screen. mpv starts in the background; the screen is
  /// built once its transport arrives as a completion.
  fn enter_watch(&mut self, target: WatchTarget, title: Option<String>) {
    self.close_watch();
    self.watch_seq += 1;
    let seq = self.watch_seq;
    let fit = self.fit;
    let tx = self.completions_tx.clone();
    let handle = tokio::spawn(async move {
      let result = MpvTransport::spawn(fit).await;
      let _ = tx.send(Completion::Transport(seq, result));
    });
    debug!(book_id = %target.book_id, seq, "watch: starting media transport");
    self.pending_watch = Some(PendingWatch { seq, target, title, handle });
    self.mode = AppMode::Watch;
  }

  fn on_transport_ready(&mut self, seq: u64, result: Result<SpawnedTransport>) {
    let Some(pending) = self.pending_watch.take_if(|p| p.seq == seq) else {
      debug!(seq, "watch: dropping transport for a closed screen");
      return;
    };
    let (transport, events) = match result {
      Ok(spawned) => spawned,
      Err(e) => {
        warn!(err = %e, "watch: could not start media transport");
        self.set_error(format!("Playback error: {:#}", e));
        self.leave_watch_location();
        return;
      }
    };
    let PendingWatch { target, title, .. } = pending;
    info!(book_id = %target.book_id, index = target.index, "watch: open");
    let book_id = target.book_id.clone();
    let mut screen = WatchScreen {
      session: PlaybackSession::new(transport, target, self.fit),
      title,
      events,
      handles: Vec::new(),
      sidebar_visible: false,
      chapter_state: ListState::default(),
      quality_state: ListState::default(),
    };
    let req = screen.session.begin_fetch(&mut self.history);
    self.watch = Some(screen);
    self.spawn_watch(req);
    self.spawn_chapters(book_id);
  }

  fn spawn_watch(&mut self, req: WatchRequest) {
    let Some(screen) = self.watch.as_mut() else { return };
    let client = self.client.clone();
    let tx = self.completions_tx.clone();
    let handle = tokio::spawn(async move {
      let result = client.watch(&req.book_id, req.index, &req.source, &req.keyword, req.direction).await;
      let _ = tx.send(Completion::Watch(req, result));
    });
    screen.handles.retain(|h| !h.is_finished());
    screen.handles.push(handle);
  }

  fn spawn_chapters(&mut self, book_id: String) {
    let Some(screen) = self.watch.as_mut() else { return };
    let client = self.client.clone();
    let tx = self.completions_tx.clone();
    let handle = tokio::spawn(async move {
      let result = client.chapters(&book_id).await;
      let _ = tx.send(Completion::Chapters(book_id, result));
    });
    screen.handles.push(handle);
  }

  /// Tear down the watch screen: abort its fetches and release the transport.
  fn close_watch(&mut self) {
    if let Some(pending) = self.pending_watch.take() {
      debug!(seq = pending.seq, "watch: cancel transport start");
      pending.handle.abort();
    }
    if let Some(mut screen) = self.watch.take() {
      debug!(book_id = %screen.session.book_id(), "watch: close");
      screen.abort_tasks();
      screen.session.close();
    }
  }

  fn leave_watch_location(&mut self) {
    if !self.history.back() {
      self.history.replace(Location::default());
    }
    if let Location::Home { query } = self.history.current().clone() {
      let query = query.unwrap_or_default();
      if query != self.search.trimmed_query() {
        self.cursor_position = query.chars().count();
        self.search.set_query(query, Instant::now());
      }
    }
    self.mode = AppMode::Input;
    self.mount_search();
  }

  /// Back out of the watch screen to wherever the history points.
  pub fn exit_watch(&mut self) {
    self.close_watch();
    self.leave_watch_location();
  }

  pub fn jump_to_chapter(&mut self, index: u32) {
    let Some(screen) = self.watch.as_mut() else { return };
    let req = screen.session.jump_to(index, &mut self.history);
    self.spawn_watch(req);
  }

  pub fn next_chapter(&mut self) {
    let Some(screen) = self.watch.as_mut() else { return };
    let req = screen.session.next(&mut self.history);
    self.spawn_watch(req);
  }

  pub fn toggle_fit(&mut self) {
    if let Some(screen) = self.watch.as_mut() {
      self.fit = screen.session.toggle_fit();
      self.set_info(format!("Fit: {}", self.fit.label()));
    }
  }

  /// Pointer or key activity on the watch screen.
  pub fn activity(&mut self) {
    if let Some(screen) = self.watch.as_mut() {
      screen.session.activity(Instant::now());
    }
  }

  pub fn is_loading_video(&self) -> bool {
    self.pending_watch.is_some()
      || self.watch.as_ref().is_some_and(|w| w.session.fetch_phase() == FetchPhase::Loading)
  }

  // --- Loop plumbing ---

  /// Drain completions and transport events, and advance timers.
  pub fn check_pending(&mut self) {
    while let Ok(completion) = self.completions_rx.try_recv() {
      self.apply_completion(completion);
    }

    let mut advance = Vec::new();
    if let Some(screen) = self.watch.as_mut() {
      while let Ok(event) = screen.events.try_recv() {
        if let Some(req) = screen.session.on_transport_event(event, &mut self.history) {
          advance.push(req);
        }
      }
      screen.session.poll(Instant::now());
    }
    for req in advance {
      self.spawn_watch(req);
    }

    if let Some(req) = self.search.poll(Instant::now()) {
      self.spawn_search(req);
    }

    let mut notices = self.search.take_notices();
    if let Some(screen) = self.watch.as_mut() {
      notices.extend(screen.session.take_notices());
    }
    self.show_notices(notices);
    self.expire_messages();
  }

  fn apply_completion(&mut self, completion: Completion) {
    match completion {
      Completion::Trending(result) => {
        self.search.on_trending_result(result);
        self.clamp_selection();
      }
      Completion::Search(req, result) => {
        self.search.on_search_result(&req, result);
        self.clamp_selection();
      }
      Completion::Watch(req, result) => {
        if let Some(screen) = self.watch.as_mut() {
          screen.session.on_watch_result(&req, result);
          let index = screen.session.index();
          let pos = screen.session.chapters().iter().position(|c| c.chapter_index == index);
          screen.chapter_state.select(pos);
        }
      }
      Completion::Chapters(book_id, result) => {
        if let Some(screen) = self.watch.as_mut() {
          screen.session.on_chapters_result(&book_id, result);
          let index = screen.session.index();
          let pos = screen.session.chapters().iter().position(|c| c.chapter_index == index);
          screen.chapter_state.select(pos);
        }
      }
      Completion::Transport(seq, result) => self.on_transport_ready(seq, result),
    }
  }

  /// Keep the result selection inside the visible list.
  fn clamp_selection(&mut self) {
    let count = self.search.visible_items().len();
    match self.list_state.selected() {
      _ if count == 0 => self.list_state.select(None),
      Some(i) if i >= count => self.list_state.select(Some(count - 1)),
      _ => {}
    }
  }

  /// Abort everything in flight, release the transport and persist preferences.
  pub fn shutdown(&mut self, config: &mut Config) {
    for handle in self.search_handles.drain(..) {
      handle.abort();
    }
    self.close_watch();
    config.fit_mode = Some(self.fit.label().to_string());
    config.last_location = Some(self.history.current().to_string());
    config.save();
    info!(location = %self.history.current(), "shutdown");
  }
}
