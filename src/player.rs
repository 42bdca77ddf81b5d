use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use std::process::Stdio;
use std::time::Duration;
use tokio::{
  io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader},
  net::UnixStream,
  process::{Child as TokioChild, Command},
  sync::mpsc,
  task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::constants::constants;

/// How the video fills the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
  /// Crop to fill.
  #[default]
  Cover,
  /// Letterbox to fit.
  Contain,
}

impl FitMode {
  pub fn label(self) -> &'static str {
    match self {
      FitMode::Cover => "cover",
      FitMode::Contain => "contain",
    }
  }

  pub fn from_config(s: &str) -> Self {
    match s.to_lowercase().as_str() {
      "contain" => FitMode::Contain,
      _ => FitMode::Cover,
    }
  }

  pub fn toggled(self) -> Self {
    match self {
      FitMode::Cover => FitMode::Contain,
      FitMode::Contain => FitMode::Cover,
    }
  }
}

/// State changes reported by the media transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
  /// The current source finished loading and is ready to play.
  Loaded,
  Position(f64),
  Duration(f64),
  Paused(bool),
  /// Playback stalled waiting for data (`true`) or resumed (`false`).
  Buffering(bool),
  /// Natural end of media.
  Ended,
}

/// The video element the playback session drives. All calls are synchronous
/// fire-and-forget; state flows back through [`TransportEvent`]s.
pub trait MediaTransport {
  fn has_media(&self) -> bool;
  /// Replace the source, starting at `start` seconds, playing if `autoplay`.
  fn load(&mut self, url: &str, start: f64, autoplay: bool);
  fn play(&mut self);
  fn pause(&mut self);
  fn is_paused(&self) -> bool;
  fn position(&self) -> f64;
  /// `NaN` while unknown.
  fn duration(&self) -> f64;
  fn seek(&mut self, secs: f64);
  fn set_fullscreen(&mut self, on: bool);
  fn set_fit(&mut self, fit: FitMode);
  fn stop(&mut self);
  /// Fold a reported event into the transport's cached state.
  fn observe(&mut self, event: &TransportEvent);
}

// --- mpv ---

/// Observed mpv properties, keyed by the observer id we register them under.
const OBSERVED: [(u64, &str); 4] = [(1, "time-pos"), (2, "duration"), (3, "pause"), (4, "paused-for-cache")];

/// Parse one line from mpv's JSON IPC socket into a transport event.
pub fn parse_mpv_event(line: &str) -> Option<TransportEvent> {
  let v: Value = serde_json::from_str(line).ok()?;
  match v.get("event")?.as_str()? {
    "file-loaded" => Some(TransportEvent::Loaded),
    "end-file" => (v.get("reason").and_then(Value::as_str) == Some("eof")).then_some(TransportEvent::Ended),
    "property-change" => {
      let data = v.get("data")?;
      match v.get("name")?.as_str()? {
        "time-pos" => data.as_f64().map(TransportEvent::Position),
        "duration" => data.as_f64().map(TransportEvent::Duration),
        "pause" => data.as_bool().map(TransportEvent::Paused),
        "paused-for-cache" => data.as_bool().map(TransportEvent::Buffering),
        _ => None,
      }
    }
    _ => None,
  }
}

/// An `mpv` window controlled over its JSON IPC socket.
pub struct MpvTransport {
  process: Option<TokioChild>,
  commands: mpsc::UnboundedSender<Value>,
  reader_handle: Option<JoinHandle<()>>,
  writer_handle: Option<JoinHandle<()>>,
  socket_path: Option<String>,
  has_media: bool,
  loaded: bool,
  paused: bool,
  position: f64,
  duration: f64,
  /// Seek requested before the file finished loading; applied on `Loaded`.
  pending_seek: Option<f64>,
}

impl MpvTransport {
  /// Start an idle mpv window and connect to its IPC socket.
  pub async fn spawn(fit: FitMode) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
    let socket_path = std::env::temp_dir().join(format!("drama-mpv-{}.sock", std::process::id()));
    let socket_path_str = socket_path.to_str().context("Temp dir path is not valid UTF-8")?.to_string();
    // Remove stale socket if it exists from a previous crash.
    let _ = std::fs::remove_file(&socket_path);

    let mut cmd = Command::new("mpv");
    cmd.args([
      "--idle=yes",
      "--force-window=yes",
      "--keep-open=no",
      "--really-quiet",
      "--title=drama",
      &format!("--input-ipc-server={}", socket_path_str),
    ]);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)")
      } else {
        anyhow!(e).context("Failed to spawn mpv process")
      }
    })?;

    let stream = connect_with_retry(&socket_path_str).await?;
    let (read_half, mut write_half) = stream.into_split();

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Value>();
    let writer_handle = tokio::spawn(async move {
      while let Some(cmd) = cmd_rx.recv().await {
        let mut line = cmd.to_string();
        line.push('\n');
        if let Err(e) = write_half.write_all(line.as_bytes()).await {
          warn!(err = %e, "mpv: IPC write failed");
          break;
        }
      }
    });

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let reader_handle = tokio::spawn(async move {
      let mut lines = TokioBufReader::new(read_half).lines();
      while let Ok(Some(line)) = lines.next_line().await {
        if let Some(event) = parse_mpv_event(&line)
          && event_tx.send(event).is_err()
        {
          break;
        }
      }
      debug!("mpv: IPC reader finished");
    });

    let mut transport = Self {
      process: Some(child),
      commands: cmd_tx,
      reader_handle: Some(reader_handle),
      writer_handle: Some(writer_handle),
      socket_path: Some(socket_path_str),
      has_media: false,
      loaded: false,
      paused: true,
      position: 0.0,
      duration: f64::NAN,
      pending_seek: None,
    };
    for (id, name) in OBSERVED {
      transport.send(json!(["observe_property", id, name]));
    }
    transport.set_fit(fit);
    info!("mpv: transport ready");
    Ok((transport, event_rx))
  }

  fn send(&self, command: Value) {
    if self.commands.send(json!({ "command": command })).is_err() {
      warn!("mpv: command channel closed");
    }
  }
}

async fn connect_with_retry(socket_path: &str) -> Result<UnixStream> {
  let mut last_err = None;
  for attempt in 0..constants().mpv_connect_attempts {
    match UnixStream::connect(socket_path).await {
      Ok(stream) => return Ok(stream),
      Err(e) => {
        debug!(attempt, err = %e, "mpv: IPC connect failed, retrying");
        last_err = Some(e);
        tokio::time::sleep(Duration::from_millis(constants().mpv_connect_delay_ms)).await;
      }
    }
  }
  Err(anyhow!("Failed to connect to mpv IPC socket: {}", last_err.map(|e| e.to_string()).unwrap_or_default()))
}

impl MediaTransport for MpvTransport {
  fn has_media(&self) -> bool {
    self.has_media
  }

  fn load(&mut self, url: &str, start: f64, autoplay: bool) {
    self.send(json!(["set_property", "pause", !autoplay]));
    self.send(json!(["loadfile", url, "replace"]));
    self.has_media = true;
    self.loaded = false;
    self.paused = !autoplay;
    self.position = start;
    self.duration = f64::NAN;
    self.pending_seek = (start > 0.0).then_some(start);
  }

  fn play(&mut self) {
    self.send(json!(["set_property", "pause", false]));
    self.paused = false;
  }

  fn pause(&mut self) {
    self.send(json!(["set_property", "pause", true]));
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
    if self.loaded {
      self.send(json!(["seek", secs, "absolute"]));
    } else {
      self.pending_seek = Some(secs);
    }
    self.position = secs;
  }

  fn set_fullscreen(&mut self, on: bool) {
    self.send(json!(["set_property", "fullscreen", on]));
  }

  fn set_fit(&mut self, fit: FitMode) {
    let panscan = match fit {
      FitMode::Cover => 1.0,
      FitMode::Contain => 0.0,
    };
    self.send(json!(["set_property", "panscan", panscan]));
  }

  fn stop(&mut self) {
    if self.process.is_none() {
      return;
    }
    self.send(json!(["quit"]));
    if let Some(handle) = self.reader_handle.take() {
      handle.abort();
    }
    if let Some(handle) = self.writer_handle.take() {
      handle.abort();
    }
    if let Some(mut child) = self.process.take()
      && let Err(e) = child.start_kill()
    {
      debug!(err = %e, "mpv: kill failed (already exited?)");
    }
    if let Some(path) = self.socket_path.take() {
      let _ = std::fs::remove_file(&path);
    }
    self.has_media = false;
    self.loaded = false;
  }

  fn observe(&mut self, event: &TransportEvent) {
    match *event {
      TransportEvent::Loaded => {
        self.loaded = true;
        if let Some(secs) = self.pending_seek.take() {
          self.send(json!(["seek", secs, "absolute"]));
        }
      }
      TransportEvent::Position(p) => {
        if self.loaded {
          self.position = p;
        }
      }
      TransportEvent::Duration(d) => self.duration = d,
      TransportEvent::Paused(p) => self.paused = p,
      TransportEvent::Buffering(_) => {}
      TransportEvent::Ended => {
        self.has_media = false;
        self.loaded = false;
      }
    }
  }
}

impl std::fmt::Debug for MpvTransport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MpvTransport")
      .field("socket_path", &self.socket_path)
      .field("has_media", &self.has_media)
      .field("paused", &self.paused)
      .finish_non_exhaustive()
  }
}

impl Drop for MpvTransport {
  fn drop(&mut self) {
    self.stop();
  }
}
