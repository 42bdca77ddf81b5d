mod api;
mod app;
mod config;
mod constants;
mod input;
mod location;
mod normalize;
mod notice;
mod playback;
mod player;
mod search;
mod timer;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use ratatui::{
  DefaultTerminal,
  crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
  },
};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use api::DramaClient;
use app::App;
use config::Config;
use constants::constants;
use location::Location;
use playback::Direction;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Upstream API base URL (overrides DRAMABOX_API_BASE and the config file)
  #[arg(long, global = true)]
  api_base: Option<String>,

  /// Content language sent to the API (default: from config, else "in")
  #[arg(long, global = true)]
  lang: Option<String>,

  /// Start at a location, e.g. '/?q=ceo' or '/watch?bookId=41000&index=3&source=search_result'
  #[arg(long, conflicts_with = "resume")]
  open: Option<String>,

  /// Start where the previous session left off
  #[arg(long)]
  resume: bool,

  #[command(subcommand)]
  command: Option<Command>,
}

/// Headless commands print JSON to stdout and exit.
#[derive(Subcommand, Debug)]
enum Command {
  /// Search titles by keyword
  Search {
    keyword: String,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    page_size: Option<u32>,
  },
  /// Keyword suggestions for a partial query
  Suggest { keyword: String },
  /// The trending rank
  Trending {
    #[arg(long)]
    rank_type: Option<u32>,
  },
  /// New releases
  New {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    page_size: Option<u32>,
  },
  /// Personalized feed
  Foryou {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    channel_id: Option<u32>,
    #[arg(long, default_value_t = 0)]
    index: u32,
  },
  /// Chapter list of a title
  Chapters { book_id: String },
  /// Resolve one chapter's video and the title's chapter list
  Watch {
    book_id: String,
    #[arg(default_value_t = 0)]
    index: u32,
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    keyword: Option<String>,
  },
  /// Print shell completions
  Completions { shell: clap_complete::Shell },
}

// --- Logging ---

/// Log to a daily rolling file in the data dir; the terminal belongs to the UI.
/// `DRAMA_LOG` takes an `EnvFilter` directive, default `info`.
fn init_logging() -> Option<WorkerGuard> {
  let dirs = config::project_dirs()?;
  let log_dir = dirs.data_dir().join("logs");
  std::fs::create_dir_all(&log_dir).ok()?;
  let appender = tracing_appender::rolling::daily(&log_dir, "drama.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env("DRAMA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
  Some(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(Command::Completions { shell }) = args.command {
    clap_complete::generate(shell, &mut Args::command(), "drama", &mut std::io::stdout());
    return Ok(());
  }

  let _log_guard = init_logging();
  let mut config = Config::load();
  let base = config.api_base(args.api_base.as_deref());
  let lang = config.lang(args.lang.as_deref());
  let client = DramaClient::new(&base, &lang)?;
  info!(base = %client.base_url(), lang = %client.lang(), "starting");

  if let Some(command) = args.command {
    return run_headless(&client, command).await;
  }

  let start = if let Some(ref raw) = args.open {
    Location::parse(raw).context("Invalid --open location")?
  } else if args.resume {
    match config.last_location.as_deref().map(Location::parse) {
      Some(Ok(location)) => location,
      Some(Err(e)) => {
        warn!(err = %e, "resume: ignoring unreadable saved location");
        Location::default()
      }
      None => Location::default(),
    }
  } else {
    Location::default()
  };

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  execute!(std::io::stdout(), EnableMouseCapture).context("Failed to enable mouse capture")?;
  let mut app = App::new(client, &config, start);
  let result = run(&mut terminal, &mut app).await;
  app.shutdown(&mut config);
  let _ = execute!(std::io::stdout(), DisableMouseCapture);
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
  app.start();

  loop {
    app.check_pending();

    terminal.draw(|frame| ui::ui(frame, app))?;

    if event::poll(Duration::from_millis(50))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(app, key).await?;
        }
        Event::Mouse(_) => app.activity(),
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }
  Ok(())
}

// --- Headless ---

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value).context("Failed to encode JSON")?);
  Ok(())
}

async fn run_headless(client: &DramaClient, command: Command) -> Result<()> {
  let c = constants();
  match command {
    Command::Search { keyword, page, page_size } => {
      print_json(&client.search(&keyword, page, page_size.unwrap_or(c.search_page_size)).await?)
    }
    Command::Suggest { keyword } => print_json(&client.suggest(&keyword).await?),
    Command::Trending { rank_type } => print_json(&client.rank(rank_type.unwrap_or(c.rank_type)).await?),
    Command::New { page, page_size } => {
      print_json(&client.new_releases(page, page_size.unwrap_or(c.new_page_size)).await?)
    }
    Command::Foryou { page, channel_id, index } => {
      print_json(&client.for_you(page, channel_id.unwrap_or(c.foryou_channel_id), index).await?)
    }
    Command::Chapters { book_id } => print_json(&client.chapters(&book_id).await?),
    Command::Watch { book_id, index, source, keyword } => {
      let source = source.unwrap_or_else(|| c.default_source.clone());
      let keyword = keyword.unwrap_or_default();
      let (video, chapters) = futures::join!(
        client.watch(&book_id, index, &source, &keyword, Direction::None),
        client.chapters(&book_id)
      );
      let chapters = chapters.unwrap_or_else(|e| {
        warn!(book_id = %book_id, err = %e, "watch: chapter list unavailable");
        Vec::new()
      });
      print_json(&serde_json::json!({ "video": video?, "chapters": chapters }))
    }
    Command::Completions { .. } => Ok(()),
  }
}
