use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Color, Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, Clear, LineGauge, List, ListItem, Padding, Paragraph},
};

use crate::app::{App, AppMode, WatchScreen};
use crate::normalize::{format_count, format_time, primary_tag};
use crate::playback::{FetchPhase, PlayPhase};
use crate::search::SearchPhase;

// --- Palette ---

pub struct Theme {
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub status: Color,
  pub error: Color,
  pub success: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEME: Theme = Theme {
  bg: Color::Rgb(24, 20, 28),
  fg: Color::Rgb(236, 228, 240),
  accent: Color::Rgb(255, 121, 168),
  muted: Color::Rgb(140, 128, 150),
  border: Color::Rgb(78, 66, 88),
  highlight_fg: Color::Rgb(24, 20, 28),
  highlight_bg: Color::Rgb(255, 121, 168),
  stripe_bg: Color::Rgb(32, 27, 37),
  status: Color::Rgb(255, 203, 107),
  error: Color::Rgb(255, 95, 95),
  success: Color::Rgb(126, 231, 135),
  key_fg: Color::Rgb(24, 20, 28),
  key_bg: Color::Rgb(140, 128, 150),
};

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` display columns, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
  if s.width() <= max_width {
    return s.to_string();
  }
  let budget = max_width.saturating_sub(1);
  let mut used = 0;
  let truncated: String = s
    .chars()
    .take_while(|c| {
      used += c.width().unwrap_or(0);
      used <= budget
    })
    .collect();
  format!("{}…", truncated)
}

fn rounded_block(title: impl Into<Line<'static>>, focused: bool) -> Block<'static> {
  let color = if focused { THEME.accent } else { THEME.border };
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(THEME.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(color))
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  frame.render_widget(Block::default().style(Style::default().bg(THEME.bg)), frame.area());

  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(if app.watch.is_some() { 0 } else { 3 }),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  if app.watch.is_some() {
    render_watch(frame, app, main_area);
  } else {
    render_results(frame, app, main_area);
    render_input(frame, app, input_area);
  }
  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let left = Line::from(Span::styled(" ▶ drama ", Style::default().fg(THEME.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let location = format!("{} ", app.history.current());
  let max_w = (area.width as usize).saturating_sub(12);
  let location = truncate_str(&location, max_w);
  let width = unicode_width::UnicodeWidthStr::width(location.as_str()) as u16;
  let right = Line::from(Span::styled(location, Style::default().fg(THEME.muted)));
  let right_area = Rect { x: area.x + area.width.saturating_sub(width), width, ..area };
  frame.render_widget(right, right_area);
}

fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
  let items = app.search.visible_items();
  let title = if app.search.shows_results() {
    format!(" Results for '{}' ", truncate_str(app.search.trimmed_query(), 30))
  } else {
    " Trending ".to_string()
  };
  let focused = app.mode == AppMode::Results;

  if items.is_empty() {
    let hint = match app.search.phase() {
      SearchPhase::Debouncing | SearchPhase::Searching => "Searching…",
      SearchPhase::Ready => "No results.",
      SearchPhase::Idle | SearchPhase::ShowingTrending => "Type at least two characters to search.",
    };
    let lines = vec![Line::from(""), Line::from(Span::styled(hint, Style::default().fg(THEME.muted)))];
    let paragraph = Paragraph::new(lines)
      .alignment(Alignment::Center)
      .block(rounded_block(title, focused));
    frame.render_widget(paragraph, area);
    return;
  }

  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = area.width.saturating_sub(4) as usize;

  let rows: Vec<ListItem> = items
    .iter()
    .enumerate()
    .map(|(i, item)| {
      let is_selected = Some(i) == app.list_state.selected();
      let fg = if is_selected { THEME.highlight_fg } else { THEME.fg };
      let bg = if is_selected {
        THEME.highlight_bg
      } else if i % 2 == 1 {
        THEME.stripe_bg
      } else {
        THEME.bg
      };

      let right = format!("{}  ▶ {}", primary_tag(item), format_count(item.play_count));
      let right_w = unicode_width::UnicodeWidthStr::width(right.as_str());
      let title = truncate_str(&item.book_name, inner_w.saturating_sub(right_w + 2));
      let title_w = unicode_width::UnicodeWidthStr::width(title.as_str());
      let gap = inner_w.saturating_sub(title_w + right_w);

      let line = Line::from(vec![
        Span::styled(title, Style::default().fg(fg)),
        Span::raw(" ".repeat(gap)),
        Span::styled(right, Style::default().fg(if is_selected { fg } else { THEME.muted })),
      ]);
      ListItem::new(line).bg(bg)
    })
    .collect();

  let list = List::new(rows)
    .block(rounded_block(title, focused))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(THEME.highlight_fg).bg(THEME.highlight_bg).add_modifier(Modifier::BOLD));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_watch(frame: &mut Frame, app: &mut App, area: Rect) {
  let mode = app.mode;
  let Some(screen) = app.watch.as_mut() else { return };

  let [player_area, sidebar_area] = if screen.sidebar_visible {
    Layout::horizontal([Constraint::Percentage(64), Constraint::Percentage(36)]).areas(area)
  } else {
    Layout::horizontal([Constraint::Percentage(100), Constraint::Length(0)]).areas(area)
  };

  render_player(frame, screen, player_area);
  if screen.sidebar_visible {
    render_chapters(frame, screen, sidebar_area, mode == AppMode::Chapters);
  }
  if mode == AppMode::Quality {
    render_quality_menu(frame, screen, player_area);
  }
}

fn render_player(frame: &mut Frame, screen: &WatchScreen, area: Rect) {
  let session = &screen.session;
  let block = rounded_block(" Now Playing ", false).padding(Padding::horizontal(1));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let inner_w = inner.width as usize;
  let title = screen.title.clone().unwrap_or_else(|| format!("Book {}", session.book_id()));
  let phase = match (session.fetch_phase(), session.play_phase()) {
    (FetchPhase::Loading, _) => ("Loading…", THEME.status),
    (FetchPhase::Error, _) => ("Unavailable", THEME.error),
    (FetchPhase::Idle, _) => ("Idle", THEME.muted),
    (FetchPhase::Ready, PlayPhase::Playing) => ("Playing", THEME.success),
    (FetchPhase::Ready, PlayPhase::Buffering) => ("Buffering…", THEME.status),
    (FetchPhase::Ready, PlayPhase::Paused) => ("Paused", THEME.muted),
  };
  let quality = session.quality().map_or_else(|| "auto".to_string(), |q| format!("{}p", q));

  let mut lines = vec![
    Line::from(""),
    Line::from(Span::styled(truncate_str(&title, inner_w), Style::default().fg(THEME.fg).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(vec![
      Span::styled("Episode   ", Style::default().fg(THEME.muted)),
      Span::styled((session.index() + 1).to_string(), Style::default().fg(THEME.fg)),
    ]),
    Line::from(vec![
      Span::styled("State     ", Style::default().fg(THEME.muted)),
      Span::styled(phase.0, Style::default().fg(phase.1)),
    ]),
    Line::from(vec![
      Span::styled("Quality   ", Style::default().fg(THEME.muted)),
      Span::styled(quality, Style::default().fg(THEME.fg)),
    ]),
    Line::from(vec![
      Span::styled("Fit       ", Style::default().fg(THEME.muted)),
      Span::styled(session.fit().label(), Style::default().fg(THEME.fg)),
      Span::styled(if session.is_fullscreen() { "  fullscreen" } else { "" }, Style::default().fg(THEME.muted)),
    ]),
  ];
  if let Some(video) = session.video()
    && video.qualities.iter().any(|q| q.is_vip)
  {
    lines.push(Line::from(Span::styled("VIP renditions available", Style::default().fg(THEME.muted))));
  }

  let [info_area, gauge_area, controls_area] =
    Layout::vertical([Constraint::Min(1), Constraint::Length(1), Constraint::Length(1)]).areas(inner);
  frame.render_widget(Paragraph::new(lines), info_area);

  let time_label =
    format!("{} / {}", format_time(session.current_time()), format_time(session.duration()));
  let gauge = LineGauge::default()
    .ratio((session.progress() / 100.0).clamp(0.0, 1.0))
    .label(time_label)
    .filled_style(Style::default().fg(THEME.accent))
    .unfilled_style(Style::default().fg(THEME.border));
  frame.render_widget(gauge, gauge_area);

  if session.controls_visible() {
    let toggle = if session.is_playing() { "⏸ Space" } else { "▶ Space" };
    let hint = format!("{}  ⏪ ←  ⏩ →  0-9 jump", toggle);
    frame.render_widget(
      Paragraph::new(Span::styled(hint, Style::default().fg(THEME.muted))).alignment(Alignment::Center),
      controls_area,
    );
  }
}

fn render_chapters(frame: &mut Frame, screen: &mut WatchScreen, area: Rect, focused: bool) {
  let current = screen.session.index();
  let inner_w = area.width.saturating_sub(4) as usize;
  let rows: Vec<ListItem> = screen
    .session
    .chapters()
    .iter()
    .map(|c| {
      let marker = if c.chapter_index == current { "● " } else { "  " };
      let lock = if c.is_charge { " 🔒" } else { "" };
      let name = c.chapter_name.clone().unwrap_or_else(|| format!("Episode {}", c.chapter_index + 1));
      let text = truncate_str(&format!("{}{}{}", marker, name, lock), inner_w);
      let fg = if c.chapter_index == current { THEME.accent } else { THEME.fg };
      ListItem::new(Line::from(Span::styled(text, Style::default().fg(fg))))
    })
    .collect();

  let title = format!(" Episodes ({}) ", rows.len());
  let list = List::new(rows)
    .block(rounded_block(title, focused))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(THEME.highlight_fg).bg(THEME.highlight_bg));
  frame.render_stateful_widget(list, area, &mut screen.chapter_state);
}

fn render_quality_menu(frame: &mut Frame, screen: &mut WatchScreen, area: Rect) {
  let current = screen.session.quality();
  let rows: Vec<ListItem> = screen
    .session
    .qualities_desc()
    .iter()
    .map(|q| {
      let mut label = format!("{}p", q.quality);
      if Some(q.quality) == current {
        label.push_str("  ✓");
      }
      if q.is_vip {
        label.push_str("  VIP");
      }
      ListItem::new(label)
    })
    .collect();

  let height = (rows.len() as u16 + 2).min(area.height);
  let width = 20.min(area.width);
  let popup = Rect {
    x: area.x + area.width.saturating_sub(width) / 2,
    y: area.y + area.height.saturating_sub(height) / 2,
    width,
    height,
  };
  let list = List::new(rows)
    .block(rounded_block(" Quality ", true))
    .style(Style::default().fg(THEME.fg).bg(THEME.bg))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(THEME.highlight_fg).bg(THEME.highlight_bg));
  frame.render_widget(Clear, popup);
  frame.render_stateful_widget(list, popup, &mut screen.quality_state);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let (text, style) = if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(THEME.error))
  } else if let Some(info) = &app.info_message {
    (format!(" ✓ {}", info), Style::default().fg(THEME.success))
  } else if app.is_loading_video() {
    (" ⏳ Loading episode…".to_string(), Style::default().fg(THEME.status))
  } else if app.watch.is_none() && (app.search.is_searching() || app.search.is_debouncing()) {
    (format!(" ⏳ Searching '{}'…", app.search.trimmed_query()), Style::default().fg(THEME.status))
  } else {
    (" Ready".to_string(), Style::default().fg(THEME.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let border_color = if app.mode == AppMode::Input { THEME.accent } else { THEME.border };
  let input_block = Block::bordered()
    .title(" Search dramas ")
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let query = app.search.query();
  let cursor_col = display_width(query, app.cursor_position);

  if cursor_col < app.input_scroll {
    app.input_scroll = cursor_col;
  } else if cursor_col >= app.input_scroll + inner_w {
    app.input_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = query
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let paragraph = Paragraph::new(visible).style(Style::default().fg(THEME.fg)).block(input_block);
  frame.render_widget(paragraph, area);

  if app.mode == AppMode::Input {
    let cursor_x = area.x + 2 + (cursor_col - app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let keys: Vec<(&str, &str)> = match app.mode {
    AppMode::Input => {
      let mut k = vec![("Enter", "Search")];
      if !app.search.visible_items().is_empty() {
        k.push(("↓", "Results"));
      }
      k.push(("Esc", if app.search.query().is_empty() { "Quit" } else { "Clear" }));
      k
    }
    AppMode::Results => vec![("Enter", "Watch"), ("j/k", "Navigate"), ("Esc", "Search")],
    AppMode::Watch if app.watch.is_none() => vec![("Esc", "Cancel")],
    AppMode::Watch => {
      let playing = app.watch.as_ref().is_some_and(|w| w.session.is_playing());
      vec![
        ("Space", if playing { "Pause" } else { "Play" }),
        ("←/→", "Seek"),
        ("n", "Next"),
        ("Tab", "Episodes"),
        ("q", "Quality"),
        ("f", "Fullscreen"),
        ("m", "Fit"),
        ("Esc", "Back"),
      ]
    }
    AppMode::Chapters => vec![("Enter", "Jump"), ("j/k", "Navigate"), ("Esc", "Player")],
    AppMode::Quality => vec![("Enter", "Switch"), ("j/k", "Navigate"), ("Esc", "Close")],
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(THEME.key_fg).bg(THEME.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(THEME.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truncate_short_strings_untouched() {
    assert_eq!(truncate_str("abc", 5), "abc");
    assert_eq!(truncate_str("abcde", 5), "abcde");
  }

  #[test]
  fn truncate_appends_ellipsis() {
    assert_eq!(truncate_str("abcdef", 4), "abc…");
  }

  #[test]
  fn truncate_counts_wide_chars() {
    // Each CJK char is two columns wide.
    assert_eq!(truncate_str("总裁的新娘", 5), "总裁…");
  }

  #[test]
  fn display_width_wide_chars() {
    assert_eq!(display_width("a日b", 2), 3);
    assert_eq!(display_width("a日b", 10), 4);
  }
}
