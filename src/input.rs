use anyhow::Result;
use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{App, AppMode};

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Step a list selection by one, wrapping at both ends.
fn step_selection(selected: Option<usize>, count: usize, forward: bool) -> Option<usize> {
  if count == 0 {
    return None;
  }
  Some(match selected {
    None => 0,
    Some(i) if forward => (i + 1) % count,
    Some(0) => count - 1,
    Some(i) => (i - 1).min(count - 1),
  })
}

// --- Event Handling ---

pub async fn handle_key_event(app: &mut App, key: event::KeyEvent) -> Result<()> {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return Ok(());
  }

  app.activity();
  match app.mode {
    AppMode::Input => handle_input_key(app, key),
    AppMode::Results => handle_results_key(app, key),
    AppMode::Watch => handle_watch_key(app, key),
    AppMode::Chapters => handle_chapters_key(app, key),
    AppMode::Quality => handle_quality_key(app, key),
  }
  Ok(())
}

fn edit_query(app: &mut App, edit: impl FnOnce(&mut String, &mut usize)) {
  let mut text = app.search.query().to_string();
  let mut cursor = app.cursor_position;
  edit(&mut text, &mut cursor);
  app.cursor_position = cursor;
  app.update_query(text);
}

fn handle_input_key(app: &mut App, key: event::KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter => {
      app.submit_search();
    }
    KeyCode::Char(c) => edit_query(app, |text, cursor| {
      let byte_idx = char_to_byte_index(text, *cursor);
      text.insert(byte_idx, c);
      *cursor += 1;
    }),
    KeyCode::Backspace => {
      if app.cursor_position > 0 {
        edit_query(app, |text, cursor| {
          *cursor -= 1;
          let byte_idx = char_to_byte_index(text, *cursor);
          text.remove(byte_idx);
        });
      }
    }
    KeyCode::Delete => {
      if app.cursor_position < app.search.query().chars().count() {
        edit_query(app, |text, cursor| {
          let byte_idx = char_to_byte_index(text, *cursor);
          text.remove(byte_idx);
        });
      }
    }
    KeyCode::Left => {
      app.cursor_position = app.cursor_position.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.cursor_position < app.search.query().chars().count() {
        app.cursor_position += 1;
      }
    }
    KeyCode::Home => {
      app.cursor_position = 0;
    }
    KeyCode::End => {
      app.cursor_position = app.search.query().chars().count();
    }
    KeyCode::Esc => {
      if !app.search.query().is_empty() {
        app.clear_search();
      } else {
        app.should_quit = true;
      }
    }
    KeyCode::Down | KeyCode::Tab => {
      if !app.search.visible_items().is_empty() {
        if app.list_state.selected().is_none() {
          app.list_state.select(Some(0));
        }
        app.mode = AppMode::Results;
      }
    }
    _ => {}
  }
}

fn handle_results_key(app: &mut App, key: event::KeyEvent) {
  let count = app.search.visible_items().len();
  match key.code {
    KeyCode::Enter => {
      app.open_selected();
    }
    KeyCode::Down | KeyCode::Char('j') => {
      app.list_state.select(step_selection(app.list_state.selected(), count, true));
    }
    KeyCode::Up | KeyCode::Char('k') => {
      app.list_state.select(step_selection(app.list_state.selected(), count, false));
    }
    KeyCode::Esc | KeyCode::Tab | KeyCode::Char('/') => {
      app.mode = AppMode::Input;
    }
    _ => {}
  }
}

fn handle_watch_key(app: &mut App, key: event::KeyEvent) {
  let Some(screen) = app.watch.as_mut() else {
    // Player still starting.
    if matches!(key.code, KeyCode::Esc | KeyCode::Backspace) {
      app.exit_watch();
    }
    return;
  };
  match key.code {
    KeyCode::Char(' ') | KeyCode::Char('k') => screen.session.toggle_play(),
    KeyCode::Char('f') => screen.session.toggle_fullscreen(),
    KeyCode::Left => {
      screen.session.seek_step(false);
    }
    KeyCode::Right => {
      screen.session.seek_step(true);
    }
    KeyCode::Char(d @ '0'..='9') => {
      let percent = f64::from(d.to_digit(10).unwrap_or(0)) * 10.0;
      screen.session.seek_percent(percent);
    }
    KeyCode::Char('n') => app.next_chapter(),
    KeyCode::Char('m') => app.toggle_fit(),
    KeyCode::Char('l') | KeyCode::Tab => {
      screen.sidebar_visible = true;
      if screen.chapter_state.selected().is_none() && !screen.session.chapters().is_empty() {
        screen.chapter_state.select(Some(0));
      }
      app.mode = AppMode::Chapters;
    }
    KeyCode::Char('q') | KeyCode::Char('Q') => {
      if screen.session.qualities_desc().is_empty() {
        return;
      }
      let current = screen.session.quality();
      let pos = screen.session.qualities_desc().iter().position(|q| Some(q.quality) == current);
      screen.quality_state.select(pos.or(Some(0)));
      app.mode = AppMode::Quality;
    }
    KeyCode::Char('s') => screen.sidebar_visible = !screen.sidebar_visible,
    KeyCode::Esc | KeyCode::Backspace => app.exit_watch(),
    _ => {}
  }
}

fn handle_chapters_key(app: &mut App, key: event::KeyEvent) {
  let Some(screen) = app.watch.as_mut() else {
    app.mode = AppMode::Input;
    return;
  };
  let count = screen.session.chapters().len();
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => {
      screen.chapter_state.select(step_selection(screen.chapter_state.selected(), count, true));
    }
    KeyCode::Up | KeyCode::Char('k') => {
      screen.chapter_state.select(step_selection(screen.chapter_state.selected(), count, false));
    }
    KeyCode::Enter => {
      let index =
        screen.chapter_state.selected().and_then(|i| screen.session.chapters().get(i)).map(|c| c.chapter_index);
      if let Some(index) = index {
        app.jump_to_chapter(index);
      }
      app.mode = AppMode::Watch;
    }
    KeyCode::Esc | KeyCode::Tab | KeyCode::Char('h') => {
      app.mode = AppMode::Watch;
    }
    _ => {}
  }
}

fn handle_quality_key(app: &mut App, key: event::KeyEvent) {
  let Some(screen) = app.watch.as_mut() else {
    app.mode = AppMode::Input;
    return;
  };
  let count = screen.session.qualities_desc().len();
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => {
      screen.quality_state.select(step_selection(screen.quality_state.selected(), count, true));
    }
    KeyCode::Up | KeyCode::Char('k') => {
      screen.quality_state.select(step_selection(screen.quality_state.selected(), count, false));
    }
    KeyCode::Enter => {
      let level =
        screen.quality_state.selected().and_then(|i| screen.session.qualities_desc().get(i).map(|q| q.quality));
      if let Some(level) = level {
        screen.session.switch_quality(level);
      }
      app.mode = AppMode::Watch;
    }
    KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => {
      app.mode = AppMode::Watch;
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // --- char_to_byte_index ---

  #[test]
  fn char_to_byte_ascii() {
    assert_eq!(char_to_byte_index("hello", 0), 0);
    assert_eq!(char_to_byte_index("hello", 3), 3);
    assert_eq!(char_to_byte_index("hello", 5), 5); // past end
  }

  #[test]
  fn char_to_byte_multibyte() {
    let s = "aé日"; // a=1 byte, é=2 bytes, 日=3 bytes
    assert_eq!(char_to_byte_index(s, 1), 1);
    assert_eq!(char_to_byte_index(s, 2), 3);
    assert_eq!(char_to_byte_index(s, 3), 6); // past end
  }

  // --- step_selection ---

  #[test]
  fn step_wraps_both_ways() {
    assert_eq!(step_selection(Some(2), 3, true), Some(0));
    assert_eq!(step_selection(Some(0), 3, false), Some(2));
    assert_eq!(step_selection(Some(1), 3, false), Some(0));
    assert_eq!(step_selection(None, 3, false), Some(0));
  }

  #[test]
  fn step_on_empty_list_clears() {
    assert_eq!(step_selection(Some(4), 0, true), None);
  }

  #[test]
  fn step_clamps_stale_selection() {
    assert_eq!(step_selection(Some(9), 3, false), Some(2));
  }
}
