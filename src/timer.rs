use std::time::{Duration, Instant};

/// A single pending timer. Arming it again replaces the previous deadline,
/// so at most one firing is ever outstanding.
///
/// Deadlines never read the clock themselves: callers pass `now`, which keeps
/// the sessions that own them deterministic under test.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
  due: Option<Instant>,
}

impl Deadline {
  pub fn arm(&mut self, now: Instant, after: Duration) {
    self.due = Some(now + after);
  }

  pub fn cancel(&mut self) {
    self.due = None;
  }

  pub fn is_armed(&self) -> bool {
    self.due.is_some()
  }

  /// Returns `true` exactly once when `now` has reached the deadline, disarming it.
  pub fn fire(&mut self, now: Instant) -> bool {
    match self.due {
      Some(due) if now >= due => {
        self.due = None;
        true
      }
      _ => false,
    }
  }
}
