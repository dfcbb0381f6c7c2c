//! Placement of tasks on a single-day,
//! 24-hour timeline track.
//!
//! Vertical placement comes straight from
//! wall-clock minutes. Horizontal placement
//! is a greedy lane heuristic: each task is
//! shifted right by one lane step for every
//! *earlier* task in the input that
//! overlaps it. The result depends on input
//! order, and two tasks can share a lane
//! even when a proper interval colouring
//! would separate them. Callers that want
//! stable lanes should sort by start time
//! first.

use chrono_tz::Tz;
use serde::Serialize;

use crate::datetime::{
  MINUTES_PER_DAY,
  minutes_since_midnight
};
use crate::task::Task;

/// Horizontal shift per overlapping task,
/// as a fraction of the track width.
pub const LANE_STEP: f64 = 0.2;

/// Fractions of the full-day track. With
/// five or more overlaps `left` reaches
/// `1.0` and `width` drops to zero or
/// below; clamping is left to the view.
#[derive(
  Debug, Clone, Copy, PartialEq, Serialize,
)]
pub struct Position {
  pub top:      f64,
  pub height:   f64,
  pub left:     f64,
  pub width:    f64,
  /// Earlier tasks this one overlaps.
  pub overlaps: usize
}

impl Position {
  pub fn top_percent(&self) -> f64 {
    self.top * 100.0
  }

  pub fn height_percent(&self) -> f64 {
    self.height * 100.0
  }

  pub fn left_percent(&self) -> f64 {
    self.left * 100.0
  }

  pub fn width_percent(&self) -> f64 {
    self.width * 100.0
  }
}

#[derive(Debug, Clone, Copy)]
struct Span {
  start: u32,
  end:   u32
}

impl Span {
  fn of(task: &Task, tz: &Tz) -> Self {
    let start = minutes_since_midnight(
      task.start_time,
      tz
    );
    // End before start on the wall
    // clock means the record runs past
    // midnight; it collapses to zero
    // length at its start.
    let end = minutes_since_midnight(
      task.end_time,
      tz
    )
    .max(start);
    Self {
      start,
      end
    }
  }

  fn overlaps(&self, other: &Span) -> bool {
    self.start < other.end
      && other.start < self.end
  }
}

/// One `Position` per task, in input order.
#[tracing::instrument(skip_all, fields(count = tasks.len()))]
pub fn compute_positions(
  tasks: &[Task],
  tz: &Tz
) -> Vec<Position> {
  let spans: Vec<Span> = tasks
    .iter()
    .map(|task| Span::of(task, tz))
    .collect();
  let total = f64::from(MINUTES_PER_DAY);

  spans
    .iter()
    .enumerate()
    .map(|(idx, span)| {
      let overlaps = spans[..idx]
        .iter()
        .filter(|earlier| {
          span.overlaps(earlier)
        })
        .count();
      let left =
        LANE_STEP * overlaps as f64;

      Position {
        top: f64::from(span.start)
          / total,
        height: f64::from(
          span.end - span.start
        ) / total,
        left,
        width: 1.0 - left,
        overlaps
      }
    })
    .collect()
}
