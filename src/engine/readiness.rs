use std::time::{Duration, Instant};
use tracing::debug;

use super::message::MessageBoard;
use super::render::ColorRole;
use crate::pose::{PointId, PointSet};
use crate::spec::ReadinessSpec;

const HINT_PRIORITY: u8 = 1;

/// Holds analysis back until the required points are in view
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    required: Vec<PointId>,
    hint: String,
    timeout: Duration,
    missing_since: Option<Instant>,
    hint_posted: bool,
}

impl ReadinessGate {
    pub fn new(spec: &ReadinessSpec, default_timeout_secs: f32) -> Self {
        Self {
            required: spec.required_points.clone(),
            hint: spec.hint.clone(),
            timeout: super::secs_to_duration(spec.timeout_sec.unwrap_or(default_timeout_secs)),
            missing_since: None,
            hint_posted: false,
        }
    }

    /// `true` when every required point is present
    pub fn check(&mut self, points: &PointSet, board: &mut MessageBoard, now: Instant) -> bool {
        if self.required.iter().all(|&id| points.contains(id)) {
            self.missing_since = None;
            if self.hint_posted {
                board.clear_if(&self.hint);
                self.hint_posted = false;
            }
            return true;
        }

        let since = *self.missing_since.get_or_insert(now);
        if !self.hint_posted
            && !self.hint.is_empty()
            && now.saturating_duration_since(since) > self.timeout
        {
            self.hint_posted = board.set(
                self.hint.as_str(),
                ColorRole::Neutral,
                Duration::ZERO,
                HINT_PRIORITY,
                now,
            );
            if self.hint_posted {
                debug!(hint = %self.hint, "Readiness hint shown");
            }
        }
        false
    }
}
