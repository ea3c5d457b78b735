use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::metric::{self, FrameContext};
use crate::spec::{Operator, StateMachineSpec};

/// Rep phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    #[serde(alias = "START", alias = "up", alias = "prepare")]
    Start,
    #[serde(alias = "ACTIVE", alias = "down", alias = "DOWN")]
    Active,
}

/// Transition emitted by one state machine update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepEvent {
    /// start -> active; a new rep cycle begins
    Entered,
    /// active -> start; rep counted, verdicts must be committed
    Completed,
    /// active -> start inside the cooldown window; not counted, nothing committed
    Bounced,
    /// Stall recovery; not counted, nothing committed
    Aborted,
}

/// Start/active hysteresis with a count cooldown and stall recovery
#[derive(Debug, Clone)]
pub struct RepStateMachine {
    spec: StateMachineSpec,
    cooldown: Duration,
    phase: Phase,
    active_since: Option<Instant>,
    last_count_at: Option<Instant>,
    reps: u32,
}

impl RepStateMachine {
    pub fn new(spec: &StateMachineSpec, cooldown_secs: f32) -> Self {
        Self {
            spec: spec.clone(),
            cooldown: super::secs_to_duration(cooldown_secs),
            phase: Phase::Start,
            active_since: None,
            last_count_at: None,
            reps: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn reps(&self) -> u32 {
        self.reps
    }

    pub fn update(&mut self, ctx: &FrameContext<'_>, now: Instant) -> Option<RepEvent> {
        match self.phase {
            Phase::Start => {
                let trigger = &self.spec.trigger_down;
                let value = metric::evaluate(&trigger.metric, ctx);
                if trigger.operator_or(Operator::Greater).holds(value, trigger.threshold) {
                    self.phase = Phase::Active;
                    self.active_since = Some(now);
                    debug!(value, "Rep started");
                    return Some(RepEvent::Entered);
                }
                None
            }
            Phase::Active => {
                let trigger = &self.spec.trigger_up;
                let value = metric::evaluate(&trigger.metric, ctx);
                if trigger.operator_or(Operator::Less).holds(value, trigger.threshold) {
                    self.phase = Phase::Start;
                    self.active_since = None;

                    let cooling = self
                        .last_count_at
                        .is_some_and(|t| now.saturating_duration_since(t) < self.cooldown);
                    if cooling {
                        debug!(value, "Return to start inside cooldown, not counted");
                        return Some(RepEvent::Bounced);
                    }

                    self.reps += 1;
                    self.last_count_at = Some(now);
                    debug!(reps = self.reps, "Rep counted");
                    return Some(RepEvent::Completed);
                }

                if let (Some(breaker), Some(since)) = (&self.spec.zombie_breaker, self.active_since) {
                    let stalled = now.saturating_duration_since(since).as_secs_f32() > breaker.timeout_sec;
                    if stalled {
                        let reset = &breaker.reset_condition;
                        let value = metric::evaluate(&reset.metric, ctx);
                        if reset.operator_or(Operator::Greater).holds(value, reset.threshold) {
                            self.phase = Phase::Start;
                            self.active_since = None;
                            debug!(value, "Stalled rep aborted");
                            return Some(RepEvent::Aborted);
                        }
                    }
                }
                None
            }
        }
    }
}
