use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

use super::condition::{Condition, ConditionVerdicts};
use super::message::MessageBoard;
use super::render::{ColorRole, SoundEvent};
use crate::config::FeedbackConfig;
use crate::spec::ConditionId;

/// Debounces rep verdicts and holds the single feedback lock
///
/// The lock is a FIFO mutex: whichever debounced fault reaches an idle lock first keeps
/// it until one of its own reps comes back good. A higher-priority fault never preempts it.
#[derive(Debug, Clone)]
pub struct PriorityArbiter {
    history_len: usize,
    debounce: usize,
    success_message: String,
    success_duration: Duration,
    message_priority: u8,
    history: BTreeMap<ConditionId, VecDeque<bool>>,
    error_counts: BTreeMap<ConditionId, u32>,
    active: Option<ConditionId>,
    bad_reps: u32,
}

impl PriorityArbiter {
    pub fn new(config: &FeedbackConfig) -> Self {
        Self {
            history_len: config.history_len.max(1),
            debounce: config.debounce.clamp(1, config.history_len.max(1)),
            success_message: config.success_message.clone(),
            success_duration: super::secs_to_duration(config.success_message_secs),
            message_priority: config.message_priority,
            history: BTreeMap::new(),
            error_counts: BTreeMap::new(),
            active: None,
            bad_reps: 0,
        }
    }

    /// Condition currently holding the lock
    pub fn active(&self) -> Option<&ConditionId> {
        self.active.as_ref()
    }

    pub fn error_counts(&self) -> &BTreeMap<ConditionId, u32> {
        &self.error_counts
    }

    pub fn bad_reps(&self) -> u32 {
        self.bad_reps
    }

    pub fn history(&self, id: &ConditionId) -> Option<&VecDeque<bool>> {
        self.history.get(id)
    }

    /// Record one condition's rep verdict; returns the sound it asks for, if any
    pub fn submit(
        &mut self,
        id: &ConditionId,
        rep_is_good: bool,
        message: Option<&str>,
        board: &mut MessageBoard,
        now: Instant,
    ) -> Option<SoundEvent> {
        let history = self.history.entry(id.clone()).or_default();
        history.push_back(rep_is_good);
        while history.len() > self.history_len {
            history.pop_front();
        }
        let debounced = history.len() >= self.debounce
            && history.iter().rev().take(self.debounce).all(|good| !good);

        if !rep_is_good {
            *self.error_counts.entry(id.clone()).or_insert(0) += 1;
        }

        if self.active.is_none() {
            if !debounced {
                return None;
            }
            debug!(condition = %id, "Feedback lock acquired");
            self.active = Some(id.clone());
            board.set(
                message.unwrap_or(id.as_str()),
                ColorRole::Bad,
                Duration::ZERO,
                self.message_priority,
                now,
            );
            return Some(SoundEvent::Error);
        }

        if self.active.as_ref() != Some(id) {
            return None;
        }
        if !rep_is_good {
            return Some(SoundEvent::Error);
        }

        debug!(condition = %id, "Feedback lock released");
        self.active = None;
        board.set(
            self.success_message.clone(),
            ColorRole::Good,
            self.success_duration,
            self.message_priority,
            now,
        );
        Some(SoundEvent::Success)
    }

    /// Hand over a finished rep's verdicts
    ///
    /// Conditions are submitted in ascending priority number, ties in declaration order;
    /// ids not declared go last. One sound results: error > success > count.
    pub fn commit_rep(
        &mut self,
        verdicts: &ConditionVerdicts,
        conditions: &[Condition],
        board: &mut MessageBoard,
        now: Instant,
    ) -> SoundEvent {
        let mut order: Vec<(u32, usize, &ConditionId, bool)> = verdicts
            .iter()
            .map(|(id, &good)| {
                let declared = conditions.iter().position(|c| &c.id == id);
                let priority = declared.map_or(u32::MAX, |i| conditions[i].priority);
                (priority, declared.unwrap_or(usize::MAX), id, good)
            })
            .collect();
        order.sort_by_key(|&(priority, index, _, _)| (priority, index));

        if verdicts.values().any(|good| !good) {
            self.bad_reps += 1;
        }

        let mut sound: Option<SoundEvent> = None;
        for (_, index, id, good) in order {
            let message = conditions.get(index).and_then(|c| c.message.as_deref());
            if let Some(event) = self.submit(id, good, message, board, now) {
                sound = Some(sound.map_or(event, |s| s.max(event)));
            }
        }

        sound.unwrap_or(SoundEvent::Count)
    }
}
