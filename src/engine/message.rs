use std::time::{Duration, Instant};

use super::render::ColorRole;

/// Text shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub text: String,
    pub role: ColorRole,
    /// Higher number wins
    pub priority: u8,
    /// `None`: stays until replaced
    pub expires_at: Option<Instant>,
}

impl StatusMessage {
    pub fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| now < t)
    }
}

/// Single-slot message board
#[derive(Debug, Clone, Default)]
pub struct MessageBoard {
    current: Option<StatusMessage>,
}

impl MessageBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a message; a zero `duration` never expires
    ///
    /// Ignored while a strictly higher-priority message is still live. Returns whether
    /// the message was accepted.
    pub fn set(
        &mut self,
        text: impl Into<String>,
        role: ColorRole,
        duration: Duration,
        priority: u8,
        now: Instant,
    ) -> bool {
        if let Some(current) = &self.current {
            if priority < current.priority && current.is_live(now) {
                return false;
            }
        }
        self.current = Some(StatusMessage {
            text: text.into(),
            role,
            priority,
            expires_at: if duration.is_zero() { None } else { now.checked_add(duration) },
        });
        true
    }

    /// Current message; an expired one is dropped
    pub fn current(&mut self, now: Instant) -> Option<&StatusMessage> {
        if self.current.as_ref().is_some_and(|m| !m.is_live(now)) {
            self.current = None;
        }
        self.current.as_ref()
    }

    /// Clear only if `text` is still what is showing
    pub fn clear_if(&mut self, text: &str) {
        if self.current.as_ref().is_some_and(|m| m.text == text) {
            self.current = None;
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
