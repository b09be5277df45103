//! Chat-ban countdown
//!
//! The server announces a ban with the seconds left; the client keeps a
//! deadline so the countdown stays correct across ticks and reconnects.

use std::time::{Duration, Instant};

/// Longest ban the client will track; larger server values are clamped
pub const MAX_BAN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Deadline-based ban countdown
#[derive(Debug, Clone, Default)]
pub struct BanCountdown {
    until: Option<Instant>,
}

impl BanCountdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or replace) a ban lasting `time_left` from `now`, at most [`MAX_BAN`]
    pub fn impose(&mut self, time_left: Duration, now: Instant) {
        if time_left.is_zero() {
            self.until = None;
            return;
        }
        // Deadline past Instant's range keeps whatever was set before
        if let Some(until) = now.checked_add(time_left.min(MAX_BAN)) {
            self.until = Some(until);
        }
    }

    /// Whole seconds left, rounded up
    pub fn remaining(&self, now: Instant) -> u64 {
        match self.until {
            Some(until) if until > now => {
                let left = until - now;
                let secs = left.as_secs();
                if left.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs
                }
            }
            _ => 0,
        }
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.remaining(now) > 0
    }

    /// Whether a ban has been set and not yet cleared
    pub fn is_pending(&self) -> bool {
        self.until.is_some()
    }

    /// Clear an elapsed ban; returns true when this call lifted it
    pub fn lift_if_elapsed(&mut self, now: Instant) -> bool {
        match self.until {
            Some(until) if until <= now => {
                self.until = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.until = None;
    }
}
