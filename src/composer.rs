//! Chat input gate: length, login, ban and send-rate checks

use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{ChatError, Result};

/// Validates outgoing chat text before it reaches the session
#[derive(Debug, Clone)]
pub struct Composer {
    max_chars: usize,
    cooldown: Duration,
    last_sent: Option<Instant>,
}

impl Composer {
    pub fn new(max_chars: usize, cooldown: Duration) -> Self {
        Self {
            max_chars,
            cooldown,
            last_sent: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_message_chars, config.send_cooldown)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Check a draft. The text is sent as typed; only emptiness is judged
    /// on the trimmed form.
    pub fn check(&self, text: &str, logged_in: bool, ban_remaining: u64, now: Instant) -> Result<()> {
        if !logged_in {
            return Err(ChatError::NotLoggedIn);
        }
        if text.trim().is_empty() {
            return Err(ChatError::InvalidMessage("message is empty".to_string()));
        }
        let chars = text.chars().count();
        if chars > self.max_chars {
            return Err(ChatError::InvalidMessage(format!(
                "message is {} characters, limit is {}",
                chars, self.max_chars
            )));
        }
        if ban_remaining > 0 {
            return Err(ChatError::ChatBanned(ban_remaining));
        }
        if let Some(wait) = self.cooldown_left(now) {
            return Err(ChatError::Cooldown(wait));
        }
        Ok(())
    }

    /// Time left before the next send is allowed
    pub fn cooldown_left(&self, now: Instant) -> Option<Duration> {
        let last = self.last_sent?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_sent = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer() -> Composer {
        Composer::new(30, Duration::from_millis(500))
    }

    #[test]
    fn test_accepts_normal_message() {
        assert!(composer().check("hello", true, 0, Instant::now()).is_ok());
    }

    #[test]
    fn test_rejections() {
        let c = composer();
        let now = Instant::now();

        assert!(matches!(c.check("hi", false, 0, now), Err(ChatError::NotLoggedIn)));
        assert!(matches!(c.check("   ", true, 0, now), Err(ChatError::InvalidMessage(_))));
        assert!(matches!(c.check(&"x".repeat(31), true, 0, now), Err(ChatError::InvalidMessage(_))));
        assert!(matches!(c.check("hi", true, 12, now), Err(ChatError::ChatBanned(12))));
    }

    #[test]
    fn test_limit_counts_chars_not_bytes() {
        // 30 Hangul syllables are 90 bytes
        let text = "가".repeat(30);
        assert!(composer().check(&text, true, 0, Instant::now()).is_ok());
    }

    #[test]
    fn test_cooldown() {
        let mut c = composer();
        let now = Instant::now();
        c.mark_sent(now);

        match c.check("again", true, 0, now + Duration::from_millis(200)) {
            Err(ChatError::Cooldown(wait)) => assert_eq!(wait, Duration::from_millis(300)),
            other => panic!("expected cooldown, got {:?}", other),
        }
        assert!(c.check("again", true, 0, now + Duration::from_millis(500)).is_ok());
    }
}
