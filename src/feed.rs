//! Message Feed
//!
//! Bounded, chronologically ordered scrollback of chat lines.

use chrono::{DateTime, Local, Utc};
use std::collections::VecDeque;
use std::fmt;

use crate::protocol::{ChatMessage, HistoryMessage};

/// Who wrote a feed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Author {
    /// The logged-in user
    Own,
    Other(String),
    System,
}

/// One line in the feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub id: String,
    pub author: Author,
    /// Display name (own username for `Author::Own`)
    pub name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl FeedEntry {
    pub fn is_own(&self) -> bool {
        self.author == Author::Own
    }
}

impl fmt::Display for FeedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.timestamp.with_timezone(&Local).format("%H:%M:%S");
        match self.author {
            Author::System => write!(f, "[{}] * {}", time, self.text),
            _ => write!(f, "[{}] {}: {}", time, self.name, self.text),
        }
    }
}

/// Scrollback buffer
#[derive(Debug, Clone)]
pub struct MessageFeed {
    entries: VecDeque<FeedEntry>,
    capacity: usize,
}

impl MessageFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&FeedEntry> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append an entry, evicting the oldest past capacity
    pub fn push(&mut self, entry: FeedEntry) -> &FeedEntry {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Append a live message; `own_user_id` decides whether it is ours
    pub fn push_message(&mut self, msg: &ChatMessage, own_user_id: Option<&str>) -> &FeedEntry {
        let author = if own_user_id == Some(msg.sender.as_str()) {
            Author::Own
        } else {
            Author::Other(msg.sender.clone())
        };
        self.push(FeedEntry {
            id: uuid::Uuid::new_v4().to_string(),
            author,
            name: msg.username.clone(),
            text: msg.message.clone(),
            timestamp: msg.sent_at(),
        })
    }

    pub fn push_system(&mut self, text: &str) -> &FeedEntry {
        self.push(FeedEntry {
            id: uuid::Uuid::new_v4().to_string(),
            author: Author::System,
            name: String::new(),
            text: text.to_string(),
            timestamp: Utc::now(),
        })
    }

    /// Load stored history (newest first, as the server returns it).
    /// History only carries usernames, so ownership is matched on name.
    pub fn seed_history(&mut self, history: &[HistoryMessage], own_username: Option<&str>) {
        for msg in history.iter().rev() {
            let author = if own_username == Some(msg.sender.as_str()) {
                Author::Own
            } else {
                Author::Other(msg.sender.clone())
            };
            self.push(FeedEntry {
                id: msg.id.clone(),
                author,
                name: msg.sender.clone(),
                text: msg.content.clone(),
                timestamp: msg.created_at,
            });
        }
    }
}

impl Default for MessageFeed {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn chat(sender: &str, username: &str, text: &str) -> ChatMessage {
        ChatMessage {
            message: text.to_string(),
            sender: sender.to_string(),
            username: username.to_string(),
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_own_vs_other() {
        let mut feed = MessageFeed::new(10);
        assert!(feed.push_message(&chat("u-1", "alice", "hi"), Some("u-1")).is_own());
        assert!(!feed.push_message(&chat("u-2", "bob", "yo"), Some("u-1")).is_own());
        assert!(!feed.push_message(&chat("u-1", "alice", "anon"), None).is_own());
        assert_eq!(feed.len(), 3);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut feed = MessageFeed::new(3);
        for i in 0..5 {
            feed.push_system(&format!("line {}", i));
        }
        assert_eq!(feed.len(), 3);
        assert_eq!(feed.iter().next().unwrap().text, "line 2");
        assert_eq!(feed.last().unwrap().text, "line 4");
    }

    #[test]
    fn test_seed_history_is_chronological() {
        let history = vec![
            HistoryMessage {
                id: "m2".to_string(),
                content: "second".to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 0).unwrap(),
                sender: "alice".to_string(),
            },
            HistoryMessage {
                id: "m1".to_string(),
                content: "first".to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                sender: "bob".to_string(),
            },
        ];

        let mut feed = MessageFeed::new(10);
        feed.seed_history(&history, Some("alice"));

        let texts: Vec<&str> = feed.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(feed.last().unwrap().is_own());
    }

    #[test]
    fn test_display() {
        let mut feed = MessageFeed::new(4);
        let line = feed.push_message(&chat("u-2", "bob", "hello"), None).to_string();
        assert!(line.ends_with("bob: hello"));

        let sys = feed.push_system("joined").to_string();
        assert!(sys.ends_with("* joined"));
    }
}
