//! Conversation memory of a session.

use serde::{Deserialize, Serialize};

use crate::provider::{Message, Role};

/// Notice inserted where older messages were dropped.
pub const TRUNCATION_NOTICE: &str =
    "[Earlier messages were removed to fit the model's context window.]";

/// Ordered message history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    messages: Vec<Message>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Shrink the history after a context-window overflow.
    ///
    /// Keeps every system message, then a truncation notice, then the
    /// `keep_recent` most recent other messages. Tool results at the start of
    /// the kept tail are dropped since the call they answer is gone.
    /// Returns the number of messages removed.
    pub fn truncate(&mut self, keep_recent: usize) -> usize {
        let before = self.messages.len();
        let is_notice =
            |m: &Message| m.role == Role::System && m.content.as_deref() == Some(TRUNCATION_NOTICE);

        let (system, rest): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.messages)
            .into_iter()
            .filter(|m| !is_notice(m))
            .partition(|m| m.role == Role::System);

        let start = rest.len().saturating_sub(keep_recent);
        let tail: Vec<Message> = rest
            .into_iter()
            .skip(start)
            .skip_while(|m| m.role == Role::Tool)
            .collect();

        self.messages = system;
        self.messages.push(Message::system(TRUNCATION_NOTICE));
        self.messages.extend(tail);

        before.saturating_sub(self.messages.len())
    }
}
