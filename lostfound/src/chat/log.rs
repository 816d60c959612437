//! Per-conversation message sequence.
//!
//! [`MessageLog`] keeps the messages of one open conversation in insertion
//! order with an id index beside it. Both the poll path and the send path go
//! through [`MessageLog::append_unique`], so a message that is sent locally
//! and later echoed back by a poll is stored once.
//!
//! The sequence only grows: entries are never removed or reordered after the
//! initial load.

use std::collections::HashSet;

use lostfound_proto::model::{ChatMessage, MessageId};

/// Ordered, id-deduplicated message sequence.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    ids: HashSet<MessageId>,
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every message whose id is not yet present, in the order
    /// given. Duplicates inside `incoming` are also dropped.
    ///
    /// Returns the number of messages appended. Applying the same batch twice
    /// appends nothing the second time.
    pub fn append_unique<I>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = ChatMessage>,
    {
        let before = self.messages.len();
        for message in incoming {
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
        self.messages.len() - before
    }

    /// Install the result of the initial full load.
    ///
    /// The loaded history becomes the head of the sequence. Anything appended
    /// while the load was in flight (a message sent in the meantime) is kept
    /// after it unless the load already contains it.
    pub fn replace_initial(&mut self, loaded: Vec<ChatMessage>) {
        let pending = std::mem::take(&mut self.messages);
        self.ids.clear();
        self.append_unique(loaded);
        self.append_unique(pending);
    }

    /// Id of the newest message, used as the polling cursor.
    #[must_use]
    pub fn tail_id(&self) -> Option<&MessageId> {
        self.messages.last().map(|m| &m.id)
    }

    /// Whether a message with `id` is present.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Messages, oldest first.
    #[must_use]
    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
