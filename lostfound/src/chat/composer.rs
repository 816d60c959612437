//! Draft text for the message input.

/// Holds the text being composed for the open conversation.
///
/// The draft is cleared only after a send succeeds, so a failed send leaves
/// the text in place for another attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    draft: String,
}

impl Composer {
    /// Create an empty composer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the draft.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Current draft, untrimmed.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.draft
    }

    /// Trimmed draft, or `None` if there is nothing to send.
    #[must_use]
    pub fn submission(&self) -> Option<&str> {
        Some(self.draft.trim()).filter(|s| !s.is_empty())
    }

    /// Whether the draft has any non-whitespace content.
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.submission().is_some()
    }

    /// Empty the draft.
    pub fn clear(&mut self) {
        self.draft.clear();
    }
}
