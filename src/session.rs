//! Session-scoped state: transcript, ledger, cache handle.
//!
//! Everything the original UI kept as ambient per-session globals lives in a
//! single owned [`SessionState`] value passed to every operation. A session
//! reset replaces the whole value, so the ledger, the transcript, and the
//! cache handle are cleared atomically — there is no way to clear one without
//! the others.

use crate::cost::UsageLedger;
use crate::provider::CacheHandle;

/// One question/answer pair. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Mutable per-session state, exclusively owned by one interaction loop.
///
/// The transcript is replayed in full on every question; it grows without
/// bound until a reset. That unbounded growth is the documented scaling
/// behavior of the transcript-replay design, not something this layer trims.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Ordered Q/A history, in arrival order.
    pub transcript: Vec<ChatTurn>,
    /// Running token and dollar totals.
    pub ledger: UsageLedger,
    /// Handle to the current remote cache, if one has been ensured.
    pub cache: Option<CacheHandle>,
    /// Whether a document has been loaded this session.
    pub document_loaded: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed turn. Only called after a successful answer — a
    /// failed generation never reaches the transcript.
    pub fn append_turn(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.transcript.push(ChatTurn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    /// Wholesale reset: transcript, ledger, cache handle, and flags are
    /// replaced together.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_are_appended_in_order() {
        let mut session = SessionState::new();
        session.append_turn("q1", "a1");
        session.append_turn("q2", "a2");
        session.append_turn("q3", "a3");
        let questions: Vec<&str> = session
            .transcript
            .iter()
            .map(|t| t.question.as_str())
            .collect();
        assert_eq!(questions, vec!["q1", "q2", "q3"]);
        assert_eq!(session.transcript[1].answer, "a2");
    }

    #[test]
    fn test_reset_clears_everything_atomically() {
        let mut session = SessionState::new();
        session.append_turn("q", "a");
        session.ledger.total_input_tokens = 100;
        session.ledger.total_cost = 1.25;
        session.cache = Some(CacheHandle {
            name: "cachedContents/x".into(),
            model: "m".into(),
        });
        session.document_loaded = true;

        session.reset();

        assert!(session.transcript.is_empty());
        assert_eq!(session.ledger, UsageLedger::default());
        assert!(session.cache.is_none());
        assert!(!session.document_loaded);
    }
}
