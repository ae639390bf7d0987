//! Rolling conversation window sent to the language model.
//!
//! [`ConversationContext`] keeps the last *N* question/answer exchanges that
//! went to the LLM and hands them back as [`ChatMessage`]s for the next
//! request.  Built-in intents never enter the window.
//!
//! The window is cleared automatically when nothing was asked for longer
//! than `silence_reset` (default 120 s), which signals a topic change.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::llm::client::ChatMessage;

/// Exchanges kept by [`ConversationContext::new`].
pub const DEFAULT_MAX_EXCHANGES: usize = 3;

/// Inactivity after which the window starts over.
pub const DEFAULT_SILENCE_RESET: Duration = Duration::from_secs(120);

struct Exchange {
    question: String,
    answer: String,
}

// ---------------------------------------------------------------------------
// ConversationContext
// ---------------------------------------------------------------------------

/// Maintains a rolling window of LLM exchanges.
///
/// # Example
/// ```rust
/// use voice_assistant::llm::ConversationContext;
///
/// let mut ctx = ConversationContext::new();
/// ctx.push_exchange("what is rust", "A programming language.");
/// assert_eq!(ctx.history().len(), 2);
/// ```
pub struct ConversationContext {
    exchanges: VecDeque<Exchange>,
    max_exchanges: usize,
    last_activity: Instant,
    silence_reset: Duration,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_EXCHANGES, DEFAULT_SILENCE_RESET)
    }

    pub fn with_limits(max_exchanges: usize, silence_reset: Duration) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(max_exchanges + 1),
            max_exchanges,
            last_activity: Instant::now(),
            silence_reset,
        }
    }

    /// Record a completed exchange.  Oldest exchanges are dropped once the
    /// window exceeds `max_exchanges`.
    pub fn push_exchange(&mut self, question: &str, answer: &str) {
        self.expire_if_idle();

        self.exchanges.push_back(Exchange {
            question: question.to_string(),
            answer: answer.to_string(),
        });
        while self.exchanges.len() > self.max_exchanges {
            self.exchanges.pop_front();
        }

        self.last_activity = Instant::now();
    }

    /// Messages for the next request, oldest first.  Returns nothing once the
    /// window has gone stale.
    pub fn history(&mut self) -> Vec<ChatMessage> {
        self.expire_if_idle();
        self.exchanges
            .iter()
            .flat_map(|e| [ChatMessage::user(&e.question), ChatMessage::assistant(&e.answer)])
            .collect()
    }

    pub fn reset(&mut self) {
        self.exchanges.clear();
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    fn expire_if_idle(&mut self) {
        if !self.exchanges.is_empty() && self.last_activity.elapsed() > self.silence_reset {
            log::debug!("llm: conversation idle, clearing context");
            self.exchanges.clear();
        }
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
