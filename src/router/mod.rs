//! Command routing: built-in intents first, the language model otherwise.
//!
//! The transcript is lowercased and split into word tokens; each intent in
//! `intent_order` is tested in turn and the first one whose keywords appear
//! as whole words wins.  Word matching keeps "this" from counting as "hi"
//! and "update" from counting as "date".

pub mod builtins;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::Settings;

// ---------------------------------------------------------------------------
// IntentKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Time,
    Date,
    Joke,
    Search,
    Greeting,
    Farewell,
    Acknowledgment,
}

impl IntentKind {
    /// Priority used when `intent_order` is not configured.
    pub const DEFAULT_ORDER: [IntentKind; 7] = [
        IntentKind::Time,
        IntentKind::Date,
        IntentKind::Joke,
        IntentKind::Search,
        IntentKind::Greeting,
        IntentKind::Farewell,
        IntentKind::Acknowledgment,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            IntentKind::Time => "time",
            IntentKind::Date => "date",
            IntentKind::Joke => "joke",
            IntentKind::Search => "search",
            IntentKind::Greeting => "greeting",
            IntentKind::Farewell => "farewell",
            IntentKind::Acknowledgment => "acknowledgment",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            IntentKind::Time => &["time"],
            IntentKind::Date => &["date"],
            IntentKind::Joke => &["joke", "jokes"],
            IntentKind::Search => &["search"],
            IntentKind::Greeting => &["hello", "hi", "hey"],
            IntentKind::Farewell => &["goodbye", "bye", "exit"],
            IntentKind::Acknowledgment => &["thank", "thanks"],
        }
    }

    fn matches(&self, words: &[String]) -> bool {
        self.keywords()
            .iter()
            .any(|k| words.iter().any(|w| w == k))
    }
}

/// Lowercase word tokens; apostrophes stay inside words ("what's").
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// Answer produced by a built-in intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinReply {
    pub intent: IntentKind,
    pub response: String,
    /// Page to open in a browser, best effort.
    pub open_url: Option<String>,
    /// The assistant shuts down after speaking this reply.
    pub exit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    BuiltIn(BuiltinReply),
    Llm,
}

// ---------------------------------------------------------------------------
// CommandRouter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CommandRouter {
    order: Vec<IntentKind>,
}

impl CommandRouter {
    pub fn new(order: &[IntentKind]) -> Self {
        Self {
            order: order.to_vec(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.intent_order)
    }

    pub fn order(&self) -> &[IntentKind] {
        &self.order
    }

    /// First intent in priority order whose keywords occur in `text`.
    pub fn classify(&self, text: &str) -> Option<IntentKind> {
        let words = tokenize(text);
        self.order.iter().copied().find(|i| i.matches(&words))
    }

    pub fn route(&self, text: &str) -> Route {
        self.route_at(text, Local::now())
    }

    /// [`route`](Self::route) with a fixed clock.
    pub fn route_at(&self, text: &str, now: DateTime<Local>) -> Route {
        match self.classify(text) {
            Some(intent) => Route::BuiltIn(builtins::respond(intent, text, now)),
            None => Route::Llm,
        }
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new(&IntentKind::DEFAULT_ORDER)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 15, 12, 5, 0).unwrap()
    }

    #[test]
    fn what_time_is_it_is_built_in() {
        let route = CommandRouter::default().route_at("What time is it?", at_noon());
        match route {
            Route::BuiltIn(reply) => {
                assert_eq!(reply.intent, IntentKind::Time);
                assert_eq!(reply.response, "The current time is 12:05 PM");
            }
            Route::Llm => panic!("time must not reach the LLM"),
        }
    }

    #[test]
    fn unmatched_goes_to_llm() {
        let r = CommandRouter::default();
        assert_eq!(r.route("why is the sky blue"), Route::Llm);
    }

    #[test]
    fn priority_order_decides_ties() {
        // "hello" and "time" both present: time comes first by default.
        let r = CommandRouter::default();
        assert_eq!(r.classify("hello what time is it"), Some(IntentKind::Time));

        let greeting_first = CommandRouter::new(&[IntentKind::Greeting, IntentKind::Time]);
        assert_eq!(
            greeting_first.classify("hello what time is it"),
            Some(IntentKind::Greeting)
        );
    }

    #[test]
    fn intents_missing_from_order_are_not_matched() {
        let r = CommandRouter::new(&[IntentKind::Time]);
        assert_eq!(r.classify("tell me a joke"), None);
    }

    #[test]
    fn matches_whole_words_only() {
        let r = CommandRouter::default();
        assert_eq!(r.classify("this is an update"), None);
        assert_eq!(r.classify("say hi"), Some(IntentKind::Greeting));
    }

    #[test]
    fn each_default_intent_is_reachable() {
        let r = CommandRouter::default();
        assert_eq!(r.classify("what's the date"), Some(IntentKind::Date));
        assert_eq!(r.classify("tell me a joke"), Some(IntentKind::Joke));
        assert_eq!(r.classify("search for rust"), Some(IntentKind::Search));
        assert_eq!(r.classify("goodbye"), Some(IntentKind::Farewell));
        assert_eq!(r.classify("thanks a lot"), Some(IntentKind::Acknowledgment));
    }

    #[test]
    fn farewell_requests_exit() {
        match CommandRouter::default().route("bye") {
            Route::BuiltIn(reply) => {
                assert!(reply.exit);
                assert_eq!(reply.response, "Goodbye! Have a great day!");
            }
            Route::Llm => panic!("farewell is built in"),
        }
    }

    #[test]
    fn tokenize_keeps_apostrophes() {
        assert_eq!(tokenize("What's the TIME?"), vec!["what's", "the", "time"]);
    }

    #[test]
    fn intent_names_serialise_snake_case() {
        let v = serde_json::to_value(IntentKind::DEFAULT_ORDER).unwrap();
        assert_eq!(v[6], "acknowledgment");
    }
}
