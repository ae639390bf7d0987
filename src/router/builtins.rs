//! Replies for the built-in intents.

use std::process::{ExitStatus, Stdio};

use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;

use crate::router::{tokenize, BuiltinReply, IntentKind};

pub const GREETING_REPLY: &str = "Hello! How can I assist you today?";
pub const FAREWELL_REPLY: &str = "Goodbye! Have a great day!";
pub const EMPTY_SEARCH_REPLY: &str = "What would you like me to search for?";

const SEARCH_URL: &str = "https://www.google.com/search?q=";

const ACKNOWLEDGMENTS: &[&str] = &["You're welcome!", "Happy to help!", "Anytime!", "My pleasure!"];

const JOKES: &[&str] = &[
    "Why do programmers prefer dark mode? Because light attracts bugs.",
    "There are 10 kinds of people: those who understand binary and those who don't.",
    "A SQL query walks into a bar, goes up to two tables and asks: can I join you?",
    "Why did the developer go broke? Because he used up all his cache.",
    "How many programmers does it take to change a light bulb? None, that's a hardware problem.",
    "I would tell you a UDP joke, but you might not get it.",
    "Debugging is like being the detective in a crime movie where you are also the murderer.",
    "Why do Java developers wear glasses? Because they don't C sharp.",
];

pub fn respond(intent: IntentKind, text: &str, now: DateTime<Local>) -> BuiltinReply {
    let mut reply = BuiltinReply {
        intent,
        response: String::new(),
        open_url: None,
        exit: false,
    };

    match intent {
        IntentKind::Time => {
            reply.response = format!("The current time is {}", now.format("%I:%M %p"));
        }
        IntentKind::Date => {
            reply.response = format!("Today is {}", now.format("%A, %B %d, %Y"));
        }
        IntentKind::Joke => reply.response = pick(JOKES).to_string(),
        IntentKind::Search => match search_query(text) {
            Some(query) => {
                reply.open_url = Some(search_url(&query));
                reply.response = format!("Searching for: {query}");
            }
            None => reply.response = EMPTY_SEARCH_REPLY.to_string(),
        },
        IntentKind::Greeting => reply.response = GREETING_REPLY.to_string(),
        IntentKind::Farewell => {
            reply.response = FAREWELL_REPLY.to_string();
            reply.exit = true;
        }
        IntentKind::Acknowledgment => reply.response = pick(ACKNOWLEDGMENTS).to_string(),
    }
    reply
}

fn pick(items: &[&'static str]) -> &'static str {
    items.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
}

/// Words after "search", without a leading "for".
pub fn search_query(text: &str) -> Option<String> {
    let words = tokenize(text);
    let start = words.iter().position(|w| w == "search")? + 1;
    let mut rest = &words[start..];
    if rest.first().is_some_and(|w| w == "for") {
        rest = &rest[1..];
    }
    (!rest.is_empty()).then(|| rest.join(" "))
}

pub fn search_url(query: &str) -> String {
    let terms: Vec<_> = query
        .split_whitespace()
        .map(|w| urlencoding::encode(w).into_owned())
        .collect();
    format!("{SEARCH_URL}{}", terms.join("+"))
}

/// Open `url` with the desktop opener, best effort.  Failure is only logged.
pub fn open_in_browser(url: &str) {
    // The handle is not needed; the task alone reaps the child.
    let _ = open_with("xdg-open", url);
}

/// Spawn `program url` and wait for it on a runtime task so the child never
/// lingers as a zombie.  `None` when nothing was started.
fn open_with(program: &str, url: &str) -> Option<JoinHandle<Option<ExitStatus>>> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        log::warn!("router: no runtime to open {url}");
        return None;
    };

    let spawned = tokio::process::Command::new(program)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        Ok(mut child) => {
            log::info!("router: opened {url}");
            let program = program.to_string();
            Some(handle.spawn(async move {
                match child.wait().await {
                    Ok(status) => {
                        if !status.success() {
                            log::warn!("router: {program} exited with {status}");
                        }
                        Some(status)
                    }
                    Err(e) => {
                        log::warn!("router: waiting for {program}: {e}");
                        None
                    }
                }
            }))
        }
        Err(e) => {
            log::warn!("router: could not open {url}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 21, 30, 0).unwrap()
    }

    #[test]
    fn date_reply_format() {
        let r = respond(IntentKind::Date, "what's the date", now());
        assert_eq!(r.response, "Today is Tuesday, March 05, 2024");
    }

    #[test]
    fn time_reply_uses_twelve_hour_clock() {
        let r = respond(IntentKind::Time, "time", now());
        assert_eq!(r.response, "The current time is 09:30 PM");
    }

    #[test]
    fn search_builds_url() {
        let r = respond(IntentKind::Search, "search for rust borrow checker", now());
        assert_eq!(r.response, "Searching for: rust borrow checker");
        assert_eq!(
            r.open_url.as_deref(),
            Some("https://www.google.com/search?q=rust+borrow+checker")
        );
    }

    #[test]
    fn empty_search_asks_for_a_query() {
        let r = respond(IntentKind::Search, "search", now());
        assert_eq!(r.response, EMPTY_SEARCH_REPLY);
        assert!(r.open_url.is_none());
        assert_eq!(search_query("search for"), None);
    }

    #[test]
    fn joke_and_thanks_come_from_their_lists() {
        assert!(JOKES.contains(&respond(IntentKind::Joke, "joke", now()).response.as_str()));
        assert!(ACKNOWLEDGMENTS
            .contains(&respond(IntentKind::Acknowledgment, "thanks", now()).response.as_str()));
    }

    #[test]
    fn only_farewell_exits() {
        for intent in IntentKind::DEFAULT_ORDER {
            let r = respond(intent, "search x", now());
            assert_eq!(r.exit, intent == IntentKind::Farewell);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn opener_child_is_waited_for() {
        let handle = open_with("true", "https://example.com").unwrap();
        let status = handle.await.unwrap().unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn missing_opener_starts_nothing() {
        assert!(open_with("definitely-not-an-opener", "https://example.com").is_none());
    }

    #[test]
    fn opening_outside_a_runtime_is_skipped() {
        assert!(open_with("true", "https://example.com").is_none());
    }
}
