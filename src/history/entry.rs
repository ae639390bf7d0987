//! Records kept in the history log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Responses longer than this are cut before they are stored.
pub const MAX_RESPONSE_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// HistoryEntry
// ---------------------------------------------------------------------------

/// Which path produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    BuiltIn,
    Llm,
}

/// One completed conversation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub response: String,
    pub handler: HandlerKind,
    /// Total tokens billed.  `None` for built-in handlers; `Some(0)` when the
    /// LLM call failed and the apology was spoken instead.
    pub token_count: Option<u32>,
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    /// Model that answered, for LLM entries.
    #[serde(default)]
    pub model: Option<String>,
    /// Wake-to-response latency.
    pub latency_ms: u64,
}

impl HistoryEntry {
    /// Entry for a built-in intent.  Token fields are always `None`.
    pub fn built_in(query: impl Into<String>, response: &str, latency_ms: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            query: query.into(),
            response: truncate_response(response),
            handler: HandlerKind::BuiltIn,
            token_count: None,
            prompt_tokens: None,
            completion_tokens: None,
            model: None,
            latency_ms,
        }
    }

    /// Entry for an LLM answer (or the apology when the call failed).
    pub fn llm(
        query: impl Into<String>,
        response: &str,
        usage: TokenUsage,
        model: Option<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            query: query.into(),
            response: truncate_response(response),
            handler: HandlerKind::Llm,
            token_count: Some(usage.total),
            prompt_tokens: usage.prompt,
            completion_tokens: usage.completion,
            model,
            latency_ms,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Token counts reported by an LLM backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: Option<u32>,
    pub completion: Option<u32>,
    pub total: u32,
}

fn truncate_response(response: &str) -> String {
    match response.char_indices().nth(MAX_RESPONSE_CHARS) {
        Some((idx, _)) => response[..idx].to_string(),
        None => response.to_string(),
    }
}

// ---------------------------------------------------------------------------
// StatsSample
// ---------------------------------------------------------------------------

/// Periodic resource utilisation sample, each value in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSample {
    pub timestamp: DateTime<Utc>,
    pub cpu: f32,
    pub mem: f32,
    pub disk: f32,
}

impl StatsSample {
    /// Values are rounded to one decimal place.
    pub fn new(cpu: f32, mem: f32, disk: f32) -> Self {
        Self {
            timestamp: Utc::now(),
            cpu: round1(cpu),
            mem: round1(mem),
            disk: round1(disk),
        }
    }
}

fn round1(v: f32) -> f32 {
    (v.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Anything that can be appended to the history log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Query(HistoryEntry),
    Stats(StatsSample),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Query(_) => RecordKind::Query,
            Record::Stats(_) => RecordKind::Stats,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Record::Query(e) => e.timestamp,
            Record::Stats(s) => s.timestamp,
        }
    }
}

impl From<HistoryEntry> for Record {
    fn from(e: HistoryEntry) -> Self {
        Record::Query(e)
    }
}

impl From<StatsSample> for Record {
    fn from(s: StatsSample) -> Self {
        Record::Stats(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Query,
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_entries_have_no_tokens() {
        let e = HistoryEntry::built_in("what time is it", "It is 3 PM", 12);
        assert_eq!(e.handler, HandlerKind::BuiltIn);
        assert_eq!(e.token_count, None);
        assert_eq!(e.model, None);
    }

    #[test]
    fn long_responses_are_truncated_on_char_boundary() {
        let long = "é".repeat(MAX_RESPONSE_CHARS + 20);
        let e = HistoryEntry::llm("q", &long, TokenUsage::default(), None, 0);
        assert_eq!(e.response.chars().count(), MAX_RESPONSE_CHARS);
        assert_eq!(e.token_count, Some(0));
    }

    #[test]
    fn stats_are_rounded_and_clamped() {
        let s = StatsSample::new(12.345, 150.0, -3.0);
        assert!((s.cpu - 12.3).abs() < 1e-4);
        assert_eq!(s.mem, 100.0);
        assert_eq!(s.disk, 0.0);
    }
}
