//! Orchestrator state machine and shared status.
//!
//! [`AssistantState`] is the current phase of the conversation cycle.  The
//! monitoring surface reads it via [`SharedStatus`] along with the last
//! exchange and the reason the assistant is parked in IDLE, if it is.
//!
//! [`SharedStatus`] is a type alias for `Arc<Mutex<AssistantStatus>>`: cheap
//! to clone and safe to share across threads.

use std::sync::{Arc, Mutex};

use serde::Serialize;

// ---------------------------------------------------------------------------
// AssistantState
// ---------------------------------------------------------------------------

/// States of the conversation cycle.
///
/// ```text
/// Idle ──providers ready──▶ Listening ──phrase──▶ WakeDetected
///   WakeDetected ──▶ Recording ──window──▶ Transcribing ──text──▶ Routing
///   WakeDetected ──trailing command──────────────────────────────▶ Routing
///   Routing ──built-in──▶ Executing ──▶ Speaking ──▶ Listening
///   Routing ──no match──▶ QueryingLlm ──▶ Speaking ──▶ Listening
/// device / transcriber failure or empty transcript ──▶ Listening
/// unrecoverable provider failure ──▶ Idle (until the next reload)
/// farewell or shutdown signal ──▶ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantState {
    #[default]
    Idle,
    Listening,
    WakeDetected,
    Recording,
    Transcribing,
    Routing,
    Executing,
    QueryingLlm,
    Speaking,
    Stopped,
}

impl AssistantState {
    /// `true` between the wake phrase and the end of the reply.  Settings
    /// changes made while busy wait for the next cycle.
    ///
    /// ```
    /// use voice_assistant::pipeline::AssistantState;
    ///
    /// assert!(!AssistantState::Listening.is_busy());
    /// assert!(AssistantState::Recording.is_busy());
    /// assert!(AssistantState::Speaking.is_busy());
    /// assert!(!AssistantState::Idle.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        !matches!(
            self,
            AssistantState::Idle | AssistantState::Listening | AssistantState::Stopped
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssistantState::Idle => "Idle",
            AssistantState::Listening => "Listening",
            AssistantState::WakeDetected => "Wake detected",
            AssistantState::Recording => "Recording",
            AssistantState::Transcribing => "Transcribing",
            AssistantState::Routing => "Routing",
            AssistantState::Executing => "Executing",
            AssistantState::QueryingLlm => "Asking the model",
            AssistantState::Speaking => "Speaking",
            AssistantState::Stopped => "Stopped",
        }
    }
}

// ---------------------------------------------------------------------------
// AssistantStatus
// ---------------------------------------------------------------------------

/// What the monitoring surface shows about the running assistant.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssistantStatus {
    pub state: AssistantState,

    /// Why the assistant is parked in [`AssistantState::Idle`], if it is.
    pub idle_reason: Option<String>,

    /// Transcript of the last completed cycle.
    pub last_query: Option<String>,

    pub last_response: Option<String>,

    /// Completed cycles since startup.
    pub cycles: u64,
}

/// Thread-safe handle to [`AssistantStatus`].
///
/// Lock for a short critical section; do **not** hold the lock across
/// `.await` points.
pub type SharedStatus = Arc<Mutex<AssistantStatus>>;

pub fn new_shared_status() -> SharedStatus {
    Arc::new(Mutex::new(AssistantStatus::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
