//! Fallback speaker: tries each synthesiser in order until one succeeds.
//!
//! The chain order comes from [`Settings::tts_chain`]: the preferred
//! provider first, then `tts_fallback_order`.  A failure is logged and the
//! next speaker is tried; only when every speaker failed is the last error
//! returned, and the orchestrator absorbs that too.
//!
//! With [`with_attempt_timeout`](FallbackSpeaker::with_attempt_timeout) each
//! speaker gets its own budget, so one that hangs cannot starve the rest.
//!
//! [`Settings::tts_chain`]: crate::config::Settings::tts_chain

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::provider::ProviderError;
use crate::tts::{speech_time, Speaker};

// ---------------------------------------------------------------------------
// FallbackSpeaker
// ---------------------------------------------------------------------------

pub struct FallbackSpeaker {
    speakers: Vec<Arc<dyn Speaker>>,
    attempt_timeout: Option<Duration>,
}

impl FallbackSpeaker {
    pub fn new(speakers: Vec<Arc<dyn Speaker>>) -> Self {
        Self {
            speakers,
            attempt_timeout: None,
        }
    }

    /// Give up on a speaker after `timeout` plus the expected playback time
    /// of the text, and move on to the next one.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    async fn attempt(&self, speaker: &dyn Speaker, text: &str) -> Result<(), ProviderError> {
        let Some(timeout) = self.attempt_timeout else {
            return speaker.speak(text).await;
        };
        match tokio::time::timeout(timeout + speech_time(text), speaker.speak(text)).await {
            Ok(r) => r,
            Err(_) => Err(ProviderError::Network(format!("{} timed out", speaker.name()))),
        }
    }

    /// Names in the order they are tried.
    pub fn names(&self) -> Vec<&'static str> {
        self.speakers.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl Speaker for FallbackSpeaker {
    async fn speak(&self, text: &str) -> Result<(), ProviderError> {
        let mut last_err = ProviderError::Unavailable("no speakers configured".into());
        for speaker in &self.speakers {
            match self.attempt(speaker.as_ref(), text).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!(
                        "tts: {} failed ({}): {e}, trying next speaker",
                        speaker.name(),
                        e.kind()
                    );
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    struct AlwaysOk {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Speaker for AlwaysOk {
        async fn speak(&self, _text: &str) -> Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "ok"
        }
    }

    struct AlwaysFails {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Speaker for AlwaysFails {
        async fn speak(&self, _text: &str) -> Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Network("offline".into()))
        }

        fn name(&self) -> &'static str {
            "fails"
        }
    }

    /// Never finishes within a test's lifetime.
    struct Hangs;

    #[async_trait]
    impl Speaker for Hangs {
        async fn speak(&self, _text: &str) -> Result<(), ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "hangs"
        }
    }

    fn ok() -> Arc<AlwaysOk> {
        Arc::new(AlwaysOk { calls: AtomicUsize::new(0) })
    }

    fn fails() -> Arc<AlwaysFails> {
        Arc::new(AlwaysFails { calls: AtomicUsize::new(0) })
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn primary_success_skips_the_rest() {
        let (a, b) = (ok(), ok());
        let chain = FallbackSpeaker::new(vec![a.clone() as Arc<dyn Speaker>, b.clone()]);
        chain.speak("hi").await.unwrap();
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_primary_falls_back() {
        let (a, b) = (fails(), ok());
        let chain = FallbackSpeaker::new(vec![a.clone() as Arc<dyn Speaker>, b.clone()]);
        assert!(chain.speak("hi").await.is_ok());
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_failing_returns_last_error() {
        let (a, b) = (fails(), fails());
        let chain = FallbackSpeaker::new(vec![a.clone() as Arc<dyn Speaker>, b.clone()]);
        let err = chain.speak("hi").await.unwrap_err();
        assert_eq!(err, ProviderError::Network("offline".into()));
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_chain_is_unavailable() {
        let chain = FallbackSpeaker::new(Vec::new());
        assert!(matches!(
            chain.speak("hi").await,
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[test]
    fn fallback_is_object_safe() {
        let _: Box<dyn Speaker> = Box::new(FallbackSpeaker::new(vec![ok() as Arc<dyn Speaker>]));
    }

    #[tokio::test]
    async fn hanging_speaker_is_skipped() {
        let b = ok();
        let chain = FallbackSpeaker::new(vec![Arc::new(Hangs) as Arc<dyn Speaker>, b.clone()])
            .with_attempt_timeout(Duration::from_millis(50));
        let r = tokio::time::timeout(Duration::from_secs(5), chain.speak(""))
            .await
            .expect("chain hung");
        assert!(r.is_ok());
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stalled_network_speaker_falls_back() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let gtts = crate::tts::NetworkSpeaker::new(
            reqwest::Client::new(),
            "en",
            "default",
            Duration::from_millis(200),
        )
        .with_endpoint(format!("http://{addr}/translate_tts"));
        let b = ok();
        let chain = FallbackSpeaker::new(vec![Arc::new(gtts) as Arc<dyn Speaker>, b.clone()])
            .with_attempt_timeout(Duration::from_millis(500));

        let r = tokio::time::timeout(Duration::from_secs(5), chain.speak("hi"))
            .await
            .expect("chain hung");
        assert!(r.is_ok());
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }
}
