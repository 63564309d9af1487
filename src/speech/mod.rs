//! Speech capture and playback.
//!
//! A [`SpeechBridge`] is driven by commands from the conversation coordinator
//! and reports back through [`SpeechEvent`]s on an mpsc channel. The bundled
//! [`ConsoleBridge`] reads typed lines as recognized speech and "plays" replies
//! by printing them, holding the utterance open for roughly as long as it
//! would take to say.

use crate::config::SpeechConfig;
use crate::conversation::UtteranceId;
use crate::error::{AvatarError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Events delivered by a speech bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    /// Recognized speech, partial or final.
    Recognition { text: String, is_final: bool },
    /// An utterance finished playing (not sent when cancelled).
    PlaybackComplete { utterance: UtteranceId },
}

/// Platform speech recognition and synthesis.
pub trait SpeechBridge: Send {
    /// Whether recognition is available at all.
    fn is_supported(&self) -> bool;
    fn start_capture(&mut self) -> Result<()>;
    fn stop_capture(&mut self);
    /// Start playing `text`. Completion is reported as
    /// [`SpeechEvent::PlaybackComplete`] with the same `utterance`.
    fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<()>;
    fn cancel_speech(&mut self);
}

/// Create the channel a bridge reports on.
pub fn speech_channel() -> (mpsc::Sender<SpeechEvent>, mpsc::Receiver<SpeechEvent>) {
    mpsc::channel(64)
}

/// Rough playback time of `text` at `words_per_minute`.
pub fn estimate_duration(text: &str, words_per_minute: f32) -> Duration {
    let words = text.split_whitespace().count() as f32;
    let minutes = words / words_per_minute.max(30.0);
    Duration::from_secs_f32(minutes * 60.0)
}

/// Line-oriented bridge for terminals and tests.
pub struct ConsoleBridge {
    capturing: Arc<AtomicBool>,
    events: mpsc::Sender<SpeechEvent>,
    words_per_minute: f32,
    supported: bool,
    echo: bool,
    playback: Option<CancellationToken>,
}

/// Feeds recognized text into a [`ConsoleBridge`].
#[derive(Clone)]
pub struct ConsoleMicrophone {
    capturing: Arc<AtomicBool>,
    events: mpsc::Sender<SpeechEvent>,
}

impl ConsoleBridge {
    pub fn new(config: &SpeechConfig, events: mpsc::Sender<SpeechEvent>) -> (Self, ConsoleMicrophone) {
        let capturing = Arc::new(AtomicBool::new(false));
        let microphone = ConsoleMicrophone {
            capturing: Arc::clone(&capturing),
            events: events.clone(),
        };
        let bridge = Self {
            capturing,
            events,
            words_per_minute: config.words_per_minute,
            supported: config.recognition_available,
            echo: true,
            playback: None,
        };
        (bridge, microphone)
    }

    /// Do not print spoken text.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Relaxed)
    }
}

impl SpeechBridge for ConsoleBridge {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start_capture(&mut self) -> Result<()> {
        if !self.supported {
            return Err(AvatarError::Unsupported(
                "speech recognition is not available".into(),
            ));
        }
        self.capturing.store(true, Ordering::Relaxed);
        debug!("capture started");
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.capturing.store(false, Ordering::Relaxed);
        debug!("capture stopped");
    }

    fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<()> {
        self.cancel_speech();
        if self.events.is_closed() {
            return Err(AvatarError::Speech(format!(
                "no listener for utterance {}",
                utterance.0
            )));
        }

        if self.echo {
            println!("avatar> {text}");
        }
        let duration = estimate_duration(text, self.words_per_minute);
        info!(
            "speaking utterance {} for {:.1}s",
            utterance.0,
            duration.as_secs_f32()
        );

        let token = CancellationToken::new();
        self.playback = Some(token.clone());
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("utterance {} cancelled", utterance.0);
                }
                _ = tokio::time::sleep(duration) => {
                    let _ = events.send(SpeechEvent::PlaybackComplete { utterance }).await;
                }
            }
        });
        Ok(())
    }

    fn cancel_speech(&mut self) {
        if let Some(token) = self.playback.take() {
            token.cancel();
        }
    }
}

impl Drop for ConsoleBridge {
    fn drop(&mut self) {
        self.cancel_speech();
    }
}

impl ConsoleMicrophone {
    /// Deliver a finalized utterance. Returns `false` when not capturing.
    pub async fn hear(&self, text: &str) -> bool {
        self.deliver(text, true).await
    }

    /// Deliver an in-progress (partial) result.
    pub async fn hear_partial(&self, text: &str) -> bool {
        self.deliver(text, false).await
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Relaxed)
    }

    async fn deliver(&self, text: &str, is_final: bool) -> bool {
        if !self.is_capturing() {
            debug!("not capturing, dropping: {text}");
            return false;
        }
        self.events
            .send(SpeechEvent::Recognition {
                text: text.to_owned(),
                is_final,
            })
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    /// Fast speaker: three words take about 30ms.
    fn fast() -> SpeechConfig {
        SpeechConfig {
            words_per_minute: 6_000.0,
            ..SpeechConfig::default()
        }
    }

    fn bridge(config: &SpeechConfig) -> (ConsoleBridge, ConsoleMicrophone, mpsc::Receiver<SpeechEvent>) {
        let (tx, rx) = speech_channel();
        let (bridge, mic) = ConsoleBridge::new(config, tx);
        (bridge.quiet(), mic, rx)
    }

    #[test]
    fn estimate_scales_with_word_count() {
        assert_eq!(estimate_duration("", 170.0), Duration::ZERO);
        let short = estimate_duration("hello", 170.0);
        let long = estimate_duration("hello there how are you today", 170.0);
        assert!(long > short);
        // 170 words at 170 wpm is one minute.
        let minute = estimate_duration(&"word ".repeat(170), 170.0);
        assert!((minute.as_secs_f32() - 60.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn microphone_is_gated_by_capture() {
        let (mut bridge, mic, mut rx) = bridge(&SpeechConfig::default());

        assert!(!mic.hear("too early").await);
        bridge.start_capture().unwrap();
        assert!(mic.hear("hello there").await);
        assert_eq!(
            rx.recv().await,
            Some(SpeechEvent::Recognition {
                text: "hello there".into(),
                is_final: true
            })
        );

        bridge.stop_capture();
        assert!(!mic.hear_partial("after").await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsupported_bridge_refuses_capture() {
        let config = SpeechConfig {
            recognition_available: false,
            ..SpeechConfig::default()
        };
        let (mut bridge, _mic, _rx) = bridge(&config);
        assert!(!bridge.is_supported());
        assert!(matches!(bridge.start_capture(), Err(AvatarError::Unsupported(_))));
        assert!(!bridge.is_capturing());
    }

    #[tokio::test]
    async fn playback_completes_after_estimate() {
        let (mut bridge, _mic, mut rx) = bridge(&fast());
        bridge.speak(UtteranceId(3), "one two three").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(SpeechEvent::PlaybackComplete {
                utterance: UtteranceId(3)
            })
        );
    }

    #[tokio::test]
    async fn speaking_without_a_listener_fails() {
        let (mut bridge, _mic, rx) = bridge(&fast());
        drop(rx);
        assert!(matches!(
            bridge.speak(UtteranceId(4), "anyone there"),
            Err(AvatarError::Speech(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_playback_never_completes() {
        let (mut bridge, _mic, mut rx) = bridge(&fast());
        bridge.speak(UtteranceId(1), "a fairly long sentence to say").unwrap();
        bridge.cancel_speech();

        let waited = tokio::time::timeout(Duration::from_millis(400), rx.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn new_utterance_cancels_the_previous_one() {
        let (mut bridge, _mic, mut rx) = bridge(&fast());
        bridge.speak(UtteranceId(1), "first reply is long enough").unwrap();
        bridge.speak(UtteranceId(2), "second").unwrap();

        let event = tokio::time::timeout(Duration::from_millis(400), rx.recv())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(SpeechEvent::PlaybackComplete {
                utterance: UtteranceId(2)
            })
        );
        assert!(
            tokio::time::timeout(Duration::from_millis(400), rx.recv())
                .await
                .is_err()
        );
    }
}
