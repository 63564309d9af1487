//! Main conversation loop.
//!
//! One task owns the [`ConversationMachine`], the [`FacialAnimator`] and the
//! speech bridge. Response calls run on spawned tasks and report back over
//! an mpsc channel, so the loop never blocks on the network.

use crate::animator::{FacialAnimator, IdleBehaviour};
use crate::config::AvatarConfig;
use crate::conversation::{Command, ConversationMachine, StatusSnapshot};
use crate::error::Result;
use crate::pipeline::messages::{ResponseResult, UserCommand};
use crate::response::ResponseClient;
use crate::runtime::RuntimeEvent;
use crate::speech::{SpeechBridge, SpeechEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RESPONSE_CHANNEL_SIZE: usize = 8;

/// Shown when the platform cannot recognise speech.
pub const UNSUPPORTED_MESSAGE: &str =
    "Speech recognition is not supported on this platform. The conversation cannot be started.";

/// Drives a conversation with one avatar.
pub struct ConversationCoordinator {
    machine: ConversationMachine,
    animator: FacialAnimator,
    idle: IdleBehaviour,
    bridge: Box<dyn SpeechBridge>,
    speech_rx: mpsc::Receiver<SpeechEvent>,
    client: Arc<dyn ResponseClient>,
    user_rx: Option<mpsc::Receiver<UserCommand>>,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
    frame_interval: Duration,
    cancel: CancellationToken,
    published: StatusSnapshot,
}

impl ConversationCoordinator {
    pub fn new(
        config: &AvatarConfig,
        animator: FacialAnimator,
        bridge: Box<dyn SpeechBridge>,
        speech_rx: mpsc::Receiver<SpeechEvent>,
        client: Arc<dyn ResponseClient>,
    ) -> Self {
        let machine = ConversationMachine::new(&config.conversation);
        let published = machine.snapshot();
        Self {
            machine,
            animator,
            idle: IdleBehaviour::new(&config.idle),
            bridge,
            speech_rx,
            client,
            user_rx: None,
            runtime_tx: None,
            frame_interval: config.animation.frame_interval(),
            cancel: CancellationToken::new(),
            published,
        }
    }

    /// Attach a runtime event broadcaster for views.
    pub fn with_runtime_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.runtime_tx = Some(tx);
        self
    }

    /// Attach the start/stop control channel.
    pub fn with_user_commands(mut self, rx: mpsc::Receiver<UserCommand>) -> Self {
        self.user_rx = Some(rx);
        self
    }

    /// Get a cancellation token to stop the loop externally.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled. The conversation is stopped on the way out.
    ///
    /// # Errors
    ///
    /// Currently infallible; failures inside a turn are spoken as the apology
    /// phrase instead.
    pub async fn run(mut self) -> Result<()> {
        let (response_tx, mut response_rx) = mpsc::channel::<ResponseResult>(RESPONSE_CHANNEL_SIZE);
        let mut user_rx = self.user_rx.take();
        let mut frames = tokio::time::interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "conversation loop running ({} ms frames)",
            self.frame_interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = frames.tick() => self.on_frame(&response_tx),
                Some(event) = self.speech_rx.recv() => self.on_speech(event, &response_tx),
                Some(command) = recv_or_pending(&mut user_rx) => self.on_user_command(command, &response_tx),
                Some(response) = response_rx.recv() => {
                    let now = self.animator.clock().now();
                    let commands = self.machine.on_response(response.turn, response.result, now);
                    self.execute(commands, &response_tx);
                }
            }
            self.publish_changes();
        }

        let commands = self.machine.stop();
        self.execute(commands, &response_tx);
        self.animator.tick();
        self.publish_changes();
        info!("conversation loop stopped");
        Ok(())
    }

    fn on_frame(&mut self, response_tx: &mpsc::Sender<ResponseResult>) {
        let now = self.animator.clock().now();
        // Idle mouth movement yields to the conversation once it starts.
        self.idle
            .update(now, &mut self.animator, !self.machine.is_active());
        let commands = self.machine.poll(now);
        self.execute(commands, response_tx);
        self.animator.tick();
    }

    fn on_speech(&mut self, event: SpeechEvent, response_tx: &mpsc::Sender<ResponseResult>) {
        let now = self.animator.clock().now();
        let commands = match event {
            SpeechEvent::Recognition { text, is_final } => {
                debug!("recognized ({}): {text}", if is_final { "final" } else { "partial" });
                self.machine.on_recognition(&text, is_final, now)
            }
            SpeechEvent::PlaybackComplete { utterance } => {
                self.machine.on_playback_complete(utterance, now)
            }
        };
        self.execute(commands, response_tx);
    }

    fn on_user_command(&mut self, command: UserCommand, response_tx: &mpsc::Sender<ResponseResult>) {
        let start = match command {
            UserCommand::Start => true,
            UserCommand::Stop => false,
            UserCommand::Toggle => !self.machine.is_active(),
        };

        if !start {
            let commands = self.machine.stop();
            self.execute(commands, response_tx);
            return;
        }

        if !self.bridge.is_supported() {
            warn!("cannot start conversation: speech recognition unsupported");
            self.emit(RuntimeEvent::Unsupported {
                message: UNSUPPORTED_MESSAGE.to_owned(),
            });
            return;
        }
        let now = self.animator.clock().now();
        let commands = self.machine.start(now);
        self.execute(commands, response_tx);
    }

    fn execute(&mut self, commands: Vec<Command>, response_tx: &mpsc::Sender<ResponseResult>) {
        let mut queue: VecDeque<Command> = commands.into();
        while let Some(command) = queue.pop_front() {
            match command {
                Command::StartCapture => {
                    if let Err(e) = self.bridge.start_capture() {
                        warn!("failed to start capture: {e}");
                    }
                }
                Command::StopCapture => self.bridge.stop_capture(),
                Command::CancelSpeech => self.bridge.cancel_speech(),
                Command::Speak { utterance, text } => {
                    if let Err(e) = self.bridge.speak(utterance, &text) {
                        // Treat as finished so the conversation does not stall.
                        warn!("playback failed: {e}");
                        let now = self.animator.clock().now();
                        queue.extend(self.machine.on_playback_complete(utterance, now));
                    }
                }
                Command::Dispatch { turn, text } => {
                    let client = Arc::clone(&self.client);
                    let tx = response_tx.clone();
                    tokio::spawn(async move {
                        let result = client.generate(&text).await;
                        if tx.send(ResponseResult { turn, result }).await.is_err() {
                            debug!("coordinator gone, dropping response for turn {}", turn.0);
                        }
                    });
                }
                Command::Nod => self.animator.set_nod(true),
                Command::MouthOpen(amount) => self.animator.set_mouth_open(amount),
            }
        }
    }

    fn publish_changes(&mut self) {
        let current = self.machine.snapshot();
        if current == self.published {
            return;
        }
        if current.state != self.published.state {
            self.emit(RuntimeEvent::StateChanged {
                state: current.state,
            });
        }
        if current.reply_text != self.published.reply_text {
            self.emit(RuntimeEvent::Reply {
                text: current.reply_text.clone(),
            });
        }
        if current.live_transcript != self.published.live_transcript {
            self.emit(RuntimeEvent::Transcript {
                text: current.live_transcript.clone(),
            });
        }
        self.published = current;
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(tx) = &self.runtime_tx {
            let _ = tx.send(event);
        }
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::avatar::{AvatarScene, MeshNode, SharedScene};
    use crate::clock::{Clock, SystemClock};
    use crate::conversation::{ConversationState, UtteranceId};
    use crate::error::AvatarError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum BridgeCall {
        StartCapture,
        StopCapture,
        Speak(UtteranceId, String),
        Cancel,
    }

    struct RecordingBridge {
        supported: bool,
        calls: Arc<Mutex<Vec<BridgeCall>>>,
    }

    impl SpeechBridge for RecordingBridge {
        fn is_supported(&self) -> bool {
            self.supported
        }
        fn start_capture(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push(BridgeCall::StartCapture);
            Ok(())
        }
        fn stop_capture(&mut self) {
            self.calls.lock().unwrap().push(BridgeCall::StopCapture);
        }
        fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(BridgeCall::Speak(utterance, text.to_owned()));
            Ok(())
        }
        fn cancel_speech(&mut self) {
            self.calls.lock().unwrap().push(BridgeCall::Cancel);
        }
    }

    struct CannedClient {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResponseClient for CannedClient {
        async fn generate(&self, _user_text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| AvatarError::Response("offline".into()))
        }
    }

    struct Harness {
        scene: SharedScene,
        calls: Arc<Mutex<Vec<BridgeCall>>>,
        client: Arc<CannedClient>,
        speech_tx: mpsc::Sender<SpeechEvent>,
        user_tx: mpsc::Sender<UserCommand>,
        events: broadcast::Receiver<RuntimeEvent>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<Result<()>>,
    }

    fn fast_config() -> AvatarConfig {
        let mut config = AvatarConfig::default();
        config.animation.frame_interval_ms = 5;
        config.conversation.debounce_ms = 60;
        config.conversation.cooldown_ms = 40;
        config.conversation.mouth_tick_ms = 10;
        config.conversation.seed = Some(1);
        config.idle.gaze_enabled = false;
        config.idle.blink_enabled = false;
        config.idle.mouth_enabled = false;
        config
    }

    fn spawn(supported: bool, reply: Option<&str>) -> Harness {
        let config = fast_config();
        let scene = AvatarScene::new()
            .with_mesh(MeshNode::new("Face", ["mouthOpen", "eyeBlinkLeft"]))
            .into_shared();
        let animator = FacialAnimator::new(
            Arc::clone(&scene),
            &config.avatar,
            &config.animation,
            Arc::new(SystemClock) as Arc<dyn Clock>,
        );
        let calls = Arc::new(Mutex::new(Vec::new()));
        let bridge = RecordingBridge {
            supported,
            calls: Arc::clone(&calls),
        };
        let client = Arc::new(CannedClient {
            reply: reply.map(str::to_owned),
            calls: AtomicUsize::new(0),
        });
        let (speech_tx, speech_rx) = mpsc::channel(16);
        let (user_tx, user_rx) = mpsc::channel(4);
        let (events_tx, events) = broadcast::channel(64);

        let coordinator = ConversationCoordinator::new(
            &config,
            animator,
            Box::new(bridge),
            speech_rx,
            Arc::clone(&client) as Arc<dyn ResponseClient>,
        )
        .with_runtime_events(events_tx)
        .with_user_commands(user_rx);
        let cancel = coordinator.cancel_token();
        let handle = tokio::spawn(coordinator.run());

        Harness {
            scene,
            calls,
            client,
            speech_tx,
            user_tx,
            events,
            cancel,
            handle,
        }
    }

    async fn next_matching(
        events: &mut broadcast::Receiver<RuntimeEvent>,
        wanted: impl Fn(&RuntimeEvent) -> bool,
    ) -> RuntimeEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.unwrap();
                if wanted(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for runtime event")
    }

    fn mouth(scene: &SharedScene) -> f32 {
        scene.lock().unwrap().meshes[0].influence("mouthOpen").unwrap()
    }

    #[tokio::test]
    async fn full_turn_replies_and_resumes_listening() {
        let mut h = spawn(true, Some("General Kenobi."));

        h.user_tx.send(UserCommand::Start).await.unwrap();
        next_matching(&mut h.events, |e| {
            *e == RuntimeEvent::StateChanged {
                state: ConversationState::Listening,
            }
        })
        .await;

        h.speech_tx
            .send(SpeechEvent::Recognition {
                text: "hello there".into(),
                is_final: true,
            })
            .await
            .unwrap();

        let reply = next_matching(&mut h.events, |e| matches!(e, RuntimeEvent::Reply { .. })).await;
        assert_eq!(
            reply,
            RuntimeEvent::Reply {
                text: "General Kenobi.".into()
            }
        );
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 1);

        // Lip-sync runs while speaking.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(mouth(&h.scene) > 0.0);

        let utterance = h
            .calls
            .lock()
            .unwrap()
            .iter()
            .find_map(|c| match c {
                BridgeCall::Speak(id, _) => Some(*id),
                _ => None,
            })
            .unwrap();
        h.speech_tx
            .send(SpeechEvent::PlaybackComplete { utterance })
            .await
            .unwrap();

        next_matching(&mut h.events, |e| {
            *e == RuntimeEvent::StateChanged {
                state: ConversationState::Listening,
            }
        })
        .await;
        assert_eq!(mouth(&h.scene), 0.0);

        let captures = h
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == BridgeCall::StartCapture)
            .count();
        assert_eq!(captures, 2);

        h.cancel.cancel();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_response_speaks_apology() {
        let mut h = spawn(true, None);
        h.user_tx.send(UserCommand::Toggle).await.unwrap();
        next_matching(&mut h.events, |e| matches!(e, RuntimeEvent::StateChanged { .. })).await;

        h.speech_tx
            .send(SpeechEvent::Recognition {
                text: "are you there".into(),
                is_final: true,
            })
            .await
            .unwrap();

        let reply = next_matching(&mut h.events, |e| matches!(e, RuntimeEvent::Reply { .. })).await;
        assert_eq!(
            reply,
            RuntimeEvent::Reply {
                text: crate::config::ConversationConfig::default().apology_phrase
            }
        );
        h.cancel.cancel();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unsupported_bridge_stays_idle() {
        let mut h = spawn(false, Some("unused"));
        h.user_tx.send(UserCommand::Start).await.unwrap();

        let event = next_matching(&mut h.events, |_| true).await;
        assert_eq!(
            event,
            RuntimeEvent::Unsupported {
                message: UNSUPPORTED_MESSAGE.to_owned()
            }
        );
        assert!(h.calls.lock().unwrap().is_empty());

        h.cancel.cancel();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_cancels_speech_and_returns_to_idle() {
        let mut h = spawn(true, Some("A long answer."));
        h.user_tx.send(UserCommand::Start).await.unwrap();
        h.speech_tx
            .send(SpeechEvent::Recognition {
                text: "tell me something".into(),
                is_final: true,
            })
            .await
            .unwrap();
        next_matching(&mut h.events, |e| matches!(e, RuntimeEvent::Reply { .. })).await;

        h.user_tx.send(UserCommand::Toggle).await.unwrap();
        next_matching(&mut h.events, |e| {
            *e == RuntimeEvent::StateChanged {
                state: ConversationState::Idle,
            }
        })
        .await;

        {
            let calls = h.calls.lock().unwrap();
            assert!(calls.contains(&BridgeCall::Cancel));
            assert_eq!(calls.last(), Some(&BridgeCall::StopCapture));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mouth(&h.scene), 0.0);

        h.cancel.cancel();
        h.handle.await.unwrap().unwrap();
    }
}
