//! Conversation state machine: listening, sending, speaking.
//!
//! The machine is pure. Every input carries the current instant and every
//! output is a list of [`Command`]s for the coordinator to carry out against
//! the speech bridge, the response client and the animator. Timers (debounce,
//! lip-sync ticks, post-playback cool-down) advance in [`ConversationMachine::poll`].

pub mod keywords;

pub use keywords::InterruptionKeywords;

use crate::config::ConversationConfig;
use crate::error::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_MOUTH_MIN: f32 = 0.1;
const DEFAULT_MOUTH_MAX: f32 = 0.8;

/// Where the conversation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    /// Conversation not started.
    #[default]
    Idle,
    /// Capturing user speech.
    Listening,
    /// Waiting on the response client.
    Processing,
    /// Playing a reply (or the post-playback cool-down).
    Speaking,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
        };
        f.write_str(label)
    }
}

/// Identifies one dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnId(pub u64);

/// Identifies one spoken utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceId(pub u64);

/// Side effects requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Begin (or resume) continuous speech capture.
    StartCapture,
    /// Stop speech capture.
    StopCapture,
    /// Speak `text`; completion is reported with the same `utterance`.
    Speak { utterance: UtteranceId, text: String },
    /// Cancel any playback in progress.
    CancelSpeech,
    /// Send `text` to the response client.
    Dispatch { turn: TurnId, text: String },
    /// Acknowledge the user with a nod.
    Nod,
    /// Set the mouth-open weight.
    MouthOpen(f32),
}

/// What the view shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub state: ConversationState,
    pub reply_text: String,
    pub live_transcript: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpeechKind {
    Reply,
    Acknowledgment,
}

#[derive(Debug, Clone, Copy)]
struct ActiveSpeech {
    utterance: UtteranceId,
    kind: SpeechKind,
}

#[derive(Debug, Clone)]
struct PendingUtterance {
    text: String,
    deadline: Instant,
}

/// The single owner of conversation state.
pub struct ConversationMachine {
    debounce: Duration,
    cooldown: Duration,
    mouth_tick: Duration,
    mouth_range: (f32, f32),
    acknowledgment: String,
    apology: String,
    keywords: InterruptionKeywords,
    rng: StdRng,

    state: ConversationState,
    /// Utterance buffer: recognized text not yet dispatched.
    pending: Option<PendingUtterance>,
    last_dispatched: Option<String>,
    outstanding: Option<TurnId>,
    next_turn: u64,
    speech: Option<ActiveSpeech>,
    next_utterance: u64,
    resume_at: Option<Instant>,
    next_mouth_tick: Option<Instant>,
    reply_text: String,
    live_transcript: String,
}

impl ConversationMachine {
    pub fn new(config: &ConversationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let lo = unit_or(config.mouth_min, DEFAULT_MOUTH_MIN, "conversation.mouth_min");
        let hi = unit_or(config.mouth_max, DEFAULT_MOUTH_MAX, "conversation.mouth_max");
        Self {
            debounce: config.debounce(),
            cooldown: config.cooldown(),
            mouth_tick: config.mouth_tick(),
            mouth_range: (lo.min(hi), lo.max(hi)),
            acknowledgment: config.acknowledgment_phrase.clone(),
            apology: config.apology_phrase.clone(),
            keywords: InterruptionKeywords::new(&config.interruption_keywords),
            rng,
            state: ConversationState::Idle,
            pending: None,
            last_dispatched: None,
            outstanding: None,
            next_turn: 0,
            speech: None,
            next_utterance: 0,
            resume_at: None,
            next_mouth_tick: None,
            reply_text: String::new(),
            live_transcript: String::new(),
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != ConversationState::Idle
    }

    /// The request currently awaited, if any.
    pub fn outstanding_turn(&self) -> Option<TurnId> {
        self.outstanding
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            reply_text: self.reply_text.clone(),
            live_transcript: self.live_transcript.clone(),
        }
    }

    /// User toggles the conversation on.
    pub fn start(&mut self, _now: Instant) -> Vec<Command> {
        if self.state != ConversationState::Idle {
            return Vec::new();
        }
        info!("conversation started");
        self.state = ConversationState::Listening;
        self.last_dispatched = None;
        self.live_transcript.clear();
        vec![Command::StartCapture]
    }

    /// User toggles the conversation off. Valid from any state.
    pub fn stop(&mut self) -> Vec<Command> {
        if self.state != ConversationState::Idle {
            info!("conversation stopped from {}", self.state);
        }
        self.state = ConversationState::Idle;
        self.pending = None;
        self.outstanding = None;
        self.speech = None;
        self.resume_at = None;
        self.next_mouth_tick = None;
        self.live_transcript.clear();
        vec![
            Command::CancelSpeech,
            Command::StopCapture,
            Command::MouthOpen(0.0),
        ]
    }

    /// Speech recognition produced `text`.
    pub fn on_recognition(&mut self, text: &str, is_final: bool, now: Instant) -> Vec<Command> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        match self.state {
            ConversationState::Listening => self.hear(text, is_final, now),
            ConversationState::Speaking => self.check_interruption(text, now),
            ConversationState::Idle | ConversationState::Processing => Vec::new(),
        }
    }

    /// The response client finished the request for `turn`.
    pub fn on_response(&mut self, turn: TurnId, result: Result<String>, now: Instant) -> Vec<Command> {
        if self.state != ConversationState::Processing || self.outstanding != Some(turn) {
            debug!("discarding stale response for turn {}", turn.0);
            return Vec::new();
        }
        self.outstanding = None;

        let text = match result {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_owned(),
            Ok(_) => {
                warn!("empty reply for turn {}, apologising", turn.0);
                self.apology.clone()
            }
            Err(e) => {
                warn!("response for turn {} failed: {e}", turn.0);
                self.apology.clone()
            }
        };
        self.begin_speaking(text, SpeechKind::Reply, now)
    }

    /// Playback of `utterance` ended.
    pub fn on_playback_complete(&mut self, utterance: UtteranceId, now: Instant) -> Vec<Command> {
        match self.speech {
            Some(active) if active.utterance == utterance => {
                self.speech = None;
                self.next_mouth_tick = None;
                self.resume_at = Some(now + self.cooldown);
                debug!("utterance {} complete, cooling down", utterance.0);
                vec![Command::MouthOpen(0.0)]
            }
            _ => Vec::new(),
        }
    }

    /// Advance timers to `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<Command> {
        match self.state {
            ConversationState::Listening => self.flush_pending(now),
            ConversationState::Speaking => {
                if self.speech.is_some() {
                    self.lip_sync(now)
                } else {
                    self.resume_listening(now)
                }
            }
            ConversationState::Idle | ConversationState::Processing => Vec::new(),
        }
    }

    fn hear(&mut self, text: &str, is_final: bool, now: Instant) -> Vec<Command> {
        self.live_transcript = text.to_owned();

        if !is_final {
            // Still talking: hold the pending utterance open.
            if let Some(pending) = self.pending.as_mut() {
                pending.deadline = now + self.debounce;
            }
            return Vec::new();
        }

        if self.last_dispatched.as_deref() == Some(text) {
            debug!("ignoring repeat of dispatched transcript");
            return Vec::new();
        }

        let deadline = now + self.debounce;
        match self.pending.as_mut() {
            Some(pending) => {
                if pending.text != text {
                    pending.text.push(' ');
                    pending.text.push_str(text);
                }
                pending.deadline = deadline;
            }
            None => {
                self.pending = Some(PendingUtterance {
                    text: text.to_owned(),
                    deadline,
                });
            }
        }
        vec![Command::Nod]
    }

    fn check_interruption(&mut self, text: &str, now: Instant) -> Vec<Command> {
        let Some(active) = self.speech else {
            return Vec::new();
        };
        if active.kind != SpeechKind::Reply {
            return Vec::new();
        }
        let Some(keyword) = self.keywords.find(text) else {
            return Vec::new();
        };

        info!("interrupted by \"{keyword}\"");
        self.pending = None;
        let mut commands = vec![Command::CancelSpeech, Command::MouthOpen(0.0)];
        let acknowledgment = self.acknowledgment.clone();
        commands.extend(self.begin_speaking(acknowledgment, SpeechKind::Acknowledgment, now));
        commands
    }

    fn flush_pending(&mut self, now: Instant) -> Vec<Command> {
        let due = self.pending.as_ref().is_some_and(|p| now >= p.deadline);
        if !due {
            return Vec::new();
        }
        let Some(pending) = self.pending.take() else {
            return Vec::new();
        };
        if self.last_dispatched.as_deref() == Some(pending.text.as_str()) {
            debug!("ignoring repeat of dispatched transcript");
            return Vec::new();
        }

        let turn = TurnId(self.next_turn);
        self.next_turn += 1;
        self.state = ConversationState::Processing;
        self.outstanding = Some(turn);
        self.last_dispatched = Some(pending.text.clone());
        self.live_transcript.clear();
        info!("dispatching turn {}: {}", turn.0, pending.text);
        vec![Command::Dispatch {
            turn,
            text: pending.text,
        }]
    }

    fn lip_sync(&mut self, now: Instant) -> Vec<Command> {
        match self.next_mouth_tick {
            Some(due) if now >= due => {
                let (lo, hi) = self.mouth_range;
                let amount = self.rng.gen_range(lo..=hi);
                self.next_mouth_tick = Some(now + self.mouth_tick);
                vec![Command::MouthOpen(amount)]
            }
            _ => Vec::new(),
        }
    }

    fn resume_listening(&mut self, now: Instant) -> Vec<Command> {
        match self.resume_at {
            Some(at) if now >= at => {
                self.resume_at = None;
                self.state = ConversationState::Listening;
                self.live_transcript.clear();
                info!("listening again");
                vec![Command::StartCapture]
            }
            _ => Vec::new(),
        }
    }

    fn begin_speaking(&mut self, text: String, kind: SpeechKind, now: Instant) -> Vec<Command> {
        let utterance = UtteranceId(self.next_utterance);
        self.next_utterance += 1;
        self.state = ConversationState::Speaking;
        self.speech = Some(ActiveSpeech { utterance, kind });
        self.resume_at = None;
        self.next_mouth_tick = Some(now);
        self.reply_text = text.clone();
        vec![Command::Speak { utterance, text }]
    }
}

/// `value` clamped to [0, 1], or `fallback` when it is not a number.
fn unit_or(value: f32, fallback: f32, name: &str) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        warn!("{name} = {value} is not finite, using {fallback}");
        fallback
    }
}
