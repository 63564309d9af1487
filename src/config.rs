//! Configuration types for the avatar conversation core.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Avatar asset and rig naming.
    pub avatar: AvatarAssetConfig,
    /// Facial animation timings.
    pub animation: AnimationConfig,
    /// Idle gaze wander and idle blinking.
    pub idle: IdleConfig,
    /// Conversation state machine settings.
    pub conversation: ConversationConfig,
    /// Text-generation API settings.
    pub response: ResponseConfig,
    /// Console speech bridge settings.
    pub speech: SpeechConfig,
}

/// Avatar asset location and the names used to find facial controls in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarAssetConfig {
    /// URL or filesystem path of the GLB asset.
    pub source: String,
    /// Name of the node whose rotation is driven by the nod pulse.
    pub head_node: String,
    /// Blend shapes driven by the blink pulse.
    pub blink_targets: Vec<String>,
    /// Blend shape driven by lip-sync.
    pub mouth_target: String,
    /// Gaze blend shapes.
    pub gaze_targets: GazeTargets,
}

impl Default for AvatarAssetConfig {
    fn default() -> Self {
        Self {
            source: "https://models.readyplayer.me/67af11145cbda0313498bf57.glb".to_owned(),
            head_node: "Head".to_owned(),
            blink_targets: vec!["eyeBlinkLeft".to_owned(), "eyeBlinkRight".to_owned()],
            mouth_target: "mouthOpen".to_owned(),
            gaze_targets: GazeTargets::default(),
        }
    }
}

/// Directional eye-look blend shape names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeTargets {
    pub left: String,
    pub right: String,
    pub up: String,
    pub down: String,
}

impl Default for GazeTargets {
    fn default() -> Self {
        Self {
            left: "eyeLookLeft".to_owned(),
            right: "eyeLookRight".to_owned(),
            up: "eyeLookUp".to_owned(),
            down: "eyeLookDown".to_owned(),
        }
    }
}

/// Facial animation timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Full blink duration (close + open) in ms.
    pub blink_duration_ms: u64,
    /// Nod duration in ms.
    pub nod_duration_ms: u64,
    /// Peak head pitch offset of a nod, in radians.
    pub nod_amplitude: f32,
    /// Animation frame interval in ms.
    pub frame_interval_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            blink_duration_ms: 200,
            nod_duration_ms: 800,
            nod_amplitude: 0.15,
            frame_interval_ms: 16,
        }
    }
}

impl AnimationConfig {
    pub fn blink_duration(&self) -> Duration {
        Duration::from_millis(self.blink_duration_ms)
    }

    pub fn nod_duration(&self) -> Duration {
        Duration::from_millis(self.nod_duration_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

/// Idle behaviour: gaze and blinks always, mouth only while the conversation is idle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Whether the eyes wander randomly.
    pub gaze_enabled: bool,
    /// Shortest delay between gaze changes in ms.
    pub gaze_min_interval_ms: u64,
    /// Longest delay between gaze changes in ms.
    pub gaze_max_interval_ms: u64,
    /// Maximum absolute gaze offset on each axis.
    pub gaze_range: f32,
    /// Whether the avatar blinks on its own.
    pub blink_enabled: bool,
    /// Shortest delay between idle blinks in ms.
    pub blink_min_interval_ms: u64,
    /// Longest delay between idle blinks in ms.
    pub blink_max_interval_ms: u64,
    /// Whether the mouth twitches open while the conversation is idle.
    pub mouth_enabled: bool,
    /// Delay between idle mouth movements in ms.
    pub mouth_interval_ms: u64,
    /// How long the mouth stays open each time, in ms.
    pub mouth_hold_ms: u64,
    /// Largest idle mouth opening; each movement picks a value in [0, this].
    pub mouth_max: f32,
    /// Fixed RNG seed (None = seeded from entropy).
    pub seed: Option<u64>,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            gaze_enabled: true,
            gaze_min_interval_ms: 3_000,
            gaze_max_interval_ms: 5_000,
            gaze_range: 0.2,
            blink_enabled: true,
            blink_min_interval_ms: 2_000,
            blink_max_interval_ms: 6_000,
            mouth_enabled: true,
            mouth_interval_ms: 5_000,
            mouth_hold_ms: 500,
            mouth_max: 0.8,
            seed: None,
        }
    }
}

/// Conversation state machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Silence after the last recognized fragment before the utterance is sent, in ms.
    pub debounce_ms: u64,
    /// Delay after playback ends before listening resumes, in ms.
    pub cooldown_ms: u64,
    /// Interval between lip-sync amplitude changes while speaking, in ms.
    pub mouth_tick_ms: u64,
    /// Smallest random mouth amplitude while speaking.
    pub mouth_min: f32,
    /// Largest random mouth amplitude while speaking.
    pub mouth_max: f32,
    /// Words or phrases that interrupt the assistant (case-insensitive).
    pub interruption_keywords: Vec<String>,
    /// Spoken after an interruption.
    pub acknowledgment_phrase: String,
    /// Spoken when the text-generation request fails.
    pub apology_phrase: String,
    /// Fixed RNG seed for lip-sync amplitudes (None = seeded from entropy).
    pub seed: Option<u64>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1_500,
            cooldown_ms: 500,
            mouth_tick_ms: 100,
            mouth_min: 0.1,
            mouth_max: 0.8,
            interruption_keywords: ["stop", "listen", "wait", "pause", "hold on"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            acknowledgment_phrase: "Okay, I'm listening.".to_owned(),
            apology_phrase: "Sorry, I couldn't process that.".to_owned(),
            seed: None,
        }
    }
}

impl ConversationConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn mouth_tick(&self) -> Duration {
        Duration::from_millis(self.mouth_tick_ms.max(1))
    }
}

/// Text-generation API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// API base URL.
    pub base_url: String,
    /// Model name used in the request path.
    pub model: String,
    /// API key. When unset, `api_key_env` is consulted.
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            model: "gemini-1.5-flash".to_owned(),
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_owned(),
            timeout_secs: 30,
        }
    }
}

impl ResponseConfig {
    /// Configured key, falling back to the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Console speech bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Speaking rate used to estimate playback duration.
    pub words_per_minute: f32,
    /// Whether speech recognition is available. When false the conversation
    /// cannot be started.
    pub recognition_available: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            words_per_minute: 170.0,
            recognition_available: true,
        }
    }
}

impl AvatarConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AvatarError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AvatarError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/aceint/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_dir().join("config.toml")
    }
}
