//! Aceint: a talking 3D avatar face.
//!
//! The crate loads a rigged avatar, animates its face, and holds a spoken
//! conversation through a text-generation API:
//! Speech recognition → conversation machine → response client → speech
//! playback + lip-sync
//!
//! # Architecture
//!
//! - **Avatar**: GLB/glTF loading into a shared scene of morph targets and nodes
//! - **Animator**: blink and nod pulses, mouth and gaze, written once per frame
//! - **Conversation**: the Idle/Listening/Processing/Speaking state machine
//! - **Response**: HTTP client for reply generation
//! - **Speech**: capture and playback behind a bridge trait
//! - **Pipeline**: the tokio loop that ties them together

pub mod animator;
pub mod app_dirs;
pub mod avatar;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod error;
pub mod pipeline;
pub mod response;
pub mod runtime;
pub mod speech;
pub mod view;

pub use animator::FacialAnimator;
pub use avatar::{AvatarLoader, AvatarScene, SharedScene};
pub use config::AvatarConfig;
pub use conversation::{ConversationMachine, ConversationState};
pub use error::{AvatarError, Result};
pub use pipeline::coordinator::ConversationCoordinator;
pub use runtime::RuntimeEvent;
