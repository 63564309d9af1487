//! Runtime events emitted by the coordinator for views and observability.

use crate::conversation::ConversationState;

/// What the conversation is doing "right now".
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// The conversation moved to a new state.
    StateChanged { state: ConversationState },
    /// Live (not yet dispatched) transcript. Empty when cleared.
    Transcript { text: String },
    /// Text the avatar is saying: a reply, the apology or the acknowledgment.
    Reply { text: String },
    /// Speech recognition is unavailable; the conversation cannot start.
    Unsupported { message: String },
}
