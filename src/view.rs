//! Text status panel fed by [`RuntimeEvent`]s.

use crate::conversation::ConversationState;
use crate::runtime::RuntimeEvent;

/// What a conversation view shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusPanel {
    state: ConversationState,
    reply: String,
    transcript: String,
    unsupported: Option<String>,
}

impl StatusPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the panel. Returns `true` if anything visible changed.
    pub fn apply(&mut self, event: &RuntimeEvent) -> bool {
        let before = self.clone();
        match event {
            RuntimeEvent::StateChanged { state } => {
                self.state = *state;
                if *state == ConversationState::Idle {
                    self.transcript.clear();
                }
            }
            RuntimeEvent::Transcript { text } => self.transcript = text.clone(),
            RuntimeEvent::Reply { text } => self.reply = text.clone(),
            RuntimeEvent::Unsupported { message } => self.unsupported = Some(message.clone()),
        }
        *self != before
    }

    pub fn is_active(&self) -> bool {
        self.state != ConversationState::Idle
    }

    /// Once unsupported, the toggle is disabled for good.
    pub fn is_interactive(&self) -> bool {
        self.unsupported.is_none()
    }

    pub fn toggle_label(&self) -> &'static str {
        if self.is_active() {
            "Stop Conversation"
        } else {
            "Start Conversation"
        }
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Live transcript, only while the conversation is active.
    pub fn transcript(&self) -> Option<&str> {
        (self.is_active() && !self.transcript.is_empty()).then_some(self.transcript.as_str())
    }

    pub fn render(&self) -> String {
        if let Some(message) = &self.unsupported {
            return message.clone();
        }
        let mut lines = vec![format!("[{}] ({})", self.toggle_label(), self.state)];
        if !self.reply.is_empty() {
            lines.push(format!("avatar: {}", self.reply));
        }
        if let Some(transcript) = self.transcript() {
            lines.push(format!("you: {transcript}..."));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(state: ConversationState) -> RuntimeEvent {
        RuntimeEvent::StateChanged { state }
    }

    #[test]
    fn toggle_label_follows_state() {
        let mut panel = StatusPanel::new();
        assert_eq!(panel.toggle_label(), "Start Conversation");
        panel.apply(&state(ConversationState::Listening));
        assert_eq!(panel.toggle_label(), "Stop Conversation");
        panel.apply(&state(ConversationState::Speaking));
        assert_eq!(panel.toggle_label(), "Stop Conversation");
        panel.apply(&state(ConversationState::Idle));
        assert_eq!(panel.toggle_label(), "Start Conversation");
    }

    #[test]
    fn transcript_only_shown_while_active() {
        let mut panel = StatusPanel::new();
        panel.apply(&RuntimeEvent::Transcript { text: "hel".into() });
        assert_eq!(panel.transcript(), None);

        panel.apply(&state(ConversationState::Listening));
        panel.apply(&RuntimeEvent::Transcript { text: "hello".into() });
        assert_eq!(panel.transcript(), Some("hello"));
        assert!(panel.render().contains("you: hello..."));

        panel.apply(&state(ConversationState::Idle));
        assert_eq!(panel.transcript(), None);
    }

    #[test]
    fn reply_persists_across_states() {
        let mut panel = StatusPanel::new();
        panel.apply(&state(ConversationState::Speaking));
        assert!(panel.apply(&RuntimeEvent::Reply { text: "Hi there.".into() }));
        panel.apply(&state(ConversationState::Listening));
        assert_eq!(panel.reply(), "Hi there.");
        assert!(panel.render().contains("avatar: Hi there."));
    }

    #[test]
    fn unsupported_message_replaces_panel() {
        let mut panel = StatusPanel::new();
        panel.apply(&RuntimeEvent::Unsupported {
            message: "no speech here".into(),
        });
        assert!(!panel.is_interactive());
        assert_eq!(panel.render(), "no speech here");
    }

    #[test]
    fn apply_reports_only_visible_changes() {
        let mut panel = StatusPanel::new();
        assert!(!panel.apply(&state(ConversationState::Idle)));
        assert!(panel.apply(&state(ConversationState::Listening)));
        assert!(!panel.apply(&state(ConversationState::Listening)));
    }
}
