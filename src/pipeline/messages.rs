//! Messages passed into the conversation coordinator.

use crate::conversation::TurnId;
use crate::error::Result;

/// Commands from the user interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Start,
    Stop,
    /// Start when idle, stop otherwise.
    Toggle,
}

/// Outcome of one response-client call, tagged with the turn that made it.
#[derive(Debug)]
pub struct ResponseResult {
    pub turn: TurnId,
    pub result: Result<String>,
}
