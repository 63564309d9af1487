//! Event loop wiring the conversation machine to speech, replies and animation.

pub mod coordinator;
pub mod messages;
