use serde::{Deserialize, Serialize};

use super::{Command, Event};

/// Anything the message bus can dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum Message {
    Command(Command),
    Event(Event),
}

impl Message {
    /// Returns the command or event type name.
    pub fn message_type(&self) -> &'static str {
        match self {
            Message::Command(command) => command.command_type(),
            Message::Event(event) => event.event_type(),
        }
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Message::Command(command)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Message::Event(event)
    }
}
