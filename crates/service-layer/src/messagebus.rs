//! The message bus: one inbound message in, the full cascade handled.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use domain::{Command, CommandKind, Event, EventKind, Message};

use crate::error::{Result, ServiceError};
use crate::handlers::{CommandHandler, EventHandler};

/// Dispatches messages to their handlers.
///
/// Handling a message may produce more messages; they are queued behind
/// everything already waiting, so a cascade is processed breadth first.
/// [`handle`](MessageBus::handle) returns once the queue is empty.
///
/// The handler tables are fixed at construction. A command kind without a
/// handler, or an event kind missing from the event table, is a
/// configuration bug reported as [`ServiceError::UnrecognizedMessage`].
pub struct MessageBus {
    command_handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
    event_handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl MessageBus {
    pub fn builder() -> MessageBusBuilder {
        MessageBusBuilder::default()
    }

    /// Handles a message and everything it cascades into.
    ///
    /// Stops at the first failing command handler and returns its error.
    /// Messages handled before that point stay committed. Failing event
    /// handlers are logged and skipped.
    #[tracing::instrument(skip(self, message), fields(message_type = message.message_type()))]
    pub async fn handle(&self, message: Message) -> Result<()> {
        let start = Instant::now();
        let mut queue = VecDeque::from([message]);
        let mut handled: u64 = 0;

        while let Some(message) = queue.pop_front() {
            metrics::counter!("messagebus_messages_handled_total", "type" => message.message_type())
                .increment(1);
            handled += 1;

            let produced = match message {
                Message::Command(command) => self.dispatch_command(command).await?,
                Message::Event(event) => self.dispatch_event(&event).await?,
            };
            queue.extend(produced);
        }

        let duration = start.elapsed().as_secs_f64();
        metrics::histogram!("messagebus_dispatch_duration_seconds").record(duration);
        tracing::debug!(handled, duration, "dispatch complete");
        Ok(())
    }

    /// Handles a command and its cascade.
    pub async fn handle_command(&self, command: Command) -> Result<()> {
        self.handle(Message::Command(command)).await
    }

    async fn dispatch_command(&self, command: Command) -> Result<Vec<Message>> {
        let kind = command.kind();
        let handler = self
            .command_handlers
            .get(&kind)
            .ok_or(ServiceError::UnrecognizedMessage(kind.name()))?;

        tracing::debug!(command = kind.name(), handler = handler.name(), "handling command");
        handler.handle(command).await.inspect_err(|e| {
            tracing::error!(command = kind.name(), handler = handler.name(), error = %e, "command failed");
        })
    }

    async fn dispatch_event(&self, event: &Event) -> Result<Vec<Message>> {
        let kind = event.kind();
        let handlers = self
            .event_handlers
            .get(&kind)
            .ok_or(ServiceError::UnrecognizedMessage(kind.name()))?;

        let mut produced = Vec::new();
        for handler in handlers {
            tracing::debug!(event = kind.name(), handler = handler.name(), "handling event");
            match handler.handle(event).await {
                Ok(messages) => produced.extend(messages),
                Err(e) => {
                    metrics::counter!("messagebus_event_handler_failures_total", "handler" => handler.name())
                        .increment(1);
                    tracing::error!(event = kind.name(), handler = handler.name(), error = %e, "event handler failed");
                }
            }
        }
        Ok(produced)
    }
}

/// Builds the handler tables of a [`MessageBus`].
#[derive(Default)]
pub struct MessageBusBuilder {
    command_handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
    event_handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl MessageBusBuilder {
    /// Sets the handler for a command kind, replacing any previous one.
    pub fn command(mut self, kind: CommandKind, handler: Arc<dyn CommandHandler>) -> Self {
        self.command_handlers.insert(kind, handler);
        self
    }

    /// Appends a handler for an event kind.
    pub fn event(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handlers.entry(kind).or_default().push(handler);
        self
    }

    /// Declares an event kind without adding a handler.
    ///
    /// Events of a declared kind with no handlers are dropped quietly.
    pub fn declare_event(mut self, kind: EventKind) -> Self {
        self.event_handlers.entry(kind).or_default();
        self
    }

    pub fn build(self) -> MessageBus {
        MessageBus {
            command_handlers: self.command_handlers,
            event_handlers: self.event_handlers,
        }
    }
}
