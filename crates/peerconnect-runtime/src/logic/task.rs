//! Core Task Implementation
//!
//! The single loop that serializes every command, transport callback and
//! timer fire onto the state machine.

use peerconnect_core::{Command, CommandReceiver, Event, EventReceiver, Result};
use tracing::{debug, info, warn};

use super::machine::ConnectionLifecycle;

// ----------------------------------------------------------------------------
// Core Task
// ----------------------------------------------------------------------------

pub struct CoreTask {
    lifecycle: ConnectionLifecycle,
    command_receiver: CommandReceiver,
    event_receiver: EventReceiver,
    running: bool,
}

impl CoreTask {
    pub fn new(
        lifecycle: ConnectionLifecycle,
        command_receiver: CommandReceiver,
        event_receiver: EventReceiver,
    ) -> Self {
        Self {
            lifecycle,
            command_receiver,
            event_receiver,
            running: true,
        }
    }

    /// Run until shutdown or until every command sender is gone
    pub async fn run(mut self) -> Result<()> {
        info!("Core task starting");
        self.lifecycle.start().await;

        while self.running {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.process_command(command).await,
                        None => {
                            info!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }

                Some(event) = self.event_receiver.recv() => {
                    self.process_event(event).await;
                }
            }
        }

        self.lifecycle.shutdown().await;
        info!("Core task stopped");
        Ok(())
    }

    async fn process_command(&mut self, command: Command) {
        self.lifecycle.state.stats.commands_processed += 1;
        debug!("Processing command {}", command.name());

        let (result, reply) = match command {
            Command::Host { reply } => (self.lifecycle.handle_host().await, reply),
            Command::Join { reply } => (self.lifecycle.handle_join().await, reply),
            Command::SelectPeer { endpoint_id, reply } => {
                (self.lifecycle.handle_select_peer(endpoint_id).await, reply)
            }
            Command::SendText { body, reply } => {
                (self.lifecycle.handle_send_text(body).await, reply)
            }
            Command::Disconnect { reply } => (self.lifecycle.handle_disconnect().await, reply),
            Command::SetName { name, reply } => {
                (self.lifecycle.handle_set_name(name).await, reply)
            }
            Command::Shutdown => {
                self.running = false;
                return;
            }
        };

        if let Err(e) = &result {
            warn!("Command failed: {}", e);
        }
        if reply.send(result).is_err() {
            debug!("Command caller went away before the reply");
        }
    }

    async fn process_event(&mut self, event: Event) {
        self.lifecycle.state.stats.events_processed += 1;

        match event {
            Event::Transport { generation, event } => {
                self.lifecycle.handle_transport_event(generation, event).await
            }
            Event::PulseFired { pulse } => self.lifecycle.handle_pulse(pulse).await,
            Event::Settled { generation } => self.lifecycle.on_settled(generation),
        }
    }
}
