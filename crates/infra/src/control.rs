//! Single-threaded control path
//!
//! [`ControlLoop::spawn`] moves an [`AudioController`] onto a dedicated thread
//! that waits on two channels: commands from callers and session events from
//! the hardware. Both are handled one at a time, so a reconfiguration can
//! never overlap another one or an event reconciliation.
//!
//! Events already queued when a command arrives are reconciled first.

use async_trait::async_trait;
use cadenza_core::domain::audio::{HardwareSession, ProcessingUnit};
use cadenza_core::domain::command::{Command, CommandExecutor, CommandResult, ControlError};
use cadenza_core::domain::controller::AudioController;
use crossbeam::channel::{never, select, unbounded, Sender};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

struct Request {
    command: Command,
    reply: oneshot::Sender<CommandResult>,
}

pub struct ControlLoop;

impl ControlLoop {
    /// Start the control thread; the controller is dropped when it exits
    pub fn spawn<S, U>(mut controller: AudioController<S, U>) -> std::io::Result<ControlHandle>
    where
        S: HardwareSession + 'static,
        U: ProcessingUnit + 'static,
    {
        let (commands_tx, commands) = unbounded::<Request>();

        let thread = std::thread::Builder::new()
            .name("cadenza-control".to_string())
            .spawn(move || {
                info!("Control loop started");
                let mut events = controller.events().clone();
                let mut detached = false;
                loop {
                    select! {
                        recv(commands) -> request => match request {
                            Ok(Request { command, reply }) => {
                                controller.process_pending_events();
                                debug!(?command, "Executing command");
                                let result = controller.execute(command);
                                if reply.send(result).is_err() {
                                    debug!("Command caller went away before the reply");
                                }
                            }
                            Err(_) => break,
                        },
                        recv(events) -> event => match event {
                            Ok(event) => {
                                controller.handle_event(event);
                            }
                            Err(_) => detached = true,
                        },
                    }
                    if detached {
                        debug!("Session event bus detached");
                        events = never();
                        detached = false;
                    }
                }
                drop(controller);
                info!("Control loop stopped");
            })?;

        Ok(ControlHandle {
            commands: Some(commands_tx),
            thread: Some(thread),
        })
    }
}

/// Caller side of a running [`ControlLoop`]
///
/// Dropping the handle stops the loop and waits for the controller to be
/// released.
pub struct ControlHandle {
    commands: Option<Sender<Request>>,
    thread: Option<JoinHandle<()>>,
}

impl ControlHandle {
    fn submit(&self, command: Command) -> Result<oneshot::Receiver<CommandResult>, ControlError> {
        let sender = self.commands.as_ref().ok_or(ControlError::Closed)?;
        let (reply, receiver) = oneshot::channel();
        sender
            .send(Request { command, reply })
            .map_err(|_| ControlError::Closed)?;
        Ok(receiver)
    }

    /// Run `command` and block the calling thread until it completes
    ///
    /// Must not be called from within an async runtime; use
    /// [`CommandExecutor::execute`] there.
    pub fn execute_blocking(&self, command: Command) -> Result<CommandResult, ControlError> {
        self.submit(command)?
            .blocking_recv()
            .map_err(|_| ControlError::NoReply)
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop the loop and wait for it to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.commands.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Control loop panicked");
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for ControlHandle {
    async fn execute(&self, command: Command) -> Result<CommandResult, ControlError> {
        self.submit(command)?
            .await
            .map_err(|_| ControlError::NoReply)
    }
}

impl Drop for ControlHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
