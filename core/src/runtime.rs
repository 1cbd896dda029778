//! Tokio drivers for the role controllers
//!
//! Each controller is owned by one task. Transport events and client
//! commands are interleaved on that task, so the controller itself never
//! needs locking and sees one input at a time.

use crate::central::CentralController;
use crate::listener::Listener;
use crate::model::{ConnectionState, PeripheralHandle};
use crate::peripheral::PeripheralController;
use crate::transport::{CentralEvent, CentralTransport, PeripheralEvent, PeripheralTransport};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const COMMAND_QUEUE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Controller task not running")]
    NotRunning,
    #[error("No reply from controller task")]
    NoReply,
}

/// Point-in-time view of a central controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentralSnapshot {
    pub state: ConnectionState,
    pub peripheral: Option<PeripheralHandle>,
    pub last_value: Option<i64>,
    pub has_pending_action: bool,
}

/// Point-in-time view of a peripheral controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralSnapshot {
    pub counter: i64,
    pub subscribers: usize,
    pub published: bool,
    pub advertising: bool,
}

pub enum CentralCommand {
    Connect,
    Disconnect,
    ReadValue,
    Snapshot {
        reply: mpsc::Sender<CentralSnapshot>,
    },
    Shutdown,
}

pub enum PeripheralCommand {
    StartAdvertising,
    StopAdvertising,
    SetCounter(i64),
    Increment {
        reply: mpsc::Sender<i64>,
    },
    Snapshot {
        reply: mpsc::Sender<PeripheralSnapshot>,
    },
    Shutdown,
}

/// Handle for driving a spawned central controller
#[derive(Clone)]
pub struct CentralClient {
    command_tx: mpsc::Sender<CentralCommand>,
}

impl CentralClient {
    async fn send(&self, command: CentralCommand) -> Result<(), RuntimeError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RuntimeError::NotRunning)
    }

    pub async fn connect(&self) -> Result<(), RuntimeError> {
        self.send(CentralCommand::Connect).await
    }

    pub async fn disconnect(&self) -> Result<(), RuntimeError> {
        self.send(CentralCommand::Disconnect).await
    }

    pub async fn read_value(&self) -> Result<(), RuntimeError> {
        self.send(CentralCommand::ReadValue).await
    }

    pub async fn snapshot(&self) -> Result<CentralSnapshot, RuntimeError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.send(CentralCommand::Snapshot { reply: reply_tx })
            .await?;
        reply_rx.recv().await.ok_or(RuntimeError::NoReply)
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(CentralCommand::Shutdown).await
    }
}

/// Handle for driving a spawned peripheral controller
#[derive(Clone)]
pub struct PeripheralClient {
    command_tx: mpsc::Sender<PeripheralCommand>,
}

impl PeripheralClient {
    async fn send(&self, command: PeripheralCommand) -> Result<(), RuntimeError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RuntimeError::NotRunning)
    }

    pub async fn start_advertising(&self) -> Result<(), RuntimeError> {
        self.send(PeripheralCommand::StartAdvertising).await
    }

    pub async fn stop_advertising(&self) -> Result<(), RuntimeError> {
        self.send(PeripheralCommand::StopAdvertising).await
    }

    pub async fn set_counter(&self, value: i64) -> Result<(), RuntimeError> {
        self.send(PeripheralCommand::SetCounter(value)).await
    }

    /// Bump the counter, returning the new value
    pub async fn increment(&self) -> Result<i64, RuntimeError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.send(PeripheralCommand::Increment { reply: reply_tx })
            .await?;
        reply_rx.recv().await.ok_or(RuntimeError::NoReply)
    }

    pub async fn snapshot(&self) -> Result<PeripheralSnapshot, RuntimeError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.send(PeripheralCommand::Snapshot { reply: reply_tx })
            .await?;
        reply_rx.recv().await.ok_or(RuntimeError::NoReply)
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(PeripheralCommand::Shutdown).await
    }
}

/// Run a central controller on its own task
///
/// The task ends on `Shutdown` or once every client is dropped, handing the
/// controller back through the join handle.
pub fn spawn_central<T, L>(
    mut controller: CentralController<T, L>,
    mut events: mpsc::UnboundedReceiver<CentralEvent>,
) -> (CentralClient, JoinHandle<CentralController<T, L>>)
where
    T: CentralTransport + 'static,
    L: Listener + 'static,
{
    let (command_tx, mut command_rx) = mpsc::channel::<CentralCommand>(COMMAND_QUEUE);

    let task = tokio::spawn(async move {
        let mut events_open = true;
        loop {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => controller.handle_event(event),
                    None => {
                        debug!("central event stream closed");
                        events_open = false;
                    }
                },
                command = command_rx.recv() => match command {
                    Some(CentralCommand::Connect) => controller.connect(),
                    Some(CentralCommand::Disconnect) => controller.disconnect(),
                    Some(CentralCommand::ReadValue) => controller.read_value(),
                    Some(CentralCommand::Snapshot { reply }) => {
                        let snapshot = CentralSnapshot {
                            state: controller.state(),
                            peripheral: controller.peripheral(),
                            last_value: controller.last_value(),
                            has_pending_action: controller.has_pending_action(),
                        };
                        let _ = reply.send(snapshot).await;
                    }
                    Some(CentralCommand::Shutdown) | None => {
                        debug!("central task stopping");
                        break;
                    }
                },
            }
        }
        controller
    });

    (CentralClient { command_tx }, task)
}

/// Run a peripheral controller on its own task
pub fn spawn_peripheral<T>(
    mut controller: PeripheralController<T>,
    mut events: mpsc::UnboundedReceiver<PeripheralEvent>,
) -> (PeripheralClient, JoinHandle<PeripheralController<T>>)
where
    T: PeripheralTransport + 'static,
{
    let (command_tx, mut command_rx) = mpsc::channel::<PeripheralCommand>(COMMAND_QUEUE);

    let task = tokio::spawn(async move {
        let mut events_open = true;
        loop {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => controller.handle_event(event),
                    None => {
                        debug!("peripheral event stream closed");
                        events_open = false;
                    }
                },
                command = command_rx.recv() => match command {
                    Some(PeripheralCommand::StartAdvertising) => controller.start_advertising(),
                    Some(PeripheralCommand::StopAdvertising) => controller.stop_advertising(),
                    Some(PeripheralCommand::SetCounter(value)) => controller.set_counter(value),
                    Some(PeripheralCommand::Increment { reply }) => {
                        let value = controller.increment();
                        let _ = reply.send(value).await;
                    }
                    Some(PeripheralCommand::Snapshot { reply }) => {
                        let snapshot = PeripheralSnapshot {
                            counter: controller.counter(),
                            subscribers: controller.subscribers().len(),
                            published: controller.is_published(),
                            advertising: controller.is_advertising(),
                        };
                        let _ = reply.send(snapshot).await;
                    }
                    Some(PeripheralCommand::Shutdown) | None => {
                        debug!("peripheral task stopping");
                        break;
                    }
                },
            }
        }
        controller
    });

    (PeripheralClient { command_tx }, task)
}
