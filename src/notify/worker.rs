//! Background worker.
//!
//! Runs as its own task and talks to the scheduler only through channels:
//! it shows notifications relayed to it and forwards verification requests
//! back to the scheduler.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::scheduler::SchedulerEvent;
use super::surface::{Notification, NotificationSurface};
use crate::error::{Error, Result};

#[derive(Debug)]
pub enum WorkerMessage {
    /// Show a notification; the outcome goes back on `ack` when one is given.
    ShowNotification {
        notification: Notification,
        ack: Option<oneshot::Sender<Result<()>>>,
    },
    VerifyTasks,
}

/// Sending side of the worker channel.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerHandle {
    pub fn new(tx: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self { tx }
    }

    /// True while the worker is still receiving.
    pub fn is_active(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Post a message; hands it back if the worker has stopped.
    pub fn post(&self, message: WorkerMessage) -> std::result::Result<(), WorkerMessage> {
        self.tx.send(message).map_err(|e| e.0)
    }
}

/// Start the worker. `scheduler` receives the worker's verification requests.
pub fn spawn_worker(
    surface: Arc<dyn NotificationSurface>,
    scheduler: mpsc::UnboundedSender<SchedulerEvent>,
) -> (WorkerHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<WorkerMessage>();

    let handle = tokio::spawn(async move {
        log::debug!("Background worker started");
        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::ShowNotification { notification, ack } => {
                    let surface = surface.clone();
                    let title = notification.title.clone();
                    // Showing talks to the notification server and may block.
                    let shown = match tokio::task::spawn_blocking(move || surface.show(&notification)).await {
                        Ok(result) => result,
                        Err(e) => Err(Error::Dispatch(format!("notification task failed: {}", e))),
                    };
                    match &shown {
                        Ok(()) => log::info!("Notification sent: {}", title),
                        Err(e) => log::error!("Error sending notification '{}': {}", title, e),
                    }
                    if let Some(ack) = ack {
                        let _ = ack.send(shown);
                    }
                }
                WorkerMessage::VerifyTasks => {
                    if scheduler.send(SchedulerEvent::VerifyTasks).is_err() {
                        log::debug!("No scheduler listening for verification requests");
                    }
                }
            }
        }
        log::debug!("Background worker stopped");
    });

    (WorkerHandle::new(tx), handle)
}
