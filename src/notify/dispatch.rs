use std::sync::Arc;

use tokio::sync::oneshot;

use super::surface::{Notification, NotificationAction, NotificationSurface, Permission};
use super::worker::{WorkerHandle, WorkerMessage};
use crate::core::task::Task;
use crate::core::temporal::Bucket;
use crate::error::Result;

const WELCOME_ID: u32 = 0x0A6E_0100;

fn replace_id(bucket: Bucket) -> u32 {
    match bucket {
        Bucket::Overdue => 0x0A6E_0001,
        Bucket::Today => 0x0A6E_0002,
        Bucket::Tomorrow => 0x0A6E_0003,
        Bucket::DayAfterTomorrow => 0x0A6E_0004,
        Bucket::Future => 0x0A6E_0005,
    }
}

fn icon(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Overdue => "dialog-warning",
        Bucket::Today => "appointment-soon",
        Bucket::Tomorrow => "x-office-calendar",
        Bucket::DayAfterTomorrow => "appointment-new",
        Bucket::Future => "x-office-calendar",
    }
}

fn vibration(bucket: Bucket) -> Vec<u32> {
    match bucket {
        Bucket::Overdue => vec![200, 100, 200, 100, 200],
        Bucket::Today => vec![200, 100, 200],
        Bucket::Tomorrow => vec![100, 50, 100],
        Bucket::DayAfterTomorrow => vec![50, 25, 50],
        Bucket::Future => vec![200, 100, 200],
    }
}

impl Notification {
    pub fn for_bucket(title: &str, body: &str, bucket: Bucket, urgent: bool) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            icon: icon(bucket).to_string(),
            tag: format!("tasks-{}", bucket.key()),
            replace_id: replace_id(bucket),
            require_interaction: urgent,
            vibrate: vibration(bucket),
            actions: vec![
                NotificationAction::new("view", "View tasks"),
                NotificationAction::new("close", "Close"),
            ],
        }
    }

    pub fn welcome(user_name: &str) -> Self {
        Self {
            title: format!("Hello {}!", user_name),
            body: "Notifications are on. I'll remind you about your tasks when needed.".into(),
            icon: "dialog-information".into(),
            tag: "welcome".into(),
            replace_id: WELCOME_ID,
            require_interaction: false,
            vibrate: Vec::new(),
            actions: Vec::new(),
        }
    }
}

/// Title and body announcing a non-empty bucket.
pub fn bucket_message(bucket: Bucket, tasks: &[Task]) -> (String, String) {
    let count = tasks.len();
    let first = tasks.first().map(|t| t.title.as_str()).unwrap_or_default();
    match bucket {
        Bucket::Overdue => (
            "Overdue tasks!".into(),
            format!(
                "{} overdue task(s): {}{}",
                count,
                first,
                if count > 1 { " and more..." } else { "" }
            ),
        ),
        Bucket::Today => (
            "Tasks for TODAY!".into(),
            if count == 1 {
                format!("\"{}\"", first)
            } else {
                format!("{} tasks for today", count)
            },
        ),
        Bucket::Tomorrow => (
            "Tasks for TOMORROW".into(),
            if count == 1 {
                format!("\"{}\"", first)
            } else {
                format!("{} tasks for tomorrow", count)
            },
        ),
        Bucket::DayAfterTomorrow => (
            "Planning".into(),
            if count == 1 {
                format!("Day after tomorrow: \"{}\"", first)
            } else {
                format!("{} tasks in 2 days", count)
            },
        ),
        Bucket::Future => ("Upcoming tasks".into(), format!("{} upcoming task(s)", count)),
    }
}

/// Routes notifications to the background worker when one is running,
/// otherwise straight to the surface.
pub struct Dispatcher {
    surface: Arc<dyn NotificationSurface>,
    worker: Option<WorkerHandle>,
}

impl Dispatcher {
    pub fn new(surface: Arc<dyn NotificationSurface>) -> Self {
        Self {
            surface,
            worker: None,
        }
    }

    pub fn with_worker(mut self, worker: WorkerHandle) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn permission(&self) -> Permission {
        self.surface.permission()
    }

    pub fn request_permission(&self) -> Permission {
        self.surface.request_permission()
    }

    pub fn dispatch(&self, title: &str, body: &str, bucket: Bucket, urgent: bool) -> Result<()> {
        self.deliver(Notification::for_bucket(title, body, bucket, urgent))
    }

    /// Show a notification, through the worker when it is running. Waits
    /// for the worker's outcome, so call it from a blocking context.
    pub fn deliver(&self, notification: Notification) -> Result<()> {
        if let Some(worker) = self.worker.as_ref().filter(|w| w.is_active()) {
            let (ack, outcome) = oneshot::channel();
            let message = WorkerMessage::ShowNotification {
                notification: notification.clone(),
                ack: Some(ack),
            };
            if worker.post(message).is_ok() {
                match outcome.blocking_recv() {
                    Ok(result) => return result,
                    Err(_) => log::warn!(
                        "Background worker stopped before showing '{}', showing it directly",
                        notification.title
                    ),
                }
            } else {
                log::warn!("Background worker gone, showing notification directly");
            }
        }
        self.surface.show(&notification)?;
        log::info!("Notification sent: {}", notification.title);
        Ok(())
    }
}
