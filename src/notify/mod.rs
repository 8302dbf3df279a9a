//! Due-date notifications: ledger, scheduler, dispatcher and background worker.

pub mod dispatch;
pub mod ledger;
pub mod scheduler;
pub mod surface;
pub mod worker;

pub use dispatch::Dispatcher;
pub use ledger::NotificationLedger;
pub use scheduler::{SchedulerEvent, SchedulerSettings, VerificationScheduler};
pub use surface::{DesktopSurface, Notification, NotificationSurface, Permission};
