//! Platform notification surface.

use crate::error::{Error, Result};

pub const APP_NAME: &str = "agenda";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    pub fn new(action: &str, title: &str) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
        }
    }
}

/// Everything the surface needs to show one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Freedesktop icon name.
    pub icon: String,
    /// Notifications sharing a tag replace each other.
    pub tag: String,
    pub replace_id: u32,
    /// Stay on screen until dismissed.
    pub require_interaction: bool,
    /// Vibration pattern in milliseconds, passed along as a hint.
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Unsupported,
}

pub trait NotificationSurface: Send + Sync {
    fn permission(&self) -> Permission;

    /// Ask for permission; on the desktop this only re-probes the server.
    fn request_permission(&self) -> Permission {
        self.permission()
    }

    fn show(&self, notification: &Notification) -> Result<()>;
}

/// Desktop notifications through `notify-rust`.
pub struct DesktopSurface {
    enabled: bool,
}

impl DesktopSurface {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl NotificationSurface for DesktopSurface {
    fn permission(&self) -> Permission {
        if !self.enabled {
            return Permission::Denied;
        }
        server_available()
    }

    fn request_permission(&self) -> Permission {
        let permission = self.permission();
        match permission {
            Permission::Granted => log::info!("Notifications enabled"),
            Permission::Denied => log::info!("Notifications disabled in config"),
            Permission::Unsupported => log::warn!("No notification server available"),
        }
        permission
    }

    fn show(&self, notification: &Notification) -> Result<()> {
        let mut n = notify_rust::Notification::new();
        n.summary(&notification.title)
            .body(&notification.body)
            .icon(&notification.icon)
            .appname(APP_NAME);
        if notification.require_interaction {
            n.timeout(notify_rust::Timeout::Never);
        }

        #[cfg(all(unix, not(target_os = "macos")))]
        {
            use notify_rust::{Hint, Urgency};

            n.id(notification.replace_id)
                .urgency(if notification.require_interaction {
                    Urgency::Critical
                } else {
                    Urgency::Normal
                })
                .hint(Hint::Custom("x-agenda-tag".into(), notification.tag.clone()));
            if !notification.vibrate.is_empty() {
                let pattern: Vec<String> = notification.vibrate.iter().map(|v| v.to_string()).collect();
                n.hint(Hint::Custom("x-agenda-vibrate".into(), pattern.join(",")));
            }
            for action in &notification.actions {
                n.action(&action.action, &action.title);
            }
        }

        n.show()
            .map(|_| ())
            .map_err(|e| Error::Dispatch(e.to_string()))
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn server_available() -> Permission {
    match notify_rust::get_server_information() {
        Ok(info) => {
            log::debug!("Notification server: {} {}", info.name, info.version);
            Permission::Granted
        }
        Err(e) => {
            log::debug!("Notification server unreachable: {}", e);
            Permission::Unsupported
        }
    }
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn server_available() -> Permission {
    Permission::Granted
}
