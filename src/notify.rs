#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    pub description: String,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    fn success(&self, message: &str, description: &str) {
        self.notify(Notification::new(Level::Success, message, description));
    }

    fn info(&self, message: &str, description: &str) {
        self.notify(Notification::new(Level::Info, message, description));
    }

    fn warning(&self, message: &str, description: &str) {
        self.notify(Notification::new(Level::Warning, message, description));
    }

    fn error(&self, message: &str, description: &str) {
        self.notify(Notification::new(Level::Error, message, description));
    }
}

impl Notification {
    pub fn new(level: Level, message: &str, description: &str) -> Self {
        Self {
            level,
            message: message.to_string(),
            description: description.to_string(),
        }
    }
}

/// Routes notifications into the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        let Notification {
            level,
            message,
            description,
        } = notification;
        match level {
            Level::Success | Level::Info => log::info!("{message}: {description}"),
            Level::Warning => log::warn!("{message}: {description}"),
            Level::Error => log::error!("{message}: {description}"),
        }
    }
}
