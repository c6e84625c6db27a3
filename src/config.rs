use std::sync::Arc;

use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

use crate::events::KvChanged;
use crate::gateway::{RemoteGateway, Transport};
use crate::models::{GlobalConfig, Settings, Theme};
use crate::notify::Notifier;
use crate::storage::{Storage, StorageError};

/// Remote key holding the serialized [`GlobalConfig`].
pub const USER_CONFIG_KEY: &str = "user_config";

/// Reads the stored config. Absent values give the default; failures are
/// reported and also give the default.
pub async fn load_global_config<T: Transport>(
    gateway: &RemoteGateway<T>,
    notifier: &dyn Notifier,
) -> GlobalConfig {
    let raw = match gateway.get_value(USER_CONFIG_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return GlobalConfig::default(),
        Err(error) => {
            log::error!("error getting user config: {error}");
            notifier.error("error getting storage", &error.to_string());
            return GlobalConfig::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|error| {
        log::error!("user config is malformed: {error} raw={raw}");
        notifier.error("error getting storage", &error.to_string());
        GlobalConfig::default()
    })
}

pub async fn store_global_config<T: Transport>(
    gateway: &RemoteGateway<T>,
    notifier: &dyn Notifier,
    config: &GlobalConfig,
) -> bool {
    let result = match serde_json::to_string(config) {
        Ok(value) => gateway
            .set_value(USER_CONFIG_KEY, &value)
            .await
            .map_err(|e| e.to_string()),
        Err(error) => Err(error.to_string()),
    };
    match result {
        Ok(()) => true,
        Err(error) => {
            log::error!("error updating user config: {error}");
            notifier.error("error updating storage", &error);
            false
        }
    }
}

/// Flips the stored theme and returns the new one, or `None` if it could
/// not be written.
pub async fn toggle_theme<T: Transport>(
    gateway: &RemoteGateway<T>,
    notifier: &dyn Notifier,
) -> Option<Theme> {
    let mut config = load_global_config(gateway, notifier).await;
    config.theme = config.theme.toggled();
    store_global_config(gateway, notifier, &config)
        .await
        .then_some(config.theme)
}

/// Process settings, falling back to defaults when the file is missing or
/// unreadable.
pub fn load_settings(storage: &Storage) -> Settings {
    match storage.load_settings() {
        Ok(file) => file.settings,
        Err(StorageError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            Settings::default()
        }
        Err(err) => {
            log::warn!("settings unreadable, using defaults: {err}");
            Settings::default()
        }
    }
}

/// Keeps a [`GlobalConfig`] current by following `kv_changed` events for
/// [`USER_CONFIG_KEY`].
pub struct ConfigWatcher {
    config: watch::Receiver<GlobalConfig>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    pub async fn start<T: Transport + 'static>(
        gateway: Arc<RemoteGateway<T>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        // Subscribe before the first load so no change slips in between.
        let events = gateway.subscribe();
        if let Err(error) = gateway.watch_key(USER_CONFIG_KEY).await {
            log::warn!("cannot watch {USER_CONFIG_KEY}: {error}");
            notifier.error("error watching storage", &error.to_string());
        }
        let initial = load_global_config(&*gateway, notifier.as_ref()).await;
        let (config_tx, config_rx) = watch::channel(initial);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(follow(gateway, notifier, events, config_tx, shutdown_rx));
        Self {
            config: config_rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    pub fn config(&self) -> watch::Receiver<GlobalConfig> {
        self.config.clone()
    }

    pub fn current(&self) -> GlobalConfig {
        self.config.borrow().clone()
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(error) = self.task.await {
            log::error!("config watcher ended abnormally: {error}");
        }
    }
}

async fn follow<T: Transport>(
    gateway: Arc<RemoteGateway<T>>,
    notifier: Arc<dyn Notifier>,
    mut events: broadcast::Receiver<KvChanged>,
    config: watch::Sender<GlobalConfig>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = events.recv() => event,
        };
        match event {
            Ok(changed) if changed.key != USER_CONFIG_KEY => continue,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::debug!("config events lagged by {skipped}, reloading");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
        let loaded = load_global_config(&*gateway, notifier.as_ref()).await;
        config.send_if_modified(|current| {
            if *current == loaded {
                return false;
            }
            log::info!("user config changed theme={:?}", loaded.theme);
            *current = loaded;
            true
        });
    }
}
