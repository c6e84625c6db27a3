use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::engine::TaskSink;
use crate::gateway::{RemoteGateway, Transport};
use crate::models::{Task, MIN_POLL_INTERVAL_MS};
use crate::notify::Notifier;

/// Downstream of the poller. Returns `false` once nobody is listening.
pub trait Publish: Send + 'static {
    fn publish(&self, tasks: Vec<Task>) -> bool;
}

impl Publish for TaskSink {
    fn publish(&self, tasks: Vec<Task>) -> bool {
        self.deliver(tasks)
    }
}

/// Requests an out-of-band fetch from a running poller.
#[derive(Clone)]
pub struct PollerHandle {
    refresh: mpsc::Sender<()>,
}

impl PollerHandle {
    /// Asks for a fetch as soon as possible. Requests made while one is
    /// already pending collapse into it.
    pub fn refresh(&self) {
        let _ = self.refresh.try_send(());
    }
}

pub struct Poller {
    handle: PollerHandle,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Poller {
    /// Starts polling: one fetch right away, then one per `period`. Periods
    /// below [`MIN_POLL_INTERVAL_MS`] are raised to it.
    pub fn start<T, P>(
        gateway: Arc<RemoteGateway<T>>,
        period: Duration,
        sink: P,
        notifier: Arc<dyn Notifier>,
    ) -> Self
    where
        T: Transport + 'static,
        P: Publish,
    {
        let period = period.max(Duration::from_millis(MIN_POLL_INTERVAL_MS));
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            gateway,
            period,
            sink,
            notifier,
            refresh_rx,
            shutdown_rx,
        ));
        log::info!("poller started period_ms={}", period.as_millis());
        Self {
            handle: PollerHandle {
                refresh: refresh_tx,
            },
            shutdown: shutdown_tx,
            task,
        }
    }

    pub fn handle(&self) -> PollerHandle {
        self.handle.clone()
    }

    /// Stops the timer. Once this returns no further fetch is issued and any
    /// fetch still in flight has been abandoned.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(error) = self.task.await {
            log::error!("poller ended abnormally: {error}");
        }
        log::info!("poller stopped");
    }
}

async fn run<T: Transport, P: Publish>(
    gateway: Arc<RemoteGateway<T>>,
    period: Duration,
    sink: P,
    notifier: Arc<dyn Notifier>,
    mut refresh: mpsc::Receiver<()>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last: Option<Vec<Task>> = None;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
            Some(()) = refresh.recv() => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            fetched = gateway.list_tasks() => fetched,
        };

        match fetched {
            Ok(mut tasks) => {
                // Newest first.
                tasks.reverse();
                if last.as_ref() == Some(&tasks) {
                    continue;
                }
                log::info!("tasks changed count={}", tasks.len());
                last = Some(tasks.clone());
                if !sink.publish(tasks) {
                    log::debug!("poll sink closed");
                    break;
                }
            }
            Err(error) => {
                log::warn!("fetching tasks failed: {error}");
                notifier.error("Error fetching todo list", &error.to_string());
            }
        }
    }
}
