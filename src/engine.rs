use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::gateway::Transport;
use crate::models::{OrderSequence, OrderedView, Task, TaskId};
use crate::order_store::OrderStore;
use crate::state::OrderState;

enum Msg {
    Tasks(Vec<Task>),
    Reorder {
        active: TaskId,
        over: Option<TaskId>,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<OrderSequence>>,
    },
    Shutdown,
}

/// Where the poller delivers changed task sets.
#[derive(Clone)]
pub struct TaskSink {
    commands: mpsc::UnboundedSender<Msg>,
}

impl TaskSink {
    /// Queues `tasks` for reconciliation. `false` once the engine is gone.
    pub fn deliver(&self, tasks: Vec<Task>) -> bool {
        self.commands.send(Msg::Tasks(tasks)).is_ok()
    }
}

/// Cheap, cloneable access to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Msg>,
    view: watch::Receiver<Option<OrderedView>>,
}

impl EngineHandle {
    pub fn task_sink(&self) -> TaskSink {
        TaskSink {
            commands: self.commands.clone(),
        }
    }

    /// Subscribes to the ordered view. `None` until the first reconciliation.
    pub fn view(&self) -> watch::Receiver<Option<OrderedView>> {
        self.view.clone()
    }

    pub fn current_view(&self) -> Option<OrderedView> {
        self.view.borrow().clone()
    }

    /// Drags `active` onto `over`. Resolves to whether the order changed.
    pub async fn reorder(&self, active: TaskId, over: Option<TaskId>) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Msg::Reorder {
                active,
                over,
                reply,
            })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// The order as the actor currently holds it.
    pub async fn order(&self) -> Option<OrderSequence> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Msg::Snapshot { reply }).is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }
}

/// The order actor. One task owns [`OrderState`]; polled task sets and
/// reorder requests are applied strictly one at a time, so every
/// reconciliation starts from the current order.
pub struct SyncEngine {
    handle: EngineHandle,
    actor: JoinHandle<()>,
    persister: JoinHandle<()>,
}

impl SyncEngine {
    pub fn spawn<T: Transport + 'static>(store: OrderStore<T>) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(None);
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();

        let persister = tokio::spawn(run_persister(store.clone(), persist_rx));
        let actor = Actor {
            state: OrderState::new(),
            seed_pending: true,
            store,
            view: view_tx,
            persist: persist_tx,
        };
        let actor = tokio::spawn(actor.run(commands_rx));

        Self {
            handle: EngineHandle {
                commands: commands_tx,
                view: view_rx,
            },
            actor,
            persister,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stops the actor and waits until every queued order write has finished.
    pub async fn shutdown(self) {
        let _ = self.handle.commands.send(Msg::Shutdown);
        if let Err(error) = self.actor.await {
            log::error!("order actor ended abnormally: {error}");
        }
        if let Err(error) = self.persister.await {
            log::error!("order persister ended abnormally: {error}");
        }
    }
}

struct Actor<T> {
    state: OrderState,
    /// Set until the stored order has been read once. While set, nothing is
    /// written back so an unreadable value is not replaced.
    seed_pending: bool,
    store: OrderStore<T>,
    view: watch::Sender<Option<OrderedView>>,
    persist: mpsc::UnboundedSender<OrderSequence>,
}

impl<T: Transport + 'static> Actor<T> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Msg>) {
        while let Some(msg) = commands.recv().await {
            match msg {
                Msg::Shutdown => break,
                Msg::Tasks(tasks) => self.on_tasks(tasks).await,
                other => self.handle(other),
            }
        }
        log::debug!("order actor stopped");
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Reorder {
                active,
                over,
                reply,
            } => {
                let changed = match self.state.reorder(active, over) {
                    Some(order) => {
                        log::debug!("change order on drag: {order:?}");
                        // An explicit user order outranks whatever is stored.
                        self.seed_pending = false;
                        self.publish();
                        self.persist(order);
                        true
                    }
                    None => false,
                };
                let _ = reply.send(changed);
            }
            Msg::Snapshot { reply } => {
                let _ = reply.send(self.state.order().cloned());
            }
            Msg::Tasks(_) | Msg::Shutdown => {}
        }
    }

    async fn on_tasks(&mut self, tasks: Vec<Task>) {
        let seed = if self.seed_pending {
            self.store.load().await
        } else {
            None
        };
        let order = match seed {
            Some(seed) => {
                self.seed_pending = false;
                self.state.reseed(tasks, seed)
            }
            None => self.state.apply_tasks(tasks, None),
        };
        log::debug!("change order on update: {order:?}");
        self.publish();
        if self.seed_pending {
            log::warn!("stored order unreadable, leaving it untouched");
        } else {
            self.persist(order);
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.state.view());
    }

    fn persist(&self, order: OrderSequence) {
        if self.persist.send(order).is_err() {
            log::warn!("order persister is gone; order kept in memory only");
        }
    }
}

/// Writes orders in arrival order. A backlog collapses to its newest entry.
async fn run_persister<T: Transport>(
    store: OrderStore<T>,
    mut rx: mpsc::UnboundedReceiver<OrderSequence>,
) {
    while let Some(mut order) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            order = newer;
        }
        store.save(&order).await;
    }
}
