use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::engine::SyncEngine;
use crate::events::KvChanged;
use crate::gateway::{to_response, RemoteGateway, Transport, TransportError};
use crate::models::{Task, TaskId};
use crate::mutations::Mutations;
use crate::notify::{Level, Notification, Notifier};
use crate::order_store::OrderStore;
use crate::poller::Poller;

pub fn make_task(id: TaskId, text: &str) -> Task {
    Task {
        id,
        text: text.to_string(),
        create_time: "2024-01-01 00:00:00".to_string(),
        done: false,
    }
}

pub fn make_tasks(ids: &[TaskId]) -> Vec<Task> {
    ids.iter().map(|id| make_task(*id, &format!("task-{id}"))).collect()
}

/// Lets spawned tasks on the current-thread runtime catch up.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct MockData {
    tasks: Vec<Task>,
    next_id: TaskId,
    kv: HashMap<String, String>,
    watched: HashSet<String>,
    failures: HashMap<String, String>,
    latency: HashMap<String, Duration>,
    offline: bool,
    calls: Vec<(String, Value)>,
}

/// A scriptable stand-in for the remote process.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockData>>,
    events: broadcast::Sender<KvChanged>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::with_tasks(Vec::new())
    }
}

impl MockTransport {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let next_id = tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Mutex::new(MockData {
                tasks,
                next_id,
                ..MockData::default()
            })),
            events,
        }
    }

    pub fn set_tasks(&self, tasks: Vec<Task>) {
        self.inner.lock().unwrap().tasks = tasks;
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.inner.lock().unwrap().tasks.clone()
    }

    pub fn set_value(&self, key: &str, value: &str) {
        self.inner
            .lock()
            .unwrap()
            .kv
            .insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().kv.get(key).cloned()
    }

    pub fn fail_command(&self, command: &str, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(command.to_string(), message.to_string());
    }

    pub fn clear_failure(&self, command: &str) {
        self.inner.lock().unwrap().failures.remove(command);
    }

    pub fn set_latency(&self, command: &str, latency: Duration) {
        self.inner
            .lock()
            .unwrap()
            .latency
            .insert(command.to_string(), latency);
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|(command, _)| command).collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|(c, _)| c == command).count()
    }

    fn handle(&self, command: &str, args: &Value) -> Result<Value, String> {
        let mut data = self.inner.lock().unwrap();
        if let Some(message) = data.failures.get(command) {
            return Err(message.clone());
        }
        let id = args.get("id").and_then(Value::as_i64);
        let text = args.get("task").and_then(Value::as_str).map(str::to_string);
        let key = args.get("key").and_then(Value::as_str).map(str::to_string);
        match command {
            "get_tasks" => Ok(json!(data.tasks)),
            "put_task" => {
                let id = data.next_id;
                data.next_id += 1;
                data.tasks.push(make_task(id, &text.unwrap_or_default()));
                Ok(Value::Null)
            }
            "patch_task_task" => {
                let task = data
                    .tasks
                    .iter_mut()
                    .find(|t| Some(t.id) == id)
                    .ok_or("task not found")?;
                task.text = text.unwrap_or_default();
                Ok(Value::Null)
            }
            "patch_task_status_done" | "delete_task" => {
                let before = data.tasks.len();
                data.tasks.retain(|t| Some(t.id) != id);
                if data.tasks.len() == before {
                    return Err("task not found".to_string());
                }
                Ok(Value::Null)
            }
            "clean_tasks" => Ok(Value::Null),
            "get_storage" => Ok(json!(key.and_then(|k| data.kv.get(&k).cloned()))),
            "set_storage" => {
                let key = key.ok_or("missing key")?;
                let value = args
                    .get("value")
                    .and_then(Value::as_str)
                    .ok_or("missing value")?;
                data.kv.insert(key.clone(), value.to_string());
                if data.watched.contains(&key) {
                    let _ = self.events.send(KvChanged { key });
                }
                Ok(Value::Null)
            }
            "watch_storage" => {
                data.watched.insert(key.ok_or("missing key")?);
                Ok(Value::Null)
            }
            other => Err(format!("unknown command {other}")),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn invoke(&self, command: &str, args: Value) -> Result<String, TransportError> {
        let latency = {
            let mut data = self.inner.lock().unwrap();
            data.calls.push((command.to_string(), args.clone()));
            if data.offline {
                return Err(TransportError("connection refused".to_string()));
            }
            data.latency.get(command).copied()
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(to_response(self.handle(command, &args)))
    }

    fn subscribe(&self) -> broadcast::Receiver<KvChanged> {
        self.events.subscribe()
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<Notification> {
        self.all()
            .into_iter()
            .filter(|n| n.level == Level::Error)
            .collect()
    }

    pub fn successes(&self) -> Vec<Notification> {
        self.all()
            .into_iter()
            .filter(|n| n.level == Level::Success)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

/// A full client wired against a [`MockTransport`]: engine, poller on a long
/// period (so only explicit refreshes fetch) and mutations.
pub struct Rig {
    pub transport: MockTransport,
    pub notifier: RecordingNotifier,
    pub engine: SyncEngine,
    pub poller: Poller,
    pub mutations: Mutations<MockTransport>,
}

impl Rig {
    pub async fn start(transport: MockTransport) -> Self {
        let notifier = RecordingNotifier::default();
        let shared: Arc<dyn Notifier> = Arc::new(notifier.clone());
        let gateway = Arc::new(RemoteGateway::new(transport.clone()));
        let engine = SyncEngine::spawn(OrderStore::new(gateway.clone(), shared.clone()));
        let poller = Poller::start(
            gateway.clone(),
            Duration::from_secs(60),
            engine.handle().task_sink(),
            shared.clone(),
        );
        let mutations = Mutations::new(gateway, poller.handle(), engine.handle(), shared);
        settle().await;
        Self {
            transport,
            notifier,
            engine,
            poller,
            mutations,
        }
    }

    pub async fn view_ids(&self) -> Vec<TaskId> {
        settle().await;
        self.engine
            .handle()
            .current_view()
            .unwrap_or_default()
            .iter()
            .map(|t| t.id)
            .collect()
    }

    pub async fn stop(self) {
        self.poller.stop().await;
        self.engine.shutdown().await;
    }
}
