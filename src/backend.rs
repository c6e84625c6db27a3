use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::events::{KvChanged, EVENT_KV_CHANGED};
use crate::gateway::{
    to_response, Transport, TransportError, CMD_CLEAN_TASKS, CMD_COMPLETE_TASK, CMD_DELETE_TASK,
    CMD_EDIT_TASK, CMD_GET_STORAGE, CMD_GET_TASKS, CMD_PUT_TASK, CMD_SET_STORAGE,
    CMD_WATCH_STORAGE,
};
use crate::models::{StoredTask, Task, TaskId, TaskStatus, TasksFile};
use crate::storage::{Storage, StorageError};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RETENTION_DAYS: i64 = 7;
const EVENT_CAPACITY: usize = 64;

#[derive(Deserialize)]
struct TextArgs {
    task: String,
}

#[derive(Deserialize)]
struct IdArgs {
    id: TaskId,
}

#[derive(Deserialize)]
struct EditArgs {
    id: TaskId,
    task: String,
}

#[derive(Deserialize)]
struct KeyArgs {
    key: String,
}

#[derive(Deserialize)]
struct SetArgs {
    key: String,
    value: String,
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("invalid arguments: {e}"))
}

fn storage_err(error: StorageError) -> String {
    format!("storage error: {error}")
}

fn now_string() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

struct BackendData {
    file: TasksFile,
    /// Last value seen for each watched key.
    watched: HashMap<String, Option<String>>,
}

fn load_file(storage: &Storage) -> Result<TasksFile, StorageError> {
    match storage.load_tasks() {
        Ok(file) => Ok(file),
        Err(StorageError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            Ok(TasksFile::default())
        }
        Err(err) => Err(err),
    }
}

/// The remote side, served in-process from [`Storage`]. Failing commands
/// answer with an error envelope.
pub struct LocalBackend {
    storage: Storage,
    data: Mutex<BackendData>,
    events: broadcast::Sender<KvChanged>,
}

impl LocalBackend {
    /// Opens the store under `storage`, starting empty when no task file exists yet.
    pub fn open(storage: Storage) -> Result<Self, StorageError> {
        storage.ensure_dirs()?;
        let file = load_file(&storage)?;
        log::info!(
            "local backend opened root={} tasks={}",
            storage.root().display(),
            file.tasks.len()
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            storage,
            data: Mutex::new(BackendData {
                file,
                watched: HashMap::new(),
            }),
            events,
        })
    }

    fn with_data<R>(&self, f: impl FnOnce(&mut BackendData) -> R) -> Result<R, String> {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| "backend state poisoned".to_string())?;
        Ok(f(&mut guard))
    }

    /// Re-reads the task file. Other processes may share the data dir, so the
    /// copy in memory is never trusted across calls.
    fn reload(&self, data: &mut BackendData) -> Result<(), String> {
        data.file = load_file(&self.storage).map_err(storage_err)?;
        Ok(())
    }

    /// Applies `mutate` to the current file and persists it. Nothing is kept
    /// in memory unless the write succeeded.
    fn mutate_tasks(
        &self,
        mutate: impl FnOnce(&mut TasksFile) -> Result<(), String>,
    ) -> Result<Value, String> {
        self.with_data(|data| {
            self.reload(data)?;
            let mut next = data.file.clone();
            mutate(&mut next)?;
            self.storage.save_tasks(&next).map_err(storage_err)?;
            data.file = next;
            Ok(Value::Null)
        })?
    }

    fn list_tasks(&self) -> Result<Value, String> {
        self.with_data(|data| {
            self.reload(data)?;
            self.scan_watched(data);
            let mut open: Vec<Task> = data
                .file
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Open)
                .map(StoredTask::to_task)
                .collect();
            open.sort_by_key(|t| t.id);
            Ok(json!(open))
        })?
    }

    fn put_task(&self, args: TextArgs) -> Result<Value, String> {
        self.mutate_tasks(|file| {
            let id = file.next_id;
            file.next_id += 1;
            file.tasks.push(StoredTask {
                id,
                task: args.task,
                create_time: now_string(),
                finished_time: None,
                status: TaskStatus::Open,
            });
            Ok(())
        })
    }

    fn edit_task(&self, args: EditArgs) -> Result<Value, String> {
        self.mutate_tasks(|file| {
            let task = find_task(file, args.id)?;
            task.task = args.task;
            Ok(())
        })
    }

    fn complete_task(&self, args: IdArgs) -> Result<Value, String> {
        self.mutate_tasks(|file| {
            let task = find_task(file, args.id)?;
            task.status = TaskStatus::Closed;
            task.finished_time = Some(now_string());
            Ok(())
        })
    }

    fn delete_task(&self, args: IdArgs) -> Result<Value, String> {
        self.mutate_tasks(|file| {
            let task = find_task(file, args.id)?;
            task.status = TaskStatus::Deleted;
            task.finished_time = Some(now_string());
            Ok(())
        })
    }

    fn clean_tasks(&self) -> Result<Value, String> {
        let cutoff = Local::now().naive_local() - chrono::Duration::days(RETENTION_DAYS);
        self.mutate_tasks(|file| {
            let before = file.tasks.len();
            file.tasks.retain(|task| !is_outdated(task, cutoff));
            log::info!("cleaned {} outdated tasks", before - file.tasks.len());
            Ok(())
        })
    }

    fn get_storage(&self, args: KeyArgs) -> Result<Value, String> {
        let value = self.storage.get_value(&args.key).map_err(storage_err)?;
        Ok(json!(value))
    }

    fn set_storage(&self, args: SetArgs) -> Result<Value, String> {
        self.storage
            .set_value(&args.key, &args.value)
            .map_err(storage_err)?;
        let watched = self.with_data(|data| match data.watched.get_mut(&args.key) {
            Some(seen) => {
                *seen = Some(args.value);
                true
            }
            None => false,
        })?;
        if watched {
            self.emit(args.key);
        }
        Ok(Value::Null)
    }

    fn watch_storage(&self, args: KeyArgs) -> Result<Value, String> {
        let current = self.storage.get_value(&args.key).map_err(storage_err)?;
        self.with_data(|data| {
            data.watched.entry(args.key).or_insert(current);
        })?;
        Ok(Value::Null)
    }

    /// Announces watched keys whose stored value changed behind our back.
    /// Runs on every poll.
    fn scan_watched(&self, data: &mut BackendData) {
        for (key, seen) in data.watched.iter_mut() {
            let current = match self.storage.get_value(key) {
                Ok(current) => current,
                Err(error) => {
                    log::warn!("cannot read watched key {key}: {error}");
                    continue;
                }
            };
            if *seen != current {
                *seen = current;
                self.emit(key.clone());
            }
        }
    }

    fn emit(&self, key: String) {
        log::debug!("emit {EVENT_KV_CHANGED} key={key}");
        // No subscribers is fine.
        let _ = self.events.send(KvChanged { key });
    }

    fn dispatch(&self, command: &str, args: Value) -> Result<Value, String> {
        match command {
            CMD_GET_TASKS => self.list_tasks(),
            CMD_PUT_TASK => self.put_task(parse_args(args)?),
            CMD_EDIT_TASK => self.edit_task(parse_args(args)?),
            CMD_COMPLETE_TASK => self.complete_task(parse_args(args)?),
            CMD_DELETE_TASK => self.delete_task(parse_args(args)?),
            CMD_CLEAN_TASKS => self.clean_tasks(),
            CMD_GET_STORAGE => self.get_storage(parse_args(args)?),
            CMD_SET_STORAGE => self.set_storage(parse_args(args)?),
            CMD_WATCH_STORAGE => self.watch_storage(parse_args(args)?),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

fn find_task(file: &mut TasksFile, id: TaskId) -> Result<&mut StoredTask, String> {
    file.tasks
        .iter_mut()
        .find(|t| t.id == id && t.status != TaskStatus::Deleted)
        .ok_or_else(|| format!("task {id} not found"))
}

fn is_outdated(task: &StoredTask, cutoff: NaiveDateTime) -> bool {
    if task.status == TaskStatus::Open {
        return false;
    }
    match &task.finished_time {
        None => true,
        Some(finished) => NaiveDateTime::parse_from_str(finished, TIME_FORMAT)
            .map(|at| at <= cutoff)
            .unwrap_or(true),
    }
}

#[async_trait]
impl Transport for LocalBackend {
    async fn invoke(&self, command: &str, args: Value) -> Result<String, TransportError> {
        let result = self.dispatch(command, args);
        if let Err(error) = &result {
            log::warn!("command {command} failed: {error}");
        }
        Ok(to_response(result))
    }

    fn subscribe(&self) -> broadcast::Receiver<KvChanged> {
        self.events.subscribe()
    }
}
