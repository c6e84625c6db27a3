use serde::{Deserialize, Serialize};

pub type TaskId = i64;

/// User-chosen display order, as task ids. Never holds duplicates.
pub type OrderSequence = Vec<TaskId>;

/// Tasks laid out in display order.
pub type OrderedView = Vec<Task>;

pub const MIN_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "task")]
    pub text: String,
    pub create_time: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum Theme {
    Dark,
    #[default]
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

impl From<Theme> for u8 {
    fn from(value: Theme) -> Self {
        match value {
            Theme::Dark => 0,
            Theme::Light => 1,
        }
    }
}

impl TryFrom<u8> for Theme {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Theme::Dark),
            1 => Ok(Theme::Light),
            other => Err(format!("unknown theme {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    #[serde(default)]
    pub theme: Theme,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_quick_submit_window_ms")]
    pub quick_submit_window_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            quick_submit_window_ms: default_quick_submit_window_ms(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_quick_submit_window_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsFile {
    pub schema_version: u32,
    pub settings: Settings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Closed,
    Deleted,
}

/// A task as kept by the local backend, including lifecycle bookkeeping that
/// never crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoredTask {
    pub id: TaskId,
    pub task: String,
    pub create_time: String,
    pub finished_time: Option<String>,
    pub status: TaskStatus,
}

impl StoredTask {
    pub fn to_task(&self) -> Task {
        Task {
            id: self.id,
            text: self.task.clone(),
            create_time: self.create_time.clone(),
            done: self.status == TaskStatus::Closed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TasksFile {
    pub schema_version: u32,
    #[serde(default = "default_next_id")]
    pub next_id: TaskId,
    pub tasks: Vec<StoredTask>,
}

impl Default for TasksFile {
    fn default() -> Self {
        Self {
            schema_version: crate::storage::SCHEMA_VERSION,
            next_id: default_next_id(),
            tasks: Vec::new(),
        }
    }
}

fn default_next_id() -> TaskId {
    1
}
