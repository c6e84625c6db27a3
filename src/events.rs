use crate::models::Task;

pub const EVENT_KV_CHANGED: &str = "kv_changed";

/// Pushed by the remote side after a watched key was written.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KvChanged {
    pub key: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ViewPayload {
    pub tasks: Vec<Task>,
}
