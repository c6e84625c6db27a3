use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::events::KvChanged;
use crate::models::{Task, TaskId};

pub const CMD_GET_TASKS: &str = "get_tasks";
pub const CMD_PUT_TASK: &str = "put_task";
pub const CMD_EDIT_TASK: &str = "patch_task_task";
pub const CMD_COMPLETE_TASK: &str = "patch_task_status_done";
pub const CMD_DELETE_TASK: &str = "delete_task";
pub const CMD_CLEAN_TASKS: &str = "clean_tasks";
pub const CMD_GET_STORAGE: &str = "get_storage";
pub const CMD_SET_STORAGE: &str = "set_storage";
pub const CMD_WATCH_STORAGE: &str = "watch_storage";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The call never completed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The remote side answered with an explicit error.
    #[error("{0}")]
    Domain(String),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The carrier between this client and the remote process.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Runs `command` remotely and returns the raw JSON envelope.
    async fn invoke(&self, command: &str, args: Value) -> Result<String, TransportError>;

    /// Stream of `kv_changed` events for keys registered via `watch_storage`.
    fn subscribe(&self) -> broadcast::Receiver<KvChanged>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn invoke(&self, command: &str, args: Value) -> Result<String, TransportError> {
        (**self).invoke(command, args).await
    }

    fn subscribe(&self) -> broadcast::Receiver<KvChanged> {
        (**self).subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<T> {
    Data(T),
    Error(String),
}

impl<T: DeserializeOwned> Response<T> {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        let mut envelope: Value = serde_json::from_str(raw)?;
        if let Some(error) = envelope.get("error") {
            let message = match error {
                Value::String(message) => message.clone(),
                other => other.to_string(),
            };
            return Ok(Response::Error(message));
        }
        let data = envelope
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok(Response::Data(serde_json::from_value(data)?))
    }
}

impl<T> Response<T> {
    pub fn into_result(self) -> Result<T, GatewayError> {
        match self {
            Response::Data(data) => Ok(data),
            Response::Error(message) => Err(GatewayError::Domain(message)),
        }
    }
}

/// Encodes a handler result as the wire envelope.
pub fn to_response(result: Result<Value, String>) -> String {
    match result {
        Ok(data) => json!({ "data": data }).to_string(),
        Err(error) => json!({ "error": error }).to_string(),
    }
}

/// Typed client over a [`Transport`]. Decodes the `{"data"}`/`{"error"}`
/// envelope once for every command.
pub struct RemoteGateway<T> {
    transport: T,
}

impl<T: Transport> RemoteGateway<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KvChanged> {
        self.transport.subscribe()
    }

    async fn call<R: DeserializeOwned>(&self, command: &str, args: Value) -> Result<R, GatewayError> {
        log::debug!("remote call {command} args={args}");
        let raw = self.transport.invoke(command, args).await?;
        let result = Response::<R>::decode(&raw)?.into_result();
        if let Err(error) = &result {
            log::debug!("remote call {command} failed: {error}");
        }
        result
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, GatewayError> {
        self.call(CMD_GET_TASKS, json!({})).await
    }

    pub async fn create_task(&self, text: &str) -> Result<(), GatewayError> {
        self.call(CMD_PUT_TASK, json!({ "task": text })).await
    }

    pub async fn edit_task(&self, id: TaskId, text: &str) -> Result<(), GatewayError> {
        self.call(CMD_EDIT_TASK, json!({ "id": id, "task": text }))
            .await
    }

    pub async fn complete_task(&self, id: TaskId) -> Result<(), GatewayError> {
        self.call(CMD_COMPLETE_TASK, json!({ "id": id })).await
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<(), GatewayError> {
        self.call(CMD_DELETE_TASK, json!({ "id": id })).await
    }

    pub async fn clean_tasks(&self) -> Result<(), GatewayError> {
        self.call(CMD_CLEAN_TASKS, json!({})).await
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<String>, GatewayError> {
        self.call(CMD_GET_STORAGE, json!({ "key": key })).await
    }

    pub async fn set_value(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        self.call(CMD_SET_STORAGE, json!({ "key": key, "value": value }))
            .await
    }

    pub async fn watch_key(&self, key: &str) -> Result<(), GatewayError> {
        self.call(CMD_WATCH_STORAGE, json!({ "key": key })).await
    }
}
