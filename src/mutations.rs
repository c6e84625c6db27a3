use std::sync::Arc;

use crate::engine::EngineHandle;
use crate::gateway::{GatewayError, RemoteGateway, Transport};
use crate::models::TaskId;
use crate::notify::Notifier;
use crate::poller::PollerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Rejected locally before anything was sent.
    Skipped,
    Applied,
    Failed,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        self == Outcome::Applied
    }
}

/// Trims `text`, returning `None` when nothing is left.
pub fn normalize_text(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Single-attempt local changes. Failures are reported and leave local
/// state alone.
pub struct Mutations<T> {
    gateway: Arc<RemoteGateway<T>>,
    poller: PollerHandle,
    engine: EngineHandle,
    notifier: Arc<dyn Notifier>,
}

impl<T: Transport> Mutations<T> {
    pub fn new(
        gateway: Arc<RemoteGateway<T>>,
        poller: PollerHandle,
        engine: EngineHandle,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gateway,
            poller,
            engine,
            notifier,
        }
    }

    fn finish(
        &self,
        result: Result<(), GatewayError>,
        success: (&str, &str),
        failure: &str,
    ) -> Outcome {
        match result {
            Ok(()) => {
                self.notifier.success(success.0, success.1);
                self.poller.refresh();
                Outcome::Applied
            }
            Err(error) => {
                log::warn!("{failure}: {error}");
                self.notifier.error(failure, &error.to_string());
                Outcome::Failed
            }
        }
    }

    fn task_text(&self, id: TaskId) -> String {
        self.engine
            .current_view()
            .and_then(|view| view.into_iter().find(|t| t.id == id))
            .map(|t| t.text)
            .unwrap_or_else(|| format!("task {id}"))
    }

    pub async fn create(&self, text: &str) -> Outcome {
        let Some(text) = normalize_text(text) else {
            log::debug!("ignore empty new task");
            return Outcome::Skipped;
        };
        let result = self.gateway.create_task(text).await;
        self.finish(
            result,
            ("create new task successfully", text),
            "Error creating task",
        )
    }

    pub async fn edit(&self, id: TaskId, text: &str) -> Outcome {
        let Some(text) = normalize_text(text) else {
            log::debug!("ignore empty edit of task {id}");
            return Outcome::Skipped;
        };
        let result = self.gateway.edit_task(id, text).await;
        self.finish(result, ("edit task successfully", text), "failed to edit task")
    }

    pub async fn complete(&self, id: TaskId) -> Outcome {
        let text = self.task_text(id);
        let result = self.gateway.complete_task(id).await;
        self.finish(
            result,
            ("finished", &text),
            "An error occurred while completing the task",
        )
    }

    pub async fn delete(&self, id: TaskId) -> Outcome {
        let text = self.task_text(id);
        let result = self.gateway.delete_task(id).await;
        self.finish(result, ("deleted", &text), "failed to delete task")
    }

    /// Purges tasks finished or deleted more than a week ago.
    pub async fn clean(&self) -> Outcome {
        let result = self.gateway.clean_tasks().await;
        self.finish(
            result,
            ("cleaned", "outdated tasks removed"),
            "failed to clean tasks",
        )
    }

    /// Purely local: moves `active` to where `over` sits. Never touches the
    /// remote task data.
    pub async fn reorder(&self, active: TaskId, over: Option<TaskId>) -> Outcome {
        if self.engine.reorder(active, over).await {
            Outcome::Applied
        } else {
            Outcome::Skipped
        }
    }
}
