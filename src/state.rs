use crate::models::{OrderSequence, OrderedView, Task, TaskId};
use crate::reconcile::{merge_order, ordered_view, reorder};

/// Client-side ordering state. Owned by exactly one writer (the engine actor).
#[derive(Debug, Default)]
pub struct OrderState {
    tasks: Vec<Task>,
    /// `None` until the first reconciliation.
    order: Option<OrderSequence>,
}

impl OrderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self) -> bool {
        self.order.is_some()
    }

    pub fn order(&self) -> Option<&OrderSequence> {
        self.order.as_ref()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Reconciles a polled task set. `seed` is only consulted before the first
    /// reconciliation; afterwards the in-memory order wins.
    pub fn apply_tasks(&mut self, tasks: Vec<Task>, seed: Option<OrderSequence>) -> OrderSequence {
        let base = self.order.take().or(seed).unwrap_or_default();
        let merged = merge_order(&base, &tasks);
        self.tasks = tasks;
        self.order = Some(merged.clone());
        merged
    }

    /// Reconciles against `seed`, discarding whatever order is held now. Used
    /// once the stored order becomes readable after a failed first read.
    pub fn reseed(&mut self, tasks: Vec<Task>, seed: OrderSequence) -> OrderSequence {
        self.order = None;
        self.apply_tasks(tasks, Some(seed))
    }

    /// Applies a drag reorder. Returns the new order when something moved.
    pub fn reorder(&mut self, active: TaskId, over: Option<TaskId>) -> Option<OrderSequence> {
        let next = reorder(self.order.as_deref()?, active, over)?;
        self.order = Some(next.clone());
        Some(next)
    }

    pub fn view(&self) -> Option<OrderedView> {
        self.order
            .as_ref()
            .map(|order| ordered_view(order, &self.tasks))
    }
}
