use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::gateway::Transport;
use crate::models::TaskId;
use crate::mutations::{normalize_text, Mutations, Outcome};

struct DoubleConfirm {
    last: Option<i64>,
    window_ms: i64,
}

impl DoubleConfirm {
    fn new(window_ms: u64) -> Self {
        Self {
            last: None,
            window_ms: i64::try_from(window_ms).unwrap_or(i64::MAX),
        }
    }

    /// Records a confirm at `now`; `true` when it follows the previous one
    /// within the window. The timestamp moves on every confirm.
    fn hit(&mut self, now: i64) -> bool {
        let hit = self
            .last
            .is_some_and(|last| now.saturating_sub(last) <= self.window_ms);
        self.last = Some(now);
        hit
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

/// The quick-add line.
pub struct QuickInput {
    text: String,
    confirm: DoubleConfirm,
    clock: Arc<dyn Clock>,
}

impl QuickInput {
    pub fn new(window_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            text: String::new(),
            confirm: DoubleConfirm::new(window_ms),
            clock,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn input(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Handles the confirm key. Returns the text to create when this confirm
    /// completes a double-confirm and the line is not blank.
    pub fn confirm(&mut self) -> Option<String> {
        if self.confirm.hit(self.clock.now_millis()) {
            self.submit()
        } else {
            self.text.push('\n');
            None
        }
    }

    /// Takes the trimmed text for submission. The buffer is only cleared when
    /// something was handed off.
    pub fn submit(&mut self) -> Option<String> {
        let text = normalize_text(&self.text)?.to_string();
        self.text.clear();
        Some(text)
    }

    pub fn cancel(&mut self) {
        self.text.clear();
        self.confirm.reset();
    }

    /// [`confirm`](Self::confirm) followed by a create. `None` when nothing
    /// was submitted.
    pub async fn confirm_create<T: Transport>(
        &mut self,
        mutations: &Mutations<T>,
    ) -> Option<Outcome> {
        let text = self.confirm()?;
        Some(mutations.create(&text).await)
    }

    pub async fn submit_create<T: Transport>(
        &mut self,
        mutations: &Mutations<T>,
    ) -> Option<Outcome> {
        let text = self.submit()?;
        Some(mutations.create(&text).await)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditState {
    Idle,
    Editing { text: String, generation: u64 },
}

/// An edit ready to be sent. Carries the generation it was taken from so a
/// late result can be matched against the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub id: TaskId,
    pub text: String,
    pub generation: u64,
}

struct Row {
    text: String,
    generation: u64,
    confirm: DoubleConfirm,
}

/// Per-row edit state. Rows not present are idle.
pub struct EditingRows {
    rows: HashMap<TaskId, Row>,
    next_generation: u64,
    window_ms: u64,
    clock: Arc<dyn Clock>,
}

impl EditingRows {
    pub fn new(window_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: HashMap::new(),
            next_generation: 0,
            window_ms,
            clock,
        }
    }

    pub fn state(&self, id: TaskId) -> EditState {
        match self.rows.get(&id) {
            Some(row) => EditState::Editing {
                text: row.text.clone(),
                generation: row.generation,
            },
            None => EditState::Idle,
        }
    }

    pub fn is_editing(&self, id: TaskId) -> bool {
        self.rows.contains_key(&id)
    }

    /// Enters edit mode with `initial` as the buffer. A row already being
    /// edited keeps its buffer. Returns the row's generation.
    pub fn begin_edit(&mut self, id: TaskId, initial: &str) -> u64 {
        if let Some(row) = self.rows.get(&id) {
            return row.generation;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.rows.insert(
            id,
            Row {
                text: initial.to_string(),
                generation,
                confirm: DoubleConfirm::new(self.window_ms),
            },
        );
        log::debug!("begin edit task={id} generation={generation}");
        generation
    }

    pub fn input(&mut self, id: TaskId, text: impl Into<String>) -> bool {
        match self.rows.get_mut(&id) {
            Some(row) => {
                row.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Leaves edit mode without sending anything.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.rows.remove(&id).is_some()
    }

    /// Handles the confirm key on a row.
    pub fn confirm(&mut self, id: TaskId) -> Option<PendingEdit> {
        let now = self.clock.now_millis();
        let row = self.rows.get_mut(&id)?;
        if row.confirm.hit(now) {
            self.pending(id)
        } else {
            row.text.push('\n');
            None
        }
    }

    /// The row's edit, if it is editing and not blank.
    pub fn pending(&self, id: TaskId) -> Option<PendingEdit> {
        let row = self.rows.get(&id)?;
        let text = normalize_text(&row.text)?;
        Some(PendingEdit {
            id,
            text: text.to_string(),
            generation: row.generation,
        })
    }

    /// Applies the result of sending `edit`. The row goes idle only on
    /// success and only if it is still on the generation the edit came from.
    pub fn resolve(&mut self, edit: &PendingEdit, outcome: Outcome) -> bool {
        if !outcome.is_applied() {
            return false;
        }
        match self.rows.get(&edit.id) {
            Some(row) if row.generation == edit.generation => {
                self.rows.remove(&edit.id);
                true
            }
            _ => {
                log::debug!(
                    "edit of task {} resolved for a stale generation {}",
                    edit.id,
                    edit.generation
                );
                false
            }
        }
    }

    /// Sends the row's current text. Blank text sends nothing.
    pub async fn submit<T: Transport>(&mut self, id: TaskId, mutations: &Mutations<T>) -> Outcome {
        let Some(edit) = self.pending(id) else {
            return Outcome::Skipped;
        };
        self.send(edit, mutations).await
    }

    /// [`confirm`](Self::confirm) followed by the edit call.
    pub async fn confirm_submit<T: Transport>(
        &mut self,
        id: TaskId,
        mutations: &Mutations<T>,
    ) -> Option<Outcome> {
        let edit = self.confirm(id)?;
        Some(self.send(edit, mutations).await)
    }

    async fn send<T: Transport>(&mut self, edit: PendingEdit, mutations: &Mutations<T>) -> Outcome {
        let outcome = mutations.edit(edit.id, &edit.text).await;
        self.resolve(&edit, outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::{CMD_EDIT_TASK, CMD_PUT_TASK};
    use crate::testing::{make_tasks, MockTransport, Rig};

    const WINDOW: u64 = 200;

    fn quick(clock: &ManualClock) -> QuickInput {
        QuickInput::new(WINDOW, Arc::new(clock.clone()))
    }

    #[test]
    fn double_confirm_within_window_submits_once() {
        let clock = ManualClock::new(10_000);
        let mut line = quick(&clock);
        line.input("milk");

        assert_eq!(line.confirm(), None);
        clock.advance(150);
        assert_eq!(line.confirm(), Some("milk".to_string()));
        assert_eq!(line.text(), "");
    }

    #[test]
    fn confirms_far_apart_never_submit() {
        let clock = ManualClock::new(10_000);
        let mut line = quick(&clock);
        line.input("milk");

        assert_eq!(line.confirm(), None);
        clock.advance(500);
        assert_eq!(line.confirm(), None);
        assert_eq!(line.text(), "milk\n\n");
    }

    #[test]
    fn window_is_inclusive_and_slides() {
        let clock = ManualClock::new(0);
        let mut line = quick(&clock);
        line.input("a");
        line.confirm();
        clock.advance(300);
        // Too late for the first, but it restarts the window.
        assert_eq!(line.confirm(), None);
        clock.advance(200);
        assert_eq!(line.confirm(), Some("a".to_string()));
    }

    #[test]
    fn blank_submit_keeps_the_buffer() {
        let clock = ManualClock::new(0);
        let mut line = quick(&clock);
        line.input("   ");
        assert_eq!(line.submit(), None);
        assert_eq!(line.text(), "   ");

        line.confirm();
        clock.advance(100);
        assert_eq!(line.confirm(), None);
    }

    #[test]
    fn cancel_clears_text_and_pending_confirm() {
        let clock = ManualClock::new(0);
        let mut line = quick(&clock);
        line.input("x");
        line.confirm();
        line.cancel();
        line.input("y");
        clock.advance(50);
        assert_eq!(line.confirm(), None);
    }

    #[test]
    fn row_lifecycle() {
        let clock = ManualClock::new(0);
        let mut rows = EditingRows::new(WINDOW, Arc::new(clock.clone()));
        assert_eq!(rows.state(1), EditState::Idle);
        assert!(!rows.input(1, "ignored"));

        let generation = rows.begin_edit(1, "old");
        assert_eq!(rows.begin_edit(1, "other"), generation);
        assert!(rows.input(1, "new"));
        assert_eq!(
            rows.state(1),
            EditState::Editing {
                text: "new".to_string(),
                generation
            }
        );
        assert!(rows.cancel(1));
        assert!(!rows.is_editing(1));
    }

    #[test]
    fn stale_result_does_not_close_a_newer_edit() {
        let clock = ManualClock::new(0);
        let mut rows = EditingRows::new(WINDOW, Arc::new(clock.clone()));
        rows.begin_edit(7, "first");
        let edit = rows.pending(7).unwrap();

        rows.cancel(7);
        let newer = rows.begin_edit(7, "second");
        assert_ne!(newer, edit.generation);

        assert!(!rows.resolve(&edit, Outcome::Applied));
        assert!(rows.is_editing(7));

        let current = rows.pending(7).unwrap();
        assert!(!rows.resolve(&current, Outcome::Failed));
        assert!(rows.is_editing(7));
        assert!(rows.resolve(&current, Outcome::Applied));
        assert!(!rows.is_editing(7));
    }

    #[tokio::test(start_paused = true)]
    async fn quick_add_creates_on_double_confirm() {
        let rig = Rig::start(MockTransport::with_tasks(make_tasks(&[1]))).await;
        let clock = ManualClock::new(0);
        let mut line = quick(&clock);

        line.input("   ");
        assert_eq!(line.confirm_create(&rig.mutations).await, None);
        clock.advance(150);
        assert_eq!(line.confirm_create(&rig.mutations).await, None);
        assert_eq!(rig.transport.count(CMD_PUT_TASK), 0);

        line.input("call mom");
        clock.advance(1_000);
        assert_eq!(line.confirm_create(&rig.mutations).await, None);
        clock.advance(150);
        assert_eq!(
            line.confirm_create(&rig.mutations).await,
            Some(Outcome::Applied)
        );
        assert_eq!(rig.transport.count(CMD_PUT_TASK), 1);
        assert_eq!(rig.view_ids().await, vec![2, 1]);
        rig.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn row_goes_idle_only_after_a_successful_edit() {
        let rig = Rig::start(MockTransport::with_tasks(make_tasks(&[1]))).await;
        let clock = ManualClock::new(0);
        let mut rows = EditingRows::new(WINDOW, Arc::new(clock.clone()));

        rows.begin_edit(1, "task-1");
        rows.input(1, "   ");
        assert_eq!(rows.submit(1, &rig.mutations).await, Outcome::Skipped);
        assert!(rows.is_editing(1));
        assert_eq!(rig.transport.count(CMD_EDIT_TASK), 0);

        rows.input(1, "renamed");
        rig.transport.fail_command(CMD_EDIT_TASK, "locked");
        assert_eq!(rows.submit(1, &rig.mutations).await, Outcome::Failed);
        assert!(rows.is_editing(1));

        rig.transport.clear_failure(CMD_EDIT_TASK);
        assert_eq!(rows.confirm_submit(1, &rig.mutations).await, None);
        clock.advance(100);
        assert_eq!(
            rows.confirm_submit(1, &rig.mutations).await,
            Some(Outcome::Applied)
        );
        assert!(!rows.is_editing(1));
        assert_eq!(rig.transport.tasks()[0].text, "renamed");
        rig.stop().await;
    }
}
