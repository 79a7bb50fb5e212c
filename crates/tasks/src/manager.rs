//! Task lifecycle manager.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use railpilot_core::{
    AccountId, LogQuery, Synced, Task, TaskDraft, TaskFilter, TaskId, TaskLogEntry, TaskPatch,
    TaskStatus,
};
use railpilot_gateway::{call, call_data, Ack, Action, Gateway, LogPage, Result, TaskPage};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::locks::KeyedLocks;
use crate::state::{TaskEvent, TaskState};

/// Lifecycle action confirmed by an acknowledgment.
#[derive(Debug, Clone, Copy)]
enum Transition {
    Start,
    Stop,
    Cancel,
}

impl Transition {
    fn action(self, task_id: TaskId) -> Action {
        match self {
            Transition::Start => Action::StartTask { task_id },
            Transition::Stop => Action::StopTask { task_id },
            Transition::Cancel => Action::CancelTask { task_id },
        }
    }

    fn target(self) -> TaskStatus {
        match self {
            Transition::Start => TaskStatus::Running,
            Transition::Stop => TaskStatus::Paused,
            Transition::Cancel => TaskStatus::Cancelled,
        }
    }
}

/// Counts one list fetch as in flight until dropped, including when the
/// fetching future is cancelled.
struct InFlight<'a> {
    manager: &'a TaskLifecycleManager,
}

impl<'a> InFlight<'a> {
    fn enter(manager: &'a TaskLifecycleManager) -> Self {
        manager.in_flight.fetch_add(1, Ordering::SeqCst);
        manager.emit(TaskEvent::Loading(true));
        Self { manager }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.manager.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.manager.emit(TaskEvent::Loading(false));
        }
    }
}

/// Keeps the local task list, detail and logs in step with the service.
///
/// Mutations are applied locally only after the service confirms them.
/// The list and the detail view are refreshed through separate paths and
/// never overwrite each other. Lifecycle mutations on one task id run one
/// at a time, in the order they were issued.
pub struct TaskLifecycleManager {
    gateway: Arc<dyn Gateway>,
    state: RwLock<TaskState>,
    events: broadcast::Sender<TaskEvent>,
    locks: KeyedLocks<TaskId>,
    in_flight: AtomicUsize,
}

impl TaskLifecycleManager {
    /// Create a task manager over a gateway.
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            gateway,
            state: RwLock::new(TaskState::default()),
            events,
            locks: KeyedLocks::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Subscribe to state change events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> TaskState {
        let mut snapshot = self.state.read().await.clone();
        snapshot.loading = self.in_flight.load(Ordering::SeqCst) > 0;
        snapshot
    }

    /// Current task list.
    pub async fn tasks(&self) -> Vec<Task> {
        self.state.read().await.tasks.clone()
    }

    /// Task in the detail view.
    pub async fn detail(&self) -> Option<Task> {
        self.state.read().await.detail.clone()
    }

    /// Logs last fetched.
    pub async fn logs(&self) -> Vec<TaskLogEntry> {
        self.state.read().await.logs.clone()
    }

    /// Whether a list fetch is running.
    pub async fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    fn emit(&self, event: TaskEvent) {
        let _ = self.events.send(event);
    }

    /// Fetch tasks matching `filter` and replace the list.
    ///
    /// On failure the previous list is kept and returned stale.
    pub async fn list_tasks(&self, filter: TaskFilter) -> Synced<Vec<Task>> {
        let _loading = InFlight::enter(self);

        let result = call::<TaskPage>(&*self.gateway, Action::ListTasks { filter }).await;

        let mut state = self.state.write().await;
        match result {
            Ok(page) => {
                debug!(count = page.tasks.len(), total = page.total, "task list refreshed");
                state.total = page.total;
                state.tasks = page.tasks;
                let tasks = state.tasks.clone();
                drop(state);
                self.emit(TaskEvent::ListReplaced { total: page.total });
                Synced::fresh(tasks)
            }
            Err(e) => {
                warn!(error = %e, "failed to list tasks");
                Synced::stale(state.tasks.clone(), e.to_string())
            }
        }
    }

    /// Fetch one task into the detail view. The list is not touched.
    pub async fn fetch_task_detail(&self, task_id: TaskId) -> Synced<Option<Task>> {
        match call_data::<Task>(&*self.gateway, Action::GetTask { task_id }).await {
            Ok(task) => {
                self.state.write().await.detail = Some(task.clone());
                self.emit(TaskEvent::DetailChanged(task_id));
                Synced::fresh(Some(task))
            }
            Err(e) => {
                warn!(%task_id, error = %e, "failed to fetch task detail");
                Synced::stale(self.detail().await, e.to_string())
            }
        }
    }

    /// Create a task for `account_id` and put it at the front of the list.
    pub async fn create_task(&self, draft: TaskDraft, account_id: AccountId) -> Result<Task> {
        draft.validate()?;

        let task: Task =
            call_data(&*self.gateway, Action::CreateTask { account_id, draft }).await?;

        info!(task_id = %task.id, %account_id, name = %task.name, "task created");
        self.state.write().await.tasks.insert(0, task.clone());
        self.emit(TaskEvent::Created(task.id));
        Ok(task)
    }

    /// Patch a task and replace its list entry with the service's copy.
    pub async fn update_task(&self, task_id: TaskId, patch: TaskPatch) -> Result<Task> {
        patch.validate()?;
        let _guard = self.locks.lock(&task_id).await;

        let task: Task =
            call_data(&*self.gateway, Action::UpdateTask { task_id, patch }).await?;

        let replaced = self.state.write().await.replace(task.clone());
        debug!(%task_id, replaced, "task updated");
        self.emit(TaskEvent::Updated(task_id));
        Ok(task)
    }

    async fn transition(&self, task_id: TaskId, transition: Transition) -> Result<Ack> {
        let _guard = self.locks.lock(&task_id).await;
        let action = transition.action(task_id);
        let name = action.name();

        let ack: Ack = call(&*self.gateway, action).await?;
        if !ack.success {
            warn!(%task_id, action = name, message = %ack.message, "lifecycle action declined");
            return Ok(ack);
        }

        let status = transition.target();
        if self.state.write().await.set_status(task_id, status) {
            self.emit(TaskEvent::StatusChanged { task_id, status });
        }
        info!(%task_id, %status, "task {} confirmed", name);
        Ok(ack)
    }

    /// Start a task. The list entry becomes running once confirmed.
    pub async fn start_task(&self, task_id: TaskId) -> Result<Ack> {
        self.transition(task_id, Transition::Start).await
    }

    /// Stop a task. The list entry becomes paused once confirmed.
    pub async fn stop_task(&self, task_id: TaskId) -> Result<Ack> {
        self.transition(task_id, Transition::Stop).await
    }

    /// Cancel a task. The list entry becomes cancelled once confirmed.
    pub async fn cancel_task(&self, task_id: TaskId) -> Result<Ack> {
        self.transition(task_id, Transition::Cancel).await
    }

    /// Delete a task. The list entry is removed once confirmed.
    pub async fn delete_task(&self, task_id: TaskId) -> Result<Ack> {
        let _guard = self.locks.lock(&task_id).await;

        let ack: Ack = call(&*self.gateway, Action::DeleteTask { task_id }).await?;
        if !ack.success {
            warn!(%task_id, message = %ack.message, "task deletion declined");
            return Ok(ack);
        }

        if self.state.write().await.remove(task_id) {
            self.emit(TaskEvent::Removed(task_id));
        }
        info!(%task_id, "task deleted");
        Ok(ack)
    }

    /// Fetch a task's logs and replace the held entries.
    ///
    /// On failure the previous entries are kept and returned stale.
    pub async fn fetch_task_logs(&self, task_id: TaskId, query: LogQuery) -> Synced<Vec<TaskLogEntry>> {
        match call::<LogPage>(&*self.gateway, Action::TaskLogs { task_id, query }).await {
            Ok(page) => {
                debug!(%task_id, count = page.logs.len(), "task logs refreshed");
                self.state.write().await.logs = page.logs.clone();
                self.emit(TaskEvent::LogsReplaced(task_id));
                Synced::fresh(page.logs)
            }
            Err(e) => {
                warn!(%task_id, error = %e, "failed to fetch task logs");
                Synced::stale(self.logs().await, e.to_string())
            }
        }
    }
}
