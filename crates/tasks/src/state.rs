//! Task state snapshot and change events.

use railpilot_core::{Task, TaskId, TaskLogEntry, TaskStatus};

/// Point-in-time copy of the task manager's state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskState {
    /// Task list, newest local creations first
    pub tasks: Vec<Task>,

    /// Task shown in detail, fetched separately from the list
    pub detail: Option<Task>,

    /// Log entries of the last task whose logs were fetched
    pub logs: Vec<TaskLogEntry>,

    /// Total reported by the last successful list
    pub total: u64,

    /// A list fetch was running when the snapshot was taken
    pub loading: bool,
}

impl TaskState {
    /// Task in the list with this id.
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub(crate) fn set_status(&mut self, id: TaskId, status: TaskStatus) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => {
                task.status = status;
                true
            }
            None => false,
        }
    }

    pub(crate) fn replace(&mut self, updated: Task) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == updated.id) {
            Some(task) => {
                *task = updated;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        self.tasks.len() != before
    }
}

/// Change notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A list fetch started or finished
    Loading(bool),
    /// The list was replaced by a fetch
    ListReplaced {
        /// Service-side total
        total: u64,
    },
    /// A task was created and put at the front
    Created(TaskId),
    /// A task's definition changed
    Updated(TaskId),
    /// A lifecycle action was confirmed
    StatusChanged {
        /// Task affected
        task_id: TaskId,
        /// Status now shown in the list
        status: TaskStatus,
    },
    /// A task was deleted
    Removed(TaskId),
    /// The detail view was refreshed
    DetailChanged(TaskId),
    /// Logs were replaced
    LogsReplaced(TaskId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: i64, status: TaskStatus) -> Task {
        serde_json::from_value(serde_json::json!({"id": id, "status": status})).unwrap()
    }

    #[test]
    fn test_edits_ignore_unknown_ids() {
        let mut state = TaskState { tasks: vec![task(1, TaskStatus::Pending)], ..TaskState::default() };
        assert!(!state.set_status(TaskId::new(2), TaskStatus::Running));
        assert!(!state.replace(task(2, TaskStatus::Running)));
        assert!(!state.remove(TaskId::new(2)));
        assert_eq!(state.tasks.len(), 1);

        assert!(state.set_status(TaskId::new(1), TaskStatus::Running));
        assert_eq!(state.task(TaskId::new(1)).map(|t| t.status), Some(TaskStatus::Running));
        assert!(state.remove(TaskId::new(1)));
        assert!(state.tasks.is_empty());
    }
}
