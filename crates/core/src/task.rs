//! Task model - a scheduled ticket query/booking job run by the service.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::id::{AccountId, TaskId};
use crate::Time;

/// A task as reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Owning account
    #[serde(default, rename = "user_id")]
    pub account_id: Option<AccountId>,

    /// Task name
    #[serde(default)]
    pub name: String,

    /// Departure station
    #[serde(default)]
    pub from_station: String,

    /// Arrival station
    #[serde(default)]
    pub to_station: String,

    /// Travel date (YYYY-MM-DD)
    #[serde(default)]
    pub train_date: String,

    /// Comma separated train numbers
    #[serde(default)]
    pub train_codes: Option<String>,

    /// Comma separated train classes (G, D, ...)
    #[serde(default)]
    pub train_types: Option<String>,

    /// Comma separated seat classes in priority order
    #[serde(default)]
    pub seat_types: String,

    /// Departure window, e.g. 08:00-12:00
    #[serde(default)]
    pub start_time_range: Option<String>,

    /// Passenger list as JSON text
    #[serde(default)]
    pub passengers: String,

    /// Seconds between queries
    #[serde(default)]
    pub query_interval: u32,

    /// Retry ceiling, -1 for unlimited
    #[serde(default)]
    pub max_retry_count: i64,

    /// Submit the order automatically when seats are found
    #[serde(default)]
    pub auto_submit: bool,

    /// Current status
    pub status: TaskStatus,

    /// Retries performed so far
    #[serde(default)]
    pub retry_count: i64,

    /// Order number once booked
    #[serde(default)]
    pub order_id: Option<String>,

    /// Last result message
    #[serde(default)]
    pub result_message: Option<String>,

    /// Creation timestamp
    #[serde(default)]
    pub created_at: Option<Time>,

    /// Last update timestamp
    #[serde(default)]
    pub updated_at: Option<Time>,

    /// When the task last started
    #[serde(default)]
    pub started_at: Option<Time>,

    /// When the task finished
    #[serde(default)]
    pub finished_at: Option<Time>,
}

impl Task {
    /// Decode the passenger JSON text.
    pub fn passenger_list(&self) -> Result<Vec<Passenger>, serde_json::Error> {
        if self.passengers.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&self.passengers)
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not started
    Pending,
    /// Querying/booking
    Running,
    /// Stopped by the user, can be restarted
    Paused,
    /// Cancelled by the user
    Cancelled,
    /// Booked successfully
    #[serde(alias = "success")]
    Completed,
    /// Gave up
    Failed,
}

impl TaskStatus {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Name the service uses in query filters.
    pub fn query_value(self) -> &'static str {
        match self {
            TaskStatus::Completed => "success",
            other => other.as_str(),
        }
    }

    /// Whether the service will never move the task again on its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Cancelled | TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "paused" => Ok(TaskStatus::Paused),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            "completed" | "success" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Passenger booked by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passenger {
    /// Full name
    pub passenger_name: String,

    /// Identity document number
    pub passenger_id_no: String,

    /// Document type code ("1" = national ID)
    #[serde(default = "default_code")]
    pub passenger_id_type_code: String,

    /// Passenger type ("1" = adult)
    #[serde(default = "default_code")]
    pub passenger_type: String,

    /// Contact phone
    #[serde(default)]
    pub mobile_no: String,
}

fn default_code() -> String {
    "1".to_string()
}

/// Payload for creating a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Task name
    pub name: String,
    /// Departure station
    pub from_station: String,
    /// Arrival station
    pub to_station: String,
    /// Travel date (YYYY-MM-DD)
    pub train_date: String,
    /// Restrict to these train numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_codes: Option<Vec<String>>,
    /// Restrict to these train classes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_types: Option<Vec<String>>,
    /// Seat classes in priority order
    pub seat_types: Vec<String>,
    /// Departure window, e.g. 08:00-12:00
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_range: Option<String>,
    /// Passengers to book for
    pub passengers: Vec<Passenger>,
    /// Seconds between queries
    #[serde(default = "default_query_interval")]
    pub query_interval: u32,
    /// Retry ceiling, -1 for unlimited
    #[serde(default = "default_max_retry")]
    pub max_retry_count: i64,
    /// Submit automatically
    #[serde(default = "default_auto_submit")]
    pub auto_submit: bool,
}

fn default_query_interval() -> u32 {
    5
}

fn default_max_retry() -> i64 {
    100
}

fn default_auto_submit() -> bool {
    true
}

/// Partial update for a task. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New task name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New departure station
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_station: Option<String>,
    /// New arrival station
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_station: Option<String>,
    /// New travel date (YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_date: Option<String>,
    /// Replacement train number list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_codes: Option<Vec<String>>,
    /// Replacement train class list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_types: Option<Vec<String>>,
    /// Replacement seat classes, in priority order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_types: Option<Vec<String>>,
    /// New departure window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_range: Option<String>,
    /// Replacement passenger list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passengers: Option<Vec<Passenger>>,
    /// New query interval in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_interval: Option<u32>,
    /// New retry ceiling, -1 for unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_count: Option<i64>,
    /// Whether to submit automatically
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_submit: Option<bool>,
}

/// A task payload that fails local checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Name empty or too long
    #[error("task name must be 1-200 characters")]
    Name,

    /// Required text field left blank
    #[error("{0} must not be empty")]
    Blank(&'static str),

    /// Date not in YYYY-MM-DD form
    #[error("train date must look like YYYY-MM-DD, got {0:?}")]
    Date(String),

    /// Time window not in HH:MM-HH:MM form
    #[error("time range must look like HH:MM-HH:MM, got {0:?}")]
    TimeRange(String),

    /// Interval outside 3..=60 seconds
    #[error("query interval must be between 3 and 60 seconds, got {0}")]
    QueryInterval(u32),

    /// Retry ceiling below -1
    #[error("max retry count must be -1 or positive, got {0}")]
    MaxRetry(i64),
}

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"));
static TIME_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):[0-5]\d-([01]\d|2[0-3]):[0-5]\d$").expect("static regex")
});

fn check_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if len == 0 || len > 200 {
        return Err(ValidationError::Name);
    }
    Ok(())
}

fn check_blank(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Blank(field));
    }
    Ok(())
}

fn check_date(date: &str) -> Result<(), ValidationError> {
    if !DATE_RE.is_match(date)
        || chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err()
    {
        return Err(ValidationError::Date(date.to_string()));
    }
    Ok(())
}

fn check_time_range(range: &str) -> Result<(), ValidationError> {
    if !TIME_RANGE_RE.is_match(range) {
        return Err(ValidationError::TimeRange(range.to_string()));
    }
    Ok(())
}

fn check_interval(interval: u32) -> Result<(), ValidationError> {
    if !(3..=60).contains(&interval) {
        return Err(ValidationError::QueryInterval(interval));
    }
    Ok(())
}

fn check_retry(max_retry: i64) -> Result<(), ValidationError> {
    if max_retry < -1 {
        return Err(ValidationError::MaxRetry(max_retry));
    }
    Ok(())
}

impl TaskDraft {
    /// Check the draft before it is sent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_name(&self.name)?;
        check_blank("from_station", &self.from_station)?;
        check_blank("to_station", &self.to_station)?;
        check_date(&self.train_date)?;
        if self.seat_types.is_empty() {
            return Err(ValidationError::Blank("seat_types"));
        }
        if self.passengers.is_empty() {
            return Err(ValidationError::Blank("passengers"));
        }
        if let Some(range) = &self.start_time_range {
            check_time_range(range)?;
        }
        check_interval(self.query_interval)?;
        check_retry(self.max_retry_count)
    }
}

impl TaskPatch {
    /// Check the fields that are present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(station) = &self.from_station {
            check_blank("from_station", station)?;
        }
        if let Some(station) = &self.to_station {
            check_blank("to_station", station)?;
        }
        if let Some(date) = &self.train_date {
            check_date(date)?;
        }
        if let Some(range) = &self.start_time_range {
            check_time_range(range)?;
        }
        if let Some(passengers) = &self.passengers {
            if passengers.is_empty() {
                return Err(ValidationError::Blank("passengers"));
            }
        }
        if let Some(interval) = self.query_interval {
            check_interval(interval)?;
        }
        if let Some(max_retry) = self.max_retry_count {
            check_retry(max_retry)?;
        }
        Ok(())
    }

    /// True when nothing would be sent.
    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }
}

/// One line of a task's execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    /// Entry id
    pub id: i64,

    /// Owning task
    pub task_id: TaskId,

    /// info, warning, error or success
    #[serde(default)]
    pub level: String,

    /// Log text
    pub message: String,

    /// Extra JSON details
    #[serde(default)]
    pub details: Option<String>,

    /// When it was written
    #[serde(default)]
    pub created_at: Option<Time>,
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Only tasks of this account
    pub account_id: Option<AccountId>,

    /// Only tasks in this status
    pub status: Option<TaskStatus>,

    /// Rows to skip
    pub skip: Option<u32>,

    /// Page size
    pub limit: Option<u32>,
}

impl TaskFilter {
    /// Filter for one account's tasks.
    pub fn for_account(account_id: AccountId) -> Self {
        Self { account_id: Some(account_id), ..Default::default() }
    }
}

/// Filter for fetching task logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    /// Only entries of this level
    pub level: Option<String>,

    /// Rows to skip
    pub skip: Option<u32>,

    /// Page size
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> TaskDraft {
        TaskDraft {
            name: "Weekend trip".to_string(),
            from_station: "BJP".to_string(),
            to_station: "SHH".to_string(),
            train_date: "2026-10-01".to_string(),
            train_codes: None,
            train_types: Some(vec!["G".to_string()]),
            seat_types: vec!["O".to_string()],
            start_time_range: Some("08:00-12:00".to_string()),
            passengers: vec![Passenger {
                passenger_name: "Li".to_string(),
                passenger_id_no: "110".to_string(),
                passenger_id_type_code: "1".to_string(),
                passenger_type: "1".to_string(),
                mobile_no: String::new(),
            }],
            query_interval: 5,
            max_retry_count: 100,
            auto_submit: true,
        }
    }

    #[test]
    fn test_status_accepts_service_spelling() {
        let status: TaskStatus = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(status, TaskStatus::Completed);
        let status: TaskStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, TaskStatus::Completed);
        assert_eq!(TaskStatus::Completed.query_value(), "success");
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
    }

    #[test]
    fn test_task_decodes_sparse_payload() {
        let task: Task = serde_json::from_str(r#"{"id":3,"status":"pending"}"#).unwrap();
        assert_eq!(task.id, TaskId::new(3));
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.passenger_list().unwrap().is_empty());
    }

    #[test]
    fn test_task_decodes_service_payload() {
        let raw = r#"{
            "id": 9, "user_id": 2, "name": "n", "from_station": "A", "to_station": "B",
            "train_date": "2026-10-01", "train_codes": "G1,G3", "train_types": null,
            "seat_types": "O,M", "start_time_range": null,
            "passengers": "[{\"passenger_name\":\"Li\",\"passenger_id_no\":\"1\"}]",
            "query_interval": 5, "max_retry_count": -1, "auto_submit": true,
            "status": "success", "retry_count": 4, "order_id": "E123", "result_message": "ok",
            "created_at": "2026-09-01T10:00:00", "updated_at": "2026-09-01T10:05:00.123456",
            "started_at": null, "finished_at": null
        }"#;
        let task: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(task.account_id, Some(AccountId::new(2)));
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.created_at.is_some());
        let passengers = task.passenger_list().unwrap();
        assert_eq!(passengers[0].passenger_type, "1");
    }

    #[test]
    fn test_draft_validation() {
        assert!(draft().validate().is_ok());

        let mut bad = draft();
        bad.query_interval = 2;
        assert_eq!(bad.validate(), Err(ValidationError::QueryInterval(2)));

        let mut bad = draft();
        bad.train_date = "2026-13-01".to_string();
        assert!(matches!(bad.validate(), Err(ValidationError::Date(_))));

        let mut bad = draft();
        bad.passengers.clear();
        assert_eq!(bad.validate(), Err(ValidationError::Blank("passengers")));

        let mut bad = draft();
        bad.start_time_range = Some("8-12".to_string());
        assert!(matches!(bad.validate(), Err(ValidationError::TimeRange(_))));
    }

    #[test]
    fn test_patch_only_sends_present_fields() {
        let patch = TaskPatch { query_interval: Some(10), ..Default::default() };
        assert!(patch.validate().is_ok());
        assert_eq!(serde_json::to_value(&patch).unwrap(), serde_json::json!({"query_interval": 10}));
        assert!(TaskPatch::default().is_empty());

        let bad = TaskPatch { name: Some(String::new()), ..Default::default() };
        assert_eq!(bad.validate(), Err(ValidationError::Name));
    }
}
