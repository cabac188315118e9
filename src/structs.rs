use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub pwd_hash: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub job_title: Option<String>,
    pub phone: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Done,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Scheduled,
    InProgress,
    Completed,
    Overdue,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

/// Display metadata shared by every status enum. `color` is used as a CSS
/// class suffix (`status-<color>`).
pub trait StatusView: Copy + 'static {
    fn all() -> &'static [Self];
    fn as_str(&self) -> &'static str;
    fn label(&self) -> &'static str;
    fn color(&self) -> &'static str;

    fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|v| v.as_str() == s)
    }
}

impl StatusView for ProjectStatus {
    fn all() -> &'static [Self] {
        &[
            ProjectStatus::Planning,
            ProjectStatus::Active,
            ProjectStatus::OnHold,
            ProjectStatus::Completed,
            ProjectStatus::Cancelled,
        ]
    }

    fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "Planning",
            ProjectStatus::Active => "Active",
            ProjectStatus::OnHold => "On hold",
            ProjectStatus::Completed => "Completed",
            ProjectStatus::Cancelled => "Cancelled",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "blue",
            ProjectStatus::Active => "green",
            ProjectStatus::OnHold => "yellow",
            ProjectStatus::Completed => "gray",
            ProjectStatus::Cancelled => "red",
        }
    }
}

impl StatusView for ContractStatus {
    fn all() -> &'static [Self] {
        &[
            ContractStatus::Draft,
            ContractStatus::Active,
            ContractStatus::Completed,
            ContractStatus::Cancelled,
        ]
    }

    fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Cancelled => "cancelled",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "Draft",
            ContractStatus::Active => "Active",
            ContractStatus::Completed => "Completed",
            ContractStatus::Cancelled => "Cancelled",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "gray",
            ContractStatus::Active => "green",
            ContractStatus::Completed => "blue",
            ContractStatus::Cancelled => "red",
        }
    }
}

impl StatusView for TaskStatus {
    fn all() -> &'static [Self] {
        &[
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Done,
        ]
    }

    fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "To do",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::Done => "Done",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "gray",
            TaskStatus::InProgress => "blue",
            TaskStatus::Blocked => "red",
            TaskStatus::Done => "green",
        }
    }
}

impl StatusView for ServiceStatus {
    fn all() -> &'static [Self] {
        &[
            ServiceStatus::Scheduled,
            ServiceStatus::InProgress,
            ServiceStatus::Completed,
            ServiceStatus::Overdue,
        ]
    }

    fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Scheduled => "scheduled",
            ServiceStatus::InProgress => "in_progress",
            ServiceStatus::Completed => "completed",
            ServiceStatus::Overdue => "overdue",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ServiceStatus::Scheduled => "Scheduled",
            ServiceStatus::InProgress => "In progress",
            ServiceStatus::Completed => "Completed",
            ServiceStatus::Overdue => "Overdue",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            ServiceStatus::Scheduled => "blue",
            ServiceStatus::InProgress => "yellow",
            ServiceStatus::Completed => "green",
            ServiceStatus::Overdue => "red",
        }
    }
}

/// `{value, label, color}` triple handed to templates for status badges and
/// `<select>` options.
#[derive(Serialize, Debug, Clone)]
pub struct StatusOption {
    pub value: &'static str,
    pub label: &'static str,
    pub color: &'static str,
}

impl StatusOption {
    pub fn of<S: StatusView>(s: S) -> Self {
        StatusOption {
            value: s.as_str(),
            label: s.label(),
            color: s.color(),
        }
    }

    pub fn list<S: StatusView>() -> Vec<Self> {
        S::all().iter().copied().map(StatusOption::of).collect()
    }
}

/// Resolves a stored status value for the given entity kind
/// (`project`, `contract`, `task`, `service`).
pub fn status_option(kind: &str, value: &str) -> Option<StatusOption> {
    match kind {
        "project" => ProjectStatus::parse(value).map(StatusOption::of),
        "contract" => ContractStatus::parse(value).map(StatusOption::of),
        "task" => TaskStatus::parse(value).map(StatusOption::of),
        "service" => ServiceStatus::parse(value).map(StatusOption::of),
        _ => None,
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Project {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

/// Member row joined with the user's email and profile name.
#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct ProjectMember {
    pub id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub role: MemberRole,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Contract {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub client_name: Option<String>,
    pub value_cents: Option<i64>,
    pub status: ContractStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub contract_id: Option<i64>,
    pub assignee_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Service {
    pub id: i64,
    pub owner_id: i64,
    pub project_id: Option<i64>,
    pub vehicle_id: Option<i64>,
    pub title: String,
    pub notes: Option<String>,
    pub status: ServiceStatus,
    pub scheduled_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Attachment {
    pub id: i64,
    pub project_id: i64,
    pub task_id: Option<i64>,
    pub uploaded_by: i64,
    pub bucket: String,
    pub store_key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Vehicle {
    pub id: i64,
    pub owner_id: i64,
    pub project_id: Option<i64>,
    pub name: String,
    pub chassis_length_mm: i64,
    pub body_offset_mm: i64,
    pub body_length_mm: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Axle {
    pub id: i64,
    pub vehicle_id: i64,
    pub position_mm: i64,
    pub created_at: String,
}

/// Validated project form values.
#[derive(Debug, Clone)]
pub struct ProjectInput {
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct ContractInput {
    pub title: String,
    pub client_name: Option<String>,
    pub value_cents: Option<i64>,
    pub status: ContractStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct TaskInput {
    pub project_id: i64,
    pub contract_id: Option<i64>,
    pub assignee_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct ServiceInput {
    pub project_id: Option<i64>,
    pub vehicle_id: Option<i64>,
    pub title: String,
    pub notes: Option<String>,
    pub status: ServiceStatus,
    pub scheduled_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct VehicleInput {
    pub project_id: Option<i64>,
    pub name: String,
    pub chassis_length_mm: i64,
    pub body_offset_mm: i64,
    pub body_length_mm: i64,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub project_id: i64,
    pub task_id: Option<i64>,
    pub uploaded_by: i64,
    pub bucket: String,
    pub store_key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub project_id: Option<i64>,
    pub assignee_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub status: Option<ServiceStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Row count per stored status value, for the dashboard.
#[derive(Serialize, Debug, Clone, FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_colors() {
        assert_eq!(ProjectStatus::Active.color(), "green");
        assert_eq!(ProjectStatus::Cancelled.color(), "red");
        assert_eq!(TaskStatus::Blocked.color(), "red");
        assert_eq!(ServiceStatus::Overdue.color(), "red");
        assert_eq!(ContractStatus::Draft.color(), "gray");
    }

    #[test]
    fn parse_matches_storage_name() {
        assert_eq!(ProjectStatus::parse("on_hold"), Some(ProjectStatus::OnHold));
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("In progress"), None);
        assert_eq!(ServiceStatus::parse(""), None);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ProjectStatus::OnHold).unwrap();
        assert_eq!(json, "\"on_hold\"");
        let back: TaskStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(back, TaskStatus::InProgress);
    }

    #[test]
    fn status_option_depends_on_kind() {
        let project = status_option("project", "completed").unwrap();
        let service = status_option("service", "completed").unwrap();
        assert_eq!(project.color, "gray");
        assert_eq!(service.color, "green");
        assert!(status_option("vehicle", "completed").is_none());
    }

    #[test]
    fn status_option_list_covers_all() {
        let options = StatusOption::list::<ContractStatus>();
        assert_eq!(options.len(), 4);
        assert_eq!(options[1].value, "active");
        assert_eq!(options[1].label, "Active");
    }
}
