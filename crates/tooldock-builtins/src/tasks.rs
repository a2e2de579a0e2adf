//! SQLite-backed task manager exposed as tools, resources and prompts.
//!
//! The connection sits behind a mutex owned by [`TaskStore`]; handlers reach
//! it through `spawn_blocking` so a slow query never stalls the runtime.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tooldock_core::{ToolDockError, ToolDockResult};
use tooldock_registry::{
    prompt_fn, resource_fn, tool_fn, Arguments, HandlerError, InputSchema, ParamSpec, ParamType,
    PromptDescriptor, Registry, ResourceContent, ResourceDescriptor, ToolDescriptor, UriParams,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Priorities at or above this count as high.
pub const HIGH_PRIORITY: i64 = 4;

const TASK_COLUMNS: &str = "id, title, description, status, priority, created_at, updated_at, \
                            due_date, assignee, tags";

/// Lifecycle state of a task. Stored and sent as snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    Pending,
    /// Being worked on.
    InProgress,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    /// The stored form, e.g. `in_progress`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = TaskStatus::ALL.iter().map(TaskStatus::as_str).collect();
                format!("invalid status '{s}': must be one of {}", valid.join(", "))
            })
    }
}

/// A stored task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Generated UUID.
    pub id: String,
    /// Short summary.
    pub title: String,
    /// Free text.
    pub description: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// 1 (lowest) to 5 (highest).
    pub priority: i64,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 time of the last change.
    pub updated_at: String,
    /// Optional due date, as given.
    pub due_date: Option<String>,
    /// Who the task is assigned to.
    pub assignee: Option<String>,
    /// Free-form labels.
    pub tags: Vec<String>,
}

/// Fields supplied when creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Short summary.
    pub title: String,
    /// Free text.
    pub description: String,
    /// 1 (lowest) to 5 (highest).
    pub priority: i64,
    /// Optional due date.
    pub due_date: Option<String>,
    /// Optional assignee.
    pub assignee: Option<String>,
    /// Free-form labels.
    pub tags: Vec<String>,
}

/// Optional constraints for [`TaskStore::list`]; `None` matches anything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Only tasks in this state.
    pub status: Option<TaskStatus>,
    /// Only tasks with this priority.
    pub priority: Option<i64>,
    /// Only tasks assigned to this person.
    pub assignee: Option<String>,
}

/// Task table in a single SQLite connection.
pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> ToolDockResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| {
            ToolDockError::Config(format!("cannot open task database {}: {e}", path.display()))
        })?;
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn in_memory() -> ToolDockResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ToolDockError::Config(format!("cannot open task database: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> ToolDockResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                due_date TEXT,
                assignee TEXT,
                tags TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);",
        )
        .map_err(|e| ToolDockError::Config(format!("cannot create task table: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new pending task and return it.
    pub fn create(&self, new: NewTask) -> rusqlite::Result<Task> {
        let now = Utc::now().to_rfc3339();
        let task = Task {
            id: format!("task_{}", Uuid::new_v4().simple()),
            title: new.title,
            description: new.description,
            status: TaskStatus::Pending,
            priority: new.priority.clamp(1, 5),
            created_at: now.clone(),
            updated_at: now,
            due_date: new.due_date,
            assignee: new.assignee,
            tags: new.tags,
        };
        let tags = serde_json::to_string(&task.tags)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        self.conn.lock().execute(
            &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                task.id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority,
                task.created_at,
                task.updated_at,
                task.due_date,
                task.assignee,
                tags,
            ],
        )?;
        Ok(task)
    }

    /// Look up a task by id.
    pub fn get(&self, id: &str) -> rusqlite::Result<Option<Task>> {
        self.conn
            .lock()
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )
            .optional()
    }

    /// Change a task's status. Returns the previous status and the updated
    /// task, or `None` if no task has that id.
    pub fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> rusqlite::Result<Option<(TaskStatus, Task)>> {
        let conn = self.conn.lock();
        let Some(mut task) = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )
            .optional()?
        else {
            return Ok(None);
        };

        let previous = task.status;
        task.status = status;
        task.updated_at = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), task.updated_at],
        )?;
        Ok(Some((previous, task)))
    }

    /// Delete a task, returning it if it existed.
    pub fn delete(&self, id: &str) -> rusqlite::Result<Option<Task>> {
        let conn = self.conn.lock();
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )
            .optional()?;
        if task.is_some() {
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        }
        Ok(task)
    }

    /// Tasks matching `filter`, highest priority first, then oldest first.
    pub fn list(&self, filter: &TaskFilter) -> rusqlite::Result<Vec<Task>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR priority = ?2)
               AND (?3 IS NULL OR assignee = ?3)
             ORDER BY priority DESC, rowid ASC"
        ))?;
        let rows = stmt.query_map(
            params![
                filter.status.map(|s| s.as_str()),
                filter.priority,
                filter.assignee,
            ],
            row_to_task,
        )?;
        rows.collect()
    }

    /// Case-insensitive substring match on title, description and tags.
    pub fn search(&self, query: &str) -> rusqlite::Result<Vec<Task>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE lower(title) LIKE ?1 ESCAPE '\\'
                OR lower(description) LIKE ?1 ESCAPE '\\'
                OR lower(tags) LIKE ?1 ESCAPE '\\'
             ORDER BY priority DESC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![pattern], row_to_task)?;
        rows.collect()
    }

    /// Tasks with priority at or above [`HIGH_PRIORITY`].
    pub fn high_priority(&self) -> rusqlite::Result<Vec<Task>> {
        Ok(self
            .list(&TaskFilter::default())?
            .into_iter()
            .filter(|t| t.priority >= HIGH_PRIORITY)
            .collect())
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(3)?;
    let status = status.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let id: String = row.get(0)?;
    let raw_tags: String = row.get(9)?;
    let tags = match serde_json::from_str(&raw_tags) {
        Ok(tags) => tags,
        Err(e) => {
            warn!(task = %id, error = %e, "Stored tags are corrupt, treating as empty");
            Vec::new()
        }
    };
    Ok(Task {
        id,
        title: row.get(1)?,
        description: row.get(2)?,
        status,
        priority: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        due_date: row.get(7)?,
        assignee: row.get(8)?,
        tags,
    })
}

/// Run a store operation on the blocking pool.
async fn blocking<T, F>(store: &Arc<TaskStore>, op: F) -> Result<T, HandlerError>
where
    F: FnOnce(&TaskStore) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(HandlerError::internal)?
        .map_err(HandlerError::internal)
}

fn parse_status(raw: &str) -> Result<TaskStatus, HandlerError> {
    raw.parse().map_err(HandlerError::Tool)
}

fn task_not_found(id: &str) -> HandlerError {
    HandlerError::not_found(format!("task '{id}' not found"))
}

fn count(tasks: &[Task], status: TaskStatus) -> usize {
    tasks.iter().filter(|t| t.status == status).count()
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Register the task tools, the `tasks://` resources and the task prompts.
pub fn register(registry: &mut Registry, store: Arc<TaskStore>) -> ToolDockResult<()> {
    register_tools(registry, &store)?;
    register_resources(registry, &store)?;
    register_prompts(registry, &store)?;
    Ok(())
}

fn register_tools(registry: &mut Registry, store: &Arc<TaskStore>) -> ToolDockResult<()> {
    let s = store.clone();
    registry.register(
        ToolDescriptor::new(
            "create_task",
            "Create a task. Priority ranges from 1 (lowest) to 5 (highest).",
            InputSchema::new()
                .param(ParamSpec::required("title", ParamType::String))
                .param(ParamSpec::required("description", ParamType::String))
                .param(ParamSpec::optional("priority", ParamType::Integer).with_default(json!(3)))
                .param(ParamSpec::optional("due_date", ParamType::String))
                .param(ParamSpec::optional("assignee", ParamType::String))
                .param(ParamSpec::optional("tags", ParamType::Array).with_default(json!([]))),
            tool_fn(move |args: Arguments| {
                let store = s.clone();
                async move {
                    let tags: Vec<String> = args
                        .get("tags")
                        .cloned()
                        .map(serde_json::from_value)
                        .transpose()
                        .map_err(|_| HandlerError::tool("tags must be an array of strings"))?
                        .unwrap_or_default();
                    let new = NewTask {
                        title: args.require_str("title")?.to_string(),
                        description: args.require_str("description")?.to_string(),
                        priority: args.i64("priority").unwrap_or(3),
                        due_date: args.str("due_date").map(str::to_string),
                        assignee: args.str("assignee").map(str::to_string),
                        tags,
                    };
                    let task = blocking(&store, move |s| s.create(new)).await?;
                    info!(task = %task.id, priority = task.priority, "Task created");
                    Ok(json!({
                        "task": task,
                        "message": format!("Task '{}' created with ID {}", task.title, task.id),
                    }))
                }
            }),
        )
        .returns(ParamType::Object),
    )?;

    let s = store.clone();
    registry.register(
        ToolDescriptor::new(
            "update_task_status",
            "Update the status of a task (pending, in_progress, completed)",
            InputSchema::new()
                .param(ParamSpec::required("task_id", ParamType::String))
                .param(ParamSpec::required("new_status", ParamType::String)),
            tool_fn(move |args: Arguments| {
                let store = s.clone();
                async move {
                    let id = args.require_str("task_id")?.to_string();
                    let status = parse_status(args.require_str("new_status")?)?;
                    let lookup = id.clone();
                    let (previous, task) = blocking(&store, move |s| s.set_status(&lookup, status))
                        .await?
                        .ok_or_else(|| task_not_found(&id))?;
                    Ok(json!({
                        "task": task,
                        "message": format!("Task {id} status updated from '{previous}' to '{status}'"),
                    }))
                }
            }),
        )
        .returns(ParamType::Object),
    )?;

    let s = store.clone();
    registry.register(
        ToolDescriptor::new(
            "list_tasks",
            "List tasks, optionally filtered by status, priority or assignee",
            InputSchema::new()
                .param(ParamSpec::optional("status", ParamType::String))
                .param(ParamSpec::optional("priority", ParamType::Integer))
                .param(ParamSpec::optional("assignee", ParamType::String)),
            tool_fn(move |args: Arguments| {
                let store = s.clone();
                async move {
                    let filter = TaskFilter {
                        status: args.str("status").map(parse_status).transpose()?,
                        priority: args.i64("priority"),
                        assignee: args.str("assignee").map(str::to_string),
                    };
                    let applied = json!({
                        "status": filter.status,
                        "priority": filter.priority,
                        "assignee": filter.assignee,
                    });
                    let tasks = blocking(&store, move |s| s.list(&filter)).await?;
                    Ok(json!({
                        "count": tasks.len(),
                        "tasks": tasks,
                        "filters_applied": applied,
                    }))
                }
            }),
        )
        .returns(ParamType::Object),
    )?;

    let s = store.clone();
    registry.register(
        ToolDescriptor::new(
            "delete_task",
            "Delete a task by ID",
            InputSchema::new().param(ParamSpec::required("task_id", ParamType::String)),
            tool_fn(move |args: Arguments| {
                let store = s.clone();
                async move {
                    let id = args.require_str("task_id")?.to_string();
                    let lookup = id.clone();
                    let task = blocking(&store, move |s| s.delete(&lookup))
                        .await?
                        .ok_or_else(|| task_not_found(&id))?;
                    info!(task = %id, "Task deleted");
                    Ok(json!({
                        "deleted": id,
                        "message": format!("Task '{}' (ID: {id}) has been deleted", task.title),
                    }))
                }
            }),
        )
        .returns(ParamType::Object),
    )?;

    let s = store.clone();
    registry.register(
        ToolDescriptor::new(
            "search_tasks",
            "Search tasks by title, description or tag",
            InputSchema::new().param(ParamSpec::required("query", ParamType::String)),
            tool_fn(move |args: Arguments| {
                let store = s.clone();
                async move {
                    let query = args.require_str("query")?.to_string();
                    let needle = query.clone();
                    let tasks = blocking(&store, move |s| s.search(&needle)).await?;
                    Ok(json!({
                        "query": query,
                        "count": tasks.len(),
                        "tasks": tasks,
                    }))
                }
            }),
        )
        .returns(ParamType::Object),
    )?;

    Ok(())
}

fn register_resources(registry: &mut Registry, store: &Arc<TaskStore>) -> ToolDockResult<()> {
    type Query = fn(&TaskStore) -> rusqlite::Result<Vec<Task>>;
    let views: [(&str, &str, &str, &str, Query); 3] = [
        ("tasks://all", "all_tasks", "Every task", "total_tasks", |s| {
            s.list(&TaskFilter::default())
        }),
        ("tasks://pending", "pending_tasks", "Tasks not yet started", "pending_count", |s| {
            s.list(&TaskFilter {
                status: Some(TaskStatus::Pending),
                ..TaskFilter::default()
            })
        }),
        (
            "tasks://high-priority",
            "high_priority_tasks",
            "Tasks with priority 4 or 5",
            "high_priority_count",
            TaskStore::high_priority,
        ),
    ];

    for (uri, name, description, count_key, query) in views {
        let s = store.clone();
        registry.register(
            ResourceDescriptor::new(
                uri,
                name,
                description,
                resource_fn(move |_params: UriParams| {
                    let store = s.clone();
                    async move {
                        let tasks = blocking(&store, query).await?;
                        let body = json!({
                            count_key: tasks.len(),
                            "tasks": tasks,
                            "last_updated": Utc::now().to_rfc3339(),
                        });
                        Ok(ResourceContent::from(serde_json::to_string_pretty(&body)?))
                    }
                }),
            )?
            .with_mime_type("application/json"),
        )?;
    }
    Ok(())
}

fn register_prompts(registry: &mut Registry, store: &Arc<TaskStore>) -> ToolDockResult<()> {
    let s = store.clone();
    registry.register(PromptDescriptor::new(
        "task_summary",
        "Summary of all tasks by status and priority",
        InputSchema::new(),
        prompt_fn(move |_args: Arguments| {
            let store = s.clone();
            async move {
                let tasks = blocking(&store, |s| s.list(&TaskFilter::default())).await?;
                let high = tasks.iter().filter(|t| t.priority >= HIGH_PRIORITY).count();
                Ok(format!(
                    "Task Management Summary:\n\n\
                     Total Tasks: {}\n\
                     - Pending: {}\n\
                     - In Progress: {}\n\
                     - Completed: {}\n\n\
                     High Priority Tasks (4-5): {high}\n\n\
                     Use the available tools to:\n\
                     - create_task: Add new tasks\n\
                     - update_task_status: Change task status\n\
                     - list_tasks: View tasks with filters\n\
                     - search_tasks: Find specific tasks\n\
                     - delete_task: Remove tasks\n",
                    tasks.len(),
                    count(&tasks, TaskStatus::Pending),
                    count(&tasks, TaskStatus::InProgress),
                    count(&tasks, TaskStatus::Completed),
                ))
            }
        }),
    ))?;

    let s = store.clone();
    registry.register(PromptDescriptor::new(
        "daily_standup",
        "Standup report: work in progress, urgent pending work, today's completions",
        InputSchema::new(),
        prompt_fn(move |_args: Arguments| {
            let store = s.clone();
            async move {
                let tasks = blocking(&store, |s| s.list(&TaskFilter::default())).await?;
                let today = Utc::now().date_naive().to_string();
                let section = |lines: Vec<String>, empty: &str| {
                    if lines.is_empty() {
                        format!("- {empty}")
                    } else {
                        lines.join("\n")
                    }
                };

                let in_progress = tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::InProgress)
                    .map(|t| format!("- {} (Priority: {})", t.title, t.priority))
                    .collect();
                let urgent = tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Pending && t.priority >= HIGH_PRIORITY)
                    .map(|t| format!("- {} (Priority: {})", t.title, t.priority))
                    .collect();
                let done_today = tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Completed && t.updated_at.starts_with(&today))
                    .map(|t| format!("- {}", t.title))
                    .collect();
                let active = tasks.len() - count(&tasks, TaskStatus::Completed);

                Ok(format!(
                    "Daily Standup Report - {today}\n\n\
                     In Progress:\n{}\n\n\
                     High Priority Pending:\n{}\n\n\
                     Completed Today:\n{}\n\n\
                     Total Active Tasks: {active}\n",
                    section(in_progress, "No tasks in progress"),
                    section(urgent, "No high priority tasks pending"),
                    section(done_today, "No tasks completed today"),
                ))
            }
        }),
    ))?;

    Ok(())
}
