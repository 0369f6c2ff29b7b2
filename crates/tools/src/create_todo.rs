//! `create_todo`: add a todo for the current user.

use async_trait::async_trait;
use serde_json::{Map, Value};
use todoclaw_client::{NewTodo, TodoClient};
use todoclaw_core::tool::{ToolFailure, ToolName};

use crate::dates::normalize_due_date;
use crate::registry::{TodoTool, opt_str, service_failure};

pub struct CreateTodoTool;

#[async_trait]
impl TodoTool for CreateTodoTool {
    fn name(&self) -> ToolName {
        ToolName::CreateTodo
    }

    async fn execute(&self, client: &TodoClient, args: &Map<String, Value>) -> Result<Value, ToolFailure> {
        let name = opt_str(args, "name").ok_or_else(|| ToolFailure::invalid_argument("name", "missing required argument 'name'"))?;
        let due_date = opt_str(args, "due_date").as_deref().map(normalize_due_date).transpose()?;

        let todo = NewTodo {
            name,
            description: opt_str(args, "description"),
            due_date,
        };
        let created = client.create_todo(&todo).await.map_err(service_failure)?;
        tracing::info!(todo_id = ?created.get("id"), "Created todo");
        Ok(created)
    }
}
