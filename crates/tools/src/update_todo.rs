//! `update_todo`: change any subset of name, description, due date and
//! completion state.

use async_trait::async_trait;
use serde_json::{Map, Value};
use todoclaw_client::{TodoClient, TodoPatch};
use todoclaw_core::tool::{ToolFailure, ToolName};

use crate::dates::normalize_due_date;
use crate::registry::{TodoTool, opt_str, service_failure, todo_id};

pub struct UpdateTodoTool;

#[async_trait]
impl TodoTool for UpdateTodoTool {
    fn name(&self) -> ToolName {
        ToolName::UpdateTodo
    }

    async fn execute(&self, client: &TodoClient, args: &Map<String, Value>) -> Result<Value, ToolFailure> {
        let id = todo_id(args)?;
        let patch = TodoPatch {
            name: opt_str(args, "name"),
            description: opt_str(args, "description"),
            due_date: opt_str(args, "due_date").as_deref().map(normalize_due_date).transpose()?,
            is_completed: args.get("is_completed").and_then(Value::as_bool),
        };
        let updated = client.update_todo(id, &patch).await.map_err(service_failure)?;
        tracing::info!(todo_id = id, "Updated todo");
        Ok(updated)
    }
}
