//! `delete_todo`: remove one todo.

use async_trait::async_trait;
use serde_json::{Map, Value};
use todoclaw_client::TodoClient;
use todoclaw_core::tool::{ToolFailure, ToolName};

use crate::registry::{TodoTool, service_failure, todo_id};

pub struct DeleteTodoTool;

#[async_trait]
impl TodoTool for DeleteTodoTool {
    fn name(&self) -> ToolName {
        ToolName::DeleteTodo
    }

    async fn execute(&self, client: &TodoClient, args: &Map<String, Value>) -> Result<Value, ToolFailure> {
        let id = todo_id(args)?;
        let body = client.delete_todo(id).await.map_err(service_failure)?;
        tracing::info!(todo_id = id, "Deleted todo");
        Ok(body)
    }
}
