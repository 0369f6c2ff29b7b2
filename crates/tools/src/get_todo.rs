//! `get_todo`: fetch one todo by id.

use async_trait::async_trait;
use serde_json::{Map, Value};
use todoclaw_client::TodoClient;
use todoclaw_core::tool::{ToolFailure, ToolName};

use crate::registry::{TodoTool, service_failure, todo_id};

pub struct GetTodoTool;

#[async_trait]
impl TodoTool for GetTodoTool {
    fn name(&self) -> ToolName {
        ToolName::GetTodo
    }

    async fn execute(&self, client: &TodoClient, args: &Map<String, Value>) -> Result<Value, ToolFailure> {
        client.get_todo(todo_id(args)?).await.map_err(service_failure)
    }
}
