//! `toggle_todo_complete`: flip the completion state of one todo.

use async_trait::async_trait;
use serde_json::{Map, Value};
use todoclaw_client::TodoClient;
use todoclaw_core::tool::{ToolFailure, ToolName};

use crate::registry::{TodoTool, service_failure, todo_id};

pub struct ToggleTodoCompleteTool;

#[async_trait]
impl TodoTool for ToggleTodoCompleteTool {
    fn name(&self) -> ToolName {
        ToolName::ToggleTodoComplete
    }

    async fn execute(&self, client: &TodoClient, args: &Map<String, Value>) -> Result<Value, ToolFailure> {
        client.toggle_complete(todo_id(args)?).await.map_err(service_failure)
    }
}
