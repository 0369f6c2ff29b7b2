//! `list_todos`: search and sort the current user's todos.

use async_trait::async_trait;
use serde_json::{Map, Value};
use todoclaw_client::{ListQuery, TodoClient};
use todoclaw_core::tool::{ToolFailure, ToolName};

use crate::registry::{TodoTool, opt_str, service_failure};

pub struct ListTodosTool;

#[async_trait]
impl TodoTool for ListTodosTool {
    fn name(&self) -> ToolName {
        ToolName::ListTodos
    }

    async fn execute(&self, client: &TodoClient, args: &Map<String, Value>) -> Result<Value, ToolFailure> {
        let query = ListQuery {
            search: opt_str(args, "search").filter(|s| !s.trim().is_empty()),
            sort_by: opt_str(args, "sort_by"),
            sort_order: opt_str(args, "sort_order"),
            ..ListQuery::default()
        };
        client.list_todos(&query).await.map_err(service_failure)
    }
}
