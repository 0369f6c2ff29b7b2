//! The TodoClaw tool process.
//!
//! One process per orchestration run. It reads its credential from the
//! environment once, answers the handshake with the six tool definitions,
//! then serves `call` frames one at a time: validate against the shared
//! tool table, make a single round trip to the todo service, reply with the
//! record or a failure descriptor.

pub mod create_todo;
pub mod dates;
pub mod delete_todo;
pub mod get_todo;
pub mod list_todos;
pub mod registry;
pub mod server;
pub mod toggle_todo_complete;
pub mod update_todo;

pub use registry::{TodoTool, ToolRegistry};
pub use server::{ToolServer, credentials_from_env};

/// Create a registry holding all six tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(create_todo::CreateTodoTool));
    registry.register(Box::new(list_todos::ListTodosTool));
    registry.register(Box::new(get_todo::GetTodoTool));
    registry.register(Box::new(update_todo::UpdateTodoTool));
    registry.register(Box::new(delete_todo::DeleteTodoTool));
    registry.register(Box::new(toggle_todo_complete::ToggleTodoCompleteTool));
    registry
}
