//! Data service client for the todo REST API.
//!
//! Every call carries the caller's bearer token. Status codes are mapped to
//! [`ServiceError`] so the tool process can turn them into tool-level
//! failures without looking at HTTP details.

pub mod client;
pub mod error;
pub mod models;

pub use client::TodoClient;
pub use error::ServiceError;
pub use models::{ListQuery, NewTodo, TodoPatch};
