//! Core types shared by the client and its callers.
//!
//! - [`Request`] describes one call: path, method, body, query, accepted
//!   statuses and the operation name used in diagnostics.
//! - [`Task`] and [`TaskInfo`] model the server's asynchronous tasks.

mod request;
mod task;

pub use request::{Request, RequestBody, SerializeBody, CONTENT_TYPE_JSON};
pub use task::{Task, TaskInfo, TaskStatus};
