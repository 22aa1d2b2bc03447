//! HTTP surface: admission middleware, the routes it guards, and the server.

mod middleware;
mod server;
pub mod todos;

pub use middleware::{admit, Admission};
pub use server::{router, HttpServer};
pub use todos::TodoStore;
