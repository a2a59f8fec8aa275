//! Read-only HTTP API
//!
//! - [`handlers`] - Routes and JSON handlers
//! - [`server`] - Server, shared state and middleware

pub mod handlers;
pub mod server;

pub use handlers::{create_router, ApiResponse};
pub use server::{ApiServer, AppState, ServerError};
