//! # HTTP Server Module
//!
//! JSON API over the record coordinator.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/users` - List (GET) and create (POST)
//! - `/users/:user_id` - Get, update (PUT) and delete
//! - `/` - Same listing as `GET /users`

pub mod config;
pub mod errors;
pub mod observability_routes;
pub mod server;
pub mod user_routes;

pub use config::HttpServerConfig;
pub use errors::{ApiError, ApiResult, ErrorResponse};
pub use server::{HttpServer, REQUEST_ID_HEADER};
pub use user_routes::UsersState;
