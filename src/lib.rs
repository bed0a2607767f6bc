//! userbase - user records over HTTP with unique account ids
//!
//! Layers, bottom up:
//! - [`record`]: entity types and input validation
//! - [`store`]: transactional record storage (SQLite or in-memory)
//! - [`coordinator`]: the create/update/delete protocols
//! - [`http_server`]: JSON API
//! - [`cli`]: `init`, `serve`, `check-config`

pub mod cancel;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod http_server;
pub mod observability;
pub mod record;
pub mod store;
