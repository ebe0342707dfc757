//! Custode kernel library
//!
//! Capability dispatch, permission-gated menus and session tokens for a
//! plugin host. The `custode` binary wires these into an HTTP server.

pub mod cache;
pub mod capability;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod menu;
pub mod middleware;
pub mod permissions;
pub mod routes;
pub mod state;
pub mod token;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::{AppState, StateParts};
