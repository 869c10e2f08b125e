//! HTTP API module.
//!
//! This module provides the HTTP server, the response types and the log
//! broadcaster for the retention backend.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, router_with_limit, start_server, MAX_UPLOAD_BYTES};
pub use types::*;
