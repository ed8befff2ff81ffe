//! session-guard library
//!
//! Single-session authentication: one live bearer per account, enforced by a
//! server-side session token and a client-side monitor that asks the server
//! whether its bearer is still the current one.

pub mod auth;
pub mod client;
pub mod config;
pub mod middleware;
pub mod server;
