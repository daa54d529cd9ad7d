//! Gateway: authenticated HTTP front for the shared WhatsApp session.
//!
//! Lifecycle:
//! 1. Validate config (auth token, bind address)
//! 2. Ensure the session store exists
//! 3. Start the session in the background
//! 4. Serve `/send-group`, `/groups`, `/find-group` and `/status` behind the
//!    bearer-token gate until a shutdown signal arrives

pub mod auth;
pub mod auth_middleware;
pub mod error;
pub mod groups;
pub mod routes;
pub mod server;
pub mod state;

pub use {
    auth::ResolvedAuth,
    server::{build_gateway_app, start_gateway},
    state::AppState,
};
