//! WhatsApp session ownership.
//!
//! - [`store`]: on-disk precondition for the engine's credential directory
//! - [`state`]: the closed lifecycle transition table
//! - [`session`]: the single shared session, its event pump and readiness-gated calls
//! - [`bridge`]: engine implementation that drives a browser automation process over stdio
//! - [`qr`]: terminal rendering of login challenges

pub mod bridge;
pub mod qr;
pub mod session;
pub mod state;
pub mod store;

pub use {
    bridge::{BridgeConfig, BridgeEngine},
    session::{SessionError, SessionOptions, SessionStatus, WhatsAppSession},
    state::{InvalidTransition, SessionState},
    store::{StoreError, ensure_session_store, session_dir},
};
