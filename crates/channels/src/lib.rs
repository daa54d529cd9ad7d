//! Chat engine capability interface.
//!
//! The browser-driven automation engine (login flow, transport, message
//! encoding) lives outside this workspace. Everything the gateway needs from
//! it is the [`ChatEngine`] trait plus the lifecycle events the engine pushes
//! back through [`SessionEvent`].

pub mod engine;

pub use engine::{ChatEngine, ChatId, ChatRecord, EngineError, SessionEvent};
