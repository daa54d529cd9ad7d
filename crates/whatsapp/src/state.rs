use std::fmt;

use {groupcast_channels::SessionEvent, serde::Serialize};

/// Lifecycle state of the WhatsApp session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session object created, engine not connected yet.
    #[default]
    Initializing,
    /// A login challenge is waiting to be scanned.
    AwaitingScan,
    Authenticated,
    /// Requests may be served.
    Ready,
    /// Credential exchange failed; needs a new scan.
    AuthFailed,
    /// Transport lost; the engine may recover on its own.
    Disconnected,
}

/// An event that has no edge from the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event '{event}' is not valid in state '{from}'")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub event: &'static str,
}

impl SessionState {
    pub const ALL: [SessionState; 6] = [
        Self::Initializing,
        Self::AwaitingScan,
        Self::Authenticated,
        Self::Ready,
        Self::AuthFailed,
        Self::Disconnected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::AwaitingScan => "awaiting_scan",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::AuthFailed => "auth_failed",
            Self::Disconnected => "disconnected",
        }
    }

    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// The transition function. Every edge of the lifecycle is listed here;
    /// anything else is an [`InvalidTransition`] and leaves the state alone.
    pub fn apply(self, event: &SessionEvent) -> Result<Self, InvalidTransition> {
        use SessionState::*;

        let next = match (self, event) {
            // A new challenge, including re-entry after failure or transport loss.
            (Initializing | AwaitingScan | AuthFailed | Disconnected, SessionEvent::Qr(_)) => {
                AwaitingScan
            },
            // From `Initializing` when credentials are restored from the store.
            (
                Initializing | AwaitingScan | AuthFailed | Disconnected,
                SessionEvent::Authenticated,
            ) => Authenticated,
            (Authenticated | Disconnected | Ready, SessionEvent::Ready) => Ready,
            (Initializing | AwaitingScan, SessionEvent::AuthFailure(_)) => AuthFailed,
            (Authenticated | Ready | Disconnected, SessionEvent::Disconnected(_)) => Disconnected,
            _ => {
                return Err(InvalidTransition {
                    from: self,
                    event: event.name(),
                });
            },
        };
        Ok(next)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
