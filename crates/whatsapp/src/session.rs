//! The single WhatsApp session shared by every request.
//!
//! Engine events are pumped through one channel into [`SessionState::apply`],
//! so transitions are strictly ordered. The current state is published on a
//! `watch` channel; calls into the engine check it first and are abandoned if
//! the session leaves `Ready` while they are in flight.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    groupcast_channels::{ChatEngine, ChatRecord, EngineError, SessionEvent},
    serde::Serialize,
    tokio::{
        sync::{RwLock, mpsc, watch},
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
};

use crate::{
    qr,
    state::{InvalidTransition, SessionState},
};

/// Default bound on a single engine call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── Errors ───────────────────────────────────────────────────────────────────

/// Why a call through the session failed. Every variant is transient from
/// the caller's point of view; nothing here is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("WhatsApp session is not ready (state: {0})")]
    NotReady(SessionState),

    #[error("WhatsApp session became {0} while the request was in flight")]
    Interrupted(SessionState),

    #[error("WhatsApp engine did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

// ── Options / status ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub client_id: String,
    /// Engine-owned credential directory.
    pub storage_path: PathBuf,
    pub request_timeout: Duration,
    /// Render login challenges on stderr.
    pub print_qr: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_id: "session-wa".into(),
            storage_path: PathBuf::from(".wwebjs_auth/session-session-wa"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            print_qr: false,
        }
    }
}

/// Point-in-time view of the session for operators.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub client_id: String,
    pub state: SessionState,
    /// Pending login challenge, only while awaiting a scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Unix time (ms) of the last state change.
    pub since_ms: u64,
}

#[derive(Debug, Default)]
struct Details {
    qr: Option<String>,
    last_error: Option<String>,
    since_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

// ── Session ──────────────────────────────────────────────────────────────────

pub struct WhatsAppSession {
    client_id: String,
    storage_path: PathBuf,
    engine: Arc<dyn ChatEngine>,
    request_timeout: Duration,
    print_qr: bool,
    state: watch::Sender<SessionState>,
    details: RwLock<Details>,
}

impl WhatsAppSession {
    pub fn new(engine: Arc<dyn ChatEngine>, options: SessionOptions) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Initializing);
        Arc::new(Self {
            client_id: options.client_id,
            storage_path: options.storage_path,
            engine,
            request_timeout: options.request_timeout,
            print_qr: options.print_qr,
            state,
            details: RwLock::new(Details {
                since_ms: now_ms(),
                ..Default::default()
            }),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub async fn status(&self) -> SessionStatus {
        let details = self.details.read().await;
        SessionStatus {
            client_id: self.client_id.clone(),
            state: self.state(),
            qr: details.qr.clone(),
            last_error: details.last_error.clone(),
            since_ms: details.since_ms,
        }
    }

    /// Initialize the engine and pump its events into the state machine.
    ///
    /// Returns immediately; the HTTP listener must not wait on this.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            info!(
                engine = session.engine.name(),
                client_id = %session.client_id,
                path = %session.storage_path.display(),
                "initializing WhatsApp session"
            );

            let init = async {
                if let Err(e) = session.engine.initialize(tx).await {
                    error!(error = %e, "WhatsApp engine failed to initialize");
                    session.details.write().await.last_error = Some(e.to_string());
                }
            };
            let pump = async {
                while let Some(event) = rx.recv().await {
                    // Rejected events are logged inside.
                    let _ = session.handle_event(event).await;
                }
                debug!("WhatsApp event stream closed");
            };
            tokio::join!(init, pump);
        })
    }

    /// Apply one engine event. Events without an edge from the current state
    /// are logged and dropped.
    pub async fn handle_event(
        &self,
        event: SessionEvent,
    ) -> Result<SessionState, InvalidTransition> {
        let from = self.state();
        let to = match from.apply(&event) {
            Ok(to) => to,
            Err(e) => {
                warn!(from = %from, event = event.name(), "ignoring out-of-order session event");
                // State stays put, but a stale challenge must not outlive the
                // failure that invalidated it.
                if let SessionEvent::AuthFailure(reason) | SessionEvent::Disconnected(reason) =
                    &event
                {
                    let mut details = self.details.write().await;
                    details.qr = None;
                    details.last_error = Some(reason.clone());
                }
                return Err(e);
            },
        };

        {
            let mut details = self.details.write().await;
            if to != from {
                details.since_ms = now_ms();
            }
            details.qr = None;
            match &event {
                SessionEvent::Qr(payload) => details.qr = Some(payload.clone()),
                SessionEvent::AuthFailure(reason) | SessionEvent::Disconnected(reason) => {
                    details.last_error = Some(reason.clone());
                },
                SessionEvent::Ready => details.last_error = None,
                SessionEvent::Authenticated => {},
            }
        }
        self.state.send_replace(to);

        match &event {
            SessionEvent::Qr(payload) => self.announce_qr(payload),
            SessionEvent::Authenticated => {
                info!(client_id = %self.client_id, "authenticated, session persisted")
            },
            SessionEvent::Ready => info!("WhatsApp ready, serving requests"),
            SessionEvent::AuthFailure(reason) => {
                error!(reason = %reason, "authentication failed, scan required")
            },
            SessionEvent::Disconnected(reason) => warn!(reason = %reason, "WhatsApp disconnected"),
        }
        debug!(from = %from, to = %to, "session state changed");
        Ok(to)
    }

    fn announce_qr(&self, payload: &str) {
        info!("scan the QR code to log in to WhatsApp (first run only)");
        if !self.print_qr {
            return;
        }
        match qr::render_terminal(payload) {
            Ok(rendered) => eprintln!("{rendered}"),
            Err(e) => warn!(error = %e, "could not render login QR code"),
        }
    }

    /// Send `body` to the chat `chat_id`. Not retried.
    pub async fn send_message(&self, chat_id: &str, body: &str) -> Result<(), SessionError> {
        self.call(self.engine.send_message(chat_id, body)).await
    }

    /// Full chat list in engine order. Never cached.
    pub async fn chats(&self) -> Result<Vec<ChatRecord>, SessionError> {
        self.call(self.engine.get_chats()).await
    }

    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }

    /// Run an engine call only while `Ready`, bounded by the request timeout
    /// and abandoned if the session leaves `Ready` first.
    async fn call<T, F>(&self, engine_call: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let mut rx = self.state.subscribe();
        let state = *rx.borrow_and_update();
        if !state.is_ready() {
            return Err(SessionError::NotReady(state));
        }

        tokio::select! {
            result = tokio::time::timeout(self.request_timeout, engine_call) => match result {
                Ok(result) => result.map_err(SessionError::from),
                Err(_) => Err(SessionError::Timeout(self.request_timeout)),
            },
            state = left_ready(rx) => Err(SessionError::Interrupted(state)),
        }
    }
}

/// Resolves with the new state once the session is no longer `Ready`.
async fn left_ready(mut rx: watch::Receiver<SessionState>) -> SessionState {
    loop {
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
        let state = *rx.borrow_and_update();
        if !state.is_ready() {
            return state;
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Default)]
    struct StubEngine {
        script: Vec<SessionEvent>,
        chats: Vec<ChatRecord>,
        fail_init: bool,
        hang: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatEngine for StubEngine {
        fn name(&self) -> &str {
            "stub"
        }

        async fn initialize(
            &self,
            events: mpsc::UnboundedSender<SessionEvent>,
        ) -> Result<(), EngineError> {
            if self.fail_init {
                return Err(EngineError::Transport("browser failed to launch".into()));
            }
            for event in &self.script {
                let _ = events.send(event.clone());
            }
            Ok(())
        }

        async fn send_message(&self, _chat_id: &str, _body: &str) -> Result<(), EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn get_chats(&self) -> Result<Vec<ChatRecord>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.chats.clone())
        }
    }

    fn session_with(engine: StubEngine, timeout: Duration) -> (Arc<WhatsAppSession>, Arc<StubEngine>) {
        let engine = Arc::new(engine);
        let session = WhatsAppSession::new(
            Arc::clone(&engine) as Arc<dyn ChatEngine>,
            SessionOptions {
                request_timeout: timeout,
                ..Default::default()
            },
        );
        (session, engine)
    }

    async fn make_ready(session: &WhatsAppSession) {
        session.handle_event(SessionEvent::Authenticated).await.unwrap();
        session.handle_event(SessionEvent::Ready).await.unwrap();
    }

    #[tokio::test]
    async fn start_follows_engine_events_to_ready() {
        let (session, _) = session_with(
            StubEngine {
                script: vec![
                    SessionEvent::Qr("challenge".into()),
                    SessionEvent::Authenticated,
                    SessionEvent::Ready,
                ],
                ..Default::default()
            },
            DEFAULT_REQUEST_TIMEOUT,
        );
        let mut rx = session.subscribe();

        session.start();

        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.is_ready()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn init_failure_is_recorded_and_state_stays_initializing() {
        let (session, _) = session_with(
            StubEngine {
                fail_init: true,
                ..Default::default()
            },
            DEFAULT_REQUEST_TIMEOUT,
        );

        session.start().await.unwrap();

        let status = session.status().await;
        assert_eq!(status.state, SessionState::Initializing);
        assert!(status.last_error.unwrap().contains("browser failed to launch"));
    }

    #[tokio::test]
    async fn not_ready_fails_fast_without_calling_the_engine() {
        let (session, engine) = session_with(StubEngine::default(), DEFAULT_REQUEST_TIMEOUT);
        session
            .handle_event(SessionEvent::Qr("challenge".into()))
            .await
            .unwrap();

        let err = session.send_message("123@g.us", "hi").await.unwrap_err();

        assert!(matches!(err, SessionError::NotReady(SessionState::AwaitingScan)));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ready_session_forwards_calls() {
        let (session, engine) = session_with(
            StubEngine {
                chats: vec![ChatRecord::group("a@g.us", "Dev Team")],
                ..Default::default()
            },
            DEFAULT_REQUEST_TIMEOUT,
        );
        make_ready(&session).await;

        session.send_message("a@g.us", "hi").await.unwrap();
        let chats = session.chats().await.unwrap();

        assert_eq!(chats.len(), 1);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn qr_is_exposed_until_authenticated() {
        let (session, _) = session_with(StubEngine::default(), DEFAULT_REQUEST_TIMEOUT);

        session
            .handle_event(SessionEvent::Qr("challenge".into()))
            .await
            .unwrap();
        assert_eq!(session.status().await.qr.as_deref(), Some("challenge"));

        session.handle_event(SessionEvent::Authenticated).await.unwrap();
        assert!(session.status().await.qr.is_none());
    }

    #[tokio::test]
    async fn out_of_table_event_leaves_state_alone() {
        let (session, _) = session_with(StubEngine::default(), DEFAULT_REQUEST_TIMEOUT);
        make_ready(&session).await;

        let err = session
            .handle_event(SessionEvent::Qr("late".into()))
            .await
            .unwrap_err();

        assert_eq!(err.from, SessionState::Ready);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn driver_loss_before_login_clears_the_challenge() {
        let (session, _) = session_with(
            StubEngine {
                script: vec![
                    SessionEvent::Qr("QR-1".into()),
                    SessionEvent::Disconnected("driver exited".into()),
                ],
                ..Default::default()
            },
            DEFAULT_REQUEST_TIMEOUT,
        );

        session.start().await.unwrap();

        let status = session.status().await;
        assert_eq!(status.state, SessionState::AwaitingScan);
        assert!(status.qr.is_none());
        assert_eq!(status.last_error.as_deref(), Some("driver exited"));
    }

    #[tokio::test]
    async fn rejected_auth_failure_is_still_recorded() {
        let (session, _) = session_with(StubEngine::default(), DEFAULT_REQUEST_TIMEOUT);
        make_ready(&session).await;

        assert!(
            session
                .handle_event(SessionEvent::AuthFailure("bad".into()))
                .await
                .is_err()
        );

        let status = session.status().await;
        assert_eq!(status.state, SessionState::Ready);
        assert_eq!(status.last_error.as_deref(), Some("bad"));
    }

    #[tokio::test]
    async fn disconnect_records_reason_and_ready_clears_it() {
        let (session, _) = session_with(StubEngine::default(), DEFAULT_REQUEST_TIMEOUT);
        make_ready(&session).await;

        session
            .handle_event(SessionEvent::Disconnected("NAVIGATION".into()))
            .await
            .unwrap();
        let status = session.status().await;
        assert_eq!(status.state, SessionState::Disconnected);
        assert_eq!(status.last_error.as_deref(), Some("NAVIGATION"));

        session.handle_event(SessionEvent::Ready).await.unwrap();
        assert!(session.status().await.last_error.is_none());
    }

    #[tokio::test]
    async fn hung_engine_call_times_out() {
        let (session, _) = session_with(
            StubEngine {
                hang: true,
                ..Default::default()
            },
            Duration::from_millis(50),
        );
        make_ready(&session).await;

        let err = session.send_message("a@g.us", "hi").await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
    }

    #[tokio::test]
    async fn disconnect_mid_flight_interrupts_the_call() {
        let (session, engine) = session_with(
            StubEngine {
                hang: true,
                ..Default::default()
            },
            Duration::from_secs(30),
        );
        make_ready(&session).await;

        let in_flight = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send_message("a@g.us", "hi").await })
        };
        while engine.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        session
            .handle_event(SessionEvent::Disconnected("CONFLICT".into()))
            .await
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(2), in_flight)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SessionError::Interrupted(SessionState::Disconnected)));
    }
}
