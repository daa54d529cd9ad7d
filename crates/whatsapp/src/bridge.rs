//! Driver bridge: spawn the browser automation process and talk to it with
//! newline-delimited JSON over stdin/stdout.
//!
//! Gateway → driver:
//! `{"id":1,"method":"sendMessage","params":{"chatId":"…","body":"…"}}`
//!
//! Driver → gateway, either a response correlated by `id`:
//! `{"id":1,"result":…}` / `{"id":1,"error":{"message":"…"}}`
//!
//! or a lifecycle event:
//! `{"event":"qr","data":"…"}` (`qr`, `authenticated`, `ready`, `auth_failure`, `disconnected`).
//!
//! The driver receives `GROUPCAST_CLIENT_ID` and `GROUPCAST_SESSION_PATH` in
//! its environment and owns everything under the session path.

use std::{
    collections::HashMap,
    path::PathBuf,
    process::Stdio,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    groupcast_channels::{ChatEngine, ChatRecord, EngineError, SessionEvent},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
        sync::{Mutex as AsyncMutex, OnceCell, mpsc, oneshot},
        task::JoinHandle,
    },
    tracing::{debug, info, trace, warn},
};

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DriverRequest<'a> {
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DriverMessage {
    Response(DriverResponse),
    Event(DriverEvent),
}

#[derive(Debug, Deserialize)]
struct DriverResponse {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<DriverErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct DriverErrorPayload {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DriverEvent {
    event: String,
    #[serde(default)]
    data: Value,
}

impl DriverResponse {
    fn into_result(self) -> Result<Option<Value>, EngineError> {
        match self.error {
            Some(err) => Err(EngineError::Rejected(err.message)),
            None => Ok(self.result),
        }
    }
}

impl DriverEvent {
    fn into_session_event(self) -> Option<SessionEvent> {
        let text = match self.data {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        match self.event.as_str() {
            "qr" => Some(SessionEvent::Qr(text)),
            "authenticated" => Some(SessionEvent::Authenticated),
            "ready" => Some(SessionEvent::Ready),
            "auth_failure" => Some(SessionEvent::AuthFailure(text)),
            "disconnected" => Some(SessionEvent::Disconnected(text)),
            _ => None,
        }
    }
}

// ── Config ───────────────────────────────────────────────────────────────────

/// How to launch the driver process.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub client_id: String,
    pub session_path: PathBuf,
}

// ── Driver process ───────────────────────────────────────────────────────────

type Reply = Result<Option<Value>, EngineError>;
type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Reply>>>;

fn lock(pending: &PendingMap) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes the pending entry if the caller stops waiting (timeout, interrupt).
struct PendingGuard<'a> {
    id: u64,
    pending: &'a PendingMap,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

struct DriverProcess {
    child: AsyncMutex<Child>,
    stdin: AsyncMutex<ChildStdin>,
    pending: Arc<PendingMap>,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl DriverProcess {
    async fn spawn(
        config: &BridgeConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Arc<Self>, EngineError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .env("GROUPCAST_CLIENT_ID", &config.client_id)
            .env("GROUPCAST_SESSION_PATH", &config.session_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::Transport(format!("failed to spawn driver '{}': {e}", config.command))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
        info!(command = %config.command, pid = child.id(), "driver process started");

        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_stdout(
            stdout,
            Arc::clone(&pending),
            Arc::clone(&closed),
            events,
        ));
        let logger = tokio::spawn(forward_stderr(stderr));

        Ok(Arc::new(Self {
            child: AsyncMutex::new(child),
            stdin: AsyncMutex::new(stdin),
            pending,
            closed,
            next_id: AtomicU64::new(1),
            tasks: AsyncMutex::new(vec![reader, logger]),
        }))
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Reply {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        let _guard = PendingGuard {
            id,
            pending: &self.pending,
        };
        // The reader sets this before draining the map, so a request inserted
        // after the drain still sees it.
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Transport("driver process has exited".into()));
        }

        let mut line = serde_json::to_string(&DriverRequest { id, method, params })
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        line.push('\n');
        trace!(method, id, "gateway -> driver");

        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await.map_err(write_failed)?;
            stdin.flush().await.map_err(write_failed)?;
        }

        rx.await
            .map_err(|_| EngineError::Transport("driver exited before responding".into()))?
    }

    async fn kill(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        if let Err(e) = self.child.lock().await.kill().await {
            debug!(error = %e, "driver process already gone");
        }
    }
}

fn missing_pipe(name: &str) -> EngineError {
    EngineError::Transport(format!("failed to capture driver {name}"))
}

fn write_failed(e: std::io::Error) -> EngineError {
    EngineError::Transport(format!("failed to write to driver: {e}"))
}

async fn read_stdout(
    stdout: ChildStdout,
    pending: Arc<PendingMap>,
    closed: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                trace!(raw = %trimmed, "driver -> gateway");

                match serde_json::from_str::<DriverMessage>(trimmed) {
                    Ok(DriverMessage::Response(resp)) => {
                        let id = resp.id;
                        match lock(&pending).remove(&id) {
                            Some(tx) => {
                                let _ = tx.send(resp.into_result());
                            },
                            None => warn!(id, "response for unknown or abandoned request"),
                        }
                    },
                    Ok(DriverMessage::Event(event)) => {
                        let name = event.event.clone();
                        match event.into_session_event() {
                            Some(event) => {
                                if events.send(event).is_err() {
                                    debug!("session event receiver dropped");
                                }
                            },
                            None => debug!(event = %name, "ignoring unknown driver event"),
                        }
                    },
                    Err(e) => warn!(error = %e, line = %trimmed, "unparseable driver output"),
                }
            },
            Ok(None) => {
                debug!("driver stdout closed");
                break;
            },
            Err(e) => {
                warn!(error = %e, "error reading driver stdout");
                break;
            },
        }
    }

    // Dropping the senders fails every waiter.
    closed.store(true, Ordering::SeqCst);
    lock(&pending).clear();
    let _ = events.send(SessionEvent::Disconnected("driver exited".into()));
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "groupcast::driver", "{line}");
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// [`ChatEngine`] backed by an external driver process.
pub struct BridgeEngine {
    config: BridgeConfig,
    driver: OnceCell<Arc<DriverProcess>>,
}

impl BridgeEngine {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            driver: OnceCell::new(),
        }
    }

    fn driver(&self) -> Result<&DriverProcess, EngineError> {
        self.driver
            .get()
            .map(|d| d.as_ref())
            .ok_or(EngineError::NotRunning)
    }
}

#[async_trait]
impl ChatEngine for BridgeEngine {
    fn name(&self) -> &str {
        "driver-bridge"
    }

    async fn initialize(
        &self,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<(), EngineError> {
        let driver = DriverProcess::spawn(&self.config, events).await?;
        if self.driver.set(Arc::clone(&driver)).is_err() {
            driver.kill().await;
            return Err(EngineError::Transport("driver already initialized".into()));
        }
        driver.request("initialize", None).await.map(|_| ())
    }

    async fn send_message(&self, chat_id: &str, body: &str) -> Result<(), EngineError> {
        let params = serde_json::json!({ "chatId": chat_id, "body": body });
        self.driver()?
            .request("sendMessage", Some(params))
            .await
            .map(|_| ())
    }

    async fn get_chats(&self) -> Result<Vec<ChatRecord>, EngineError> {
        let result = self
            .driver()?
            .request("getChats", None)
            .await?
            .ok_or_else(|| EngineError::Protocol("getChats returned no result".into()))?;
        serde_json::from_value(result).map_err(|e| EngineError::Protocol(e.to_string()))
    }

    async fn shutdown(&self) {
        if let Some(driver) = self.driver.get() {
            driver.kill().await;
            info!("driver process stopped");
        }
    }
}
