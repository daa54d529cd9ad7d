//! Config schema: HTTP listener, shared secret, and the WhatsApp session.

use std::{collections::HashMap, fmt, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::env_subst::has_placeholder;

pub const DEFAULT_PORT: u16 = 3008;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupcastConfig {
    pub server: ServerConfig,
    pub whatsapp: WhatsAppConfig,
}

/// HTTP listener and API credentials.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to all interfaces.
    pub bind: String,
    pub port: u16,
    /// Shared secret clients present as `Authorization: Bearer <token>`.
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            auth_token: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address '{addr}': {e}"))
    }

    /// The configured token, rejecting empty values and placeholders that
    /// were never resolved.
    pub fn auth_token(&self) -> anyhow::Result<&str> {
        match self.auth_token.as_deref().map(str::trim) {
            None | Some("") => anyhow::bail!(
                "no auth token configured: set AUTH_TOKEN or server.auth_token"
            ),
            Some(token) if has_placeholder(token) => {
                anyhow::bail!("server.auth_token references an unset environment variable")
            },
            Some(token) => Ok(token),
        }
    }
}

/// WhatsApp session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Names the persisted session; changing it forces a new scan.
    pub client_id: String,
    /// Directory the engine persists credentials under.
    pub data_path: PathBuf,
    pub request_timeout_secs: u64,
    /// Print login challenges as a terminal QR code.
    pub print_qr: bool,
    pub driver: DriverConfig,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            client_id: "session-wa".into(),
            data_path: PathBuf::from(".wwebjs_auth"),
            request_timeout_secs: 30,
            print_qr: true,
            driver: DriverConfig::default(),
        }
    }
}

/// External process that drives the WhatsApp Web client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command: "node".into(),
            args: vec!["driver.js".into()],
            env: HashMap::new(),
        }
    }
}

impl GroupcastConfig {
    /// Copy with the auth token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.server.auth_token.is_some() {
            copy.server.auth_token = Some("[REDACTED]".into());
        }
        copy
    }
}
