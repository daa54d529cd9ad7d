use std::sync::Arc;

use groupcast_whatsapp::WhatsAppSession;

use crate::auth::ResolvedAuth;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<WhatsAppSession>,
    pub auth: Arc<ResolvedAuth>,
}

impl AppState {
    pub fn new(session: Arc<WhatsAppSession>, auth: ResolvedAuth) -> Self {
        Self {
            session,
            auth: Arc::new(auth),
        }
    }
}
