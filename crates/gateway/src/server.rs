use std::{sync::Arc, time::Duration};

use {
    anyhow::Context,
    axum::{
        Router, middleware,
        routing::{get, post},
    },
    groupcast_config::GroupcastConfig,
    groupcast_whatsapp::{
        BridgeConfig, BridgeEngine, SessionOptions, WhatsAppSession, ensure_session_store,
    },
    tower_http::{cors::CorsLayer, trace::TraceLayer},
    tracing::{info, warn},
};

use crate::{auth::ResolvedAuth, auth_middleware::require_auth, routes, state::AppState};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
///
/// CORS sits outside the auth gate so preflights are answered without a
/// token; every other request, unknown paths included, must authenticate.
pub fn build_gateway_app(state: AppState) -> Router {
    Router::new()
        .route("/send-group", post(routes::send_group))
        .route("/groups", get(routes::list_groups))
        .route("/find-group", get(routes::find_group))
        .route("/status", get(routes::session_status))
        .fallback(routes::fallback)
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Start the WhatsApp session and serve the HTTP API until SIGINT/SIGTERM.
pub async fn start_gateway(config: GroupcastConfig) -> anyhow::Result<()> {
    let token = config.server.auth_token()?.to_string();
    let addr = config.server.bind_address()?;
    let wa = &config.whatsapp;

    let storage_path = ensure_session_store(&wa.data_path, &wa.client_id)
        .context("session store unavailable")?;

    let engine = Arc::new(BridgeEngine::new(BridgeConfig {
        command: wa.driver.command.clone(),
        args: wa.driver.args.clone(),
        env: wa.driver.env.clone(),
        client_id: wa.client_id.clone(),
        session_path: storage_path.clone(),
    }));
    let session = WhatsAppSession::new(engine, SessionOptions {
        client_id: wa.client_id.clone(),
        storage_path,
        request_timeout: Duration::from_secs(wa.request_timeout_secs),
        print_qr: wa.print_qr,
    });
    let lifecycle = session.start();

    let app = build_gateway_app(AppState::new(
        Arc::clone(&session),
        ResolvedAuth::new(token),
    ));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Startup banner.
    let lines = [
        format!("groupcast gateway v{}", env!("CARGO_PKG_VERSION")),
        format!("listening on http://{addr}"),
        format!(
            "session '{}' stored in {}",
            session.client_id(),
            session.storage_path().display()
        ),
        format!("driver: {} {}", wa.driver.command, wa.driver.args.join(" ")),
    ];
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    session.shutdown().await;
    lifecycle.abort();
    info!("groupcast gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
