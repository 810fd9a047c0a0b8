//! PgManage - headless client for a PgManage backend.
//!
//! Signs in, loads the connection list and keeps the backend session alive
//! until interrupted. Credentials come from `PGMANAGE_USER` and
//! `PGMANAGE_PASSWORD`; the backend address from `PGMANAGE_URL`.

mod headless;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use headless::HeadlessWidgets;
use pgmanage_core::logging::init_logging;
use pgmanage_core::{AppState, ClientConfig, ClientError, HttpTransport, TracingNotifier};

const BEACON_GRACE: Duration = Duration::from_millis(500);

fn main() -> ExitCode {
    let config = match ClientConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pgmanage: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logging before AppState so its setup is captured
    let _logging_guard = init_logging(config.log_config());
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting PgManage");

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, category = e.category(), "PgManage stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(config: ClientConfig) -> Result<(), ClientError> {
    let transport = Arc::new(HttpTransport::new(&config)?);
    let state = AppState::new(config, transport, Arc::new(TracingNotifier), Arc::new(HeadlessWidgets))?;

    state.block_on(async {
        if let (Ok(user), Ok(password)) = (std::env::var("PGMANAGE_USER"), std::env::var("PGMANAGE_PASSWORD")) {
            state.session().sign_in(&user, &password).await?;
        }
        state.session().run_then_unload(serve(&state), BEACON_GRACE).await
    })
}

/// Load connections and keep the session alive until interrupted.
async fn serve(state: &AppState) -> Result<(), ClientError> {
    let count = state.connections().load_connections().await?;
    for conn in state.connections().sorted_connections() {
        tracing::info!(
            id = conn.id,
            alias = %conn.alias,
            technology = conn.technology.as_str(),
            pinned = conn.pinned,
            "Connection"
        );
    }
    tracing::info!(count, "Ready");

    state.session().start_keep_alive();
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to wait for interrupt");
    }
    Ok(())
}
