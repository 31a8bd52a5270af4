use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use tokio::{net::TcpListener, signal};
use tracing::info;

mod error;
pub mod routes;

use crate::application::LedgerService;
use routes::{
    balances_handler, create_expense_handler, create_payment_handler, get_expense_handler,
    greeting_handler, health_handler, list_expenses_handler, ready_handler, settlements_handler,
};

/// Build the HTTP routes over a ledger service.
pub fn router(service: LedgerService) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/greeting", get(greeting_handler))
        .route(
            "/expenses",
            get(list_expenses_handler).post(create_expense_handler),
        )
        .route("/expenses/:id", get(get_expense_handler))
        .route("/balances", get(balances_handler))
        .route("/settlements", get(settlements_handler))
        .route("/payments", post(create_payment_handler))
        .with_state(service)
}

/// Serve the ledger over HTTP until Ctrl+C or SIGTERM.
pub async fn serve(service: LedgerService, address: SocketAddr) -> Result<()> {
    let app = router(service);

    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!(%address, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
