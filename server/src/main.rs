mod app;
mod config;
mod db_sqlx;
mod persistence;
mod routes;
mod services;
mod state;

extern crate self as sqlx;
pub use crate::db_sqlx::{PgPool, postgres, query, query_as};

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let db = match config::database_url() {
        Some(database_url) => match connect_database(&database_url).await {
            Some(pool) => Some(pool),
            None => return,
        },
        None => {
            tracing::warn!("DATABASE_URL is not set; territories are kept in memory only");
            None
        }
    };

    let state = AppState::new(db);
    if state.webhook_url.is_none() {
        tracing::info!("WEBHOOK_URL is not set; change notifications disabled");
    }

    if let Some(pool) = state.db.as_ref() {
        match persistence::load_all(pool).await {
            Ok(rows) => {
                let mut records = Vec::with_capacity(rows.len());
                for row in rows {
                    match row {
                        Ok(record) => records.push(record),
                        Err((id, e)) => {
                            tracing::warn!(id = %id, error = %e, "skipping territory row with undecodable boxes");
                        }
                    }
                }
                tracing::info!("Loaded {} territories from PostgreSQL", records.len());
                state.seed(records);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load territories");
                return;
            }
        }
    }

    let app = app::build_app(state);

    let addr = format!("0.0.0.0:{}", config::server_port());
    tracing::info!("Turf map server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind TCP listener");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server failed");
    }

    tracing::info!("Server shut down gracefully");
}

async fn connect_database(database_url: &str) -> Option<PgPool> {
    let db_max_connections = config::db_max_connections();
    tracing::info!(db_max_connections, "Connecting to PostgreSQL...");
    let pool = match PgPoolOptions::new()
        .max_connections(db_max_connections)
        .connect(database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to PostgreSQL");
            return None;
        }
    };
    if let Err(e) = persistence::migrate(&pool).await {
        tracing::error!(error = %e, "failed to run migrations");
        return None;
    }
    tracing::info!("Database connected and migrations applied");
    Some(pool)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
