use service_core::observability::logging::init_tracing;
use std::sync::Arc;
use storefront_auth::config::get_configuration;
use storefront_auth::services::{
    spawn_housekeeping, ActivationLedger, AdminSessionManager, Clock, InMemoryLoginAttemptTracker,
    LockoutPolicy, PgCredentialStore, StorefrontClient, SystemClock,
};
use storefront_auth::startup::build_router;
use storefront_auth::{AppComponents, AppState};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        &settings.telemetry.service_name,
        &settings.telemetry.log_level,
        settings.telemetry.otlp_endpoint.as_deref(),
    )?;

    info!(
        service = %settings.telemetry.service_name,
        environment = settings.environment.as_str(),
        "Starting service"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let credentials = Arc::new(PgCredentialStore::connect(&settings.database).await?);
    credentials.run_migrations().await?;

    let login_attempts = Arc::new(InMemoryLoginAttemptTracker::new(
        LockoutPolicy::from(&settings.lockout),
        clock.clone(),
    ));
    let sessions = AdminSessionManager::new(&settings.session, credentials.clone(), clock.clone());
    let provider = Arc::new(StorefrontClient::new(&settings.storefront)?);
    let activation_ledger = Arc::new(ActivationLedger::new(
        chrono::Duration::hours(settings.activation.retention_hours),
        clock.clone(),
    ));

    let housekeeping = spawn_housekeeping(
        login_attempts.clone(),
        activation_ledger.clone(),
        settings.lockout.sweep_interval(),
    );

    let state = AppState::new(AppComponents {
        service_name: settings.telemetry.service_name.clone(),
        environment: settings.environment,
        clock,
        credentials,
        login_attempts,
        sessions,
        provider,
        activation_ledger,
    });
    let app = build_router(state);

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!("Listening on {}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    housekeeping.abort();
    info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
