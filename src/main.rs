use anyhow::Result;
use contactserver::config::AppConfig;
use contactserver::guard::PgWorkspaceGuard;
use contactserver::resolver::{configure_resolution_routes, ContactResolver};
use contactserver::shared::state::AppState;
use contactserver::shared::utils::{create_conn, run_migrations};
use contactserver::store::PgStore;
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env();
    let pool = create_conn(&config)?;
    if let Err(e) = run_migrations(&pool) {
        error!("Failed to run migrations: {e}");
        return Err(anyhow::anyhow!("migrations failed: {e}"));
    }
    info!("Database migrations applied");

    let store = Arc::new(PgStore::new(pool.clone()));
    let guard = Arc::new(PgWorkspaceGuard::new(pool.clone()));
    let resolver = Arc::new(ContactResolver::new(store.clone(), store, guard));

    let state = Arc::new(AppState {
        conn: pool,
        config: config.clone(),
        resolver,
    });

    let app = configure_resolution_routes().with_state(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("contactserver {} listening on {addr}", env!("CARGO_PKG_VERSION"));
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
