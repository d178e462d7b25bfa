use lang_tricks_backend::config::Config;
use lang_tricks_backend::db::{self, Database};
use lang_tricks_backend::logging;
use lang_tricks_backend::seed;
use lang_tricks_backend::state::AppState;
use lang_tricks_backend::workers::WorkerManager;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config);

    let db = match Database::from_env().await {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(error = %err, "database not available, exiting");
            std::process::exit(1);
        }
    };

    if let Err(err) = db::migrate::run_migrations(db.pool()).await {
        tracing::error!(error = %err, "migrations failed, exiting");
        std::process::exit(1);
    }

    if let Err(err) = seed::seed_learning_data(&db).await {
        tracing::warn!(error = %err, "seeding learning data failed");
    }

    match seed::validate_seed_integrity(&db).await {
        Ok(integrity) if !integrity.is_valid => {
            tracing::warn!(
                tricks = integrity.tricks_count,
                statements = integrity.statements_count,
                missing = ?integrity.missing_tricks,
                "learning data incomplete"
            );
        }
        Ok(integrity) => {
            tracing::info!(
                tricks = integrity.tricks_count,
                statements = integrity.statements_count,
                "learning data verified"
            );
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not validate learning data");
        }
    }

    let state = AppState::new(db, &config);

    let worker_manager = match WorkerManager::new(state.db(), state.reminders(), &config).await {
        Ok(manager) => {
            if let Err(e) = manager.start().await {
                tracing::error!(error = %e, "failed to start workers");
            }
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(error = %e, "worker manager not initialized");
            None
        }
    };

    tracing::info!("learning engine ready");

    shutdown_signal().await;

    tracing::info!("Initiating graceful shutdown sequence");

    if let Some(ref manager) = worker_manager {
        manager.stop().await;
    }

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
