use std::{future::IntoFuture, process, sync::Arc};

use flagpole::{
    application::{error::AppError, flags::FlagService, repos::FlagsRepo},
    cache::{CacheConfig, CachedFlagsRepo, FlagCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        memory::InMemoryFlagStore,
        telemetry,
    },
};
use sqlx::PgPool;
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let mut causes = Vec::new();
    let mut current = std::error::Error::source(error);
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = cause.source();
    }

    if dispatcher::has_been_set() {
        error!(error = %error, causes = ?causes, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, causes = ?causes, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = init_store(&settings).await?;
    let repo = wrap_with_cache(store, CacheConfig::from(&settings.cache));
    let state = ApiState::new(FlagService::new(repo));

    serve_http(&settings, state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or(InfraError::MissingDatabaseUrl)?;

    let pool = connect_pool(url, &settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    info!(target = "flagpole::migrate", "Migrations applied");
    Ok(())
}

async fn connect_pool(url: &str, settings: &config::Settings) -> Result<PgPool, AppError> {
    PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::Connect(err)))
}

async fn init_store(settings: &config::Settings) -> Result<Arc<dyn FlagsRepo>, AppError> {
    let Some(url) = settings.database.url.as_deref() else {
        warn!(
            target = "flagpole::store",
            "database url is not configured; flags are kept in memory and lost on exit"
        );
        return Ok(Arc::new(InMemoryFlagStore::new()));
    };

    let pool = connect_pool(url, settings).await?;
    if settings.database.run_migrations {
        PostgresRepositories::run_migrations(&pool)
            .await
            .map_err(InfraError::from)?;
    }

    info!(target = "flagpole::store", "Connected to Postgres flag store");
    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn wrap_with_cache(store: Arc<dyn FlagsRepo>, config: CacheConfig) -> Arc<dyn FlagsRepo> {
    if !config.enabled {
        info!(target = "flagpole::cache", "Flag cache disabled");
        return store;
    }

    info!(
        target = "flagpole::cache",
        ttl_seconds = config.ttl.as_secs(),
        capacity = config.capacity,
        "Flag cache enabled"
    );
    let cache = Arc::new(FlagCache::new(&config));
    Arc::new(CachedFlagsRepo::new(store, cache))
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(settings.server.addr, err)))?;
    info!(
        target = "flagpole::http",
        addr = %settings.server.addr,
        "Listening"
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let drain_deadline = async move {
        if stop_rx.wait_for(|stopped| *stopped).await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = drain_deadline => {
            warn!(
                target = "flagpole::http",
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
        }
    }

    info!(target = "flagpole::http", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(
        target = "flagpole::http",
        "Shutdown signal received; draining connections"
    );
}
