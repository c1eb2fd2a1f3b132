pub mod api;
pub mod cli;
pub mod config;
pub mod constants;
pub mod db;
pub mod entities;
pub mod models;
pub mod services;
pub mod state;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, Service};
pub use config::Config;
use db::Store;
use state::{BlogState, UserServiceState};

pub async fn run(config: Config) -> anyhow::Result<()> {
    let cli = Cli::parse();
    config.validate()?;

    init_tracing(&config)?;

    match cli.command {
        Commands::Blog => run_blog(config).await,
        Commands::Users => run_users(config).await,
        Commands::Schema { service } => run_schema(&config, service).await,
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let mut builder = tracing_loki::builder();
        for (key, value) in &config.observability.loki_labels {
            builder = builder.label(key.as_str(), value.as_str())?;
        }
        let (layer, task) = builder.build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

fn init_metrics(config: &Config) -> anyhow::Result<Option<PrometheusHandle>> {
    if !config.observability.metrics_enabled {
        return Ok(None);
    }

    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    info!("Prometheus metrics recorder initialized");
    Ok(Some(handle))
}

/// Builds the pool and creates `tables`, retrying while the database starts.
async fn open_store(config: &Config, tables: &[db::Table]) -> anyhow::Result<Store> {
    let store = Store::connect(&config.database).await?;
    store
        .ensure_schema(tables, config.bootstrap.retry_policy())
        .await
        .context("Database schema is not available; refusing to serve")?;
    Ok(store)
}

async fn run_blog(config: Config) -> anyhow::Result<()> {
    let prometheus_handle = init_metrics(&config)?;
    let store = open_store(&config, Service::Blog.tables()).await?;

    let state = BlogState::new(&config, &store, prometheus_handle)?;
    if config.blog.seed_sample_data {
        state.seed_sample_data().await?;
    }

    let app = api::blog_router(Arc::new(state));
    let addr = format!("{}:{}", config.blog.host, config.blog.port);
    serve(app, &addr, "blog").await?;

    store.shutdown().await;
    Ok(())
}

async fn run_users(config: Config) -> anyhow::Result<()> {
    let prometheus_handle = init_metrics(&config)?;
    let store = open_store(&config, Service::Users.tables()).await?;

    let state = UserServiceState::new(&config, &store, prometheus_handle);

    let app = api::users_router(Arc::new(state));
    let addr = format!("{}:{}", config.users.host, config.users.port);
    serve(app, &addr, "users").await?;

    store.shutdown().await;
    Ok(())
}

async fn run_schema(config: &Config, service: Service) -> anyhow::Result<()> {
    let store = open_store(config, service.tables()).await?;
    info!(?service, "Schema is up to date");
    store.shutdown().await;
    Ok(())
}

async fn serve(app: axum::Router, addr: &str, service: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(service, "Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!(service, "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Error listening for shutdown: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Error installing SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
