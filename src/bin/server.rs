use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::http::{HeaderValue, Method};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ens_graph::api::{HasPool, routes};
use ens_graph::config::ServerConfig;
use ens_graph::db;
use ens_graph::models::{
    CreateGraphPayload, DEFAULT_ADOPTION_GRAPH_DESCRIPTION, DEFAULT_ADOPTION_GRAPH_NAME,
};

#[derive(Clone)]
struct ServerApp {
    pool: Arc<PgPool>,
}

impl HasPool for ServerApp {
    fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ens_graph=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to postgres")?;

    db::create_ens_graph_tables(&pool)
        .await
        .context("failed to run ens graph migrations")?;

    if config.seed_demo {
        let inserted = db::seed_demo_relationships(&pool)
            .await
            .map_err(|err| anyhow::anyhow!("failed to seed demo relationships: {}", err))?;
        tracing::info!(inserted, "demo seed finished");
    }

    if config.adopt_ungrouped {
        let payload = CreateGraphPayload {
            name: DEFAULT_ADOPTION_GRAPH_NAME.to_string(),
            description: Some(DEFAULT_ADOPTION_GRAPH_DESCRIPTION.to_string()),
        };
        match db::adopt_ungrouped_relationships(&pool, payload)
            .await
            .map_err(|err| anyhow::anyhow!("failed to adopt ungrouped relationships: {}", err))?
        {
            Some(graph) => tracing::info!(
                graph_id = %graph.id,
                adopted = graph.relationship_count,
                "assigned ungrouped relationships to default graph"
            ),
            None => tracing::info!("no ungrouped relationships found"),
        }
    }

    let app_state = ServerApp {
        pool: Arc::new(pool),
    };

    let app = Router::new()
        .merge(routes::<ServerApp>())
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.bind_addr))?;

    tracing::info!(addr = %config.bind_addr, "ens graph server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("ens graph server failed")
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("invalid CORS origin '{}'", origin))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
