use std::env;
use std::net::SocketAddr;

use anyhow::{Context, anyhow};

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Server settings, read from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>,
    pub max_connections: u32,
    /// Insert the demo relationships when the store is empty.
    pub seed_demo: bool,
    /// Move ungrouped relationships into a default graph on startup.
    pub adopt_ungrouped: bool,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .context("DATABASE_URL is required to run the ens graph server")?;

        let bind = lookup("ENS_GRAPH_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr: SocketAddr = bind
            .parse()
            .with_context(|| format!("invalid ENS_GRAPH_BIND '{}'", bind))?;

        let cors_origins = match lookup("ENS_GRAPH_CORS_ORIGINS") {
            Some(raw) => parse_origins(&raw),
            None => vec![DEFAULT_CORS_ORIGIN.to_string()],
        };

        let max_connections = match lookup("ENS_GRAPH_MAX_CONNECTIONS") {
            Some(raw) => {
                let parsed: u32 = raw.trim().parse().with_context(|| {
                    format!("invalid ENS_GRAPH_MAX_CONNECTIONS '{}'", raw)
                })?;
                if parsed == 0 {
                    return Err(anyhow!("ENS_GRAPH_MAX_CONNECTIONS must be at least 1"));
                }
                parsed
            }
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            bind_addr,
            cors_origins,
            max_connections,
            seed_demo: flag(lookup("ENS_GRAPH_SEED_DEMO")),
            adopt_ungrouped: flag(lookup("ENS_GRAPH_ADOPT_UNGROUPED")),
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn flag(value: Option<String>) -> bool {
    match value {
        Some(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            normalized == "1" || normalized == "true" || normalized == "yes"
        }
        None => false,
    }
}
