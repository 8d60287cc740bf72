//! Configuration system for the table engine.
//!
//! Supports TOML-based configuration with global defaults and per-connection overrides.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DatagridError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatagridConfig {
    /// Connection names and probe order.
    pub connections: ConnectionsConfig,

    /// Query execution limits applied to every connection unless overridden.
    pub query: QueryConfig,

    /// Legacy compatibility switches.
    pub compat: CompatConfig,

    /// Engine behaviour switches.
    pub engine: EngineConfig,

    /// Per-connection configuration overrides (keyed by connection name).
    #[serde(default)]
    pub datasources: HashMap<String, DatasourceConfig>,
}

/// Which connection is the process default and in which order the others are probed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionsConfig {
    /// Process default connection (default: "default").
    pub default: String,
    /// Probe order for the remaining connections. Registered connections that
    /// are not listed here are probed afterwards in name order.
    pub order: Vec<String>,
}

/// Query execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Timeout for a single statement in milliseconds (default: 30000).
    pub statement_timeout_ms: u64,
    /// Overall deadline for one table request in milliseconds (default: 60000).
    pub request_timeout_ms: u64,
    /// Timeout for a single `LIMIT 1` connection probe (default: 2000).
    pub probe_timeout_ms: u64,
    /// Maximum page length (0 = unlimited). Also caps `length = -1`.
    pub max_page_length: u64,
}

/// Compatibility switches for behaviour inherited from older list views.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompatConfig {
    /// Report `recordsTotal` equal to `recordsFiltered` whenever static
    /// conditions or dynamic filters were applied (default: true).
    pub total_tracks_filters: bool,
    /// How repeated dynamic filter keys collapse (default: last wins).
    pub duplicate_filter_policy: DuplicateFilterPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateFilterPolicy {
    #[default]
    LastWins,
    FirstWins,
    Reject,
}

/// Engine behaviour switches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attach stage failure diagnostics to responses (default: false).
    pub debug: bool,
    /// Run the unfiltered and filtered COUNT queries concurrently (default: true).
    pub concurrent_counts: bool,
}

/// Per-connection configuration (can override globals).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasourceConfig {
    pub query: Option<QueryConfig>,

    /// DuckDB-specific options.
    pub duckdb: Option<DuckDbConfig>,

    /// PostgreSQL-specific options.
    pub postgres: Option<PostgresConfig>,
}

/// DuckDB-specific configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DuckDbConfig {
    /// Maximum concurrent queries (default: 16).
    pub max_concurrency: usize,
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Connection pool size (default: 16).
    pub pool_size: usize,
    /// Server-side statement timeout in milliseconds.
    pub statement_timeout_ms: u64,
}

// Default implementations

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            default: "default".to_string(),
            order: Vec::new(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            statement_timeout_ms: 30_000,
            request_timeout_ms: 60_000,
            probe_timeout_ms: 2_000,
            max_page_length: 0, // 0 = unlimited
        }
    }
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            total_tracks_filters: true,
            duplicate_filter_policy: DuplicateFilterPolicy::LastWins,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug: false,
            concurrent_counts: true,
        }
    }
}

impl Default for DuckDbConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            statement_timeout_ms: 30_000,
        }
    }
}

impl DatagridConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DatagridError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| DatagridError::Config(format!("failed to parse config: {e}")))
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `DATAGRID_CONFIG` environment variable
    /// 2. `./datagrid.toml` (current directory)
    /// 3. `~/.config/datagrid/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("DATAGRID_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "loaded config from DATAGRID_CONFIG");
                    return cfg;
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "ignoring DATAGRID_CONFIG"),
            }
        }

        if let Ok(cfg) = Self::from_file("datagrid.toml") {
            tracing::info!("loaded config from ./datagrid.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("datagrid").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }

    /// Get resolved config for a specific connection (merges global defaults).
    pub fn for_datasource(&self, name: &str) -> ResolvedDatasourceConfig {
        ResolvedDatasourceConfig::merge(&self.query, self.datasources.get(name))
    }
}

/// Fully resolved configuration for a connection (no Option fields).
#[derive(Debug, Clone)]
pub struct ResolvedDatasourceConfig {
    pub query: QueryConfig,
    pub duckdb: DuckDbConfig,
    pub postgres: PostgresConfig,
}

impl ResolvedDatasourceConfig {
    fn merge(defaults: &QueryConfig, override_cfg: Option<&DatasourceConfig>) -> Self {
        match override_cfg {
            Some(ds) => Self {
                query: ds.query.clone().unwrap_or_else(|| defaults.clone()),
                duckdb: ds.duckdb.clone().unwrap_or_default(),
                postgres: ds.postgres.clone().unwrap_or_default(),
            },
            None => Self {
                query: defaults.clone(),
                duckdb: DuckDbConfig::default(),
                postgres: PostgresConfig::default(),
            },
        }
    }
}
