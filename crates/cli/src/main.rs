use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ledger_metrics::InstrumentedStore;
use ledger_store::{MemoryTransactionStore, PgTransactionStore, TransactionStore};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use tracing::{info, warn};

// ── TOML config file ────────────────────────────────────────────────

/// Optional TOML configuration. All fields are optional — CLI args and
/// env vars take priority over values loaded from the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    database_url: Option<String>,
    store: Option<StoreKind>,
    max_connections: Option<u32>,
    log_level: Option<String>,
    listen: Option<String>,
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

// ── CLI definition ──────────────────────────────────────────────────

/// Ledger transactions service.
#[derive(Parser, Debug)]
#[command(name = "ledger", version, about)]
struct Cli {
    /// PostgreSQL connection URL. When unset, the connection is assembled
    /// from DB_HOST, DB_PORT, DB_USER, DB_PASSWORD, DB_NAME and DB_SSLMODE.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Transaction store backend.
    #[arg(long, value_enum, env = "LEDGER_STORE")]
    store: Option<StoreKind>,

    /// Maximum number of pooled database connections.
    #[arg(long, env = "LEDGER_MAX_CONNECTIONS")]
    max_connections: Option<u32>,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level filter (e.g. info, debug, warn).
    #[arg(long, env = "LEDGER_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API server.
    Serve {
        /// Listen address (host:port).
        #[arg(long, env = "LEDGER_LISTEN")]
        listen: Option<String>,
    },

    /// Connect to the store, report how many transactions it holds and exit.
    Check,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
enum StoreKind {
    #[default]
    Postgres,
    /// Process-local store; contents are lost on exit.
    Memory,
}

// ── Database settings ───────────────────────────────────────────────

/// Connection settings read from the `DB_*` environment variables.
#[derive(Debug, Default, PartialEq)]
struct DbEnv {
    host: Option<String>,
    port: Option<String>,
    user: Option<String>,
    password: Option<String>,
    name: Option<String>,
    sslmode: Option<String>,
}

impl DbEnv {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            host: var("DB_HOST"),
            port: var("DB_PORT"),
            user: var("DB_USER"),
            password: var("DB_PASSWORD"),
            name: var("DB_NAME"),
            sslmode: var("DB_SSLMODE"),
        }
    }

    fn connect_options(&self) -> Result<PgConnectOptions> {
        let mut options = PgConnectOptions::new();
        if let Some(host) = &self.host {
            options = options.host(host);
        }
        if let Some(port) = &self.port {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("invalid DB_PORT: {port}"))?;
            options = options.port(port);
        }
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(name) = &self.name {
            options = options.database(name);
        }
        if let Some(mode) = &self.sslmode {
            let mode = PgSslMode::from_str(mode)
                .with_context(|| format!("invalid DB_SSLMODE: {mode}"))?;
            options = options.ssl_mode(mode);
        }
        Ok(options)
    }
}

// ── Resolved configuration ──────────────────────────────────────────

/// Fully resolved configuration after merging CLI args, env vars, and
/// config file values. Each field has a concrete value (with defaults
/// applied) except the database URL, which falls back to `DB_*` vars.
struct Resolved {
    database_url: Option<String>,
    store: StoreKind,
    max_connections: u32,
    log_level: String,
}

impl Resolved {
    fn from_cli_and_config(cli: &Cli, config: &Config) -> Self {
        Self {
            database_url: cli
                .database_url
                .clone()
                .or_else(|| config.database_url.clone()),
            store: cli.store.or(config.store).unwrap_or_default(),
            max_connections: cli
                .max_connections
                .or(config.max_connections)
                .unwrap_or(10),
            log_level: cli
                .log_level
                .clone()
                .or_else(|| config.log_level.clone())
                .unwrap_or_else(|| "info".to_string()),
        }
    }

    fn connect_options(&self) -> Result<PgConnectOptions> {
        match &self.database_url {
            Some(url) => PgConnectOptions::from_str(url).context("invalid database URL"),
            None => DbEnv::from_env().connect_options(),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn open_store(resolved: &Resolved) -> Result<Box<dyn TransactionStore>> {
    match resolved.store {
        StoreKind::Memory => {
            warn!("using in-memory store; transactions are lost on exit");
            Ok(Box::new(InstrumentedStore::new(MemoryTransactionStore::new())))
        }
        StoreKind::Postgres => {
            let options = resolved.connect_options()?;
            let store = PgTransactionStore::connect(options, resolved.max_connections)
                .await
                .context("failed to connect to database")?;
            info!(
                max_connections = resolved.max_connections,
                "connected to database"
            );
            Ok(Box::new(InstrumentedStore::new(store)))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}

// ── Subcommand handlers ─────────────────────────────────────────────

async fn run_serve(resolved: &Resolved, config: &Config, listen: Option<String>) -> Result<()> {
    let listen_addr = listen
        .or_else(|| config.listen.clone())
        .unwrap_or_else(|| "0.0.0.0:8080".to_string());

    let store = open_store(resolved).await?;
    let state = Arc::new(ledger_api::AppState { store });
    let router = ledger_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(listen = %listen_addr, store = ?resolved.store, "starting API server");
    info!("metrics available at http://{listen_addr}/metrics");
    info!("API available at http://{listen_addr}/v1");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn run_check(resolved: &Resolved) -> Result<()> {
    let store = open_store(resolved).await?;
    let transactions = store
        .list()
        .await
        .context("failed to list transactions")?;
    info!(
        store = ?resolved.store,
        transactions = transactions.len(),
        last_id = ?transactions.last().map(|tx| tx.id),
        "store reachable"
    );
    Ok(())
}

// ── Entry point ─────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let resolved = Resolved::from_cli_and_config(&cli, &config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&resolved.log_level)
                .with_context(|| format!("invalid log level: {}", resolved.log_level))?,
        )
        .init();

    match cli.command {
        Command::Serve { listen } => run_serve(&resolved, &config, listen).await,
        Command::Check => run_check(&resolved).await,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    // ── CLI argument parsing ────────────────────────────────────────

    #[test]
    fn parse_serve_defaults() {
        let cli = Cli::try_parse_from(["ledger", "serve"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.store.is_none());
        assert!(cli.max_connections.is_none());
        match cli.command {
            Command::Serve { listen } => assert!(listen.is_none()),
            _ => panic!("expected Serve"),
        }
    }

    #[test]
    fn parse_serve_with_options() {
        let cli = Cli::try_parse_from([
            "ledger",
            "--database-url",
            "postgres://ledger:secret@db:5432/ledger",
            "--store",
            "memory",
            "--max-connections",
            "4",
            "--log-level",
            "debug",
            "serve",
            "--listen",
            "127.0.0.1:9090",
        ])
        .unwrap();

        assert_eq!(
            cli.database_url.as_deref(),
            Some("postgres://ledger:secret@db:5432/ledger")
        );
        assert_eq!(cli.store, Some(StoreKind::Memory));
        assert_eq!(cli.max_connections, Some(4));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Serve { listen } => assert_eq!(listen.as_deref(), Some("127.0.0.1:9090")),
            _ => panic!("expected Serve"),
        }
    }

    #[test]
    fn parse_check() {
        let cli = Cli::try_parse_from(["ledger", "check"]).unwrap();
        assert!(matches!(cli.command, Command::Check));
    }

    #[test]
    fn parse_unknown_store_fails() {
        assert!(Cli::try_parse_from(["ledger", "--store", "sqlite", "serve"]).is_err());
    }

    #[test]
    fn parse_missing_subcommand_fails() {
        assert!(Cli::try_parse_from(["ledger"]).is_err());
    }

    // ── Config file loading ─────────────────────────────────────────

    #[test]
    fn deserialize_full_config() {
        let toml_str = r#"
            database_url = "postgres://localhost/ledger"
            store = "memory"
            max_connections = 20
            log_level = "debug"
            listen = "127.0.0.1:9000"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/ledger"));
        assert_eq!(config.store, Some(StoreKind::Memory));
        assert_eq!(config.max_connections, Some(20));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.listen.as_deref(), Some("127.0.0.1:9000"));
    }

    #[test]
    fn deserialize_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.database_url.is_none());
        assert!(config.store.is_none());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn deserialize_unknown_store_fails() {
        assert!(toml::from_str::<Config>(r#"store = "redis""#).is_err());
    }

    // ── Config merge (Resolved) ─────────────────────────────────────

    #[test]
    fn resolved_uses_defaults() {
        let cli = Cli::try_parse_from(["ledger", "serve"]).unwrap();
        let resolved = Resolved::from_cli_and_config(&cli, &Config::default());

        assert_eq!(resolved.store, StoreKind::Postgres);
        assert_eq!(resolved.max_connections, 10);
        assert_eq!(resolved.log_level, "info");
    }

    #[test]
    fn resolved_config_file_overrides_defaults() {
        let cli = Cli::try_parse_from(["ledger", "serve"]).unwrap();
        let config = Config {
            store: Some(StoreKind::Memory),
            max_connections: Some(3),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        let resolved = Resolved::from_cli_and_config(&cli, &config);

        assert_eq!(resolved.store, StoreKind::Memory);
        assert_eq!(resolved.max_connections, 3);
        assert_eq!(resolved.log_level, "debug");
    }

    #[test]
    fn resolved_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "ledger",
            "--database-url",
            "postgres://cli-host/ledger",
            "--store",
            "postgres",
            "--log-level",
            "warn",
            "serve",
        ])
        .unwrap();
        let config = Config {
            database_url: Some("postgres://config-host/ledger".into()),
            store: Some(StoreKind::Memory),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        let resolved = Resolved::from_cli_and_config(&cli, &config);

        assert_eq!(
            resolved.database_url.as_deref(),
            Some("postgres://cli-host/ledger")
        );
        assert_eq!(resolved.store, StoreKind::Postgres);
        assert_eq!(resolved.log_level, "warn");

        let options = resolved.connect_options().unwrap();
        assert_eq!(options.get_host(), "cli-host");
        assert_eq!(options.get_database(), Some("ledger"));
    }

    #[test]
    fn resolved_rejects_bad_database_url() {
        let resolved = Resolved {
            database_url: Some("not a url".into()),
            store: StoreKind::Postgres,
            max_connections: 1,
            log_level: "info".into(),
        };
        assert!(resolved.connect_options().is_err());
    }

    // ── DB_* environment assembly ───────────────────────────────────

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn db_env_assembles_connect_options() {
        let env = DbEnv::from_lookup(lookup(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_USER", "ledger"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "transactions"),
            ("DB_SSLMODE", "disable"),
        ]));
        assert_eq!(env.host.as_deref(), Some("db.internal"));
        assert_eq!(env.sslmode.as_deref(), Some("disable"));

        let options = env.connect_options().unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "ledger");
        assert_eq!(options.get_database(), Some("transactions"));
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Disable));
    }

    #[test]
    fn db_env_treats_empty_values_as_unset() {
        let env = DbEnv::from_lookup(lookup(&[("DB_HOST", ""), ("DB_PORT", "")]));
        assert_eq!(env, DbEnv::default());
        assert!(env.connect_options().is_ok());
    }

    #[test]
    fn db_env_rejects_bad_port() {
        let env = DbEnv::from_lookup(lookup(&[("DB_PORT", "postgres")]));
        let err = env.connect_options().unwrap_err();
        assert!(err.to_string().contains("DB_PORT"));
    }

    #[test]
    fn db_env_rejects_bad_sslmode() {
        let env = DbEnv::from_lookup(lookup(&[("DB_SSLMODE", "sometimes")]));
        let err = env.connect_options().unwrap_err();
        assert!(err.to_string().contains("DB_SSLMODE"));
    }

    // ── Store bootstrap ─────────────────────────────────────────────

    #[tokio::test]
    async fn memory_store_opens_without_database() {
        let resolved = Resolved {
            database_url: None,
            store: StoreKind::Memory,
            max_connections: 1,
            log_level: "info".into(),
        };
        let store = open_store(&resolved).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_succeeds_on_memory_store() {
        let resolved = Resolved {
            database_url: None,
            store: StoreKind::Memory,
            max_connections: 1,
            log_level: "info".into(),
        };
        run_check(&resolved).await.unwrap();
    }
}
