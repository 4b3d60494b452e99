//! Daemon configuration: environment variables overridden by CLI flags.

use std::path::PathBuf;

use clap::Parser;
use dbal_core::ClientConfig;

/// Command-line interface of the daemon binary.
#[derive(Debug, Parser)]
#[command(
    name = "dbald",
    about = "DBAL daemon - database abstraction layer server",
    after_help = "Environment variables (overridden by CLI args):\n  \
        DBAL_BIND_ADDRESS  Bind address\n  \
        DBAL_PORT          Port number\n  \
        DBAL_MODE          Run mode (production/development)\n  \
        DBAL_CONFIG        Configuration file path\n  \
        DBAL_DAEMON        Run in daemon mode (true/false)\n  \
        DBAL_LOG_LEVEL     Log level (trace/debug/info/warn/error)"
)]
pub struct Cli {
    /// Configuration file
    #[arg(long)]
    pub config: Option<String>,
    /// Bind address (default: 127.0.0.1)
    #[arg(long)]
    pub bind: Option<String>,
    /// Port number (default: 8080)
    #[arg(long)]
    pub port: Option<u16>,
    /// Run mode: production or development
    #[arg(long)]
    pub mode: Option<String>,
    /// Run in daemon mode
    #[arg(long, short = 'd')]
    pub daemon: bool,
}

/// Process-level settings of the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub bind_address: String,
    pub port: u16,
    pub development_mode: bool,
    pub config_file: String,
    pub daemon_mode: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            development_mode: false,
            config_file: "config.yaml".to_string(),
            daemon_mode: false,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(bind) = env_var("DBAL_BIND_ADDRESS") {
            config.bind_address = bind;
        }
        if let Some(port) = env_var("DBAL_PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(mode) = env_var("DBAL_MODE") {
            config.development_mode = mode == "development" || mode == "dev";
        }
        if let Some(file) = env_var("DBAL_CONFIG") {
            config.config_file = file;
        }
        if let Some(daemon) = env_var("DBAL_DAEMON") {
            config.daemon_mode = matches!(daemon.as_str(), "true" | "1" | "yes");
        }

        config
    }

    /// CLI arguments override whatever the environment provided.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(config) = &cli.config {
            self.config_file = config.clone();
        }
        if let Some(bind) = &cli.bind {
            self.bind_address = bind.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(mode) = &cli.mode {
            self.development_mode = mode == "development" || mode == "dev";
        }
        if cli.daemon {
            self.daemon_mode = true;
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Client configuration for the initial adapter.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            mode: if self.development_mode { "development" } else { "production" }.to_string(),
            adapter: env_var("DBAL_ADAPTER").unwrap_or_else(|| "sqlite".to_string()),
            endpoint: env_var("DBAL_ENDPOINT").unwrap_or_default(),
            database_url: env_var("DBAL_DATABASE_URL")
                .or_else(|| env_var("DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://:memory:".to_string()),
            sandbox_enabled: true,
        }
    }
}

/// Everything the request-serving state needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub client: ClientConfig,
    /// Printable listen address, reported by `/status`.
    pub address: String,
    /// Admin bearer token; `None` disables the admin endpoints.
    pub admin_token: Option<String>,
    pub cors_origin: String,
    pub schema_registry_path: PathBuf,
    pub packages_path: PathBuf,
    pub schema_output_path: PathBuf,
    pub seed_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env(daemon: &DaemonConfig) -> Self {
        Self {
            client: daemon.client_config(),
            address: daemon.address(),
            admin_token: env_var("DBAL_ADMIN_TOKEN"),
            cors_origin: env_var("DBAL_CORS_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            schema_registry_path: env_var("DBAL_SCHEMA_REGISTRY_PATH")
                .unwrap_or_else(|| "/app/prisma/schema-registry.json".to_string())
                .into(),
            packages_path: env_var("DBAL_PACKAGES_PATH")
                .unwrap_or_else(|| "/app/packages".to_string())
                .into(),
            schema_output_path: env_var("DBAL_PRISMA_OUTPUT_PATH")
                .unwrap_or_else(|| "/app/prisma/generated-from-packages.prisma".to_string())
                .into(),
            seed_dir: env_var("DBAL_SEED_DIR").map(PathBuf::from),
        }
    }
}
