use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use maegashira::config::loader::load_routing_table;
use maegashira::config::schema::ProxyConfig;
use maegashira::discovery::DiscoveryStrategy;
use maegashira::lifecycle::{Shutdown, ShutdownReason};
use maegashira::observability::logging;
use maegashira::Primary;

#[derive(Parser)]
#[command(name = "maegashira", version)]
#[command(about = "Dynamic HTTP reverse proxy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy cluster
    Start(StartArgs),
    /// Validate a routing-table file and exit
    Check {
        /// Path to the routing-table JSON file
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Args)]
struct StartArgs {
    /// Public listener hostname
    #[arg(long, env = "MAEGASHIRA_HOSTNAME", default_value = "0.0.0.0")]
    hostname: String,

    /// Public listener port
    #[arg(long, env = "MAEGASHIRA_PORT", default_value_t = 8080)]
    port: u16,

    /// Routing-table JSON file loaded at startup
    #[arg(long)]
    file: Option<PathBuf>,

    /// Worker count (0 = one per available core)
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Enable clustering (transactions go to the Redis queue)
    #[arg(long, env = "MAEGASHIRA_CLUSTERING", default_value_t = false)]
    clustering: bool,

    #[arg(long, env = "MAEGASHIRA_REDIS_HOST", default_value = "127.0.0.1")]
    redis_host: String,

    #[arg(long, env = "MAEGASHIRA_REDIS_PORT", default_value_t = 6379)]
    redis_port: u16,

    #[arg(long, env = "MAEGASHIRA_REDIS_PASSWORD")]
    redis_password: Option<String>,

    /// Enable the management API
    #[arg(long, env = "MAEGASHIRA_API_ENABLED", default_value_t = true)]
    api_enabled: bool,

    #[arg(long, env = "MAEGASHIRA_API_HOSTNAME", default_value = "127.0.0.1")]
    api_hostname: String,

    #[arg(long, env = "MAEGASHIRA_API_PORT", default_value_t = 8081)]
    api_port: u16,

    /// Bearer key protecting the routing-table endpoints
    #[arg(long, env = "MAEGASHIRA_API_KEY", default_value = "change-me")]
    api_key: String,

    /// Service-discovery strategy (none, docker)
    #[arg(long, default_value_t = DiscoveryStrategy::None)]
    discovery: DiscoveryStrategy,

    /// Discovery poll interval in milliseconds
    #[arg(long, default_value_t = 10_000)]
    discovery_refresh_ms: u64,

    /// Default upstream deadline in milliseconds
    #[arg(long, env = "MAEGASHIRA_TIMEOUT", default_value_t = 5000)]
    timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MAEGASHIRA_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl StartArgs {
    fn into_config(self) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listener.hostname = self.hostname;
        config.listener.port = self.port;
        config.listener.workers = self.workers;
        config.cluster.clustering = self.clustering;
        config.cluster.redis.host = self.redis_host;
        config.cluster.redis.port = self.redis_port;
        config.cluster.redis.password = self.redis_password;
        config.api.enabled = self.api_enabled;
        config.api.hostname = self.api_hostname;
        config.api.port = self.api_port;
        config.api.key = self.api_key;
        config.discovery.strategy = self.discovery;
        config.discovery.refresh_interval_ms = self.discovery_refresh_ms;
        config.timeout_ms = self.timeout;
        config.log_level = self.log_level;
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file } => match load_routing_table(&file) {
            Ok(table) => {
                println!("OK: {} route(s)", table.len());
                Ok(())
            }
            Err(maegashira::ProxyError::InvalidRoutingTable(errors)) => {
                eprintln!("Invalid routing table:");
                for error in errors {
                    eprintln!("  {error}");
                }
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        Commands::Start(args) => {
            let file = args.file.clone();
            let config = args.into_config();
            logging::init(&config.log_level);

            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                address = %config.public_addr(),
                api_enabled = config.api.enabled,
                clustering = config.cluster.clustering,
                "Maegashira starting"
            );

            let primary = Primary::new(config);

            // An invalid inline table is fatal before anything binds.
            if let Some(path) = file {
                let table = load_routing_table(&path)?;
                tracing::info!(file = %path.display(), routes = table.len(), "Routing table loaded");
                primary.store().set(table)?;
            }

            spawn_signal_listener(primary.shutdown_handle());
            primary.run().await?;
            Ok(())
        }
    }
}

/// Translate SIGINT/SIGTERM into the cluster shutdown signal.
fn spawn_signal_listener(shutdown: Shutdown) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut terminate =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to install SIGTERM handler");
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("Shutdown signal received");
        shutdown.trigger(ShutdownReason::Signal);
    });
}
