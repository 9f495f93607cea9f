use crate::config::{RuntimeConfig, ServerConfig};
use crate::demo::{self, Guestbook};
use crate::dispatcher::Dispatcher;
use crate::registry::Components;
use crate::resources::StaticFiles;
use crate::router::RouteTable;
use crate::server::{AppService, HttpServer};
use crate::session::SessionStore;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Command-line interface for brrtserve
#[derive(Parser, Debug)]
#[command(name = "brrtserve")]
#[command(about = "Coroutine HTTP application server", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the server
    Serve {
        /// Path to the YAML configuration file
        #[arg(short, long, env = "BRRTS_CONFIG")]
        config: Option<PathBuf>,

        /// Address and port to bind the server to
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print the route table in match order
    Routes {
        /// Path to the YAML configuration file
        #[arg(short, long, env = "BRRTS_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Read the config file (or defaults), then apply environment overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

/// Assemble the dispatcher for the guestbook application from `config`.
///
/// # Errors
///
/// Fails if the connection pool cannot be created or a route does not compile.
pub fn build_dispatcher(config: &ServerConfig) -> Result<Dispatcher> {
    let pool_config = config.datasource.clone().unwrap_or_default();
    let guestbook = Guestbook::new(pool_config).context("Failed to create guestbook pool")?;
    let mut components = Components::new();
    components.register(guestbook);

    let mut routes = RouteTable::new();
    for def in demo::routes() {
        routes.register(def)?;
    }

    info!(
        components = ?components.names(),
        routes = routes.len(),
        "Dispatcher assembled"
    );
    let mut dispatcher = Dispatcher::new(
        Arc::new(routes),
        Arc::new(SessionStore::new()),
        Arc::new(components),
        config.dispatcher_config(),
    );
    for handler in demo::exception_handlers() {
        dispatcher.add_exception_handler(handler);
    }
    if let Some(dir) = &config.public_dir {
        dispatcher.set_project_resources(Arc::new(StaticFiles::new(dir)));
    }
    if let Some(dir) = &config.static_dir {
        dispatcher.set_static_resources(Arc::new(StaticFiles::new(dir)));
    }
    Ok(dispatcher)
}

/// Execute the parsed command.
///
/// # Errors
///
/// Returns an error if:
/// - The configuration cannot be loaded
/// - The dispatcher cannot be assembled
/// - The listener fails to bind or the server coroutine panics
pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { config, addr } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(addr) = addr {
                config.addr = addr;
            }

            let runtime = RuntimeConfig::from_env();
            may::config().set_stack_size(runtime.stack_size);
            info!(stack_size = runtime.stack_size, "Coroutine runtime configured");

            let dispatcher = build_dispatcher(&config)?;
            let service = AppService::new(Arc::new(dispatcher), config.codec.clone());
            let handle = HttpServer(service)
                .start(config.addr.as_str())
                .with_context(|| format!("Failed to bind {}", config.addr))?;
            info!(addr = %handle.addr(), "brrtserve listening");
            handle
                .join()
                .map_err(|e| anyhow!("server coroutine panicked: {e:?}"))?;
            Ok(())
        }
        Commands::Routes { config } => {
            let config = load_config(config.as_deref())?;
            let dispatcher = build_dispatcher(&config)?;
            for line in dispatcher.routes().describe() {
                println!("{line}");
            }
            Ok(())
        }
    }
}
