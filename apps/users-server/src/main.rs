#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod api;
mod model;
mod store;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use restkit::{AppConfig, AxumServer, RouterConfig, build_router, serve_until_signal};

use crate::store::{InMemoryUsers, UsersRepository};

/// Users Server - in-memory users resource served through the restkit pipeline
#[derive(Parser, Debug)]
#[command(name = "users-server")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for the HTTP listener (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(port) = self.port {
            let mut addr: SocketAddr = config
                .server
                .bind_addr
                .parse()
                .with_context(|| format!("invalid bind address '{}'", config.server.bind_addr))?;
            addr.set_port(port);
            config.server.bind_addr = addr.to_string();
        }
        match self.verbose {
            0 => {}
            1 => "info".clone_into(&mut config.logging.level),
            2 => "debug".clone_into(&mut config.logging.level),
            _ => "trace".clone_into(&mut config.logging.level),
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config)?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    restkit::init_logging(&config.logging);
    tracing::info!(bind_addr = %config.server.bind_addr, "Users server starting");

    let repo: Arc<dyn UsersRepository> = Arc::new(InMemoryUsers::new());
    let router = build_router(
        api::endpoints(&repo, &config.server),
        &RouterConfig::default(),
    )?;

    let server = Arc::new(AxumServer::bind(config.server.bind_addr.as_str(), router).await?);
    serve_until_signal(server, config.server.shutdown_timeout()).await?;

    tracing::info!("Users server stopped");
    Ok(())
}
