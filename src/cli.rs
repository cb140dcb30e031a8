use clap::{Parser, Subcommand};

use crate::config::{AppConfig, ConfigError, StoreBackend};

#[derive(Debug, Parser)]
#[command(name = "skillverse-api")]
#[command(about = "SkillVerse course marketplace API server")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Port to listen on (overrides PORT)")]
    pub port: Option<u16>,

    #[arg(long, global = true, help = "Address to bind (overrides HOST)")]
    pub host: Option<String>,

    #[arg(long, global = true, help = "Document store backend: memory or postgres")]
    pub store: Option<StoreBackend>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    #[command(about = "Run the HTTP server (default)")]
    Serve,

    #[command(about = "Print the effective configuration as JSON, secrets omitted")]
    Config,

    #[command(about = "Create store tables and unique indexes, then exit")]
    Migrate,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }

    /// Apply command-line overrides on top of the environment-derived config.
    pub fn apply(&self, mut config: AppConfig) -> Result<AppConfig, ConfigError> {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(store) = self.store {
            config.database.backend = store;
        }
        config.validate()?;
        Ok(config)
    }
}
