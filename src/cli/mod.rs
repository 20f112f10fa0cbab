//! Command line front end
//!
//! The CLI is the caller of the request services: it enqueues calls tagged
//! with a [`CallContext`], reads completed results back, and routes them by
//! context into the cache and the saved state.

pub mod error;
pub mod import;
pub mod list;
pub mod session;

pub use error::CliError;
pub use import::ImportArgs;
pub use list::LeagueArgs;
pub use session::{ApiService, CallContext, DownloadService};

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::api::endpoints::{DEFAULT_API_BASE, DEFAULT_WEB_BASE};
use crate::api::http::default_user_agent;
use crate::api::{ApiEndpoints, Credentials};
use crate::cache::StashCache;
use crate::service::WorkerConfig;

/// Stash fetcher CLI
#[derive(Parser, Debug)]
#[command(name = "stash-fetcher")]
#[command(about = "Fetch and cache stash tabs, characters and item images", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Account name
    #[arg(long, global = true, env = "POE_ACCOUNT")]
    pub account: Option<String>,

    /// Session id used for account requests
    #[arg(long, global = true, env = "POESESSID", hide_env_values = true)]
    pub poesessid: Option<String>,

    /// Cache directory for tabs, characters and saved state
    #[arg(long, global = true, default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Image cache directory (default: <cache-dir>/images)
    #[arg(long, global = true)]
    pub image_dir: Option<PathBuf>,

    /// Base URL of the JSON API
    #[arg(long, global = true, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Base URL of the website serving account data
    #[arg(long, global = true, default_value = DEFAULT_WEB_BASE)]
    pub web_base: String,

    /// User-Agent header sent with every request
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Maximum rate-limit rejections in a row before a request is dropped (range: 1-20)
    #[arg(
        long,
        global = true,
        default_value = "5",
        value_parser = clap::value_parser!(u32).range(1..=20)
    )]
    pub max_retries: u32,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List current leagues
    Leagues,

    /// List the stash tabs of an account in a league
    Tabs(LeagueArgs),

    /// List the characters of an account in a league
    Characters(LeagueArgs),

    /// Fetch tabs, characters and item images into the cache
    Import(ImportArgs),
}

impl Cli {
    /// Run the selected command
    pub async fn execute(&self) -> Result<(), CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)
                .await
                .map_err(|e| CliError::ConfigurationError(e.to_string()))?;
        }

        match &self.command {
            Commands::Leagues => list::leagues(self).await,
            Commands::Tabs(args) => list::tabs(self, args).await,
            Commands::Characters(args) => list::characters(self, args).await,
            Commands::Import(args) => args.execute(self).await,
        }
    }

    /// Account name and session id, both required for account requests
    pub fn credentials(&self) -> Result<Credentials, CliError> {
        let account = self
            .account
            .clone()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| CliError::InvalidArgument("--account is required".to_string()))?;
        let poesessid = self
            .poesessid
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CliError::InvalidArgument("--poesessid is required".to_string()))?;
        Ok(Credentials::new(account, poesessid))
    }

    /// Configured API endpoints
    pub fn endpoints(&self) -> ApiEndpoints {
        ApiEndpoints::new(self.api_base.as_str(), self.web_base.as_str())
    }

    /// User-Agent header value
    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(default_user_agent)
    }

    /// Item and state cache
    pub fn cache(&self) -> StashCache {
        StashCache::new(&self.cache_dir)
    }

    /// Image cache directory
    pub fn image_dir(&self) -> PathBuf {
        self.image_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("images"))
    }

    /// Settings for the API worker
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_rejection_retries: Some(self.max_retries),
        }
    }
}
