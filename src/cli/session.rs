//! Service wiring for CLI commands

use tracing::{info, warn};

use super::{Cli, CliError};
use crate::api::{api_rate_limiter, ApiManager, ApiOperation, ApiPayload};
use crate::download::DownloadManager;
use crate::service::{Completed, ResultReceiver, Service, WorkerConfig, WorkerExit};

/// Where a completed API result should be routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallContext {
    /// League listing
    Leagues,
    /// Tab listing of the selected league
    TabInfo,
    /// Contents of one tab
    Tab {
        /// Tab index
        index: u32,
    },
    /// Character listing of the selected league
    CharacterList,
    /// Items of one character
    Character {
        /// Character name
        name: String,
    },
    /// Jewels of one character
    Jewels {
        /// Character name
        name: String,
    },
}

/// Rate-limited web API service
pub type ApiService = Service<ApiManager, CallContext>;

/// Unlimited image download service
pub type DownloadService = Service<DownloadManager, ()>;

/// A running API service and its result channel
pub struct ApiSession {
    service: ApiService,
    results: ResultReceiver<ApiManager, CallContext>,
}

impl ApiSession {
    /// Start the API worker configured from the command line
    pub fn start(cli: &Cli) -> Result<Self, CliError> {
        let manager = ApiManager::with_user_agent(&cli.user_agent(), cli.endpoints())?;
        let (service, results) = Service::spawn(
            "api",
            manager,
            Some(api_rate_limiter()),
            cli.worker_config(),
        );
        Ok(Self { service, results })
    }

    /// The running service
    pub fn service(&self) -> &ApiService {
        &self.service
    }

    /// Enqueue a call
    pub fn call(&self, operation: ApiOperation, context: CallContext) {
        self.service.call(operation, context);
    }

    /// Next completed call, `None` once the worker has stopped
    pub async fn next_result(
        &mut self,
    ) -> Option<Completed<ApiOperation, CallContext, ApiPayload>> {
        self.results.recv().await
    }

    /// Send one call and wait for its final result, sitting out rate-limit retries
    pub async fn request(
        &mut self,
        operation: ApiOperation,
        context: CallContext,
    ) -> Result<ApiPayload, CliError> {
        self.call(operation, context);
        while let Some(completed) = self.results.recv().await {
            if completed.will_retry() {
                if let Err(error) = &completed.reply {
                    info!(%error, "Request queued again");
                }
                continue;
            }
            return completed.reply.map_err(CliError::from);
        }
        Err(CliError::ServiceStopped(self.service.name().to_string()))
    }

    /// Drain the queue and stop the worker
    pub async fn finish(self) -> Result<WorkerExit, CliError> {
        let exit = self.service.shutdown().await?;
        if exit != WorkerExit::Shutdown {
            warn!(?exit, "API worker ended abnormally");
        }
        Ok(exit)
    }

    /// Stop the worker without serving what is still queued
    pub fn abort(self) {
        self.service.abort();
    }
}

/// Start the image download worker configured from the command line
pub fn spawn_downloads(
    cli: &Cli,
) -> Result<(DownloadService, ResultReceiver<DownloadManager, ()>), CliError> {
    let manager = DownloadManager::with_user_agent(&cli.user_agent(), cli.image_dir())?;
    Ok(Service::spawn(
        "download",
        manager,
        None,
        WorkerConfig::default(),
    ))
}
