//! Import command: fetch a league's tabs and characters into the cache
//!
//! The import starts with the tab and character listings, then plans one
//! call per tab and two per character (items and jewels) from those
//! listings. Entries already in the cache are skipped unless `--force` is
//! given. Every stored document has its item icons queued on the download
//! service, which is drained after the API work is done.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use tracing::{debug, error, info, warn};

use super::session::{spawn_downloads, ApiSession, CallContext, DownloadService};
use super::{Cli, CliError};
use crate::api::{ApiOperation, ApiPayload, Credentials, StashTabInfo};
use crate::cache::{CacheEntry, SavedState, StashCache};
use crate::download::{icons_in, DownloadManager, DownloadOperation};
use crate::service::{Call, Completed, ResultReceiver, WorkerExit};

/// Arguments for the import command
#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// League name (e.g., Standard)
    #[arg(long)]
    pub league: String,

    /// Only import these tab indices (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub tabs: Vec<u32>,

    /// Skip characters and their jewels
    #[arg(long, default_value_t = false)]
    pub no_characters: bool,

    /// Skip item image downloads
    #[arg(long, default_value_t = false)]
    pub no_images: bool,

    /// Fetch entries again even if they are already cached
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

/// Outcome counts of one import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Tabs stored
    pub tabs: usize,
    /// Characters stored
    pub characters: usize,
    /// Jewel documents stored
    pub jewels: usize,
    /// Entries skipped because they were cached
    pub skipped: usize,
    /// API requests or cache writes that failed
    pub failed: usize,
    /// Images downloaded
    pub images_fetched: usize,
    /// Images already present
    pub images_cached: usize,
    /// Image downloads that failed
    pub images_failed: usize,
    /// The image host rate limited the import and remaining images were skipped
    pub images_aborted: bool,
    /// Ctrl+C stopped the import early
    pub interrupted: bool,
}

impl ImportArgs {
    /// Execute the import and print a summary
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let summary = self.run(cli, interrupt).await?;
        print_summary(&self.league, &summary);
        Ok(())
    }

    /// Run the import until done or until `interrupt` resolves
    pub async fn run<F>(&self, cli: &Cli, interrupt: F) -> Result<ImportSummary, CliError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let credentials = cli.credentials()?;
        let cache = cli.cache();
        let state_path = cache.state_path();
        let mut state = SavedState::load_or_default(&state_path)?;

        let mut api = ApiSession::start(cli)?;
        let downloads = if self.no_images {
            None
        } else {
            Some(spawn_downloads(cli)?)
        };

        let mut import = Import {
            args: self,
            credentials,
            cache,
            state: &mut state,
            downloads: downloads.as_ref().map(|(service, _)| service),
            progress: create_progress_bar(&format!("Importing {}", self.league)),
            outstanding: 0,
            images_queued: 0,
            summary: ImportSummary::default(),
        };

        import.begin(&api);
        import.drive(&mut api, &mut interrupt).await;
        import.progress.finish_and_clear();
        let images_queued = import.images_queued;
        let mut summary = import.summary;

        if summary.interrupted {
            warn!("Import interrupted, saving progress");
            api.abort();
            if let Some((service, _)) = downloads {
                service.abort();
            }
        } else {
            api.finish().await?;
            if let Some((service, results)) = downloads {
                drain_downloads(service, results, images_queued, &mut summary, &mut interrupt)
                    .await?;
            }
        }

        state.save(&state_path)?;
        info!(league = %self.league, ?summary, "Import finished");
        Ok(summary)
    }
}

/// State of one running import
struct Import<'a> {
    args: &'a ImportArgs,
    credentials: Credentials,
    cache: StashCache,
    state: &'a mut SavedState,
    downloads: Option<&'a DownloadService>,
    progress: ProgressBar,
    outstanding: usize,
    images_queued: usize,
    summary: ImportSummary,
}

impl Import<'_> {
    fn begin(&mut self, api: &ApiSession) {
        self.request(
            api,
            ApiOperation::TabInfo {
                credentials: self.credentials.clone(),
                league: self.args.league.clone(),
            },
            CallContext::TabInfo,
        );
        if !self.args.no_characters {
            self.request(
                api,
                ApiOperation::CharacterList {
                    credentials: self.credentials.clone(),
                    league: self.args.league.clone(),
                },
                CallContext::CharacterList,
            );
        }
    }

    async fn drive<F>(&mut self, api: &mut ApiSession, interrupt: &mut std::pin::Pin<&mut F>)
    where
        F: Future<Output = ()>,
    {
        while self.outstanding > 0 {
            tokio::select! {
                biased;
                _ = interrupt.as_mut() => {
                    self.summary.interrupted = true;
                    break;
                }
                completed = api.next_result() => match completed {
                    Some(completed) => self.route(api, completed),
                    None => {
                        warn!(
                            outstanding = self.outstanding,
                            "API worker stopped with requests outstanding"
                        );
                        self.summary.failed += self.outstanding;
                        break;
                    }
                },
            }
        }
    }

    fn request(&mut self, api: &ApiSession, operation: ApiOperation, context: CallContext) {
        api.call(operation, context);
        self.outstanding += 1;
        self.progress.inc_length(1);
    }

    fn route(
        &mut self,
        api: &ApiSession,
        completed: Completed<ApiOperation, CallContext, ApiPayload>,
    ) {
        if completed.will_retry() {
            debug!(operation = completed.operation.name(), "Request will be retried");
            return;
        }
        self.outstanding -= 1;
        self.progress.inc(1);

        let Completed {
            operation,
            context,
            reply,
        } = completed;
        let payload = match reply {
            Ok(payload) => payload,
            Err(error) => {
                warn!(operation = operation.name(), %error, "Request failed");
                self.summary.failed += 1;
                return;
            }
        };

        match (context, payload) {
            (CallContext::TabInfo, ApiPayload::TabInfo(info)) => self.plan_tabs(api, info),
            (CallContext::CharacterList, ApiPayload::Characters(names)) => {
                self.plan_characters(api, names)
            }
            (CallContext::Tab { index }, ApiPayload::Tab(document)) => {
                if self.store(CacheEntry::Tab(index), &document) {
                    self.summary.tabs += 1;
                }
            }
            (CallContext::Character { name }, ApiPayload::Character(document)) => {
                if self.store(CacheEntry::Character(name), &document) {
                    self.summary.characters += 1;
                }
            }
            (CallContext::Jewels { name }, ApiPayload::Jewels(document)) => {
                if self.store(CacheEntry::Jewels(name), &document) {
                    self.summary.jewels += 1;
                }
            }
            (context, _) => {
                error!(?context, operation = operation.name(), "Unexpected payload");
                self.summary.failed += 1;
            }
        }
    }

    fn plan_tabs(&mut self, api: &ApiSession, info: StashTabInfo) {
        info!(league = %self.args.league, tabs = info.num_tabs, "Received tab listing");
        let indices: Vec<u32> = if self.args.tabs.is_empty() {
            (0..info.num_tabs).collect()
        } else {
            self.args
                .tabs
                .iter()
                .copied()
                .filter(|index| *index < info.num_tabs)
                .collect()
        };
        self.state
            .account_mut(&self.credentials.account)
            .league_mut(&self.args.league)
            .tabs = info.tabs;

        for index in indices {
            if self.is_cached(&CacheEntry::Tab(index)) {
                continue;
            }
            self.request(
                api,
                ApiOperation::TabItems {
                    credentials: self.credentials.clone(),
                    league: self.args.league.clone(),
                    tab_index: index,
                },
                CallContext::Tab { index },
            );
        }
    }

    fn plan_characters(&mut self, api: &ApiSession, names: Vec<String>) {
        info!(league = %self.args.league, characters = names.len(), "Received character listing");
        self.state
            .account_mut(&self.credentials.account)
            .league_mut(&self.args.league)
            .character_names = names.clone();

        for name in names {
            if !self.is_cached(&CacheEntry::Character(name.clone())) {
                self.request(
                    api,
                    ApiOperation::CharacterItems {
                        credentials: self.credentials.clone(),
                        character: name.clone(),
                    },
                    CallContext::Character { name: name.clone() },
                );
            }
            if !self.is_cached(&CacheEntry::Jewels(name.clone())) {
                self.request(
                    api,
                    ApiOperation::CharacterJewels {
                        credentials: self.credentials.clone(),
                        character: name.clone(),
                    },
                    CallContext::Jewels { name },
                );
            }
        }
    }

    fn is_cached(&mut self, entry: &CacheEntry) -> bool {
        if self.args.force
            || !self
                .cache
                .contains(&self.credentials.account, &self.args.league, entry)
        {
            return false;
        }
        debug!(?entry, "Already cached, skipping");
        self.summary.skipped += 1;
        true
    }

    /// Cache a document and queue its icons; `false` if the write failed
    fn store(&mut self, entry: CacheEntry, document: &serde_json::Value) -> bool {
        if let Err(e) = self.cache.store(
            &self.credentials.account,
            &self.args.league,
            &entry,
            document,
        ) {
            error!(?entry, error = %e, "Failed to cache document");
            self.summary.failed += 1;
            return false;
        }

        if let Some(downloads) = self.downloads {
            let icons = icons_in(document);
            self.images_queued += icons.len();
            downloads.enqueue(
                icons
                    .into_iter()
                    .map(|url| Call::detached(DownloadOperation::Image { url })),
            );
        }
        true
    }
}

/// Serve the queued image downloads and count their outcomes
async fn drain_downloads<F>(
    service: DownloadService,
    mut results: ResultReceiver<DownloadManager, ()>,
    images_queued: usize,
    summary: &mut ImportSummary,
    interrupt: &mut std::pin::Pin<&mut F>,
) -> Result<(), CliError>
where
    F: Future<Output = ()>,
{
    let progress = create_progress_bar("Downloading images");
    progress.set_length(images_queued as u64);
    service.request_shutdown();

    loop {
        tokio::select! {
            completed = results.recv() => {
                let Some(completed) = completed else { break };
                progress.inc(1);
                match completed.reply {
                    Ok(receipt) if receipt.fetched => summary.images_fetched += 1,
                    Ok(_) => summary.images_cached += 1,
                    Err(error) => {
                        debug!(%error, operation = ?completed.operation, "Image download failed");
                        summary.images_failed += 1;
                    }
                }
            }
            _ = interrupt.as_mut() => {
                progress.finish_and_clear();
                summary.interrupted = true;
                service.abort();
                return Ok(());
            }
        }
    }
    progress.finish_and_clear();

    if service.join().await? == WorkerExit::UnlimitedRejection {
        summary.images_aborted = true;
    }
    Ok(())
}

fn print_summary(league: &str, summary: &ImportSummary) {
    if summary.interrupted {
        println!("\nImport of {league} interrupted");
    } else {
        println!("\nImport of {league} completed");
    }
    println!("Tabs: {}", summary.tabs);
    println!("Characters: {}", summary.characters);
    println!("Jewels: {}", summary.jewels);
    if summary.skipped > 0 {
        println!("Skipped (cached): {}", summary.skipped);
    }
    println!(
        "Images: {} downloaded, {} cached",
        summary.images_fetched, summary.images_cached
    );
    if summary.images_aborted {
        println!("Image downloads aborted after the image host rate limited us");
    }
    if summary.failed > 0 || summary.images_failed > 0 {
        eprintln!(
            "Failures: {} requests, {} images",
            summary.failed, summary.images_failed
        );
    }
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    let template =
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";
    if let Ok(style) = ProgressStyle::default_bar().template(template) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}
