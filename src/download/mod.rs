//! Image download service manager
//!
//! [`DownloadManager`] mirrors item icons into a local directory. Images are
//! fetched at most once: a URL whose cache file already exists is answered
//! from disk without touching the network.
//!
//! The download service runs without a rate limiter. A 429 from the image
//! host is reported as a [`Rejection`] on the service's own queue, which ends
//! its worker and abandons the remaining downloads.

pub mod icons;

pub use icons::icons_in;

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::api::http::{self, SendError};
use crate::cache::write_atomic;
use crate::metrics;
use crate::service::config::DEFAULT_RETRY_AFTER;
use crate::service::{Rejection, RejectionSink, ServiceError, ServiceManager, ServiceReply};

const OPERATION: &str = "download_image";

/// Operations understood by [`DownloadManager`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOperation {
    /// Fetch an image unless it is already cached
    Image {
        /// Absolute image URL
        url: String,
    },
}

/// Where an image ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReceipt {
    /// Local cache file
    pub path: PathBuf,
    /// `false` when the file was already present
    pub fetched: bool,
}

/// Service manager writing images into a cache directory
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: Client,
    image_dir: PathBuf,
}

impl DownloadManager {
    /// Create a manager storing images under `image_dir`
    pub fn new(client: Client, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            image_dir: image_dir.into(),
        }
    }

    /// Build a manager with a fresh client sending `user_agent`
    pub fn with_user_agent(
        user_agent: &str,
        image_dir: impl Into<PathBuf>,
    ) -> Result<Self, ServiceError> {
        Ok(Self::new(http::build_client(user_agent)?, image_dir))
    }

    /// Image cache directory
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    async fn fetch(
        &self,
        url: &str,
        rejections: &dyn RejectionSink,
    ) -> ServiceReply<DownloadReceipt> {
        let path = image_cache_path(&self.image_dir, url)?;
        if path.is_file() {
            debug!(url, "Image already cached");
            metrics::record_image_download(true);
            return Ok(DownloadReceipt {
                path,
                fetched: false,
            });
        }

        let response = match http::send(self.client.get(url), OPERATION).await {
            Ok(response) => response,
            Err(SendError::Failed(error)) => return Err(error),
            Err(SendError::TooManyRequests(headers)) => {
                let retry_after =
                    http::parse_retry_after(&headers).unwrap_or(DEFAULT_RETRY_AFTER);
                warn!(url, "Image host rejected request, aborting image downloads");
                rejections.enqueue_rejection(Rejection::new(Vec::new(), retry_after));
                return Err(ServiceError::Aborted {
                    operation: OPERATION.to_string(),
                });
            }
        };

        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Network {
                reason: e.to_string(),
                operation: OPERATION.to_string(),
            })?;
        write_atomic(&path, &body).map_err(|e| ServiceError::Io(e.to_string()))?;

        debug!(url, path = %path.display(), bytes = body.len(), "Image downloaded");
        metrics::record_image_download(false);
        Ok(DownloadReceipt {
            path,
            fetched: true,
        })
    }
}

#[async_trait]
impl ServiceManager for DownloadManager {
    type Operation = DownloadOperation;
    type Payload = DownloadReceipt;

    async fn execute(
        &self,
        operation: &DownloadOperation,
        rejections: &dyn RejectionSink,
    ) -> ServiceReply<DownloadReceipt> {
        match operation {
            DownloadOperation::Image { url } => self.fetch(url, rejections).await,
        }
    }
}

/// Local file for an image URL: `<dir>/<host>/<path segments>`.
///
/// Query strings are ignored. The last segment must carry a file extension,
/// and empty, `.` or `..` segments are refused.
pub fn image_cache_path(image_dir: &Path, url: &str) -> Result<PathBuf, ServiceError> {
    let invalid =
        |reason: &str| ServiceError::Parse(format!("invalid image URL {url:?}: {reason}"));

    let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    let host = parsed.host_str().ok_or_else(|| invalid("no host"))?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .ok_or_else(|| invalid("no path"))?
        .collect();

    if segments
        .iter()
        .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
    {
        return Err(invalid("unsafe path segment"));
    }
    let file_name = segments.last().ok_or_else(|| invalid("no file name"))?;
    if Path::new(file_name).extension().is_none() {
        return Err(invalid("no file extension"));
    }

    let mut path = image_dir.join(host);
    path.extend(segments);
    Ok(path)
}
