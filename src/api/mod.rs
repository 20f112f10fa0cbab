//! Web API service manager
//!
//! [`ApiManager`] performs the account and league requests queued on the API
//! service. Item JSON is returned untouched; only the listings the caller
//! needs to plan further requests (leagues, tabs, characters) are decoded.
//!
//! Requests that read private account data are "elevated": they carry the
//! session id as the `POESESSID` cookie.

pub mod endpoints;
pub mod http;

pub use endpoints::ApiEndpoints;

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{error, info, warn};

use crate::service::config::DEFAULT_API_RATE_LIMITS;
use crate::service::{RateLimiter, RejectionSink, ServiceError, ServiceManager, ServiceReply};
use http::SendError;

/// Rate limiter seeded with the default web API quota
pub fn api_rate_limiter() -> RateLimiter {
    RateLimiter::new(&DEFAULT_API_RATE_LIMITS)
}

/// Account name plus session id for elevated requests
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name
    pub account: String,
    /// Session id cookie value
    pub poesessid: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(account: impl Into<String>, poesessid: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            poesessid: poesessid.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("poesessid", &"<redacted>")
            .finish()
    }
}

/// Operations understood by [`ApiManager`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiOperation {
    /// Current main leagues
    Leagues,
    /// Number of stash tabs and their listing
    TabInfo {
        /// Account and session
        credentials: Credentials,
        /// League to inspect
        league: String,
    },
    /// Items of one stash tab
    TabItems {
        /// Account and session
        credentials: Credentials,
        /// League of the tab
        league: String,
        /// Tab index
        tab_index: u32,
    },
    /// Names of the account's characters in a league
    CharacterList {
        /// Account and session
        credentials: Credentials,
        /// League to filter on
        league: String,
    },
    /// Items worn or carried by a character
    CharacterItems {
        /// Account and session
        credentials: Credentials,
        /// Character name
        character: String,
    },
    /// Jewels socketed in a character's passive tree
    CharacterJewels {
        /// Account and session
        credentials: Credentials,
        /// Character name
        character: String,
    },
    /// Public HTML page of a unique collection sub-tab
    UniqueSubtab {
        /// Account name
        account: String,
        /// Public stash id
        uid: String,
        /// Sub-tab index
        tab_index: u32,
    },
}

impl ApiOperation {
    /// Stable operation name used in logs, metrics and error messages
    pub fn name(&self) -> &'static str {
        match self {
            ApiOperation::Leagues => "get_leagues",
            ApiOperation::TabInfo { .. } => "get_tab_info",
            ApiOperation::TabItems { .. } => "get_tab_items",
            ApiOperation::CharacterList { .. } => "get_character_list",
            ApiOperation::CharacterItems { .. } => "get_character_items",
            ApiOperation::CharacterJewels { .. } => "get_character_jewels",
            ApiOperation::UniqueSubtab { .. } => "get_unique_subtab",
        }
    }
}

/// One entry of the stash tab listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabListing {
    /// Tab name
    #[serde(rename = "n")]
    pub name: String,
    /// Tab index
    #[serde(rename = "i")]
    pub index: u32,
    /// Tab id
    #[serde(default)]
    pub id: String,
    /// Tab type (normal, premium, currency, unique, ...)
    #[serde(rename = "type", default)]
    pub tab_type: String,
}

/// Stash summary returned for tab index 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashTabInfo {
    /// Number of tabs in the league
    #[serde(rename = "numTabs")]
    pub num_tabs: u32,
    /// Tab listing
    #[serde(default)]
    pub tabs: Vec<TabListing>,
}

#[derive(Debug, Deserialize)]
struct LeagueEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CharacterEntry {
    name: String,
    #[serde(default)]
    league: String,
}

/// Successful result of an [`ApiOperation`]
#[derive(Debug, Clone, PartialEq)]
pub enum ApiPayload {
    /// League ids
    Leagues(Vec<String>),
    /// Stash summary
    TabInfo(StashTabInfo),
    /// Raw stash tab JSON
    Tab(Value),
    /// Character names in the requested league
    Characters(Vec<String>),
    /// Raw character JSON
    Character(Value),
    /// Raw passive tree JSON
    Jewels(Value),
    /// Unique sub-tab page body
    UniqueSubtab(String),
}

/// Service manager for the web API
#[derive(Debug, Clone)]
pub struct ApiManager {
    client: Client,
    endpoints: ApiEndpoints,
}

impl ApiManager {
    /// Create a manager using `client` for all requests
    pub fn new(client: Client, endpoints: ApiEndpoints) -> Self {
        Self { client, endpoints }
    }

    /// Build a manager with a fresh client sending `user_agent`
    pub fn with_user_agent(
        user_agent: &str,
        endpoints: ApiEndpoints,
    ) -> Result<Self, ServiceError> {
        Ok(Self::new(http::build_client(user_agent)?, endpoints))
    }

    /// Endpoints this manager talks to
    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    fn elevated(&self, url: String, credentials: &Credentials) -> RequestBuilder {
        self.client
            .get(url)
            .header(COOKIE, format!("POESESSID={}", credentials.poesessid))
    }

    fn stash_request(
        &self,
        credentials: &Credentials,
        league: &str,
        tab_index: u32,
    ) -> RequestBuilder {
        let tab_index = tab_index.to_string();
        self.elevated(self.endpoints.stash_items(), credentials).query(&[
            ("accountName", credentials.account.as_str()),
            ("league", league),
            ("tabs", "1"),
            ("tabIndex", tab_index.as_str()),
        ])
    }

    fn request(&self, operation: &ApiOperation) -> RequestBuilder {
        match operation {
            ApiOperation::Leagues => self
                .client
                .get(self.endpoints.leagues())
                .query(&[("type", "main"), ("compact", "1")]),
            ApiOperation::TabInfo {
                credentials,
                league,
            } => self.stash_request(credentials, league, 0),
            ApiOperation::TabItems {
                credentials,
                league,
                tab_index,
            } => self.stash_request(credentials, league, *tab_index),
            ApiOperation::CharacterList { credentials, .. } => {
                self.elevated(self.endpoints.characters(), credentials)
            }
            ApiOperation::CharacterItems {
                credentials,
                character,
            } => self
                .elevated(self.endpoints.character_items(), credentials)
                .query(&[
                    ("accountName", credentials.account.as_str()),
                    ("character", character.as_str()),
                ]),
            ApiOperation::CharacterJewels {
                credentials,
                character,
            } => self
                .elevated(self.endpoints.passive_skills(), credentials)
                .query(&[
                    ("accountName", credentials.account.as_str()),
                    ("character", character.as_str()),
                    ("reqData", "0"),
                ]),
            ApiOperation::UniqueSubtab {
                account,
                uid,
                tab_index,
            } => self
                .client
                .get(self.endpoints.unique_subtab(account, uid, *tab_index)),
        }
    }

    /// Turn a failed send into a reply, reporting quota rejections to the queue
    fn handle_send_error(
        operation: &ApiOperation,
        err: SendError,
        rejections: &dyn RejectionSink,
    ) -> ServiceError {
        match err {
            SendError::Failed(error) => error,
            SendError::TooManyRequests(headers) => match http::parse_rejection(&headers) {
                Ok(rejection) => {
                    warn!(
                        operation = operation.name(),
                        rules = ?rejection.rate_limits,
                        "Received rate limits"
                    );
                    info!(
                        operation = operation.name(),
                        retry_after_secs = rejection.retry_after.as_secs(),
                        "Retry after"
                    );
                    let retry_after = rejection.retry_after;
                    rejections.enqueue_rejection(rejection);
                    ServiceError::RateLimited {
                        operation: operation.name().to_string(),
                        retry_after,
                    }
                }
                Err(error) => {
                    error!(operation = operation.name(), %error, "Cannot apply server quota");
                    rejections.halt(error.to_string());
                    error
                }
            },
        }
    }
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    operation: &ApiOperation,
) -> ServiceReply<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| ServiceError::Parse(format!("{}: {}", operation.name(), e)))
}

#[async_trait]
impl ServiceManager for ApiManager {
    type Operation = ApiOperation;
    type Payload = ApiPayload;

    async fn execute(
        &self,
        operation: &ApiOperation,
        rejections: &dyn RejectionSink,
    ) -> ServiceReply<ApiPayload> {
        info!(operation = operation.name(), "Sending GET request");
        let response = http::send(self.request(operation), operation.name())
            .await
            .map_err(|err| Self::handle_send_error(operation, err, rejections))?;

        match operation {
            ApiOperation::Leagues => {
                let leagues: Vec<LeagueEntry> = decode(response, operation).await?;
                Ok(ApiPayload::Leagues(
                    leagues.into_iter().map(|league| league.id).collect(),
                ))
            }
            ApiOperation::TabInfo { .. } => {
                Ok(ApiPayload::TabInfo(decode(response, operation).await?))
            }
            ApiOperation::TabItems { .. } => {
                Ok(ApiPayload::Tab(decode(response, operation).await?))
            }
            ApiOperation::CharacterList { league, .. } => {
                let characters: Vec<CharacterEntry> = decode(response, operation).await?;
                Ok(ApiPayload::Characters(
                    characters
                        .into_iter()
                        .filter(|character| &character.league == league)
                        .map(|character| character.name)
                        .collect(),
                ))
            }
            ApiOperation::CharacterItems { .. } => {
                Ok(ApiPayload::Character(decode(response, operation).await?))
            }
            ApiOperation::CharacterJewels { .. } => {
                Ok(ApiPayload::Jewels(decode(response, operation).await?))
            }
            ApiOperation::UniqueSubtab { .. } => response
                .text()
                .await
                .map(ApiPayload::UniqueSubtab)
                .map_err(|e| ServiceError::Parse(format!("{}: {}", operation.name(), e))),
        }
    }
}
