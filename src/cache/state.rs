//! Persisted application state: known leagues and per-account listings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use super::{write_atomic, CacheError};
use crate::api::TabListing;

/// What was last seen for one league of an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueState {
    /// Stash tab listing
    #[serde(default)]
    pub tabs: Vec<TabListing>,
    /// Character names playing in the league
    #[serde(default)]
    pub character_names: Vec<String>,
}

/// Saved listings of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Account name
    pub username: String,
    /// Listings keyed by league
    #[serde(default)]
    pub leagues: BTreeMap<String, LeagueState>,
}

impl AccountState {
    fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            leagues: BTreeMap::new(),
        }
    }

    /// Listings for `league`, created empty on first use
    pub fn league_mut(&mut self, league: &str) -> &mut LeagueState {
        self.leagues.entry(league.to_string()).or_default()
    }
}

/// Application state saved between runs
///
/// Session ids are never part of the saved state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState {
    /// Leagues reported by the API
    #[serde(default)]
    pub leagues: Vec<String>,
    /// Known accounts
    #[serde(default)]
    pub accounts: Vec<AccountState>,
    /// Time of the last save
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SavedState {
    /// Load the state file, or start empty if it does not exist yet
    pub fn load_or_default(path: &Path) -> Result<Self, CacheError> {
        if !path.is_file() {
            debug!(path = %path.display(), "No saved state, starting empty");
            return Ok(Self::default());
        }
        let contents =
            std::fs::read_to_string(path).map_err(|e| CacheError::IoError(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| CacheError::DeserializationError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Stamp and write the state atomically
    pub fn save(&mut self, path: &Path) -> Result<(), CacheError> {
        self.updated_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        write_atomic(path, json.as_bytes())?;
        info!(
            path = %path.display(),
            accounts = self.accounts.len(),
            "Saved state"
        );
        Ok(())
    }

    /// Saved account, added on first use
    pub fn account_mut(&mut self, username: &str) -> &mut AccountState {
        let index = match self.accounts.iter().position(|a| a.username == username) {
            Some(index) => index,
            None => {
                self.accounts.push(AccountState::new(username));
                self.accounts.len() - 1
            }
        };
        &mut self.accounts[index]
    }

    /// Saved account, if known
    pub fn account(&self, username: &str) -> Option<&AccountState> {
        self.accounts.iter().find(|a| a.username == username)
    }
}
