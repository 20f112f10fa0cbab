//! Web API endpoint locations

/// Default base URL of the public JSON API
pub const DEFAULT_API_BASE: &str = "https://api.pathofexile.com";

/// Default base URL of the website serving account data
pub const DEFAULT_WEB_BASE: &str = "https://www.pathofexile.com";

/// Base URLs the API manager talks to
///
/// Both bases can be pointed elsewhere, e.g. at a local test server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    api_base: String,
    web_base: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE, DEFAULT_WEB_BASE)
    }
}

impl ApiEndpoints {
    /// Create endpoints from explicit base URLs
    pub fn new(api_base: impl Into<String>, web_base: impl Into<String>) -> Self {
        Self {
            api_base: trim_base(api_base.into()),
            web_base: trim_base(web_base.into()),
        }
    }

    /// Serve both the API and the website from one base URL
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self::new(base.clone(), base)
    }

    /// League listing
    pub fn leagues(&self) -> String {
        format!("{}/leagues", self.api_base)
    }

    /// Stash tab listing and tab contents
    pub fn stash_items(&self) -> String {
        format!("{}/character-window/get-stash-items", self.web_base)
    }

    /// Character listing
    pub fn characters(&self) -> String {
        format!("{}/character-window/get-characters", self.web_base)
    }

    /// Equipped and inventory items of a character
    pub fn character_items(&self) -> String {
        format!("{}/character-window/get-items", self.web_base)
    }

    /// Passive tree, including socketed jewels
    pub fn passive_skills(&self) -> String {
        format!("{}/character-window/get-passive-skills", self.web_base)
    }

    /// Public page of a unique collection sub-tab
    pub fn unique_subtab(&self, account: &str, uid: &str, tab_index: u32) -> String {
        format!(
            "{}/account/view-stash/{}/{}/{}",
            self.web_base, account, uid, tab_index
        )
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}
