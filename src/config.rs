use std::time::Duration;
use anyhow::{Context, Result};
use url::Url;

pub const DEFAULT_ROOT_URL: &str = "https://intranet.ubiobio.cl/";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ACCOUNTS_PATH: &str = "accounts.json";

// Connection settings shared by every request made against the portal.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub root_url: Url,
    pub user_agent: String,
    pub timeout: Duration,
}

impl PortalConfig {
    pub fn new(root_url: &str) -> Result<Self> {
        Ok(PortalConfig {
            root_url: normalize_root(root_url)?,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // Reads UBB_ROOT_URL, UBB_USER_AGENT and UBB_TIMEOUT_SECS, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        let root = std::env::var("UBB_ROOT_URL").unwrap_or_else(|_| DEFAULT_ROOT_URL.to_string());
        let mut config = PortalConfig::new(&root)?;

        if let Ok(user_agent) = std::env::var("UBB_USER_AGENT") {
            config = config.with_user_agent(user_agent);
        }
        if let Ok(secs) = std::env::var("UBB_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().context("UBB_TIMEOUT_SECS must be a number of seconds")?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    // The root without its trailing slash, as browsers send it in the Origin header.
    pub fn origin(&self) -> String {
        self.root_url.as_str().trim_end_matches('/').to_string()
    }

    // {root}{session_id}/{path}
    pub fn session_url(&self, session_id: &str, path: &str) -> String {
        format!("{}{}/{}", self.root_url, session_id, path)
    }
}

pub fn encryption_key_from_env() -> Result<String> {
    std::env::var("APP_ENCRYPTION_KEY").context("APP_ENCRYPTION_KEY environment variable not found")
}

pub fn accounts_path_from_env() -> String {
    std::env::var("UBB_ACCOUNTS_PATH").unwrap_or_else(|_| DEFAULT_ACCOUNTS_PATH.to_string())
}

fn normalize_root(root_url: &str) -> Result<Url> {
    let root = if root_url.ends_with('/') { root_url.to_string() } else { format!("{}/", root_url) };
    Url::parse(&root).with_context(|| format!("Invalid portal root URL: {}", root_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_missing_trailing_slash() {
        let config = PortalConfig::new("http://127.0.0.1:8080").unwrap();
        assert_eq!(config.root_url.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(config.origin(), "http://127.0.0.1:8080");
    }

    #[test]
    fn builds_session_scoped_urls() {
        let config = PortalConfig::new(DEFAULT_ROOT_URL).unwrap();
        assert_eq!(
            config.session_url("abc123", "intranet/inicio.php"),
            "https://intranet.ubiobio.cl/abc123/intranet/inicio.php"
        );
    }

    #[test]
    fn rejects_garbage_root() {
        assert!(PortalConfig::new("not a url").is_err());
    }
}
