use std::sync::Arc;
use log::debug;
use reqwest::cookie::Jar;
use reqwest::header::HeaderName;
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use crate::config::PortalConfig;
use crate::error::{PortalError, Result};

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    Follow,
    Manual,
}

// Cookie-carrying HTTP client. Both inner clients share one jar, so a redirect observed
// manually and a request that follows redirects see the same cookies.
#[derive(Clone)]
pub struct HttpSessionClient {
    following: Client,
    manual: Client,
}

impl HttpSessionClient {
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());

        let build = |policy: Policy| {
            Client::builder()
                .cookie_provider(jar.clone())
                .user_agent(config.user_agent.as_str())
                .timeout(config.timeout)
                .redirect(policy)
                .build()
                .map_err(PortalError::Transport)
        };

        let following = build(Policy::limited(MAX_REDIRECTS))?;
        let manual = build(Policy::none())?;

        Ok(HttpSessionClient { following, manual })
    }

    fn client(&self, redirects: Redirects) -> &Client {
        match redirects {
            Redirects::Follow => &self.following,
            Redirects::Manual => &self.manual,
        }
    }

    pub async fn get(&self, url: &str, redirects: Redirects, headers: &[(HeaderName, String)]) -> Result<Response> {
        debug!("GET {} ({:?})", url, redirects);
        let mut builder = self.client(redirects).get(url);
        for (name, value) in headers {
            builder = builder.header(name.clone(), value.as_str());
        }

        builder.send().await.map_err(|e| PortalError::from_request(url, e))
    }

    // Sends a form-urlencoded body.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        redirects: Redirects,
        headers: &[(HeaderName, String)],
    ) -> Result<Response> {
        debug!("POST {} ({:?})", url, redirects);
        let mut builder = self.client(redirects).post(url).form(form);
        for (name, value) in headers {
            builder = builder.header(name.clone(), value.as_str());
        }

        builder.send().await.map_err(|e| PortalError::from_request(url, e))
    }

    // GET that must end in a 2xx; returns the body.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url, Redirects::Follow, &[]).await?;
        read_success(url, response).await
    }

    // POST that must end in a 2xx; returns the body.
    pub async fn post_text(&self, url: &str, form: &[(&str, &str)]) -> Result<String> {
        let response = self.post_form(url, form, Redirects::Follow, &[]).await?;
        read_success(url, response).await
    }
}

pub async fn read_success(url: &str, response: Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(PortalError::Fetch { url: url.to_string(), status: Some(status.as_u16()) });
    }

    response.text().await.map_err(|e| PortalError::from_request(url, e))
}
