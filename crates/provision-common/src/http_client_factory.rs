// Builds the reqwest client used for GitHub API calls and package downloads.

use crate::constants::{variables, GITHUB_ACCEPT, GITHUB_API_VERSION};
use crate::host_context::HostContext;
use anyhow::{Context, Result};
use provision_sdk::ProxySettings;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Client configured from the host context: proxy routing, user agent
    /// and the GitHub REST headers.
    ///
    /// `GITHUB_ACTIONS_RUNNER_TLS_NO_VERIFY=1` disables certificate
    /// verification.
    pub fn create_client(context: &HostContext) -> Result<Client> {
        Self::build(context.proxy().clone(), &context.user_agent(), tls_no_verify())
    }

    fn build(proxy: ProxySettings, user_agent: &str, accept_invalid_certs: bool) -> Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );

        let mut builder = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .no_proxy();

        if proxy.is_configured() {
            builder = builder.proxy(reqwest::Proxy::custom(move |url| {
                proxy.proxy_for(url).map(|endpoint| endpoint.address.clone())
            }));
        }

        if accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().context("Failed to build HTTP client")
    }
}

fn tls_no_verify() -> bool {
    std::env::var(variables::TLS_NO_VERIFY)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false)
}
