// GitHub REST calls the provisioner needs: a runner registration token and
// the runner release metadata.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use provision_common::constants::{self, Architecture, OsPlatform};
use provision_common::{NonRetryableError, Tracing};
use provision_sdk::TraceWriter;
use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

use super::scope::RunnerScope;

/// One-time token accepted by the runner's configuration script.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationToken {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: Url,
    /// `sha256:<hex>` when GitHub computed one for the asset.
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    pub fn version(&self) -> &str {
        self.tag_name.trim_start_matches('v')
    }

    /// Pick the runner package built for `platform`/`arch`.
    pub fn select_package(&self, platform: OsPlatform, arch: Architecture) -> Result<RunnerPackage> {
        let wanted = constants::runner_asset_name(platform, arch, self.version());
        let asset = self
            .assets
            .iter()
            .find(|a| a.name == wanted)
            .ok_or_else(|| {
                NonRetryableError::new(format!(
                    "Release {} has no asset named '{wanted}'",
                    self.tag_name
                ))
            })?;

        Ok(RunnerPackage {
            version: self.version().to_string(),
            asset_name: asset.name.clone(),
            download_url: asset.browser_download_url.clone(),
            sha256: asset
                .digest
                .as_deref()
                .and_then(|d| d.strip_prefix("sha256:"))
                .map(str::to_string),
        })
    }
}

/// A concrete runner archive to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerPackage {
    pub version: String,
    pub asset_name: String,
    pub download_url: Url,
    pub sha256: Option<String>,
}

impl RunnerPackage {
    /// Package for a pinned version, without asking the API.
    pub fn for_version(version: &str, platform: OsPlatform, arch: Architecture) -> Result<Self> {
        let version = version.trim().trim_start_matches('v');
        if version.is_empty() {
            return Err(anyhow!("Runner version cannot be empty"));
        }
        let asset_name = constants::runner_asset_name(platform, arch, version);
        let download_url = Url::parse(&format!(
            "https://{}/{}/releases/download/v{version}/{asset_name}",
            constants::GITHUB_HOST,
            constants::RUNNER_RELEASE_REPOSITORY
        ))
        .context("Invalid runner download URL")?;

        Ok(Self {
            version: version.to_string(),
            asset_name,
            download_url,
            sha256: None,
        })
    }
}

pub struct GitHubClient {
    client: Client,
    api_base: Url,
    trace: Tracing,
}

impl GitHubClient {
    pub fn new(client: Client, api_base: Url, trace: Tracing) -> Self {
        Self {
            client,
            api_base,
            trace,
        }
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// `POST .../actions/runners/registration-token` for the scope.
    pub async fn create_registration_token(
        &self,
        scope: &RunnerScope,
        pat: &str,
    ) -> Result<RegistrationToken> {
        let url = self.endpoint(&scope.registration_token_segments())?;
        self.trace
            .info(&format!("Requesting registration token for {scope}"));

        let response = self
            .client
            .post(url.clone())
            .bearer_auth(pat)
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await
            .with_context(|| format!("Failed to send registration token request to {url}"))?;

        let token: RegistrationToken = read_json(response, "registration token").await?;
        if token.token.trim().is_empty() {
            return Err(anyhow!("Registration token response contained an empty token"));
        }
        if let Some(expires_at) = token.expires_at {
            self.trace
                .info(&format!("Registration token expires at {expires_at}"));
        }
        Ok(token)
    }

    /// `GET /repos/actions/runner/releases/latest`.
    ///
    /// The credential is optional; it only raises the rate limit.
    pub async fn latest_release(&self, pat: Option<&str>) -> Result<Release> {
        let (owner, repo) = constants::RUNNER_RELEASE_REPOSITORY
            .split_once('/')
            .ok_or_else(|| anyhow!("Malformed release repository"))?;
        let url = self.endpoint(&["repos", owner, repo, "releases", "latest"])?;
        self.trace.info(&format!("Fetching latest runner release from {url}"));

        let mut request = self.client.get(url.clone());
        if let Some(pat) = pat {
            request = request.bearer_auth(pat);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send release request to {url}"))?;

        let release: Release = read_json(response, "latest release").await?;
        self.trace.info(&format!(
            "Latest runner release is {} with {} asset(s)",
            release.tag_name,
            release.assets.len()
        ));
        Ok(release)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("API base '{}' cannot carry a path", self.api_base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = format!("GitHub API returned HTTP {} for {what}: {body}", status.as_u16());
        return Err(if status.is_client_error() {
            NonRetryableError::new(message).into()
        } else {
            anyhow!(message)
        });
    }

    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read {what} response"))?;
    serde_json::from_str(&body).with_context(|| format!("Failed to deserialize {what} response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve, CannedResponse};
    use provision_common::{SecretMasker, TraceManager, TraceSetting};

    const RELEASE_JSON: &str = r#"{
        "tag_name": "v2.319.1",
        "name": "v2.319.1",
        "assets": [
            {
                "name": "actions-runner-linux-x64-2.319.1.tar.gz",
                "browser_download_url": "https://github.com/actions/runner/releases/download/v2.319.1/actions-runner-linux-x64-2.319.1.tar.gz",
                "digest": "sha256:3f6efb7488a183e291fc2c62876e14c9ee732864173734facc85a1bfb1744464"
            },
            {
                "name": "actions-runner-win-x64-2.319.1.zip",
                "browser_download_url": "https://github.com/actions/runner/releases/download/v2.319.1/actions-runner-win-x64-2.319.1.zip"
            }
        ]
    }"#;

    fn trace() -> Tracing {
        TraceManager::new(SecretMasker::new(), TraceSetting::default()).get("GitHubClient")
    }

    fn client_for(base: &str) -> GitHubClient {
        let client = Client::builder().no_proxy().build().unwrap();
        GitHubClient::new(client, Url::parse(base).unwrap(), trace())
    }

    #[test]
    fn release_selects_matching_asset_with_digest() {
        let release: Release = serde_json::from_str(RELEASE_JSON).unwrap();
        let package = release
            .select_package(OsPlatform::Linux, Architecture::X64)
            .unwrap();
        assert_eq!(package.version, "2.319.1");
        assert_eq!(package.asset_name, "actions-runner-linux-x64-2.319.1.tar.gz");
        assert_eq!(
            package.sha256.as_deref(),
            Some("3f6efb7488a183e291fc2c62876e14c9ee732864173734facc85a1bfb1744464")
        );

        let windows = release
            .select_package(OsPlatform::Windows, Architecture::X64)
            .unwrap();
        assert!(windows.sha256.is_none());
    }

    #[test]
    fn missing_asset_is_not_retryable() {
        let release: Release = serde_json::from_str(RELEASE_JSON).unwrap();
        let err = release
            .select_package(OsPlatform::MacOS, Architecture::Arm64)
            .unwrap_err();
        assert!(NonRetryableError::is_in_chain(&err));
        assert!(err.to_string().contains("actions-runner-osx-arm64-2.319.1.tar.gz"));
    }

    #[test]
    fn pinned_version_builds_download_url() {
        let package = RunnerPackage::for_version("v2.320.0", OsPlatform::Linux, Architecture::Arm64).unwrap();
        assert_eq!(
            package.download_url.as_str(),
            "https://github.com/actions/runner/releases/download/v2.320.0/actions-runner-linux-arm64-2.320.0.tar.gz"
        );
        assert!(RunnerPackage::for_version(" ", OsPlatform::Linux, Architecture::X64).is_err());
    }

    #[test]
    fn endpoint_keeps_enterprise_prefix() {
        let client = client_for("https://ghe.example.com/api/v3");
        let url = client.endpoint(&["orgs", "octo", "actions"]).unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/orgs/octo/actions");

        let client = client_for("https://api.github.com/");
        let url = client.endpoint(&["repos", "a", "b"]).unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/repos/a/b");
    }

    #[tokio::test]
    async fn registration_token_request() {
        let server = serve(vec![CannedResponse::json(
            201,
            r#"{"token":"AABBCCREG","expires_at":"2026-10-18T12:00:00.000Z"}"#,
        )])
        .await;
        let client = client_for(&server.base_url);
        let scope: RunnerScope = "octo-org/hello".parse().unwrap();

        let token = client
            .create_registration_token(&scope, "ghp_secret")
            .await
            .unwrap();
        assert_eq!(token.token, "AABBCCREG");
        assert!(token.expires_at.is_some());

        let requests = server.requests.lock();
        assert_eq!(
            requests[0].request_line,
            "POST /repos/octo-org/hello/actions/runners/registration-token HTTP/1.1"
        );
        assert_eq!(requests[0].header("authorization"), Some("Bearer ghp_secret"));
    }

    #[tokio::test]
    async fn unauthorized_token_request_is_not_retryable() {
        let server = serve(vec![CannedResponse::json(
            401,
            r#"{"message":"Bad credentials"}"#,
        )])
        .await;
        let client = client_for(&server.base_url);
        let scope: RunnerScope = "octo-org".parse().unwrap();

        let err = client
            .create_registration_token(&scope, "bad")
            .await
            .unwrap_err();
        assert!(NonRetryableError::is_in_chain(&err));
        assert!(err.to_string().contains("HTTP 401"));
        assert!(err.to_string().contains("Bad credentials"));
    }

    #[tokio::test]
    async fn latest_release_request() {
        let server = serve(vec![CannedResponse::json(200, RELEASE_JSON)]).await;
        let client = client_for(&server.base_url);

        let release = client.latest_release(None).await.unwrap();
        assert_eq!(release.tag_name, "v2.319.1");
        assert_eq!(release.assets.len(), 2);

        let requests = server.requests.lock();
        assert_eq!(
            requests[0].request_line,
            "GET /repos/actions/runner/releases/latest HTTP/1.1"
        );
        assert!(requests[0].header("authorization").is_none());
    }

    #[tokio::test]
    async fn malformed_release_body_is_an_error() {
        let server = serve(vec![CannedResponse::json(200, "{\"assets\": 5}")]).await;
        let client = client_for(&server.base_url);
        let err = client.latest_release(Some("ghp_x")).await.unwrap_err();
        assert!(err.to_string().contains("deserialize"));
    }
}
