use anyhow::{bail, Context, Result};
use provision_common::constants::{GITHUB_API_URL, GITHUB_HOST};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Where a runner is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    Repository { owner: String, repo: String },
    Organization { org: String },
}

/// A registration scope on a particular GitHub server.
///
/// Accepts `owner/repo`, `org`, or a full URL such as
/// `https://ghe.example.com/org/repo`. The short forms target github.com.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerScope {
    pub server_url: Url,
    pub kind: ScopeKind,
}

impl RunnerScope {
    /// URL handed to the runner's configuration script.
    pub fn config_url(&self) -> String {
        let server = self.server_url.as_str().trim_end_matches('/');
        match &self.kind {
            ScopeKind::Repository { owner, repo } => format!("{server}/{owner}/{repo}"),
            ScopeKind::Organization { org } => format!("{server}/{org}"),
        }
    }

    pub fn is_github_com(&self) -> bool {
        self.server_url
            .host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(GITHUB_HOST) || h.eq_ignore_ascii_case("www.github.com"))
    }

    /// REST API base: api.github.com for github.com, `/api/v3` on the
    /// server for GitHub Enterprise Server.
    pub fn api_base(&self) -> Result<Url> {
        if self.is_github_com() {
            return Url::parse(GITHUB_API_URL).context("Invalid GitHub API URL");
        }
        let mut api = self.server_url.clone();
        api.set_query(None);
        api.set_fragment(None);
        api.set_path("/api/v3");
        Ok(api)
    }

    /// Path segments of the registration token endpoint, relative to the API base.
    pub fn registration_token_segments(&self) -> Vec<&str> {
        match &self.kind {
            ScopeKind::Repository { owner, repo } => vec![
                "repos",
                owner,
                repo,
                "actions",
                "runners",
                "registration-token",
            ],
            ScopeKind::Organization { org } => {
                vec!["orgs", org, "actions", "runners", "registration-token"]
            }
        }
    }
}

impl fmt::Display for RunnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ScopeKind::Repository { owner, repo } => write!(f, "repository {owner}/{repo}"),
            ScopeKind::Organization { org } => write!(f, "organization {org}"),
        }
    }
}

impl FromStr for RunnerScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("Scope cannot be empty");
        }

        let (server_url, path) = if s.starts_with("http://") || s.starts_with("https://") {
            let parsed = Url::parse(s).with_context(|| format!("Invalid scope URL '{s}'"))?;
            if parsed.host_str().is_none() {
                bail!("Scope URL '{s}' has no host");
            }
            let mut server = parsed.clone();
            server.set_path("/");
            server.set_query(None);
            server.set_fragment(None);
            (server, parsed.path().to_string())
        } else {
            let server = Url::parse(&format!("https://{GITHUB_HOST}/"))
                .context("Invalid GitHub URL")?;
            (server, s.to_string())
        };

        let segments: Vec<&str> = path.split('/').filter(|seg| !seg.is_empty()).collect();
        for segment in &segments {
            validate_segment(segment)?;
        }

        let kind = match segments.as_slice() {
            [org] => ScopeKind::Organization {
                org: org.to_string(),
            },
            [owner, repo] => ScopeKind::Repository {
                owner: owner.to_string(),
                repo: repo.trim_end_matches(".git").to_string(),
            },
            [] => bail!("Scope '{s}' names neither an organization nor a repository"),
            _ => bail!("Scope '{s}' has too many path segments, expected 'owner/repo' or 'org'"),
        };

        Ok(Self { server_url, kind })
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    let valid = segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !valid || segment == "." || segment == ".." {
        bail!("'{segment}' is not a valid owner, organization or repository name");
    }
    Ok(())
}
