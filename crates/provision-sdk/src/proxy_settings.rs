use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])(\.(25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])){3}$")
        .expect("Invalid IPv4 regex")
});

/// One `no_proxy` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BypassRule {
    pub host: String,
    pub port: Option<u16>,
}

/// A proxy endpoint with its decoded credentials.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub address: Url,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Proxy routing taken from `http_proxy`, `https_proxy` and `no_proxy`.
///
/// Lowercase names win over uppercase ones. Plain IPv4 entries in
/// `no_proxy` are ignored.
#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    pub http: Option<ProxyEndpoint>,
    pub https: Option<ProxyEndpoint>,
    pub no_proxy: Vec<BypassRule>,
}

impl ProxySettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |lower: &str, upper: &str| {
            lookup(lower)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| lookup(upper).filter(|v| !v.trim().is_empty()))
        };

        let http = read("http_proxy", "HTTP_PROXY").and_then(|raw| parse_endpoint(&raw));
        let https = read("https_proxy", "HTTPS_PROXY").and_then(|raw| parse_endpoint(&raw));
        let no_proxy = read("no_proxy", "NO_PROXY")
            .map(|raw| parse_bypass_list(&raw))
            .unwrap_or_default();

        Self {
            http,
            https,
            no_proxy,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.http.is_some() || self.https.is_some()
    }

    /// Proxy to use for `destination`, or `None` to connect directly.
    pub fn proxy_for(&self, destination: &Url) -> Option<&ProxyEndpoint> {
        let endpoint = match destination.scheme() {
            "https" => self.https.as_ref(),
            "http" => self.http.as_ref(),
            _ => None,
        }?;
        if self.is_bypass(destination) {
            return None;
        }
        Some(endpoint)
    }

    pub fn is_bypass(&self, destination: &Url) -> bool {
        let Some(host) = destination.host_str() else {
            return false;
        };
        let host = host.trim_start_matches('[').trim_end_matches(']').to_lowercase();
        if host == "localhost" || host == "127.0.0.1" || host == "::1" {
            return true;
        }
        let port = destination.port_or_known_default();

        self.no_proxy.iter().any(|rule| {
            if rule.host == "*" {
                return true;
            }
            if rule.port.is_some() && rule.port != port {
                return false;
            }
            if let Some(suffix) = rule.host.strip_prefix('.') {
                host.ends_with(&format!(".{suffix}"))
            } else {
                host == rule.host || host.ends_with(&format!(".{}", rule.host))
            }
        })
    }

    /// Proxy passwords, for registration with a secret masker.
    pub fn secrets(&self) -> impl Iterator<Item = &str> {
        [self.http.as_ref(), self.https.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|e| e.password.as_deref())
    }
}

fn parse_endpoint(raw: &str) -> Option<ProxyEndpoint> {
    let raw = raw.trim();
    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let address = Url::parse(&candidate).ok()?;
    let decode = |s: &str| {
        percent_encoding::percent_decode_str(s)
            .decode_utf8_lossy()
            .into_owned()
    };
    let username = Some(address.username())
        .filter(|u| !u.is_empty())
        .map(decode);
    let password = address.password().map(decode);

    Some(ProxyEndpoint {
        address,
        username,
        password,
    })
}

fn parse_bypass_list(raw: &str) -> Vec<BypassRule> {
    let mut rules: Vec<BypassRule> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (host, port) = match entry.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => (host, Some(port)),
                Err(_) => (entry, None),
            },
            None => (entry, None),
        };
        if IPV4.is_match(host) {
            continue;
        }
        let rule = BypassRule {
            host: host.to_lowercase(),
            port,
        };
        if !rules.contains(&rule) {
            rules.push(rule);
        }
    }
    rules
}
