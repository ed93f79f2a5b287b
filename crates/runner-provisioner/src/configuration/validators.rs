// Input validation for the provisioning options, run before any network call.

use anyhow::{bail, Result};
use url::Url;

const MAX_NAME_LENGTH: usize = 64;

/// Validate an API or server URL: http(s) with a host.
pub fn validate_url(url_str: &str) -> Result<Url> {
    if url_str.trim().is_empty() {
        bail!("URL cannot be empty");
    }

    let url = Url::parse(url_str).map_err(|e| anyhow::anyhow!("Invalid URL '{url_str}': {e}"))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => bail!("URL must use HTTP or HTTPS scheme, got '{scheme}'"),
    }

    if url.host_str().is_none() {
        bail!("URL must have a host");
    }

    Ok(url)
}

/// Validate a runner name: 1 to 64 characters of alphanumerics, `-`, `_` and `.`.
pub fn validate_runner_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Runner name cannot be empty");
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        bail!(
            "Runner name must be at most {MAX_NAME_LENGTH} characters (got {})",
            name.chars().count()
        );
    }

    let is_valid = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !is_valid {
        bail!(
            "Runner name '{name}' contains invalid characters. \
             Only alphanumeric characters, hyphens, underscores, and periods are allowed."
        );
    }

    Ok(())
}

/// Validate a work folder path.
pub fn validate_work_folder(work: &str) -> Result<()> {
    if work.trim().is_empty() {
        bail!("Work folder cannot be empty");
    }

    for c in ['<', '>', '"', '|', '?', '*'] {
        if work.contains(c) {
            bail!("Work folder contains invalid character: '{c}'");
        }
    }

    Ok(())
}

/// Split and validate comma-separated labels.
pub fn parse_labels(labels: &str) -> Result<Vec<String>> {
    if labels.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut parsed: Vec<String> = Vec::new();
    for label in labels.split(',') {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            bail!("Label list contains empty labels");
        }
        if trimmed.chars().count() > MAX_NAME_LENGTH {
            bail!("Label '{trimmed}' exceeds the maximum length of {MAX_NAME_LENGTH} characters");
        }
        if !parsed.iter().any(|l| l.eq_ignore_ascii_case(trimmed)) {
            parsed.push(trimmed.to_string());
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_url() {
        assert!(validate_url("https://api.github.com").is_ok());
        assert!(validate_url("http://ghe.example.com/api/v3").is_ok());
    }

    #[test]
    fn test_invalid_url() {
        assert!(validate_url("").is_err());
        assert!(validate_url("not-a-url").is_err());
        assert!(validate_url("ftp://github.com").is_err());
    }

    #[test]
    fn test_valid_runner_name() {
        assert!(validate_runner_name("my-runner").is_ok());
        assert!(validate_runner_name("runner_01").is_ok());
        assert!(validate_runner_name("runner.prod").is_ok());
        assert!(validate_runner_name(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_invalid_runner_name() {
        assert!(validate_runner_name("").is_err());
        assert!(validate_runner_name(&"a".repeat(65)).is_err());
        assert!(validate_runner_name("runner name").is_err());
        assert!(validate_runner_name("runner@host").is_err());
    }

    #[test]
    fn test_parse_labels() {
        assert!(parse_labels("").unwrap().is_empty());
        assert_eq!(parse_labels("gpu, linux ,GPU").unwrap(), vec!["gpu", "linux"]);
        assert!(parse_labels("a,,b").is_err());
        assert!(parse_labels(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_work_folder() {
        assert!(validate_work_folder("_work").is_ok());
        assert!(validate_work_folder("/tmp/work").is_ok());
        assert!(validate_work_folder("C:/runner/work").is_ok());
        assert!(validate_work_folder(" ").is_err());
        assert!(validate_work_folder("work|x").is_err());
    }
}
