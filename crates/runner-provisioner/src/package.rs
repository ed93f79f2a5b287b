// Downloads a runner package, checks its digest and unpacks it.

use anyhow::{anyhow, Context, Result};
use provision_common::constants::{RUNNER_DOWNLOAD_RETRY_DELAY, RUNNER_DOWNLOAD_RETRY_MAX_ATTEMPTS};
use provision_common::{NonRetryableError, Tracing};
use provision_sdk::TraceWriter;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::github::RunnerPackage;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RUNNER_DOWNLOAD_RETRY_MAX_ATTEMPTS,
            delay: RUNNER_DOWNLOAD_RETRY_DELAY,
        }
    }
}

pub struct PackageInstaller {
    client: Client,
    trace: Tracing,
    retry: RetryPolicy,
}

impl PackageInstaller {
    pub fn new(client: Client, trace: Tracing) -> Self {
        Self {
            client,
            trace,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Download `package` into `dest_dir`, verify it and extract it there.
    /// The archive is removed afterwards.
    pub async fn install(
        &self,
        package: &RunnerPackage,
        dest_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<()> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .with_context(|| format!("Failed to create runner directory {}", dest_dir.display()))?;

        let archive_path = dest_dir.join(&package.asset_name);
        self.trace.info(&format!(
            "Downloading runner {} from {}",
            package.version, package.download_url
        ));
        let actual = self
            .download_with_retries(&package.download_url, &archive_path, cancel)
            .await?;

        let unpacked = self.verify_and_extract(package, &actual, &archive_path, dest_dir).await;

        // Never leave an unverified or half-extracted archive behind.
        let removed = tokio::fs::remove_file(&archive_path)
            .await
            .with_context(|| format!("Failed to delete {}", archive_path.display()));
        unpacked?;
        removed
    }

    async fn verify_and_extract(
        &self,
        package: &RunnerPackage,
        actual_sha256: &str,
        archive_path: &Path,
        dest_dir: &Path,
    ) -> Result<()> {
        match &package.sha256 {
            Some(expected) => {
                verify_sha256(expected, actual_sha256)?;
                self.trace.info("Package digest verified.");
            }
            None => self.trace.verbose(&format!(
                "No published digest; downloaded sha256 is {actual_sha256}"
            )),
        }

        self.trace
            .info(&format!("Extracting {} into {}", package.asset_name, dest_dir.display()));
        let archive = archive_path.to_path_buf();
        let dest: PathBuf = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract_archive(&archive, &dest))
            .await
            .context("Extraction task failed")?
    }

    /// Returns the hex sha256 of the downloaded file.
    async fn download_with_retries(
        &self,
        url: &Url,
        dest: &Path,
        cancel: CancellationToken,
    ) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(anyhow!("Runner download cancelled"));
            }
            attempt += 1;

            match self.download_file(url, dest).await {
                Ok(digest) => {
                    self.trace
                        .info(&format!("Download completed on attempt {attempt}."));
                    return Ok(digest);
                }
                Err(e) if NonRetryableError::is_in_chain(&e) => {
                    return Err(e).context("Runner download failed");
                }
                Err(e) if attempt >= self.retry.max_attempts => {
                    return Err(e).context(format!(
                        "Failed to download runner after {attempt} attempts"
                    ));
                }
                Err(e) => {
                    self.trace.warning(&format!(
                        "Download failed (attempt {attempt}/{}): {e:#}. Retrying in {:?}...",
                        self.retry.max_attempts, self.retry.delay
                    ));
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry.delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(anyhow!("Runner download cancelled during retry"));
                        }
                    }
                }
            }
        }
    }

    async fn download_file(&self, url: &Url, dest: &Path) -> Result<String> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .context("Failed to send download request")?;

        if let Err(source) = response.error_for_status_ref() {
            let message = format!("Download of {url} failed with HTTP {}", response.status().as_u16());
            if response.status().is_client_error() {
                return Err(NonRetryableError::with_source(message, source).into());
            }
            return Err(anyhow::Error::new(source).context(message));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut hasher = Sha256::new();
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read download response body")?
        {
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .context("Failed to write downloaded file to disk")?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        self.trace.verbose(&format!("Downloaded {written} bytes."));

        Ok(hex::encode(hasher.finalize()))
    }
}

/// Compare a published digest (`<hex>` or `sha256:<hex>`) with the computed one.
pub fn verify_sha256(expected: &str, actual_hex: &str) -> Result<()> {
    let expected = expected.trim();
    let expected = expected.strip_prefix("sha256:").unwrap_or(expected);
    if expected.eq_ignore_ascii_case(actual_hex) {
        Ok(())
    } else {
        Err(NonRetryableError::new(format!(
            "Runner package digest mismatch: expected {expected}, got {actual_hex}"
        ))
        .into())
    }
}

/// Extract a `.tar.gz` or `.zip` archive into `dest_dir`.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let name = archive_path.to_string_lossy();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let file = std::fs::File::open(archive_path).context("Failed to open archive file")?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(decoder);
        archive.set_preserve_permissions(true);
        archive
            .unpack(dest_dir)
            .context("Failed to extract tar.gz archive")?;
    } else if name.ends_with(".zip") {
        let file = std::fs::File::open(archive_path).context("Failed to open zip archive")?;
        let mut archive = zip::ZipArchive::new(file).context("Failed to read zip archive")?;
        archive
            .extract(dest_dir)
            .context("Failed to extract zip archive")?;
    } else {
        return Err(anyhow!("Unknown archive format: {}", archive_path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve, CannedResponse};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use provision_common::{SecretMasker, TraceManager, TraceSetting};
    use std::io::Write;

    fn installer() -> PackageInstaller {
        let client = Client::builder().no_proxy().build().unwrap();
        let trace = TraceManager::new(SecretMasker::new(), TraceSetting::default()).get("Package");
        PackageInstaller::new(client, trace).with_retry(RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
        })
    }

    fn tar_gz(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, content, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn sha256_hex(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    fn package(url: &str, sha256: Option<String>) -> RunnerPackage {
        RunnerPackage {
            version: "2.319.1".into(),
            asset_name: "actions-runner-linux-x64-2.319.1.tar.gz".into(),
            download_url: Url::parse(url).unwrap(),
            sha256,
        }
    }

    #[test]
    fn digest_comparison() {
        let actual = sha256_hex(b"runner");
        assert!(verify_sha256(&actual, &actual).is_ok());
        assert!(verify_sha256(&format!("sha256:{}", actual.to_uppercase()), &actual).is_ok());
        let err = verify_sha256("deadbeef", &actual).unwrap_err();
        assert!(NonRetryableError::is_in_chain(&err));
    }

    #[test]
    fn extracts_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("runner.tar.gz");
        std::fs::write(
            &archive,
            tar_gz(&[("config.sh", b"#!/bin/sh\n", 0o755), ("bin/README", b"hi", 0o644)]),
        )
        .unwrap();

        extract_archive(&archive, dir.path()).unwrap();
        assert_eq!(std::fs::read(dir.path().join("bin/README")).unwrap(), b"hi");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join("config.sh"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn extracts_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("runner.zip");
        {
            let file = std::fs::File::create(&archive).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("config.cmd", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"@echo off").unwrap();
            zip.finish().unwrap();
        }

        extract_archive(&archive, dir.path()).unwrap();
        assert_eq!(std::fs::read(dir.path().join("config.cmd")).unwrap(), b"@echo off");
    }

    #[test]
    fn unknown_archive_format() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("runner.rar");
        std::fs::write(&archive, b"x").unwrap();
        assert!(extract_archive(&archive, dir.path()).is_err());
    }

    #[tokio::test]
    async fn install_retries_server_errors_then_verifies_and_extracts() {
        let body = tar_gz(&[("run.sh", b"echo run", 0o755)]);
        let digest = sha256_hex(&body);
        let server = serve(vec![
            CannedResponse::json(502, "bad gateway"),
            CannedResponse::bytes(body),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();

        installer()
            .install(
                &package(&format!("{}/runner.tar.gz", server.base_url), Some(format!("sha256:{digest}"))),
                dir.path(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(server.requests.lock().len(), 2);
        assert_eq!(std::fs::read(dir.path().join("run.sh")).unwrap(), b"echo run");
        assert!(!dir
            .path()
            .join("actions-runner-linux-x64-2.319.1.tar.gz")
            .exists());
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let server = serve(vec![
            CannedResponse::json(404, "Not Found"),
            CannedResponse::json(404, "Not Found"),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();

        let err = installer()
            .install(
                &package(&format!("{}/missing.tar.gz", server.base_url), None),
                dir.path(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(NonRetryableError::is_in_chain(&err));
        assert!(err.chain().any(|cause| cause.is::<reqwest::Error>()));
        assert_eq!(server.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn digest_mismatch_fails_install() {
        let body = tar_gz(&[("run.sh", b"echo run", 0o755)]);
        let server = serve(vec![CannedResponse::bytes(body)]).await;
        let dir = tempfile::tempdir().unwrap();

        let err = installer()
            .install(
                &package(&format!("{}/runner.tar.gz", server.base_url), Some("00".repeat(32))),
                dir.path(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
        assert!(!dir.path().join("run.sh").exists());
        assert!(!dir
            .path()
            .join("actions-runner-linux-x64-2.319.1.tar.gz")
            .exists());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let server = serve(vec![
            CannedResponse::json(500, "oops"),
            CannedResponse::json(500, "oops"),
            CannedResponse::json(500, "oops"),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();

        let err = installer()
            .install(
                &package(&format!("{}/runner.tar.gz", server.base_url), None),
                dir.path(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(server.requests.lock().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_before_download() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = installer()
            .install(&package("http://127.0.0.1:9/runner.tar.gz", None), dir.path(), cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
