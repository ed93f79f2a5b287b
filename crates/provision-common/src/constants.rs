// Constants shared by the provisioner: platform detection, release asset
// naming, CLI argument names, return codes and defaults.

use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsPlatform {
    Linux,
    MacOS,
    Windows,
}

impl fmt::Display for OsPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsPlatform::Linux => write!(f, "Linux"),
            OsPlatform::MacOS => write!(f, "OSX"),
            OsPlatform::Windows => write!(f, "Windows"),
        }
    }
}

impl OsPlatform {
    /// Platform segment of a runner release asset name.
    pub fn package_name(&self) -> &'static str {
        match self {
            OsPlatform::Linux => "linux",
            OsPlatform::MacOS => "osx",
            OsPlatform::Windows => "win",
        }
    }

    /// Windows assets ship as zip, everything else as tar.gz.
    pub fn archive_extension(&self) -> &'static str {
        match self {
            OsPlatform::Windows => "zip",
            _ => "tar.gz",
        }
    }

    /// Name of the configuration script inside an extracted runner package.
    pub fn config_script(&self) -> &'static str {
        match self {
            OsPlatform::Windows => "config.cmd",
            _ => "config.sh",
        }
    }

    /// Name of the run script inside an extracted runner package.
    pub fn run_script(&self) -> &'static str {
        match self {
            OsPlatform::Windows => "run.cmd",
            _ => "run.sh",
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    X86,
    X64,
    Arm,
    Arm64,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => write!(f, "X86"),
            Architecture::X64 => write!(f, "X64"),
            Architecture::Arm => write!(f, "ARM"),
            Architecture::Arm64 => write!(f, "ARM64"),
        }
    }
}

impl Architecture {
    /// Architecture segment of a runner release asset name.
    pub fn package_name(&self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
            Architecture::Arm => "arm",
            Architecture::Arm64 => "arm64",
        }
    }
}

// ---------------------------------------------------------------------------
// Platform detection (compile-time)
// ---------------------------------------------------------------------------

/// The current OS platform, detected at compile time.
#[cfg(target_os = "linux")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Linux;
#[cfg(target_os = "macos")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::MacOS;
#[cfg(target_os = "windows")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Windows;
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Linux; // default fallback

/// The current CPU architecture, detected at compile time.
#[cfg(target_arch = "x86")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::X86;
#[cfg(target_arch = "x86_64")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::X64;
#[cfg(target_arch = "arm")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::Arm;
#[cfg(target_arch = "aarch64")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::Arm64;
#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    target_arch = "arm",
    target_arch = "aarch64"
)))]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::X64; // default fallback

/// Release asset file name, e.g. `actions-runner-linux-x64-2.319.1.tar.gz`.
pub fn runner_asset_name(platform: OsPlatform, arch: Architecture, version: &str) -> String {
    format!(
        "actions-runner-{}-{}-{}.{}",
        platform.package_name(),
        arch.package_name(),
        version.trim_start_matches('v'),
        platform.archive_extension()
    )
}

// ---------------------------------------------------------------------------
// Top-level constants
// ---------------------------------------------------------------------------

/// Maximum attempts for the runner package download.
pub const RUNNER_DOWNLOAD_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Delay between two download attempts.
pub const RUNNER_DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Owner/repo of the runner release feed.
pub const RUNNER_RELEASE_REPOSITORY: &str = "actions/runner";

/// Public GitHub host and its REST API base.
pub const GITHUB_HOST: &str = "github.com";
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// REST API headers.
pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";
pub const GITHUB_API_VERSION: &str = "2022-11-28";

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub mod defaults {
    use std::time::Duration;

    /// Line printed by the runner once it is connected and idle.
    pub const READY_TEXT: &str = "Listening for Jobs";
    pub const NOT_READY_TIMEOUT: Duration = Duration::from_secs(3600);
    pub const READY_TIMEOUT: Duration = Duration::from_secs(5);
    pub const RUNNER_DIRECTORY: &str = "actions-runner";
    pub const WORK_DIRECTORY: &str = "_work";
    pub const RUNNER_GROUP: &str = "Default";
}

// ---------------------------------------------------------------------------
// CommandLine
// ---------------------------------------------------------------------------

/// Argument names understood by the runner's configuration script.
pub mod command_line {
    /// Named arguments (`--name value`).
    pub mod args {
        pub const LABELS: &str = "labels";
        pub const NAME: &str = "name";
        pub const RUNNER_GROUP: &str = "runnergroup";
        pub const URL: &str = "url";
        pub const WORK: &str = "work";
        pub const TOKEN: &str = "token";
        pub const PAT: &str = "pat";

        /// Arguments whose values must never be logged.
        pub fn secrets() -> &'static [&'static str] {
            &[PAT, TOKEN]
        }
    }

    /// Boolean flags (`--flag`).
    pub mod flags {
        pub const DISABLE_UPDATE: &str = "disableupdate";
        pub const EPHEMERAL: &str = "ephemeral";
        pub const NO_DEFAULT_LABELS: &str = "no-default-labels";
        pub const REPLACE: &str = "replace";
        pub const UNATTENDED: &str = "unattended";
    }
}

// ---------------------------------------------------------------------------
// Return codes
// ---------------------------------------------------------------------------

pub mod return_code {
    pub const SUCCESS: i32 = 0;
    pub const TERMINATED_ERROR: i32 = 1;
    /// The supervised process never became ready.
    pub const READINESS_TIMEOUT: i32 = 2;
}

// ---------------------------------------------------------------------------
// Environment variables
// ---------------------------------------------------------------------------

pub mod variables {
    /// Prefix for environment-provided runner inputs.
    pub const INPUT_PREFIX: &str = "ACTIONS_RUNNER_INPUT_";

    pub const INPUT_NAME: &str = "ACTIONS_RUNNER_INPUT_NAME";
    pub const INPUT_LABELS: &str = "ACTIONS_RUNNER_INPUT_LABELS";
    pub const INPUT_WORK: &str = "ACTIONS_RUNNER_INPUT_WORK";
    pub const INPUT_RUNNER_GROUP: &str = "ACTIONS_RUNNER_INPUT_RUNNERGROUP";
    pub const INPUT_PAT: &str = "ACTIONS_RUNNER_INPUT_PAT";

    pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";

    /// Extra user agent token appended to API requests.
    pub const EXTRA_USER_AGENT: &str = "GITHUB_ACTIONS_RUNNER_EXTRA_USER_AGENT";
    /// Disable TLS certificate verification (test installations only).
    pub const TLS_NO_VERIFY: &str = "GITHUB_ACTIONS_RUNNER_TLS_NO_VERIFY";
}
