// Per-component trace sources with secret masking.

use crate::secret_masker::SecretMasker;
use provision_sdk::TraceWriter;

/// Trace event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceEventType {
    Verbose,
    Information,
    Warning,
    Error,
}

impl std::fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceEventType::Verbose => write!(f, "VERB"),
            TraceEventType::Information => write!(f, "INFO"),
            TraceEventType::Warning => write!(f, "WARN"),
            TraceEventType::Error => write!(f, "ERR "),
        }
    }
}

/// Configuration for trace output.
#[derive(Debug, Clone)]
pub struct TraceSetting {
    /// Minimum severity level to emit.
    pub level: TraceEventType,
}

impl Default for TraceSetting {
    fn default() -> Self {
        Self {
            level: TraceEventType::Verbose,
        }
    }
}

/// A named trace source that masks secrets before emitting.
///
/// Every component gets its own `Tracing`; all of them share one
/// [`SecretMasker`], so a secret registered late is still masked everywhere.
#[derive(Clone)]
pub struct Tracing {
    name: String,
    secret_masker: SecretMasker,
    setting: TraceSetting,
}

impl Tracing {
    pub fn new(name: impl Into<String>, secret_masker: SecretMasker, setting: TraceSetting) -> Self {
        Self {
            name: name.into(),
            secret_masker,
            setting,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn trace(&self, event_type: TraceEventType, message: &str) {
        if event_type < self.setting.level {
            return;
        }

        let masked = self.secret_masker.mask_secrets(message);
        match event_type {
            TraceEventType::Error => tracing::error!(component = %self.name, "{masked}"),
            TraceEventType::Warning => tracing::warn!(component = %self.name, "{masked}"),
            TraceEventType::Information => tracing::info!(component = %self.name, "{masked}"),
            TraceEventType::Verbose => tracing::debug!(component = %self.name, "{masked}"),
        }
    }

    /// `err` and every cause in its chain, one per line, with secrets masked.
    pub fn format_error_chain(&self, err: &anyhow::Error) -> String {
        let mut text = err.to_string();
        for cause in err.chain().skip(1) {
            text.push_str("\n  caused by: ");
            text.push_str(&cause.to_string());
        }
        self.secret_masker.mask_secrets(&text)
    }

    /// Log an error and every cause in its chain.
    pub fn error_chain(&self, err: &anyhow::Error) {
        self.error(&self.format_error_chain(err));
    }
}

impl TraceWriter for Tracing {
    fn info(&self, message: &str) {
        self.trace(TraceEventType::Information, message);
    }

    fn verbose(&self, message: &str) {
        self.trace(TraceEventType::Verbose, message);
    }

    fn warning(&self, message: &str) {
        self.trace(TraceEventType::Warning, message);
    }

    fn error(&self, message: &str) {
        self.trace(TraceEventType::Error, message);
    }
}

/// Hands out named trace sources sharing one masker and setting.
pub struct TraceManager {
    secret_masker: SecretMasker,
    default_setting: TraceSetting,
}

impl TraceManager {
    pub fn new(secret_masker: SecretMasker, setting: TraceSetting) -> Self {
        Self {
            secret_masker,
            default_setting: setting,
        }
    }

    pub fn get(&self, name: &str) -> Tracing {
        Tracing::new(name, self.secret_masker.clone(), self.default_setting.clone())
    }

    pub fn secret_masker(&self) -> &SecretMasker {
        &self.secret_masker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_chain_masks_secrets_in_every_cause() {
        let manager = TraceManager::new(SecretMasker::new(), TraceSetting::default());
        manager.secret_masker().add_value("AAREGSECRETTOKEN");
        let err = anyhow::anyhow!("arguments '--url u --token AAREGSECRETTOKEN'")
            .context("Runner configuration failed");

        let text = manager.get("Provisioner").format_error_chain(&err);
        assert!(!text.contains("AAREGSECRETTOKEN"));
        assert_eq!(
            text,
            "Runner configuration failed\n  caused by: arguments '--url u --token ***'"
        );
    }

    #[test]
    fn sources_share_the_masker() {
        let manager = TraceManager::new(SecretMasker::new(), TraceSetting::default());
        let a = manager.get("A");
        manager.secret_masker().add_value("ghp_secret");
        assert_eq!(a.secret_masker.mask_secrets("token ghp_secret"), "token ***");
        assert_eq!(a.name(), "A");
    }

    #[test]
    fn levels_are_ordered() {
        assert!(TraceEventType::Verbose < TraceEventType::Information);
        assert!(TraceEventType::Warning < TraceEventType::Error);
    }

    #[test]
    fn tracing_is_a_trace_writer() {
        let manager = TraceManager::new(SecretMasker::new(), TraceSetting::default());
        let writer: std::sync::Arc<dyn TraceWriter> = std::sync::Arc::new(manager.get("Test"));
        writer.info("hello");
        writer.verbose("details");
        writer.warning("careful");
        writer.error("broken");
        let err = anyhow::anyhow!("inner").context("outer");
        manager.get("Test").error_chain(&err);
    }
}
