// Thread-safe store of secret values (PAT, registration token, proxy
// passwords) that are replaced with `***` in anything logged or echoed.

use parking_lot::RwLock;
use std::sync::Arc;

/// Replacement text used when a secret is found.
const MASK: &str = "***";

/// Values shorter than this are not registered; masking them would shred
/// ordinary output.
const MIN_SECRET_LENGTH: usize = 3;

/// Cheap to clone; clones share the same secret set.
#[derive(Debug, Clone, Default)]
pub struct SecretMasker {
    // Longest first, so a secret containing another is masked whole.
    secrets: Arc<RwLock<Vec<String>>>,
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret. Returns `false` when the value was ignored
    /// (blank, too short or already known).
    pub fn add_value(&self, secret: &str) -> bool {
        let secret = secret.trim();
        if secret.len() < MIN_SECRET_LENGTH {
            return false;
        }

        let mut secrets = self.secrets.write();
        if secrets.iter().any(|s| s == secret) {
            return false;
        }
        let at = secrets.partition_point(|s| s.len() >= secret.len());
        secrets.insert(at, secret.to_string());
        true
    }

    pub fn add_values<'a>(&self, secrets: impl IntoIterator<Item = &'a str>) {
        for secret in secrets {
            self.add_value(secret);
        }
    }

    /// Replace every registered secret in `input` with `***`.
    pub fn mask_secrets(&self, input: &str) -> String {
        let secrets = self.secrets.read();
        let mut result = input.to_string();
        for secret in secrets.iter() {
            if result.contains(secret.as_str()) {
                result = result.replace(secret.as_str(), MASK);
            }
        }
        result
    }

    pub fn secret_count(&self) -> usize {
        self.secrets.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_token_in_line() {
        let masker = SecretMasker::new();
        assert!(masker.add_value("AABBCCDDEE"));
        assert_eq!(
            masker.mask_secrets("./config.sh --token AABBCCDDEE --unattended"),
            "./config.sh --token *** --unattended"
        );
    }

    #[test]
    fn longer_secret_wins_over_contained_one() {
        let masker = SecretMasker::new();
        masker.add_value("pass");
        masker.add_value("password");
        assert_eq!(masker.mask_secrets("my password is here"), "my *** is here");
    }

    #[test]
    fn blank_short_and_duplicate_values_are_ignored() {
        let masker = SecretMasker::new();
        assert!(!masker.add_value(""));
        assert!(!masker.add_value("   "));
        assert!(!masker.add_value("ab"));
        assert!(masker.add_value(" ghp_123 "));
        assert!(!masker.add_value("ghp_123"));
        assert_eq!(masker.secret_count(), 1);
    }

    #[test]
    fn clones_share_secrets() {
        let masker = SecretMasker::new();
        let clone = masker.clone();
        clone.add_values(["ghp_abc", "AAREGTOKEN"]);
        assert_eq!(masker.mask_secrets("ghp_abc AAREGTOKEN"), "*** ***");
    }

    #[test]
    fn no_secrets_passthrough() {
        let masker = SecretMasker::new();
        assert_eq!(masker.mask_secrets("Listening for Jobs"), "Listening for Jobs");
    }
}
