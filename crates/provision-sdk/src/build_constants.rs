//! Build-time metadata for the provisioner binaries.

/// Source control information.
pub struct Source;

impl Source {
    /// Set via `PROVISION_COMMIT_HASH` at compile time, or "N/A".
    pub const COMMIT_HASH: &'static str = match option_env!("PROVISION_COMMIT_HASH") {
        Some(h) => h,
        None => "N/A",
    };
}

/// Package metadata.
#[derive(Debug, Clone)]
pub struct ProvisionerPackage;

impl ProvisionerPackage {
    /// Pulled from `CARGO_PKG_VERSION`.
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    /// Product token used in the `User-Agent` header.
    pub const PRODUCT: &'static str = "runner-provision";

    /// `runner-provision/<version>`.
    pub fn user_agent() -> String {
        format!("{}/{}", Self::PRODUCT, Self::VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!ProvisionerPackage::VERSION.is_empty());
    }

    #[test]
    fn commit_hash_has_default() {
        assert!(!Source::COMMIT_HASH.is_empty());
    }

    #[test]
    fn user_agent_has_product_and_version() {
        let ua = ProvisionerPackage::user_agent();
        assert!(ua.starts_with("runner-provision/"));
        assert!(ua.ends_with(ProvisionerPackage::VERSION));
    }
}
