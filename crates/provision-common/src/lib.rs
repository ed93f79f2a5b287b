// provision-common: shared services for the runner provisioner.
// Depends on `provision-sdk`.

pub mod constants;
pub mod errors;
pub mod host_context;
pub mod http_client_factory;
pub mod secret_masker;
pub mod tracing;

// ---------------------------------------------------------------------------
// Re-exports for convenient access
// ---------------------------------------------------------------------------

pub use constants::{Architecture, OsPlatform, CURRENT_ARCHITECTURE, CURRENT_PLATFORM};
pub use errors::NonRetryableError;
pub use host_context::{HostContext, ShutdownReason};
pub use http_client_factory::HttpClientFactory;
pub use secret_masker::SecretMasker;
pub use crate::tracing::{TraceEventType, TraceManager, TraceSetting, Tracing};
