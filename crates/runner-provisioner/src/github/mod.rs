pub mod api_client;
pub mod scope;

pub use api_client::{GitHubClient, RegistrationToken, Release, RunnerPackage};
pub use scope::{RunnerScope, ScopeKind};
