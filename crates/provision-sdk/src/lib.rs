// provision-sdk: foundation layer for the runner provisioner.
// No dependencies on the other provisioner crates. Provides process
// supervision, command execution and the tracing abstraction.

pub mod build_constants;
pub mod command_spec;
pub mod process_invoker;
pub mod process_termination;
pub mod proxy_settings;
pub mod supervisor;
pub mod trace;

// Re-export commonly used items at crate root
pub use build_constants::{ProvisionerPackage, Source};
pub use command_spec::CommandSpec;
pub use process_invoker::{ProcessExitCodeError, ProcessInvoker};
pub use proxy_settings::ProxySettings;
pub use supervisor::{
    ContainsText, MatchesPattern, Outcome, Phase, ReadinessProbe, ReadyProcess, StreamEnd,
    Supervisor, SupervisorError, SupervisorOptions,
};
pub use trace::TraceWriter;
