// runner-provisioner: registers, installs and launches a self-hosted GitHub
// Actions runner, then supervises it until it reports that it is listening.
//
// Architecture:
//   main → Provisioner::execute_command → provision / watch
//   provision: GitHubClient (token, release) → PackageInstaller → RunnerConfigurator → Supervisor

pub mod cli;
pub mod configuration;
pub mod github;
pub mod package;
pub mod provisioner;

#[cfg(test)]
mod test_support;
