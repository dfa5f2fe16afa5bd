use thiserror::Error;

use crate::config::CommandRegistration;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("command '{command}' is not registered for team '{team_domain}'")]
pub struct ResolveError {
    pub team_domain: String,
    pub command: String,
}

impl ResolveError {
    pub fn not_found(team_domain: &str, command: &str) -> Self {
        Self {
            team_domain: team_domain.to_string(),
            command: command.to_string(),
        }
    }
}

/// Returns the first registration whose team domain and command both match
/// exactly.
pub fn resolve<'a>(
    registrations: &'a [CommandRegistration],
    team_domain: &str,
    command: &str,
) -> Result<&'a CommandRegistration, ResolveError> {
    registrations
        .iter()
        .find(|registration| {
            registration.team_domain == team_domain && registration.command == command
        })
        .ok_or_else(|| ResolveError::not_found(team_domain, command))
}
