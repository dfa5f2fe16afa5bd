use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resolve::ResolveError;

/// One registered slash command for one tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandRegistration {
    pub command: String,
    pub signing_secret: String,
    pub team_domain: String,
}

impl CommandRegistration {
    pub fn new(
        command: impl Into<String>,
        signing_secret: impl Into<String>,
        team_domain: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            signing_secret: signing_secret.into(),
            team_domain: team_domain.into(),
        }
    }
}

impl fmt::Debug for CommandRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistration")
            .field("command", &self.command)
            .field("signing_secret", &"<redacted>")
            .field("team_domain", &self.team_domain)
            .finish()
    }
}

/// Read-only set of registrations, built once at startup.
///
/// Lookups go through an index keyed by team domain then command. When the
/// same pair is registered twice the first registration wins, matching
/// [`crate::resolve::resolve`].
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    registrations: Vec<CommandRegistration>,
    index: HashMap<String, HashMap<String, usize>>,
}

impl CommandRegistry {
    pub fn new(registrations: Vec<CommandRegistration>) -> Self {
        let mut index: HashMap<String, HashMap<String, usize>> = HashMap::new();
        for (position, registration) in registrations.iter().enumerate() {
            index
                .entry(registration.team_domain.clone())
                .or_default()
                .entry(registration.command.clone())
                .or_insert(position);
        }
        Self {
            registrations,
            index,
        }
    }

    pub fn resolve(
        &self,
        team_domain: &str,
        command: &str,
    ) -> Result<&CommandRegistration, ResolveError> {
        self.index
            .get(team_domain)
            .and_then(|commands| commands.get(command))
            .map(|&position| &self.registrations[position])
            .ok_or_else(|| ResolveError::not_found(team_domain, command))
    }

    pub fn registrations(&self) -> &[CommandRegistration] {
        &self.registrations
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn validate(&self) -> ConfigReport {
        validate(&self.registrations)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigReport {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Checks a registration list for entries that can never match or that
/// shadow each other.
pub fn validate(registrations: &[CommandRegistration]) -> ConfigReport {
    let mut report = ConfigReport::default();
    if registrations.is_empty() {
        report
            .warnings
            .push("no commands registered; every request will be rejected".to_string());
    }
    for (idx, registration) in registrations.iter().enumerate() {
        for (field, value) in [
            ("command", &registration.command),
            ("signing_secret", &registration.signing_secret),
            ("team_domain", &registration.team_domain),
        ] {
            if value.trim().is_empty() {
                report.errors.push(format!("commands[{idx}].{field} is empty"));
            }
        }
        if !registration.command.is_empty() && !registration.command.starts_with('/') {
            report.warnings.push(format!(
                "commands[{idx}].command '{}' does not start with '/'",
                registration.command
            ));
        }
        if let Some(first_idx) = registrations[..idx].iter().position(|earlier| {
            earlier.team_domain == registration.team_domain
                && earlier.command == registration.command
        }) {
            report.warnings.push(format!(
                "commands[{idx}] duplicates commands[{first_idx}] ({} in {}) and is never used",
                registration.command, registration.team_domain
            ));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve;

    fn registry() -> CommandRegistry {
        CommandRegistry::new(vec![
            CommandRegistration::new("/weather", "secret-a", "acme.slack.com"),
            CommandRegistration::new("/deploy", "secret-b", "acme.slack.com"),
            CommandRegistration::new("/weather", "secret-c", "globex.slack.com"),
            CommandRegistration::new("/weather", "secret-d", "acme.slack.com"),
        ])
    }

    #[test]
    fn resolves_registered_pair() {
        let registry = registry();
        let found = registry.resolve("globex.slack.com", "/weather").unwrap();
        assert_eq!(found.signing_secret, "secret-c");
    }

    #[test]
    fn first_registration_wins() {
        let registry = registry();
        let found = registry.resolve("acme.slack.com", "/weather").unwrap();
        assert_eq!(found.signing_secret, "secret-a");
    }

    #[test]
    fn index_agrees_with_linear_scan() {
        let registry = registry();
        for (team, command) in [
            ("acme.slack.com", "/weather"),
            ("acme.slack.com", "/deploy"),
            ("globex.slack.com", "/weather"),
            ("globex.slack.com", "/deploy"),
            ("ACME.slack.com", "/weather"),
        ] {
            assert_eq!(
                registry.resolve(team, command),
                resolve::resolve(registry.registrations(), team, command)
            );
        }
    }

    #[test]
    fn unknown_pair_is_not_found() {
        let registry = registry();
        let err = registry.resolve("acme.slack.com", "/Weather").unwrap_err();
        assert_eq!(err, ResolveError::not_found("acme.slack.com", "/Weather"));
    }

    #[test]
    fn debug_redacts_secret() {
        let registration = CommandRegistration::new("/weather", "hunter2", "acme");
        let rendered = format!("{registration:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("/weather"));
    }

    #[test]
    fn deserialize_rejects_unknown_fields() {
        let json = r#"{"command":"/a","signing_secret":"s","team_domain":"t","extra":1}"#;
        let err = serde_json::from_str::<CommandRegistration>(json).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn validation_reports_duplicates_and_blanks() {
        let report = registry().validate();
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("commands[3] duplicates commands[0]"));

        let report = validate(&[
            CommandRegistration::new("weather", "", "acme"),
            CommandRegistration::new("/ok", "s", " "),
        ]);
        assert_eq!(
            report.errors,
            vec![
                "commands[0].signing_secret is empty".to_string(),
                "commands[1].team_domain is empty".to_string(),
            ]
        );
        assert!(report.warnings[0].contains("does not start with '/'"));
    }

    #[test]
    fn empty_registry_warns() {
        let report = CommandRegistry::default().validate();
        assert!(!report.has_errors());
        assert!(!report.is_empty());
    }
}
