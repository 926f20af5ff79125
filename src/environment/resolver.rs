//! Credential resolution
//!
//! Merges CLI flags, the process environment and (optionally) a previously
//! written descriptor into an immutable [`RuntimeEnvironment`]. Only secret
//! *names* are ever logged.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use super::descriptor::write_descriptor;
use crate::error::{PodError, Result};
use crate::logging::Logger;

/// Values shorter than this are suspicious but still accepted
pub const PLAUSIBLE_SECRET_LEN: usize = 20;

/// Whether a secret must be present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    /// Absence disables the named capability
    Optional { capability: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct SecretSpec {
    pub name: &'static str,
    pub requirement: Requirement,
}

/// Name of the AI provider credential
pub const PROVIDER_CREDENTIAL: &str = "ANTHROPIC_API_KEY";
pub const SOURCE_CONTROL_TOKEN: &str = "GITHUB_TOKEN";
pub const SEARCH_API_KEY: &str = "SEARCH_API_KEY";

/// Every secret the workload knows about
pub const SECRETS: &[SecretSpec] = &[
    SecretSpec {
        name: PROVIDER_CREDENTIAL,
        requirement: Requirement::Required,
    },
    SecretSpec {
        name: SOURCE_CONTROL_TOKEN,
        requirement: Requirement::Optional { capability: "source_control" },
    },
    SecretSpec {
        name: SEARCH_API_KEY,
        requirement: Requirement::Optional { capability: "web_search" },
    },
];

/// Descriptor variable recording whether `capability` is usable
pub fn capability_var(capability: &str) -> String {
    format!("AGENTPOD_CAPABILITY_{}", capability.to_uppercase())
}

/// Secrets passed explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct SecretOverrides {
    pub credential: Option<String>,
    pub github_token: Option<String>,
    pub search_api_key: Option<String>,
}

impl SecretOverrides {
    fn get(&self, name: &str) -> Option<&str> {
        match name {
            PROVIDER_CREDENTIAL => self.credential.as_deref(),
            SOURCE_CONTROL_TOKEN => self.github_token.as_deref(),
            SEARCH_API_KEY => self.search_api_key.as_deref(),
            _ => None,
        }
    }
}

/// Validated, immutable set of credentials for one invocation
#[derive(Clone, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    values: BTreeMap<String, String>,
    capabilities: BTreeMap<String, bool>,
}

impl RuntimeEnvironment {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Names of the secrets that are set
    pub fn names(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    /// Optional capability name → enabled
    pub fn capabilities(&self) -> &BTreeMap<String, bool> {
        &self.capabilities
    }

    pub fn capability_enabled(&self, capability: &str) -> bool {
        self.capabilities.get(capability).copied().unwrap_or(false)
    }

    /// Secret values plus one `enabled`/`disabled` flag per optional capability
    pub fn descriptor_entries(&self) -> BTreeMap<String, String> {
        let mut entries = self.values.clone();
        for (capability, enabled) in &self.capabilities {
            let flag = if *enabled { "enabled" } else { "disabled" };
            entries.insert(capability_var(capability), flag.to_string());
        }
        entries
    }

    /// Persist as an owner-only descriptor file
    pub fn write_descriptor(&self, path: &Path, logger: &Logger) -> Result<()> {
        write_descriptor(path, &self.descriptor_entries())?;
        logger.info(
            "env_descriptor",
            format!("wrote {} ({})", path.display(), self.names().join(", ")),
        );
        Ok(())
    }
}

impl fmt::Debug for RuntimeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeEnvironment")
            .field("names", &self.names())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Layer process environment values over those from a descriptor file
pub fn layer_sources(
    descriptor: Option<BTreeMap<String, String>>,
    process_env: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged: HashMap<String, String> = descriptor.unwrap_or_default().into_iter().collect();
    for spec in SECRETS {
        if let Some(value) = process_env.get(spec.name) {
            if !value.trim().is_empty() {
                merged.insert(spec.name.to_string(), value.clone());
            }
        }
    }
    merged
}

/// Resolve credentials. CLI flags win over the environment.
pub fn resolve(
    cli: &SecretOverrides,
    process_env: &HashMap<String, String>,
    logger: &Logger,
) -> Result<RuntimeEnvironment> {
    let mut values = BTreeMap::new();
    let mut capabilities = BTreeMap::new();

    for spec in SECRETS {
        let value = cli
            .get(spec.name)
            .or_else(|| process_env.get(spec.name).map(String::as_str))
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match (value, spec.requirement) {
            (Some(v), requirement) => {
                if v.len() < PLAUSIBLE_SECRET_LEN {
                    logger.warn(
                        "env_validate",
                        format!("{} looks too short ({} chars); using it anyway", spec.name, v.len()),
                    );
                }
                if let Requirement::Optional { capability } = requirement {
                    capabilities.insert(capability.to_string(), true);
                }
                values.insert(spec.name.to_string(), v.to_string());
            }
            (None, Requirement::Required) => {
                logger.error("env_validate", format!("required secret {} is not set", spec.name));
                return Err(PodError::MissingRequiredSecret(spec.name.to_string()));
            }
            (None, Requirement::Optional { capability }) => {
                logger.info(
                    "env_validate",
                    format!("{} not set; capability '{}' disabled", spec.name, capability),
                );
                capabilities.insert(capability.to_string(), false);
            }
        }
    }

    let resolved = RuntimeEnvironment { values, capabilities };
    logger.debug("env_validate", format!("resolved secrets: {}", resolved.names().join(", ")));
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogConfig, LogLevel, SharedBuffer};

    const GOOD_KEY: &str = "sk-ant-REDACTED";

    fn capture() -> (Logger, SharedBuffer) {
        let console = SharedBuffer::new();
        let mut config = LogConfig::console_only(LogLevel::Debug);
        config.color = false;
        (Logger::with_console(config, Box::new(console.clone())), console)
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_required_only_disables_optional() {
        let (logger, console) = capture();
        let resolved = resolve(
            &SecretOverrides::default(),
            &env(&[(PROVIDER_CREDENTIAL, GOOD_KEY)]),
            &logger,
        )
        .unwrap();

        assert_eq!(resolved.get(PROVIDER_CREDENTIAL), Some(GOOD_KEY));
        assert!(!resolved.capability_enabled("source_control"));
        assert!(!resolved.capability_enabled("web_search"));
        assert_eq!(resolved.capabilities().len(), 2);
        assert!(console.contents().contains("capability 'source_control' disabled"));
    }

    #[test]
    fn test_missing_required_fails() {
        let (logger, _) = capture();
        let err = resolve(
            &SecretOverrides::default(),
            &env(&[(SOURCE_CONTROL_TOKEN, GOOD_KEY)]),
            &logger,
        )
        .unwrap_err();
        assert!(matches!(err, PodError::MissingRequiredSecret(ref n) if n == PROVIDER_CREDENTIAL));
    }

    #[test]
    fn test_blank_required_counts_as_missing() {
        let (logger, _) = capture();
        let result = resolve(&SecretOverrides::default(), &env(&[(PROVIDER_CREDENTIAL, "   ")]), &logger);
        assert!(matches!(result, Err(PodError::MissingRequiredSecret(_))));
    }

    #[test]
    fn test_cli_overrides_env() {
        let (logger, _) = capture();
        let cli = SecretOverrides {
            credential: Some("sk-from-cli-0123456789abcdef".to_string()),
            ..Default::default()
        };
        let resolved = resolve(&cli, &env(&[(PROVIDER_CREDENTIAL, GOOD_KEY)]), &logger).unwrap();
        assert_eq!(resolved.get(PROVIDER_CREDENTIAL), Some("sk-from-cli-0123456789abcdef"));
    }

    #[test]
    fn test_short_credential_warns_but_succeeds() {
        let (logger, console) = capture();
        let resolved = resolve(&SecretOverrides::default(), &env(&[(PROVIDER_CREDENTIAL, "short")]), &logger);
        assert!(resolved.is_ok());
        assert!(console.contents().contains("WARN"));
        assert!(console.contents().contains("looks too short"));
    }

    #[test]
    fn test_values_never_logged() {
        let (logger, console) = capture();
        let cli = SecretOverrides {
            github_token: Some("ghp_supersecretvalue0123456789".to_string()),
            ..Default::default()
        };
        let resolved = resolve(&cli, &env(&[(PROVIDER_CREDENTIAL, GOOD_KEY)]), &logger).unwrap();
        let out = console.contents();
        assert!(!out.contains(GOOD_KEY));
        assert!(!out.contains("ghp_supersecretvalue"));
        assert!(resolved.capability_enabled("source_control"));
        assert!(!format!("{:?}", resolved).contains(GOOD_KEY));
    }

    #[test]
    fn test_descriptor_records_disabled_capabilities() {
        let (logger, _) = capture();
        let cli = SecretOverrides {
            search_api_key: Some("search-0123456789abcdefghij".to_string()),
            ..Default::default()
        };
        let resolved = resolve(&cli, &env(&[(PROVIDER_CREDENTIAL, GOOD_KEY)]), &logger).unwrap();
        let entries = resolved.descriptor_entries();
        assert_eq!(entries["AGENTPOD_CAPABILITY_SOURCE_CONTROL"], "disabled");
        assert_eq!(entries["AGENTPOD_CAPABILITY_WEB_SEARCH"], "enabled");
        assert_eq!(entries[PROVIDER_CREDENTIAL], GOOD_KEY);
        assert!(!entries.contains_key(SOURCE_CONTROL_TOKEN));
    }

    #[test]
    fn test_layer_sources_prefers_process_env() {
        let mut descriptor = BTreeMap::new();
        descriptor.insert(PROVIDER_CREDENTIAL.to_string(), "from-file".to_string());
        descriptor.insert(SEARCH_API_KEY.to_string(), "search-from-file".to_string());
        let merged = layer_sources(Some(descriptor), &env(&[(PROVIDER_CREDENTIAL, "from-env"), ("PATH", "/bin")]));
        assert_eq!(merged[PROVIDER_CREDENTIAL], "from-env");
        assert_eq!(merged[SEARCH_API_KEY], "search-from-file");
        assert!(!merged.contains_key("PATH"));
    }
}
