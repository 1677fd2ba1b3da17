//! Policy configuration types and loading.
//!
//! Loading is atomic: either every configured entry parses into a valid
//! [`TrustRule`] and a [`Policy`] is returned, or the whole load fails with a
//! [`PolicyError`] naming the offending entry. A partially applied trust set
//! is never produced.

use std::path::Path;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use serde::Deserialize;
use thiserror::Error;

use super::rules::{Policy, TrustRule};

/// Default policy file location
const DEFAULT_POLICY_PATH: &str = "/etc/netgate/policy.yaml";

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to read policy file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse policy YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Policy file not found: {0}")]
    NotFound(String),

    #[error("Invalid trusted network '{network}' (label '{label}'): {source}")]
    InvalidNetwork {
        network: String,
        label: String,
        source: ipnetwork::IpNetworkError,
    },

    #[error("Policy disables the fail-secure default; default_requires_second_factor must be true")]
    InsecureDefault,
}

/// One trusted-network entry as written in the policy file.
#[derive(Debug, Clone, Deserialize)]
pub struct TrustRuleEntry {
    /// CIDR string, e.g. "192.168.1.0/24"
    pub network: String,
    /// Human-readable name for audit output
    pub label: String,
}

/// Raw policy document, prior to validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyFile {
    /// Trusted networks, in evaluation order
    pub trusted_networks: Vec<TrustRuleEntry>,
    /// Must be true. The field exists only so an explicit `false` in the
    /// source is rejected loudly instead of silently ignored.
    pub default_requires_second_factor: bool,
}

impl Default for PolicyFile {
    fn default() -> Self {
        Self {
            trusted_networks: Vec::new(),
            default_requires_second_factor: true,
        }
    }
}

impl PolicyFile {
    /// Load the raw policy document from the default location.
    pub fn load() -> Result<Self, PolicyError> {
        Self::load_from(DEFAULT_POLICY_PATH)
    }

    /// Load the raw policy document from a specific path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PolicyError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let file: PolicyFile = serde_yaml::from_str(&content)?;
        Ok(file)
    }

    /// Load the raw policy document from environment variables.
    ///
    /// `NETGATE_POLICY_FILE` names a file, `NETGATE_POLICY_YAML` carries an
    /// inline document; the file takes precedence. Falls back to the default
    /// location when neither is set.
    pub fn from_env() -> Result<Self, PolicyError> {
        if let Ok(path) = std::env::var("NETGATE_POLICY_FILE") {
            return Self::load_from(&path);
        }

        if let Ok(yaml) = std::env::var("NETGATE_POLICY_YAML") {
            let file: PolicyFile = serde_yaml::from_str(&yaml)?;
            return Ok(file);
        }

        Self::load()
    }

    /// Validate the document into an immutable [`Policy`].
    ///
    /// Fails on the first invalid entry; nothing is returned in that case.
    pub fn into_policy(self) -> Result<Policy, PolicyError> {
        if !self.default_requires_second_factor {
            return Err(PolicyError::InsecureDefault);
        }

        let mut rules = Vec::with_capacity(self.trusted_networks.len());
        for entry in self.trusted_networks {
            let network = IpNetwork::from_str(&entry.network).map_err(|source| {
                PolicyError::InvalidNetwork {
                    network: entry.network.clone(),
                    label: entry.label.clone(),
                    source,
                }
            })?;
            rules.push(TrustRule::new(network, entry.label));
        }

        Ok(Policy::new(rules))
    }
}

impl Policy {
    /// Load and validate a policy from the default location.
    pub fn load() -> Result<Self, PolicyError> {
        PolicyFile::load()?.into_policy()
    }

    /// Load and validate a policy from a specific path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, PolicyError> {
        PolicyFile::load_from(path)?.into_policy()
    }

    /// Load and validate a policy from environment configuration.
    pub fn from_env() -> Result<Self, PolicyError> {
        PolicyFile::from_env()?.into_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_policy() {
        let yaml = r#"
trusted_networks:
  - network: "192.168.1.0/24"
    label: home-lan
  - network: "10.8.0.0/16"
    label: site-vpn
"#;
        let file: PolicyFile = serde_yaml::from_str(yaml).unwrap();
        let policy = file.into_policy().unwrap();

        assert_eq!(policy.rules().len(), 2);
        assert_eq!(policy.rules()[0].label, "home-lan");
        assert_eq!(policy.rules()[1].label, "site-vpn");
    }

    #[test]
    fn test_default_policy_is_fail_secure() {
        let file = PolicyFile::default();
        assert!(file.default_requires_second_factor);

        let policy = file.into_policy().unwrap();
        assert!(policy.decide(Some("192.168.1.50")).second_factor_required);
    }

    #[test]
    fn test_invalid_prefix_length_rejects_whole_policy() {
        let yaml = r#"
trusted_networks:
  - network: "10.0.0.0/8"
    label: ok
  - network: "192.168.1.0/99"
    label: broken
"#;
        let file: PolicyFile = serde_yaml::from_str(yaml).unwrap();

        let err = file.into_policy().unwrap_err();
        match err {
            PolicyError::InvalidNetwork { network, label, .. } => {
                assert_eq!(network, "192.168.1.0/99");
                assert_eq!(label, "broken");
            }
            other => panic!("expected InvalidNetwork, got {other:?}"),
        }
    }

    #[test]
    fn test_non_ip_network_rejects_whole_policy() {
        let yaml = r#"
trusted_networks:
  - network: "not-an-ip"
    label: broken
"#;
        let file: PolicyFile = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            file.into_policy(),
            Err(PolicyError::InvalidNetwork { .. })
        ));
    }

    #[test]
    fn test_insecure_default_is_rejected() {
        let yaml = r#"
default_requires_second_factor: false
trusted_networks: []
"#;
        let file: PolicyFile = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            file.into_policy(),
            Err(PolicyError::InsecureDefault)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("policy.yaml");

        std::fs::write(
            &path,
            r#"
trusted_networks:
  - network: "192.168.1.0/24"
    label: home-lan
"#,
        )
        .unwrap();

        let policy = Policy::load_from(&path).unwrap();
        assert_eq!(policy.rules().len(), 1);
        assert!(!policy.decide(Some("192.168.1.50")).second_factor_required);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("does-not-exist.yaml");

        assert!(matches!(
            Policy::load_from(&path),
            Err(PolicyError::NotFound(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(&path, "trusted_networks: [ {{ nope").unwrap();

        assert!(matches!(Policy::load_from(&path), Err(PolicyError::Parse(_))));
    }
}
