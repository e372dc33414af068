use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::trust::{self, TrustLevel, TrustPolicy};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Process-wide trust policy.
    #[serde(default)]
    pub trust: TrustPolicy,
    /// Per-capability overrides, keyed by capability name.
    #[serde(default)]
    pub capabilities: BTreeMap<String, CapabilityOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityOverride {
    /// A disabled capability is never registered; calls to it fail closed.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Raise or lower the minimum trust the capability declares.
    #[serde(default)]
    pub min_trust: Option<TrustLevel>,
}

impl Default for CapabilityOverride {
    fn default() -> Self {
        Self {
            enabled: true,
            min_trust: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Expand environment variables like ${HOSTGATE_RELEASE_KEY}
        let expanded = shellexpand::env(&content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config file, or falls back to the built-in defaults
    /// (floor-level policy, untouched catalog) when it does not exist.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            info!("No config file at {path}, using defaults");
            return Ok(Config::default());
        }
        Self::load(path)
    }

    /// Effective override for one capability (defaults when unconfigured).
    pub fn capability(&self, name: &str) -> CapabilityOverride {
        self.capabilities.get(name).cloned().unwrap_or_default()
    }

    /// A signer key that cannot decode would otherwise surface as a skipped
    /// entry at first evaluation; fail at startup instead.
    fn validate(&self) -> anyhow::Result<()> {
        for signer in &self.trust.signers {
            if let Err(e) = trust::decode_verifying_key(&signer.public_key) {
                anyhow::bail!("trust.signers entry {:?}: {e}", signer.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use ed25519_dalek::SigningKey;
    use std::io::Write;

    fn test_key_b64() -> String {
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        BASE64.encode(key.verifying_key().to_bytes())
    }

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.trust.default_level, TrustLevel::Untrusted);
        assert!(config.trust.signers.is_empty());
        assert!(config.capability("print").enabled);
        assert!(config.capability("print").min_trust.is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let key = test_key_b64();
        let content = format!(
            r#"
[trust]
default_level = "untrusted"

[[trust.signers]]
name = "release"
public_key = "{key}"
level = "trusted"

[trust.origins]
"ci-build" = "limited"

[capabilities.sysinfo]
enabled = false

[capabilities.host_log]
min_trust = "untrusted"
"#
        );
        let file = write_config(&content);
        let config = Config::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.trust.signers.len(), 1);
        assert_eq!(config.trust.signers[0].level, TrustLevel::Trusted);
        assert_eq!(
            config.trust.origins.get("ci-build"),
            Some(&TrustLevel::Limited)
        );
        assert!(!config.capability("sysinfo").enabled);
        assert_eq!(
            config.capability("host_log").min_trust,
            Some(TrustLevel::Untrusted)
        );
    }

    #[test]
    fn test_env_vars_expanded() {
        std::env::set_var("HOSTGATE_TEST_KEY", test_key_b64());
        let content = "\
[[trust.signers]]
name = \"release\"
public_key = \"${HOSTGATE_TEST_KEY}\"
level = \"trusted\"
";
        let file = write_config(content);
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(
            config.trust.signers[0].public_key,
            std::env::var("HOSTGATE_TEST_KEY").unwrap()
        );
    }

    #[test]
    fn test_malformed_signer_key_fails_at_load() {
        let content = "\
[[trust.signers]]
name = \"broken\"
public_key = \"not base64!!!\"
level = \"trusted\"
";
        let file = write_config(content);
        let err = Config::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_unknown_trust_level_rejected() {
        assert!(toml::from_str::<Config>("[trust]\ndefault_level = \"root\"\n").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/hostgate.toml").unwrap();
        assert_eq!(config.trust.default_level, TrustLevel::Untrusted);
    }
}
