//! Trust evaluation.
//!
//! A guest's trust is decided once, at a single well-defined lifecycle
//! point, and frozen on the instance for its lifetime. The gateway receives
//! the verdict explicitly on every capability call; nothing reads trust from
//! shared mutable state. Re-evaluation exists but is an explicit, exclusive
//! operation on the owning lifecycle manager.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::HostError;
use crate::manifest::ModuleIdentity;

/// Ordered trust scale. The derived order is the comparison the gateway
/// uses: a caller at some level meets every minimum at or below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Untrusted,
    Limited,
    Trusted,
}

impl TrustLevel {
    /// The lowest level on the scale, granted when evidence is absent or
    /// malformed.
    pub fn floor() -> Self {
        TrustLevel::Untrusted
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrustLevel::Untrusted => "untrusted",
            TrustLevel::Limited => "limited",
            TrustLevel::Trusted => "trusted",
        };
        f.write_str(s)
    }
}

/// Result of evaluating one guest instance.
///
/// `reason` is the audit trail: which evidence produced this level. For
/// identical identity, evidence, and policy, `level` and `reason` are
/// identical too; only the timestamp varies between runs.
#[derive(Debug, Clone, Serialize)]
pub struct TrustVerdict {
    pub level: TrustLevel,
    pub evaluated_at: DateTime<Utc>,
    pub reason: String,
}

impl TrustVerdict {
    pub fn new(level: TrustLevel, reason: impl Into<String>) -> Self {
        Self {
            level,
            evaluated_at: Utc::now(),
            reason: reason.into(),
        }
    }

    /// Does this verdict meet the given minimum?
    pub fn meets(&self, required: TrustLevel) -> bool {
        self.level >= required
    }
}

/// Evidence supplied alongside a module at load time.
///
/// Both fields are base64: the claimed signer's ed25519 verifying key, and
/// a signature over the module's sha256 content hash. Supplying one without
/// the other is malformed evidence.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub public_key: Option<String>,
    pub signature: Option<String>,
}

impl Evidence {
    /// No evidence at all; the policy default (or an origin mapping) applies.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn signed(public_key: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            public_key: Some(public_key.into()),
            signature: Some(signature.into()),
        }
    }
}

/// One signer the host operator trusts, and the level their signature grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TrustedSigner {
    pub name: String,
    /// Base64 ed25519 verifying key.
    pub public_key: String,
    pub level: TrustLevel,
}

/// Process-wide trust policy, read from configuration at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct TrustPolicy {
    /// Level granted when no evidence matches anything in the policy.
    #[serde(default = "TrustLevel::floor")]
    pub default_level: TrustLevel,
    #[serde(default)]
    pub signers: Vec<TrustedSigner>,
    /// Origin tag → level granted to unsigned modules from that origin.
    #[serde(default)]
    pub origins: BTreeMap<String, TrustLevel>,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            default_level: TrustLevel::floor(),
            signers: Vec::new(),
            origins: BTreeMap::new(),
        }
    }
}

/// Computes trust verdicts. Pure function of identity, evidence, and the
/// process-wide policy; no side effects beyond audit logging.
pub struct TrustEvaluator {
    policy: TrustPolicy,
}

impl TrustEvaluator {
    pub fn new(policy: TrustPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Evaluates a module identity against the supplied evidence.
    ///
    /// Never fails. Malformed evidence downgrades to the floor level with
    /// the defect recorded in the verdict reason: garbage evidence must not
    /// be able to take the host down or block other guests. Resolution
    /// order: a verified signature by a configured signer grants that
    /// signer's level; otherwise an origin mapping applies; otherwise the
    /// policy default.
    pub fn evaluate(&self, identity: &ModuleIdentity, evidence: &Evidence) -> TrustVerdict {
        let mut note = "";
        if let (Some(key), Some(sig)) = (&evidence.public_key, &evidence.signature) {
            match self.check_signature(identity, key, sig) {
                Ok(Some(verdict)) => return verdict,
                Ok(None) => note = "valid signature by a signer not in the trust policy; ",
                Err(err) => {
                    warn!(error = %err, "malformed trust evidence, downgrading to floor level");
                    return TrustVerdict::new(TrustLevel::floor(), err.to_string());
                }
            }
        } else if evidence.public_key.is_some() || evidence.signature.is_some() {
            warn!("incomplete signature evidence, downgrading to floor level");
            return TrustVerdict::new(
                TrustLevel::floor(),
                "invalid trust evidence: signature evidence requires both public_key and signature",
            );
        }

        if let Some(origin) = identity.origin.as_deref() {
            if let Some(level) = self.policy.origins.get(origin) {
                return TrustVerdict::new(
                    *level,
                    format!("{note}origin {origin:?} mapped by trust policy"),
                );
            }
            return TrustVerdict::new(
                self.policy.default_level,
                format!("{note}origin {origin:?} not in trust policy, policy default applies"),
            );
        }

        TrustVerdict::new(
            self.policy.default_level,
            format!("{note}no evidence, policy default applies"),
        )
    }

    /// Verifies signature evidence and matches the signer against policy.
    ///
    /// `Ok(Some(..))` — verified and the signer is configured.
    /// `Ok(None)` — verified, but nobody in the policy holds that key.
    /// `Err(..)` — the evidence is malformed or does not verify.
    fn check_signature(
        &self,
        identity: &ModuleIdentity,
        key_b64: &str,
        sig_b64: &str,
    ) -> Result<Option<TrustVerdict>, HostError> {
        let key = decode_verifying_key(key_b64)?;
        let signature = decode_signature(sig_b64)?;
        key.verify(identity.content_hash(), &signature).map_err(|_| {
            HostError::EvidenceInvalid(
                "signature does not verify against the module contents".into(),
            )
        })?;

        for signer in &self.policy.signers {
            match decode_verifying_key(&signer.public_key) {
                Ok(trusted) if trusted == key => {
                    return Ok(Some(TrustVerdict::new(
                        signer.level,
                        format!("signature verified, signer {:?}", signer.name),
                    )));
                }
                Ok(_) => {}
                // Policy keys are validated at config load; a bad one here
                // means the policy was built programmatically. Skip it.
                Err(err) => {
                    warn!(signer = %signer.name, error = %err, "skipping malformed signer key in trust policy")
                }
            }
        }
        Ok(None)
    }
}

/// Decodes a base64 ed25519 verifying key. Shared with config validation so
/// a bad policy key fails at startup, not at first evaluation.
pub(crate) fn decode_verifying_key(b64: &str) -> Result<VerifyingKey, HostError> {
    let bytes = BASE64
        .decode(b64.trim())
        .map_err(|e| HostError::EvidenceInvalid(format!("public key is not valid base64: {e}")))?;
    let len = bytes.len();
    let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        HostError::EvidenceInvalid(format!("public key must be 32 bytes, got {len}"))
    })?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| {
        HostError::EvidenceInvalid(format!("public key is not a valid ed25519 key: {e}"))
    })
}

fn decode_signature(b64: &str) -> Result<Signature, HostError> {
    let bytes = BASE64
        .decode(b64.trim())
        .map_err(|e| HostError::EvidenceInvalid(format!("signature is not valid base64: {e}")))?;
    Signature::from_slice(&bytes)
        .map_err(|e| HostError::EvidenceInvalid(format!("signature is malformed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn test_key() -> SigningKey {
        SigningKey::generate(&mut rand::rngs::OsRng)
    }

    fn encode_key(key: &SigningKey) -> String {
        BASE64.encode(key.verifying_key().to_bytes())
    }

    /// Policy with one trusted signer and one known origin.
    fn policy_with(signer_key: &SigningKey) -> TrustPolicy {
        TrustPolicy {
            default_level: TrustLevel::Untrusted,
            signers: vec![TrustedSigner {
                name: "release".to_string(),
                public_key: encode_key(signer_key),
                level: TrustLevel::Trusted,
            }],
            origins: [("ci-build".to_string(), TrustLevel::Limited)].into(),
        }
    }

    fn signed_evidence(key: &SigningKey, identity: &ModuleIdentity) -> Evidence {
        let signature = key.sign(identity.content_hash());
        Evidence::signed(encode_key(key), BASE64.encode(signature.to_bytes()))
    }

    #[test]
    fn test_level_order_is_total() {
        assert!(TrustLevel::Untrusted < TrustLevel::Limited);
        assert!(TrustLevel::Limited < TrustLevel::Trusted);
        assert_eq!(TrustLevel::floor(), TrustLevel::Untrusted);
    }

    #[test]
    fn test_verdict_meets() {
        let verdict = TrustVerdict::new(TrustLevel::Limited, "test");
        assert!(verdict.meets(TrustLevel::Untrusted));
        assert!(verdict.meets(TrustLevel::Limited));
        assert!(!verdict.meets(TrustLevel::Trusted));
    }

    #[test]
    fn test_no_evidence_gets_policy_default() {
        let evaluator = TrustEvaluator::new(TrustPolicy::default());
        let identity = ModuleIdentity::for_bytes(b"module");
        let verdict = evaluator.evaluate(&identity, &Evidence::none());
        assert_eq!(verdict.level, TrustLevel::Untrusted);
        assert!(verdict.reason.contains("policy default"));
    }

    #[test]
    fn test_known_origin_maps_to_level() {
        let evaluator = TrustEvaluator::new(policy_with(&test_key()));
        let identity = ModuleIdentity::for_bytes(b"module").with_origin("ci-build");
        let verdict = evaluator.evaluate(&identity, &Evidence::none());
        assert_eq!(verdict.level, TrustLevel::Limited);
        assert!(verdict.reason.contains("ci-build"));
    }

    #[test]
    fn test_unknown_origin_falls_back_to_default() {
        let evaluator = TrustEvaluator::new(policy_with(&test_key()));
        let identity = ModuleIdentity::for_bytes(b"module").with_origin("somewhere-else");
        let verdict = evaluator.evaluate(&identity, &Evidence::none());
        assert_eq!(verdict.level, TrustLevel::Untrusted);
    }

    #[test]
    fn test_configured_signer_grants_level() {
        let key = test_key();
        let evaluator = TrustEvaluator::new(policy_with(&key));
        let identity = ModuleIdentity::for_bytes(b"module");
        let verdict = evaluator.evaluate(&identity, &signed_evidence(&key, &identity));
        assert_eq!(verdict.level, TrustLevel::Trusted);
        assert!(verdict.reason.contains("release"));
    }

    #[test]
    fn test_unknown_signer_falls_back() {
        let stranger = test_key();
        let evaluator = TrustEvaluator::new(policy_with(&test_key()));
        let identity = ModuleIdentity::for_bytes(b"module");
        let verdict = evaluator.evaluate(&identity, &signed_evidence(&stranger, &identity));
        assert_eq!(verdict.level, TrustLevel::Untrusted);
        assert!(verdict.reason.contains("not in the trust policy"));
    }

    #[test]
    fn test_forged_signature_is_invalid_evidence() {
        let key = test_key();
        let evaluator = TrustEvaluator::new(policy_with(&key));
        let identity = ModuleIdentity::for_bytes(b"module");
        // Signature over different bytes than the module's hash.
        let other = ModuleIdentity::for_bytes(b"tampered");
        let verdict = evaluator.evaluate(&identity, &signed_evidence(&key, &other));
        assert_eq!(verdict.level, TrustLevel::Untrusted);
        assert!(verdict.reason.contains("invalid trust evidence"));
    }

    #[test]
    fn test_garbage_evidence_downgrades_not_aborts() {
        let evaluator = TrustEvaluator::new(policy_with(&test_key()));
        let identity = ModuleIdentity::for_bytes(b"module");
        let verdict = evaluator.evaluate(
            &identity,
            &Evidence::signed("not base64!!!", "also not base64!!!"),
        );
        assert_eq!(verdict.level, TrustLevel::Untrusted);
        assert!(verdict.reason.contains("invalid trust evidence"));
    }

    #[test]
    fn test_incomplete_evidence_is_invalid() {
        let key = test_key();
        let evaluator = TrustEvaluator::new(policy_with(&key));
        let identity = ModuleIdentity::for_bytes(b"module");
        let evidence = Evidence {
            public_key: Some(encode_key(&key)),
            signature: None,
        };
        let verdict = evaluator.evaluate(&identity, &evidence);
        assert_eq!(verdict.level, TrustLevel::Untrusted);
        assert!(verdict.reason.contains("invalid trust evidence"));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let key = test_key();
        let evaluator = TrustEvaluator::new(policy_with(&key));
        let identity = ModuleIdentity::for_bytes(b"module");
        let evidence = signed_evidence(&key, &identity);
        let first = evaluator.evaluate(&identity, &evidence);
        let second = evaluator.evaluate(&identity, &evidence);
        assert_eq!(first.level, second.level);
        assert_eq!(first.reason, second.reason);
    }

    #[test]
    fn test_level_parses_from_config_strings() {
        let level: TrustLevel = serde_json::from_str("\"limited\"").unwrap();
        assert_eq!(level, TrustLevel::Limited);
        assert!(serde_json::from_str::<TrustLevel>("\"root\"").is_err());
    }
}
