//! `sysinfo` — report coarse host platform facts.

use serde_json::{json, Value};

use crate::capability::{DegradedBehavior, EffectClass, HostCallContext, HostFunction};
use crate::trust::TrustLevel;

/// Platform facts are mild fingerprinting material, so callers below
/// `Limited` get an explicit denial rather than a made-up answer.
pub struct SysInfoCapability;

impl HostFunction for SysInfoCapability {
    fn name(&self) -> &str {
        "sysinfo"
    }

    fn description(&self) -> &str {
        "Report the host's operating system, architecture, and platform family."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "null" })
    }

    fn min_trust(&self) -> TrustLevel {
        TrustLevel::Limited
    }

    fn degraded(&self) -> DegradedBehavior {
        DegradedBehavior::DenyWithSignal
    }

    fn effect(&self) -> EffectClass {
        EffectClass::Io
    }

    fn invoke(&self, _args: &Value, _ctx: &HostCallContext) -> anyhow::Result<Value> {
        Ok(json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "family": std::env::consts::FAMILY,
        }))
    }
}
