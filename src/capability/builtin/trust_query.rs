//! `trusts_me` — lets a guest ask whether the host honors it with full
//! trust, and pick a degraded code path if not.

use serde_json::Value;

use crate::capability::{DegradedBehavior, EffectClass, HostCallContext, HostFunction};
use crate::trust::TrustLevel;

/// The degradation mechanism is the query: the real effect is only
/// reachable above the trust gate, so an honored call answers `true` and
/// everyone else observes the sentinel `false`.
pub struct TrustsMeCapability;

impl HostFunction for TrustsMeCapability {
    fn name(&self) -> &str {
        "trusts_me"
    }

    fn description(&self) -> &str {
        "Report whether the calling guest holds full trust."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "null" })
    }

    fn min_trust(&self) -> TrustLevel {
        TrustLevel::Trusted
    }

    fn degraded(&self) -> DegradedBehavior {
        DegradedBehavior::Sentinel(Value::Bool(false))
    }

    fn effect(&self) -> EffectClass {
        EffectClass::Pure
    }

    fn invoke(&self, _args: &Value, _ctx: &HostCallContext) -> anyhow::Result<Value> {
        Ok(Value::Bool(true))
    }
}
