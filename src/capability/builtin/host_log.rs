//! `host_log` — guest log lines routed into the host's own log.

use anyhow::anyhow;
use serde_json::Value;
use tracing::info;

use crate::capability::{DegradedBehavior, EffectClass, HostCallContext, HostFunction};
use crate::trust::TrustLevel;

pub struct HostLogCapability;

impl HostFunction for HostLogCapability {
    fn name(&self) -> &str {
        "host_log"
    }

    fn description(&self) -> &str {
        "Emit a line into the host log, attributed to the calling module."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "string",
            "description": "The log line, marshaled from guest memory"
        })
    }

    fn min_trust(&self) -> TrustLevel {
        TrustLevel::Limited
    }

    /// Untrusted callers may log as much as they like into the void.
    fn degraded(&self) -> DegradedBehavior {
        DegradedBehavior::SilentNoOp
    }

    fn effect(&self) -> EffectClass {
        EffectClass::Io
    }

    fn invoke(&self, args: &Value, ctx: &HostCallContext) -> anyhow::Result<Value> {
        let line = args
            .as_str()
            .ok_or_else(|| anyhow!("host_log expects a string argument"))?;
        info!(target: "guest", module = ctx.module, "{line}");
        Ok(Value::Null)
    }
}
