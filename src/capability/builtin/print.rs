//! `print` — write a guest-supplied string to the host's guest-output sink.

use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use serde_json::Value;

use crate::capability::{DegradedBehavior, EffectClass, HostCallContext, HostFunction};
use crate::trust::TrustLevel;

/// Where guest output lands. Process stdout by default; embedders and tests
/// can plug in any writer (a network forwarder, an in-memory buffer).
pub type OutputSink = Arc<Mutex<dyn Write + Send>>;

pub struct PrintCapability {
    sink: OutputSink,
}

impl PrintCapability {
    /// Guest output goes to the host process stdout.
    pub fn stdout() -> Self {
        Self::to_sink(Arc::new(Mutex::new(std::io::stdout())))
    }

    /// Guest output goes to the given sink.
    pub fn to_sink(sink: OutputSink) -> Self {
        Self { sink }
    }
}

impl HostFunction for PrintCapability {
    fn name(&self) -> &str {
        "print"
    }

    fn description(&self) -> &str {
        "Write a UTF-8 string to the host's guest-output channel."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "string",
            "description": "The text to write, marshaled from guest memory"
        })
    }

    fn min_trust(&self) -> TrustLevel {
        TrustLevel::Untrusted
    }

    /// Unreachable in practice: the minimum is the floor level.
    fn degraded(&self) -> DegradedBehavior {
        DegradedBehavior::SilentNoOp
    }

    fn effect(&self) -> EffectClass {
        EffectClass::Pure
    }

    fn invoke(&self, args: &Value, _ctx: &HostCallContext) -> anyhow::Result<Value> {
        let text = args
            .as_str()
            .ok_or_else(|| anyhow!("print expects a string argument"))?;
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| anyhow!("guest-output sink is poisoned"))?;
        sink.write_all(text.as_bytes())?;
        sink.flush()?;
        Ok(Value::Null)
    }
}
