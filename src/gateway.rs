//! Host Function Gateway.
//!
//! Every guest import call passes through [`HostGateway::invoke`]: resolve
//! the capability, compare the caller's frozen verdict against the
//! descriptor's minimum, then honor, degrade, or deny. The lookup and the
//! comparison are pure; the only side effects happen inside an honored
//! effect, so a call either fully succeeds or fully follows its declared
//! degraded path. Partial effects cannot happen.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::capability::registry::CapabilityRegistry;
use crate::capability::{DegradedBehavior, HostCallContext};
use crate::error::CallDenied;
use crate::trust::TrustVerdict;

/// Identity of the calling instance, passed explicitly on every call so the
/// gateway never reads trust from shared mutable state.
pub struct CallerContext<'a> {
    pub instance_id: Uuid,
    pub module: &'a str,
    pub verdict: &'a TrustVerdict,
}

/// The dispatch layer guests call into.
pub struct HostGateway {
    registry: Arc<CapabilityRegistry>,
}

impl HostGateway {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Decides and executes one capability call.
    pub fn invoke(
        &self,
        caller: &CallerContext,
        name: &str,
        args: Value,
    ) -> Result<Value, CallDenied> {
        let Some(entry) = self.registry.lookup(name) else {
            warn!(
                module = caller.module,
                capability = name,
                disposition = "denied",
                "unknown capability, failing closed"
            );
            return Err(CallDenied::UnknownCapability(name.to_string()));
        };
        let descriptor = entry.descriptor();

        if caller.verdict.meets(descriptor.min_trust) {
            let ctx = HostCallContext {
                instance_id: caller.instance_id,
                module: caller.module,
                verdict: caller.verdict,
            };
            return match entry.function().invoke(&args, &ctx) {
                Ok(value) => {
                    debug!(
                        module = caller.module,
                        capability = name,
                        disposition = "honored",
                        "capability call honored"
                    );
                    Ok(value)
                }
                Err(source) => {
                    warn!(
                        module = caller.module,
                        capability = name,
                        disposition = "host-fault",
                        error = %source,
                        "host effect failed"
                    );
                    Err(CallDenied::HostFault {
                        name: name.to_string(),
                        source,
                    })
                }
            };
        }

        // Below the minimum: the declared degraded path, exactly as
        // registered. The real effect is never touched.
        match &descriptor.degraded {
            DegradedBehavior::SilentNoOp => {
                warn!(
                    module = caller.module,
                    capability = name,
                    disposition = "degraded",
                    held = %caller.verdict.level,
                    required = %descriptor.min_trust,
                    "insufficient trust, degrading to no-op"
                );
                Ok(Value::Null)
            }
            DegradedBehavior::Sentinel(value) => {
                warn!(
                    module = caller.module,
                    capability = name,
                    disposition = "degraded",
                    held = %caller.verdict.level,
                    required = %descriptor.min_trust,
                    "insufficient trust, returning sentinel"
                );
                Ok(value.clone())
            }
            DegradedBehavior::DenyWithSignal => {
                warn!(
                    module = caller.module,
                    capability = name,
                    disposition = "denied",
                    held = %caller.verdict.level,
                    required = %descriptor.min_trust,
                    "insufficient trust, denying with signal"
                );
                Err(CallDenied::InsufficientTrust {
                    name: name.to_string(),
                    required: descriptor.min_trust,
                    held: caller.verdict.level,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::registry::RegistryBuilder;
    use crate::capability::{EffectClass, HostFunction};
    use crate::trust::TrustLevel;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Host-state-mutating capability that counts its real executions.
    struct CountingCapability {
        hits: Arc<AtomicUsize>,
    }

    impl HostFunction for CountingCapability {
        fn name(&self) -> &str {
            "bump"
        }
        fn description(&self) -> &str {
            "increment a host-side counter"
        }
        fn parameters_schema(&self) -> Value {
            Value::Null
        }
        fn min_trust(&self) -> TrustLevel {
            TrustLevel::Trusted
        }
        fn degraded(&self) -> DegradedBehavior {
            DegradedBehavior::SilentNoOp
        }
        fn effect(&self) -> EffectClass {
            EffectClass::HostState
        }
        fn invoke(&self, _args: &Value, _ctx: &HostCallContext) -> anyhow::Result<Value> {
            let hits = self.hits.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!(hits))
        }
    }

    struct SentinelCapability;

    impl HostFunction for SentinelCapability {
        fn name(&self) -> &str {
            "lookup_secret"
        }
        fn description(&self) -> &str {
            "fetch a host secret"
        }
        fn parameters_schema(&self) -> Value {
            Value::Null
        }
        fn min_trust(&self) -> TrustLevel {
            TrustLevel::Trusted
        }
        fn degraded(&self) -> DegradedBehavior {
            DegradedBehavior::Sentinel(json!("redacted"))
        }
        fn effect(&self) -> EffectClass {
            EffectClass::Io
        }
        fn invoke(&self, _args: &Value, _ctx: &HostCallContext) -> anyhow::Result<Value> {
            Ok(json!("the-secret"))
        }
    }

    struct GatedCapability;

    impl HostFunction for GatedCapability {
        fn name(&self) -> &str {
            "gated"
        }
        fn description(&self) -> &str {
            "denied below limited"
        }
        fn parameters_schema(&self) -> Value {
            Value::Null
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
            Ok(Value::Null)
        }
    }

    struct FailingCapability;

    impl HostFunction for FailingCapability {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "always fails on the host side"
        }
        fn parameters_schema(&self) -> Value {
            Value::Null
        }
        fn min_trust(&self) -> TrustLevel {
            TrustLevel::Untrusted
        }
        fn degraded(&self) -> DegradedBehavior {
            DegradedBehavior::SilentNoOp
        }
        fn effect(&self) -> EffectClass {
            EffectClass::Io
        }
        fn invoke(&self, _args: &Value, _ctx: &HostCallContext) -> anyhow::Result<Value> {
            anyhow::bail!("disk on fire")
        }
    }

    fn gateway_with_counter() -> (HostGateway, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut builder = RegistryBuilder::new();
        builder
            .register(Box::new(CountingCapability { hits: hits.clone() }))
            .unwrap();
        builder.register(Box::new(SentinelCapability)).unwrap();
        builder.register(Box::new(GatedCapability)).unwrap();
        builder.register(Box::new(FailingCapability)).unwrap();
        (HostGateway::new(Arc::new(builder.build())), hits)
    }

    fn verdict(level: TrustLevel) -> TrustVerdict {
        TrustVerdict::new(level, "test verdict")
    }

    fn caller<'a>(id: &'a Uuid, verdict: &'a TrustVerdict) -> CallerContext<'a> {
        CallerContext {
            instance_id: *id,
            module: "test-module",
            verdict,
        }
    }

    #[test]
    fn test_unknown_capability_denied_at_every_level() {
        let (gateway, _) = gateway_with_counter();
        let id = Uuid::new_v4();
        for level in [TrustLevel::Untrusted, TrustLevel::Limited, TrustLevel::Trusted] {
            let v = verdict(level);
            let err = gateway
                .invoke(&caller(&id, &v), "no_such_capability", Value::Null)
                .unwrap_err();
            assert!(matches!(err, CallDenied::UnknownCapability(name) if name == "no_such_capability"));
        }
    }

    #[test]
    fn test_silent_noop_is_deterministic_and_effect_free() {
        let (gateway, hits) = gateway_with_counter();
        let id = Uuid::new_v4();
        let v = verdict(TrustLevel::Untrusted);
        for _ in 0..3 {
            let result = gateway.invoke(&caller(&id, &v), "bump", Value::Null).unwrap();
            assert_eq!(result, Value::Null);
        }
        // The mutating effect never ran.
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sentinel_returned_verbatim_every_time() {
        let (gateway, _) = gateway_with_counter();
        let id = Uuid::new_v4();
        let v = verdict(TrustLevel::Limited);
        for _ in 0..3 {
            let result = gateway
                .invoke(&caller(&id, &v), "lookup_secret", Value::Null)
                .unwrap();
            assert_eq!(result, json!("redacted"));
        }
    }

    #[test]
    fn test_deny_with_signal_is_observable() {
        let (gateway, _) = gateway_with_counter();
        let id = Uuid::new_v4();
        let v = verdict(TrustLevel::Untrusted);
        let err = gateway
            .invoke(&caller(&id, &v), "gated", Value::Null)
            .unwrap_err();
        match err {
            CallDenied::InsufficientTrust { name, required, held } => {
                assert_eq!(name, "gated");
                assert_eq!(required, TrustLevel::Limited);
                assert_eq!(held, TrustLevel::Untrusted);
            }
            other => panic!("expected InsufficientTrust, got {other:?}"),
        }
    }

    #[test]
    fn test_sufficient_trust_runs_real_effect_each_call() {
        let (gateway, hits) = gateway_with_counter();
        let id = Uuid::new_v4();
        let v = verdict(TrustLevel::Trusted);
        assert_eq!(
            gateway.invoke(&caller(&id, &v), "bump", Value::Null).unwrap(),
            json!(1)
        );
        assert_eq!(
            gateway.invoke(&caller(&id, &v), "bump", Value::Null).unwrap(),
            json!(2)
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_trust_above_minimum_also_honored() {
        let (gateway, _) = gateway_with_counter();
        let id = Uuid::new_v4();
        let v = verdict(TrustLevel::Trusted);
        assert_eq!(
            gateway.invoke(&caller(&id, &v), "gated", Value::Null).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_host_fault_becomes_observable_failure() {
        let (gateway, _) = gateway_with_counter();
        let id = Uuid::new_v4();
        let v = verdict(TrustLevel::Untrusted);
        let err = gateway
            .invoke(&caller(&id, &v), "flaky", Value::Null)
            .unwrap_err();
        assert!(matches!(err, CallDenied::HostFault { name, .. } if name == "flaky"));
    }
}
