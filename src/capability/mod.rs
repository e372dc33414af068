//! The capability surface guests call into.
//!
//! Every host function a guest may import is described by a
//! [`CapabilityDescriptor`]: its minimum trust level, its declared degraded
//! behavior below that level, and its side-effect classification. The
//! descriptors live in a registry built once at startup; the gateway
//! consults them on every call and never executes a function whose
//! descriptor is absent.

pub mod builtin;
pub mod registry;

use std::fmt;

use serde_json::Value;
use uuid::Uuid;

use crate::trust::{TrustLevel, TrustVerdict};

/// How a call is answered when the caller's trust is below the minimum.
///
/// Chosen by policy at registration time, never by guessing guest intent:
/// a call either fully succeeds or fully follows its declared degraded path.
#[derive(Debug, Clone, PartialEq)]
pub enum DegradedBehavior {
    /// Pretend success and return a neutral null value.
    SilentNoOp,
    /// Return this fixed, documented value.
    Sentinel(Value),
    /// Fail the call with an explicit denial the guest can branch on.
    DenyWithSignal,
}

impl fmt::Display for DegradedBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedBehavior::SilentNoOp => f.write_str("silent no-op"),
            DegradedBehavior::Sentinel(value) => write!(f, "sentinel {value}"),
            DegradedBehavior::DenyWithSignal => f.write_str("deny with signal"),
        }
    }
}

/// Side-effect classification of a capability's real effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectClass {
    /// No observable host effect beyond the returned value.
    Pure,
    /// Mutates host-side state.
    HostState,
    /// Performs input/output against the host environment.
    Io,
}

impl fmt::Display for EffectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EffectClass::Pure => "pure",
            EffectClass::HostState => "host-state",
            EffectClass::Io => "io",
        };
        f.write_str(s)
    }
}

/// Static metadata for one host-importable function. Snapshotted from the
/// implementing [`HostFunction`] at registration (with any configured
/// overrides applied) and immutable afterwards.
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the marshaled argument value. Consumed by the engine
    /// when it lowers guest memory into host-native values.
    pub parameters_schema: Value,
    pub min_trust: TrustLevel,
    pub degraded: DegradedBehavior,
    pub effect: EffectClass,
}

/// Call-time context handed to an honored host function.
pub struct HostCallContext<'a> {
    /// Instance the call originated from.
    pub instance_id: Uuid,
    /// Module name, display only.
    pub module: &'a str,
    /// The caller's frozen verdict.
    pub verdict: &'a TrustVerdict,
}

/// One host-importable function: descriptor metadata plus the real effect.
///
/// The metadata methods are read once, at registration. `invoke` is only
/// ever reached through the gateway, and only after the trust check passed;
/// implementations never need to check trust themselves.
pub trait HostFunction: Send + Sync {
    /// Unique import name guests link against (lowercase + underscores).
    fn name(&self) -> &str;

    /// What the capability does, shown in the catalog.
    fn description(&self) -> &str;

    /// JSON Schema describing the argument value this capability accepts.
    fn parameters_schema(&self) -> Value;

    /// Minimum trust level required for the real effect.
    fn min_trust(&self) -> TrustLevel;

    /// Declared behavior for callers below the minimum.
    fn degraded(&self) -> DegradedBehavior;

    /// Side-effect classification.
    fn effect(&self) -> EffectClass;

    /// The real host-side effect.
    fn invoke(&self, args: &Value, ctx: &HostCallContext) -> anyhow::Result<Value>;
}

impl CapabilityDescriptor {
    /// Snapshots a function's declared metadata.
    pub fn of(function: &dyn HostFunction) -> Self {
        Self {
            name: function.name().to_string(),
            description: function.description().to_string(),
            parameters_schema: function.parameters_schema(),
            min_trust: function.min_trust(),
            degraded: function.degraded(),
            effect: function.effect(),
        }
    }
}
