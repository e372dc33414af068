//! The seam between this host core and the external byte-code engine.
//!
//! The engine owns compilation, guest memory, and the mechanics of running
//! byte-code; the host core only needs a module's export table and a way to
//! run an export with host imports wired up. The engine is responsible for
//! marshaling guest memory references (pointer + length pairs and the like)
//! into host-native [`Value`]s before calling in, and for marshaling results
//! and denials back out.

use serde_json::Value;

use crate::error::CallDenied;

/// Host imports, as seen from inside a guest invocation.
///
/// Implemented by the gateway handle the lifecycle manager constructs per
/// invocation; the engine forwards every guest import call through it. This
/// is the guest's entire window onto the host.
pub trait HostImports {
    /// Calls the named host capability. A denial is a result the guest
    /// observes and may branch on, not a host failure.
    fn call(&mut self, capability: &str, args: Value) -> Result<Value, CallDenied>;
}

/// One loaded guest module, as the engine exposes it to the host core.
pub trait GuestModule: Send {
    /// Names of the module's exported entry points.
    fn exports(&self) -> Vec<String>;

    /// Runs one exported entry point to completion on the calling thread.
    ///
    /// An `Err` is a guest fault (trap, invalid entry state). Faults during
    /// the startup entry points are fatal to the instance; the lifecycle
    /// manager decides, the engine just reports.
    fn invoke(
        &mut self,
        export: &str,
        args: Value,
        host: &mut dyn HostImports,
    ) -> anyhow::Result<Value>;
}
