//! Error taxonomy.
//!
//! Two surfaces, deliberately separate: [`HostError`] is what the embedder
//! (the caller of the lifecycle manager or the registry builder) sees, and
//! [`CallDenied`] is the failure result a guest can observe from a capability
//! call. A guest never receives a `HostError`, and nothing a guest does can
//! crash the host: malformed guest input always resolves to a denial or a
//! degraded value.

use thiserror::Error;
use uuid::Uuid;

use crate::manifest::ExecutionModel;
use crate::trust::TrustLevel;

/// Host-side errors, surfaced to the embedder.
#[derive(Debug, Error)]
pub enum HostError {
    /// Two capabilities registered under one name. A startup programming
    /// error; registration aborts.
    #[error("duplicate capability registration: {0:?}")]
    DuplicateCapability(String),

    /// Trust evidence could not be decoded or did not verify. The evaluator
    /// recovers locally by issuing a floor-level verdict, so this never
    /// takes an instance (or the host) down.
    #[error("invalid trust evidence: {0}")]
    EvidenceInvalid(String),

    /// Invocation attempted after the instance reached its terminal state.
    #[error("instance {id} is terminated and accepts no further invocations")]
    InstanceTerminated { id: Uuid },

    /// No loaded instance carries this id.
    #[error("no loaded instance with id {0}")]
    UnknownInstance(Uuid),

    /// The module does not export the requested entry point.
    #[error("module {module:?} does not export {export:?}")]
    UnknownExport { module: String, export: String },

    /// The module lacks the well-known entry point its execution model
    /// requires, detected at load time.
    #[error("{model} module {module:?} does not define required entry point {entry:?}")]
    MissingEntryPoint {
        module: String,
        model: ExecutionModel,
        entry: &'static str,
    },

    /// A reactor export was invoked before initialization completed.
    #[error("module {module:?}: exports are unreachable until initialization completes")]
    NotInitialized { module: String },

    /// Initialization was requested a second time. Init runs exactly once.
    #[error("module {module:?} is already initialized; init does not re-run")]
    AlreadyInitialized { module: String },

    /// The requested operation does not apply to the instance's execution
    /// model (for example, invoking exports on an executor).
    #[error("module {module:?} is an {model} module; {operation} does not apply")]
    WrongModel {
        module: String,
        model: ExecutionModel,
        operation: &'static str,
    },

    /// The guest faulted while running an entry point. Fatal to the
    /// instance when it happens during startup; never fatal to the host.
    #[error("guest fault in module {module:?} during {entry:?}: {source}")]
    GuestFault {
        module: String,
        entry: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A capability-call failure result the guest can observe and branch on.
///
/// The engine marshals these back across the ABI as the import's failure
/// value. They are results, not crashes: the calling instance keeps running.
#[derive(Debug, Error)]
pub enum CallDenied {
    /// The capability is not present in the registry. Fails closed: an
    /// absent descriptor is never executed.
    #[error("unknown capability {0:?}")]
    UnknownCapability(String),

    /// The capability's declared degraded behavior is deny-with-signal and
    /// the caller's trust was below the minimum.
    #[error("capability {name:?} denied: requires {required}, caller holds {held}")]
    InsufficientTrust {
        name: String,
        required: TrustLevel,
        held: TrustLevel,
    },

    /// The honored host effect itself failed. Reported to the guest as a
    /// failure result rather than crashing the host.
    #[error("capability {name:?} failed on the host side: {source}")]
    HostFault {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}
