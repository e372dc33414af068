//! Execution Lifecycle Manager.
//!
//! Owns every guest instance and drives the two execution models. An
//! executor gets exactly one `_start` run and is then retired; a reactor
//! runs `_initialize` to completion before any other export is reachable,
//! then accepts arbitrary export invocations until explicitly unloaded.
//! `Terminated` is absorbing. A guest fault during startup is fatal to that
//! instance only: it never touches other instances or the host process.
//!
//! Each instance runs synchronously on the thread that invokes it. For
//! concurrent guests, use one manager per thread; the registry behind the
//! gateway is immutable and shared.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::{GuestModule, HostImports};
use crate::error::{CallDenied, HostError};
use crate::gateway::{CallerContext, HostGateway};
use crate::manifest::{ExecutionModel, ModuleIdentity};
use crate::trust::{Evidence, TrustEvaluator, TrustVerdict};

/// Entry point an executor module must export. Runs exactly once.
pub const EXECUTOR_ENTRY: &str = "_start";

/// Entry point a reactor module must export. Runs to completion exactly
/// once, before any other export is reachable.
pub const REACTOR_INIT: &str = "_initialize";

/// Lifecycle states of a guest instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Instantiated, trust verdict not yet computed.
    Loaded,
    /// Verdict computed and frozen; startup entry point not yet run.
    Ready,
    /// Reactor only: initialization completed, exports reachable.
    Active,
    /// Absorbing. No further invocations are accepted.
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Loaded => "loaded",
            LifecycleState::Ready => "ready",
            LifecycleState::Active => "active",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// One loaded guest module bound to a lifecycle.
pub struct GuestInstance {
    id: Uuid,
    name: String,
    model: ExecutionModel,
    state: LifecycleState,
    verdict: TrustVerdict,
    exports: Vec<String>,
    module: Box<dyn GuestModule>,
    /// Failure text recorded when a startup fault terminated the instance.
    failure: Option<String>,
}

impl GuestInstance {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> ExecutionModel {
        self.model
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The frozen verdict. Immutable for the instance's lifetime except
    /// through [`LifecycleManager::reevaluate`].
    pub fn verdict(&self) -> &TrustVerdict {
        &self.verdict
    }

    /// The export table cached at load time.
    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

/// Per-invocation window a guest gets onto the host: the gateway plus the
/// caller's frozen verdict, passed explicitly on every capability call.
struct GatewayHandle<'g> {
    gateway: &'g HostGateway,
    instance_id: Uuid,
    module: String,
    verdict: TrustVerdict,
}

impl HostImports for GatewayHandle<'_> {
    fn call(&mut self, capability: &str, args: Value) -> Result<Value, CallDenied> {
        let caller = CallerContext {
            instance_id: self.instance_id,
            module: &self.module,
            verdict: &self.verdict,
        };
        self.gateway.invoke(&caller, capability, args)
    }
}

/// Owns all guest instances and drives their state machines.
pub struct LifecycleManager {
    evaluator: TrustEvaluator,
    gateway: HostGateway,
    instances: HashMap<Uuid, GuestInstance>,
}

impl LifecycleManager {
    pub fn new(evaluator: TrustEvaluator, gateway: HostGateway) -> Self {
        Self {
            evaluator,
            gateway,
            instances: HashMap::new(),
        }
    }

    pub fn gateway(&self) -> &HostGateway {
        &self.gateway
    }

    pub fn instance(&self, id: Uuid) -> Option<&GuestInstance> {
        self.instances.get(&id)
    }

    /// Loads a module: validates the entry point its model requires,
    /// computes the trust verdict, and leaves the instance `Ready`.
    pub fn load(
        &mut self,
        name: impl Into<String>,
        model: ExecutionModel,
        identity: &ModuleIdentity,
        evidence: &Evidence,
        module: Box<dyn GuestModule>,
    ) -> Result<Uuid, HostError> {
        let name = name.into();
        let exports = module.exports();
        let required = match model {
            ExecutionModel::Executor => EXECUTOR_ENTRY,
            ExecutionModel::Reactor => REACTOR_INIT,
        };
        if !exports.iter().any(|e| e == required) {
            return Err(HostError::MissingEntryPoint {
                module: name,
                model,
                entry: required,
            });
        }

        let id = Uuid::new_v4();
        let verdict = self.evaluator.evaluate(identity, evidence);
        let mut instance = GuestInstance {
            id,
            name,
            model,
            state: LifecycleState::Loaded,
            verdict,
            exports,
            module,
            failure: None,
        };
        debug!(module = %instance.name, %id, model = %model, "module instantiated");
        instance.state = LifecycleState::Ready;
        info!(
            module = %instance.name,
            %id,
            level = %instance.verdict.level,
            reason = %instance.verdict.reason,
            "trust verdict computed, instance ready"
        );
        self.instances.insert(id, instance);
        Ok(id)
    }

    /// Runs the instance's startup entry point.
    ///
    /// Executor: the single `_start` run; the instance terminates whether
    /// it succeeds or faults. Reactor: the `_initialize` run; the instance
    /// becomes `Active` on success. A fault is recorded, terminates the
    /// instance, and propagates: a partially-initialized guest must never
    /// become `Active`.
    pub fn start(&mut self, id: Uuid) -> Result<Value, HostError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(HostError::UnknownInstance(id))?;
        match instance.state {
            LifecycleState::Terminated => return Err(HostError::InstanceTerminated { id }),
            LifecycleState::Active => {
                return Err(HostError::AlreadyInitialized {
                    module: instance.name.clone(),
                })
            }
            LifecycleState::Loaded | LifecycleState::Ready => {}
        }

        let entry = match instance.model {
            ExecutionModel::Executor => EXECUTOR_ENTRY,
            ExecutionModel::Reactor => REACTOR_INIT,
        };
        info!(module = %instance.name, entry, model = %instance.model, "starting instance");

        let mut host = GatewayHandle {
            gateway: &self.gateway,
            instance_id: instance.id,
            module: instance.name.clone(),
            verdict: instance.verdict.clone(),
        };
        match instance.module.invoke(entry, Value::Null, &mut host) {
            Ok(value) => {
                instance.state = match instance.model {
                    ExecutionModel::Executor => {
                        info!(module = %instance.name, "executor run complete, instance retired");
                        LifecycleState::Terminated
                    }
                    ExecutionModel::Reactor => {
                        info!(module = %instance.name, "reactor initialized, exports reachable");
                        LifecycleState::Active
                    }
                };
                Ok(value)
            }
            Err(source) => {
                instance.failure = Some(source.to_string());
                instance.state = LifecycleState::Terminated;
                error!(
                    module = %instance.name,
                    entry,
                    error = %source,
                    "guest fault during startup, instance terminated"
                );
                Err(HostError::GuestFault {
                    module: instance.name.clone(),
                    entry: entry.to_string(),
                    source,
                })
            }
        }
    }

    /// Invokes an exported entry point on an `Active` reactor instance.
    ///
    /// Any export, any order, any number of times; initialization is never
    /// re-entered. A fault in a regular export propagates but leaves the
    /// instance `Active`: whether to retire a misbehaving reactor is the
    /// embedder's call.
    pub fn invoke(&mut self, id: Uuid, export: &str, args: Value) -> Result<Value, HostError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(HostError::UnknownInstance(id))?;
        if instance.model == ExecutionModel::Executor {
            return Err(HostError::WrongModel {
                module: instance.name.clone(),
                model: instance.model,
                operation: "invoking exports",
            });
        }
        match instance.state {
            LifecycleState::Terminated => return Err(HostError::InstanceTerminated { id }),
            LifecycleState::Loaded | LifecycleState::Ready => {
                return Err(HostError::NotInitialized {
                    module: instance.name.clone(),
                })
            }
            LifecycleState::Active => {}
        }
        if export == REACTOR_INIT {
            return Err(HostError::AlreadyInitialized {
                module: instance.name.clone(),
            });
        }
        if !instance.exports.iter().any(|e| e == export) {
            return Err(HostError::UnknownExport {
                module: instance.name.clone(),
                export: export.to_string(),
            });
        }

        debug!(module = %instance.name, export, "invoking export");
        let mut host = GatewayHandle {
            gateway: &self.gateway,
            instance_id: instance.id,
            module: instance.name.clone(),
            verdict: instance.verdict.clone(),
        };
        match instance.module.invoke(export, args, &mut host) {
            Ok(value) => Ok(value),
            Err(source) => {
                warn!(module = %instance.name, export, error = %source, "guest fault in export");
                Err(HostError::GuestFault {
                    module: instance.name.clone(),
                    entry: export.to_string(),
                    source,
                })
            }
        }
    }

    /// Explicitly unloads an instance. The instance is destroyed; its id is
    /// forgotten.
    pub fn unload(&mut self, id: Uuid) -> Result<(), HostError> {
        let instance = self
            .instances
            .remove(&id)
            .ok_or(HostError::UnknownInstance(id))?;
        info!(module = %instance.name, %id, state = %instance.state, "instance unloaded");
        Ok(())
    }

    /// Explicit trust re-evaluation, the single mutation point after load.
    ///
    /// Requires exclusive access to the manager, so no in-flight capability
    /// call can observe a verdict mid-update.
    pub fn reevaluate(
        &mut self,
        id: Uuid,
        identity: &ModuleIdentity,
        evidence: &Evidence,
    ) -> Result<&TrustVerdict, HostError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(HostError::UnknownInstance(id))?;
        if instance.state == LifecycleState::Terminated {
            return Err(HostError::InstanceTerminated { id });
        }
        let verdict = self.evaluator.evaluate(identity, evidence);
        info!(
            module = %instance.name,
            old = %instance.verdict.level,
            new = %verdict.level,
            "trust verdict re-evaluated"
        );
        instance.verdict = verdict;
        Ok(&instance.verdict)
    }
}
