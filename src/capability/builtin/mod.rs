//! Builtin capability catalog.
//!
//! The catalog is configuration, not contract: the gateway knows nothing
//! about any specific capability, and embedders register their own through
//! the same builder path. Config can disable any builtin (it is then simply
//! never registered, so calls to it fail closed) or move its minimum trust.

pub mod host_log;
pub mod print;
pub mod sysinfo;
pub mod trust_query;

pub use host_log::HostLogCapability;
pub use print::{OutputSink, PrintCapability};
pub use sysinfo::SysInfoCapability;
pub use trust_query::TrustsMeCapability;

use tracing::debug;

use crate::config::Config;
use crate::error::HostError;

use super::registry::RegistryBuilder;
use super::HostFunction;

/// Registers the builtin catalog, honoring per-capability config overrides.
pub fn register_defaults(builder: &mut RegistryBuilder, config: &Config) -> Result<(), HostError> {
    let functions: Vec<Box<dyn HostFunction>> = vec![
        Box::new(PrintCapability::stdout()),
        Box::new(TrustsMeCapability),
        Box::new(HostLogCapability),
        Box::new(SysInfoCapability),
    ];
    for function in functions {
        let overrides = config.capability(function.name());
        if !overrides.enabled {
            debug!(capability = function.name(), "disabled by config, not registering");
            continue;
        }
        match overrides.min_trust {
            Some(level) => builder.register_with_min_trust(function, level)?,
            None => builder.register(function)?,
        }
    }
    Ok(())
}
