//! Capability registry.
//!
//! Populated once during process initialization through [`RegistryBuilder`],
//! then frozen into an immutable [`CapabilityRegistry`]. There is no runtime
//! registration: concurrent lookups need no locking, and a whole class of
//! registration races cannot exist. A name the registry does not know is a
//! denial, never a fallthrough.

use std::collections::HashMap;

use crate::error::HostError;
use crate::trust::TrustLevel;

use super::{CapabilityDescriptor, HostFunction};

/// A registered capability: frozen descriptor plus the callable effect.
pub struct CapabilityEntry {
    descriptor: CapabilityDescriptor,
    function: Box<dyn HostFunction>,
}

impl CapabilityEntry {
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    pub fn function(&self) -> &dyn HostFunction {
        self.function.as_ref()
    }
}

/// Collects registrations during startup. Duplicate names abort.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<String, CapabilityEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one capability under its declared metadata.
    pub fn register(&mut self, function: Box<dyn HostFunction>) -> Result<(), HostError> {
        let descriptor = CapabilityDescriptor::of(function.as_ref());
        self.insert(descriptor, function)
    }

    /// Registers one capability with its minimum trust raised or lowered by
    /// host configuration.
    pub fn register_with_min_trust(
        &mut self,
        function: Box<dyn HostFunction>,
        min_trust: TrustLevel,
    ) -> Result<(), HostError> {
        let mut descriptor = CapabilityDescriptor::of(function.as_ref());
        descriptor.min_trust = min_trust;
        self.insert(descriptor, function)
    }

    fn insert(
        &mut self,
        descriptor: CapabilityDescriptor,
        function: Box<dyn HostFunction>,
    ) -> Result<(), HostError> {
        if self.entries.contains_key(&descriptor.name) {
            return Err(HostError::DuplicateCapability(descriptor.name));
        }
        self.entries.insert(
            descriptor.name.clone(),
            CapabilityEntry { descriptor, function },
        );
        Ok(())
    }

    /// Freezes the registry. No further mutation is possible.
    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            entries: self.entries,
        }
    }
}

/// Immutable name → capability mapping. Shareable across threads behind an
/// `Arc`; reads are plain map lookups.
pub struct CapabilityRegistry {
    entries: HashMap<String, CapabilityEntry>,
}

impl CapabilityRegistry {
    pub fn lookup(&self, name: &str) -> Option<&CapabilityEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All descriptors in name order, for catalog display.
    pub fn descriptors(&self) -> Vec<&CapabilityDescriptor> {
        let mut descriptors: Vec<_> = self.entries.values().map(|e| &e.descriptor).collect();
        descriptors.sort_by_key(|d| d.name.as_str());
        descriptors
    }
}
