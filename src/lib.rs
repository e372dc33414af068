//! hostgate — a host runtime that executes sandboxed guest modules behind a
//! trust-gated capability gateway.
//!
//! Guest modules run under one of two execution models: an **executor** is
//! invoked once at startup and expected to terminate, a **reactor** is
//! initialized once and then invoked repeatedly through its exported entry
//! points. Whenever a guest calls an imported host function, the call passes
//! through the [`gateway::HostGateway`], which looks the capability up in the
//! frozen [`capability::registry::CapabilityRegistry`], compares the caller's
//! [`trust::TrustVerdict`] against the capability's minimum, and either
//! honors the call with its real effect, degrades it to its declared safe
//! answer, or denies it outright.
//!
//! The byte-code engine itself is an external collaborator: it compiles and
//! runs guest code, marshals guest memory into host-native values, and talks
//! to this crate only through the traits in [`engine`].

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod manifest;
pub mod trust;
