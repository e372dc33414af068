//! Module manifests.
//!
//! A manifest is the declarative sidecar shipped next to a module's
//! byte-code: its name, its declared execution model (read before loading),
//! an optional origin tag, and optionally an ed25519 signature over the
//! module's content hash. The manifest is untrusted input; everything
//! security-relevant in it is either hashed or verified.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::trust::Evidence;

/// Execution model a guest module declares out-of-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionModel {
    /// Invoked once at startup, expected to terminate.
    Executor,
    /// Initialized once, then invoked repeatedly through exported entry
    /// points until explicitly unloaded.
    Reactor,
}

impl fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionModel::Executor => "executor",
            ExecutionModel::Reactor => "reactor",
        };
        f.write_str(s)
    }
}

/// Opaque identity of one guest module: the sha256 hash of its byte-code
/// plus an optional origin tag the trust policy may recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleIdentity {
    content_hash: [u8; 32],
    pub origin: Option<String>,
}

impl ModuleIdentity {
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self {
            content_hash: Sha256::digest(bytes).into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// The hash is also the message a manifest signature covers.
    pub fn content_hash(&self) -> &[u8; 32] {
        &self.content_hash
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.content_hash)
    }
}

/// Declarative description of one guest module, loadable from a TOML
/// sidecar file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Human-chosen name. Untrusted, display only.
    pub name: String,
    /// Declared execution model; selects the lifecycle path before loading.
    pub model: ExecutionModel,
    /// Path to the module byte-code, relative to the manifest file.
    pub module: PathBuf,
    /// Origin tag the trust policy may map to a level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Base64 ed25519 verifying key of the signer, if signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Base64 signature over the module's sha256 content hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ModuleManifest {
    /// Loads a manifest from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest: ModuleManifest = toml::from_str(&content)?;
        Ok(manifest)
    }

    /// Reads the module bytes the manifest points at, resolved relative to
    /// the manifest's own location.
    pub fn read_module_bytes(&self, manifest_path: &Path) -> anyhow::Result<Vec<u8>> {
        let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        Ok(std::fs::read(dir.join(&self.module))?)
    }

    /// Identity of the given module bytes under this manifest's origin.
    pub fn identity(&self, bytes: &[u8]) -> ModuleIdentity {
        let identity = ModuleIdentity::for_bytes(bytes);
        match &self.origin {
            Some(origin) => identity.with_origin(origin),
            None => identity,
        }
    }

    /// Trust evidence carried by this manifest.
    pub fn evidence(&self) -> Evidence {
        Evidence {
            public_key: self.public_key.clone(),
            signature: self.signature.clone(),
        }
    }
}

/// Builder for programmatic manifest construction (embedders, tests).
pub struct ManifestBuilder {
    name: String,
    model: ExecutionModel,
    module: PathBuf,
    origin: Option<String>,
}

impl ManifestBuilder {
    pub fn new(name: impl Into<String>, model: ExecutionModel) -> Self {
        Self {
            name: name.into(),
            model,
            module: PathBuf::from("module.wasm"),
            origin: None,
        }
    }

    pub fn module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module = path.into();
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Finishes without signature evidence.
    pub fn build(self) -> ModuleManifest {
        ModuleManifest {
            name: self.name,
            model: self.model,
            module: self.module,
            origin: self.origin,
            public_key: None,
            signature: None,
        }
    }

    /// Signs the module's content hash and finishes.
    pub fn sign(self, module_bytes: &[u8], key: &SigningKey) -> ModuleManifest {
        let identity = ModuleIdentity::for_bytes(module_bytes);
        let signature = key.sign(identity.content_hash());
        let mut manifest = self.build();
        manifest.public_key = Some(BASE64.encode(key.verifying_key().to_bytes()));
        manifest.signature = Some(BASE64.encode(signature.to_bytes()));
        manifest
    }
}
