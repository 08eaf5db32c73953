//! Recipe fingerprinting for content-addressed templates
//!
//! A recipe describes how a database is initialized: the modules to install,
//! whether demo data is loaded, and any extra inputs (manifests, requirement
//! files) whose content should invalidate the template when it changes.
//! Same recipe = same fingerprint = same template.

use crate::error::{PgstampError, PgstampResult};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Fingerprint length in bytes (rendered as twice as many hex chars)
pub const FINGERPRINT_LEN: usize = 20;

/// Domain separator so the digest never matches an unrelated SHA-256
const ENCODING_TAG: &[u8] = b"pgstamp-recipe-v2";

/// Fixed-size content hash of a recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Wrap raw fingerprint bytes
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, as used in template names
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = PgstampError;

    /// Parse exactly `2 * FINGERPRINT_LEN` lowercase hex chars
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != FINGERPRINT_LEN * 2 {
            return Err(PgstampError::InvalidFingerprint(format!(
                "expected {} hex characters, got {}",
                FINGERPRINT_LEN * 2,
                s.len()
            )));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(PgstampError::InvalidFingerprint(format!(
                "not lowercase hex: {s}"
            )));
        }

        let mut bytes = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| PgstampError::InvalidFingerprint(e.to_string()))?;
        Ok(Self(bytes))
    }
}

/// Everything that determines the content of a freshly built database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipe {
    modules: BTreeSet<String>,
    with_demo: bool,
    inputs: BTreeMap<String, Vec<u8>>,
    files: BTreeSet<Vec<u8>>,
}

impl Recipe {
    /// Create a recipe from a module list
    ///
    /// Names are trimmed; empty names are dropped. Order and duplicates do
    /// not matter.
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let modules = modules
            .into_iter()
            .map(|m| m.as_ref().trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        Self {
            modules,
            with_demo: false,
            inputs: BTreeMap::new(),
            files: BTreeSet::new(),
        }
    }

    /// Whether demo data is loaded during the build
    pub fn with_demo(mut self, with_demo: bool) -> Self {
        self.with_demo = with_demo;
        self
    }

    /// Add a named input blob; a later input with the same name replaces it
    pub fn with_input(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.inputs.insert(name.into(), content.into());
        self
    }

    /// Add a file's contents as an input
    ///
    /// Only the content counts: the same file reached through a different
    /// path spelling yields the same recipe.
    pub fn with_file(mut self, path: &Path) -> PgstampResult<Self> {
        let content = fs::read(path).map_err(|e| {
            PgstampError::io(format!("reading recipe file {}", path.display()), e)
        })?;
        self.files.insert(content);
        Ok(self)
    }

    /// Normalized (sorted, de-duplicated) module names
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }

    /// Whether demo data is loaded
    pub fn demo(&self) -> bool {
        self.with_demo
    }

    /// Compute this recipe's fingerprint
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(self)
    }
}

/// Hash a recipe into its fingerprint
///
/// Every variable-length field is length-prefixed so that distinct recipes
/// can never produce the same byte stream.
pub fn fingerprint(recipe: &Recipe) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(ENCODING_TAG);

    hasher.update((recipe.modules.len() as u64).to_le_bytes());
    for module in &recipe.modules {
        update_field(&mut hasher, module.as_bytes());
    }

    hasher.update([u8::from(recipe.with_demo)]);

    hasher.update((recipe.inputs.len() as u64).to_le_bytes());
    for (name, content) in &recipe.inputs {
        update_field(&mut hasher, name.as_bytes());
        update_field(&mut hasher, content);
    }

    hasher.update((recipe.files.len() as u64).to_le_bytes());
    for content in &recipe.files {
        update_field(&mut hasher, content);
    }

    let digest = hasher.finalize();
    let mut bytes = [0u8; FINGERPRINT_LEN];
    bytes.copy_from_slice(&digest[..FINGERPRINT_LEN]);
    Fingerprint(bytes)
}

fn update_field(hasher: &mut Sha256, field: &[u8]) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field);
}
