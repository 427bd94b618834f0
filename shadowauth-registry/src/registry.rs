//! The checkpoint registry: per-script ordered checkpoint lists.

use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use shadowauth_types::ScriptId;
use std::collections::HashMap;
use std::path::Path;

/// One externally hosted verification step in a script's gate sequence.
///
/// Immutable once loaded. `order` values within one script are unique and
/// contiguous starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSpec {
    /// 1-based position in the sequence.
    pub order: u32,
    /// Provider name, used to select the redirect-URL adapter.
    pub provider: String,
    /// Provider URL template; see `PlaceholderAdapter` for placeholders.
    pub url_template: String,
    /// When true, completion requires consuming a server-minted
    /// single-use anti-bypass token.
    #[serde(default)]
    pub anti_bypass: bool,
}

/// A script plus its configured checkpoint sequence, held sorted by `order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub script_id: ScriptId,
    /// Human-readable name for operator tooling.
    #[serde(default)]
    pub name: String,
    pub checkpoints: Vec<CheckpointSpec>,
}

impl ScriptEntry {
    /// Returns the number of checkpoints a session must complete.
    #[must_use]
    pub fn total_steps(&self) -> u32 {
        self.checkpoints.len() as u32
    }
}

/// On-disk shape of the registry document.
#[derive(Debug, Serialize, Deserialize)]
struct RegistryDoc {
    scripts: Vec<ScriptEntry>,
}

/// Read-only lookup of script checkpoint configuration by script ID.
///
/// Validated on construction; lookups never fail after that.
#[derive(Debug, Default)]
pub struct Registry {
    scripts: HashMap<ScriptId, ScriptEntry>,
}

impl Registry {
    /// Creates an empty registry. Mostly useful together with [`Registry::insert`]
    /// when building configuration programmatically.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a registry from a JSON document of the shape
    /// `{ "scripts": [ { "script_id", "name", "checkpoints": [...] } ] }`.
    pub fn from_json(json: &str) -> RegistryResult<Self> {
        let doc: RegistryDoc = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for entry in doc.scripts {
            registry.insert(entry)?;
        }
        Ok(registry)
    }

    /// Loads a registry from a JSON file.
    pub fn from_file(path: &Path) -> RegistryResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Validates and inserts a script entry, keeping checkpoints sorted by order.
    ///
    /// # Errors
    ///
    /// Fails on an empty script ID, a duplicate script ID, non-contiguous
    /// checkpoint orders, or an empty URL template.
    pub fn insert(&mut self, mut entry: ScriptEntry) -> RegistryResult<()> {
        if entry.script_id.as_str().trim().is_empty() {
            return Err(RegistryError::EmptyScriptId);
        }
        if self.scripts.contains_key(&entry.script_id) {
            return Err(RegistryError::DuplicateScript(
                entry.script_id.to_string(),
            ));
        }

        entry.checkpoints.sort_by_key(|c| c.order);
        for (idx, checkpoint) in entry.checkpoints.iter().enumerate() {
            let expected = idx as u32 + 1;
            if checkpoint.order != expected {
                return Err(RegistryError::InvalidSequence {
                    script_id: entry.script_id.to_string(),
                    expected,
                    found: checkpoint.order,
                });
            }
            if checkpoint.url_template.trim().is_empty() {
                return Err(RegistryError::EmptyTemplate {
                    script_id: entry.script_id.to_string(),
                    order: checkpoint.order,
                });
            }
        }

        self.scripts.insert(entry.script_id.clone(), entry);
        Ok(())
    }

    /// Looks up a script entry by ID.
    #[must_use]
    pub fn script(&self, script_id: &ScriptId) -> Option<&ScriptEntry> {
        self.scripts.get(script_id)
    }

    /// Looks up a single checkpoint by script ID and 1-based step number.
    #[must_use]
    pub fn checkpoint(&self, script_id: &ScriptId, step: u32) -> Option<&CheckpointSpec> {
        if step == 0 {
            return None;
        }
        self.scripts
            .get(script_id)?
            .checkpoints
            .get(step as usize - 1)
    }

    /// Returns the number of configured scripts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Returns true if no scripts are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
