//! Registry Parser
//!
//! Handles loading action registries from YAML (or JSON, which YAML
//! accepts) documents of the form `{ actions: [ ... ] }`.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;

use super::model::ActionSpec;
use super::registry::ActionRegistry;
use super::validator::validate_registry;
use crate::error::LoadError;

/// Top-level registry document.
#[derive(Deserialize, Debug)]
struct RegistryDocument {
    #[serde(default)]
    actions: Vec<ActionSpec>,
}

/// Loads a registry from a YAML or JSON file.
///
/// This function:
/// 1. Reads and parses the document
/// 2. Rejects duplicate action names
/// 3. Validates every flow (ids, references, auth containment)
///
/// # Example
///
/// ```rust,no_run
/// use stepflow::workflow::load_registry;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = load_registry("actions.yaml")?;
///     println!("Loaded {} actions", registry.len());
///     Ok(())
/// }
/// ```
pub fn load_registry(path: impl AsRef<Path>) -> Result<ActionRegistry, LoadError> {
    let path = path.as_ref();
    info!("Loading registry from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!("Registry document loaded ({} bytes)", content.len());

    load_registry_str(&content)
}

/// Parses and validates a registry document held in memory.
pub fn load_registry_str(content: &str) -> Result<ActionRegistry, LoadError> {
    let document: RegistryDocument = serde_yaml::from_str(content)?;
    info!("Parsed {} actions", document.actions.len());

    let registry = ActionRegistry::from_actions(document.actions)?;
    validate_registry(&registry).map_err(LoadError::Invalid)?;

    Ok(registry)
}
