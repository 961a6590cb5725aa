//! Catalogue of named variant panels.
//!
//! Panels are data: each one is a JSON definition that becomes a
//! [`VariantSchema`]. A panel may `include` panels defined before it, whose
//! variants are concatenated in order ahead of its own. New panels are added by
//! loading another file, never by touching the pipeline.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::schema::{AliasPolicy, SchemaError, VariantSchema};
use super::variant::VariantSpec;

const BUILTIN_PANELS: &str = include_str!("../../data/panels.json");

/// Errors raised while loading a panel catalogue.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("invalid panel file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read panel file: {0}")]
    Io(#[from] std::io::Error),

    #[error("panel '{panel}': {source}")]
    Schema {
        panel: String,
        #[source]
        source: SchemaError,
    },

    #[error("panel '{panel}' includes unknown panel '{include}'")]
    UnknownInclude { panel: String, include: String },

    #[error("panel '{0}' is defined twice")]
    DuplicatePanel(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PanelFile {
    panels: Vec<PanelDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PanelDefinition {
    name: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    alias_policy: AliasPolicy,
    #[serde(default)]
    includes: Vec<String>,
    #[serde(default)]
    variants: Vec<VariantSpec>,
}

/// A named schema with a display title.
#[derive(Debug, Clone)]
pub struct Panel {
    pub title: String,
    pub schema: VariantSchema,
}

/// Named panels, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct PanelCatalogue {
    panels: BTreeMap<String, Panel>,
}

impl PanelCatalogue {
    /// The panels shipped with the crate.
    ///
    /// # Errors
    /// Only fails if the embedded data file is malformed.
    pub fn builtin() -> Result<Self, PanelError> {
        Self::from_json(BUILTIN_PANELS)
    }

    /// Parse a catalogue from a JSON document.
    ///
    /// # Errors
    /// Returns `PanelError` for malformed JSON, invalid schemas, unknown
    /// includes or duplicate panel names.
    pub fn from_json(json: &str) -> Result<Self, PanelError> {
        let file: PanelFile = serde_json::from_str(json)?;
        let mut catalogue = Self::default();
        catalogue.extend_from(file)?;
        Ok(catalogue)
    }

    /// Load additional panels from a file on top of this catalogue.
    ///
    /// # Errors
    /// Same as [`PanelCatalogue::from_json`], plus I/O errors.
    pub fn load_file(&mut self, path: &Path) -> Result<(), PanelError> {
        let content = std::fs::read_to_string(path)?;
        let file: PanelFile = serde_json::from_str(&content)?;
        self.extend_from(file)?;
        tracing::info!("Loaded panels from {:?} ({} total)", path, self.panels.len());
        Ok(())
    }

    fn extend_from(&mut self, file: PanelFile) -> Result<(), PanelError> {
        for def in file.panels {
            if self.panels.contains_key(&def.name) {
                return Err(PanelError::DuplicatePanel(def.name));
            }

            let mut specs = Vec::new();
            for include in &def.includes {
                let included = self.panels.get(include).ok_or_else(|| PanelError::UnknownInclude {
                    panel: def.name.clone(),
                    include: include.clone(),
                })?;
                specs.extend_from_slice(included.schema.specs());
            }
            specs.extend(def.variants);

            let schema = VariantSchema::define(def.name.clone(), specs, def.alias_policy)
                .map_err(|source| PanelError::Schema {
                    panel: def.name.clone(),
                    source,
                })?;
            let title = def.title.unwrap_or_else(|| def.name.clone());
            self.panels.insert(def.name, Panel { title, schema });
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Panel> {
        self.panels.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Panel)> {
        self.panels.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}
