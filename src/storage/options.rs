use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::primitives::bitmap::MAX_INDEX;
use crate::storage::quads::DEFAULT_GRAPH_IRI;
use crate::types::{QuadError, Result};

/// Configuration options supplied when opening a [`super::QuadStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Label prefix for components and tracing events
    pub name: String,
    /// IRI of the graph that receives plain triples
    pub default_graph: String,
    /// Whether deleting the last quad that uses a term also frees the term id
    pub reclaim_terms: bool,
    /// Highest quad id the per-dimension indexes accept
    pub max_quad_id: u64,
    /// Whether the dictionaries maintain hit/miss counters
    pub dict_metrics: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: "quads".to_owned(),
            default_graph: DEFAULT_GRAPH_IRI.to_owned(),
            reclaim_terms: true,
            max_quad_id: MAX_INDEX,
            dict_metrics: true,
        }
    }
}

impl StoreOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the label prefix.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the IRI used as the default graph.
    pub fn default_graph(mut self, iri: impl Into<String>) -> Self {
        self.default_graph = iri.into();
        self
    }

    /// Enables or disables term reclamation on delete.
    pub fn reclaim_terms(mut self, enabled: bool) -> Self {
        self.reclaim_terms = enabled;
        self
    }

    /// Sets the highest quad id accepted by the indexes.
    pub fn max_quad_id(mut self, max: u64) -> Self {
        self.max_quad_id = max;
        self
    }

    /// Enables or disables dictionary counters.
    pub fn dict_metrics(mut self, enabled: bool) -> Self {
        self.dict_metrics = enabled;
        self
    }

    /// Parses options from TOML; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: StoreOptions = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Renders the options as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| QuadError::Config(err.to_string()))
    }

    /// Rejects options the store cannot open with.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(QuadError::Invalid("store name must not be empty"));
        }
        if self.default_graph.is_empty() {
            return Err(QuadError::Invalid("default graph IRI must not be empty"));
        }
        if self.max_quad_id > MAX_INDEX {
            return Err(QuadError::Invalid("max_quad_id exceeds the bitmap range"));
        }
        Ok(())
    }
}
