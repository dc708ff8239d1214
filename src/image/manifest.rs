use crate::builder::Entrypoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRef {
    pub id: String,
    pub step: String,
}

/// Immutable metadata describing a built image: its ordered layer stack
/// and the runtime declaration (workdir, advertised port, entrypoint).
/// Fixed at build time; a new build is the only way to change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageManifest {
    pub id: String,
    pub name: String,
    pub base: String,
    pub layers: Vec<LayerRef>,
    pub workdir: String,
    /// Advertised listening port. Documentation of intended use only;
    /// nothing verifies the launched process actually binds it.
    pub port: Option<u16>,
    pub entrypoint: Entrypoint,
    pub created_at: DateTime<Utc>,
}

impl ImageManifest {
    pub fn short_id(&self) -> &str {
        &self.id[..12.min(self.id.len())]
    }
}
