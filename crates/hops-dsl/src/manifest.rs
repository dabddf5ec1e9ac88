//! Automation manifests (`manifest.yaml`)

use serde::{Deserialize, Serialize};

fn default_emoji() -> String {
    "⚪️".to_string()
}

/// A step shown to users setting up an automation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManifestStep {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub emoji: String,
}

/// Describes one automation directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_emoji")]
    pub emoji: String,
    #[serde(default)]
    pub required_apps: Vec<String>,
    #[serde(default)]
    pub steps: Vec<ManifestStep>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Manifest {
    /// Decode a manifest, requiring a non-empty name
    pub fn from_yaml(content: &[u8]) -> Result<Self, String> {
        let manifest: Manifest = serde_yaml::from_slice(content).map_err(|e| e.to_string())?;
        if manifest.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        Ok(manifest)
    }
}
