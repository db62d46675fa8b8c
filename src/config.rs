//! MASST profile files and resolution of the effective run settings.
//!
//! A profile names the ontology a MASST flavour annotates and the two keys used
//! to align it with the data table:
//!
//! ```yaml
//! name: food
//! tree_file: gfop_food_tree.json
//! tree_node_key: name
//! metadata_key: group_value
//! ```
//!
//! Relative `tree_file` paths resolve against the profile's directory.
//! Command-line flags always win over profile values.

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

pub const DEFAULT_NODE_KEY: &str = "name";
pub const DEFAULT_DATA_KEY: &str = "group_value";

fn default_node_key() -> String {
    DEFAULT_NODE_KEY.to_string()
}

fn default_data_key() -> String {
    DEFAULT_DATA_KEY.to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MasstProfile {
    #[serde(default)]
    pub name: Option<String>,
    pub tree_file: PathBuf,
    #[serde(default = "default_node_key")]
    pub tree_node_key: String,
    #[serde(default = "default_data_key")]
    pub metadata_key: String,
}

impl MasstProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).with_context(|| format!("Opening profile file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)?;
        let mut profile: MasstProfile = serde_yaml::from_str(&raw)
            .with_context(|| format!("Parsing profile YAML {path:?}"))?;
        if profile.tree_file.is_relative()
            && let Some(parent) = path.parent()
        {
            profile.tree_file = parent.join(&profile.tree_file);
        }
        Ok(profile)
    }
}

/// Inputs common to every subcommand once flags and profile are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub ontology: PathBuf,
    pub node_key: String,
    pub data_key: String,
}

impl Settings {
    pub fn resolve(
        ontology: Option<&Path>,
        node_key: Option<&str>,
        data_key: Option<&str>,
        profile: Option<&MasstProfile>,
    ) -> Result<Self> {
        let ontology = ontology
            .map(Path::to_path_buf)
            .or_else(|| profile.map(|p| p.tree_file.clone()))
            .ok_or_else(|| anyhow!("No ontology given; pass --ontology or --config"))?;
        let node_key = node_key
            .map(str::to_string)
            .or_else(|| profile.map(|p| p.tree_node_key.clone()))
            .unwrap_or_else(default_node_key);
        let data_key = data_key
            .map(str::to_string)
            .or_else(|| profile.map(|p| p.metadata_key.clone()))
            .unwrap_or_else(default_data_key);
        Ok(Self {
            ontology,
            node_key,
            data_key,
        })
    }
}
