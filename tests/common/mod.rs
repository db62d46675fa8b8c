#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Two-level food ontology used across the integration tests.
pub const FOOD_TREE: &str = r#"{
  "name": "root",
  "children": [
    {
      "name": "plants",
      "children": [
        {"name": "fruits", "NCBI": 1},
        {"name": "vegetables", "NCBI": 2}
      ]
    },
    {
      "name": "animals",
      "children": [
        {"name": "dairy", "NCBI": 3}
      ]
    }
  ]
}"#;

/// Match table keyed on `group_value`, aligned with [`FOOD_TREE`] names.
pub const FOOD_DATA: &str = "group_value\tgroup_size\tmatched_size\tsource\tmatches_json\n\
fruits\t40\t10\tgfop\t[\"file1.mzML\"]\n\
vegetables\t60\t5\tgfop\t[]\n\
dairy\t25\t0\tgfop\t[]\n";

/// Single-path ontology `depth` levels deep; only the leaf carries sizes.
pub fn chain_tree(depth: usize) -> String {
    let mut json = String::new();
    for level in 0..depth {
        json.push_str(&format!(r#"{{"name":"n{level}","children":["#));
    }
    json.push_str(&format!(
        r#"{{"name":"n{depth}","group_size":4,"matched_size":1}}"#
    ));
    json.push_str(&"]}".repeat(depth));
    json
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}
