use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::domain::Structure;
use crate::pipeline::cluster::SelectedSet;
use crate::pipeline::io::{read_json, write_json};
use crate::pipeline::{folder_name, seed_folders, FolderReport, MERGED_FILE, SELECTED_FILE};

/// The combined dataset written to the data root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedDataset {
    /// RFC 3339 creation time.
    pub created: String,
    pub folders: Vec<String>,
    pub structures: Vec<Structure>,
}

/// Concatenates the `selected.json` of every seed folder, in folder order.
pub fn merge_folders(root: &Path) -> Result<FolderReport> {
    let mut merged = MergedDataset {
        created: Utc::now().to_rfc3339(),
        folders: Vec::new(),
        structures: Vec::new(),
    };
    let mut missing = 0;

    for folder in seed_folders(root)? {
        let path = folder.join(SELECTED_FILE);
        if !path.exists() {
            warn!("[{}] nothing selected, not merged", folder_name(&folder));
            missing += 1;
            continue;
        }
        let set: SelectedSet = read_json(&path)?;
        merged.folders.push(set.folder);
        merged.structures.extend(set.structures);
    }

    write_json(&root.join(MERGED_FILE), &merged)?;
    Ok(FolderReport::completed(root, merged.structures.len(), missing))
}
