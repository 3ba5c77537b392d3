//! Batch stages over a data directory holding one `mp-*` folder per seed.
//!
//! `generate` relaxes the rattled seed under the novelty-biased potential,
//! `fingerprint` describes every frame, `cluster` picks representatives and
//! `merge` gathers the picks of all folders into one dataset file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::core::domain::Params;
use crate::engine::potential::Potential;

pub mod cluster;
pub mod fingerprint;
pub mod generate;
pub mod io;
pub mod merge;

pub const SEED_FILE: &str = "seed.json";
pub const SEED_SUPER_FILE: &str = "seed_super.json";
pub const TRAJECTORY_FILE: &str = "trajectory.json";
pub const FINGERPRINTS_FILE: &str = "fingerprints.json";
pub const DISTANCE_FILE: &str = "fp_dist_matrix.json";
pub const SELECTED_FILE: &str = "selected.json";
pub const EMBEDDING_FILE: &str = "embedding.csv";
pub const MERGED_FILE: &str = "all_selected.json";

const FOLDER_PREFIX: &str = "mp-";

#[derive(Debug, Clone, PartialEq)]
pub enum FolderStatus {
    Completed,
    Skipped(String),
    Failed(String),
}

/// Outcome of one stage on one seed folder.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderReport {
    pub folder: String,
    pub status: FolderStatus,
    pub passed: usize,
    pub failed: usize,
}

impl FolderReport {
    pub fn completed(folder: &Path, passed: usize, failed: usize) -> Self {
        Self {
            folder: folder_name(folder),
            status: FolderStatus::Completed,
            passed,
            failed,
        }
    }

    pub fn skipped(folder: &Path, reason: impl Into<String>) -> Self {
        Self {
            folder: folder_name(folder),
            status: FolderStatus::Skipped(reason.into()),
            passed: 0,
            failed: 0,
        }
    }

    fn failed(folder: &Path, err: &anyhow::Error) -> Self {
        Self {
            folder: folder_name(folder),
            status: FolderStatus::Failed(format!("{:#}", err)),
            passed: 0,
            failed: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == FolderStatus::Completed
    }
}

impl fmt::Display for FolderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            FolderStatus::Completed => write!(
                f,
                "{}: ok (passed {}, failed {})",
                self.folder, self.passed, self.failed
            ),
            FolderStatus::Skipped(why) => write!(f, "{}: skipped ({})", self.folder, why),
            FolderStatus::Failed(why) => write!(f, "{}: FAILED ({})", self.folder, why),
        }
    }
}

pub(crate) fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

/// Seed folders (`mp-*`) under `root`, sorted by name.
pub fn seed_folders(root: &Path) -> Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("cannot read data directory {}", root.display()))?
    {
        let path = entry?.path();
        let is_seed = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with(FOLDER_PREFIX));
        if is_seed && path.is_dir() {
            folders.push(path);
        }
    }
    folders.sort();
    Ok(folders)
}

/// Per-folder RNG: `seed + index` when seeded, entropy otherwise.
pub fn folder_rng(seed: Option<u64>, index: usize) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s.wrapping_add(index as u64)),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Which stages a [`Pipeline::run`] call executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Fingerprint,
    Cluster,
    Merge,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Generate, Stage::Fingerprint, Stage::Cluster, Stage::Merge];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Generate => "generate",
            Stage::Fingerprint => "fingerprint",
            Stage::Cluster => "cluster",
            Stage::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// Data directory plus the settings every stage reads.
pub struct Pipeline {
    root: PathBuf,
    params: Params,
    base: Arc<dyn Potential>,
}

impl Pipeline {
    pub fn new(root: impl Into<PathBuf>, params: Params, base: Arc<dyn Potential>) -> Self {
        Self {
            root: root.into(),
            params,
            base,
        }
    }

    /// Runs one stage. Folder-level failures are reported, not returned.
    pub fn run(&self, stage: Stage) -> Result<Vec<FolderReport>> {
        match stage {
            Stage::Generate => self.for_each_folder(stage, |i, dir| {
                generate::generate_folder(dir, i, &self.params, self.base.clone())
            }),
            Stage::Fingerprint => self.for_each_folder(stage, |_, dir| {
                fingerprint::fingerprint_folder(dir, &self.params)
            }),
            Stage::Cluster => {
                self.for_each_folder(stage, |i, dir| cluster::cluster_folder(dir, i, &self.params))
            }
            Stage::Merge => {
                let report = merge::merge_folders(&self.root)?;
                info!("merge: {}", report);
                Ok(vec![report])
            }
        }
    }

    fn for_each_folder<F>(&self, stage: Stage, job: F) -> Result<Vec<FolderReport>>
    where
        F: Fn(usize, &Path) -> Result<FolderReport> + Sync,
    {
        let folders = seed_folders(&self.root)?;
        if folders.is_empty() {
            warn!("{}: no {}* folders under {}", stage, FOLDER_PREFIX, self.root.display());
        }

        let reports: Vec<FolderReport> = folders
            .par_iter()
            .enumerate()
            .map(|(i, dir)| match job(i, dir) {
                Ok(report) => {
                    if let FolderStatus::Skipped(why) = &report.status {
                        warn!("[{}] {} skipped: {}", report.folder, stage, why);
                    }
                    report
                }
                Err(e) => {
                    error!("[{}] {} failed: {:#}", folder_name(dir), stage, e);
                    FolderReport::failed(dir, &e)
                }
            })
            .collect();

        let done = reports.iter().filter(|r| r.is_completed()).count();
        let skipped = reports
            .iter()
            .filter(|r| matches!(r.status, FolderStatus::Skipped(_)))
            .count();
        info!(
            "{}: {} completed, {} skipped, {} failed",
            stage,
            done,
            skipped,
            reports.len() - done - skipped
        );
        for r in &reports {
            info!("  {}", r);
        }
        Ok(reports)
    }
}
