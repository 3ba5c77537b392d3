use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::domain::{Params, Structure};
use crate::core::error::FingerprintError;
use crate::core::spatial;
use crate::engine::fingerprint::{FingerprintProvider, Fingerprints, RadialFingerprint};
use crate::pipeline::io::{read_json, write_json};
use crate::pipeline::{
    folder_name, FolderReport, DISTANCE_FILE, FINGERPRINTS_FILE, TRAJECTORY_FILE,
};
use crate::solvers::fire::Trajectory;

/// A frame that could not be fingerprinted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFailure {
    pub frame: usize,
    pub reason: String,
}

/// Frames of one trajectory that fingerprinted successfully, in frame order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintBatch {
    pub structures: Vec<Structure>,
    pub fingerprints: Vec<Fingerprints>,
    pub passed: usize,
    pub failed: usize,
    pub failures: Vec<FrameFailure>,
}

impl FingerprintBatch {
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    pub fn pass_rate(&self) -> f64 {
        let total = self.passed + self.failed;
        if total == 0 {
            0.0
        } else {
            100.0 * self.passed as f64 / total as f64
        }
    }
}

/// Fingerprints every frame; a frame that fails is recorded and skipped.
pub fn fingerprint_frames(
    frames: &[Structure],
    provider: &dyn FingerprintProvider,
    cutoff: f64,
    max_neighbors: usize,
) -> FingerprintBatch {
    let mut batch = FingerprintBatch {
        structures: Vec::with_capacity(frames.len()),
        fingerprints: Vec::with_capacity(frames.len()),
        passed: 0,
        failed: 0,
        failures: Vec::new(),
    };

    for (frame, structure) in frames.iter().enumerate() {
        let mut wrapped = structure.clone();
        spatial::wrap_or_center(&mut wrapped);

        match provider.fingerprint(&wrapped, cutoff, max_neighbors, false) {
            Ok(set) if set.fingerprints.is_finite() => {
                batch.structures.push(wrapped);
                batch.fingerprints.push(set.fingerprints);
                batch.passed += 1;
            }
            Ok(_) => {
                batch.failed += 1;
                batch.failures.push(FrameFailure {
                    frame,
                    reason: "non-finite fingerprint".to_string(),
                });
            }
            Err(e) => {
                let reason = match e.downcast_ref::<FingerprintError>() {
                    Some(typed) => typed.to_string(),
                    None => format!("{:#}", e),
                };
                batch.failed += 1;
                batch.failures.push(FrameFailure { frame, reason });
            }
        }
    }
    batch
}

pub fn fingerprint_folder(folder: &Path, params: &Params) -> Result<FolderReport> {
    let input = folder.join(TRAJECTORY_FILE);
    if !input.exists() {
        return Ok(FolderReport::skipped(folder, "no trajectory"));
    }
    let trajectory: Trajectory = read_json(&input)?;

    let provider = RadialFingerprint::new(params.n_basis, params.basis_width);
    let batch = fingerprint_frames(
        &trajectory.frames,
        &provider,
        params.fingerprint_cutoff,
        params.max_neighbors,
    );

    let label = folder_name(folder);
    for f in &batch.failures {
        warn!("[{}] frame {} failed: {}", label, f.frame, f.reason);
    }
    info!(
        "[{}] Passed: {}, Failed: {}, Pass%: {:.2}",
        label,
        batch.passed,
        batch.failed,
        batch.pass_rate()
    );

    // Distances built from the previous fingerprints no longer apply.
    let stale = folder.join(DISTANCE_FILE);
    if stale.exists() {
        fs::remove_file(&stale)
            .with_context(|| format!("cannot remove stale {}", stale.display()))?;
        info!("[{}] removed stale {}", label, DISTANCE_FILE);
    }
    write_json(&folder.join(FINGERPRINTS_FILE), &batch)?;
    Ok(FolderReport::completed(folder, batch.passed, batch.failed))
}
