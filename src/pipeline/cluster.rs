use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::distance::{AssignmentMetric, DistanceMatrix, DistanceMatrixBuilder};
use crate::analysis::select::RepresentativeSelector;
use crate::core::domain::{Params, Structure, TypeLabels};
use crate::core::error::DiversityError;
use crate::pipeline::fingerprint::FingerprintBatch;
use crate::pipeline::io::{read_json, write_embedding_csv, write_json};
use crate::pipeline::{
    folder_name, folder_rng, FolderReport, DISTANCE_FILE, EMBEDDING_FILE, FINGERPRINTS_FILE,
    SELECTED_FILE,
};

/// Representatives picked from one seed folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedSet {
    pub folder: String,
    /// Positions in the fingerprint batch, one per cluster.
    pub indices: Vec<usize>,
    pub structures: Vec<Structure>,
}

/// Reuses a persisted matrix when it is valid for `expected` entries.
pub fn load_distance_matrix(path: &Path, expected: usize) -> Result<DistanceMatrix> {
    let loaded: DistanceMatrix = read_json(path)?;
    let matrix = loaded.validated()?;
    if matrix.len() != expected {
        return Err(DiversityError::InvalidDistanceMatrix(format!(
            "stored matrix covers {} structures, batch has {}",
            matrix.len(),
            expected
        ))
        .into());
    }
    Ok(matrix)
}

pub fn cluster_folder(folder: &Path, index: usize, params: &Params) -> Result<FolderReport> {
    let input = folder.join(FINGERPRINTS_FILE);
    if !input.exists() {
        return Ok(FolderReport::skipped(folder, "no fingerprints"));
    }
    let batch: FingerprintBatch = read_json(&input)?;
    if batch.is_empty() {
        return Err(DiversityError::EmptyBatch.into());
    }
    let label = folder_name(folder);
    let labels = TypeLabels::for_batch(&batch.structures)?;

    let dist_path = folder.join(DISTANCE_FILE);
    let stored = if dist_path.exists() {
        match load_distance_matrix(&dist_path, batch.len()) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("[{}] discarding stored distance matrix: {:#}", label, e);
                None
            }
        }
    } else {
        None
    };
    let matrix = match stored {
        Some(m) => {
            info!("[{}] reusing {}", label, DISTANCE_FILE);
            m
        }
        None => {
            let m = DistanceMatrixBuilder::new(AssignmentMetric)
                .build(&batch.fingerprints, &labels)
                .context("building distance matrix")?;
            write_json(&dist_path, &m)?;
            m
        }
    };

    let selector = RepresentativeSelector::new(params.n_select)
        .init(params.medoid_init)
        .seed(params.seed.map(|s| s.wrapping_add(index as u64)));
    let mut rng = folder_rng(params.seed, index);
    let selection = selector.select(&batch.fingerprints, &matrix, &mut rng)?;

    info!(
        "[{}] selected {} of {} structures",
        label,
        selection.indices.len(),
        batch.len()
    );

    let selected = SelectedSet {
        folder: label,
        indices: selection.indices.clone(),
        structures: selection
            .indices
            .iter()
            .map(|&i| batch.structures[i].clone())
            .collect(),
    };
    // selected.json last: its presence marks a finished folder for merge.
    let selected_path = folder.join(SELECTED_FILE);
    if selected_path.exists() {
        fs::remove_file(&selected_path)
            .with_context(|| format!("cannot remove previous {}", selected_path.display()))?;
    }
    if let Some(embedding) = &selection.embedding {
        write_embedding_csv(
            &folder.join(EMBEDDING_FILE),
            embedding,
            &selection.assignment.labels,
            &selection.indices,
        )?;
    }
    write_json(&selected_path, &selected)?;

    Ok(FolderReport::completed(folder, selected.indices.len(), 0))
}
