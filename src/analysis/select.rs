use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::analysis::distance::DistanceMatrix;
use crate::analysis::medoids::{ClusterAssignment, KMedoids};
use crate::analysis::pca::{self, Embedding};
use crate::core::domain::MedoidInit;
use crate::core::error::DiversityError;
use crate::engine::fingerprint::Fingerprints;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// One chosen batch index per cluster, in cluster order.
    pub indices: Vec<usize>,
    pub assignment: ClusterAssignment,
    pub embedding: Option<Embedding>,
}

/// Picks a non-redundant subset of a batch: k-medoids on the distance
/// matrix, then one random member per cluster.
#[derive(Debug, Clone)]
pub struct RepresentativeSelector {
    pub n_select: usize,
    pub init: MedoidInit,
    /// Seeds the medoid initialization; the member pick uses the caller's RNG.
    pub seed: Option<u64>,
}

impl RepresentativeSelector {
    pub fn new(n_select: usize) -> Self {
        Self {
            n_select,
            init: MedoidInit::Heuristic,
            seed: None,
        }
    }

    pub fn init(mut self, init: MedoidInit) -> Self {
        self.init = init;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn select<R: Rng + ?Sized>(
        &self,
        batch: &[Fingerprints],
        distances: &DistanceMatrix,
        rng: &mut R,
    ) -> Result<Selection, DiversityError> {
        let m = batch.len();
        if m == 0 {
            return Err(DiversityError::EmptyBatch);
        }
        if self.n_select == 0 {
            return Err(DiversityError::InvalidParameter(
                "n_select must be at least 1".to_string(),
            ));
        }
        if distances.len() != m {
            return Err(DiversityError::InvalidDistanceMatrix(format!(
                "matrix is {}x{} but the batch has {} entries",
                distances.len(),
                distances.len(),
                m
            )));
        }

        let embedding = pca::embed(batch);
        if let Some(e) = &embedding {
            debug!("PCA explained variance: {:?}", e.explained_variance_ratio);
        }

        let k = self.n_select.min(m);
        let assignment = KMedoids::new(k)
            .init(self.init)
            .seed(self.seed)
            .fit(distances)?;

        let mut indices = Vec::with_capacity(k);
        for c in 0..k {
            let members = assignment.members(c);
            // Medoids label themselves, so no cluster is empty.
            let pick = members
                .choose(rng)
                .copied()
                .unwrap_or(assignment.medoids[c]);
            indices.push(pick);
        }

        Ok(Selection {
            indices,
            assignment,
            embedding,
        })
    }
}
