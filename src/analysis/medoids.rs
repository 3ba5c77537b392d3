use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::analysis::distance::DistanceMatrix;
use crate::core::domain::MedoidInit;
use crate::core::error::DiversityError;

/// Result of a k-medoids fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    /// Cluster id in `0..k` for every point.
    pub labels: Vec<usize>,
    /// Index of the medoid point of each cluster.
    pub medoids: Vec<usize>,
    /// Sum of point-to-medoid distances.
    pub inertia: f64,
    pub iterations: usize,
}

impl ClusterAssignment {
    pub fn k(&self) -> usize {
        self.medoids.len()
    }

    /// Points of cluster `c`, in index order.
    pub fn members(&self, c: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == c)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Alternating k-medoids on a precomputed distance matrix.
#[derive(Debug, Clone)]
pub struct KMedoids {
    pub k: usize,
    pub init: MedoidInit,
    pub seed: Option<u64>,
    pub max_iter: usize,
}

impl KMedoids {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            init: MedoidInit::Heuristic,
            seed: None,
            max_iter: 300,
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

    pub fn fit(&self, distances: &DistanceMatrix) -> Result<ClusterAssignment, DiversityError> {
        let n = distances.len();
        if self.k == 0 || self.k > n {
            return Err(DiversityError::InvalidParameter(format!(
                "cannot form {} clusters from {} points",
                self.k, n
            )));
        }

        let mut medoids = match self.init {
            MedoidInit::PlusPlus => self.plus_plus(distances),
            MedoidInit::Heuristic => heuristic(distances, self.k),
        };

        let mut labels = assign(distances, &medoids);
        let mut iterations = 0;

        while iterations < self.max_iter {
            iterations += 1;
            let mut changed = false;

            for (c, medoid) in medoids.iter_mut().enumerate() {
                let members: Vec<usize> = (0..n).filter(|&i| labels[i] == c).collect();
                let cost = |m: usize| members.iter().map(|&j| distances.get(m, j)).sum::<f64>();

                let mut best = *medoid;
                let mut best_cost = cost(best);
                for &candidate in &members {
                    let c_cost = cost(candidate);
                    if c_cost < best_cost {
                        best = candidate;
                        best_cost = c_cost;
                    }
                }
                if best != *medoid {
                    *medoid = best;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
            labels = assign(distances, &medoids);
        }

        let inertia = labels
            .iter()
            .enumerate()
            .map(|(i, &c)| distances.get(i, medoids[c]))
            .sum();

        Ok(ClusterAssignment {
            labels,
            medoids,
            inertia,
            iterations,
        })
    }

    /// k-medoids++: first medoid uniform, then each next one with probability
    /// proportional to the squared distance to the closest chosen medoid.
    fn plus_plus(&self, distances: &DistanceMatrix) -> Vec<usize> {
        let n = distances.len();
        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut medoids = Vec::with_capacity(self.k);
        medoids.push(rng.gen_range(0..n));
        let mut closest: Vec<f64> = (0..n).map(|j| distances.get(medoids[0], j)).collect();

        while medoids.len() < self.k {
            let weights: Vec<f64> = (0..n)
                .map(|j| {
                    if medoids.contains(&j) {
                        0.0
                    } else {
                        closest[j] * closest[j]
                    }
                })
                .collect();
            let total: f64 = weights.iter().sum();

            let next = if total > 0.0 {
                let mut target = rng.gen::<f64>() * total;
                let mut pick = None;
                for (j, &w) in weights.iter().enumerate() {
                    if w <= 0.0 {
                        continue;
                    }
                    pick = Some(j);
                    if target < w {
                        break;
                    }
                    target -= w;
                }
                pick
            } else {
                None
            };

            // All remaining points coincide with a medoid.
            let next = match next {
                Some(j) => j,
                None => {
                    let free: Vec<usize> = (0..n).filter(|j| !medoids.contains(j)).collect();
                    free[rng.gen_range(0..free.len())]
                }
            };

            medoids.push(next);
            for (j, c) in closest.iter_mut().enumerate() {
                *c = c.min(distances.get(next, j));
            }
        }
        medoids
    }
}

/// The `k` points with the smallest total distance to all others.
fn heuristic(distances: &DistanceMatrix, k: usize) -> Vec<usize> {
    let n = distances.len();
    let mut order: Vec<(usize, f64)> = (0..n)
        .map(|i| (i, (0..n).map(|j| distances.get(i, j)).sum()))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    order.into_iter().take(k).map(|(i, _)| i).collect()
}

/// Nearest-medoid labels; medoids always label themselves.
fn assign(distances: &DistanceMatrix, medoids: &[usize]) -> Vec<usize> {
    let n = distances.len();
    (0..n)
        .map(|i| {
            if let Some(own) = medoids.iter().position(|&m| m == i) {
                return own;
            }
            let mut best = 0;
            let mut best_dist = distances.get(i, medoids[0]);
            for (c, &m) in medoids.iter().enumerate().skip(1) {
                let d = distances.get(i, m);
                if d < best_dist {
                    best = c;
                    best_dist = d;
                }
            }
            best
        })
        .collect()
}
