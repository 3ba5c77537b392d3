use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::core::error::DiversityError;

// --- Physics Types ---

/// Represents a single chemical element/species properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub symbol: String,
    pub atomic_number: u8,
    pub mass: f64, // amu
}

impl Default for Species {
    fn default() -> Self {
        Self {
            symbol: "X".to_string(),
            atomic_number: 0,
            mass: 1.0,
        }
    }
}

/// A single atom instance in a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub element_id: usize, // Index into Structure::species
    pub position: Point3<f64>,
}

impl Atom {
    pub fn new(element_id: usize, position: Point3<f64>) -> Self {
        Self { element_id, position }
    }
}

/// Defines the Periodic Boundary Conditions (if any).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    pub vectors: Matrix3<f64>, // Columns are a, b, c
    pub inverse: Matrix3<f64>, // Precomputed for fractional conversion
}

impl Lattice {
    pub fn from_matrix(vectors: Matrix3<f64>) -> Option<Self> {
        let inverse = vectors.try_inverse()?;
        Some(Self { vectors, inverse })
    }

    pub fn cubic(a: f64) -> Option<Self> {
        Self::from_matrix(Matrix3::from_diagonal_element(a))
    }

    pub fn to_fractional(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.inverse * p.coords)
    }

    pub fn to_cartesian(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.vectors * p.coords)
    }

    pub fn volume(&self) -> f64 {
        self.vectors.determinant().abs()
    }

    /// Distance between opposite faces of the cell, per lattice vector.
    pub fn face_spacings(&self) -> Vector3<f64> {
        let a = self.vectors.column(0).into_owned();
        let b = self.vectors.column(1).into_owned();
        let c = self.vectors.column(2).into_owned();
        let v = self.volume();
        Vector3::new(
            v / b.cross(&c).norm(),
            v / c.cross(&a).norm(),
            v / a.cross(&b).norm(),
        )
    }
}

// --- The Core Entity ---

/// An atomic structure: the unit that is perturbed, relaxed, fingerprinted
/// and clustered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structure {
    pub id: Uuid,
    pub origin: String,

    pub species: Vec<Species>,
    pub atoms: Vec<Atom>,
    pub lattice: Option<Lattice>,

    pub energy: Option<f64>,
}

impl Structure {
    pub fn new(origin: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin: origin.to_string(),
            species: Vec::new(),
            atoms: Vec::new(),
            lattice: None,
            energy: None,
        }
    }

    /// Builds a structure from chemical symbols and cartesian positions,
    /// registering species in first-encountered order.
    pub fn from_symbols(
        origin: &str,
        symbols: &[&str],
        positions: &[Point3<f64>],
        lattice: Option<Lattice>,
    ) -> Self {
        let mut s = Structure::new(origin);
        s.lattice = lattice;
        for (sym, pos) in symbols.iter().zip(positions) {
            let id = match s.species.iter().position(|sp| sp.symbol == *sym) {
                Some(id) => id,
                None => {
                    s.species.push(Species {
                        symbol: sym.to_string(),
                        ..Default::default()
                    });
                    s.species.len() - 1
                }
            };
            s.atoms.push(Atom::new(id, *pos));
        }
        s
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.atoms
            .iter()
            .map(|a| {
                self.species
                    .get(a.element_id)
                    .map(|s| s.symbol.as_str())
                    .unwrap_or("X")
            })
            .collect()
    }

    /// Displaces every atom by the matching entry of `delta`.
    pub fn displace(&mut self, delta: &[Vector3<f64>]) {
        for (atom, d) in self.atoms.iter_mut().zip(delta) {
            atom.position += d;
        }
    }
}

/// Per-atom species-group ids, numbered in first-encountered symbol order.
///
/// Two structures can only be compared by the distance metric when they
/// carry identical labelings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLabels(Vec<usize>);

impl TypeLabels {
    pub fn from_symbols(symbols: &[&str]) -> Self {
        let mut seen: Vec<&str> = Vec::new();
        let labels = symbols
            .iter()
            .map(|sym| match seen.iter().position(|s| s == sym) {
                Some(i) => i,
                None => {
                    seen.push(sym);
                    seen.len() - 1
                }
            })
            .collect();
        Self(labels)
    }

    pub fn of(structure: &Structure) -> Self {
        Self::from_symbols(&structure.symbols())
    }

    pub fn from_vec(labels: Vec<usize>) -> Self {
        Self(labels)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn n_groups(&self) -> usize {
        self.0.iter().max().map_or(0, |m| m + 1)
    }

    /// Atom indices belonging to species group `g`.
    pub fn members(&self, g: usize) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == g)
            .map(|(i, _)| i)
            .collect()
    }

    /// Derives the labeling of a batch from its first structure and checks
    /// every other entry against it.
    pub fn for_batch(structures: &[Structure]) -> Result<Self, DiversityError> {
        let first = structures.first().ok_or(DiversityError::EmptyBatch)?;
        let reference = Self::of(first);
        for (index, s) in structures.iter().enumerate().skip(1) {
            let labels = Self::of(s);
            if labels.len() != reference.len() {
                return Err(DiversityError::InconsistentSpecies {
                    index,
                    labels: reference.len(),
                    atoms: s.len(),
                });
            }
            if let Some(atom) = (0..labels.len()).find(|&a| labels.0[a] != reference.0[a]) {
                return Err(DiversityError::SpeciesOrderMismatch { index, atom });
            }
        }
        Ok(reference)
    }
}

// --- Configuration Types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ForceScaling {
    /// `(F_base - k * g) / k`, the historical behaviour of the dataset tool.
    DivideByKfactor,
    /// `F_base - k * g`, the exact negative derivative of the biased energy.
    Consistent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MedoidInit {
    /// k-medoids++ seeding (random, reproducible when seeded).
    PlusPlus,
    /// The k points with the smallest total distance to all others. Default.
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PotentialKind {
    LennardJones {
        epsilon: f64,
        sigma: f64,
        cutoff: f64,
    },
    Gulp {
        executable: String,
        library: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub seed: Option<u64>,
    pub threads: usize,

    // Novelty-biased relaxation
    pub potential: PotentialKind,
    pub kfactor: f64,
    pub relax_cutoff: f64,
    pub force_scaling: ForceScaling,
    pub rattle_stdev: f64,
    pub strain: Option<f64>,
    pub max_steps: usize,
    pub fmax: f64,

    // Fingerprints
    pub fingerprint_cutoff: f64,
    pub max_neighbors: usize,
    pub n_basis: usize,
    pub basis_width: f64,

    // Selection
    pub n_select: usize,
    pub medoid_init: MedoidInit,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            seed: None,
            threads: 4,
            potential: PotentialKind::LennardJones {
                epsilon: 0.0104,
                sigma: 3.4,
                cutoff: 8.5,
            },
            kfactor: 300.0,
            relax_cutoff: 5.0,
            force_scaling: ForceScaling::DivideByKfactor,
            rattle_stdev: 0.01,
            strain: None,
            max_steps: 5000,
            fmax: 0.01,
            fingerprint_cutoff: 4.0,
            max_neighbors: 100,
            n_basis: 12,
            basis_width: 0.4,
            n_select: 200,
            medoid_init: MedoidInit::Heuristic,
        }
    }
}
