use anyhow::{anyhow, Result};
use nalgebra::{Matrix3, Vector3};

use crate::core::domain::Structure;

/// A quantity a relaxation driver can ask a potential for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Energy,
    Forces,
    Stress,
}

/// The result of a physical evaluation. Only the requested properties are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyResults {
    /// Potential energy (eV).
    pub energy: Option<f64>,
    /// Per-atom forces (eV/Å), same ordering as the atoms.
    pub forces: Option<Vec<Vector3<f64>>>,
    /// Stress tensor (eV/Å³).
    pub stress: Option<Matrix3<f64>>,
}

impl PropertyResults {
    pub fn has(&self, p: Property) -> bool {
        match p {
            Property::Energy => self.energy.is_some(),
            Property::Forces => self.forces.is_some(),
            Property::Stress => self.stress.is_some(),
        }
    }

    /// Copies every property set in `other` into `self`.
    pub fn merge(&mut self, other: PropertyResults) {
        if other.energy.is_some() {
            self.energy = other.energy;
        }
        if other.forces.is_some() {
            self.forces = other.forces;
        }
        if other.stress.is_some() {
            self.stress = other.stress;
        }
    }

    pub fn require_energy(&self) -> Result<f64> {
        self.energy.ok_or_else(|| anyhow!("energy was not computed"))
    }

    pub fn require_forces(&self) -> Result<&[Vector3<f64>]> {
        self.forces
            .as_deref()
            .ok_or_else(|| anyhow!("forces were not computed"))
    }

    pub fn require_stress(&self) -> Result<Matrix3<f64>> {
        self.stress.ok_or_else(|| anyhow!("stress was not computed"))
    }
}

/// A generic interface for interatomic potentials.
/// Implementations must be Thread-Safe (Sync).
pub trait Potential: Send + Sync {
    fn energy(&self, structure: &Structure) -> Result<f64>;

    fn forces(&self, structure: &Structure) -> Result<Vec<Vector3<f64>>>;

    fn stress(&self, structure: &Structure) -> Result<Matrix3<f64>>;

    /// Computes several properties at once. Potentials that get all three
    /// from a single evaluation should override this.
    fn calculate(&self, structure: &Structure, properties: &[Property]) -> Result<PropertyResults> {
        let mut out = PropertyResults::default();
        for p in properties {
            match p {
                Property::Energy => out.energy = Some(self.energy(structure)?),
                Property::Forces => out.forces = Some(self.forces(structure)?),
                Property::Stress => out.stress = Some(self.stress(structure)?),
            }
        }
        Ok(out)
    }

    /// Returns the name of the potential (e.g., "GULP 6.1").
    fn name(&self) -> &str;
}

/// Largest per-atom force norm, the usual convergence measure.
pub fn max_force(forces: &[Vector3<f64>]) -> f64 {
    forces.iter().map(|f| f.norm()).fold(0.0, f64::max)
}
