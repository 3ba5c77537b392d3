use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use log::trace;
use nalgebra::{Matrix3, Point3, Vector3};
use parking_lot::Mutex;

use crate::core::domain::{ForceScaling, Structure};
use crate::engine::fingerprint::FingerprintProvider;
use crate::engine::novelty::{NoveltyGradient, NoveltyScorer};
use crate::engine::potential::{Potential, Property, PropertyResults};

/// Snapshot of everything an evaluation depends on.
#[derive(Debug, Clone, PartialEq)]
struct StateKey {
    elements: Vec<usize>,
    positions: Vec<Point3<f64>>,
    cell: Option<Matrix3<f64>>,
}

impl StateKey {
    fn of(structure: &Structure) -> Self {
        Self {
            elements: structure.atoms.iter().map(|a| a.element_id).collect(),
            positions: structure.positions(),
            cell: structure.lattice.as_ref().map(|l| l.vectors),
        }
    }
}

#[derive(Debug, Default)]
struct Cache {
    key: Option<StateKey>,
    results: PropertyResults,
    score: Option<f64>,
}

/// A base potential biased toward fingerprint diversity:
/// `E = E_base - k * score`, forces per [`ForceScaling`], stress untouched.
///
/// Results are memoized against the structure state, so a driver asking for
/// energy and forces separately in one step pays for one evaluation of each.
pub struct NoveltyPotential {
    base: Arc<dyn Potential>,
    provider: Arc<dyn FingerprintProvider>,
    kfactor: f64,
    cutoff: f64,
    max_neighbors: Option<usize>,
    scaling: ForceScaling,
    scorer: NoveltyScorer,
    cache: Mutex<Cache>,
}

impl NoveltyPotential {
    pub fn new(
        base: Arc<dyn Potential>,
        provider: Arc<dyn FingerprintProvider>,
        kfactor: f64,
        cutoff: f64,
    ) -> Result<Self> {
        Self::with_scaling(base, provider, kfactor, cutoff, ForceScaling::DivideByKfactor)
    }

    pub fn with_scaling(
        base: Arc<dyn Potential>,
        provider: Arc<dyn FingerprintProvider>,
        kfactor: f64,
        cutoff: f64,
        scaling: ForceScaling,
    ) -> Result<Self> {
        if !kfactor.is_finite() || kfactor < 0.0 {
            bail!("kfactor must be finite and non-negative, got {}", kfactor);
        }
        if scaling == ForceScaling::DivideByKfactor && kfactor == 0.0 {
            bail!("kfactor must be positive when forces are divided by it");
        }
        if cutoff.is_nan() || cutoff <= 0.0 {
            bail!("fingerprint cutoff must be positive, got {}", cutoff);
        }
        Ok(Self {
            base,
            provider,
            kfactor,
            cutoff,
            max_neighbors: None,
            scaling,
            scorer: NoveltyScorer::new(),
            cache: Mutex::new(Cache::default()),
        })
    }

    /// Caps the neighbour count passed to the fingerprint provider.
    /// Defaults to four times the atom count.
    pub fn max_neighbors(mut self, limit: usize) -> Self {
        self.max_neighbors = Some(limit);
        self
    }

    fn neighbor_limit(&self, structure: &Structure) -> usize {
        self.max_neighbors.unwrap_or(4 * structure.len())
    }

    /// Current novelty score of `structure` under this potential's fingerprint settings.
    ///
    /// Served from the cache when energy or forces were just evaluated for the
    /// same state.
    pub fn novelty(&self, structure: &Structure) -> Result<f64> {
        let key = StateKey::of(structure);
        let mut cache = self.cache.lock();
        if cache.key.as_ref() == Some(&key) {
            if let Some(score) = cache.score {
                return Ok(score);
            }
        }

        let set = self
            .provider
            .fingerprint(structure, self.cutoff, self.neighbor_limit(structure), false)
            .with_context(|| format!("fingerprinting failed ({})", self.provider.name()))?;
        let score = self.scorer.score(&set.fingerprints)?;
        if cache.key.as_ref() == Some(&key) {
            cache.score = Some(score);
        }
        Ok(score)
    }

    /// Evaluates the requested properties, reusing cached values for an
    /// unchanged structure.
    pub fn evaluate(&self, structure: &Structure, properties: &[Property]) -> Result<PropertyResults> {
        let key = StateKey::of(structure);
        let mut cache = self.cache.lock();

        if cache.key.as_ref() != Some(&key) {
            cache.key = Some(key);
            cache.results = PropertyResults::default();
            cache.score = None;
        }

        let missing: Vec<Property> = properties
            .iter()
            .copied()
            .filter(|p| !cache.results.has(*p))
            .collect();

        if !missing.is_empty() {
            trace!("novelty potential: computing {:?}", missing);
            match self.compute(structure, &missing) {
                Ok((fresh, score)) => {
                    cache.results.merge(fresh);
                    if score.is_some() {
                        cache.score = score;
                    }
                }
                Err(e) => {
                    cache.key = None;
                    return Err(e);
                }
            }
        }

        let mut out = PropertyResults::default();
        for p in properties {
            match p {
                Property::Energy => out.energy = cache.results.energy,
                Property::Forces => out.forces = cache.results.forces.clone(),
                Property::Stress => out.stress = cache.results.stress,
            }
        }
        Ok(out)
    }

    /// Fresh values for `properties`, plus the novelty score whenever the
    /// structure had to be fingerprinted.
    fn compute(
        &self,
        structure: &Structure,
        properties: &[Property],
    ) -> Result<(PropertyResults, Option<f64>)> {
        let want_energy = properties.contains(&Property::Energy);
        let want_forces = properties.contains(&Property::Forces);

        let base = self
            .base
            .calculate(structure, properties)
            .with_context(|| format!("base potential '{}' failed", self.base.name()))?;

        let mut out = PropertyResults {
            stress: base.stress,
            ..Default::default()
        };
        let mut score = None;

        if want_energy || want_forces {
            let set = self
                .provider
                .fingerprint(structure, self.cutoff, self.neighbor_limit(structure), want_forces)
                .with_context(|| format!("fingerprinting failed ({})", self.provider.name()))?;

            let s = self.scorer.score(&set.fingerprints)?;
            score = Some(s);
            if want_energy {
                out.energy = Some(base.require_energy()? - self.kfactor * s);
            }

            if want_forces {
                let dfp = set
                    .gradient
                    .as_ref()
                    .ok_or_else(|| anyhow!("fingerprint provider returned no derivatives"))?;
                let grad = NoveltyGradient.gradient(&set.fingerprints, dfp)?;
                let base_forces = base.require_forces()?;
                if base_forces.len() != grad.len() {
                    bail!(
                        "base potential returned {} forces for {} atoms",
                        base_forces.len(),
                        grad.len()
                    );
                }
                out.forces = Some(self.combine_forces(base_forces, &grad));
            }
        }

        Ok((out, score))
    }

    fn combine_forces(&self, base: &[Vector3<f64>], grad: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let k = self.kfactor;
        base.iter()
            .zip(grad)
            .map(|(f, g)| {
                let biased = f - g * k;
                match self.scaling {
                    ForceScaling::DivideByKfactor => biased / k,
                    ForceScaling::Consistent => biased,
                }
            })
            .collect()
    }
}

impl Potential for NoveltyPotential {
    fn energy(&self, structure: &Structure) -> Result<f64> {
        self.evaluate(structure, &[Property::Energy])?.require_energy()
    }

    fn forces(&self, structure: &Structure) -> Result<Vec<Vector3<f64>>> {
        Ok(self
            .evaluate(structure, &[Property::Forces])?
            .require_forces()?
            .to_vec())
    }

    fn stress(&self, structure: &Structure) -> Result<Matrix3<f64>> {
        self.evaluate(structure, &[Property::Stress])?.require_stress()
    }

    fn calculate(&self, structure: &Structure, properties: &[Property]) -> Result<PropertyResults> {
        self.evaluate(structure, properties)
    }

    fn name(&self) -> &str {
        "novelty-biased"
    }
}
