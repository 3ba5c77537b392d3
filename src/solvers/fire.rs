use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::core::domain::Structure;
use crate::engine::adapter::NoveltyPotential;
use crate::engine::potential::{max_force, Potential, Property};
use crate::solvers::{RelaxEvent, StepStats};

/// FIRE parameters (defaults match the common ASE settings).
#[derive(Debug, Clone, PartialEq)]
pub struct FireParams {
    pub dt: f64,
    pub max_step: f64,
    pub dt_max: f64,
    pub n_min: usize,
    pub f_inc: f64,
    pub f_dec: f64,
    pub a_start: f64,
    pub f_a: f64,
}

impl Default for FireParams {
    fn default() -> Self {
        Self {
            dt: 0.1,
            max_step: 0.2,
            dt_max: 1.0,
            n_min: 5,
            f_inc: 1.1,
            f_dec: 0.5,
            a_start: 0.1,
            f_a: 0.99,
        }
    }
}

/// The ordered structures visited by a relaxation, starting point first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub frames: Vec<Structure>,
    pub converged: bool,
}

/// Fast Inertial Relaxation Engine over atomic positions.
pub struct Fire {
    potential: Arc<dyn Potential>,
    novelty: Option<Arc<NoveltyPotential>>,
    params: FireParams,
    fmax: f64,
    max_steps: usize,
}

impl Fire {
    pub fn new(potential: Arc<dyn Potential>, fmax: f64, max_steps: usize) -> Self {
        Self {
            potential,
            novelty: None,
            params: FireParams::default(),
            fmax,
            max_steps,
        }
    }

    /// Relaxes under a novelty-biased potential and reports its score each step.
    pub fn with_novelty(potential: Arc<NoveltyPotential>, fmax: f64, max_steps: usize) -> Self {
        Self {
            potential: potential.clone(),
            novelty: Some(potential),
            params: FireParams::default(),
            fmax,
            max_steps,
        }
    }

    pub fn params(mut self, params: FireParams) -> Self {
        self.params = params;
        self
    }

    /// Runs FIRE from `start`. Every visited structure is recorded with its
    /// energy. A potential failure aborts the trajectory.
    pub fn relax(&self, start: Structure, label: &str, tx: &Sender<RelaxEvent>) -> Result<Trajectory> {
        let p = &self.params;
        let mut current = start;
        let n = current.len();

        let mut velocity: Option<Vec<Vector3<f64>>> = None;
        let mut dt = p.dt;
        let mut a = p.a_start;
        let mut n_pos = 0usize;

        let mut trajectory = Trajectory::default();
        let mut step = 0;

        let _ = tx.send(RelaxEvent::Log(format!(
            "[{}] FIRE on {} atoms with {} (fmax {}, max {} steps)",
            label,
            n,
            self.potential.name(),
            self.fmax,
            self.max_steps
        )));

        loop {
            let results = self
                .potential
                .calculate(&current, &[Property::Energy, Property::Forces])
                .with_context(|| format!("[{}] evaluation failed at step {}", label, step))?;
            let energy = results.require_energy()?;
            let forces = results.require_forces()?.to_vec();
            let fmax_now = max_force(&forces);

            let novelty = match &self.novelty {
                Some(pot) => Some(
                    pot.novelty(&current)
                        .with_context(|| format!("[{}] novelty failed at step {}", label, step))?,
                ),
                None => None,
            };

            current.energy = Some(energy);
            trajectory.frames.push(current.clone());

            let _ = tx.send(RelaxEvent::Step {
                label: label.to_string(),
                stats: StepStats {
                    step,
                    energy,
                    novelty,
                    max_force: fmax_now,
                },
            });

            if fmax_now < self.fmax {
                trajectory.converged = true;
                break;
            }
            if step >= self.max_steps {
                break;
            }

            // --- FIRE update ---
            if let Some(v) = velocity.as_mut() {
                let vf: f64 = v.iter().zip(&forces).map(|(v, f)| v.dot(f)).sum();
                if vf > 0.0 {
                    let v_norm = norm(v);
                    let f_norm = norm(&forces);
                    if f_norm > 0.0 {
                        for (vi, fi) in v.iter_mut().zip(&forces) {
                            *vi = *vi * (1.0 - a) + fi * (a * v_norm / f_norm);
                        }
                    }
                    if n_pos > p.n_min {
                        dt = (dt * p.f_inc).min(p.dt_max);
                        a *= p.f_a;
                    }
                    n_pos += 1;
                } else {
                    for vi in v.iter_mut() {
                        *vi = Vector3::zeros();
                    }
                    a = p.a_start;
                    dt *= p.f_dec;
                    n_pos = 0;
                }
            }
            let v = velocity.get_or_insert_with(|| vec![Vector3::zeros(); n]);

            for (vi, fi) in v.iter_mut().zip(&forces) {
                *vi += fi * dt;
            }
            let mut dr: Vec<Vector3<f64>> = v.iter().map(|vi| vi * dt).collect();
            let dr_norm = norm(&dr);
            if dr_norm > p.max_step {
                let scale = p.max_step / dr_norm;
                for d in &mut dr {
                    *d *= scale;
                }
            }

            current.displace(&dr);
            current.origin = format!("{}_step{}", label, step + 1);
            step += 1;
        }

        let _ = tx.send(RelaxEvent::Finished {
            label: label.to_string(),
            steps: step,
            converged: trajectory.converged,
        });
        Ok(trajectory)
    }
}

fn norm(v: &[Vector3<f64>]) -> f64 {
    v.iter().map(|x| x.norm_squared()).sum::<f64>().sqrt()
}
