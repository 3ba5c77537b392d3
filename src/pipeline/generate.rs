use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Result};
use crossbeam_channel::{unbounded, Receiver};
use log::{debug, info, warn};

use crate::core::domain::{Params, Structure};
use crate::core::spatial;
use crate::engine::adapter::NoveltyPotential;
use crate::engine::fingerprint::RadialFingerprint;
use crate::engine::operators::Mutator;
use crate::engine::potential::Potential;
use crate::pipeline::io::{read_json, write_json};
use crate::pipeline::{folder_name, folder_rng, FolderReport, SEED_FILE, SEED_SUPER_FILE, TRAJECTORY_FILE};
use crate::solvers::fire::Fire;
use crate::solvers::RelaxEvent;

/// Rattles the folder's seed and relaxes it under the novelty-biased
/// potential, writing every visited frame to `trajectory.json`.
pub fn generate_folder(
    folder: &Path,
    index: usize,
    params: &Params,
    base: Arc<dyn Potential>,
) -> Result<FolderReport> {
    let seed_path = [SEED_SUPER_FILE, SEED_FILE]
        .iter()
        .map(|f| folder.join(f))
        .find(|p| p.exists());
    let seed_path = match seed_path {
        Some(p) => p,
        None => return Ok(FolderReport::skipped(folder, "no seed structure")),
    };

    let seed: Structure = read_json(&seed_path)?;
    if seed.len() < 2 {
        bail!("seed has {} atoms, need at least 2", seed.len());
    }

    let mut rng = folder_rng(params.seed, index);
    let mut mutator = Mutator::new().rattle(params.rattle_stdev);
    if let Some(strain) = params.strain {
        mutator = mutator.strain(strain);
    }
    let start = mutator.apply(&seed, &mut rng);
    if let Some(d) = spatial::min_pair_distance(&start).filter(|d| *d < 0.5) {
        warn!("[{}] closest contact after perturbation is {:.3} A", folder_name(folder), d);
    }

    let provider = Arc::new(RadialFingerprint::new(params.n_basis, params.basis_width));
    let biased = Arc::new(NoveltyPotential::with_scaling(
        base,
        provider,
        params.kfactor,
        params.relax_cutoff,
        params.force_scaling,
    )?);
    let fire = Fire::with_novelty(biased, params.fmax, params.max_steps);

    let label = folder_name(folder);
    let (tx, rx) = unbounded();
    let trajectory = thread::scope(|s| {
        s.spawn(move || log_events(rx));
        let result = fire.relax(start, &label, &tx);
        drop(tx);
        result
    })?;

    info!(
        "[{}] {} frames, converged: {}",
        label,
        trajectory.frames.len(),
        trajectory.converged
    );
    write_json(&folder.join(TRAJECTORY_FILE), &trajectory)?;
    Ok(FolderReport::completed(folder, trajectory.frames.len(), 0))
}

fn log_events(rx: Receiver<RelaxEvent>) {
    for event in rx.iter() {
        match event {
            RelaxEvent::Step { label, stats } => debug!(
                "[{}] step {:>5}  E = {:.6}  S = {}  fmax = {:.4}",
                label,
                stats.step,
                stats.energy,
                stats
                    .novelty
                    .map_or_else(|| "-".to_string(), |s| format!("{:.6}", s)),
                stats.max_force
            ),
            RelaxEvent::Finished {
                label,
                steps,
                converged,
            } => debug!("[{}] FIRE finished after {} steps (converged: {})", label, steps, converged),
            RelaxEvent::Log(msg) => info!("{}", msg),
        }
    }
}
