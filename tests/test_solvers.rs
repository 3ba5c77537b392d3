use std::sync::Arc;

use crossbeam_channel::unbounded;
use entmax_forge::core::domain::Structure;
use entmax_forge::engine::adapter::NoveltyPotential;
use entmax_forge::engine::fingerprint::RadialFingerprint;
use entmax_forge::engine::lennard_jones::LennardJones;
use entmax_forge::solvers::fire::Fire;
use entmax_forge::solvers::RelaxEvent;
use nalgebra::Point3;

use crate::common::{irregular_cluster, soft_lj, CountingPotential, CountingProvider};

mod common;

fn dimer(r: f64) -> Structure {
    Structure::from_symbols(
        "dimer",
        &["A", "A"],
        &[Point3::new(0.0, 0.0, 0.0), Point3::new(r, 0.0, 0.0)],
        None,
    )
}

#[test]
fn test_fire_relaxes_lj_dimer() {
    let lj = Arc::new(LennardJones::new(1.0, 1.0, 3.0));
    let fire = Fire::new(lj, 1e-4, 2000);

    let (tx, rx) = unbounded();
    let traj = fire.relax(dimer(1.35), "dimer", &tx).unwrap();
    drop(tx);

    assert!(traj.converged, "FIRE did not converge");
    let last = traj.frames.last().unwrap();
    let r = (last.atoms[1].position - last.atoms[0].position).norm();
    assert!((r - 2f64.powf(1.0 / 6.0)).abs() < 1e-3, "r = {}", r);
    assert!((traj.frames[0].atoms[1].position.x - 1.35).abs() < 1e-12);
    assert!(traj.frames.iter().all(|f| f.energy.is_some()));

    let mut steps = 0;
    let mut finished = false;
    for msg in rx {
        match msg {
            RelaxEvent::Step { stats, .. } => {
                assert!(stats.novelty.is_none());
                steps += 1;
            }
            RelaxEvent::Finished { converged, .. } => {
                assert!(converged);
                finished = true;
            }
            RelaxEvent::Log(_) => {}
        }
    }
    assert!(finished, "FIRE did not report completion");
    assert_eq!(steps, traj.frames.len());
}

#[test]
fn test_fire_respects_step_budget() {
    let biased = Arc::new(
        NoveltyPotential::new(
            Arc::new(soft_lj()),
            Arc::new(RadialFingerprint::default()),
            300.0,
            5.0,
        )
        .unwrap(),
    );
    let fire = Fire::with_novelty(biased, 1e-12, 4);

    let (tx, rx) = unbounded();
    let traj = fire.relax(irregular_cluster(), "biased", &tx).unwrap();
    drop(tx);

    assert!(!traj.converged);
    assert_eq!(traj.frames.len(), 5);

    let novelty: Vec<f64> = rx
        .iter()
        .filter_map(|m| match m {
            RelaxEvent::Step { stats, .. } => stats.novelty,
            _ => None,
        })
        .collect();
    assert_eq!(novelty.len(), 5);
    assert!(novelty.iter().all(|s| s.is_finite()));
}

#[test]
fn test_fire_evaluates_once_per_step() {
    let counting = Arc::new(CountingPotential::new(soft_lj()));
    let fire = Fire::new(counting.clone(), 1e-12, 3);
    let (tx, _rx) = unbounded();
    let traj = fire.relax(irregular_cluster(), "count", &tx).unwrap();
    assert_eq!(counting.calls(), traj.frames.len());
}

#[test]
fn test_novelty_report_does_not_refingerprint() {
    let provider = Arc::new(CountingProvider::new());
    let biased = Arc::new(
        NoveltyPotential::new(Arc::new(soft_lj()), provider.clone(), 300.0, 5.0).unwrap(),
    );
    let fire = Fire::with_novelty(biased, 1e-12, 3);
    let (tx, rx) = unbounded();
    let traj = fire.relax(irregular_cluster(), "count", &tx).unwrap();
    drop(tx);

    assert_eq!(provider.calls(), traj.frames.len());
    let reported = rx
        .iter()
        .filter(|m| matches!(m, RelaxEvent::Step { stats, .. } if stats.novelty.is_some()))
        .count();
    assert_eq!(reported, traj.frames.len());
}
