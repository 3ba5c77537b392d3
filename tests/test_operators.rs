use entmax_forge::core::domain::{Lattice, Structure};
use entmax_forge::engine::operators::Mutator;
use nalgebra::Point3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn create_dummy_structure(n: usize, lattice: Option<Lattice>) -> Structure {
    let symbols: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "A" } else { "B" }).collect();
    let positions: Vec<Point3<f64>> = (0..n).map(|i| Point3::new(i as f64, 0.5, 0.0)).collect();
    Structure::from_symbols("Test", &symbols, &positions, lattice)
}

#[test]
fn test_mutation_rattle() {
    let mut s = create_dummy_structure(200, None);
    s.energy = Some(-1.0);
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let mutated = Mutator::new().rattle(0.01).apply(&s, &mut rng);
    assert!(mutated.energy.is_none());

    // Per-coordinate deviations should look like N(0, 0.01²).
    let deltas: Vec<f64> = s
        .atoms
        .iter()
        .zip(&mutated.atoms)
        .flat_map(|(a, b)| {
            let d = b.position - a.position;
            vec![d.x, d.y, d.z]
        })
        .collect();
    let n = deltas.len() as f64;
    let mean = deltas.iter().sum::<f64>() / n;
    let std = (deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n).sqrt();
    assert!(mean.abs() < 0.002, "mean {}", mean);
    assert!((std - 0.01).abs() < 0.002, "std {}", std);
}

#[test]
fn test_rattle_is_reproducible() {
    let s = create_dummy_structure(4, None);
    let a = Mutator::new().rattle(0.1).apply(&s, &mut ChaCha8Rng::seed_from_u64(7));
    let b = Mutator::new().rattle(0.1).apply(&s, &mut ChaCha8Rng::seed_from_u64(7));
    assert_eq!(a.positions(), b.positions());
}

#[test]
fn test_strain_scales_cell_and_positions() {
    let s = create_dummy_structure(3, Lattice::cubic(5.0));
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let strained = Mutator::new().strain(0.05).apply(&s, &mut rng);

    let lat = strained.lattice.as_ref().unwrap();
    let scale = (lat.volume() / 125.0).cbrt();
    assert!((scale - 1.0).abs() <= 0.05);
    assert!((scale - 1.0).abs() > 1e-12);

    // Fractional coordinates are untouched by a homogeneous strain.
    let old = s.lattice.as_ref().unwrap();
    for (a, b) in s.atoms.iter().zip(&strained.atoms) {
        let fa = old.to_fractional(&a.position);
        let fb = lat.to_fractional(&b.position);
        assert!((fa - fb).norm() < 1e-12);
    }
}
