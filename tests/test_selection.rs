use entmax_forge::analysis::assignment::min_cost_assignment;
use entmax_forge::analysis::distance::{
    AssignmentMetric, DistanceMatrix, DistanceMatrixBuilder, FingerprintMetric,
};
use entmax_forge::analysis::medoids::KMedoids;
use entmax_forge::analysis::pca;
use entmax_forge::analysis::select::RepresentativeSelector;
use entmax_forge::core::domain::{MedoidInit, Params, TypeLabels};
use entmax_forge::core::error::DiversityError;
use entmax_forge::engine::fingerprint::Fingerprints;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn fp(rows: &[[f64; 2]]) -> Fingerprints {
    let rows: Vec<Vec<f64>> = rows.iter().map(|r| r.to_vec()).collect();
    Fingerprints::from_rows(&rows).unwrap()
}

/// Five two-atom structures with well-separated fingerprints.
fn separated_batch() -> Vec<Fingerprints> {
    [0.0, 0.5, 10.0, 10.5, 25.0]
        .iter()
        .map(|&x| fp(&[[x, 0.0], [x, 1.0]]))
        .collect()
}

fn two_atom_labels() -> TypeLabels {
    TypeLabels::from_vec(vec![0, 0])
}

fn matrix_of(batch: &[Fingerprints]) -> DistanceMatrix {
    DistanceMatrixBuilder::new(AssignmentMetric)
        .build(batch, &two_atom_labels())
        .unwrap()
}

#[test]
fn test_hungarian_finds_optimum() {
    let cost = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 3.0, 2.0, 0.0, 5.0, 3.0, 2.0, 2.0]);
    let (total, assignment) = min_cost_assignment(&cost);
    assert!((total - 5.0).abs() < 1e-12);
    assert_eq!(assignment, vec![1, 0, 2]);

    assert_eq!(min_cost_assignment(&DMatrix::zeros(0, 0)), (0.0, vec![]));
}

#[test]
fn test_assignment_metric_properties() {
    let labels = TypeLabels::from_vec(vec![0, 0, 1]);
    let a = Fingerprints::from_rows(&[vec![0.0, 1.0], vec![2.0, 0.5], vec![4.0, 4.0]]).unwrap();
    let b = Fingerprints::from_rows(&[vec![0.2, 1.0], vec![2.0, 0.0], vec![4.0, 3.0]]).unwrap();

    let metric = AssignmentMetric;
    assert_eq!(metric.distance(&a, &a, &labels).unwrap(), 0.0);

    let ab = metric.distance(&a, &b, &labels).unwrap();
    let ba = metric.distance(&b, &a, &labels).unwrap();
    assert!(ab > 0.0);
    assert!((ab - ba).abs() < 1e-14);

    // Swapping two same-species atoms does not change the distance.
    let swapped = a.permuted(&[1, 0, 2]);
    assert!(metric.distance(&a, &swapped, &labels).unwrap().abs() < 1e-14);

    // Swapping atoms of different species does.
    let crossed = a.permuted(&[2, 1, 0]);
    assert!(metric.distance(&a, &crossed, &labels).unwrap() > 0.1);
}

#[test]
fn test_distance_matrix_symmetric_zero_diagonal() {
    let batch = separated_batch();
    let d = matrix_of(&batch);
    assert_eq!(d.len(), 5);
    for i in 0..5 {
        assert_eq!(d.get(i, i), 0.0);
        for j in 0..5 {
            assert_eq!(d.get(i, j), d.get(j, i));
            assert!(d.get(i, j) >= 0.0);
        }
    }
    // sqrt(D) * mean RMS difference: shift 0.5 on one of two channels.
    let expected = 2f64.sqrt() * (0.25f64 / 2.0).sqrt();
    assert!((d.get(0, 1) - expected).abs() < 1e-12);
}

#[test]
fn test_builder_validates_batch() {
    let builder = DistanceMatrixBuilder::new(AssignmentMetric);
    let batch = separated_batch();

    let three = TypeLabels::from_vec(vec![0, 0, 0]);
    assert!(matches!(
        builder.build(&batch, &three),
        Err(DiversityError::InconsistentSpecies { index: 0, labels: 3, atoms: 2 })
    ));

    let mut mixed = batch.clone();
    mixed.push(Fingerprints::from_rows(&[vec![0.0; 3], vec![1.0; 3]]).unwrap());
    assert!(matches!(
        builder.build(&mixed, &two_atom_labels()),
        Err(DiversityError::FingerprintDimensionMismatch { expected: 2, found: 3 })
    ));

    let mut broken = batch;
    broken[3] = fp(&[[f64::NAN, 0.0], [0.0, 1.0]]);
    assert_eq!(
        builder.build(&broken, &two_atom_labels()).unwrap_err(),
        DiversityError::InvalidFingerprint { index: 3 }
    );
}

#[test]
fn test_stored_matrix_validation() {
    let ok = DMatrix::from_row_slice(2, 2, &[0.0, 1.5, 1.5, 0.0]);
    assert!(DistanceMatrix::from_matrix(ok).is_ok());

    let asymmetric = DMatrix::from_row_slice(2, 2, &[0.0, 1.5, 1.4, 0.0]);
    let diagonal = DMatrix::from_row_slice(2, 2, &[0.1, 1.5, 1.5, 0.0]);
    let negative = DMatrix::from_row_slice(2, 2, &[0.0, -1.0, -1.0, 0.0]);
    let infinite = DMatrix::from_row_slice(2, 2, &[0.0, f64::INFINITY, f64::INFINITY, 0.0]);
    let rectangular = DMatrix::<f64>::zeros(2, 3);
    // Only the upper entry is broken.
    let upper_nan = DMatrix::from_row_slice(2, 2, &[0.0, f64::NAN, 1.5, 0.0]);
    let upper_inf = DMatrix::from_row_slice(2, 2, &[0.0, f64::INFINITY, 1.5, 0.0]);
    for bad in [asymmetric, diagonal, negative, infinite, rectangular, upper_nan, upper_inf] {
        assert!(matches!(
            DistanceMatrix::from_matrix(bad),
            Err(DiversityError::InvalidDistanceMatrix(_))
        ));
    }

    // A deserialized matrix is only trusted after validation.
    let json = serde_json::to_string(&matrix_of(&separated_batch())).unwrap();
    let loaded: DistanceMatrix = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded.validated().unwrap(), matrix_of(&separated_batch()));
}

#[test]
fn test_five_structures_three_clusters() {
    let batch = separated_batch();
    let d = matrix_of(&batch);
    let selector = RepresentativeSelector::new(3).seed(Some(7));

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let first = selector.select(&batch, &d, &mut rng).unwrap();
    assert_eq!(first.assignment.k(), 3);
    assert_eq!(first.indices.len(), 3);
    for c in 0..3 {
        assert!(!first.assignment.members(c).is_empty());
    }

    let mut sorted = first.indices.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 3);
    assert!(sorted.iter().all(|&i| i < 5));

    // Same clustering seed, different pick RNG: same clusters.
    let mut other_rng = ChaCha8Rng::seed_from_u64(99);
    let second = selector.select(&batch, &d, &mut other_rng).unwrap();
    assert_eq!(first.assignment.labels, second.assignment.labels);
    assert_eq!(first.assignment.medoids, second.assignment.medoids);

    // Both seeded: identical selection.
    let mut rng_again = ChaCha8Rng::seed_from_u64(1);
    let third = selector.select(&batch, &d, &mut rng_again).unwrap();
    assert_eq!(first, third);
}

#[test]
fn test_select_returns_min_of_n_and_m() {
    let batch = separated_batch();
    let d = matrix_of(&batch);
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    for n_select in 1..=8 {
        for init in [MedoidInit::PlusPlus, MedoidInit::Heuristic] {
            let sel = RepresentativeSelector::new(n_select)
                .init(init)
                .select(&batch, &d, &mut rng)
                .unwrap();
            let expected = n_select.min(batch.len());
            let mut idx = sel.indices.clone();
            idx.sort();
            idx.dedup();
            assert_eq!(idx.len(), expected);
            assert!(idx.iter().all(|&i| i < batch.len()));
        }
    }
}

#[test]
fn test_select_rejects_bad_input() {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let empty = DistanceMatrix::from_matrix(DMatrix::zeros(0, 0)).unwrap();
    assert_eq!(
        RepresentativeSelector::new(3)
            .select(&[], &empty, &mut rng)
            .unwrap_err(),
        DiversityError::EmptyBatch
    );

    let batch = separated_batch();
    let d = matrix_of(&batch);
    assert!(matches!(
        RepresentativeSelector::new(0).select(&batch, &d, &mut rng),
        Err(DiversityError::InvalidParameter(_))
    ));

    let small = matrix_of(&batch[..3]);
    assert!(matches!(
        RepresentativeSelector::new(2).select(&batch, &small, &mut rng),
        Err(DiversityError::InvalidDistanceMatrix(_))
    ));
}

#[test]
fn test_medoids_never_leave_empty_clusters() {
    // All points coincide: any split is optimal, none may be empty.
    let d = DistanceMatrix::from_matrix(DMatrix::zeros(4, 4)).unwrap();
    for init in [MedoidInit::PlusPlus, MedoidInit::Heuristic] {
        let fit = KMedoids::new(3).init(init).seed(Some(5)).fit(&d).unwrap();
        assert_eq!(fit.k(), 3);
        for c in 0..3 {
            assert!(fit.members(c).contains(&fit.medoids[c]));
        }
    }

    assert!(KMedoids::new(5).fit(&d).is_err());
    assert!(KMedoids::new(0).fit(&d).is_err());
}

#[test]
fn test_default_clustering_is_deterministic() {
    assert_eq!(KMedoids::new(2).init, MedoidInit::Heuristic);
    assert_eq!(RepresentativeSelector::new(2).init, MedoidInit::Heuristic);
    assert_eq!(Params::default().medoid_init, MedoidInit::Heuristic);

    // Unseeded: clusters agree across runs, only the pick may differ.
    let batch = separated_batch();
    let d = matrix_of(&batch);
    let selector = RepresentativeSelector::new(3);
    let a = selector.select(&batch, &d, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
    let b = selector.select(&batch, &d, &mut ChaCha8Rng::seed_from_u64(2)).unwrap();
    assert_eq!(a.assignment, b.assignment);
}

#[test]
fn test_heuristic_init_is_deterministic() {
    let d = matrix_of(&separated_batch());
    let a = KMedoids::new(2).init(MedoidInit::Heuristic).fit(&d).unwrap();
    let b = KMedoids::new(2).init(MedoidInit::Heuristic).fit(&d).unwrap();
    assert_eq!(a, b);
    // {0, 1} and {2, 3} are tight pairs, 4 is far from both.
    assert_eq!(a.labels[0], a.labels[1]);
    assert_eq!(a.labels[2], a.labels[3]);
}

#[test]
fn test_pca_embedding() {
    let batch = separated_batch();
    let e = pca::embed(&batch).unwrap();
    assert_eq!(e.coords.nrows(), 5);
    assert_eq!(e.coords.ncols(), 3);

    let ratios = &e.explained_variance_ratio;
    assert!(ratios.windows(2).all(|w| w[0] >= w[1]));
    assert!(ratios.iter().sum::<f64>() <= 1.0 + 1e-9);
    // All variation lies along one direction.
    assert!(ratios[0] > 0.999);

    // Fewer structures than features goes through the Gram matrix.
    let pair = pca::embed(&batch[..2]).unwrap();
    assert_eq!(pair.coords.ncols(), 2);
    let spread = (pair.coords[(0, 0)] - pair.coords[(1, 0)]).abs();
    assert!((spread - 0.5 * 2f64.sqrt()).abs() < 1e-9);

    let mut mixed = batch;
    mixed.push(Fingerprints::from_rows(&[vec![0.0; 3]]).unwrap());
    assert!(pca::embed(&mixed).is_none());
}
