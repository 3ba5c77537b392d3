use entmax_forge::core::domain::{Lattice, Structure};
use entmax_forge::engine::external::gulp::{parse_output, GulpPotential};
use nalgebra::Point3;

const OUTPUT: &str = r#"
  Components of energy :
--------------------------------------------------------------------------------
  Interatomic potentials     =         -38.12345678 eV
--------------------------------------------------------------------------------
  Total lattice energy       =         -40.12345678 eV
--------------------------------------------------------------------------------
  Total lattice energy       =           -3871.2233 kJ/(mole unit cells)
--------------------------------------------------------------------------------

  Final Cartesian derivatives :

--------------------------------------------------------------------------------
   No.  Atomic          x             y             z           Radius
        Label       (eV/Angs)     (eV/Angs)    (eV/Angs)      (eV/Angs)
--------------------------------------------------------------------------------
      1 Mg    c       0.100000     -0.200000      0.300000      0.000000
      2 O     c      -0.100000      0.200000     -0.300000      0.000000
      3 O     s       0.500000      0.500000      0.500000      0.000000
--------------------------------------------------------------------------------

  Final stress tensor components (GPa):

       xx      1.602177    yy     -3.204353    zz      0.000000
       yz      0.000000    xz      0.000000    xy      0.801088
"#;

fn mgo(periodic: bool) -> Structure {
    Structure::from_symbols(
        "MgO",
        &["Mg", "O"],
        &[Point3::new(0.0, 0.0, 0.0), Point3::new(2.1, 0.0, 0.0)],
        if periodic { Lattice::cubic(4.2) } else { None },
    )
}

#[test]
fn test_parse_energy_forces_stress() {
    let res = parse_output(OUTPUT, &mgo(true)).unwrap();

    assert!((res.energy.unwrap() + 40.12345678).abs() < 1e-9);

    let forces = res.forces.unwrap();
    assert_eq!(forces.len(), 2);
    assert!((forces[0].x + 0.1).abs() < 1e-12);
    assert!((forces[0].y - 0.2).abs() < 1e-12);
    assert!((forces[1].z - 0.3).abs() < 1e-12);

    let stress = res.stress.unwrap();
    assert!((stress[(0, 0)] - 0.01).abs() < 1e-8);
    assert!((stress[(1, 1)] + 0.02).abs() < 1e-8);
    assert!((stress[(0, 1)] - 0.005).abs() < 1e-8);
    assert_eq!(stress[(0, 1)], stress[(1, 0)]);
}

#[test]
fn test_cluster_has_zero_stress() {
    let res = parse_output(OUTPUT, &mgo(false)).unwrap();
    assert_eq!(res.stress.unwrap().norm(), 0.0);
}

#[test]
fn test_parse_failures() {
    assert!(parse_output("  Dump of error info\n", &mgo(false)).is_err());
    assert!(parse_output("Interatomic distance too small\n", &mgo(false)).is_err());

    let no_derivs = "  Total lattice energy = -1.0 eV\n";
    assert!(parse_output(no_derivs, &mgo(false)).is_err());

    // Atom count must match the structure.
    let three = Structure::from_symbols(
        "MgO2",
        &["Mg", "O", "O"],
        &[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.1, 0.0, 0.0),
            Point3::new(0.0, 2.1, 0.0),
        ],
        None,
    );
    assert!(parse_output(OUTPUT, &three).is_err());
}

#[test]
fn test_generate_input() {
    let gulp = GulpPotential::new("gulp", "buckingham\nMg core O core 1280.1 0.29969 0.0 0.0 10.0");

    let periodic = gulp.generate_input(&mgo(true)).unwrap();
    assert!(periodic.starts_with("gradients stress\n"));
    assert!(periodic.contains("vectors\n4.200000000 0.000000000 0.000000000\n"));
    assert!(periodic.contains("Mg  core 0.000000000"));
    assert!(periodic.contains("O   core 2.100000000"));
    assert!(periodic.trim_end().ends_with("10.0"));

    let cluster = gulp.generate_input(&mgo(false)).unwrap();
    assert!(cluster.starts_with("gradients\n"));
    assert!(!cluster.contains("vectors"));
}
