use nalgebra::{Point3, Vector3};

use crate::core::domain::{Lattice, Structure};

/// Minimum-image separation vector from `p1` to `p2`.
/// Without a lattice this is the plain difference.
#[inline]
pub fn displacement(p1: &Point3<f64>, p2: &Point3<f64>, lattice: Option<&Lattice>) -> Vector3<f64> {
    match lattice {
        Some(lat) => {
            let d_cart = p2 - p1;
            let mut d_frac = lat.inverse * d_cart;

            // Apply MIC: Wrap fractional coordinates to [-0.5, 0.5]
            d_frac.x -= d_frac.x.round();
            d_frac.y -= d_frac.y.round();
            d_frac.z -= d_frac.z.round();

            lat.vectors * d_frac
        }
        None => p2 - p1,
    }
}

/// Squared minimum-image distance.
#[inline]
pub fn distance_sq(p1: &Point3<f64>, p2: &Point3<f64>, lattice: Option<&Lattice>) -> f64 {
    displacement(p1, p2, lattice).norm_squared()
}

/// Lattice translations `n_a a + n_b b + n_c c` whose images can lie within
/// `cutoff` of an atom inside the cell. Without a lattice only the zero
/// translation is returned.
pub fn image_translations(lattice: Option<&Lattice>, cutoff: f64) -> Vec<Vector3<f64>> {
    let lat = match lattice {
        Some(lat) => lat,
        None => return vec![Vector3::zeros()],
    };

    let spacing = lat.face_spacings();
    // +1 covers atoms sitting anywhere inside the cell, not just at the origin
    let reach = |d: f64| (cutoff / d).ceil() as i32 + 1;
    let (na, nb, nc) = (reach(spacing.x), reach(spacing.y), reach(spacing.z));

    let mut out = Vec::with_capacity(((2 * na + 1) * (2 * nb + 1) * (2 * nc + 1)) as usize);
    for a in -na..=na {
        for b in -nb..=nb {
            for c in -nc..=nc {
                out.push(lat.vectors * Vector3::new(a as f64, b as f64, c as f64));
            }
        }
    }
    out
}

/// Smallest interatomic distance in the structure (minimum image), or `None`
/// for fewer than two atoms.
pub fn min_pair_distance(structure: &Structure) -> Option<f64> {
    let lattice = structure.lattice.as_ref();
    let atoms = &structure.atoms;
    let mut best: Option<f64> = None;
    for i in 0..atoms.len() {
        for j in (i + 1)..atoms.len() {
            let d = distance_sq(&atoms[i].position, &atoms[j].position, lattice).sqrt();
            best = Some(best.map_or(d, |b| b.min(d)));
        }
    }
    best
}

/// Moves a point into the primary unit cell (Periodic only) or centers it (0D).
///
/// For 3D (Periodic): Wraps atoms into [0, 1) fractional box.
/// For 0D (Cluster): Centers the geometric center to (0,0,0).
///
/// **Invariant**: Modifies positions in-place. Does NOT reorder atoms.
pub fn wrap_or_center(structure: &mut Structure) {
    if let Some(lat) = &structure.lattice {
        for atom in &mut structure.atoms {
            let mut frac = lat.to_fractional(&atom.position);
            frac.coords.x = frac.coords.x.rem_euclid(1.0);
            frac.coords.y = frac.coords.y.rem_euclid(1.0);
            frac.coords.z = frac.coords.z.rem_euclid(1.0);
            atom.position = lat.to_cartesian(&frac);
        }
    } else {
        let n = structure.atoms.len() as f64;

        if n == 0.0 {
            return;
        }

        let mut center = Vector3::zeros();
        for atom in &structure.atoms {
            center += atom.position.coords;
        }
        center /= n;

        for atom in &mut structure.atoms {
            atom.position -= center;
        }
    }
}
