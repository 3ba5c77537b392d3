use nalgebra::DMatrix;

/// Minimum-cost perfect matching on a square cost matrix (Hungarian
/// algorithm with potentials, O(n³)).
///
/// Returns `(total_cost, assignment)` where `assignment[row] = column`.
/// All costs must be finite.
pub fn min_cost_assignment(cost: &DMatrix<f64>) -> (f64, Vec<usize>) {
    let n = cost.nrows();
    debug_assert_eq!(n, cost.ncols(), "assignment needs a square matrix");
    if n == 0 {
        return (0.0, Vec::new());
    }

    // 1-based bookkeeping; index 0 is the virtual source column/row.
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; n + 1];
    let mut owner = vec![0usize; n + 1]; // owner[col] = row matched to col
    let mut way = vec![0usize; n + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut col0 = 0;
        let mut min_v = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[col0] = true;
            let r0 = owner[col0];
            let mut delta = f64::INFINITY;
            let mut col1 = 0;

            for col in 1..=n {
                if used[col] {
                    continue;
                }
                let reduced = cost[(r0 - 1, col - 1)] - u[r0] - v[col];
                if reduced < min_v[col] {
                    min_v[col] = reduced;
                    way[col] = col0;
                }
                if min_v[col] < delta {
                    delta = min_v[col];
                    col1 = col;
                }
            }

            for col in 0..=n {
                if used[col] {
                    u[owner[col]] += delta;
                    v[col] -= delta;
                } else {
                    min_v[col] -= delta;
                }
            }

            col0 = col1;
            if owner[col0] == 0 {
                break;
            }
        }

        // Augment along the alternating path.
        loop {
            let prev = way[col0];
            owner[col0] = owner[prev];
            col0 = prev;
            if col0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for col in 1..=n {
        assignment[owner[col] - 1] = col - 1;
    }
    let total = assignment
        .iter()
        .enumerate()
        .map(|(row, &col)| cost[(row, col)])
        .sum();
    (total, assignment)
}
