//! Dense linear algebra for small fixed-size systems.

/// Pivots smaller than this are treated as zero.
pub const SINGULAR_EPSILON: f64 = 1e-12;

/// Invert an N×N matrix by Gauss-Jordan elimination with partial pivoting.
///
/// Returns `None` when a pivot falls below `SINGULAR_EPSILON` or the result
/// is not finite. Singularity is detected before any division.
#[allow(clippy::needless_range_loop)]
pub fn invert<const N: usize>(a: &[[f64; N]; N]) -> Option<[[f64; N]; N]> {
    let mut m = *a;
    let mut inv = [[0.0; N]; N];
    for i in 0..N {
        inv[i][i] = 1.0;
    }

    for col in 0..N {
        // Find pivot
        let mut pivot = col;
        for row in (col + 1)..N {
            if m[row][col].abs() > m[pivot][col].abs() {
                pivot = row;
            }
        }
        if m[pivot][col].abs() < SINGULAR_EPSILON {
            return None;
        }
        m.swap(col, pivot);
        inv.swap(col, pivot);

        let d = m[col][col];
        for j in 0..N {
            m[col][j] /= d;
            inv[col][j] /= d;
        }

        for row in 0..N {
            if row == col {
                continue;
            }
            let factor = m[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..N {
                m[row][j] -= factor * m[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }

    if inv.iter().flatten().all(|x| x.is_finite()) {
        Some(inv)
    } else {
        None
    }
}

/// y = A · x
pub fn mat_vec<const N: usize>(a: &[[f64; N]; N], x: &[f64; N]) -> [f64; N] {
    let mut y = [0.0; N];
    for (yi, row) in y.iter_mut().zip(a.iter()) {
        *yi = row.iter().zip(x.iter()).map(|(a, b)| a * b).sum();
    }
    y
}

/// I − s·A
pub fn identity_minus_scaled<const N: usize>(a: &[[f64; N]; N], s: f64) -> [[f64; N]; N] {
    let mut out = [[0.0; N]; N];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            let id = if i == j { 1.0 } else { 0.0 };
            *v = id - s * a[i][j];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverts_two_by_two() {
        let a = [[4.0, 7.0], [2.0, 6.0]];
        let inv = invert(&a).unwrap();
        let expected = [[0.6, -0.7], [-0.2, 0.4]];
        for i in 0..2 {
            for j in 0..2 {
                assert!((inv[i][j] - expected[i][j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn detects_singular_matrix() {
        assert!(invert(&[[1.0, 2.0], [2.0, 4.0]]).is_none());
        assert!(invert(&[[0.0, 0.0], [0.0, 0.0]]).is_none());
    }

    #[test]
    fn pivots_on_zero_leading_entry() {
        let inv = invert(&[[0.0, 1.0], [1.0, 0.0]]).unwrap();
        assert_eq!(inv, [[0.0, 1.0], [1.0, 0.0]]);
    }

    #[test]
    fn identity_minus_scaled_matches_definition() {
        let q = [[0.5, 0.25], [0.1, 0.2]];
        assert_eq!(identity_minus_scaled(&q, 1.0), [[0.5, -0.25], [-0.1, 0.8]]);
    }
}
