//! Dense linear solves for the small normal-equation systems built by the
//! profile and coordinate fitters.

/// Relative pivot threshold below which the matrix is treated as singular.
const SINGULAR_PIVOT: f64 = 1e-12;

/// Solve the NxN system `a * x = b` by Gaussian elimination with partial pivoting.
///
/// Returns `None` if the matrix is singular, i.e. a pivot is tiny compared to
/// the largest entry of `a`, or if any input is non-finite.
#[allow(clippy::needless_range_loop)]
pub fn solve<const N: usize>(a: &[[f64; N]; N], b: &[f64; N]) -> Option<[f64; N]> {
    let mut matrix = *a;
    let mut rhs = *b;

    if matrix.iter().flatten().chain(rhs.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    let scale = matrix
        .iter()
        .flatten()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return None;
    }
    let threshold = scale * SINGULAR_PIVOT;

    for col in 0..N {
        let mut max_row = col;
        let mut max_val = matrix[col][col].abs();
        for row in (col + 1)..N {
            if matrix[row][col].abs() > max_val {
                max_val = matrix[row][col].abs();
                max_row = row;
            }
        }

        if max_val < threshold {
            return None;
        }

        if max_row != col {
            matrix.swap(col, max_row);
            rhs.swap(col, max_row);
        }

        for row in (col + 1)..N {
            let factor = matrix[row][col] / matrix[col][col];
            let pivot_row = matrix[col];
            for (j, m) in matrix[row].iter_mut().enumerate().skip(col) {
                *m -= factor * pivot_row[j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    // Back substitution
    let mut x = [0.0f64; N];
    for i in (0..N).rev() {
        let mut sum = rhs[i];
        for (j, &xj) in x.iter().enumerate().skip(i + 1) {
            sum -= matrix[i][j] * xj;
        }
        x[i] = sum / matrix[i][i];
    }

    Some(x)
}
