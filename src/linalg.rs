//! Dense linear algebra for small covariance matrices.
//!
//! Asset universes here have tens of rows at most, so everything is a plain
//! `Vec<Vec<f64>>` with O(n^3) routines. The pseudo-inverse goes through a
//! cyclic Jacobi eigendecomposition, which is exact for symmetric input and
//! degrades gracefully on singular matrices.

use crate::error::{Result, ValidationError};

const JACOBI_MAX_SWEEPS: usize = 100;

/// A square, finite covariance matrix.
///
/// Row/column `i` is aligned with the `i`-th asset of whatever ordered
/// collection the matrix was built for (asset classes in a bucket, or the
/// non-cash tickers of a position book, in book order).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>"))]
pub struct CovarianceMatrix {
    rows: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
    /// Build from rows, rejecting ragged or non-finite input.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = rows.len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(ValidationError::NonSquareMatrix {
                    row: i,
                    len: row.len(),
                    expected: n,
                });
            }
            if row.iter().any(|x| !x.is_finite()) {
                return Err(ValidationError::NonFiniteInput("covariance"));
            }
        }
        Ok(Self { rows })
    }

    /// The 0x0 matrix.
    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    /// Wrap rows already known to be square and finite.
    pub(crate) fn from_rows_unchecked(rows: Vec<Vec<f64>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == rows.len()));
        Self { rows }
    }

    /// Diagonal matrix with the given variances.
    pub fn diagonal(variances: &[f64]) -> Result<Self> {
        let n = variances.len();
        let mut rows = vec![vec![0.0; n]; n];
        for (i, v) in variances.iter().enumerate() {
            rows[i][i] = *v;
        }
        Self::new(rows)
    }

    /// Number of rows (== number of columns).
    #[inline]
    pub fn dim(&self) -> usize {
        self.rows.len()
    }

    /// Returns true for the 0x0 matrix.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Element at (i, j).
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows[i][j]
    }

    /// Borrow the rows.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// The main diagonal (per-asset variances).
    pub fn variances(&self) -> Vec<f64> {
        (0..self.dim()).map(|i| self.rows[i][i]).collect()
    }

    /// Principal submatrix selecting `indices` for both rows and columns.
    pub fn submatrix(&self, indices: &[usize]) -> Self {
        let rows = indices
            .iter()
            .map(|&i| indices.iter().map(|&j| self.rows[i][j]).collect())
            .collect();
        Self { rows }
    }

    /// `Sigma * x`.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        mat_vec_mul(&self.rows, x)
    }

    /// `x' * Sigma * x`.
    pub fn quad_form(&self, x: &[f64]) -> f64 {
        dot(x, &self.mul_vec(x))
    }

    /// `Sigma + eps * I`.
    pub fn regularized(&self, eps: f64) -> Self {
        let mut rows = self.rows.clone();
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] += eps;
        }
        Self { rows }
    }

    /// Moore-Penrose pseudo-inverse.
    ///
    /// The matrix is symmetrized first; eigenvalues with magnitude below
    /// `n * eps * max|lambda|` are treated as zero.
    pub fn pseudo_inverse(&self) -> Vec<Vec<f64>> {
        let n = self.dim();
        if n == 0 {
            return Vec::new();
        }

        let mut sym = self.rows.clone();
        for i in 0..n {
            for j in (i + 1)..n {
                let avg = 0.5 * (sym[i][j] + sym[j][i]);
                sym[i][j] = avg;
                sym[j][i] = avg;
            }
        }

        let (eigenvalues, vectors) = symmetric_eigen(sym);
        let max_abs = eigenvalues.iter().fold(0.0_f64, |m, l| m.max(l.abs()));
        let cutoff = max_abs * n as f64 * f64::EPSILON;

        let mut inv = vec![vec![0.0; n]; n];
        for (k, lambda) in eigenvalues.iter().enumerate() {
            if lambda.abs() <= cutoff {
                continue;
            }
            let scale = 1.0 / lambda;
            for i in 0..n {
                let vik = vectors[i][k] * scale;
                if vik == 0.0 {
                    continue;
                }
                for j in 0..n {
                    inv[i][j] += vik * vectors[j][k];
                }
            }
        }
        inv
    }
}

impl TryFrom<Vec<Vec<f64>>> for CovarianceMatrix {
    type Error = ValidationError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        Self::new(rows)
    }
}

impl From<CovarianceMatrix> for Vec<Vec<f64>> {
    fn from(m: CovarianceMatrix) -> Self {
        m.rows
    }
}

/// Cyclic Jacobi eigendecomposition of a symmetric matrix.
///
/// Returns `(eigenvalues, V)` where column `k` of `V` is the eigenvector for
/// `eigenvalues[k]`.
fn symmetric_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v = identity(n);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .map(|(i, j)| a[i][j] * a[i][j])
            .sum();
        let diag: f64 = (0..n).map(|i| a[i][i] * a[i][i]).sum();
        if off <= f64::EPSILON * f64::EPSILON * diag.max(f64::MIN_POSITIVE) {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p][q];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in a.iter_mut() {
                    let akp = row[p];
                    let akq = row[q];
                    row[p] = c * akp - s * akq;
                    row[q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[p][k];
                    let aqk = a[q][k];
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let vkp = row[p];
                    let vkq = row[q];
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    let mut m = vec![vec![0.0; n]; n];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

pub(crate) fn mat_vec_mul(matrix: &[Vec<f64>], vec: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(vec).map(|(a, b)| a * b).sum::<f64>())
        .collect()
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
