//! Householder QR factorization with column pivoting, and the damped
//! triangular solve used by the trust-region parameter search.
//!
//! Both routines follow MINPACK (`qrfac` / `qrsolv`). The factorization
//! keeps Q implicit as stored reflectors and orders columns by decreasing
//! norm, which regularizes rank deficiency: a numerically zero trailing
//! diagonal of R confines the damage to the trailing columns, where the
//! solve falls back to a least-squares solution over the non-singular
//! leading block.

use ndarray::{s, Array1, Array2};

use crate::utils::norm::enorm;

/// Pivoted QR factorization `A·P = Q·R` of an m×n matrix, m >= n.
///
/// `qr` holds R in its upper triangle (diagonal in `rdiag`, sign-carrying)
/// and the Householder reflectors below the diagonal. `ipvt[j]` is the
/// column of A that ended up in position j.
pub struct QrFactorization {
    pub qr: Array2<f64>,
    pub rdiag: Array1<f64>,
    pub acnorm: Array1<f64>,
    pub ipvt: Vec<usize>,
}

/// Factor `a` by Householder transformations with column pivoting.
///
/// At each elimination step the remaining column of largest downdated norm
/// is swapped into position, so |rdiag| is non-increasing. Downdated norms
/// are recomputed from scratch whenever the running estimate has lost too
/// much accuracy (the 0.05 guard below).
pub fn qrfac(a: &Array2<f64>) -> QrFactorization {
    let (m, n) = a.dim();
    let mut qr = a.clone();

    let mut acnorm = Array1::zeros(n);
    for j in 0..n {
        acnorm[j] = enorm(&qr.column(j).to_owned());
    }
    let mut rdiag = acnorm.clone();
    let mut wa = acnorm.clone();
    let mut ipvt: Vec<usize> = (0..n).collect();

    let minmn = m.min(n);
    for j in 0..minmn {
        // Bring the column of largest norm into the pivot position.
        let mut kmax = j;
        for k in (j + 1)..n {
            if rdiag[k] > rdiag[kmax] {
                kmax = k;
            }
        }
        if kmax != j {
            for i in 0..m {
                qr.swap((i, j), (i, kmax));
            }
            rdiag[kmax] = rdiag[j];
            wa[kmax] = wa[j];
            ipvt.swap(j, kmax);
        }

        // Householder transformation zeroing the sub-diagonal of column j.
        let mut ajnorm = enorm(&qr.slice(s![j..m, j]).to_owned());
        if ajnorm != 0.0 {
            if qr[[j, j]] < 0.0 {
                ajnorm = -ajnorm;
            }
            for i in j..m {
                qr[[i, j]] /= ajnorm;
            }
            qr[[j, j]] += 1.0;

            // Apply to the remaining columns, downdating their norms.
            for k in (j + 1)..n {
                let mut sum = 0.0;
                for i in j..m {
                    sum += qr[[i, j]] * qr[[i, k]];
                }
                let temp = sum / qr[[j, j]];
                for i in j..m {
                    qr[[i, k]] -= temp * qr[[i, j]];
                }
                if rdiag[k] != 0.0 {
                    let t = qr[[j, k]] / rdiag[k];
                    rdiag[k] *= (1.0 - t * t).max(0.0).sqrt();
                    if 0.05 * (rdiag[k] / wa[k]).powi(2) <= f64::EPSILON {
                        rdiag[k] = enorm(&qr.slice(s![(j + 1)..m, k]).to_owned());
                        wa[k] = rdiag[k];
                    }
                }
            }
        }
        rdiag[j] = -ajnorm;
    }

    QrFactorization {
        qr,
        rdiag,
        acnorm,
        ipvt,
    }
}

impl QrFactorization {
    fn rows(&self) -> usize {
        self.qr.nrows()
    }

    fn cols(&self) -> usize {
        self.qr.ncols()
    }

    /// `Qᵗ·b`, applying the stored reflectors in elimination order.
    pub fn qt_mul(&self, b: &Array1<f64>) -> Array1<f64> {
        let m = self.rows();
        let minmn = m.min(self.cols());
        let mut w = b.clone();
        for j in 0..minmn {
            if self.qr[[j, j]] == 0.0 {
                continue;
            }
            let mut sum = 0.0;
            for i in j..m {
                sum += self.qr[[i, j]] * w[i];
            }
            let temp = -sum / self.qr[[j, j]];
            for i in j..m {
                w[i] += self.qr[[i, j]] * temp;
            }
        }
        w
    }

    /// `Q·b`, applying the stored reflectors in reverse order.
    pub fn q_mul(&self, b: &Array1<f64>) -> Array1<f64> {
        let m = self.rows();
        let minmn = m.min(self.cols());
        let mut w = b.clone();
        for j in (0..minmn).rev() {
            if self.qr[[j, j]] == 0.0 {
                continue;
            }
            let mut sum = 0.0;
            for i in j..m {
                sum += self.qr[[i, j]] * w[i];
            }
            let temp = -sum / self.qr[[j, j]];
            for i in j..m {
                w[i] += self.qr[[i, j]] * temp;
            }
        }
        w
    }

    /// The n×n upper-triangular R block with the true diagonal, lower
    /// triangle zeroed. Requires m >= n.
    pub fn r_upper(&self) -> Array2<f64> {
        let n = self.cols();
        let mut r = Array2::zeros((n, n));
        for j in 0..n {
            for i in 0..j {
                r[[i, j]] = self.qr[[i, j]];
            }
            r[[j, j]] = self.rdiag[j];
        }
        r
    }

    /// Rebuild `Q·R·Pᵗ`. Diagnostic; cost is O(m²n).
    pub fn reconstruct(&self) -> Array2<f64> {
        let m = self.rows();
        let n = self.cols();
        let mut a = Array2::zeros((m, n));
        for j in 0..n {
            let mut col = Array1::zeros(m);
            for i in 0..=j.min(m.saturating_sub(1)) {
                col[i] = if i == j { self.rdiag[j] } else { self.qr[[i, j]] };
            }
            let qcol = self.q_mul(&col);
            a.column_mut(self.ipvt[j]).assign(&qcol);
        }
        a
    }
}

/// Solve the damped least-squares system given the factorization of J.
///
/// Given the n×n triangle `r` (upper triangle of R, true diagonal), the
/// permutation, a diagonal damping vector `d` in original variable order,
/// and `qtb = Qᵗ·b`, computes x minimizing `||R·Pᵗx - qtb||² + ||D·x||²` by
/// eliminating the damping rows with Givens rotations. On return the lower triangle of `r` holds the
/// resulting triangle S and `sdiag` its diagonal; the upper triangle of `r`
/// is preserved. A zero diagonal entry of S confines the solve to the
/// non-singular leading block (min-norm fallback, no division by zero).
pub fn qrsolv(
    r: &mut Array2<f64>,
    ipvt: &[usize],
    d: &Array1<f64>,
    qtb: &Array1<f64>,
) -> (Array1<f64>, Array1<f64>) {
    let n = r.ncols();
    let mut x = Array1::zeros(n);
    let mut wa = qtb.clone();

    // Copy R and Qᵗb; work on the lower triangle so the upper survives.
    for j in 0..n {
        for i in j..n {
            r[[i, j]] = r[[j, i]];
        }
        x[j] = r[[j, j]];
    }

    // Eliminate the damping rows one diagonal entry at a time.
    let mut sdiag = Array1::zeros(n);
    for j in 0..n {
        let l = ipvt[j];
        if d[l] != 0.0 {
            for k in j..n {
                sdiag[k] = 0.0;
            }
            sdiag[j] = d[l];

            // Rotations for row j of D modify only a singly-ignorable part
            // of Qᵗb beyond the first j-1 entries.
            let mut qtbpj = 0.0;
            for k in j..n {
                if sdiag[k] == 0.0 {
                    continue;
                }
                let (sin, cos);
                if r[[k, k]].abs() < sdiag[k].abs() {
                    let cotan = r[[k, k]] / sdiag[k];
                    sin = 0.5 / (0.25 + 0.25 * cotan * cotan).sqrt();
                    cos = sin * cotan;
                } else {
                    let tan = sdiag[k] / r[[k, k]];
                    cos = 0.5 / (0.25 + 0.25 * tan * tan).sqrt();
                    sin = cos * tan;
                }

                r[[k, k]] = cos * r[[k, k]] + sin * sdiag[k];
                let temp = cos * wa[k] + sin * qtbpj;
                qtbpj = -sin * wa[k] + cos * qtbpj;
                wa[k] = temp;

                for i in (k + 1)..n {
                    let temp = cos * r[[i, k]] + sin * sdiag[i];
                    sdiag[i] = -sin * r[[i, k]] + cos * sdiag[i];
                    r[[i, k]] = temp;
                }
            }
        }

        // Store the diagonal of S and restore the diagonal of R.
        sdiag[j] = r[[j, j]];
        r[[j, j]] = x[j];
    }

    // Back-substitute S·z = wa over the non-singular leading block.
    let mut nsing = n;
    for j in 0..n {
        if sdiag[j] == 0.0 && nsing == n {
            nsing = j;
        }
        if nsing < n {
            wa[j] = 0.0;
        }
    }
    for j in (0..nsing).rev() {
        let mut sum = 0.0;
        for i in (j + 1)..nsing {
            sum += r[[i, j]] * wa[i];
        }
        wa[j] = (wa[j] - sum) / sdiag[j];
    }

    // Undo the permutation.
    for j in 0..n {
        x[ipvt[j]] = wa[j];
    }
    (x, sdiag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_qr_round_trip() {
        let a = array![
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 10.0],
            [1.0, -1.0, 2.0],
        ];
        let fac = qrfac(&a);
        let rebuilt = fac.reconstruct();
        for i in 0..4 {
            for j in 0..3 {
                assert_relative_eq!(rebuilt[[i, j]], a[[i, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_r_diagonal_non_increasing() {
        let a = array![
            [1.0, 100.0, 0.01],
            [2.0, -50.0, 0.02],
            [3.0, 25.0, -0.01],
        ];
        let fac = qrfac(&a);
        for j in 1..3 {
            assert!(
                fac.rdiag[j].abs() <= fac.rdiag[j - 1].abs() + 1e-12,
                "diagonal magnitudes must not increase: {:?}",
                fac.rdiag
            );
        }
        // The largest column is pivoted first.
        assert_eq!(fac.ipvt[0], 1);
    }

    #[test]
    fn test_qt_q_are_inverses() {
        let a = array![[2.0, 1.0], [1.0, 3.0], [0.0, 1.0]];
        let fac = qrfac(&a);
        let b = array![1.0, -2.0, 0.5];
        let round_trip = fac.q_mul(&fac.qt_mul(&b));
        for i in 0..3 {
            assert_relative_eq!(round_trip[i], b[i], epsilon = 1e-13);
        }
        // Orthogonality preserves the norm.
        assert_relative_eq!(enorm(&fac.qt_mul(&b)), enorm(&b), epsilon = 1e-13);
    }

    #[test]
    fn test_zero_column_yields_zero_diagonal() {
        let a = array![[1.0, 0.0], [2.0, 0.0], [2.0, 0.0]];
        let fac = qrfac(&a);
        assert_eq!(fac.acnorm[1], 0.0);
        // The zero column is pivoted last and produces a zero diagonal.
        assert_eq!(fac.ipvt[1], 1);
        assert_eq!(fac.rdiag[1], 0.0);
        assert!(fac.qr.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_qrsolv_undamped_matches_back_substitution() {
        // With zero damping, qrsolv reduces to solving R·Pᵗx = Qᵗb.
        let a = array![[2.0, 1.0], [1.0, 3.0], [1.0, 1.0]];
        let b = array![1.0, 2.0, 3.0];
        let fac = qrfac(&a);
        let qtb = fac.qt_mul(&b).slice(s![0..2]).to_owned();
        let mut r = fac.r_upper();
        let (x, _) = qrsolv(&mut r, &fac.ipvt, &Array1::zeros(2), &qtb);

        // x is the least-squares solution of A·x = b; verify the normal
        // equations Aᵗ(A·x - b) = 0.
        let residual = a.dot(&x) - &b;
        let normal = a.t().dot(&residual);
        for v in normal.iter() {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_qrsolv_damped_system() {
        // With damping D, the solution satisfies (AᵗA + D²)x = Aᵗb where
        // D applies in the original variable order.
        let a = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let b = array![1.0, 2.0, 0.0];
        let d = array![0.5, 2.0];
        let fac = qrfac(&a);
        let qtb = fac.qt_mul(&b).slice(s![0..2]).to_owned();
        let mut r = fac.r_upper();
        let (x, _) = qrsolv(&mut r, &fac.ipvt, &d, &qtb);

        let ata = a.t().dot(&a);
        let mut lhs = ata.dot(&x);
        for i in 0..2 {
            lhs[i] += d[i] * d[i] * x[i];
        }
        let rhs = a.t().dot(&b);
        for i in 0..2 {
            assert_relative_eq!(lhs[i], rhs[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_qrsolv_rank_deficient_fallback() {
        // Second column identically zero: the solve must stay finite and
        // leave the dead parameter at zero.
        let a = array![[1.0, 0.0], [2.0, 0.0], [1.0, 0.0]];
        let b = array![1.0, 1.0, 1.0];
        let fac = qrfac(&a);
        let qtb = fac.qt_mul(&b).slice(s![0..2]).to_owned();
        let mut r = fac.r_upper();
        let (x, _) = qrsolv(&mut r, &fac.ipvt, &Array1::zeros(2), &qtb);

        assert!(x.iter().all(|v| v.is_finite()));
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-14);
        // The live parameter still solves its normal equation: 6*x0 = 4.
        assert_relative_eq!(x[0], 4.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_qrsolv_preserves_upper_triangle() {
        let a = array![[2.0, 1.0], [1.0, 3.0], [1.0, 1.0]];
        let fac = qrfac(&a);
        let qtb = fac.qt_mul(&array![1.0, 2.0, 3.0]).slice(s![0..2]).to_owned();
        let mut r = fac.r_upper();
        let r_before = r.clone();
        let _ = qrsolv(&mut r, &fac.ipvt, &array![1.0, 1.0], &qtb);
        for j in 0..2 {
            for i in 0..=j {
                assert_relative_eq!(r[[i, j]], r_before[[i, j]], epsilon = 1e-14);
            }
        }
    }
}
