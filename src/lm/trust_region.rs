//! Search for the Levenberg-Marquardt damping parameter.
//!
//! Given the QR factorization of the Jacobian, a diagonal scaling D and a
//! trust-region radius delta, find `par >= 0` such that the damped step x
//! solving `(JᵗJ + par·D²)x = Jᵗb` satisfies `||D·x|| ≈ delta` (within 10%),
//! or `par = 0` when the Gauss-Newton step already fits inside the region.
//! This is MINPACK's `lmpar`: a safeguarded Newton iteration on the secular
//! equation in `1/||D·x||`, bracketed from below by the full-rank Newton
//! estimate and from above by the gradient bound, capped at 10 iterations.

use ndarray::Array1;

use crate::error::{CalOptError, Result};
use crate::lm::qr::qrsolv;
use crate::utils::norm::{enorm, scaled_norm};

/// Outcome of the damping search: the parameter, the (positive-sense) step
/// it produces, and the diagonal of the damped triangle S.
pub struct DampedStep {
    pub par: f64,
    pub x: Array1<f64>,
    pub sdiag: Array1<f64>,
}

/// Find the damping parameter and associated step.
///
/// `r` holds the n×n upper triangle of R with its true diagonal; its lower
/// triangle is used as scratch by the damped solves. `par0` seeds the search
/// with the parameter from the previous outer iteration.
pub fn lmpar(
    r: &mut ndarray::Array2<f64>,
    ipvt: &[usize],
    diag: &Array1<f64>,
    qtb: &Array1<f64>,
    delta: f64,
    par0: f64,
) -> Result<DampedStep> {
    const P1: f64 = 0.1;
    const P001: f64 = 0.001;
    let dwarf = f64::MIN_POSITIVE;
    let n = r.ncols();

    // Gauss-Newton direction over the non-singular leading block of R.
    let mut wa1 = qtb.clone();
    let mut nsing = n;
    for j in 0..n {
        if r[[j, j]] == 0.0 && nsing == n {
            nsing = j;
        }
        if nsing < n {
            wa1[j] = 0.0;
        }
    }
    for j in (0..nsing).rev() {
        wa1[j] /= r[[j, j]];
        let temp = wa1[j];
        for i in 0..j {
            wa1[i] -= r[[i, j]] * temp;
        }
    }
    let mut x = Array1::zeros(n);
    for j in 0..n {
        x[ipvt[j]] = wa1[j];
    }

    // Accept the undamped step when it lies inside (or just beyond) the
    // region.
    let mut dxnorm = scaled_norm(diag, &x);
    let mut fp = dxnorm - delta;
    if fp <= P1 * delta {
        return Ok(DampedStep {
            par: 0.0,
            x,
            sdiag: Array1::zeros(n),
        });
    }

    // Lower bound: the Newton step of the secular function, defined only
    // when J has full rank.
    let mut parl = 0.0;
    if nsing >= n {
        for j in 0..n {
            let l = ipvt[j];
            wa1[j] = diag[l] * (diag[l] * x[l] / dxnorm);
        }
        for j in 0..n {
            let mut sum = 0.0;
            for i in 0..j {
                sum += r[[i, j]] * wa1[i];
            }
            wa1[j] = (wa1[j] - sum) / r[[j, j]];
        }
        let temp = enorm(&wa1);
        parl = ((fp / delta) / temp) / temp;
    }

    // Upper bound from the gradient norm.
    for j in 0..n {
        let mut sum = 0.0;
        for i in 0..=j {
            sum += r[[i, j]] * qtb[i];
        }
        wa1[j] = sum / diag[ipvt[j]];
    }
    let gnorm = enorm(&wa1);
    let mut paru = gnorm / delta;
    if paru == 0.0 {
        paru = dwarf / delta.min(P1);
    }

    if parl > paru {
        return Err(CalOptError::InvalidState(
            "damping parameter bracket is inverted (lower bound exceeds upper bound)".to_string(),
        ));
    }

    let mut par = par0.clamp(parl, paru);
    if par == 0.0 {
        par = gnorm / dxnorm;
    }

    let mut sdiag = Array1::zeros(n);
    for iter in 1..=10 {
        if par == 0.0 {
            par = dwarf.max(P001 * paru);
        }
        let damped = diag.mapv(|d| par.sqrt() * d);
        let (xk, sd) = qrsolv(r, ipvt, &damped, qtb);
        x = xk;
        sdiag = sd;
        dxnorm = scaled_norm(diag, &x);
        let prev_fp = fp;
        fp = dxnorm - delta;

        // Stop when the step length is within 10% of the radius, or when
        // the lower bound is zero and the residual keeps undershooting.
        if fp.abs() <= P1 * delta
            || (parl == 0.0 && fp <= prev_fp && prev_fp < 0.0)
            || iter == 10
        {
            break;
        }

        // Newton correction for the secular equation.
        for j in 0..n {
            let l = ipvt[j];
            wa1[j] = diag[l] * (diag[l] * x[l] / dxnorm);
        }
        for j in 0..n {
            wa1[j] /= sdiag[j];
            let temp = wa1[j];
            for i in (j + 1)..n {
                wa1[i] -= r[[i, j]] * temp;
            }
        }
        let temp = enorm(&wa1);
        let parc = ((fp / delta) / temp) / temp;

        if fp > 0.0 {
            parl = parl.max(par);
        } else {
            paru = paru.min(par);
        }
        par = (par + parc).max(parl);
    }

    Ok(DampedStep { par, x, sdiag })
}
