//! Scale-safe Euclidean norms.
//!
//! The optimizer measures step lengths and gradient norms on vectors whose
//! components can span hundreds of orders of magnitude. A naive
//! sum-of-squares would overflow or underflow where the result itself is
//! representable, so the norm is accumulated in three ranges the way
//! MINPACK's `enorm` does.

use ndarray::Array1;

// MINPACK enorm range constants.
const RDWARF: f64 = 3.834e-20;
const RGIANT: f64 = 1.304e19;

/// Euclidean norm of `v`, safe against overflow and underflow.
///
/// Components are accumulated in three sums: one for values large enough to
/// risk overflow when squared, one for values small enough to underflow, and
/// one for the intermediate range. The large and small sums carry a running
/// scale factor instead of the raw squares.
pub fn enorm(v: &Array1<f64>) -> f64 {
    let n = v.len();
    let agiant = RGIANT / (n.max(1) as f64);

    let mut s1 = 0.0; // large components, scaled by x1max
    let mut s2 = 0.0; // intermediate components
    let mut s3 = 0.0; // small components, scaled by x3max
    let mut x1max = 0.0_f64;
    let mut x3max = 0.0_f64;

    for &vi in v.iter() {
        let xabs = vi.abs();
        if xabs > RDWARF && xabs < agiant {
            s2 += xabs * xabs;
        } else if xabs <= RDWARF {
            if xabs > x3max {
                s3 = 1.0 + s3 * (x3max / xabs).powi(2);
                x3max = xabs;
            } else if xabs != 0.0 {
                s3 += (xabs / x3max).powi(2);
            }
        } else if xabs > x1max {
            s1 = 1.0 + s1 * (x1max / xabs).powi(2);
            x1max = xabs;
        } else {
            s1 += (xabs / x1max).powi(2);
        }
    }

    if s1 != 0.0 {
        x1max * (s1 + (s2 / x1max) / x1max).sqrt()
    } else if s2 != 0.0 {
        if s2 >= x3max {
            (s2 * (1.0 + (x3max / s2) * (x3max * s3))).sqrt()
        } else {
            (x3max * ((s2 / x3max) + (x3max * s3))).sqrt()
        }
    } else {
        x3max * s3.sqrt()
    }
}

/// Norm of the coordinate-wise product `d ∘ v`, i.e. `||D·v||` for a
/// diagonal scaling matrix D.
pub fn scaled_norm(d: &Array1<f64>, v: &Array1<f64>) -> f64 {
    debug_assert_eq!(d.len(), v.len());
    enorm(&(d * v))
}
