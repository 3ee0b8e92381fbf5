//! Levenberg-Marquardt trust-region solver and its linear-algebra kernels.

pub mod algorithm;
pub mod qr;
pub mod trust_region;

pub use algorithm::LevenbergMarquardt;
