//! # Utilities Module
//!
//! Small numeric helpers shared by the geometry engine and the fit solver.

pub mod math;

pub use math::*;
