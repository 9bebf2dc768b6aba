#![deny(missing_docs)]

//! Hybridization bath and component link.
//!
//! [`HybMatrix`] keeps the inverse of the hybridization matrix between every
//! annihilator and creator of the configuration and provides determinant
//! ratios for pair insertions and removals. [`HybLink`] resolves which
//! hybridization function couples two flavors and accumulates the Matsubara
//! Green's function from the inverse matrix.

pub mod hyb;
pub mod link;
pub mod matrix;

pub use hyb::{load_hybridization, HybEntry, HybFunction};
pub use link::{HybLink, LinkParams, EMPTY_COMPONENT};
pub use matrix::HybMatrix;
