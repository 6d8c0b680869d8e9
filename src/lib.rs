#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(clippy::all, clippy::cargo, clippy::nursery, missing_docs)]
#![doc = include_str!("../README.md")]

/// Shared scalar aliases and numeric helpers.
pub mod math;
/// Linear operator contract and stock matrix-backed implementations.
pub mod operator;
/// Preconditioner contract and the identity instance.
pub mod preconditioner;
/// Convergence monitoring: the oracle contract and the stock monitor.
pub mod monitor;
/// Preconditioned BiCGStab(L) solver engine.
pub mod bicgstab;
/// Error types shared across the library.
pub mod errors;

/// Common exports for downstream crates.
pub mod prelude;
