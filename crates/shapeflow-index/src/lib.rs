#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for latent matrices and index queries.
pub mod error;

/// k-d tree over latent codes of run-time width.
pub mod kdtree;

/// Dense `[rows, dims]` latent code matrix.
pub mod latent;

pub use error::LatentIndexError;
pub use kdtree::{LatentIndex, Neighbors};
pub use latent::LatentMatrix;
