#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Dense `[batch, n, 3]` point-set container and symmetry padding.
pub mod batch;

/// Nearest-neighbour accuracy, completeness and symmetric distances.
pub mod chamfer;

/// Error types for point-set inputs.
pub mod error;

pub use batch::{PointBatch, SymmetryAxis};
pub use chamfer::{chamfer_distance, ChamferDistance, ChamferOutput, DirectionalGrads, Reduction};
pub use error::PointSetError;
