use thiserror::Error;

/// An error type for malformed point-set inputs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointSetError {
    /// The shape is not `[batch, n, 3]` or has a zero-sized dimension.
    #[error("Invalid point batch shape {0:?}, expected [batch, n, 3] with non-zero batch and n")]
    InvalidShape(Vec<usize>),

    /// The flat data does not fill the declared shape.
    #[error("Data length {found} does not match shape {shape:?} (expected {expected})")]
    LengthMismatch {
        /// Declared shape.
        shape: Vec<usize>,
        /// Number of values the shape requires.
        expected: usize,
        /// Number of values provided.
        found: usize,
    },

    /// A point set has no points.
    #[error("Point set {0} is empty")]
    EmptyPointSet(usize),

    /// Entries of a batch do not share the same point count.
    #[error("Ragged batch: entry {entry} has {found} points, expected {expected}")]
    RaggedBatch {
        /// Offending entry.
        entry: usize,
        /// Point count of the first entry.
        expected: usize,
        /// Point count of the offending entry.
        found: usize,
    },

    /// The two batches being compared have different batch sizes.
    #[error("Batch size mismatch: {0} != {1}")]
    BatchMismatch(usize, usize),

    /// An entry index is out of range.
    #[error("Entry {index} out of bounds for batch of size {len}")]
    EntryOutOfBounds {
        /// Requested entry.
        index: usize,
        /// Batch size.
        len: usize,
    },
}
