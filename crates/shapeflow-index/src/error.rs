use thiserror::Error;

/// An error type for latent matrices and index queries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LatentIndexError {
    /// The requested neighbourhood size cannot be served by the index.
    #[error("Invalid query: k={k} but the index holds {len} latent codes")]
    InvalidQuery {
        /// Requested number of neighbours.
        k: usize,
        /// Number of indexed latent codes.
        len: usize,
    },

    /// Query rows and indexed codes have different widths.
    #[error("Latent dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Width of the indexed codes.
        expected: usize,
        /// Width of the offending input.
        found: usize,
    },

    /// The matrix shape is empty or does not match the data.
    #[error("Invalid latent matrix: {rows}x{dims} with {len} values")]
    InvalidShape {
        /// Declared number of rows.
        rows: usize,
        /// Declared row width.
        dims: usize,
        /// Number of values provided.
        len: usize,
    },

    /// A row index is out of range.
    #[error("Row {index} out of bounds for {rows} rows")]
    RowOutOfBounds {
        /// Requested row.
        index: usize,
        /// Number of rows.
        rows: usize,
    },
}
