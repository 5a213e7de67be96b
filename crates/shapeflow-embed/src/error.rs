use shapeflow_chamfer::PointSetError;
use shapeflow_index::LatentIndexError;
use thiserror::Error;

use crate::oracle::OracleError;

/// Errors raised by embedding and retrieval.
///
/// Every error aborts the whole call; no partial result is returned.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Malformed point set.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] PointSetError),

    /// Malformed latent code or library entry.
    #[error("Invalid input: {0}")]
    InvalidLatent(String),

    /// Neighbourhood size or query width the spatial index cannot serve.
    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] LatentIndexError),

    /// Unknown optimizer, loss or matching policy name.
    #[error("Unsupported config: {0}")]
    UnsupportedConfig(String),

    /// A known, intentional limitation.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// The deformation oracle failed.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Result alias for embedding and retrieval.
pub type Result<T> = std::result::Result<T, EmbedError>;
