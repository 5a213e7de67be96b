#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Embedding and retrieval configuration.
pub mod config;

mod embedder;

/// Error types for embedding and retrieval.
pub mod error;

/// Reference shape library.
pub mod library;

pub mod losses;

pub mod optim;

/// Deformation oracle contract and a reference implementation.
pub mod oracle;

mod retrieval;

pub mod sampler;

pub use crate::config::{EmbedConfig, LossKind, MatchingPolicy, OptimizerKind, RetrieveConfig};
pub use crate::embedder::{LatentEmbedder, Phase, StepStats};
pub use crate::error::{EmbedError, Result};
pub use crate::library::{ReferenceLibrary, ReferenceShape, ShapeView, TriangleMesh};
pub use crate::oracle::{AffineFlowDeformer, DeformationOracle, EvalMode, LatentGrads, OracleError};
pub use crate::retrieval::{Candidate, Retrieval};
