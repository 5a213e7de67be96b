use glam::Vec3;
use rand::Rng;
use shapeflow_chamfer::{PointBatch, SymmetryAxis};
use shapeflow_index::LatentMatrix;
use thiserror::Error;

/// Whether the oracle is evaluated for optimization or for inference only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Gradients will be requested through [`DeformationOracle::backward`].
    Train,
    /// No gradient is tracked.
    Inference,
}

/// Errors reported by a deformation oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Inputs do not agree in batch size or latent width.
    #[error("Oracle shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Any failure inside the oracle implementation.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Gradients of a scalar objective with respect to both latent arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentGrads {
    /// Gradient with respect to the source latents, `[batch, lat_dims]`.
    pub source: LatentMatrix,
    /// Gradient with respect to the target latents, `[batch, lat_dims]`.
    pub target: LatentMatrix,
}

/// A learned deformation field warping points from a source latent code
/// toward a target latent code.
///
/// Entry `i` of `points` is deformed with row `i` of `source` and `target`.
pub trait DeformationOracle: Send + Sync {
    /// Width of the latent codes the oracle accepts.
    fn lat_dims(&self) -> usize;

    /// Axis across which the modelled shape family is symmetric, if any.
    fn symmetry_axis(&self) -> Option<SymmetryAxis> {
        None
    }

    /// Deform `points` `[batch, n, 3]` from `source` to `target` `[batch, lat_dims]`.
    fn deform(
        &self,
        points: &PointBatch,
        source: &LatentMatrix,
        target: &LatentMatrix,
        mode: EvalMode,
    ) -> Result<PointBatch, OracleError>;

    /// Vector-Jacobian product of [`DeformationOracle::deform`].
    ///
    /// `grad_output` is the gradient of the objective with respect to every
    /// deformed point, laid out like the deformed batch.
    fn backward(
        &self,
        points: &PointBatch,
        source: &LatentMatrix,
        target: &LatentMatrix,
        grad_output: &[[f32; 3]],
    ) -> Result<LatentGrads, OracleError>;
}

/// Check that points and both latent matrices agree with each other and with `lat_dims`.
pub fn check_oracle_inputs(
    points: &PointBatch,
    source: &LatentMatrix,
    target: &LatentMatrix,
    lat_dims: usize,
) -> Result<(), OracleError> {
    if source.rows() != points.batch_size() || target.rows() != points.batch_size() {
        return Err(OracleError::ShapeMismatch(format!(
            "{} point sets but {} source and {} target latents",
            points.batch_size(),
            source.rows(),
            target.rows()
        )));
    }
    if source.dims() != lat_dims || target.dims() != lat_dims {
        return Err(OracleError::ShapeMismatch(format!(
            "expected latent width {}, got source {} and target {}",
            lat_dims,
            source.dims(),
            target.dims()
        )));
    }
    Ok(())
}

/// A deformation that is affine in the latent difference.
///
/// With `d = target - source`, every point moves as
/// `p' = (1 + s·d) p + T d`, where `T` is `[3, lat_dims]` and `s` is a
/// `lat_dims` vector: a latent-controlled translation plus isotropic scale.
/// Deforming a shape to its own latent code is the identity.
#[derive(Debug, Clone)]
pub struct AffineFlowDeformer {
    translation: Vec<Vec3>,
    scale: Vec<f32>,
    symmetry: Option<SymmetryAxis>,
}

impl AffineFlowDeformer {
    /// Create a deformer from one translation direction and one scale rate per latent dimension.
    pub fn new(translation: Vec<[f32; 3]>, scale: Vec<f32>) -> Result<Self, OracleError> {
        if translation.is_empty() || translation.len() != scale.len() {
            return Err(OracleError::ShapeMismatch(format!(
                "{} translation directions and {} scale rates",
                translation.len(),
                scale.len()
            )));
        }
        Ok(Self {
            translation: translation.into_iter().map(Vec3::from_array).collect(),
            scale,
            symmetry: None,
        })
    }

    /// A deformer with random unit-range directions and rates.
    pub fn random<R: Rng>(lat_dims: usize, scale_range: f32, rng: &mut R) -> Result<Self, OracleError> {
        let translation = (0..lat_dims)
            .map(|_| {
                [
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                ]
            })
            .collect();
        let scale = (0..lat_dims)
            .map(|_| rng.random_range(-scale_range..=scale_range))
            .collect();
        Self::new(translation, scale)
    }

    /// Declare the shape family symmetric across `axis`.
    pub fn with_symmetry(mut self, axis: Option<SymmetryAxis>) -> Self {
        self.symmetry = axis;
        self
    }

    fn displacement(&self, delta: &[f32]) -> (Vec3, f32) {
        delta.iter().zip(self.translation.iter().zip(self.scale.iter())).fold(
            (Vec3::ZERO, 0.0),
            |(offset, scale), (d, (t, s))| (offset + *t * *d, scale + s * d),
        )
    }
}

impl DeformationOracle for AffineFlowDeformer {
    fn lat_dims(&self) -> usize {
        self.translation.len()
    }

    fn symmetry_axis(&self) -> Option<SymmetryAxis> {
        self.symmetry
    }

    fn deform(
        &self,
        points: &PointBatch,
        source: &LatentMatrix,
        target: &LatentMatrix,
        _mode: EvalMode,
    ) -> Result<PointBatch, OracleError> {
        check_oracle_inputs(points, source, target, self.lat_dims())?;

        let mut deformed = Vec::with_capacity(points.batch_size());
        for ((entry, s), t) in points.iter().zip(source.iter()).zip(target.iter()) {
            let delta = t.iter().zip(s).map(|(t, s)| t - s).collect::<Vec<_>>();
            let (offset, scale) = self.displacement(&delta);
            deformed.push(
                entry
                    .iter()
                    .map(|p| (Vec3::from_array(*p) * (1.0 + scale) + offset).to_array())
                    .collect::<Vec<_>>(),
            );
        }

        PointBatch::from_sets(deformed)
            .map_err(|e| OracleError::ShapeMismatch(e.to_string()))
    }

    fn backward(
        &self,
        points: &PointBatch,
        source: &LatentMatrix,
        target: &LatentMatrix,
        grad_output: &[[f32; 3]],
    ) -> Result<LatentGrads, OracleError> {
        check_oracle_inputs(points, source, target, self.lat_dims())?;
        if grad_output.len() != points.as_slice().len() {
            return Err(OracleError::ShapeMismatch(format!(
                "gradient has {} rows for {} points",
                grad_output.len(),
                points.as_slice().len()
            )));
        }

        let dims = self.lat_dims();
        let mut target_grad = Vec::with_capacity(points.batch_size() * dims);
        for (entry, grad) in points.iter().zip(grad_output.chunks_exact(points.num_points())) {
            // dL/dd_k = T_k · Σ g + s_k Σ g·p
            let (sum_grad, sum_dot) = entry.iter().zip(grad).fold(
                (Vec3::ZERO, 0.0),
                |(sum_grad, sum_dot), (p, g)| {
                    let g = Vec3::from_array(*g);
                    (sum_grad + g, sum_dot + g.dot(Vec3::from_array(*p)))
                },
            );
            target_grad.extend(
                self.translation
                    .iter()
                    .zip(self.scale.iter())
                    .map(|(t, s)| t.dot(sum_grad) + s * sum_dot),
            );
        }
        let source_grad = target_grad.iter().map(|g| -g).collect();

        let to_matrix = |data| {
            LatentMatrix::new(points.batch_size(), dims, data)
                .map_err(|e| OracleError::ShapeMismatch(e.to_string()))
        };
        Ok(LatentGrads {
            source: to_matrix(source_grad)?,
            target: to_matrix(target_grad)?,
        })
    }
}
