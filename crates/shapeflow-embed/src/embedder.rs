use std::time::Instant;

use glam::Vec3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Serialize;
use shapeflow_chamfer::{ChamferDistance, PointBatch, Reduction};
use shapeflow_index::LatentMatrix;

use crate::config::{EmbedConfig, LossKind, MatchingPolicy};
use crate::error::{EmbedError, Result};
use crate::library::ReferenceLibrary;
use crate::losses::{mean_loss, MatchingLoss};
use crate::optim::{clip_grad_value, GradientStep};
use crate::oracle::{DeformationOracle, EvalMode, OracleError};
use crate::sampler::{BatchSampler, EpochSampler, NeighborhoodSampler};

/// Optimization phase of [`LatentEmbedder::embed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Mini-batches drawn from the whole library.
    Coarse,
    /// Mini-batches drawn from the nearest neighbours of the coarse latent.
    Finetune,
}

/// Diagnostics of a single optimization step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepStats {
    /// Phase the step belongs to.
    pub phase: Phase,
    /// Zero-based step within the phase.
    pub step: usize,
    /// Scalar loss before the update.
    pub loss: f32,
    /// The loss expressed as a distance: the loss itself for `l1`, its square root otherwise.
    pub distance: f32,
    /// Mean displacement of the deformed reference points.
    pub deformation: f32,
}

/// Fits latent codes to observed point clouds and retrieves matching shapes.
///
/// The embedder only borrows the library and the oracle, so one library can
/// serve many concurrent embedders.
pub struct LatentEmbedder<'a, D: DeformationOracle + ?Sized> {
    pub(crate) library: &'a ReferenceLibrary,
    pub(crate) deformer: &'a D,
}

// objective state shared by every step of one embed call
struct Objective<'o> {
    observed: &'o PointBatch,
    chamfer: ChamferDistance,
    criterion: Box<dyn MatchingLoss>,
    matching: MatchingPolicy,
    loss: LossKind,
    grad_clip: f32,
    verbose: bool,
}

impl<'a, D: DeformationOracle + ?Sized> LatentEmbedder<'a, D> {
    /// Pair a library with the oracle that produced its latent codes.
    pub fn new(library: &'a ReferenceLibrary, deformer: &'a D) -> Result<Self> {
        if deformer.lat_dims() != library.lat_dims() {
            return Err(EmbedError::InvalidLatent(format!(
                "oracle expects latent width {}, library has {}",
                deformer.lat_dims(),
                library.lat_dims()
            )));
        }
        Ok(Self { library, deformer })
    }

    /// The reference library.
    pub fn library(&self) -> &'a ReferenceLibrary {
        self.library
    }

    /// Find the latent code whose deformations of the library best explain `observed`.
    ///
    /// # Arguments
    ///
    /// * `observed` - The observed point cloud, `[1, n, 3]`.
    /// * `config` - Optimizer, schedule and objective.
    ///
    /// # Returns
    ///
    /// The fitted latent code, `[1, lat_dims]`.
    pub fn embed(&self, observed: &PointBatch, config: &EmbedConfig) -> Result<LatentMatrix> {
        self.embed_traced(observed, config).map(|(latent, _)| latent)
    }

    /// Like [`LatentEmbedder::embed`], also returning the statistics of every step.
    pub fn embed_traced(
        &self,
        observed: &PointBatch,
        config: &EmbedConfig,
    ) -> Result<(LatentMatrix, Vec<StepStats>)> {
        if observed.batch_size() != 1 {
            return Err(EmbedError::NotImplemented(
                "embedding supports a single observation per call",
            ));
        }

        let dims = self.library.lat_dims();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut latent = (0..dims)
            .map(|_| rng.sample::<f32, _>(StandardNormal) * config.init_scale)
            .collect::<Vec<_>>();

        let objective = Objective {
            observed,
            chamfer: ChamferDistance::new(Reduction::Mean).with_symmetry(self.deformer.symmetry_axis()),
            criterion: config.loss.criterion(),
            matching: config.matching,
            loss: config.loss,
            grad_clip: config.grad_clip,
            verbose: config.verbose,
        };
        let mut optimizer = config.optimizer.build(config.learning_rate, dims);
        let mut trace = Vec::with_capacity(config.num_iterations + config.finetune_iterations);

        let mut sampler = EpochSampler::new(self.library.len(), config.batch_size);
        self.optimize_latent(
            Phase::Coarse,
            &mut latent,
            &mut sampler,
            config.num_iterations,
            optimizer.as_mut(),
            &objective,
            &mut rng,
            &mut trace,
        )?;

        let neighbors = self
            .library
            .index()
            .query_one(&latent, config.topk_finetune)?
            .into_iter()
            .map(|(_, index)| index)
            .collect::<Vec<_>>();

        optimizer.set_learning_rate(config.finetune_learning_rate);
        if config.verbose {
            log::info!("finetuning for {} iterations", config.finetune_iterations);
        } else {
            log::debug!("finetuning for {} iterations", config.finetune_iterations);
        }

        let mut sampler = NeighborhoodSampler::new(&neighbors, config.finetune_oversample);
        self.optimize_latent(
            Phase::Finetune,
            &mut latent,
            &mut sampler,
            config.finetune_iterations,
            optimizer.as_mut(),
            &objective,
            &mut rng,
            &mut trace,
        )?;

        Ok((LatentMatrix::new(1, dims, latent)?, trace))
    }

    #[allow(clippy::too_many_arguments)]
    fn optimize_latent(
        &self,
        phase: Phase,
        latent: &mut [f32],
        sampler: &mut dyn BatchSampler,
        iterations: usize,
        optimizer: &mut dyn GradientStep,
        objective: &Objective<'_>,
        rng: &mut StdRng,
        trace: &mut Vec<StepStats>,
    ) -> Result<()> {
        for step in 0..iterations {
            let start = Instant::now();
            let indices = sampler.next_batch(rng);
            let (loss, deformation, mut grad) = self.loss_and_grad(latent, &indices, objective)?;

            clip_grad_value(&mut grad, objective.grad_clip);
            optimizer.step(latent, &grad);

            let distance = match objective.loss {
                LossKind::L1 => loss,
                _ => loss.sqrt(),
            };
            let level = if objective.verbose {
                log::Level::Info
            } else {
                log::Level::Debug
            };
            log::log!(
                level,
                "[{:?}] step {}/{} loss: {:.4e} dist: {:.4e} deformation: {:.4e} time: {:?}",
                phase,
                step + 1,
                iterations,
                loss,
                distance,
                deformation,
                start.elapsed()
            );

            trace.push(StepStats {
                phase,
                step,
                loss,
                distance,
                deformation,
            });
        }
        Ok(())
    }

    // loss, mean deformation and gradient with respect to the candidate latent
    fn loss_and_grad(
        &self,
        latent: &[f32],
        indices: &[usize],
        objective: &Objective<'_>,
    ) -> Result<(f32, f32, Vec<f32>)> {
        let batch = indices.len();
        let source_points = self.library.gather_points(indices)?;
        let source_latents = self.library.gather_latents(indices)?;
        let target_latents = LatentMatrix::new(1, latent.len(), latent.to_vec())?.repeat(batch)?;
        let observed = objective.observed.repeat(batch)?;

        let deformed = self.deformer.deform(
            &source_points,
            &source_latents,
            &target_latents,
            EvalMode::Train,
        )?;
        check_deformed(&source_points, &deformed)?;

        let output = objective.chamfer.compute(&deformed, &observed)?;
        let residuals = match objective.matching {
            MatchingPolicy::OneWay => output.completeness_means(),
            MatchingPolicy::TwoWay => output.symmetric.clone(),
        };
        let (loss, residual_grads) = mean_loss(objective.criterion.as_ref(), &residuals);

        let mut grad_points = Vec::with_capacity(deformed.as_slice().len());
        for (entry, weight) in residual_grads.iter().enumerate() {
            let grads = objective.chamfer.mean_grads(&output, &deformed, &observed, entry)?;
            let grads = match objective.matching {
                MatchingPolicy::OneWay => grads.completeness,
                MatchingPolicy::TwoWay => grads.symmetric(),
            };
            grad_points.extend(
                grads
                    .into_iter()
                    .map(|g| (Vec3::from_array(g) * *weight).to_array()),
            );
        }

        let latent_grads = self.deformer.backward(
            &source_points,
            &source_latents,
            &target_latents,
            &grad_points,
        )?;

        let deformation = deformed
            .as_slice()
            .iter()
            .zip(source_points.as_slice())
            .map(|(d, s)| Vec3::from_array(*d).distance(Vec3::from_array(*s)))
            .sum::<f32>()
            / deformed.as_slice().len() as f32;

        Ok((loss, deformation, latent_grads.target.sum_rows()))
    }
}

/// Fail when the oracle changed the batch layout.
pub(crate) fn check_deformed(source: &PointBatch, deformed: &PointBatch) -> Result<()> {
    if source.shape() != deformed.shape() {
        return Err(OracleError::ShapeMismatch(format!(
            "deformed batch has shape {:?}, expected {:?}",
            deformed.shape(),
            source.shape()
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerKind;
    use crate::library::{ReferenceShape, TriangleMesh};
    use approx::assert_relative_eq;
    use crate::oracle::AffineFlowDeformer;

    fn library() -> Result<(ReferenceLibrary, AffineFlowDeformer)> {
        let deformer = AffineFlowDeformer::new(vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], vec![0.0, 0.0])?;
        let base = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let mesh = TriangleMesh::new(base.clone(), vec![[0, 1, 2], [0, 1, 3]])?;
        let shapes = (0..4)
            .map(|i| {
                let latent = vec![i as f32 * 0.1, -(i as f32) * 0.1];
                // each sample is the base shape already deformed to its own latent
                let points = base
                    .iter()
                    .map(|p| [p[0] + latent[0], p[1] + latent[1], p[2]])
                    .collect();
                ReferenceShape {
                    latent,
                    points,
                    mesh: mesh.clone(),
                }
            })
            .collect();
        Ok((ReferenceLibrary::new(shapes)?, deformer))
    }

    #[test]
    fn test_gradient_points_downhill() -> Result<()> {
        let (library, deformer) = library()?;
        let embedder = LatentEmbedder::new(&library, &deformer)?;
        // the base shape shifted by (0.3, 0.2, 0)
        let observed = PointBatch::from_points(vec![
            [0.3, 0.2, 0.0],
            [1.3, 0.2, 0.0],
            [0.3, 1.2, 0.0],
            [0.3, 0.2, 1.0],
        ])?;
        let objective = Objective {
            observed: &observed,
            chamfer: ChamferDistance::new(Reduction::Mean),
            criterion: LossKind::L2.criterion(),
            matching: MatchingPolicy::TwoWay,
            loss: LossKind::L2,
            grad_clip: 1.0,
            verbose: false,
        };

        let latent = vec![0.0, 0.0];
        let (loss, deformation, grad) = embedder.loss_and_grad(&latent, &[0, 1, 2, 3], &objective)?;
        assert!(deformation > 0.0);
        let moved = latent
            .iter()
            .zip(&grad)
            .map(|(l, g)| l - 0.1 * g)
            .collect::<Vec<_>>();
        let (moved_loss, _, _) = embedder.loss_and_grad(&moved, &[0, 1, 2, 3], &objective)?;
        assert!(moved_loss < loss);
        Ok(())
    }

    #[test]
    fn test_trace_covers_both_phases() -> Result<()> {
        let (library, deformer) = library()?;
        let embedder = LatentEmbedder::new(&library, &deformer)?;
        let observed = PointBatch::from_points(vec![[0.0, 0.0, 0.0], [1.0, 1.0, 0.0]])?;
        let config = EmbedConfig {
            num_iterations: 5,
            batch_size: 2,
            topk_finetune: 2,
            finetune_iterations: 3,
            ..Default::default()
        };
        let (latent, trace) = embedder.embed_traced(&observed, &config)?;
        assert_eq!(latent.rows(), 1);
        assert_eq!(latent.dims(), 2);
        assert_eq!(trace.len(), 8);
        assert!(trace[..5].iter().all(|s| s.phase == Phase::Coarse));
        assert!(trace[5..].iter().all(|s| s.phase == Phase::Finetune));
        assert_eq!(trace[7].step, 2);
        // l1 reports the loss itself as the distance
        assert!(trace.iter().all(|s| s.distance == s.loss));
        Ok(())
    }

    #[test]
    fn test_steps_are_clipped_and_finetune_uses_its_rate() -> Result<()> {
        let (library, deformer) = library()?;
        let embedder = LatentEmbedder::new(&library, &deformer)?;
        // far from every reference, so every raw gradient component is large and negative
        let observed = PointBatch::from_points(vec![
            [10.0, 10.0, 0.0],
            [11.0, 10.0, 0.0],
            [10.0, 11.0, 0.0],
            [10.0, 10.0, 1.0],
        ])?;
        let base = EmbedConfig {
            optimizer: OptimizerKind::Sgd,
            learning_rate: 0.1,
            finetune_learning_rate: 0.01,
            grad_clip: 1e-3,
            init_scale: 0.0,
            topk_finetune: 2,
            ..Default::default()
        };

        let cases = [(1, 0, 1e-4), (0, 1, 1e-5), (1, 1, 1.1e-4)];
        for (num_iterations, finetune_iterations, expected) in cases {
            let config = EmbedConfig {
                num_iterations,
                finetune_iterations,
                ..base.clone()
            };
            let latent = embedder.embed(&observed, &config)?;
            for value in latent.as_slice() {
                assert_relative_eq!(*value, expected, epsilon = 1e-8);
            }
        }
        Ok(())
    }

    #[test]
    fn test_oracle_width_must_match_library() -> Result<()> {
        let (library, _) = library()?;
        let wide = AffineFlowDeformer::new(vec![[1.0, 0.0, 0.0]; 3], vec![0.0; 3])?;
        assert!(matches!(
            LatentEmbedder::new(&library, &wide),
            Err(EmbedError::InvalidLatent(_))
        ));
        Ok(())
    }
}
