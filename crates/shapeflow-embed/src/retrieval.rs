use shapeflow_chamfer::{ChamferDistance, PointBatch, Reduction};
use shapeflow_index::LatentMatrix;

use crate::config::{MatchingPolicy, RetrieveConfig};
use crate::embedder::{check_deformed, LatentEmbedder};
use crate::error::{EmbedError, Result};
use crate::library::TriangleMesh;
use crate::oracle::{DeformationOracle, EvalMode, OracleError};

/// A reference shape deformed toward a query latent code.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Library index of the reference shape.
    pub index: usize,
    /// The deformed mesh: deformed vertices with the original faces.
    pub mesh: TriangleMesh,
    /// Matching distance to the target points.
    pub distance: f32,
}

/// Ranked retrieval result. All three lists share the same ascending-distance order.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval<'a> {
    /// Deformed candidates.
    pub candidates: Vec<Candidate>,
    /// The undeformed library meshes of the candidates.
    pub originals: Vec<&'a TriangleMesh>,
    /// Matching distances.
    pub distances: Vec<f32>,
}

impl<'a, D: DeformationOracle + ?Sized> LatentEmbedder<'a, D> {
    /// Deform the `topk` library shapes nearest to `latent` toward it and rank
    /// them by distance to `target`.
    ///
    /// # Arguments
    ///
    /// * `latent` - Query latent code, `[1, lat_dims]`.
    /// * `target` - Target point cloud, `[1, n, 3]`.
    /// * `config` - Neighbourhood size and matching policy.
    ///
    /// # Errors
    ///
    /// [`EmbedError::NotImplemented`] for more than one query or target,
    /// [`EmbedError::InvalidLatent`] when the query width differs from the library's,
    /// [`EmbedError::InvalidQuery`] when `topk` is zero or exceeds the library size.
    pub fn retrieve(
        &self,
        latent: &LatentMatrix,
        target: &PointBatch,
        config: &RetrieveConfig,
    ) -> Result<Retrieval<'a>> {
        let query = match latent.row(0) {
            Some(query) if latent.rows() == 1 && target.batch_size() == 1 => query,
            _ => {
                return Err(EmbedError::NotImplemented(
                    "retrieval supports a single query per call",
                ))
            }
        };
        if latent.dims() != self.library.lat_dims() {
            return Err(EmbedError::InvalidLatent(format!(
                "query latent has width {}, library has {}",
                latent.dims(),
                self.library.lat_dims()
            )));
        }

        let indices = self
            .library
            .index()
            .query_one(query, config.topk)?
            .into_iter()
            .map(|(_, index)| index)
            .collect::<Vec<_>>();

        let originals = indices
            .iter()
            .map(|&i| {
                self.library
                    .mesh(i)
                    .ok_or_else(|| EmbedError::InvalidLatent(format!("no mesh at index {}", i)))
            })
            .collect::<Result<Vec<_>>>()?;

        // right-pad every vertex set with zeros to the largest one
        let max_vertices = originals
            .iter()
            .map(|m| m.num_vertices())
            .max()
            .unwrap_or(0);
        let padded = originals
            .iter()
            .map(|m| {
                let mut vertices = m.vertices.clone();
                vertices.resize(max_vertices, [0.0; 3]);
                vertices
            })
            .collect::<Vec<_>>();
        let source_points = PointBatch::from_sets(padded)?;
        let source_latents = self.library.gather_latents(&indices)?;
        let target_latents = latent.repeat(indices.len())?;

        let deformed = self.deformer.deform(
            &source_points,
            &source_latents,
            &target_latents,
            EvalMode::Inference,
        )?;
        check_deformed(&source_points, &deformed)?;

        let chamfer = ChamferDistance::new(Reduction::Mean);
        let mut candidates = Vec::with_capacity(indices.len());
        for (entry, (&index, original)) in indices.iter().zip(&originals).enumerate() {
            let vertices = deformed
                .entry(entry)
                .map(|v| v[..original.num_vertices()].to_vec())
                .ok_or_else(|| OracleError::ShapeMismatch(format!("missing deformed entry {}", entry)))?;
            let output = chamfer.compute(&PointBatch::from_points(vertices.clone())?, target)?;
            let distance = match config.matching {
                MatchingPolicy::OneWay => output.completeness_means()[0],
                MatchingPolicy::TwoWay => output.symmetric[0],
            };
            candidates.push((
                Candidate {
                    index,
                    mesh: TriangleMesh {
                        vertices,
                        faces: original.faces.clone(),
                    },
                    distance,
                },
                *original,
            ));
        }

        // stable, so ties keep the index order
        candidates.sort_by(|a, b| a.0.distance.total_cmp(&b.0.distance));

        log::debug!(
            "retrieved {} candidates, best distance {:?}",
            candidates.len(),
            candidates.first().map(|c| c.0.distance)
        );

        let (candidates, originals): (Vec<_>, Vec<_>) = candidates.into_iter().unzip();
        let distances = candidates.iter().map(|c| c.distance).collect();
        Ok(Retrieval {
            candidates,
            originals,
            distances,
        })
    }
}
