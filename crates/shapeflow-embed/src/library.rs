use shapeflow_chamfer::PointBatch;
use shapeflow_index::{LatentIndex, LatentMatrix};

use crate::error::{EmbedError, Result};

/// A triangle mesh with zero-based vertex indices.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<[f32; 3]>,
    /// Vertex index triplets.
    pub faces: Vec<[u32; 3]>,
}

impl TriangleMesh {
    /// Create a mesh, checking that it has vertices and that every face index is in range.
    pub fn new(vertices: Vec<[f32; 3]>, faces: Vec<[u32; 3]>) -> Result<Self> {
        let mesh = Self { vertices, faces };
        match mesh.defect() {
            Some(defect) => Err(EmbedError::InvalidLatent(defect)),
            None => Ok(mesh),
        }
    }

    fn defect(&self) -> Option<String> {
        if self.vertices.is_empty() {
            return Some("mesh has no vertices".to_string());
        }
        self.faces
            .iter()
            .find(|f| f.iter().any(|&v| v as usize >= self.vertices.len()))
            .map(|face| {
                format!(
                    "face {:?} references a vertex beyond {}",
                    face,
                    self.vertices.len()
                )
            })
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }
}

/// One known shape: its latent code, a fixed-size surface sample and its mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceShape {
    /// Latent code of the shape.
    pub latent: Vec<f32>,
    /// Cached point sample used during embedding.
    pub points: Vec<[f32; 3]>,
    /// Full mesh used during retrieval.
    pub mesh: TriangleMesh,
}

/// Borrowed view of one library entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeView<'a> {
    /// Latent code of the shape.
    pub latent: &'a [f32],
    /// Cached point sample.
    pub points: &'a [[f32; 3]],
    /// Full mesh.
    pub mesh: &'a TriangleMesh,
}

/// The ordered collection of known shapes and the spatial index over their latent codes.
///
/// Entry `i` always corresponds to row `i` of the indexed latent matrix.
#[derive(Debug, Clone)]
pub struct ReferenceLibrary {
    points: PointBatch,
    meshes: Vec<TriangleMesh>,
    index: LatentIndex,
}

impl ReferenceLibrary {
    /// Build a library and its latent index.
    ///
    /// All shapes must share the latent width and the sample size.
    pub fn new(shapes: Vec<ReferenceShape>) -> Result<Self> {
        if shapes.is_empty() {
            return Err(EmbedError::InvalidLatent(
                "reference library is empty".to_string(),
            ));
        }

        let mut latents = Vec::with_capacity(shapes.len());
        let mut points = Vec::with_capacity(shapes.len());
        let mut meshes = Vec::with_capacity(shapes.len());
        for shape in shapes {
            latents.push(shape.latent);
            points.push(shape.points);
            meshes.push(shape.mesh);
        }

        let latents = LatentMatrix::from_rows(latents)
            .map_err(|e| EmbedError::InvalidLatent(e.to_string()))?;
        let points = PointBatch::from_sets(points)?;
        // meshes built as struct literals never went through `TriangleMesh::new`
        for (i, mesh) in meshes.iter().enumerate() {
            if let Some(defect) = mesh.defect() {
                return Err(EmbedError::InvalidLatent(format!("mesh {}: {}", i, defect)));
            }
        }

        log::debug!(
            "reference library: {} shapes, {} latent dims, {} points each",
            latents.rows(),
            latents.dims(),
            points.num_points()
        );

        Ok(Self {
            points,
            meshes,
            index: LatentIndex::new(latents),
        })
    }

    /// Replace every latent code and rebuild the index.
    pub fn set_latents(&mut self, latents: LatentMatrix) -> Result<()> {
        if latents.rows() != self.len() || latents.dims() != self.lat_dims() {
            return Err(EmbedError::InvalidLatent(format!(
                "expected [{}, {}] latents, got [{}, {}]",
                self.len(),
                self.lat_dims(),
                latents.rows(),
                latents.dims()
            )));
        }
        self.index.rebuild(latents);
        Ok(())
    }

    /// Number of shapes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Always false; an empty library cannot be built.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Latent code width.
    pub fn lat_dims(&self) -> usize {
        self.index.dims()
    }

    /// Points per cached sample.
    pub fn num_points(&self) -> usize {
        self.points.num_points()
    }

    /// The shape at `index`.
    pub fn shape(&self, index: usize) -> Option<ShapeView<'_>> {
        Some(ShapeView {
            latent: self.index.latents().row(index)?,
            points: self.points.entry(index)?,
            mesh: self.meshes.get(index)?,
        })
    }

    /// The mesh at `index`.
    pub fn mesh(&self, index: usize) -> Option<&TriangleMesh> {
        self.meshes.get(index)
    }

    /// All latent codes, `[len, lat_dims]`.
    pub fn latents(&self) -> &LatentMatrix {
        self.index.latents()
    }

    /// The spatial index over the latent codes.
    pub fn index(&self) -> &LatentIndex {
        &self.index
    }

    /// Cached samples of the given shapes, in order.
    pub fn gather_points(&self, indices: &[usize]) -> Result<PointBatch> {
        Ok(self.points.gather(indices)?)
    }

    /// Latent codes of the given shapes, in order.
    pub fn gather_latents(&self, indices: &[usize]) -> Result<LatentMatrix> {
        self.index
            .latents()
            .gather(indices)
            .map_err(|e| EmbedError::InvalidLatent(e.to_string()))
    }
}
