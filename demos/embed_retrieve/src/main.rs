use argh::FromArgs;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::path::PathBuf;

use shapeflow::chamfer::PointBatch;
use shapeflow::embed::{
    AffineFlowDeformer, DeformationOracle, EmbedConfig, EvalMode, LatentEmbedder,
    ReferenceLibrary, ReferenceShape, RetrieveConfig, TriangleMesh,
};
use shapeflow::index::LatentMatrix;

#[derive(FromArgs)]
/// Embed a synthetic partial scan into a latent shape space and retrieve the closest shapes
struct Args {
    /// path to a JSON file with the embedding configuration
    #[argh(option)]
    config_path: Option<PathBuf>,

    /// number of shapes in the synthetic library
    #[argh(option, default = "64")]
    num_shapes: usize,

    /// width of the latent codes
    #[argh(option, default = "4")]
    lat_dims: usize,

    /// number of candidates to retrieve
    #[argh(option, default = "5")]
    topk: usize,

    /// seed of the synthetic data
    #[argh(option, default = "42")]
    seed: u64,

    /// keep the whole observation instead of its upper half
    #[argh(switch)]
    full: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config_path {
        Some(path) => serde_json::from_str::<EmbedConfig>(&std::fs::read_to_string(path)?)?,
        None => EmbedConfig {
            learning_rate: 0.02,
            num_iterations: 100,
            finetune_learning_rate: 0.005,
            finetune_iterations: 30,
            ..Default::default()
        },
    };
    log::info!("Embed config: {}", serde_json::to_string(&config)?);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let deformer = AffineFlowDeformer::random(args.lat_dims, 0.1, &mut rng)?;
    let (base, faces) = uv_sphere(8, 16);

    // every library shape is the template deformed to its own latent code
    let mut shapes = Vec::with_capacity(args.num_shapes);
    for _ in 0..args.num_shapes {
        let latent = random_latent(args.lat_dims, 0.5, &mut rng);
        let vertices = deform_template(&deformer, &base, &latent)?;
        shapes.push(ReferenceShape {
            points: vertices.clone(),
            mesh: TriangleMesh::new(vertices, faces.clone())?,
            latent,
        });
    }
    let library = ReferenceLibrary::new(shapes)?;
    log::info!(
        "Library: #{} shapes, {} latent dims, {} points each",
        library.len(),
        library.lat_dims(),
        library.num_points()
    );

    let hidden = random_latent(args.lat_dims, 0.5, &mut rng);
    let mut observed = deform_template(&deformer, &base, &hidden)?;
    if !args.full {
        observed.retain(|p| p[2] >= 0.0);
    }
    log::info!("Observation: #{} points", observed.len());
    let observed = PointBatch::from_points(observed)?;

    let embedder = LatentEmbedder::new(&library, &deformer)?;
    let (latent, trace) = embedder.embed_traced(&observed, &config)?;
    if let (Some(first), Some(last)) = (trace.first(), trace.last()) {
        log::info!("Loss: {:.6} -> {:.6} over {} steps", first.loss, last.loss, trace.len());
    }
    println!("Hidden latent: {:?}", hidden);
    println!("Fitted latent: {:?}", latent.as_slice());

    let retrieve_config = RetrieveConfig {
        topk: args.topk,
        matching: config.matching,
    };
    let retrieval = embedder.retrieve(&latent, &observed, &retrieve_config)?;
    for (rank, candidate) in retrieval.candidates.iter().enumerate() {
        println!(
            "#{} shape {:>3} distance {:.6}",
            rank + 1,
            candidate.index,
            candidate.distance
        );
    }

    Ok(())
}

fn random_latent(dims: usize, scale: f32, rng: &mut StdRng) -> Vec<f32> {
    (0..dims)
        .map(|_| rng.sample::<f32, _>(StandardNormal) * scale)
        .collect()
}

fn deform_template(
    deformer: &AffineFlowDeformer,
    template: &[[f32; 3]],
    latent: &[f32],
) -> Result<Vec<[f32; 3]>, Box<dyn std::error::Error>> {
    let points = PointBatch::from_points(template.to_vec())?;
    let origin = LatentMatrix::zeros(1, latent.len())?;
    let target = LatentMatrix::new(1, latent.len(), latent.to_vec())?;
    Ok(deformer
        .deform(&points, &origin, &target, EvalMode::Inference)?
        .into_vec())
}

/// Unit sphere with `rings` latitude bands and `segments` longitude bands.
fn uv_sphere(rings: u32, segments: u32) -> (Vec<[f32; 3]>, Vec<[u32; 3]>) {
    let mut vertices = vec![[0.0, 0.0, 1.0]];
    for r in 1..rings {
        let theta = std::f32::consts::PI * r as f32 / rings as f32;
        for s in 0..segments {
            let phi = 2.0 * std::f32::consts::PI * s as f32 / segments as f32;
            vertices.push([
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            ]);
        }
    }
    vertices.push([0.0, 0.0, -1.0]);

    let south = vertices.len() as u32 - 1;
    let ring = |r: u32, s: u32| 1 + (r - 1) * segments + s % segments;
    let mut faces = Vec::new();
    for s in 0..segments {
        faces.push([0, ring(1, s), ring(1, s + 1)]);
        faces.push([south, ring(rings - 1, s + 1), ring(rings - 1, s)]);
    }
    for r in 1..rings - 1 {
        for s in 0..segments {
            let (a, b) = (ring(r, s), ring(r, s + 1));
            let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
            faces.push([a, c, b]);
            faces.push([b, c, d]);
        }
    }
    (vertices, faces)
}
