//! glTF / GLB asset loading into a flat triangle mesh.

use crate::scene::{Mesh, Primitive};
use glam::{Mat4, Vec3};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("gltf: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("asset has no scene")]
    NoScene,
    #[error("asset contains no triangles")]
    Empty,
}

/// Load every triangle primitive reachable from the default scene.
///
/// Node transforms are baked into the vertex positions.
pub fn load_mesh(path: &Path) -> Result<Mesh, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::NotFound(path.display().to_string()));
    }

    let (document, buffers, _images) = gltf::import(path)?;
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(LoaderError::NoScene)?;

    let mut mesh = Mesh::default();
    for node in scene.nodes() {
        collect_node(&node, Mat4::IDENTITY, &buffers, &mut mesh);
    }

    if mesh.triangle_count() == 0 {
        return Err(LoaderError::Empty);
    }

    tracing::info!(
        path = %path.display(),
        primitives = mesh.primitives.len(),
        triangles = mesh.triangle_count(),
        "loaded overlay asset"
    );
    Ok(mesh)
}

fn collect_node(node: &gltf::Node, parent: Mat4, buffers: &[gltf::buffer::Data], out: &mut Mesh) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(gltf_mesh) = node.mesh() {
        for primitive in gltf_mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                tracing::debug!(mode = ?primitive.mode(), "skipping non-triangle primitive");
                continue;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<Vec3> = positions
                .map(|p| world.transform_point3(Vec3::from_array(p)))
                .collect();
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            let base_color = primitive.material().pbr_metallic_roughness().base_color_factor();

            out.primitives.push(Primitive { positions, indices, base_color });
        }
    }

    for child in node.children() {
        collect_node(&child, world, buffers, out);
    }
}
