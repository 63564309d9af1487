//! Minimal glTF 2.0 reader for the facial-animation subset of an avatar.
//!
//! Accepts either a binary GLB container or a plain `.gltf` JSON document and
//! extracts mesh nodes with their blend-shape names (`extras.targetNames`, the
//! convention used by Ready Player Me and most exporters) and every node's rest
//! rotation. Buffers, accessors and materials are left to the renderer.

use crate::avatar::{AvatarScene, MeshNode, Rotation, SceneNode};
use crate::error::{AvatarError, Result};
use serde::Deserialize;
use tracing::debug;

/// `glTF` in little-endian.
const GLB_MAGIC: u32 = 0x4654_6C67;
/// `JSON` chunk type.
const CHUNK_JSON: u32 = 0x4E4F_534A;
const GLB_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GltfDocument {
    nodes: Vec<GltfNode>,
    meshes: Vec<GltfMesh>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GltfNode {
    name: Option<String>,
    mesh: Option<usize>,
    rotation: Option<[f32; 4]>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GltfMesh {
    name: Option<String>,
    primitives: Vec<GltfPrimitive>,
    weights: Vec<f32>,
    extras: Option<GltfMeshExtras>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GltfPrimitive {
    targets: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GltfMeshExtras {
    #[serde(rename = "targetNames")]
    target_names: Vec<String>,
}

/// Parse a GLB container or glTF JSON document into an [`AvatarScene`].
///
/// # Errors
///
/// Returns [`AvatarError::Asset`] for a truncated or malformed container or
/// JSON that is not a glTF document.
pub fn parse_asset(bytes: &[u8]) -> Result<AvatarScene> {
    if bytes.len() >= 4 && read_u32(bytes, 0) == Some(GLB_MAGIC) {
        parse_glb(bytes)
    } else {
        parse_gltf_json(bytes)
    }
}

/// Parse a binary GLB container.
///
/// # Errors
///
/// Returns [`AvatarError::Asset`] if the header, chunk table or JSON chunk is invalid.
pub fn parse_glb(bytes: &[u8]) -> Result<AvatarScene> {
    if bytes.len() < GLB_HEADER_LEN + CHUNK_HEADER_LEN {
        return Err(AvatarError::Asset(format!(
            "GLB too short: {} bytes",
            bytes.len()
        )));
    }
    if read_u32(bytes, 0) != Some(GLB_MAGIC) {
        return Err(AvatarError::Asset("not a GLB container (bad magic)".into()));
    }
    let version = read_u32(bytes, 4).unwrap_or_default();
    if version != 2 {
        return Err(AvatarError::Asset(format!(
            "unsupported GLB version {version}"
        )));
    }
    let declared = read_u32(bytes, 8).unwrap_or_default() as usize;
    if declared > bytes.len() {
        return Err(AvatarError::Asset(format!(
            "GLB declares {declared} bytes but only {} present",
            bytes.len()
        )));
    }

    let chunk_len = read_u32(bytes, GLB_HEADER_LEN).unwrap_or_default() as usize;
    let chunk_type = read_u32(bytes, GLB_HEADER_LEN + 4).unwrap_or_default();
    if chunk_type != CHUNK_JSON {
        return Err(AvatarError::Asset(format!(
            "first GLB chunk must be JSON, found type {chunk_type:#010x}"
        )));
    }
    let start = GLB_HEADER_LEN + CHUNK_HEADER_LEN;
    let json = start
        .checked_add(chunk_len)
        .and_then(|end| bytes.get(start..end))
        .ok_or_else(|| AvatarError::Asset("GLB JSON chunk is truncated".into()))?;

    parse_gltf_json(json)
}

/// Parse a glTF JSON document.
///
/// # Errors
///
/// Returns [`AvatarError::Asset`] if the JSON is malformed.
pub fn parse_gltf_json(json: &[u8]) -> Result<AvatarScene> {
    // GLB pads the JSON chunk with trailing spaces; serde_json accepts them.
    let doc: GltfDocument = serde_json::from_slice(json)
        .map_err(|e| AvatarError::Asset(format!("invalid glTF JSON: {e}")))?;
    Ok(build_scene(&doc))
}

fn build_scene(doc: &GltfDocument) -> AvatarScene {
    let mut scene = AvatarScene::new();

    for (index, node) in doc.nodes.iter().enumerate() {
        let rest = node
            .rotation
            .map(Rotation::from_quaternion)
            .unwrap_or_default();
        let node_name = node.name.clone().unwrap_or_else(|| format!("node{index}"));
        scene.nodes.push(SceneNode::new(node_name.clone(), rest));

        let Some(mesh_index) = node.mesh else {
            continue;
        };
        let Some(mesh) = doc.meshes.get(mesh_index) else {
            debug!("node {node_name} references missing mesh {mesh_index}, skipping");
            continue;
        };

        let mut names = mesh
            .extras
            .as_ref()
            .map(|e| e.target_names.clone())
            .unwrap_or_default();
        let target_count = mesh
            .primitives
            .iter()
            .map(|p| p.targets.len())
            .max()
            .unwrap_or(0)
            .max(names.len());
        // Unnamed targets are addressable by their index, as renderers do.
        for i in names.len()..target_count {
            names.push(i.to_string());
        }

        let mesh_name = node
            .name
            .clone()
            .or_else(|| mesh.name.clone())
            .unwrap_or(node_name);
        let mut mesh_node = MeshNode::new(mesh_name, names);
        for (slot, weight) in mesh_node.influences.iter_mut().zip(&mesh.weights) {
            *slot = weight.clamp(0.0, 1.0);
        }
        scene.meshes.push(mesh_node);
    }

    scene
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Wrap a glTF JSON document in a GLB container with no binary chunk.
#[cfg(test)]
pub(crate) fn glb_from_json(json: &str) -> Vec<u8> {
    let mut chunk = json.as_bytes().to_vec();
    while chunk.len() % 4 != 0 {
        chunk.push(b' ');
    }
    let total = GLB_HEADER_LEN + CHUNK_HEADER_LEN + chunk.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&chunk);
    out
}
