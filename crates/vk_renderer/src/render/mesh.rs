//! CPU-side geometry
//!
//! Pure data with no graphics API types; the Vulkan input layout lives in
//! `render::vulkan::vertex_layout`.

use bytemuck::{Pod, Zeroable};

/// Interleaved vertex as consumed by the scene vertex shader
///
/// `#[repr(C)]` keeps the 32-byte layout stable for buffer uploads.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],

    /// Vertex color
    pub color: [f32; 3],

    /// Texture coordinates, origin at the top-left of the image
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }
}

/// Indexed triangle list ready for upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Unique vertices
    pub vertices: Vec<Vertex>,
    /// Three indices per triangle
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Create a mesh from vertices and triangle indices
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Number of indices to draw
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Whether every index refers to an existing vertex and the triangle count is whole
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty()
            && self.indices.len() % 3 == 0
            && self.indices.iter().all(|&i| (i as usize) < self.vertices.len())
    }
}
