//! Rendering
//!
//! CPU-side geometry and the orbit camera are API-independent; everything that touches
//! the device lives under [`vulkan`].

pub mod camera;
pub mod mesh;
pub mod vulkan;

pub use camera::{OrbitCamera, UniformBufferObject};
pub use mesh::{MeshData, Vertex};

use thiserror::Error;

use crate::assets::AssetError;
use vulkan::{VulkanError, WindowError};

/// Errors from building or running the renderer
#[derive(Error, Debug)]
pub enum RenderError {
    /// Vulkan call or capability failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// A mesh or texture could not be loaded
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Window system failure
    #[error(transparent)]
    Window(#[from] WindowError),
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;
