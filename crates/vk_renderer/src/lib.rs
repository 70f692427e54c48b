//! # vk_renderer
//!
//! A minimal Vulkan scene renderer: textured, mip-mapped, optionally multisampled models
//! viewed through an orbit camera.
//!
//! The interesting part is the resource lifecycle. Device-level objects and uploaded
//! models are created once; everything that depends on the swapchain is grouped in a
//! [`SwapchainTargetSet`](render::vulkan::SwapchainTargetSet) that is rebuilt whenever
//! the surface goes out of date. Frames are strictly sequential: the
//! [`FrameLoop`](render::vulkan::FrameLoop) waits for the present queue before touching
//! anything, uniform buffers included, so there is never more than one frame in flight.
//!
//! ```rust,no_run
//! use vk_renderer::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ViewerConfig::default();
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let mut renderer = VulkanRenderer::new(&mut window, &config)?;
//!     let camera = OrbitCamera::from_config(&config.camera, 800.0 / 600.0);
//!     let mut frames = FrameLoop::new();
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.set_camera(&camera);
//!         frames.render_frame(&mut renderer)?;
//!     }
//!     renderer.wait_idle()?;
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        assets::{AssetError, ImageData},
        config::{Config, ConfigError, ViewerConfig},
        foundation::{
            math::{Mat4, Mat4Ext, Vec3},
            time::{FrameLimiter, Timer},
        },
        render::{
            vulkan::{FrameLoop, FrameOutcome, VulkanError, VulkanRenderer, Window, WindowError},
            MeshData, OrbitCamera, RenderError, Vertex,
        },
    };
}
