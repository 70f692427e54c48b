//! Vulkan rendering backend
//!
//! RAII wrappers over `ash` handles, the swapchain target set, the frame state machine
//! and the renderer tying them together.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptors;
pub mod frame;
pub mod framebuffer;
pub mod image;
pub mod model;
pub mod render_pass;
pub mod renderer;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod target_set;
pub mod texture;
pub mod vertex_layout;
pub mod window;

pub use buffer::{Buffer, UniformBuffer};
pub use commands::{CommandPool, CommandRecorder, SingleTimeCommands};
pub use context::{VkResultExt, VulkanContext, VulkanError, VulkanResult};
pub use frame::{AcquireOutcome, FrameLoop, FrameOutcome, FrameStats, PresentOutcome, PresentationBackend};
pub use image::{Image, ImageDesc, LayoutTransition};
pub use model::{GpuModel, Transform};
pub use renderer::VulkanRenderer;
pub use swapchain::{Swapchain, SwapchainPlan};
pub use target_set::SwapchainTargetSet;
pub use texture::{AddressMode, MipChainPlan, SamplerSettings, Texture};
pub use window::{Window, WindowError};
