//! Foundation module - core utilities shared by the renderer and the viewer
//!
//! - Math types and Vulkan-convention matrices
//! - Frame timing and rate limiting
//! - Logging setup

pub mod logging;
pub mod math;
pub mod time;
