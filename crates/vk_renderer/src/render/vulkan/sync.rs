//! Semaphores for ordering acquire, render and present on the GPU
//!
//! The frame loop keeps a single frame in flight and serializes submission behind
//! `queue_wait_idle`, so no fences are needed.

use ash::{vk, Device};

use crate::render::vulkan::context::{VkResultExt, VulkanResult};

/// Binary semaphore with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe { device.create_semaphore(&create_info, None) }.check("vkCreateSemaphore")?;

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// The two semaphores of the single frame in flight
pub struct FrameSync {
    /// Signaled by image acquisition, waited on by the draw submission
    pub image_available: Semaphore,
    /// Signaled by the draw submission, waited on by presentation
    pub render_finished: Semaphore,
}

impl FrameSync {
    /// Create frame synchronization objects
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
        })
    }
}
