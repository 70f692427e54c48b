//! Everything that depends on the swapchain
//!
//! A [`SwapchainTargetSet`] is built as a unit and replaced as a unit: swapchain and
//! image views, attachments, render pass, pipeline, framebuffers and the prerecorded
//! command buffers. The renderer builds the replacement while the old set is still
//! alive, waits for the present queue, then drops the old one.

use ash::{vk, Device};

use crate::render::vulkan::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::context::{VulkanContext, VulkanResult};
use crate::render::vulkan::framebuffer::{AttachmentTargets, Framebuffer};
use crate::render::vulkan::model::GpuModel;
use crate::render::vulkan::render_pass::{clear_values, RenderPass};
use crate::render::vulkan::shader::{GraphicsPipeline, ShaderModule};
use crate::render::vulkan::swapchain::Swapchain;

/// Inputs that stay fixed across rebuilds
pub struct TargetSetDesc<'a> {
    /// Compiled vertex stage
    pub vertex_shader: &'a ShaderModule,
    /// Compiled fragment stage
    pub fragment_shader: &'a ShaderModule,
    /// Layout of every model's descriptor set
    pub set_layout: vk::DescriptorSetLayout,
    /// Negotiated depth format
    pub depth_format: vk::Format,
    /// Rasterization samples
    pub samples: vk::SampleCountFlags,
    /// Color the frame is cleared to
    pub clear_color: [f32; 4],
}

/// Swapchain and every object sized or formatted after it
///
/// Command buffers are freed in `Drop`; the remaining fields then drop top to bottom,
/// so the swapchain goes last.
pub struct SwapchainTargetSet {
    device: Device,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    attachments: AttachmentTargets,
    swapchain: Swapchain,
}

impl SwapchainTargetSet {
    /// Build a complete set for `requested_extent` and record draws for `models`
    ///
    /// `old_swapchain` is the handle being replaced, or null on first creation.
    pub fn new(
        context: &VulkanContext,
        command_pool: &CommandPool,
        desc: &TargetSetDesc<'_>,
        models: &[GpuModel],
        requested_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let device = context.device().clone();

        let swapchain = Swapchain::new(context, requested_extent, old_swapchain)?;
        let color_format = swapchain.format().format;
        let extent = swapchain.extent();

        let attachments = AttachmentTargets::new(
            context,
            command_pool,
            color_format,
            desc.depth_format,
            extent,
            desc.samples,
        )?;

        let render_pass = RenderPass::new(device.clone(), color_format, desc.depth_format, desc.samples)?;

        let pipeline = GraphicsPipeline::new(
            device.clone(),
            render_pass.handle(),
            desc.vertex_shader,
            desc.fragment_shader,
            desc.set_layout,
            extent,
            desc.samples,
        )?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    device.clone(),
                    render_pass.handle(),
                    &attachments.framebuffer_attachments(view),
                    extent,
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let mut target_set = Self {
            device,
            command_pool: command_pool.handle(),
            command_buffers: Vec::new(),
            framebuffers,
            pipeline,
            render_pass,
            attachments,
            swapchain,
        };
        target_set.command_buffers = command_pool.allocate_command_buffers(target_set.image_count() as u32)?;
        target_set.record_commands(models, desc.clear_color)?;
        debug_assert!(target_set.is_consistent());

        log::info!(
            "Swapchain targets ready: {} images, {}x{}, {:?}, {:?}",
            target_set.image_count(),
            extent.width,
            extent.height,
            color_format,
            desc.samples
        );

        Ok(target_set)
    }

    fn record_commands(&self, models: &[GpuModel], clear_color: [f32; 4]) -> VulkanResult<()> {
        let clears = clear_values(self.attachments.samples(), clear_color);
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.swapchain.extent(),
        };

        for (&command_buffer, framebuffer) in self.command_buffers.iter().zip(&self.framebuffers) {
            let mut recorder = CommandRecorder::new(command_buffer, self.device.clone());
            recorder.begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
            {
                let mut pass =
                    recorder.begin_render_pass(self.render_pass.handle(), framebuffer.handle(), render_area, &clears)?;
                pass.cmd_bind_pipeline(self.pipeline.handle());
                for model in models {
                    model.record_draw(&mut pass, self.pipeline.layout());
                }
            }
            recorder.end()?;
        }

        log::debug!(
            "Recorded {} command buffers for {} models",
            self.command_buffers.len(),
            models.len()
        );
        Ok(())
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Whether the per-image arrays all have one entry per swapchain image
    pub fn is_consistent(&self) -> bool {
        let n = self.swapchain.image_count();
        self.swapchain.image_views().len() == n && self.framebuffers.len() == n && self.command_buffers.len() == n
    }

    /// Prerecorded command buffer for swapchain image `index`
    pub fn command_buffer(&self, index: u32) -> Option<vk::CommandBuffer> {
        self.command_buffers.get(index as usize).copied()
    }

    /// The swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Current extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Rasterization samples of this set
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.attachments.samples()
    }
}

impl Drop for SwapchainTargetSet {
    fn drop(&mut self) {
        if !self.command_buffers.is_empty() {
            unsafe {
                self.device
                    .free_command_buffers(self.command_pool, &self.command_buffers);
            }
        }
    }
}
