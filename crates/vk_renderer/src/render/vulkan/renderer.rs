//! Scene renderer
//!
//! [`VulkanRenderer`] owns the device context and everything built on it. Device-level
//! objects and uploaded models live for the whole run; the [`SwapchainTargetSet`] is
//! replaced whenever the surface changes.

use ash::vk;
use std::panic::Location;

use crate::assets::ImageData;
use crate::config::ViewerConfig;
use crate::foundation::math::Mat4;
use crate::render::camera::OrbitCamera;
use crate::render::mesh::MeshData;
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::{VkResultExt, VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::descriptors::{scene_layout_builder, DescriptorPool, DescriptorSetLayout};
use crate::render::vulkan::frame::{AcquireOutcome, PresentOutcome, PresentationBackend};
use crate::render::vulkan::framebuffer::select_sample_count;
use crate::render::vulkan::image::find_depth_format;
use crate::render::vulkan::model::{GpuModel, Transform};
use crate::render::vulkan::shader::ShaderModule;
use crate::render::vulkan::sync::FrameSync;
use crate::render::vulkan::target_set::{SwapchainTargetSet, TargetSetDesc};
use crate::render::vulkan::window::Window;
use crate::render::RenderResult;

/// Renderer owning the device, the scene and the current swapchain targets
///
/// Fields drop top to bottom after `Drop` has waited for the device: swapchain targets
/// first, the device context last.
pub struct VulkanRenderer {
    target_set: SwapchainTargetSet,
    models: Vec<GpuModel>,
    descriptor_pool: DescriptorPool,
    fragment_shader: ShaderModule,
    vertex_shader: ShaderModule,
    set_layout: DescriptorSetLayout,
    sync: FrameSync,
    command_pool: CommandPool,
    context: VulkanContext,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
    clear_color: [f32; 4],
    requested_extent: vk::Extent2D,
    rebuild_requested: bool,
    view: Mat4,
    projection: Mat4,
}

impl VulkanRenderer {
    /// Create the device, load and upload every configured model, and build the
    /// first swapchain target set
    pub fn new(window: &mut Window, config: &ViewerConfig) -> RenderResult<Self> {
        let render = &config.render;
        let context = VulkanContext::new(
            window,
            &config.window.title,
            render.validation,
            render.anisotropy_requested(),
        )?;
        let device = context.device().clone();

        let command_pool = CommandPool::new(device.clone(), context.queue_families().graphics)?;
        let sync = FrameSync::new(&device)?;
        let set_layout = scene_layout_builder().build(&device)?;
        let vertex_shader = ShaderModule::from_file(device.clone(), &config.shaders.vertex)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), &config.shaders.fragment)?;

        let depth_format = find_depth_format(context.instance(), context.physical_device().device)?;
        let limits = &context.physical_device().properties.limits;
        let samples = select_sample_count(
            limits.framebuffer_color_sample_counts,
            limits.framebuffer_depth_sample_counts,
            render.max_msaa_samples,
        );
        log::info!("Depth format {depth_format:?}, {samples:?}");

        let descriptor_pool = DescriptorPool::new(device, config.models.len() as u32)?;
        let sampler = render.sampler_settings();

        let mut models = Vec::with_capacity(config.models.len());
        for model in &config.models {
            let mesh = MeshData::load_obj(&model.mesh)?;
            let image = ImageData::from_file(&model.texture)?;
            models.push(GpuModel::upload(
                &context,
                &command_pool,
                &descriptor_pool,
                &set_layout,
                &mesh,
                &image,
                &sampler,
                Transform::from_arrays(model.position, model.scale),
            )?);
            log::info!(
                "Loaded {} ({} vertices, {} indices) with {} ({}x{})",
                model.mesh.display(),
                mesh.vertices.len(),
                mesh.indices.len(),
                model.texture.display(),
                image.width,
                image.height
            );
        }

        let (width, height) = window.get_framebuffer_size();
        let requested_extent = vk::Extent2D { width, height };
        let mut camera = OrbitCamera::from_config(&config.camera, 1.0);
        camera.set_aspect(width, height);
        let target_set = SwapchainTargetSet::new(
            &context,
            &command_pool,
            &TargetSetDesc {
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                set_layout: set_layout.handle(),
                depth_format,
                samples,
                clear_color: render.clear_color,
            },
            &models,
            requested_extent,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            target_set,
            models,
            descriptor_pool,
            fragment_shader,
            vertex_shader,
            set_layout,
            sync,
            command_pool,
            context,
            depth_format,
            samples,
            clear_color: render.clear_color,
            requested_extent,
            rebuild_requested: false,
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
        })
    }

    /// Replace the swapchain target set for the latest framebuffer size
    ///
    /// The replacement is fully built before the present queue is drained and the old
    /// set dropped. A zero-sized surface defers the rebuild and returns `false`.
    pub fn recreate_swapchain(&mut self) -> VulkanResult<bool> {
        let capabilities = self
            .context
            .surface()
            .capabilities(self.context.physical_device().device)?;
        let surface_empty = capabilities.current_extent.width == 0 || capabilities.current_extent.height == 0;
        if surface_empty || self.requested_extent.width == 0 || self.requested_extent.height == 0 {
            log::debug!("Surface has zero area, deferring swapchain rebuild");
            self.rebuild_requested = true;
            return Ok(false);
        }

        let replacement = SwapchainTargetSet::new(
            &self.context,
            &self.command_pool,
            &TargetSetDesc {
                vertex_shader: &self.vertex_shader,
                fragment_shader: &self.fragment_shader,
                set_layout: self.set_layout.handle(),
                depth_format: self.depth_format,
                samples: self.samples,
                clear_color: self.clear_color,
            },
            &self.models,
            self.requested_extent,
            self.target_set.swapchain().handle(),
        )?;

        unsafe { self.context.device().queue_wait_idle(self.context.present_queue()) }.check("vkQueueWaitIdle")?;
        self.target_set = replacement;

        log::debug!(
            "Swapchain rebuilt at {}x{}",
            self.target_set.extent().width,
            self.target_set.extent().height
        );
        Ok(true)
    }

    /// Record a new framebuffer size; the frame loop rebuilds after the next present
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        self.requested_extent = vk::Extent2D { width, height };
        self.rebuild_requested = true;
    }

    /// Take the camera's view and projection for the next frame
    ///
    /// Uniform buffers are only written by the frame loop, once the device is idle.
    pub fn set_camera(&mut self, camera: &OrbitCamera) {
        self.view = camera.view_matrix();
        self.projection = camera.projection_matrix();
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.target_set.extent()
    }

    /// Current swapchain target set
    pub fn target_set(&self) -> &SwapchainTargetSet {
        &self.target_set
    }

    /// Uploaded models in draw order
    pub fn models(&self) -> &[GpuModel] {
        &self.models
    }

    /// Device context
    pub fn context(&self) -> &VulkanContext {
        &self.context
    }

    /// Rasterization samples in use
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }
}

impl PresentationBackend for VulkanRenderer {
    fn wait_present_idle(&mut self) -> VulkanResult<()> {
        unsafe { self.context.device().queue_wait_idle(self.context.present_queue()) }.check("vkQueueWaitIdle")
    }

    fn prepare_frame(&mut self) -> VulkanResult<()> {
        for model in &self.models {
            model.update_uniforms(&self.view, &self.projection)?;
        }
        Ok(())
    }

    fn acquire_next_image(&mut self) -> VulkanResult<AcquireOutcome> {
        let acquired = unsafe {
            self.context.swapchain_loader().acquire_next_image(
                self.target_set.swapchain().handle(),
                u64::MAX,
                self.sync.image_available.handle(),
                vk::Fence::null(),
            )
        };

        match acquired {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(result) => Err(VulkanError::Api {
                call: "vkAcquireNextImageKHR",
                result,
                location: Location::caller(),
            }),
        }
    }

    fn submit(&mut self, image_index: u32) -> VulkanResult<()> {
        let command_buffer =
            self.target_set
                .command_buffer(image_index)
                .ok_or_else(|| VulkanError::InvalidOperation {
                    reason: format!("No command buffer for swapchain image {image_index}"),
                })?;

        let wait_semaphores = [self.sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [self.sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.context
                .device()
                .queue_submit(self.context.graphics_queue(), &[submit_info], vk::Fence::null())
        }
        .check("vkQueueSubmit")
    }

    fn present(&mut self, image_index: u32) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [self.sync.render_finished.handle()];
        let swapchains = [self.target_set.swapchain().handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe {
            self.context
                .swapchain_loader()
                .queue_present(self.context.present_queue(), &present_info)
        };

        match presented {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(result) => Err(VulkanError::Api {
                call: "vkQueuePresentKHR",
                result,
                location: Location::caller(),
            }),
        }
    }

    fn rebuild(&mut self) -> VulkanResult<bool> {
        self.rebuild_requested = false;
        self.recreate_swapchain()
    }

    fn take_resize_request(&mut self) -> bool {
        std::mem::take(&mut self.rebuild_requested)
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle during shutdown: {e}");
        }
    }
}
