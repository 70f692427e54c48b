//! Render pass management
//!
//! Single-sample forward pass presenting straight from the color attachment, or a
//! multisampled pass that resolves into the swapchain image.

use ash::{vk, Device};

use crate::render::vulkan::context::{VkResultExt, VulkanResult};

/// Attachment slot of the swapchain image in a single-sample pass
pub const FORWARD_COLOR_ATTACHMENT: u32 = 0;

/// Attachment descriptions in framebuffer order
///
/// Single sample: `[color, depth]`. Multisampled:
/// `[msaa_color, resolve_color, msaa_depth, resolve_depth]`.
pub fn attachment_descriptions(
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> Vec<vk::AttachmentDescription> {
    let depth = |samples, store_op| {
        vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(store_op)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build()
    };

    let presented_color = |load_op| {
        vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build()
    };

    if samples == vk::SampleCountFlags::TYPE_1 {
        return vec![
            presented_color(vk::AttachmentLoadOp::CLEAR),
            depth(vk::SampleCountFlags::TYPE_1, vk::AttachmentStoreOp::DONT_CARE),
        ];
    }

    let msaa_color = vk::AttachmentDescription::builder()
        .format(color_format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let mut resolve_depth = depth(vk::SampleCountFlags::TYPE_1, vk::AttachmentStoreOp::STORE);
    resolve_depth.load_op = vk::AttachmentLoadOp::DONT_CARE;

    vec![
        msaa_color,
        presented_color(vk::AttachmentLoadOp::DONT_CARE),
        depth(samples, vk::AttachmentStoreOp::DONT_CARE),
        resolve_depth,
    ]
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
    samples: vk::SampleCountFlags,
}

impl RenderPass {
    /// Create the scene pass for `samples` rasterization samples
    pub fn new(
        device: Device,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let attachments = attachment_descriptions(color_format, depth_format, samples);
        let multisampled = samples != vk::SampleCountFlags::TYPE_1;

        let color_attachment_ref = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let resolve_attachment_ref = [vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_attachment_ref = vk::AttachmentReference {
            attachment: if multisampled { 2 } else { 1 },
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachment_ref)
            .depth_stencil_attachment(&depth_attachment_ref);
        if multisampled {
            subpass = subpass.resolve_attachments(&resolve_attachment_ref);
        }
        let subpasses = [subpass.build()];

        let dependencies = if multisampled {
            vec![
                vk::SubpassDependency::builder()
                    .src_subpass(vk::SUBPASS_EXTERNAL)
                    .dst_subpass(0)
                    .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
                    .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .src_access_mask(vk::AccessFlags::MEMORY_READ)
                    .dst_access_mask(
                        vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    )
                    .dependency_flags(vk::DependencyFlags::BY_REGION)
                    .build(),
                vk::SubpassDependency::builder()
                    .src_subpass(0)
                    .dst_subpass(vk::SUBPASS_EXTERNAL)
                    .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
                    .src_access_mask(
                        vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    )
                    .dst_access_mask(vk::AccessFlags::MEMORY_READ)
                    .dependency_flags(vk::DependencyFlags::BY_REGION)
                    .build(),
            ]
        } else {
            vec![vk::SubpassDependency::builder()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                )
                .build()]
        };

        let render_pass_create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass =
            unsafe { device.create_render_pass(&render_pass_create_info, None) }.check("vkCreateRenderPass")?;

        Ok(Self {
            device,
            render_pass,
            samples,
        })
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Rasterization samples the pass was built for
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Clear values matching [`attachment_descriptions`] order
pub fn clear_values(samples: vk::SampleCountFlags, clear_color: [f32; 4]) -> Vec<vk::ClearValue> {
    let color = vk::ClearValue {
        color: vk::ClearColorValue { float32: clear_color },
    };
    let depth = vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
    };

    if samples == vk::SampleCountFlags::TYPE_1 {
        vec![color, depth]
    } else {
        vec![color, color, depth, depth]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLOR: vk::Format = vk::Format::B8G8R8A8_UNORM;
    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    #[test]
    fn test_single_sample_attachments() {
        let attachments = attachment_descriptions(COLOR, DEPTH, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachments.len(), 2);

        let color = attachments[FORWARD_COLOR_ATTACHMENT as usize];
        assert_eq!(color.format, COLOR);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let depth = attachments[1];
        assert_eq!(depth.format, DEPTH);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_msaa_attachments() {
        let samples = vk::SampleCountFlags::TYPE_4;
        let attachments = attachment_descriptions(COLOR, DEPTH, samples);
        assert_eq!(attachments.len(), 4);

        assert_eq!(attachments[0].samples, samples);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        assert_eq!(attachments[1].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachments[1].load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(attachments[1].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        assert_eq!(attachments[2].samples, samples);
        assert_eq!(attachments[2].load_op, vk::AttachmentLoadOp::CLEAR);

        assert_eq!(attachments[3].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachments[3].load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(attachments[3].store_op, vk::AttachmentStoreOp::STORE);
    }

    #[test]
    fn test_one_clear_value_per_attachment() {
        for samples in [vk::SampleCountFlags::TYPE_1, vk::SampleCountFlags::TYPE_8] {
            assert_eq!(
                clear_values(samples, [0.0, 0.0, 0.0, 1.0]).len(),
                attachment_descriptions(COLOR, DEPTH, samples).len()
            );
        }
    }
}
