//! Framebuffers and the shared depth / multisample attachments behind them

use ash::{vk, Device};

use crate::render::vulkan::commands::{CommandPool, SingleTimeCommands};
use crate::render::vulkan::context::{VkResultExt, VulkanContext, VulkanResult};
use crate::render::vulkan::image::{cmd_transition_image_layout, depth_aspect, Image, ImageDesc};

/// Highest sample count supported for both color and depth, not above `cap`
///
/// `cap` values that are not a power of two round down; zero behaves like one.
pub fn select_sample_count(
    color_counts: vk::SampleCountFlags,
    depth_counts: vk::SampleCountFlags,
    cap: u32,
) -> vk::SampleCountFlags {
    let supported = color_counts & depth_counts;
    [
        (64, vk::SampleCountFlags::TYPE_64),
        (32, vk::SampleCountFlags::TYPE_32),
        (16, vk::SampleCountFlags::TYPE_16),
        (8, vk::SampleCountFlags::TYPE_8),
        (4, vk::SampleCountFlags::TYPE_4),
        (2, vk::SampleCountFlags::TYPE_2),
    ]
    .into_iter()
    .find(|&(count, flag)| count <= cap && supported.contains(flag))
    .map_or(vk::SampleCountFlags::TYPE_1, |(_, flag)| flag)
}

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer over `attachments` in render pass order
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer =
            unsafe { device.create_framebuffer(&framebuffer_create_info, None) }.check("vkCreateFramebuffer")?;

        Ok(Self { device, framebuffer })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Multisample color and depth; the single-sample depth doubles as their resolve slot
struct MultisampleTargets {
    color: Image,
    depth: Image,
}

/// Attachments shared by every framebuffer of one swapchain
pub struct AttachmentTargets {
    depth: Image,
    multisample: Option<MultisampleTargets>,
    samples: vk::SampleCountFlags,
}

impl AttachmentTargets {
    /// Allocate depth (and multisample) attachments for `extent`
    pub fn new(
        context: &VulkanContext,
        command_pool: &CommandPool,
        color_format: vk::Format,
        depth_format: vk::Format,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let depth_desc = |samples| ImageDesc {
            extent,
            format: depth_format,
            mip_levels: 1,
            samples,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: depth_aspect(depth_format),
        };

        let multisample = if samples == vk::SampleCountFlags::TYPE_1 {
            None
        } else {
            let color = Image::new(
                context,
                ImageDesc {
                    extent,
                    format: color_format,
                    mip_levels: 1,
                    samples,
                    usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                    aspect: vk::ImageAspectFlags::COLOR,
                },
            )?;
            let depth = Image::new(context, depth_desc(samples))?;
            Some(MultisampleTargets { color, depth })
        };

        let depth = Image::new(context, depth_desc(vk::SampleCountFlags::TYPE_1))?;

        let commands = SingleTimeCommands::begin(context, command_pool)?;
        let mut depth_images = vec![&depth];
        if let Some(targets) = &multisample {
            depth_images.push(&targets.depth);
        }
        for image in depth_images {
            cmd_transition_image_layout(
                commands.device(),
                commands.command_buffer(),
                image.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                image.full_range(),
            )?;
        }
        commands.submit_and_wait()?;

        log::debug!(
            "Attachments ready: {}x{}, depth {:?}, {:?}",
            extent.width,
            extent.height,
            depth_format,
            samples
        );

        Ok(Self {
            depth,
            multisample,
            samples,
        })
    }

    /// Rasterization samples of the color and depth attachments
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Framebuffer attachments for one swapchain image, in render pass order
    pub fn framebuffer_attachments(&self, swapchain_view: vk::ImageView) -> Vec<vk::ImageView> {
        match &self.multisample {
            None => vec![swapchain_view, self.depth.view()],
            Some(targets) => vec![
                targets.color.view(),
                swapchain_view,
                targets.depth.view(),
                self.depth.view(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(bits: &[vk::SampleCountFlags]) -> vk::SampleCountFlags {
        bits.iter().fold(vk::SampleCountFlags::empty(), |acc, &flag| acc | flag)
    }

    #[test]
    fn test_sample_count_respects_cap() {
        let all = counts(&[
            vk::SampleCountFlags::TYPE_1,
            vk::SampleCountFlags::TYPE_2,
            vk::SampleCountFlags::TYPE_4,
            vk::SampleCountFlags::TYPE_8,
        ]);
        assert_eq!(select_sample_count(all, all, 4), vk::SampleCountFlags::TYPE_4);
        assert_eq!(select_sample_count(all, all, 64), vk::SampleCountFlags::TYPE_8);
        assert_eq!(select_sample_count(all, all, 1), vk::SampleCountFlags::TYPE_1);
        assert_eq!(select_sample_count(all, all, 0), vk::SampleCountFlags::TYPE_1);
        assert_eq!(select_sample_count(all, all, 6), vk::SampleCountFlags::TYPE_4);
    }

    #[test]
    fn test_sample_count_uses_color_depth_intersection() {
        let color = counts(&[
            vk::SampleCountFlags::TYPE_1,
            vk::SampleCountFlags::TYPE_2,
            vk::SampleCountFlags::TYPE_8,
        ]);
        let depth = counts(&[
            vk::SampleCountFlags::TYPE_1,
            vk::SampleCountFlags::TYPE_2,
            vk::SampleCountFlags::TYPE_4,
        ]);
        assert_eq!(select_sample_count(color, depth, 8), vk::SampleCountFlags::TYPE_2);
    }

    #[test]
    fn test_sample_count_falls_back_to_one() {
        let single = vk::SampleCountFlags::TYPE_1;
        assert_eq!(select_sample_count(single, single, 16), vk::SampleCountFlags::TYPE_1);
    }
}
