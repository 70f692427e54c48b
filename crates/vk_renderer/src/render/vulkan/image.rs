//! GPU images, image views and layout transitions
//!
//! [`Image`] bundles an image, its memory and a view, and frees all three on drop.
//! [`LayoutTransition`] is the access/stage mask table used by every barrier in the
//! renderer; unsupported layout pairs are reported instead of silently producing
//! empty masks.

use ash::{vk, Device, Instance};

use crate::render::vulkan::buffer::allocate_bound_memory;
use crate::render::vulkan::context::{VkResultExt, VulkanContext, VulkanError, VulkanResult};

/// Number of mip levels for a `width` x `height` image
///
/// `floor(log2(max(width, height))) + 1`, limited by `cap` when given. A cap of zero
/// behaves like a cap of one.
pub fn mip_levels(width: u32, height: u32, cap: Option<u32>) -> u32 {
    let largest = width.max(height).max(1);
    let natural = u32::BITS - largest.leading_zeros();
    match cap {
        Some(cap) => natural.min(cap.max(1)),
        None => natural,
    }
}

/// Whether a depth format also carries a stencil aspect
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(format, vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT)
}

/// Aspect flags for a depth attachment of the given format
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil_component(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate whose optimal-tiling features contain `features`
pub fn find_supported_format(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    candidates: &[vk::Format],
    features: vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        let properties = unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        properties.optimal_tiling_features.contains(features)
    })
}

/// Depth format usable as an optimal-tiling depth/stencil attachment
pub fn find_depth_format(instance: &Instance, physical_device: vk::PhysicalDevice) -> VulkanResult<vk::Format> {
    find_supported_format(
        instance,
        physical_device,
        &DEPTH_FORMAT_CANDIDATES,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
    .ok_or_else(|| VulkanError::InitializationFailed("No supported depth format".to_string()))
}

/// Create a 2D view over `mip_levels` levels of an image
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
    mip_levels: u32,
) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.check("vkCreateImageView")
}

/// Access and stage masks for one image layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage the transition waits on
    pub src_stage: vk::PipelineStageFlags,
    /// Stage that waits on the transition
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Look up the masks for `old -> new`
    pub fn new(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<Self> {
        let (src_access, src_stage) = match old {
            vk::ImageLayout::UNDEFINED => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
            }
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
            }
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            ),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
                (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
            }
            other => {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("Unsupported source layout {other:?}"),
                })
            }
        };

        let (dst_access, dst_stage) = match new {
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
            }
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
                (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
            }
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            ),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
                (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
            }
            other => {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("Unsupported destination layout {other:?}"),
                })
            }
        };

        Ok(Self {
            src_access,
            dst_access,
            src_stage,
            dst_stage,
        })
    }
}

/// Record a layout transition barrier for `range` of `image`
pub fn cmd_transition_image_layout(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    range: vk::ImageSubresourceRange,
) -> VulkanResult<()> {
    let masks = LayoutTransition::new(old_layout, new_layout)?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
    Ok(())
}

/// Parameters for a device-local 2D image
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Width and height in pixels
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Mip level count
    pub mip_levels: u32,
    /// Samples per texel
    pub samples: vk::SampleCountFlags,
    /// How the image will be used
    pub usage: vk::ImageUsageFlags,
    /// Aspect the view covers
    pub aspect: vk::ImageAspectFlags,
}

/// Device-local image with bound memory and a view, freed on drop
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    desc: ImageDesc,
}

impl Image {
    /// Create the image, allocate and bind device-local memory, and create its view
    pub fn new(context: &VulkanContext, desc: ImageDesc) -> VulkanResult<Self> {
        let device = context.device().clone();

        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(desc.samples);

        let image = unsafe { device.create_image(&image_create_info, None) }.check("vkCreateImage")?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let bound = allocate_bound_memory(context, requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL, |memory| {
            unsafe { device.bind_image_memory(image, memory, 0) }.check("vkBindImageMemory")
        });
        let memory = match bound {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = match create_image_view(&device, image, desc.format, desc.aspect, desc.mip_levels) {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            device,
            image,
            memory,
            view,
            desc,
        })
    }

    /// Get the image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Get the view covering every mip level
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Device that owns the image
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Get the creation parameters
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    /// Subresource range covering every mip level of the view's aspect
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.desc.aspect,
            base_mip_level: 0,
            level_count: self.desc.mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_levels_natural() {
        assert_eq!(mip_levels(1, 1, None), 1);
        assert_eq!(mip_levels(2, 1, None), 2);
        assert_eq!(mip_levels(512, 512, None), 10);
        assert_eq!(mip_levels(1024, 300, None), 11);
        assert_eq!(mip_levels(300, 1023, None), 10);
        assert_eq!(mip_levels(0, 0, None), 1);
    }

    #[test]
    fn test_mip_levels_capped() {
        assert_eq!(mip_levels(512, 512, Some(1)), 1);
        assert_eq!(mip_levels(512, 512, Some(4)), 4);
        assert_eq!(mip_levels(16, 16, Some(32)), 5);
        assert_eq!(mip_levels(512, 512, Some(0)), 1);
    }

    #[test]
    fn test_mip_levels_matches_log2_formula() {
        for (w, h) in [(3, 7), (640, 480), (4096, 1), (1, 4095), (1920, 1080)] {
            let expected = f64::from(w.max(h)).log2().floor() as u32 + 1;
            assert_eq!(mip_levels(w, h, None), expected, "{w}x{h}");
        }
    }

    #[test]
    fn test_stencil_formats() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_upload_transitions() {
        use vk::ImageLayout as L;

        let to_dst = LayoutTransition::new(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(to_dst.src_access, vk::AccessFlags::empty());
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let dst_to_src = LayoutTransition::new(L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL).unwrap();
        assert_eq!(dst_to_src.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst_to_src.dst_access, vk::AccessFlags::TRANSFER_READ);

        let to_shader = LayoutTransition::new(L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(to_shader.src_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(to_shader.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_shader.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_depth_transition() {
        let masks = LayoutTransition::new(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert!(masks.dst_access.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn test_every_used_pair_has_nonempty_stages() {
        use vk::ImageLayout as L;
        let sources = [
            L::UNDEFINED,
            L::TRANSFER_SRC_OPTIMAL,
            L::TRANSFER_DST_OPTIMAL,
            L::COLOR_ATTACHMENT_OPTIMAL,
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
        ];
        let destinations = [
            L::TRANSFER_DST_OPTIMAL,
            L::TRANSFER_SRC_OPTIMAL,
            L::COLOR_ATTACHMENT_OPTIMAL,
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
        ];
        for old in sources {
            for new in destinations {
                let masks = LayoutTransition::new(old, new).unwrap();
                assert!(!masks.src_stage.is_empty(), "{old:?} -> {new:?}");
                assert!(!masks.dst_stage.is_empty(), "{old:?} -> {new:?}");
                assert!(!masks.dst_access.is_empty(), "{old:?} -> {new:?}");
            }
        }
    }

    #[test]
    fn test_unsupported_layouts_rejected() {
        assert!(LayoutTransition::new(vk::ImageLayout::PRESENT_SRC_KHR, vk::ImageLayout::TRANSFER_DST_OPTIMAL).is_err());
        assert!(LayoutTransition::new(vk::ImageLayout::UNDEFINED, vk::ImageLayout::UNDEFINED).is_err());
    }
}
