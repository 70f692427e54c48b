//! Vulkan swapchain management
//!
//! Presentation parameters are derived from a live [`SurfaceSupport`] snapshot by the
//! pure `choose_*` functions below, collected into a [`SwapchainPlan`], and then
//! realized by [`Swapchain::new`].

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::vulkan::context::{QueueFamilyIndices, VkResultExt, VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::image::create_image_view;
use crate::render::vulkan::surface::SurfaceSupport;

/// Format used when the surface allows it (or expresses no preference)
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the surface format
///
/// A single `UNDEFINED` entry means the surface has no preference.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Some(PREFERRED_SURFACE_FORMAT);
        }
    }

    formats
        .iter()
        .find(|sf| {
            sf.format == PREFERRED_SURFACE_FORMAT.format && sf.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first())
        .copied()
}

/// Pick the present mode: mailbox, then immediate, then the always-available FIFO
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| present_modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Pick the swapchain extent
///
/// A current extent width of `u32::MAX` lets the application choose within bounds.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image more than the minimum, bounded by the maximum (zero means unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Concurrent sharing across both families when drawing and presenting are split
pub fn choose_sharing_mode(families: QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if families.is_split() {
        (vk::SharingMode::CONCURRENT, vec![families.graphics, families.present])
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

/// Every presentation parameter needed to create a swapchain
#[derive(Debug, Clone)]
pub struct SwapchainPlan {
    /// Image format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Requested minimum image count
    pub image_count: u32,
    /// Exclusive or concurrent image sharing
    pub sharing_mode: vk::SharingMode,
    /// Queue families sharing the images when concurrent
    pub queue_family_indices: Vec<u32>,
    /// Surface transform to apply
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPlan {
    /// Derive a plan from a surface snapshot and the window's framebuffer size
    pub fn new(
        support: &SurfaceSupport,
        requested_extent: vk::Extent2D,
        families: QueueFamilyIndices,
    ) -> VulkanResult<Self> {
        let format = choose_surface_format(&support.formats)
            .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))?;
        let (sharing_mode, queue_family_indices) = choose_sharing_mode(families);

        Ok(Self {
            format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, requested_extent),
            image_count: choose_image_count(&support.capabilities),
            sharing_mode,
            queue_family_indices,
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// Swapchain with its images and one color view per image
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain, passing the previous one (or null) as a replacement hint
    pub fn new(
        context: &VulkanContext,
        requested_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let support = SurfaceSupport::query(context.surface(), context.physical_device().device)?;
        let plan = SwapchainPlan::new(&support, requested_extent, context.queue_families())?;

        log::debug!(
            "Swapchain plan: {}x{} {:?} {:?}, {} images, {:?}",
            plan.extent.width,
            plan.extent.height,
            plan.format.format,
            plan.present_mode,
            plan.image_count,
            plan.sharing_mode
        );

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface().handle())
            .min_image_count(plan.image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(plan.sharing_mode)
            .queue_family_indices(&plan.queue_family_indices)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain_loader = context.swapchain_loader().clone();
        let swapchain = unsafe { swapchain_loader.create_swapchain(&swapchain_create_info, None) }
            .check("vkCreateSwapchainKHR")?;

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }.check("vkGetSwapchainImagesKHR")?;

        let device = context.device().clone();
        let image_views = images
            .iter()
            .map(|&image| create_image_view(&device, image, plan.format.format, vk::ImageAspectFlags::COLOR, 1))
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: plan.format,
            extent: plan.extent,
        })
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get the presentable images
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Get image views, index-aligned with [`Swapchain::images`]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Number of images the implementation actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_follows_window_when_in_bounds() {
        let caps = capabilities(2, 4);
        let requested = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(choose_extent(&caps, requested), requested);
    }

    #[test]
    fn test_extent_clamped_into_bounds() {
        let mut caps = capabilities(2, 4);
        caps.min_image_extent = vk::Extent2D {
            width: 100,
            height: 100,
        };
        caps.max_image_extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };

        for (w, h) in [(0, 0), (50, 5000), (2000, 300), (u32::MAX - 1, 1)] {
            let extent = choose_extent(&caps, vk::Extent2D { width: w, height: h });
            assert!((100..=1024).contains(&extent.width));
            assert!((100..=768).contains(&extent.height));
        }
    }

    #[test]
    fn test_fixed_current_extent_wins() {
        let mut caps = capabilities(2, 4);
        caps.current_extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!(extent.width, 640);
        assert_eq!(extent.height, 480);
    }

    #[test]
    fn test_image_count_min_plus_one_clamped() {
        assert_eq!(choose_image_count(&capabilities(2, 4)), 3);
        assert_eq!(choose_image_count(&capabilities(3, 3)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
    }

    #[test]
    fn test_surface_format_preference() {
        let pick = |formats: &[vk::SurfaceFormatKHR]| {
            choose_surface_format(formats).map(|sf| (sf.format, sf.color_space))
        };
        let preferred = Some((PREFERRED_SURFACE_FORMAT.format, PREFERRED_SURFACE_FORMAT.color_space));
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        assert_eq!(pick(&[srgb, PREFERRED_SURFACE_FORMAT]), preferred);
        assert_eq!(pick(&[srgb]), Some((srgb.format, srgb.color_space)));
        assert_eq!(pick(&[]), None);

        let undefined = vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(pick(&[undefined]), preferred);
    }

    #[test]
    fn test_present_mode_priority() {
        use vk::PresentModeKHR as Mode;
        assert_eq!(choose_present_mode(&[Mode::FIFO, Mode::IMMEDIATE, Mode::MAILBOX]), Mode::MAILBOX);
        assert_eq!(choose_present_mode(&[Mode::FIFO, Mode::IMMEDIATE]), Mode::IMMEDIATE);
        assert_eq!(choose_present_mode(&[Mode::FIFO_RELAXED]), Mode::FIFO);
    }

    #[test]
    fn test_sharing_mode_depends_on_families() {
        let same = QueueFamilyIndices { graphics: 0, present: 0 };
        assert_eq!(choose_sharing_mode(same), (vk::SharingMode::EXCLUSIVE, vec![]));

        let split = QueueFamilyIndices { graphics: 0, present: 2 };
        assert_eq!(choose_sharing_mode(split), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }
}
