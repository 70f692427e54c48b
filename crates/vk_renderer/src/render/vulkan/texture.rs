//! Sampled, mip-mapped textures
//!
//! Uploading goes through a staging buffer and a single one-time command buffer. The
//! order of barriers, the base copy and the per-level blits is described up front by
//! [`MipChainPlan`] so it can be checked without a device; [`Texture`] only replays it.

use ash::vk;

use crate::assets::image_loader::ImageData;
use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::commands::{CommandPool, SingleTimeCommands};
use crate::render::vulkan::context::{VkResultExt, VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::image::{cmd_transition_image_layout, mip_levels, Image, ImageDesc};

/// Texel format of every uploaded texture
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Sampler addressing outside `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressMode {
    /// Tile the texture
    #[default]
    Repeat,
    /// Tile, mirroring every other repetition
    MirroredRepeat,
    /// Stretch the edge texels
    ClampToEdge,
}

impl AddressMode {
    /// Matching Vulkan address mode
    pub fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            Self::Repeat => vk::SamplerAddressMode::REPEAT,
            Self::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            Self::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        }
    }
}

/// Sampler and mip settings applied to every texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    /// Addressing on all three axes
    pub address_mode: AddressMode,
    /// Requested anisotropy level; zero disables anisotropic filtering
    pub max_anisotropy: f32,
    /// Upper bound on generated mip levels
    pub max_mip_levels: Option<u32>,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            address_mode: AddressMode::Repeat,
            max_anisotropy: 16.0,
            max_mip_levels: None,
        }
    }
}

/// Anisotropy level to program into the sampler, or `None` to disable it
pub fn effective_anisotropy(device_enabled: bool, requested: f32, device_limit: f32) -> Option<f32> {
    (device_enabled && requested > 0.0).then(|| requested.min(device_limit))
}

/// Downsampling blit from one mip level to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipBlit {
    /// Level being written
    pub dst_level: u32,
    /// Extent of `dst_level - 1`
    pub src_extent: (u32, u32),
    /// Extent of `dst_level`
    pub dst_extent: (u32, u32),
}

/// One recorded step of a texture upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipStep {
    /// Layout barrier over `level_count` levels starting at `base_level`
    Transition {
        /// First affected level
        base_level: u32,
        /// Number of affected levels
        level_count: u32,
        /// Layout before the barrier
        old: vk::ImageLayout,
        /// Layout after the barrier
        new: vk::ImageLayout,
    },
    /// Copy the staging buffer into level 0
    CopyBase,
    /// Linear blit from `dst_level - 1` into `dst_level`
    Blit(MipBlit),
}

/// Ordered upload steps for a `width` x `height` texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipChainPlan {
    width: u32,
    height: u32,
    levels: u32,
}

impl MipChainPlan {
    /// Plan a chain of `mip_levels(width, height, cap)` levels
    pub fn new(width: u32, height: u32, cap: Option<u32>) -> Self {
        Self {
            width,
            height,
            levels: mip_levels(width, height, cap),
        }
    }

    /// Number of mip levels in the image
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Extent of `level`, never smaller than 1x1
    pub fn level_extent(&self, level: u32) -> (u32, u32) {
        let shrink = |size: u32| size.checked_shr(level).unwrap_or(0).max(1);
        (shrink(self.width), shrink(self.height))
    }

    /// Blits generating levels 1 and up
    pub fn blits(&self) -> Vec<MipBlit> {
        (1..self.levels)
            .map(|level| MipBlit {
                dst_level: level,
                src_extent: self.level_extent(level - 1),
                dst_extent: self.level_extent(level),
            })
            .collect()
    }

    /// Every barrier, copy and blit in recording order
    ///
    /// Each level ends in `TRANSFER_SRC_OPTIMAL` before the final barrier moves the whole
    /// chain to `SHADER_READ_ONLY_OPTIMAL`.
    pub fn steps(&self) -> Vec<MipStep> {
        use vk::ImageLayout as L;

        let transition = |base_level, level_count, old, new| MipStep::Transition {
            base_level,
            level_count,
            old,
            new,
        };

        let mut steps = vec![
            transition(0, 1, L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
            MipStep::CopyBase,
            transition(0, 1, L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
        ];

        for blit in self.blits() {
            steps.push(transition(blit.dst_level, 1, L::UNDEFINED, L::TRANSFER_DST_OPTIMAL));
            steps.push(MipStep::Blit(blit));
            steps.push(transition(
                blit.dst_level,
                1,
                L::TRANSFER_DST_OPTIMAL,
                L::TRANSFER_SRC_OPTIMAL,
            ));
        }

        steps.push(transition(
            0,
            self.levels,
            L::TRANSFER_SRC_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
        ));
        steps
    }
}

fn extent_offset((width, height): (u32, u32)) -> vk::Offset3D {
    vk::Offset3D {
        x: i32::try_from(width).unwrap_or(i32::MAX),
        y: i32::try_from(height).unwrap_or(i32::MAX),
        z: 1,
    }
}

fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Device-local texture image with its view and sampler
pub struct Texture {
    sampler: vk::Sampler,
    image: Image,
}

impl Texture {
    /// Upload RGBA8 pixels, generate the mip chain and create the sampler
    pub fn from_image_data(
        context: &VulkanContext,
        command_pool: &CommandPool,
        image_data: &ImageData,
        settings: &SamplerSettings,
    ) -> VulkanResult<Self> {
        let expected_len = image_data.width as usize * image_data.height as usize * 4;
        if image_data.width == 0 || image_data.height == 0 || image_data.data.len() != expected_len {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Texture data is {} bytes, expected {} for {}x{} RGBA8",
                    image_data.data.len(),
                    expected_len,
                    image_data.width,
                    image_data.height
                ),
            });
        }

        let plan = MipChainPlan::new(image_data.width, image_data.height, settings.max_mip_levels);

        if plan.levels() > 1 {
            let properties = unsafe {
                context
                    .instance()
                    .get_physical_device_format_properties(context.physical_device().device, TEXTURE_FORMAT)
            };
            if !properties
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
            {
                return Err(VulkanError::UnsupportedFormat(TEXTURE_FORMAT));
            }
        }

        let staging = Buffer::staging_with_data(context, &image_data.data)?;

        let image = Image::new(
            context,
            ImageDesc {
                extent: vk::Extent2D {
                    width: image_data.width,
                    height: image_data.height,
                },
                format: TEXTURE_FORMAT,
                mip_levels: plan.levels(),
                samples: vk::SampleCountFlags::TYPE_1,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )?;

        let commands = SingleTimeCommands::begin(context, command_pool)?;
        record_plan(&commands, &plan, &staging, &image)?;
        commands.submit_and_wait()?;

        let sampler = create_sampler(context, settings, plan.levels())?;

        log::debug!(
            "Texture uploaded: {}x{}, {} mip levels",
            image_data.width,
            image_data.height,
            plan.levels()
        );

        Ok(Self { sampler, image })
    }

    /// Image view covering all mip levels
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Sampler handle
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.image.desc().mip_levels
    }

    /// Descriptor info for a combined image sampler in shader-read layout
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.image.device().destroy_sampler(self.sampler, None);
        }
    }
}

fn record_plan(
    commands: &SingleTimeCommands<'_>,
    plan: &MipChainPlan,
    staging: &Buffer,
    image: &Image,
) -> VulkanResult<()> {
    let device = commands.device();
    let command_buffer = commands.command_buffer();

    for step in plan.steps() {
        match step {
            MipStep::Transition {
                base_level,
                level_count,
                old,
                new,
            } => {
                let range = vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: base_level,
                    level_count,
                    base_array_layer: 0,
                    layer_count: 1,
                };
                cmd_transition_image_layout(device, command_buffer, image.handle(), old, new, range)?;
            }
            MipStep::CopyBase => {
                let (width, height) = plan.level_extent(0);
                let region = vk::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: color_layers(0),
                    image_offset: vk::Offset3D::default(),
                    image_extent: vk::Extent3D { width, height, depth: 1 },
                };
                unsafe {
                    device.cmd_copy_buffer_to_image(
                        command_buffer,
                        staging.handle(),
                        image.handle(),
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
            }
            MipStep::Blit(blit) => {
                let region = vk::ImageBlit {
                    src_subresource: color_layers(blit.dst_level - 1),
                    src_offsets: [vk::Offset3D::default(), extent_offset(blit.src_extent)],
                    dst_subresource: color_layers(blit.dst_level),
                    dst_offsets: [vk::Offset3D::default(), extent_offset(blit.dst_extent)],
                };
                unsafe {
                    device.cmd_blit_image(
                        command_buffer,
                        image.handle(),
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        image.handle(),
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                        vk::Filter::LINEAR,
                    );
                }
            }
        }
    }
    Ok(())
}

fn create_sampler(context: &VulkanContext, settings: &SamplerSettings, levels: u32) -> VulkanResult<vk::Sampler> {
    let address_mode = settings.address_mode.to_vk();
    let anisotropy = effective_anisotropy(
        context.anisotropy_enabled(),
        settings.max_anisotropy,
        context.physical_device().properties.limits.max_sampler_anisotropy,
    );

    let sampler_create_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(address_mode)
        .address_mode_v(address_mode)
        .address_mode_w(address_mode)
        .anisotropy_enable(anisotropy.is_some())
        .max_anisotropy(anisotropy.unwrap_or(1.0))
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(levels as f32);

    unsafe { context.device().create_sampler(&sampler_create_info, None) }.check("vkCreateSampler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_extents_never_reach_zero() {
        let plan = MipChainPlan::new(8, 2, None);
        assert_eq!(plan.levels(), 4);
        assert_eq!(plan.level_extent(0), (8, 2));
        assert_eq!(plan.level_extent(1), (4, 1));
        assert_eq!(plan.level_extent(3), (1, 1));
        assert_eq!(plan.level_extent(40), (1, 1));
    }

    #[test]
    fn test_blits_chain_adjacent_levels() {
        let plan = MipChainPlan::new(16, 16, None);
        let blits = plan.blits();
        assert_eq!(blits.len(), 4);
        assert_eq!(
            blits[0],
            MipBlit {
                dst_level: 1,
                src_extent: (16, 16),
                dst_extent: (8, 8),
            }
        );
        for pair in blits.windows(2) {
            assert_eq!(pair[0].dst_extent, pair[1].src_extent);
            assert_eq!(pair[0].dst_level + 1, pair[1].dst_level);
        }
    }

    #[test]
    fn test_every_level_written_before_final_transition() {
        use vk::ImageLayout as L;
        let plan = MipChainPlan::new(64, 32, None);
        let steps = plan.steps();

        let last = *steps.last().unwrap();
        assert_eq!(
            last,
            MipStep::Transition {
                base_level: 0,
                level_count: plan.levels(),
                old: L::TRANSFER_SRC_OPTIMAL,
                new: L::SHADER_READ_ONLY_OPTIMAL,
            }
        );

        for level in 0..plan.levels() {
            assert!(steps.contains(&MipStep::Transition {
                base_level: level,
                level_count: 1,
                old: L::TRANSFER_DST_OPTIMAL,
                new: L::TRANSFER_SRC_OPTIMAL,
            }));
        }
    }

    #[test]
    fn test_transitions_in_plan_are_supported() {
        use crate::render::vulkan::image::LayoutTransition;
        for step in MipChainPlan::new(300, 200, None).steps() {
            if let MipStep::Transition { old, new, .. } = step {
                assert!(LayoutTransition::new(old, new).is_ok(), "{old:?} -> {new:?}");
            }
        }
    }

    #[test]
    fn test_anisotropy_selection() {
        assert_eq!(effective_anisotropy(true, 16.0, 8.0), Some(8.0));
        assert_eq!(effective_anisotropy(true, 4.0, 16.0), Some(4.0));
        assert_eq!(effective_anisotropy(true, 0.0, 16.0), None);
        assert_eq!(effective_anisotropy(false, 16.0, 16.0), None);
    }

    #[test]
    fn test_address_mode_mapping() {
        assert_eq!(AddressMode::default().to_vk(), vk::SamplerAddressMode::REPEAT);
        assert_eq!(AddressMode::ClampToEdge.to_vk(), vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(AddressMode::MirroredRepeat.to_vk(), vk::SamplerAddressMode::MIRRORED_REPEAT);
    }
}
