//! Device-resident models
//!
//! A [`GpuModel`] holds everything one draw call needs: vertex and index buffers, the
//! sampled texture, a uniform buffer for its transforms and the descriptor set binding
//! the last two. CPU-side mesh and pixel data are only borrowed for the upload.

use ash::vk;

use crate::assets::ImageData;
use crate::foundation::math::{Mat4, Vec3};
use crate::render::camera::UniformBufferObject;
use crate::render::mesh::MeshData;
use crate::render::vulkan::buffer::{Buffer, UniformBuffer};
use crate::render::vulkan::commands::{ActiveRenderPass, CommandPool};
use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::descriptors::{write_scene_set, DescriptorPool, DescriptorSetLayout};
use crate::render::vulkan::texture::{SamplerSettings, Texture};

/// Placement of a model in the world
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// World position
    pub position: Vec3,
    /// Per-axis scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Build from the arrays used in configuration files
    pub fn from_arrays(position: [f32; 3], scale: [f32; 3]) -> Self {
        Self {
            position: Vec3::from(position),
            scale: Vec3::from(scale),
        }
    }

    /// Model to world matrix: scale first, then translate
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position) * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Uploaded model ready to be drawn
///
/// Fields drop top to bottom. The descriptor set is returned with its pool.
pub struct GpuModel {
    descriptor_set: vk::DescriptorSet,
    uniforms: UniformBuffer<UniformBufferObject>,
    texture: Texture,
    index_buffer: Buffer,
    vertex_buffer: Buffer,
    index_count: u32,
    transform: Transform,
}

impl GpuModel {
    /// Upload `mesh` and `image` and bind them to a fresh descriptor set
    pub fn upload(
        context: &VulkanContext,
        command_pool: &CommandPool,
        descriptor_pool: &DescriptorPool,
        set_layout: &DescriptorSetLayout,
        mesh: &MeshData,
        image: &ImageData,
        sampler: &SamplerSettings,
        transform: Transform,
    ) -> VulkanResult<Self> {
        if !mesh.is_valid() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Mesh with {} vertices and {} indices is not a valid triangle list",
                    mesh.vertices.len(),
                    mesh.indices.len()
                ),
            });
        }

        // TRANSFER_SRC allows reading uploads back for verification
        let vertex_buffer = Buffer::device_local_with_data(
            context,
            command_pool,
            &mesh.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        let index_buffer = Buffer::device_local_with_data(
            context,
            command_pool,
            &mesh.indices,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        let texture = Texture::from_image_data(context, command_pool, image, sampler)?;
        let uniforms = UniformBuffer::new(context)?;

        let descriptor_set = descriptor_pool
            .allocate_descriptor_sets(&[set_layout.handle()])?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "Descriptor pool returned no set".to_string(),
            })?;
        write_scene_set(
            context.device(),
            descriptor_set,
            uniforms.descriptor_info(),
            texture.descriptor_info(),
        );

        Ok(Self {
            descriptor_set,
            uniforms,
            texture,
            index_buffer,
            vertex_buffer,
            index_count: mesh.index_count(),
            transform,
        })
    }

    /// Rewrite the transform block from the current view and projection
    pub fn update_uniforms(&self, view: &Mat4, proj: &Mat4) -> VulkanResult<()> {
        let ubo = UniformBufferObject::new(&self.transform.world_matrix(), view, proj);
        self.uniforms.update(&ubo)
    }

    /// Record the bind and draw commands for this model
    pub fn record_draw(&self, pass: &mut ActiveRenderPass<'_>, pipeline_layout: vk::PipelineLayout) {
        pass.cmd_bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        pass.cmd_bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT32);
        pass.cmd_bind_descriptor_sets(pipeline_layout, 0, &[self.descriptor_set]);
        pass.cmd_draw_indexed(self.index_count, 1, 0, 0, 0);
    }

    /// Number of indices drawn
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// World placement
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Move or rescale the model; takes effect at the next uniform update
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Device-local vertex buffer
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    /// Device-local index buffer
    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }

    /// Sampled texture
    pub fn texture(&self) -> &Texture {
        &self.texture
    }
}
