//! Upload and read back through a real device
//!
//! Needs a Vulkan driver and a display: `cargo test -- --ignored`.

use std::path::PathBuf;

use vk_renderer::assets::ImageData;
use vk_renderer::render::mesh::MeshData;
use vk_renderer::render::vulkan::descriptors::{scene_layout_builder, DescriptorPool};
use vk_renderer::render::vulkan::{CommandPool, GpuModel, SamplerSettings, Transform, VulkanContext, Window};

fn resource(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../resources").join(relative)
}

#[test]
#[ignore = "requires a Vulkan device and a display"]
fn test_model_upload_reads_back_byte_for_byte() {
    let mut window = Window::new_hidden("round trip", 64, 64).unwrap();
    let context = VulkanContext::new(&mut window, "round trip", false, false).unwrap();
    let device = context.device().clone();
    let command_pool = CommandPool::new(device.clone(), context.queue_families().graphics).unwrap();
    let set_layout = scene_layout_builder().build(&device).unwrap();
    let descriptor_pool = DescriptorPool::new(device, 1).unwrap();

    let mesh = MeshData::load_obj(resource("models/cube.obj")).unwrap();
    let image = ImageData::from_file(resource("textures/checker.png")).unwrap();
    let settings = SamplerSettings {
        max_mip_levels: Some(1),
        ..SamplerSettings::default()
    };

    let model = GpuModel::upload(
        &context,
        &command_pool,
        &descriptor_pool,
        &set_layout,
        &mesh,
        &image,
        &settings,
        Transform::default(),
    )
    .unwrap();

    let vertices = model.vertex_buffer().read_back(&context, &command_pool).unwrap();
    let indices = model.index_buffer().read_back(&context, &command_pool).unwrap();

    assert_eq!(vertices, bytemuck::cast_slice::<_, u8>(&mesh.vertices));
    assert_eq!(indices, bytemuck::cast_slice::<_, u8>(&mesh.indices));
    assert_eq!(model.index_count(), mesh.index_count());
    assert_eq!(model.texture().mip_levels(), 1);

    context.wait_idle().unwrap();
}
